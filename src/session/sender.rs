use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use bytes::BytesMut;

use super::SessionStats;
use crate::audio::{AudioSource, CaptureStatus};
use crate::control::ControlPlane;
use crate::dsp::{rms, DspChain};
use crate::protocol::{encode_packet, PacketHeader, WireFormat};

/// Send path: capture → optional DSP → RMS → serialize → socket.
pub struct SenderPipeline {
    format: WireFormat,
    samples_per_frame: usize,
    chain: Option<DspChain>,
    plane: Arc<ControlPlane>,
    out: BytesMut,
    stats: SessionStats,
}

impl SenderPipeline {
    /// Without a chain the audio goes out untouched, but the header still
    /// carries the selected mode.
    pub fn new(
        format: WireFormat,
        samples_per_frame: usize,
        chain: Option<DspChain>,
        plane: Arc<ControlPlane>,
    ) -> Self {
        log::info!(
            "Sender pipeline: wire={}, frame={}, local dsp={}",
            format,
            samples_per_frame,
            chain.is_some(),
        );
        Self {
            format,
            samples_per_frame,
            chain,
            plane,
            out: BytesMut::with_capacity(format.header_len() + samples_per_frame * 2),
            stats: SessionStats::default(),
        }
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Process and write one captured frame.
    pub fn send_frame<W: Write + ?Sized>(&mut self, frame: &[i16], writer: &mut W) -> Result<()> {
        let mode = self.plane.mode();
        let processed = match self.chain.as_mut() {
            Some(chain) => chain.process(frame.to_vec(), mode, self.plane.mix())?,
            None => frame.to_vec(),
        };

        let level = rms(&processed);
        self.plane.set_level(level);

        self.out.clear();
        let header = PacketHeader {
            mode: mode.as_u32(),
            rms: level,
        };
        encode_packet(self.format, header, &processed, &mut self.out);
        writer.write_all(&self.out)?;
        self.stats.frames_sent += 1;
        Ok(())
    }

    /// Capture and send until the source ends, the peer goes away, or
    /// `running` is cleared.
    pub fn run<S: AudioSource + ?Sized, W: Write + ?Sized>(
        &mut self,
        source: &mut S,
        writer: &mut W,
        running: &AtomicBool,
    ) -> Result<SessionStats> {
        let mut frame = vec![0i16; self.samples_per_frame];
        while running.load(Ordering::Relaxed) {
            match source.read_frame(&mut frame)? {
                CaptureStatus::Ended => {
                    log::info!("Capture source ended");
                    break;
                }
                CaptureStatus::Overflowed => {
                    self.stats.overflows += 1;
                    log::warn!("Input overflow, sending zero-padded frame");
                }
                CaptureStatus::Complete => {}
            }

            if let Err(e) = self.send_frame(&frame, writer) {
                if !running.load(Ordering::Relaxed) {
                    log::debug!("Send aborted by shutdown: {:#}", e);
                    break;
                }
                return Err(e).context("Send failed");
            }
        }
        writer.flush()?;
        Ok(self.stats)
    }
}
