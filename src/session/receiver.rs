use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};

use super::SessionStats;
use crate::audio::AudioSink;
use crate::control::ControlPlane;
use crate::delay_line::DelayLine;
use crate::dsp::{rms, DspChain};
use crate::protocol::{FrameAssembler, Packet, WireFormat};

const RECV_BUF_SIZE: usize = 4096;

/// Receive path: bytes → frames → DSP → delay line → playback.
pub struct ReceiverPipeline {
    assembler: FrameAssembler,
    chain: DspChain,
    delay: DelayLine<Vec<i16>>,
    plane: Arc<ControlPlane>,
    stats: SessionStats,
}

impl ReceiverPipeline {
    pub fn new(
        format: WireFormat,
        delay_frames: usize,
        chain: DspChain,
        plane: Arc<ControlPlane>,
    ) -> Self {
        log::info!(
            "Receiver pipeline: wire={}, frame={}, delay={} frames",
            format,
            chain.samples_per_frame(),
            delay_frames,
        );
        Self {
            assembler: FrameAssembler::new(format, chain.samples_per_frame()),
            chain,
            delay: DelayLine::new(delay_frames),
            plane,
            stats: SessionStats::default(),
        }
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Frames currently held in the delay line.
    pub fn buffered(&self) -> usize {
        self.delay.len()
    }

    /// Feed one chunk from the socket and process every frame it completes.
    pub fn handle_chunk<K: AudioSink + ?Sized>(&mut self, chunk: &[u8], sink: &mut K) -> Result<()> {
        self.assembler.extend(chunk);
        while let Some(packet) = self.assembler.next_packet() {
            self.handle_packet(packet, sink)?;
        }
        Ok(())
    }

    fn handle_packet<K: AudioSink + ?Sized>(&mut self, packet: Packet, sink: &mut K) -> Result<()> {
        self.stats.frames_received += 1;

        // Read once per frame; a switch lands on the next frame.
        let mode = self.plane.mode();
        let mix = self.plane.mix();
        let frame = self.chain.process(packet.samples, mode, mix)?;

        match packet.header {
            Some(header) => {
                self.plane.set_level(header.rms);
                self.plane.set_peer_mode(header.mode);
            }
            None => self.plane.set_level(rms(&frame)),
        }

        let was_warm = self.delay.is_warm();
        self.delay.push(frame);
        if !was_warm && self.delay.is_warm() {
            log::info!("Delay line primed ({} frames), playback starts", self.delay.depth());
        }
        while let Some(delayed) = self.delay.try_pop() {
            // Drained even when muted so latency does not change across toggles
            if self.plane.is_muted() {
                self.stats.frames_muted += 1;
                continue;
            }
            sink.write_frame(&delayed)?;
            self.stats.frames_played += 1;
        }
        Ok(())
    }

    /// Blocking receive loop. Ends on peer close, on a transport error, or
    /// when `running` is cleared and the socket is shut down.
    pub fn run<R: Read, K: AudioSink + ?Sized>(
        &mut self,
        reader: &mut R,
        sink: &mut K,
        running: &AtomicBool,
    ) -> Result<SessionStats> {
        let mut buf = [0u8; RECV_BUF_SIZE];
        while running.load(Ordering::Relaxed) {
            match reader.read(&mut buf) {
                Ok(0) => {
                    log::info!("Peer closed the connection");
                    break;
                }
                Ok(n) => self.handle_chunk(&buf[..n], sink)?,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if !running.load(Ordering::Relaxed) => {
                    log::debug!("Receive aborted by shutdown: {}", e);
                    break;
                }
                Err(e) => return Err(e).context("Receive failed"),
            }
        }

        if self.assembler.pending() > 0 {
            log::warn!("Discarding {} bytes of an incomplete frame", self.assembler.pending());
        }
        sink.finish()?;
        Ok(self.stats)
    }
}
