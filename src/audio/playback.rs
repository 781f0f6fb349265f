use alsa::pcm::PCM;
use anyhow::Result;

use super::alsa_device;

/// Consumer of processed mono frames.
pub trait AudioSink {
    /// Write one mono frame. Underruns are recovered internally and are not
    /// reported as errors.
    fn write_frame(&mut self, samples: &[i16]) -> Result<()>;

    /// Let queued audio play out before the device is closed.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// After this many failed recoveries in one frame the rest of the frame is
/// dropped so a wedged device cannot stall the audio thread.
const MAX_RECOVERY_RETRIES: u32 = 3;

/// Copy each mono sample to every output channel.
pub fn duplicate_channels(mono: &[i16], channels: usize, out: &mut Vec<i16>) {
    out.clear();
    if channels <= 1 {
        out.extend_from_slice(mono);
        return;
    }
    out.reserve(mono.len() * channels);
    for &s in mono {
        out.extend(std::iter::repeat(s).take(channels));
    }
}

/// ALSA playback device. Mono frames are duplicated to however many
/// channels the hardware was opened with.
pub struct AlsaPlayback {
    pcm: PCM,
    channels: usize,
    interleaved: Vec<i16>,
    finished: bool,
}

impl AlsaPlayback {
    pub fn open(device: &str, sample_rate: u32, channels: u32, period_size: usize) -> Result<Self> {
        let (pcm, params) = alsa_device::open_playback(device, sample_rate, channels, period_size)?;
        Ok(Self {
            pcm,
            channels: params.channels as usize,
            interleaved: Vec::new(),
            finished: false,
        })
    }
}

impl AudioSink for AlsaPlayback {
    fn write_frame(&mut self, samples: &[i16]) -> Result<()> {
        duplicate_channels(samples, self.channels, &mut self.interleaved);
        let io = self.pcm.io_i16()?;

        // Retry loop handles short writes and XRUN recovery without losing frames.
        let total_frames = samples.len();
        let mut frames_written = 0;
        let mut retry_count = 0u32;

        while frames_written < total_frames {
            let offset = frames_written * self.channels;
            match io.writei(&self.interleaved[offset..]) {
                Ok(n) => {
                    frames_written += n;
                    retry_count = 0;
                }
                Err(e) => {
                    log::warn!("ALSA underrun or error: {}, recovering...", e);
                    retry_count += 1;
                    self.pcm.prepare()?;

                    if retry_count >= MAX_RECOVERY_RETRIES {
                        log::error!(
                            "Max recovery retries ({}) reached. Dropping {} unwritten frames.",
                            retry_count,
                            total_frames - frames_written
                        );
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if !self.finished {
            self.finished = true;
            self.pcm.drain()?;
            log::info!("Playback drained");
        }
        Ok(())
    }
}

impl Drop for AlsaPlayback {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            log::warn!("Playback drain failed: {}", e);
        }
    }
}

/// Collects frames in memory. Used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub frames: Vec<Vec<i16>>,
    pub finished: bool,
}

impl AudioSink for MemorySink {
    fn write_frame(&mut self, samples: &[i16]) -> Result<()> {
        self.frames.push(samples.to_vec());
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        Ok(())
    }
}
