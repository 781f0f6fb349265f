use alsa::pcm::PCM;
use anyhow::Result;

use super::alsa_device;

/// Outcome of one capture read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStatus {
    /// The frame was filled from the device.
    Complete,
    /// Samples were lost; the missing tail of the frame is zero.
    Overflowed,
    /// The source has no more data.
    Ended,
}

/// Producer of fixed-size mono frames.
pub trait AudioSource {
    fn read_frame(&mut self, frame: &mut [i16]) -> Result<CaptureStatus>;
}

/// Average interleaved channels down to mono.
pub fn downmix(interleaved: &[i16], channels: usize, out: &mut [i16]) {
    if channels <= 1 {
        let n = out.len().min(interleaved.len());
        out[..n].copy_from_slice(&interleaved[..n]);
        return;
    }
    for (o, chunk) in out.iter_mut().zip(interleaved.chunks_exact(channels)) {
        let sum: i32 = chunk.iter().map(|&s| s as i32).sum();
        *o = (sum / channels as i32) as i16;
    }
}

/// ALSA capture device delivering mono frames.
pub struct AlsaCapture {
    pcm: PCM,
    channels: usize,
    read_buf: Vec<i16>,
}

impl AlsaCapture {
    pub fn open(device: &str, sample_rate: u32, channels: u32, samples_per_frame: usize) -> Result<Self> {
        let (pcm, params) = alsa_device::open_capture(device, sample_rate, channels, samples_per_frame)?;
        let channels = params.channels as usize;
        Ok(Self {
            pcm,
            channels,
            read_buf: vec![0; samples_per_frame * channels],
        })
    }
}

impl AudioSource for AlsaCapture {
    fn read_frame(&mut self, frame: &mut [i16]) -> Result<CaptureStatus> {
        let io = self.pcm.io_i16()?;
        let wanted = frame.len();
        self.read_buf.resize(wanted * self.channels, 0);

        let mut filled = 0;
        let mut status = CaptureStatus::Complete;
        while filled < wanted {
            let offset = filled * self.channels;
            match io.readi(&mut self.read_buf[offset..]) {
                Ok(n) => filled += n,
                Err(e) => {
                    log::warn!("ALSA capture overrun: {}, recovering...", e);
                    self.pcm.prepare()?;
                    status = CaptureStatus::Overflowed;
                    break;
                }
            }
        }

        // Best effort: whatever was lost goes out as silence.
        self.read_buf[filled * self.channels..].fill(0);
        downmix(&self.read_buf, self.channels, frame);
        Ok(status)
    }
}
