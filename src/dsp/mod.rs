//! dsp - Receiver/sender signal chain
//!
//! One-pole high-pass filter, RNNoise binding (loaded at runtime), and the
//! mode-driven chain that composes them with wet/dry mixing.

mod chain;
mod denoiser;
mod hpf;

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

pub use chain::DspChain;
pub use denoiser::{Denoiser, RnNoise};
pub use hpf::HighPassFilter;

/// RNNoise only accepts 10 ms frames at 48 kHz.
pub const NATIVE_FRAME_SIZE: usize = 480;

/// The only rate RNNoise is trained for.
pub const NATIVE_SAMPLE_RATE: u32 = 48000;

/// Processing mode selected on the control plane.
///
/// The numeric values are the ones carried in the telemetry header and typed
/// on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Mode {
    #[default]
    Raw = 0,
    Hpf = 1,
    Rnn = 2,
    Both = 3,
}

impl Mode {
    pub const ALL: [Mode; 4] = [Mode::Raw, Mode::Hpf, Mode::Rnn, Mode::Both];

    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Mode::Raw),
            1 => Some(Mode::Hpf),
            2 => Some(Mode::Rnn),
            3 => Some(Mode::Both),
            _ => None,
        }
    }

    pub fn as_u32(self) -> u32 {
        self as u32
    }

    pub fn name(self) -> &'static str {
        match self {
            Mode::Raw => "RAW",
            Mode::Hpf => "HPF",
            Mode::Rnn => "RNN",
            Mode::Both => "BOTH",
        }
    }

    pub fn uses_hpf(self) -> bool {
        matches!(self, Mode::Hpf | Mode::Both)
    }

    pub fn uses_denoiser(self) -> bool {
        matches!(self, Mode::Rnn | Mode::Both)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(n) = s.parse::<u32>() {
            return Mode::from_u32(n).ok_or_else(|| format!("mode out of range: {}", n));
        }
        Mode::ALL
            .into_iter()
            .find(|m| m.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown mode: {}", s))
    }
}

#[derive(Debug, Error)]
pub enum DspError {
    #[error("denoiser library could not be loaded (tried {tried}): {reason}")]
    LibraryUnavailable { tried: String, reason: String },

    #[error("denoiser library is missing symbol {0}")]
    MissingSymbol(&'static str),

    #[error("denoiser state could not be created")]
    CreateFailed,

    #[error("denoiser frame size is {actual}, expected {expected}")]
    NativeFrameSize { expected: usize, actual: usize },

    #[error("frame of {len} samples is not a multiple of the denoiser frame size {native}")]
    UnalignedFrame { len: usize, native: usize },

    #[error("denoiser returned an invalid result")]
    ProcessFailed,
}

/// Saturate to the i16 range and truncate toward zero.
#[inline]
pub fn saturate(sample: f64) -> i16 {
    sample.clamp(i16::MIN as f64, i16::MAX as f64) as i16
}

/// Root mean square of a frame, truncated to an integer level.
pub fn rms(samples: &[i16]) -> u32 {
    if samples.is_empty() {
        return 0;
    }
    let sum: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum / samples.len() as f64).sqrt() as u32
}
