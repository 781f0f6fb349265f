//! audio - ALSA capture and playback for the relay
//!
//! Devices are opened and driven from the audio thread only. The traits let
//! the session loops run against in-memory sources and sinks as well.

mod alsa_device;
mod capture;
mod playback;

pub use capture::{downmix, AlsaCapture, AudioSource, CaptureStatus};
pub use playback::{duplicate_channels, AlsaPlayback, AudioSink, MemorySink};
