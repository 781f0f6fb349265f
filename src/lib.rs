//! Two-node voice relay: a sender streams microphone PCM over TCP, a
//! receiver cleans it up (high-pass, RNNoise or both), delays it by a fixed
//! amount and plays it back.

pub mod audio;
pub mod config;
pub mod control;
pub mod delay_line;
pub mod display_bridge;
pub mod dsp;
pub mod net_link;
pub mod protocol;
pub mod session;
