//! Control plane shared between the audio thread and the control inputs.
//!
//! Every field is a single scalar with one writer. Readers get an eventually
//! consistent snapshot, which is enough because the fields are independent:
//! a mode change is seen by the DSP chain on the next frame it processes.

use std::io::{self, BufRead};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::dsp::Mode;

const NO_PEER_MODE: u32 = u32::MAX;

pub struct ControlPlane {
    mode: AtomicU8,
    // f32 bits
    mix: AtomicU32,
    muted: AtomicBool,
    level: AtomicU32,
    peer_mode: AtomicU32,
}

/// Point-in-time view for the display process.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Snapshot {
    pub mode: u32,
    pub mode_name: &'static str,
    pub mix: f32,
    pub muted: bool,
    pub rms: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer_mode: Option<u32>,
}

impl ControlPlane {
    pub fn new(mode: Mode, mix: f32) -> Self {
        Self {
            mode: AtomicU8::new(mode as u8),
            mix: AtomicU32::new(clamp_mix(mix).to_bits()),
            muted: AtomicBool::new(false),
            level: AtomicU32::new(0),
            peer_mode: AtomicU32::new(NO_PEER_MODE),
        }
    }

    pub fn mode(&self) -> Mode {
        Mode::from_u32(self.mode.load(Ordering::Relaxed) as u32).unwrap_or_default()
    }

    pub fn set_mode(&self, mode: Mode) {
        self.mode.store(mode as u8, Ordering::Relaxed);
    }

    pub fn mix(&self) -> f32 {
        f32::from_bits(self.mix.load(Ordering::Relaxed))
    }

    /// Stores the ratio clamped to [0, 1]. NaN is treated as fully wet.
    pub fn set_mix(&self, mix: f32) -> f32 {
        let clamped = clamp_mix(mix);
        self.mix.store(clamped.to_bits(), Ordering::Relaxed);
        clamped
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }

    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::Relaxed);
    }

    /// Flip the mute flag, returning the new value.
    pub fn toggle_mute(&self) -> bool {
        !self.muted.fetch_xor(true, Ordering::Relaxed)
    }

    /// Latest signal level (RMS of the last frame).
    pub fn level(&self) -> u32 {
        self.level.load(Ordering::Relaxed)
    }

    pub fn set_level(&self, rms: u32) {
        self.level.store(rms, Ordering::Relaxed);
    }

    /// Mode tag reported by the sender in the telemetry header.
    pub fn peer_mode(&self) -> Option<u32> {
        match self.peer_mode.load(Ordering::Relaxed) {
            NO_PEER_MODE => None,
            m => Some(m),
        }
    }

    pub fn set_peer_mode(&self, mode: u32) {
        self.peer_mode.store(mode, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Snapshot {
        let mode = self.mode();
        Snapshot {
            mode: mode.as_u32(),
            mode_name: mode.name(),
            mix: self.mix(),
            muted: self.is_muted(),
            rms: self.level(),
            peer_mode: self.peer_mode(),
        }
    }
}

fn clamp_mix(mix: f32) -> f32 {
    if mix.is_nan() { 1.0 } else { mix.clamp(0.0, 1.0) }
}

// ======================== Commands ========================

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlCommand {
    SetMode(Mode),
    SetMix(f32),
    ToggleMute,
    Status,
}

#[derive(Debug, Error, PartialEq)]
pub enum CommandError {
    #[error("empty command")]
    Empty,

    #[error("usage: r <0.0~1.0>")]
    MixUsage,

    #[error("mix ratio is not a number: {0}")]
    InvalidMix(String),

    #[error("unknown command: {0} (0/1/2/3, r <mix>, m, s)")]
    Unknown(String),
}

/// Parse one line from the command interpreter.
pub fn parse_command(line: &str) -> Result<ControlCommand, CommandError> {
    let line = line.trim();
    let mut parts = line.split_whitespace();
    let Some(head) = parts.next() else {
        return Err(CommandError::Empty);
    };

    match head {
        "0" | "1" | "2" | "3" if parts.next().is_none() => {
            let mode = head.parse::<Mode>().map_err(|_| CommandError::Unknown(line.to_string()))?;
            Ok(ControlCommand::SetMode(mode))
        }
        "r" | "mix" => {
            let (Some(value), None) = (parts.next(), parts.next()) else {
                return Err(CommandError::MixUsage);
            };
            value
                .parse::<f32>()
                .map(ControlCommand::SetMix)
                .map_err(|_| CommandError::InvalidMix(value.to_string()))
        }
        "m" | "mute" => Ok(ControlCommand::ToggleMute),
        "s" | "status" => Ok(ControlCommand::Status),
        _ => Err(CommandError::Unknown(line.to_string())),
    }
}

// ======================== Events ========================

/// Everything that mutates the control plane arrives through one channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlEvent {
    Command(ControlCommand),
    /// Rising edge from the mute button, stamped at the source.
    MuteEdge(Instant),
}

/// Ignores edges that arrive within `cooldown` of the last accepted one.
#[derive(Debug)]
pub struct Debouncer {
    cooldown: Duration,
    last: Option<Instant>,
}

impl Debouncer {
    pub fn new(cooldown: Duration) -> Self {
        Self { cooldown, last: None }
    }

    pub fn accept(&mut self, at: Instant) -> bool {
        if let Some(last) = self.last {
            if at.saturating_duration_since(last) < self.cooldown {
                return false;
            }
        }
        self.last = Some(at);
        true
    }
}

/// Apply one event to the plane.
pub fn apply_event(plane: &ControlPlane, debouncer: &mut Debouncer, event: ControlEvent) {
    match event {
        ControlEvent::Command(ControlCommand::SetMode(mode)) => {
            plane.set_mode(mode);
            log::info!("mode -> {} ({})", mode.as_u32(), mode);
        }
        ControlEvent::Command(ControlCommand::SetMix(mix)) => {
            let stored = plane.set_mix(mix);
            log::info!("mix -> {:.2}", stored);
        }
        ControlEvent::Command(ControlCommand::ToggleMute) => {
            apply_mute_edge(plane, debouncer, Instant::now());
        }
        ControlEvent::MuteEdge(at) => {
            apply_mute_edge(plane, debouncer, at);
        }
        ControlEvent::Command(ControlCommand::Status) => {
            let s = plane.snapshot();
            println!(
                "[{}] mode={} ({}) mix={:.2} rms={}",
                if s.muted { "MUTED" } else { "LIVE" },
                s.mode,
                s.mode_name,
                s.mix,
                s.rms
            );
        }
    }
}

fn apply_mute_edge(plane: &ControlPlane, debouncer: &mut Debouncer, at: Instant) {
    if !debouncer.accept(at) {
        log::debug!("mute toggle ignored (cooldown)");
        return;
    }
    let muted = plane.toggle_mute();
    log::info!("mute -> {}", muted);
}

/// Drain control events until every sender is gone.
pub async fn run_control_loop(
    mut rx: mpsc::Receiver<ControlEvent>,
    plane: std::sync::Arc<ControlPlane>,
    cooldown: Duration,
) {
    let mut debouncer = Debouncer::new(cooldown);
    while let Some(event) = rx.recv().await {
        apply_event(&plane, &mut debouncer, event);
    }
    log::debug!("control loop finished");
}

/// Read commands from stdin on a dedicated thread.
///
/// A plain thread is used because a blocking stdin read inside the runtime
/// would hold up runtime shutdown.
pub fn spawn_stdin_reader(tx: mpsc::Sender<ControlEvent>) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("control-stdin".into())
        .spawn(move || {
            println!("mode: 0=RAW, 1=HPF, 2=RNN, 3=BOTH");
            println!("mix:  r <0.0~1.0>   mute: m   status: s");
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_command(&line) {
                    Ok(cmd) => {
                        if tx.blocking_send(ControlEvent::Command(cmd)).is_err() {
                            break;
                        }
                    }
                    Err(e) => println!("{}", e),
                }
            }
            log::debug!("stdin closed");
        })
}
