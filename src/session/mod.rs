//! Session orchestration.
//!
//! One audio thread per session (std::thread, not a tokio task) owns the
//! socket, the ALSA device and the DSP chain. The async side only sees
//! `SessionEvent`s and can stop the thread through `Session::stop`.

mod receiver;
mod sender;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use tokio::sync::mpsc;

pub use receiver::ReceiverPipeline;
pub use sender::SenderPipeline;

use crate::audio::{AlsaCapture, AlsaPlayback};
use crate::config::{Config, Role};
use crate::control::ControlPlane;
use crate::dsp::DspChain;
use crate::net_link::{self, StreamCloser};

/// Counters reported when a session ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub frames_received: u64,
    pub frames_played: u64,
    pub frames_muted: u64,
    pub frames_sent: u64,
    pub overflows: u64,
}

#[derive(Debug)]
pub enum SessionEvent {
    Connected(SocketAddr),
    Finished(SessionStats),
    Failed(String),
}

/// Handle to a running audio thread. Dropping it stops the session and
/// releases the socket, the device and the denoiser.
pub struct Session {
    running: Arc<AtomicBool>,
    closer: StreamCloser,
    handle: Option<JoinHandle<()>>,
}

impl Session {
    /// Validate the configuration, load the denoiser and start the audio
    /// thread for the configured role.
    ///
    /// Denoiser failures are returned here, before any audio flows. With the
    /// denoiser switched off the receiver still gets an HPF-only chain.
    pub fn start(
        config: &Config,
        plane: Arc<ControlPlane>,
        events: mpsc::Sender<SessionEvent>,
    ) -> Result<Self> {
        config.validate()?;

        let chain = if config.denoiser_enabled() {
            let chain = DspChain::with_rnnoise(
                config.sample_rate,
                config.samples_per_frame,
                config.hpf_cutoff_hz,
                &config.denoiser_libs,
            )
            .context("Denoiser initialization failed")?;
            Some(chain)
        } else if config.dsp_enabled() {
            Some(DspChain::without_denoiser(
                config.sample_rate,
                config.samples_per_frame,
                config.hpf_cutoff_hz,
            ))
        } else {
            None
        };

        let running = Arc::new(AtomicBool::new(true));
        let closer = StreamCloser::new();

        let handle = {
            let running = running.clone();
            let closer = closer.clone();
            let config = config.clone();
            let name = match config.role {
                Role::Receiver => "audio-rx",
                Role::Sender => "audio-tx",
            };
            thread::Builder::new().name(name.into()).spawn(move || {
                let outcome = match config.role {
                    Role::Receiver => match chain {
                        Some(chain) => receiver_thread(&config, chain, plane, &running, &closer, &events),
                        None => Err(anyhow::anyhow!("receiver started without a DSP chain")),
                    },
                    Role::Sender => sender_thread(&config, chain, plane, &running, &closer, &events),
                };
                let event = match outcome {
                    Ok(stats) => SessionEvent::Finished(stats),
                    Err(e) => {
                        log::error!("Session error: {:#}", e);
                        SessionEvent::Failed(format!("{:#}", e))
                    }
                };
                let _ = events.blocking_send(event);
            })?
        };

        Ok(Self {
            running,
            closer,
            handle: Some(handle),
        })
    }

    /// Signal the audio thread to stop, unblock its socket and wait for it.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.closer.shutdown();
        if let Some(h) = self.handle.take() {
            if h.join().is_err() {
                log::error!("Audio thread panicked");
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop();
    }
}

// ======================== Receiver thread ========================

fn receiver_thread(
    config: &Config,
    chain: DspChain,
    plane: Arc<ControlPlane>,
    running: &AtomicBool,
    closer: &StreamCloser,
    events: &mpsc::Sender<SessionEvent>,
) -> Result<SessionStats> {
    let mut sink = AlsaPlayback::open(
        config.playback_device,
        config.sample_rate,
        config.playback_channels,
        config.playback_period_size,
    )?;

    let Some((mut stream, peer)) = net_link::accept_one(&config.listen_addr(), running)? else {
        return Ok(SessionStats::default());
    };
    closer.register(&stream)?;
    // Stop may have raced with accept
    if !running.load(Ordering::SeqCst) {
        return Ok(SessionStats::default());
    }
    let _ = events.blocking_send(SessionEvent::Connected(peer));

    let mut pipeline = ReceiverPipeline::new(config.wire_format, config.delay_frames(), chain, plane);
    let stats = pipeline.run(&mut stream, &mut sink, running)?;
    log::info!(
        "Receiver finished: received={}, played={}, muted={}",
        stats.frames_received,
        stats.frames_played,
        stats.frames_muted,
    );
    Ok(stats)
}

// ======================== Sender thread ========================

fn sender_thread(
    config: &Config,
    chain: Option<DspChain>,
    plane: Arc<ControlPlane>,
    running: &AtomicBool,
    closer: &StreamCloser,
    events: &mpsc::Sender<SessionEvent>,
) -> Result<SessionStats> {
    let mut stream = net_link::connect(&config.peer_addr())?;
    closer.register(&stream)?;
    if !running.load(Ordering::SeqCst) {
        return Ok(SessionStats::default());
    }
    if let Ok(peer) = stream.peer_addr() {
        let _ = events.blocking_send(SessionEvent::Connected(peer));
    }

    let mut source = AlsaCapture::open(
        config.capture_device,
        config.sample_rate,
        config.capture_channels,
        config.samples_per_frame,
    )?;

    let mut pipeline = SenderPipeline::new(config.wire_format, config.samples_per_frame, chain, plane);
    let stats = pipeline.run(&mut source, &mut stream, running)?;
    log::info!(
        "Sender finished: sent={}, overflows={}",
        stats.frames_sent,
        stats.overflows,
    );
    Ok(stats)
}
