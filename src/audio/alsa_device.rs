//! ALSA PCM device wrappers for capture and playback.

use alsa::pcm::{Access, Format, HwParams, PCM};
use alsa::{Direction, ValueOr};
use anyhow::{bail, Context, Result};

/// What the hardware actually agreed to. The rate always equals the
/// requested one; channel count and period may differ.
#[derive(Debug, Clone, Copy)]
pub struct AlsaParams {
    pub sample_rate: u32,
    pub channels: u32,
    pub period_size: usize,
}

/// Open a PCM device for capture.
pub fn open_capture(
    device: &str,
    sample_rate: u32,
    channels: u32,
    period_size: usize,
) -> Result<(PCM, AlsaParams)> {
    open_pcm(device, Direction::Capture, sample_rate, channels, Some(period_size))
}

/// Open a PCM device for playback. `period_size == 0` lets ALSA decide.
pub fn open_playback(
    device: &str,
    sample_rate: u32,
    channels: u32,
    period_size: usize,
) -> Result<(PCM, AlsaParams)> {
    let period = (period_size > 0).then_some(period_size);
    open_pcm(device, Direction::Playback, sample_rate, channels, period)
}

fn open_pcm(
    device: &str,
    direction: Direction,
    sample_rate: u32,
    channels: u32,
    period_size: Option<usize>,
) -> Result<(PCM, AlsaParams)> {
    let dir_name = match direction {
        Direction::Capture => "Capture",
        Direction::Playback => "Playback",
    };

    let pcm = PCM::new(device, direction, false)
        .with_context(|| format!("Failed to open PCM device '{}' for {}", device, dir_name))?;

    {
        let hwp = HwParams::any(&pcm).context("Failed to initialize HwParams")?;
        hwp.set_access(Access::RWInterleaved)?;
        hwp.set_format(Format::S16LE)?;
        hwp.set_channels(channels)
            .with_context(|| format!("{} device '{}' rejects {} channel(s)", dir_name, device, channels))?;
        hwp.set_rate_near(sample_rate, ValueOr::Nearest)?;
        if let Some(ps) = period_size {
            hwp.set_period_size_near(ps as alsa::pcm::Frames, ValueOr::Nearest)?;
        }
        pcm.hw_params(&hwp)?;
    }

    let (actual_rate, actual_channels, actual_period) = {
        let hwp = pcm.hw_params_current()?;
        (hwp.get_rate()?, hwp.get_channels()?, hwp.get_period_size()? as usize)
    };

    // The wire carries no rate information, so resampling silently would
    // change pitch on the far end. Refuse instead.
    if actual_rate != sample_rate {
        bail!(
            "{} device '{}' runs at {}Hz, configured rate is {}Hz",
            dir_name,
            device,
            actual_rate,
            sample_rate
        );
    }

    let params = AlsaParams {
        sample_rate: actual_rate,
        channels: actual_channels,
        period_size: actual_period,
    };
    log::info!(
        "ALSA {}: device={}, rate={}, channels={}, period_size={}",
        dir_name,
        device,
        params.sample_rate,
        params.channels,
        params.period_size,
    );

    Ok((pcm, params))
}
