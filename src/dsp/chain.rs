use super::denoiser::{Denoiser, RnNoise};
use super::hpf::HighPassFilter;
use super::{saturate, DspError, Mode};

/// Mode-driven processing chain: HPF, then RNNoise with wet/dry mix.
///
/// Owns the filter state and the denoiser for the whole session. In RAW mode
/// neither is touched, so switching back to HPF/RNN continues from where they
/// left off. A chain built without a denoiser skips the RNN stage: RNN then
/// plays the dry signal and BOTH behaves like HPF.
pub struct DspChain {
    samples_per_frame: usize,
    hpf: HighPassFilter,
    denoiser: Option<Box<dyn Denoiser>>,
    warned_no_denoiser: bool,
    // Scratch buffers, sized once
    input: Vec<f64>,
    dry: Vec<f64>,
    sub_in: Vec<f32>,
    sub_out: Vec<f32>,
}

impl DspChain {
    /// Build a chain around an already constructed denoiser.
    ///
    /// Fails if `samples_per_frame` cannot be split into whole denoiser frames.
    pub fn new(
        sample_rate: u32,
        samples_per_frame: usize,
        cutoff_hz: f64,
        denoiser: Box<dyn Denoiser>,
    ) -> Result<Self, DspError> {
        let native = denoiser.frame_size();
        if native == 0 || samples_per_frame % native != 0 {
            return Err(DspError::UnalignedFrame {
                len: samples_per_frame,
                native,
            });
        }
        Ok(Self::build(sample_rate, samples_per_frame, cutoff_hz, Some(denoiser)))
    }

    /// HPF-only chain, any frame size and sample rate.
    pub fn without_denoiser(sample_rate: u32, samples_per_frame: usize, cutoff_hz: f64) -> Self {
        Self::build(sample_rate, samples_per_frame, cutoff_hz, None)
    }

    fn build(
        sample_rate: u32,
        samples_per_frame: usize,
        cutoff_hz: f64,
        denoiser: Option<Box<dyn Denoiser>>,
    ) -> Self {
        let hpf = HighPassFilter::new(sample_rate as f64, cutoff_hz);
        let native = denoiser.as_ref().map_or(0, |d| d.frame_size());
        match native {
            0 => log::info!(
                "DSP chain: rate={}, frame={}, cutoff={}Hz, no denoiser",
                hpf.sample_rate(),
                samples_per_frame,
                hpf.cutoff(),
            ),
            n => log::info!(
                "DSP chain: rate={}, frame={}, cutoff={}Hz, denoiser sub-frames={}",
                hpf.sample_rate(),
                samples_per_frame,
                hpf.cutoff(),
                samples_per_frame / n,
            ),
        }

        Self {
            samples_per_frame,
            hpf,
            denoiser,
            warned_no_denoiser: false,
            input: Vec::with_capacity(samples_per_frame),
            dry: Vec::with_capacity(samples_per_frame),
            sub_in: vec![0.0; native],
            sub_out: vec![0.0; native],
        }
    }

    /// Load RNNoise from the first loadable candidate and build the chain.
    pub fn with_rnnoise(
        sample_rate: u32,
        samples_per_frame: usize,
        cutoff_hz: f64,
        libraries: &[&str],
    ) -> Result<Self, DspError> {
        let denoiser = RnNoise::open(libraries)?;
        Self::new(sample_rate, samples_per_frame, cutoff_hz, Box::new(denoiser))
    }

    pub fn samples_per_frame(&self) -> usize {
        self.samples_per_frame
    }

    pub fn has_denoiser(&self) -> bool {
        self.denoiser.is_some()
    }

    /// Process one frame. `mix` is clamped to [0, 1]; 0 keeps the dry
    /// (pre-denoiser) signal, 1 keeps the denoiser output.
    pub fn process(
        &mut self,
        mut frame: Vec<i16>,
        mode: Mode,
        mix: f32,
    ) -> Result<Vec<i16>, DspError> {
        if mode == Mode::Raw {
            return Ok(frame);
        }

        self.input.clear();
        self.input.extend(frame.iter().map(|&s| s as f64));

        self.dry.clear();
        if mode.uses_hpf() {
            self.dry.resize(frame.len(), 0.0);
            self.hpf.process(&self.input, &mut self.dry);
        } else {
            self.dry.extend_from_slice(&self.input);
        }

        let denoiser = match self.denoiser.as_mut() {
            Some(denoiser) if mode.uses_denoiser() => denoiser,
            _ => {
                if mode.uses_denoiser() && !self.warned_no_denoiser {
                    self.warned_no_denoiser = true;
                    log::warn!("{} selected but no denoiser is loaded, playing the dry signal", mode);
                }
                for (out, &y) in frame.iter_mut().zip(&self.dry) {
                    *out = saturate(y);
                }
                return Ok(frame);
            }
        };

        let native = denoiser.frame_size();
        if frame.len() % native != 0 {
            return Err(DspError::UnalignedFrame {
                len: frame.len(),
                native,
            });
        }

        let mix = (mix as f64).clamp(0.0, 1.0);
        for (dry, out) in self.dry.chunks(native).zip(frame.chunks_mut(native)) {
            for (d, x) in dry.iter().zip(self.sub_in.iter_mut()) {
                *x = *d as f32;
            }
            denoiser.process_frame(&self.sub_in, &mut self.sub_out)?;
            for ((o, &d), &w) in out.iter_mut().zip(dry).zip(&self.sub_out) {
                *o = saturate((1.0 - mix) * d + mix * w as f64);
            }
        }

        Ok(frame)
    }
}
