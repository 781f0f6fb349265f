//! Safe wrapper around RNNoise, loaded from the shared library at runtime.

use std::ffi::{c_int, c_void};

use libloading::Library;

use super::{DspError, NATIVE_FRAME_SIZE};

/// A fixed-frame-size denoiser.
///
/// `&mut self` keeps at most one call in flight per instance.
pub trait Denoiser: Send {
    /// Number of samples accepted per call.
    fn frame_size(&self) -> usize;

    /// Denoise exactly `frame_size()` samples from `input` into `output`.
    /// Samples are in the i16 range. Returns the voice probability.
    fn process_frame(&mut self, input: &[f32], output: &mut [f32]) -> Result<f32, DspError>;
}

// ======================== FFI declarations ========================

/// Opaque type for DenoiseState
#[repr(C)]
pub struct DenoiseState {
    _private: [u8; 0],
}

type RnCreateFn = unsafe extern "C" fn(model: *mut c_void) -> *mut DenoiseState;
type RnDestroyFn = unsafe extern "C" fn(st: *mut DenoiseState);
type RnProcessFrameFn =
    unsafe extern "C" fn(st: *mut DenoiseState, out: *mut f32, input: *const f32) -> f32;
type RnGetFrameSizeFn = unsafe extern "C" fn() -> c_int;

// ======================== RNNoise ========================

/// Owned RNNoise state. Created once per session, destroyed on drop.
pub struct RnNoise {
    state: *mut DenoiseState,
    destroy: RnDestroyFn,
    process: RnProcessFrameFn,
    frame_size: usize,
    // Must outlive the function pointers above.
    _library: Library,
}

// DenoiseState is only touched from the audio thread that owns the chain
unsafe impl Send for RnNoise {}

impl RnNoise {
    /// Load the first library from `candidates` that opens and create a state.
    pub fn open(candidates: &[&str]) -> Result<Self, DspError> {
        let mut last_err = String::from("no candidates given");
        for name in candidates {
            match unsafe { Library::new(name) } {
                Ok(library) => {
                    log::info!("RNNoise: loaded {}", name);
                    return Self::from_library(library);
                }
                Err(e) => {
                    log::debug!("RNNoise: {} not loadable: {}", name, e);
                    last_err = e.to_string();
                }
            }
        }
        Err(DspError::LibraryUnavailable {
            tried: candidates.join(", "),
            reason: last_err,
        })
    }

    fn from_library(library: Library) -> Result<Self, DspError> {
        let (create, destroy, process, get_frame_size) = unsafe {
            let create: RnCreateFn = *library
                .get::<RnCreateFn>(b"rnnoise_create\0")
                .map_err(|_| DspError::MissingSymbol("rnnoise_create"))?;
            let destroy: RnDestroyFn = *library
                .get::<RnDestroyFn>(b"rnnoise_destroy\0")
                .map_err(|_| DspError::MissingSymbol("rnnoise_destroy"))?;
            let process: RnProcessFrameFn = *library
                .get::<RnProcessFrameFn>(b"rnnoise_process_frame\0")
                .map_err(|_| DspError::MissingSymbol("rnnoise_process_frame"))?;
            // Older builds do not export this one; they are always 480.
            let get_frame_size: Option<RnGetFrameSizeFn> = library
                .get::<RnGetFrameSizeFn>(b"rnnoise_get_frame_size\0")
                .ok()
                .map(|sym| *sym);
            (create, destroy, process, get_frame_size)
        };

        let frame_size = match get_frame_size {
            Some(f) => (unsafe { f() }) as usize,
            None => NATIVE_FRAME_SIZE,
        };
        if frame_size != NATIVE_FRAME_SIZE {
            return Err(DspError::NativeFrameSize {
                expected: NATIVE_FRAME_SIZE,
                actual: frame_size,
            });
        }

        // NULL selects the built-in model
        let state = unsafe { create(std::ptr::null_mut()) };
        if state.is_null() {
            return Err(DspError::CreateFailed);
        }

        Ok(Self {
            state,
            destroy,
            process,
            frame_size,
            _library: library,
        })
    }
}

impl Denoiser for RnNoise {
    fn frame_size(&self) -> usize {
        self.frame_size
    }

    fn process_frame(&mut self, input: &[f32], output: &mut [f32]) -> Result<f32, DspError> {
        if input.len() != self.frame_size || output.len() != self.frame_size {
            return Err(DspError::UnalignedFrame {
                len: input.len(),
                native: self.frame_size,
            });
        }
        let vad = unsafe { (self.process)(self.state, output.as_mut_ptr(), input.as_ptr()) };
        if vad.is_nan() {
            return Err(DspError::ProcessFailed);
        }
        Ok(vad)
    }
}

impl Drop for RnNoise {
    fn drop(&mut self) {
        unsafe {
            (self.destroy)(self.state);
        }
        log::debug!("RNNoise state destroyed");
    }
}
