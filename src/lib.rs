//! Surround-view stitching engine.
//!
//! Fuses video from four overlapping cameras into a single seamless 360°
//! panorama at video rate, as used in vehicle bird's-eye-view assist
//! systems. The heavy lifting lives in the member crates, re-exported
//! here under short names.

pub use sv_core as core;
pub use sv_imgproc as imgproc;
pub use sv_stitch as stitch;

pub use sv_stitch::SurroundStitcher;

/// Initialize a single global Rayon thread pool for all CPU-parallel routines.
///
/// Call this once at application startup before running the pipeline.
/// Repeated calls are idempotent and return the first initialization result.
///
/// Priority order:
/// 1. explicit `num_threads`
/// 2. `SURROUND_CPU_THREADS` env var
/// 3. Rayon default
pub fn init_thread_pool(num_threads: Option<usize>) -> Result<(), String> {
    sv_core::init_global_thread_pool(num_threads)
}
