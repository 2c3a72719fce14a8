pub mod config;
pub mod diagnostics;
pub mod error;
pub mod mesh;
pub mod multi_species;
pub mod parallel;
pub mod particles;
pub mod profiler;
pub mod simulation;
pub mod species;
pub mod units;

pub use error::{PicError, PicResult};
pub use multi_species::MultiSpecies;

#[cfg(feature = "profiling")]
use once_cell::sync::Lazy;
#[cfg(feature = "profiling")]
use parking_lot::Mutex;

#[cfg(feature = "profiling")]
pub static PROFILER: Lazy<Mutex<profiler::Profiler>> =
    Lazy::new(|| Mutex::new(profiler::Profiler::new()));
