// simulation/mod.rs
// Re-exports and module declarations for the time-stepping driver

mod driver;
pub use driver::*;
