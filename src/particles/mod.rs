// particles/mod.rs
// Macro-particle records, per-box particle storage and the numerical kernels

mod container;
mod particle;
pub mod push;
pub mod shape;

pub use container::*;
pub use particle::*;

#[cfg(test)]
mod tests;
