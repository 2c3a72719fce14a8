//! Physical constants used by the pushers, the deposition helpers and the
//! lab-frame transform.
//!
//! Everything is SI:
//! - Length: metre
//! - Time: second
//! - Charge: coulomb
//! - Mass: kilogram
//!
//! Particle momenta are stored as `u = gamma * v` (m/s), so the relativistic
//! factor of a record is `sqrt(1 + |u|^2 / c^2)`.

/// Speed of light in vacuum (m/s).
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;
/// Elementary charge in coulombs.
pub const ELEMENTARY_CHARGE: f64 = 1.602_176_634e-19;
/// Electron rest mass in kilograms.
pub const ELECTRON_MASS: f64 = 9.109_383_701_5e-31;
/// Proton rest mass in kilograms.
pub const PROTON_MASS: f64 = 1.672_621_923_69e-27;
/// Vacuum permittivity (F/m).
pub const EPSILON_0: f64 = 8.854_187_812_8e-12;

const INV_C2: f64 = 1.0 / (SPEED_OF_LIGHT * SPEED_OF_LIGHT);

/// Lorentz factor of a particle with momentum `u = gamma * v`.
#[inline]
pub fn lorentz_factor(u: [f64; 3]) -> f64 {
    (1.0 + (u[0] * u[0] + u[1] * u[1] + u[2] * u[2]) * INV_C2).sqrt()
}

/// Velocity of a particle with momentum `u = gamma * v`.
#[inline]
pub fn velocity(u: [f64; 3]) -> [f64; 3] {
    let inv_gamma = 1.0 / lorentz_factor(u);
    [u[0] * inv_gamma, u[1] * inv_gamma, u[2] * inv_gamma]
}

/// Normalized boost velocity for a frame moving with `gamma_boost`.
#[inline]
pub fn beta_from_gamma(gamma_boost: f64) -> f64 {
    if gamma_boost <= 1.0 {
        0.0
    } else {
        (1.0 - 1.0 / (gamma_boost * gamma_boost)).sqrt()
    }
}
