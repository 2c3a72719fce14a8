// particles/push.rs
// Momentum and position integrators

use ultraviolet::DVec3;

use crate::units::{lorentz_factor, SPEED_OF_LIGHT};

#[inline]
fn v3(a: [f64; 3]) -> DVec3 {
    DVec3::new(a[0], a[1], a[2])
}

#[inline]
fn arr(v: DVec3) -> [f64; 3] {
    [v.x, v.y, v.z]
}

/// Relativistic Boris rotation for `u = gamma * v`.
pub fn push_momentum_boris(mom: [f64; 3], e: [f64; 3], b: [f64; 3], charge: f64, mass: f64, dt: f64) -> [f64; 3] {
    let qmt = charge * dt / (2.0 * mass);
    let e = v3(e);
    let u_minus = v3(mom) + e * qmt;
    let gamma = lorentz_factor(arr(u_minus));
    let t = v3(b) * (qmt / gamma);
    let s = t * (2.0 / (1.0 + t.mag_sq()));
    let u_prime = u_minus + u_minus.cross(t);
    let u_plus = u_minus + u_prime.cross(s);
    arr(u_plus + e * qmt)
}

/// Electric-field-only momentum update.
pub fn push_momentum_es(mom: [f64; 3], e: [f64; 3], charge: f64, mass: f64, dt: f64) -> [f64; 3] {
    arr(v3(mom) + v3(e) * (charge * dt / mass))
}

/// Advance `pos` by `v * dt`.
pub fn push_position(pos: &mut [f64; 3], mom: [f64; 3], dt: f64) {
    let inv_gamma = 1.0 / lorentz_factor(mom);
    for d in 0..3 {
        pos[d] += mom[d] * inv_gamma * dt;
    }
}

/// Largest stable step for a cell of size `dx` at Courant number `cfl`.
pub fn courant_dt(dx: [f64; 3], cfl: f64) -> f64 {
    let inv = dx.iter().map(|h| 1.0 / (h * h)).sum::<f64>().sqrt();
    cfl / (SPEED_OF_LIGHT * inv)
}
