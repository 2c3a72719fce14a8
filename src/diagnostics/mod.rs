// diagnostics/mod.rs
// Boosted-frame slice extraction types and the lab-frame snapshot writer

mod lab_frame;

pub use lab_frame::*;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::units::{beta_from_gamma, lorentz_factor, SPEED_OF_LIGHT};

/// A moving spacetime slice between two consecutive boosted-frame steps.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SliceRequest {
    /// Axis along which the frame is boosted.
    pub direction: usize,
    /// Slice position at `t_boost - dt`.
    pub z_old: f64,
    /// Slice position at `t_boost`.
    pub z_new: f64,
    pub t_boost: f64,
    pub dt: f64,
    pub gamma_boost: f64,
}

impl SliceRequest {
    /// Fraction of the step at which a particle moving from `zp_old` to `zp_new`
    /// meets the slice, if it does.
    ///
    /// A particle lying exactly on the slice counts as downstream, so when
    /// consecutive requests share end-points a crossing falls into exactly one
    /// of them.
    pub fn crossing_fraction(&self, zp_old: f64, zp_new: f64) -> Option<f64> {
        let d_old = zp_old - self.z_old;
        let d_new = zp_new - self.z_new;
        if (d_old < 0.0) == (d_new < 0.0) {
            return None;
        }
        Some(d_old / (d_old - d_new))
    }

    /// Lorentz transform of a boosted-frame event `(t, z)` and momentum `u`
    /// to the lab frame, along `direction`.
    pub fn to_lab(&self, t: f64, pos: [f64; 3], mom: [f64; 3]) -> (f64, [f64; 3], [f64; 3]) {
        let d = self.direction;
        let gamma = self.gamma_boost.max(1.0);
        let beta = beta_from_gamma(gamma);
        let mut pos_lab = pos;
        let mut mom_lab = mom;
        pos_lab[d] = gamma * (pos[d] + beta * SPEED_OF_LIGHT * t);
        let t_lab = gamma * (t + beta * pos[d] / SPEED_OF_LIGHT);
        mom_lab[d] = gamma * (mom[d] + beta * SPEED_OF_LIGHT * lorentz_factor(mom));
        (t_lab, pos_lab, mom_lab)
    }
}

/// Lab-frame particle data of one destination group, struct-of-arrays.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SliceParticles {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub z: Vec<f64>,
    pub ux: Vec<f64>,
    pub uy: Vec<f64>,
    pub uz: Vec<f64>,
    pub w: Vec<f64>,
    pub t_lab: Vec<f64>,
    pub id: Vec<u64>,
}

impl SliceParticles {
    pub fn push(&mut self, t_lab: f64, pos: [f64; 3], mom: [f64; 3], weight: f64, id: u64) {
        self.x.push(pos[0]);
        self.y.push(pos[1]);
        self.z.push(pos[2]);
        self.ux.push(mom[0]);
        self.uy.push(mom[1]);
        self.uz.push(mom[2]);
        self.w.push(weight);
        self.t_lab.push(t_lab);
        self.id.push(id);
    }

    pub fn len(&self) -> usize {
        self.id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id.is_empty()
    }

    pub fn append(&mut self, other: &mut SliceParticles) {
        self.x.append(&mut other.x);
        self.y.append(&mut other.y);
        self.z.append(&mut other.z);
        self.ux.append(&mut other.ux);
        self.uy.append(&mut other.uy);
        self.uz.append(&mut other.uz);
        self.w.append(&mut other.w);
        self.t_lab.append(&mut other.t_lab);
        self.id.append(&mut other.id);
    }
}

/// Destination key of a slice group: (level, box index).
pub type SliceKey = (usize, usize);

/// Selected particles of one species grouped by destination box.
pub type DiagnosticParticles = BTreeMap<SliceKey, SliceParticles>;

/// Number of particles across all groups.
pub fn total_selected(slice: &DiagnosticParticles) -> usize {
    slice.values().map(SliceParticles::len).sum()
}
