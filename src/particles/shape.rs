// particles/shape.rs
// Cloud-in-cell weights on cell-centered data

use crate::mesh::{FieldBox, Geometry};

/// Cells a stencil reaches past the cell holding the particle.
pub const STENCIL_REACH: i64 = 1;

/// The 2x2x2 cells a particle touches and the linear weight of each.
#[derive(Clone, Copy, Debug)]
pub struct CicStencil {
    pub base: [i64; 3],
    pub w: [[f64; 2]; 3],
}

impl CicStencil {
    pub fn new(pos: [f64; 3], geom: &Geometry) -> Self {
        let dx = geom.cell_size();
        let mut base = [0i64; 3];
        let mut w = [[0.0; 2]; 3];
        for d in 0..3 {
            // distance from the first cell center, in cells
            let xi = (pos[d] - geom.prob_lo[d]) / dx[d] - 0.5;
            let i0 = xi.floor();
            let frac = xi - i0;
            base[d] = geom.domain.lo[d] + i0 as i64;
            w[d] = [1.0 - frac, frac];
        }
        Self { base, w }
    }

    /// Visit each of the eight cells with its weight.
    #[inline]
    pub fn for_each(&self, mut f: impl FnMut([i64; 3], f64)) {
        for k in 0..2 {
            for j in 0..2 {
                for i in 0..2 {
                    let weight = self.w[0][i] * self.w[1][j] * self.w[2][k];
                    f(
                        [self.base[0] + i as i64, self.base[1] + j as i64, self.base[2] + k as i64],
                        weight,
                    );
                }
            }
        }
    }

    /// Interpolate the first three components of `fab`.
    pub fn gather3(&self, fab: &FieldBox) -> [f64; 3] {
        let mut out = [0.0; 3];
        self.for_each(|cell, weight| {
            for (comp, o) in out.iter_mut().enumerate() {
                *o += weight * fab.get(cell, comp).unwrap_or(0.0);
            }
        });
        out
    }

    /// Spread `values[c]` into component `first_comp + c`. Returns the number of
    /// stencil points that fell outside the grown box.
    pub fn deposit(&self, fab: &mut FieldBox, first_comp: usize, values: &[f64]) -> usize {
        let mut dropped = 0;
        self.for_each(|cell, weight| {
            for (c, v) in values.iter().enumerate() {
                if !fab.add_at(cell, first_comp + c, weight * v) {
                    dropped += 1;
                }
            }
        });
        dropped
    }
}
