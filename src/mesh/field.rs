// mesh/field.rs
// Ghosted per-box storage and the distributed ghost-sum reduction

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{BoxArray, DistributionMap, Geometry, IndexBox};
use crate::error::{PicError, PicResult};
use crate::parallel::{Communicator, CommunicatorExt};
use crate::profile_scope;

/// Data of one box over its valid region plus a ghost halo, component-major.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldBox {
    valid: IndexBox,
    grown: IndexBox,
    ncomp: usize,
    data: Vec<f64>,
}

impl FieldBox {
    pub fn new(valid: IndexBox, ngrow: i64, ncomp: usize) -> Self {
        let grown = valid.grow(ngrow);
        Self {
            valid,
            grown,
            ncomp,
            data: vec![0.0; grown.num_cells() * ncomp],
        }
    }

    pub fn valid_box(&self) -> &IndexBox {
        &self.valid
    }

    pub fn grown_box(&self) -> &IndexBox {
        &self.grown
    }

    pub fn ncomp(&self) -> usize {
        self.ncomp
    }

    #[inline]
    fn index(&self, cell: [i64; 3], comp: usize) -> usize {
        comp * self.grown.num_cells() + self.grown.offset(cell)
    }

    #[inline]
    fn holds(&self, cell: [i64; 3], comp: usize) -> bool {
        comp < self.ncomp && self.grown.contains(cell)
    }

    /// Value at `cell`, or `None` outside the grown box or past the last component.
    #[inline]
    pub fn get(&self, cell: [i64; 3], comp: usize) -> Option<f64> {
        self.holds(cell, comp).then(|| self.data[self.index(cell, comp)])
    }

    /// Add `value` at `cell`; returns false (and drops the value) when `get`
    /// would return `None`.
    #[inline]
    pub fn add_at(&mut self, cell: [i64; 3], comp: usize, value: f64) -> bool {
        if !self.holds(cell, comp) {
            return false;
        }
        let i = self.index(cell, comp);
        self.data[i] += value;
        true
    }

    pub fn set_at(&mut self, cell: [i64; 3], comp: usize, value: f64) {
        if self.holds(cell, comp) {
            let i = self.index(cell, comp);
            self.data[i] = value;
        }
    }

    /// Set every component over the valid box grown by `ngrow`.
    pub fn set_val(&mut self, value: f64, ngrow: i64) {
        let region = match self.valid.grow(ngrow).intersect(&self.grown) {
            Some(r) => r,
            None => return,
        };
        if region == self.grown {
            self.data.iter_mut().for_each(|v| *v = value);
            return;
        }
        for comp in 0..self.ncomp {
            for cell in region.cells() {
                let i = self.index(cell, comp);
                self.data[i] = value;
            }
        }
    }

    fn zero_ghosts(&mut self) {
        for comp in 0..self.ncomp {
            for cell in self.grown.cells() {
                if !self.valid.contains(cell) {
                    let i = self.index(cell, comp);
                    self.data[i] = 0.0;
                }
            }
        }
    }

    /// Sum of one component over the valid cells.
    pub fn sum_valid(&self, comp: usize) -> f64 {
        self.valid.cells().map(|c| self.data[self.index(c, comp)]).sum()
    }

    /// Sum of one component over the ghost cells only.
    pub fn sum_ghosts(&self, comp: usize) -> f64 {
        self.grown
            .cells()
            .filter(|c| !self.valid.contains(*c))
            .map(|c| self.data[self.index(c, comp)])
            .sum()
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }
}

/// Ghost values travelling to the owner of `dst_box`, expressed in that box's index space.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct GhostPatch {
    dst_box: usize,
    region: IndexBox,
    values: Vec<f64>,
}

/// A field distributed over the boxes of one level. Each rank stores only the
/// boxes it owns.
#[derive(Clone, Debug, PartialEq)]
pub struct MeshField {
    ba: BoxArray,
    dm: DistributionMap,
    ncomp: usize,
    ngrow: i64,
    fabs: BTreeMap<usize, FieldBox>,
}

impl MeshField {
    pub fn new(ba: &BoxArray, dm: &DistributionMap, ncomp: usize, ngrow: i64, rank: usize) -> Self {
        let fabs = dm
            .local_boxes(rank)
            .map(|i| (i, FieldBox::new(*ba.get(i), ngrow, ncomp)))
            .collect();
        Self {
            ba: ba.clone(),
            dm: dm.clone(),
            ncomp,
            ngrow,
            fabs,
        }
    }

    pub fn box_array(&self) -> &BoxArray {
        &self.ba
    }

    pub fn distribution_map(&self) -> &DistributionMap {
        &self.dm
    }

    pub fn ncomp(&self) -> usize {
        self.ncomp
    }

    pub fn n_grow(&self) -> i64 {
        self.ngrow
    }

    pub fn fab(&self, i: usize) -> Option<&FieldBox> {
        self.fabs.get(&i)
    }

    pub fn fab_mut(&mut self, i: usize) -> Option<&mut FieldBox> {
        self.fabs.get_mut(&i)
    }

    /// Locally owned boxes in box-index order.
    pub fn fabs(&self) -> impl Iterator<Item = (usize, &FieldBox)> {
        self.fabs.iter().map(|(&i, f)| (i, f))
    }

    pub fn fabs_mut(&mut self) -> impl Iterator<Item = (usize, &mut FieldBox)> {
        self.fabs.iter_mut().map(|(&i, f)| (i, f))
    }

    /// Set all components over valid cells plus `ngrow` ghost layers.
    pub fn set_val(&mut self, value: f64, ngrow: i64) {
        let ngrow = ngrow.min(self.ngrow);
        self.fabs.values_mut().for_each(|f| f.set_val(value, ngrow));
    }

    /// Zero the field over its full grown extent.
    pub fn zero(&mut self) {
        self.set_val(0.0, self.ngrow);
    }

    pub fn same_layout(&self, other: &MeshField) -> bool {
        self.ba == other.ba && self.dm == other.dm && self.ncomp == other.ncomp && self.ngrow == other.ngrow
    }

    /// Element-wise `self += other`, ghosts included.
    pub fn add(&mut self, other: &MeshField) -> PicResult<()> {
        if !self.same_layout(other) {
            return Err(PicError::IncompatibleField(
                "cannot add fields with different layouts".to_string(),
            ));
        }
        for (i, fab) in self.fabs.iter_mut() {
            if let Some(src) = other.fabs.get(i) {
                fab.data.iter_mut().zip(&src.data).for_each(|(a, b)| *a += b);
            }
        }
        Ok(())
    }

    /// Sum ghost contributions into the valid cells that own them.
    ///
    /// Every ghost cell that overlaps a valid cell of some box, directly or
    /// through a periodic image, is added into that cell exactly once, across
    /// ranks. Ghost cells are zero afterwards, so a second call leaves the
    /// valid data unchanged. Patches are applied in (source rank, source box,
    /// shift) order.
    pub fn sum_boundary(&mut self, geom: &Geometry, comm: &dyn Communicator) -> PicResult<()> {
        profile_scope!("sum_boundary");
        let mut outgoing: Vec<Vec<GhostPatch>> = vec![Vec::new(); comm.size()];

        for (&i, fab) in &self.fabs {
            for s in geom.periodic_shifts(&fab.grown) {
                let shifted = fab.grown.shift(s);
                for (j, bj) in self.ba.iter().enumerate() {
                    if j == i && s == [0, 0, 0] {
                        continue;
                    }
                    let region = match shifted.intersect(bj) {
                        Some(r) => r,
                        None => continue,
                    };
                    let mut values = Vec::with_capacity(region.num_cells() * self.ncomp);
                    for comp in 0..self.ncomp {
                        for cell in region.cells() {
                            let src = [cell[0] - s[0], cell[1] - s[1], cell[2] - s[2]];
                            values.push(fab.data[fab.index(src, comp)]);
                        }
                    }
                    outgoing[self.dm.owner(j)].push(GhostPatch { dst_box: j, region, values });
                }
            }
        }

        let incoming = comm.exchange(outgoing)?;

        self.fabs.values_mut().for_each(FieldBox::zero_ghosts);

        for patch in incoming {
            let fab = self.fabs.get_mut(&patch.dst_box).ok_or_else(|| PicError::Collective {
                op: "sum_boundary",
                detail: format!("received a patch for box {} which is not local", patch.dst_box),
            })?;
            let n = patch.region.num_cells();
            for comp in 0..self.ncomp {
                for (k, cell) in patch.region.cells().enumerate() {
                    let idx = fab.index(cell, comp);
                    fab.data[idx] += patch.values[comp * n + k];
                }
            }
        }
        Ok(())
    }

    /// Global sum of one component over valid cells.
    pub fn sum_valid(&self, comp: usize, comm: &dyn Communicator) -> PicResult<f64> {
        let mut total = [self.fabs.values().map(|f| f.sum_valid(comp)).sum::<f64>()];
        comm.all_reduce_sum_f64(&mut total)?;
        Ok(total[0])
    }

    /// Value at a valid cell owned by this rank.
    pub fn value_at(&self, cell: [i64; 3], comp: usize) -> Option<f64> {
        self.fabs
            .values()
            .find(|f| f.valid.contains(cell))
            .and_then(|f| f.get(cell, comp))
    }
}
