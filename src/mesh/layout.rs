// mesh/layout.rs
// Level geometry, box decomposition and box-to-rank ownership

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::IndexBox;
use crate::config::MeshConfig;
use crate::error::{PicError, PicResult};

/// Refinement ratio between consecutive levels.
pub const REFINEMENT_RATIO: i64 = 2;

/// Physical extent, cell index space and periodicity of one level.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    pub domain: IndexBox,
    pub prob_lo: [f64; 3],
    pub prob_hi: [f64; 3],
    pub periodic: [bool; 3],
}

impl Geometry {
    pub fn new(domain: IndexBox, prob_lo: [f64; 3], prob_hi: [f64; 3], periodic: [bool; 3]) -> Self {
        Self { domain, prob_lo, prob_hi, periodic }
    }

    pub fn cell_size(&self) -> [f64; 3] {
        let n = self.domain.size();
        [
            (self.prob_hi[0] - self.prob_lo[0]) / n[0] as f64,
            (self.prob_hi[1] - self.prob_lo[1]) / n[1] as f64,
            (self.prob_hi[2] - self.prob_lo[2]) / n[2] as f64,
        ]
    }

    pub fn cell_volume(&self) -> f64 {
        let dx = self.cell_size();
        dx[0] * dx[1] * dx[2]
    }

    /// Index of the cell containing `pos`. Positions outside the domain map to
    /// cells outside `domain`.
    pub fn cell_index(&self, pos: [f64; 3]) -> [i64; 3] {
        let dx = self.cell_size();
        let mut cell = [0i64; 3];
        for d in 0..3 {
            cell[d] = self.domain.lo[d] + ((pos[d] - self.prob_lo[d]) / dx[d]).floor() as i64;
        }
        cell
    }

    /// Physical coordinate of the lower corner of `cell`.
    pub fn cell_lo(&self, cell: [i64; 3]) -> [f64; 3] {
        let dx = self.cell_size();
        let mut x = [0.0; 3];
        for d in 0..3 {
            x[d] = self.prob_lo[d] + (cell[d] - self.domain.lo[d]) as f64 * dx[d];
        }
        x
    }

    /// Shifts (multiples of the domain length along periodic axes, zero
    /// included) under which `bx` overlaps the domain.
    pub fn periodic_shifts(&self, bx: &IndexBox) -> SmallVec<[[i64; 3]; 8]> {
        let len = self.domain.size();
        // Smallest and largest k with bx + k * len meeting the domain.
        let range = |d: usize| {
            if !self.periodic[d] {
                return 0..=0;
            }
            let k_lo = -(bx.hi[d] - self.domain.lo[d]).div_euclid(len[d]);
            let k_hi = (self.domain.hi[d] - bx.lo[d]).div_euclid(len[d]);
            k_lo..=k_hi
        };
        let mut shifts = SmallVec::new();
        for kz in range(2) {
            for ky in range(1) {
                for kx in range(0) {
                    let s = [kx * len[0], ky * len[1], kz * len[2]];
                    if bx.shift(s).intersect(&self.domain).is_some() {
                        shifts.push(s);
                    }
                }
            }
        }
        shifts
    }

    /// Wrap `pos` back into the domain along periodic axes.
    pub fn wrap_position(&self, pos: &mut [f64; 3]) {
        for d in 0..3 {
            if !self.periodic[d] {
                continue;
            }
            let len = self.prob_hi[d] - self.prob_lo[d];
            if pos[d] < self.prob_lo[d] || pos[d] >= self.prob_hi[d] {
                pos[d] = self.prob_lo[d] + (pos[d] - self.prob_lo[d]).rem_euclid(len);
                // rem_euclid can round up to exactly `len`
                if pos[d] >= self.prob_hi[d] {
                    pos[d] = self.prob_lo[d];
                }
            }
        }
    }

    /// Axis-by-axis test against the physical bounds, ignoring periodic axes.
    pub fn outside_axes(&self, pos: [f64; 3]) -> [bool; 3] {
        let mut out = [false; 3];
        for d in 0..3 {
            out[d] = !self.periodic[d] && (pos[d] < self.prob_lo[d] || pos[d] >= self.prob_hi[d]);
        }
        out
    }

    pub fn refine(&self, ratio: i64) -> Self {
        Self::new(self.domain.refine(ratio), self.prob_lo, self.prob_hi, self.periodic)
    }
}

/// The boxes that tile one level.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoxArray {
    boxes: Vec<IndexBox>,
}

impl BoxArray {
    pub fn new(boxes: Vec<IndexBox>) -> Self {
        Self { boxes }
    }

    /// Chop `region` into boxes of at most `max_grid_size` cells per axis.
    pub fn chopped(region: &IndexBox, max_grid_size: i64) -> Self {
        Self::new(region.chop(max_grid_size))
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    pub fn get(&self, i: usize) -> &IndexBox {
        &self.boxes[i]
    }

    pub fn iter(&self) -> impl Iterator<Item = &IndexBox> {
        self.boxes.iter()
    }

    /// Index of the box whose valid region holds `cell`.
    pub fn find(&self, cell: [i64; 3]) -> Option<usize> {
        self.boxes.iter().position(|b| b.contains(cell))
    }

    pub fn num_cells(&self) -> usize {
        self.boxes.iter().map(IndexBox::num_cells).sum()
    }
}

/// Box index -> owning rank.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionMap {
    owners: Vec<usize>,
}

impl DistributionMap {
    pub fn new(owners: Vec<usize>) -> Self {
        Self { owners }
    }

    pub fn round_robin(nboxes: usize, nranks: usize) -> Self {
        let nranks = nranks.max(1);
        Self::new((0..nboxes).map(|i| i % nranks).collect())
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    pub fn owner(&self, i: usize) -> usize {
        self.owners[i]
    }

    pub fn local_boxes(&self, rank: usize) -> impl Iterator<Item = usize> + '_ {
        self.owners
            .iter()
            .enumerate()
            .filter(move |(_, &r)| r == rank)
            .map(|(i, _)| i)
    }
}

/// Geometry, boxes and ownership of one refinement level.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LevelLayout {
    pub geom: Geometry,
    pub ba: BoxArray,
    pub dm: DistributionMap,
}

impl LevelLayout {
    pub fn new(geom: Geometry, ba: BoxArray, dm: DistributionMap) -> PicResult<Self> {
        if ba.len() != dm.len() {
            return Err(PicError::Config(format!(
                "box array has {} boxes but distribution map has {}",
                ba.len(),
                dm.len()
            )));
        }
        for b in ba.iter() {
            if !geom.domain.contains_box(b) {
                return Err(PicError::Config(format!("box {:?} lies outside {:?}", b, geom.domain)));
            }
        }
        Ok(Self { geom, ba, dm })
    }
}

/// Build every level described by `mesh`, distributing boxes over `nranks`.
pub fn build_levels(mesh: &MeshConfig, nranks: usize) -> PicResult<Vec<LevelLayout>> {
    if mesh.n_cell.iter().any(|&n| n <= 0) {
        return Err(PicError::Config(format!("mesh.n_cell must be positive, got {:?}", mesh.n_cell)));
    }
    if (0..3).any(|d| mesh.prob_hi[d] <= mesh.prob_lo[d]) {
        return Err(PicError::Config("mesh.prob_hi must exceed mesh.prob_lo".to_string()));
    }
    if mesh.ngrow < 1 {
        return Err(PicError::Config(format!("mesh.ngrow must be at least 1, got {}", mesh.ngrow)));
    }

    let domain = IndexBox::from_size(mesh.n_cell);
    let geom = Geometry::new(domain, mesh.prob_lo, mesh.prob_hi, mesh.periodic);
    let ba = BoxArray::chopped(&domain, mesh.max_grid_size);
    let dm = DistributionMap::round_robin(ba.len(), nranks);
    let mut levels = vec![LevelLayout::new(geom, ba, dm)?];

    for region in &mesh.refined_regions {
        let coarse = levels[levels.len() - 1].geom.clone();
        let patch = IndexBox::new(region.lo, region.hi);
        if patch.is_empty() || !coarse.domain.contains_box(&patch) {
            return Err(PicError::Config(format!("refined region {:?} is not inside {:?}", patch, coarse.domain)));
        }
        let geom = coarse.refine(REFINEMENT_RATIO);
        let ba = BoxArray::chopped(&patch.refine(REFINEMENT_RATIO), mesh.max_grid_size);
        let dm = DistributionMap::round_robin(ba.len(), nranks);
        levels.push(LevelLayout::new(geom, ba, dm)?);
    }
    Ok(levels)
}
