use serde::{Deserialize, Serialize};

/// A cell-centered box of cells with inclusive bounds `lo..=hi` on each axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexBox {
    pub lo: [i64; 3],
    pub hi: [i64; 3],
}

impl IndexBox {
    pub fn new(lo: [i64; 3], hi: [i64; 3]) -> Self {
        Self { lo, hi }
    }

    /// Box of `n` cells per axis starting at the origin.
    pub fn from_size(n: [i64; 3]) -> Self {
        Self::new([0, 0, 0], [n[0] - 1, n[1] - 1, n[2] - 1])
    }

    pub fn is_empty(&self) -> bool {
        (0..3).any(|d| self.hi[d] < self.lo[d])
    }

    pub fn size(&self) -> [i64; 3] {
        [
            self.hi[0] - self.lo[0] + 1,
            self.hi[1] - self.lo[1] + 1,
            self.hi[2] - self.lo[2] + 1,
        ]
    }

    pub fn num_cells(&self) -> usize {
        if self.is_empty() {
            return 0;
        }
        let s = self.size();
        (s[0] * s[1] * s[2]) as usize
    }

    pub fn contains(&self, cell: [i64; 3]) -> bool {
        (0..3).all(|d| cell[d] >= self.lo[d] && cell[d] <= self.hi[d])
    }

    pub fn contains_box(&self, other: &IndexBox) -> bool {
        other.is_empty() || (self.contains(other.lo) && self.contains(other.hi))
    }

    pub fn grow(&self, n: i64) -> Self {
        Self::new(
            [self.lo[0] - n, self.lo[1] - n, self.lo[2] - n],
            [self.hi[0] + n, self.hi[1] + n, self.hi[2] + n],
        )
    }

    pub fn shift(&self, s: [i64; 3]) -> Self {
        Self::new(
            [self.lo[0] + s[0], self.lo[1] + s[1], self.lo[2] + s[2]],
            [self.hi[0] + s[0], self.hi[1] + s[1], self.hi[2] + s[2]],
        )
    }

    pub fn intersect(&self, other: &IndexBox) -> Option<IndexBox> {
        let b = Self::new(
            [
                self.lo[0].max(other.lo[0]),
                self.lo[1].max(other.lo[1]),
                self.lo[2].max(other.lo[2]),
            ],
            [
                self.hi[0].min(other.hi[0]),
                self.hi[1].min(other.hi[1]),
                self.hi[2].min(other.hi[2]),
            ],
        );
        (!b.is_empty()).then_some(b)
    }

    pub fn refine(&self, ratio: i64) -> Self {
        Self::new(
            [self.lo[0] * ratio, self.lo[1] * ratio, self.lo[2] * ratio],
            [
                (self.hi[0] + 1) * ratio - 1,
                (self.hi[1] + 1) * ratio - 1,
                (self.hi[2] + 1) * ratio - 1,
            ],
        )
    }

    /// Linear offset of `cell` inside this box, x fastest.
    #[inline]
    pub fn offset(&self, cell: [i64; 3]) -> usize {
        let s = self.size();
        ((cell[0] - self.lo[0]) + s[0] * ((cell[1] - self.lo[1]) + s[1] * (cell[2] - self.lo[2])))
            as usize
    }

    /// All cells in offset order.
    pub fn cells(&self) -> impl Iterator<Item = [i64; 3]> {
        let (lo, hi) = (self.lo, self.hi);
        (lo[2]..=hi[2]).flat_map(move |k| {
            (lo[1]..=hi[1]).flat_map(move |j| (lo[0]..=hi[0]).map(move |i| [i, j, k]))
        })
    }

    /// Split into boxes no longer than `max_size` along any axis.
    pub fn chop(&self, max_size: i64) -> Vec<IndexBox> {
        let max_size = max_size.max(1);
        let mut out = Vec::new();
        let mut k = self.lo[2];
        while k <= self.hi[2] {
            let k_hi = (k + max_size - 1).min(self.hi[2]);
            let mut j = self.lo[1];
            while j <= self.hi[1] {
                let j_hi = (j + max_size - 1).min(self.hi[1]);
                let mut i = self.lo[0];
                while i <= self.hi[0] {
                    let i_hi = (i + max_size - 1).min(self.hi[0]);
                    out.push(IndexBox::new([i, j, k], [i_hi, j_hi, k_hi]));
                    i = i_hi + 1;
                }
                j = j_hi + 1;
            }
            k = k_hi + 1;
        }
        out
    }
}
