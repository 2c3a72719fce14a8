use serde::{Deserialize, Serialize};

/// One macro-particle. Owned by exactly one species container on one rank.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Particle {
    pub pos: [f64; 3],
    /// `gamma * v` (m/s)
    pub mom: [f64; 3],
    /// Number of physical particles represented.
    pub weight: f64,
    pub id: u64,
    /// Position and momentum before the most recent position push.
    pub prev_pos: [f64; 3],
    pub prev_mom: [f64; 3],
    /// Fields gathered at the particle position.
    pub e: [f64; 3],
    pub b: [f64; 3],
}

impl Particle {
    pub fn new(pos: [f64; 3], mom: [f64; 3], weight: f64, id: u64) -> Self {
        Self {
            pos,
            mom,
            weight,
            id,
            prev_pos: pos,
            prev_mom: mom,
            e: [0.0; 3],
            b: [0.0; 3],
        }
    }

    /// Remember the current phase-space point before moving.
    #[inline]
    pub fn save_previous(&mut self) {
        self.prev_pos = self.pos;
        self.prev_mom = self.mom;
    }
}
