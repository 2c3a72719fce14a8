// multi_species/mod.rs
// Coordinator owning every species of a run and driving them through each step

mod deposition;
mod redistribution;
mod registry;
mod sequencer;
mod slicer;

pub use deposition::{DepositTarget, DepositionSession, LevelCurrents, LevelFields};

use crate::mesh::LevelLayout;
use crate::species::{ParticleSpecies, SpeciesDescriptor};

/// All species of one rank, in registry order, with the laser antenna last.
///
/// Iteration always follows registry order so floating-point accumulation is
/// reproducible for a fixed decomposition.
pub struct MultiSpecies {
    species: Vec<Box<dyn ParticleSpecies>>,
    descriptors: Vec<SpeciesDescriptor>,
    layouts: Vec<LevelLayout>,
    rank: usize,
    nranks: usize,
    /// Ghost width of the charge densities this coordinator allocates.
    rho_ngrow: i64,
    /// Neighborhood allowed to a particle between two local redistributions.
    redistribute_ghosts: i64,
    /// Read with the species table for the field solver. The kernels in this
    /// crate do not consult them.
    use_fdtd_nci_corr: bool,
    l_lower_order_in_v: bool,
}

impl MultiSpecies {
    pub fn len(&self) -> usize {
        self.species.len()
    }

    pub fn is_empty(&self) -> bool {
        self.species.is_empty()
    }

    pub fn descriptors(&self) -> &[SpeciesDescriptor] {
        &self.descriptors
    }

    pub fn species(&self, i: usize) -> Option<&dyn ParticleSpecies> {
        self.species.get(i).map(|s| s.as_ref())
    }

    pub fn species_mut(&mut self, i: usize) -> Option<&mut (dyn ParticleSpecies + 'static)> {
        self.species.get_mut(i).map(|s| s.as_mut())
    }

    pub fn species_by_name(&self, name: &str) -> Option<&dyn ParticleSpecies> {
        self.descriptors
            .iter()
            .position(|d| d.name == name)
            .and_then(|i| self.species(i))
    }

    pub fn layouts(&self) -> &[LevelLayout] {
        &self.layouts
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn use_fdtd_nci_corr(&self) -> bool {
        self.use_fdtd_nci_corr
    }

    pub fn l_lower_order_in_v(&self) -> bool {
        self.l_lower_order_in_v
    }

    pub fn redistribute_ghosts(&self) -> i64 {
        self.redistribute_ghosts
    }
}
