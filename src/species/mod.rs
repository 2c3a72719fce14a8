// species/mod.rs
// Species descriptors and the capability set every species variant provides

mod laser;
mod physical;
mod rigid_injected;

pub use laser::LaserSpecies;
pub use physical::PhysicalSpecies;
pub use rigid_injected::RigidInjectedSpecies;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::diagnostics::{DiagnosticParticles, SliceRequest};
use crate::error::{PicError, PicResult};
use crate::mesh::{BoxArray, DistributionMap, MeshField};
use crate::parallel::Communicator;
use crate::particles::{ParticleContainer, RedistributeMode, RedistributeStats};

/// Name given to the laser antenna pseudo-species.
pub const LASER_SPECIES_NAME: &str = "laser";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpeciesKind {
    Physical,
    RigidInjected,
    Laser,
}

impl fmt::Display for SpeciesKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SpeciesKind::Physical => "physical",
            SpeciesKind::RigidInjected => "rigid-injected",
            SpeciesKind::Laser => "laser",
        };
        f.write_str(s)
    }
}

/// Identity of one species. Fixed for the lifetime of the run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeciesDescriptor {
    pub name: String,
    pub kind: SpeciesKind,
    pub index: usize,
}

impl SpeciesDescriptor {
    pub fn new(name: impl Into<String>, kind: SpeciesKind, index: usize) -> Self {
        Self { name: name.into(), kind, index }
    }
}

/// Electric and magnetic field on one level, three components each.
#[derive(Clone, Copy)]
pub struct EmFields<'a> {
    pub e: &'a MeshField,
    pub b: &'a MeshField,
}

/// Shared outputs of an electromagnetic evolve pass on one level.
///
/// `rho` receives the charge density before the push and `rho2` after it.
pub struct CurrentTargets<'a> {
    pub j: &'a mut MeshField,
    pub rho: Option<&'a mut MeshField>,
    pub rho2: Option<&'a mut MeshField>,
}

impl<'a> CurrentTargets<'a> {
    pub fn current_only(j: &'a mut MeshField) -> Self {
        Self { j, rho: None, rho2: None }
    }
}

/// Operations the coordinator drives on every species.
///
/// Deposition methods only ever add into the given fields and never reduce
/// across ranks; zeroing and the boundary reduction belong to the caller.
pub trait ParticleSpecies: Send + Sync {
    fn descriptor(&self) -> &SpeciesDescriptor;
    fn container(&self) -> &ParticleContainer;
    fn container_mut(&mut self) -> &mut ParticleContainer;

    fn alloc_data(&mut self) {
        self.container_mut().alloc_data();
    }

    /// Create the initial particles. Returns the number created on this rank.
    fn init_data(&mut self, comm: &dyn Communicator) -> PicResult<usize>;

    /// Interpolate E on every level.
    fn field_gather_es(&mut self, e: &[MeshField]) -> PicResult<()>;

    /// Interpolate E and B on one level.
    fn field_gather(&mut self, lev: usize, fields: EmFields<'_>) -> PicResult<()>;

    /// Electrostatic gather, push and charge deposition over all levels.
    fn evolve_es(&mut self, e: &[MeshField], rho: &mut [MeshField], t: f64, dt: f64) -> PicResult<()>;

    /// Electromagnetic gather, push and current deposition on one level.
    fn evolve(
        &mut self,
        lev: usize,
        fields: EmFields<'_>,
        targets: &mut CurrentTargets<'_>,
        t: f64,
        dt: f64,
    ) -> PicResult<()>;

    fn push_x_es(&mut self, dt: f64);
    fn push_x(&mut self, dt: f64);

    /// Gather on `lev` and update momenta without moving particles.
    fn push_p(&mut self, lev: usize, dt: f64, fields: EmFields<'_>) -> PicResult<()>;

    /// Add the charge density on `lev` into `rho`.
    fn deposit_charge_on(&self, lev: usize, rho: &mut MeshField) -> PicResult<()> {
        self.container().deposit_charge_on(lev, rho, 0, false)
    }

    /// Add the charge density of every level into `rho[lev]`.
    fn deposit_charge_local(&self, rho: &mut [MeshField]) -> PicResult<()> {
        let pc = self.container();
        if rho.len() < pc.num_levels() {
            return Err(PicError::IncompatibleField(format!(
                "{} charge levels for {} particle levels",
                rho.len(),
                pc.num_levels()
            )));
        }
        for (lev, field) in rho.iter_mut().enumerate().take(pc.num_levels()) {
            self.deposit_charge_on(lev, field)?;
        }
        Ok(())
    }

    /// Zero `rho`, deposit, and reduce ghosts unless `local`.
    fn deposit_charge(&self, rho: &mut [MeshField], local: bool, comm: &dyn Communicator) -> PicResult<()> {
        rho.iter_mut().for_each(MeshField::zero);
        self.deposit_charge_local(rho)?;
        if !local {
            for (lev, field) in rho.iter_mut().enumerate() {
                let geom = &self.container().layout(lev)?.geom;
                field.sum_boundary(geom, comm)?;
            }
        }
        Ok(())
    }

    /// Freshly allocated charge density of this species on `lev`.
    fn get_charge_density(
        &self,
        lev: usize,
        ngrow: i64,
        local: bool,
        comm: &dyn Communicator,
    ) -> PicResult<MeshField> {
        let pc = self.container();
        let layout = pc.layout(lev)?;
        let mut rho = MeshField::new(&layout.ba, &layout.dm, 1, ngrow, pc.rank());
        self.deposit_charge_on(lev, &mut rho)?;
        if !local {
            rho.sum_boundary(&layout.geom, comm)?;
        }
        Ok(rho)
    }

    /// Sum of `q * w` over this rank's particles.
    fn sum_charge_local(&self) -> f64 {
        self.container().sum_charge()
    }

    fn redistribute(&mut self, mode: RedistributeMode, comm: &dyn Communicator) -> PicResult<RedistributeStats> {
        self.container_mut().redistribute(mode, comm)
    }

    /// Valid particles per box on `lev`, this rank only.
    fn number_of_particles_in_grid(&self, lev: usize) -> PicResult<Vec<i64>> {
        self.container().counts(lev)
    }

    fn increment(&self, mf: &mut MeshField, lev: usize) -> PicResult<()> {
        self.container().increment(mf, lev)
    }

    fn set_particle_box_array(&mut self, lev: usize, ba: BoxArray) -> PicResult<()> {
        self.container_mut().set_box_array(lev, ba)
    }

    fn set_particle_distribution_map(&mut self, lev: usize, dm: DistributionMap) -> PicResult<()> {
        self.container_mut().set_distribution_map(lev, dm)
    }

    /// Rebuild derived state after particles were loaded from a checkpoint.
    fn post_restart(&mut self) {}

    fn particle_slice(&self, request: &SliceRequest) -> DiagnosticParticles {
        self.container().particle_slice(request)
    }
}

/// Seed of a species' injection stream, derived from the run seed.
pub(crate) fn species_seed(run_seed: u64, index: usize) -> u64 {
    run_seed.wrapping_add((index as u64 + 1).wrapping_mul(0xA076_1D64_78BD_642F))
}

#[cfg(test)]
mod tests;
