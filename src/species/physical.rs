// species/physical.rs
// Ordinary plasma species: full gather, Boris push and CIC deposition

use super::{species_seed, CurrentTargets, EmFields, ParticleSpecies, SpeciesDescriptor};
use crate::config::SpeciesParams;
use crate::error::{PicError, PicResult};
use crate::mesh::{LevelLayout, MeshField};
use crate::parallel::Communicator;
use crate::particles::ParticleContainer;
use crate::root_debug;

pub struct PhysicalSpecies {
    descriptor: SpeciesDescriptor,
    params: SpeciesParams,
    seed: u64,
    pc: ParticleContainer,
}

impl PhysicalSpecies {
    pub fn new(
        descriptor: SpeciesDescriptor,
        params: SpeciesParams,
        run_seed: u64,
        layouts: &[LevelLayout],
        comm: &dyn Communicator,
    ) -> Self {
        let pc = ParticleContainer::new(
            &descriptor.name,
            params.charge_si(),
            params.mass_si(),
            params.boundary,
            layouts,
            comm.rank(),
            comm.size(),
        );
        let seed = species_seed(run_seed, descriptor.index);
        Self { descriptor, params, seed, pc }
    }

    pub fn params(&self) -> &SpeciesParams {
        &self.params
    }
}

/// Uniform injection shared by the species that carry an injection profile.
pub(super) fn inject_profile(
    pc: &mut ParticleContainer,
    params: &SpeciesParams,
    seed: u64,
    comm: &dyn Communicator,
) -> PicResult<usize> {
    let n = pc.inject_uniform(&params.profile, seed)?;
    root_debug!(comm, "Species '{}': injected {} particles on rank 0", pc.name(), n);
    Ok(n)
}

/// Gather E on every level that has a field.
pub(super) fn gather_es_all(pc: &mut ParticleContainer, e: &[MeshField]) -> PicResult<()> {
    if e.len() < pc.num_levels() {
        return Err(PicError::IncompatibleField(format!(
            "{} E levels for {} particle levels",
            e.len(),
            pc.num_levels()
        )));
    }
    for (lev, field) in e.iter().enumerate().take(pc.num_levels()) {
        pc.gather(lev, field, None)?;
    }
    Ok(())
}

impl ParticleSpecies for PhysicalSpecies {
    fn descriptor(&self) -> &SpeciesDescriptor {
        &self.descriptor
    }

    fn container(&self) -> &ParticleContainer {
        &self.pc
    }

    fn container_mut(&mut self) -> &mut ParticleContainer {
        &mut self.pc
    }

    fn init_data(&mut self, comm: &dyn Communicator) -> PicResult<usize> {
        inject_profile(&mut self.pc, &self.params, self.seed, comm)
    }

    fn field_gather_es(&mut self, e: &[MeshField]) -> PicResult<()> {
        gather_es_all(&mut self.pc, e)
    }

    fn field_gather(&mut self, lev: usize, fields: EmFields<'_>) -> PicResult<()> {
        self.pc.gather(lev, fields.e, Some(fields.b))
    }

    fn evolve_es(&mut self, e: &[MeshField], rho: &mut [MeshField], _t: f64, dt: f64) -> PicResult<()> {
        gather_es_all(&mut self.pc, e)?;
        self.pc.push_momentum_es(dt);
        self.pc.push_position(dt);
        self.deposit_charge_local(rho)
    }

    fn evolve(
        &mut self,
        lev: usize,
        fields: EmFields<'_>,
        targets: &mut CurrentTargets<'_>,
        _t: f64,
        dt: f64,
    ) -> PicResult<()> {
        if let Some(rho) = targets.rho.as_deref_mut() {
            self.pc.deposit_charge_on(lev, rho, 0, false)?;
        }
        self.pc.gather(lev, fields.e, Some(fields.b))?;
        self.pc.push_momentum(lev, dt)?;
        self.pc.push_position_on(lev, dt)?;
        self.pc.deposit_current_on(lev, &mut *targets.j)?;
        if let Some(rho2) = targets.rho2.as_deref_mut() {
            self.pc.deposit_charge_on(lev, rho2, 0, false)?;
        }
        Ok(())
    }

    fn push_x_es(&mut self, dt: f64) {
        self.pc.push_position(dt);
    }

    fn push_x(&mut self, dt: f64) {
        self.pc.push_position(dt);
    }

    fn push_p(&mut self, lev: usize, dt: f64, fields: EmFields<'_>) -> PicResult<()> {
        self.pc.gather(lev, fields.e, Some(fields.b))?;
        self.pc.push_momentum(lev, dt)
    }
}
