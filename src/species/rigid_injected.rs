// species/rigid_injected.rs
// Beam species that coasts ballistically until it crosses an injection plane

use super::physical::{gather_es_all, inject_profile};
use super::{species_seed, CurrentTargets, EmFields, ParticleSpecies, SpeciesDescriptor};
use crate::config::SpeciesParams;
use crate::error::PicResult;
use crate::mesh::{LevelLayout, MeshField};
use crate::parallel::Communicator;
use crate::particles::{push, Particle, ParticleContainer};

pub struct RigidInjectedSpecies {
    descriptor: SpeciesDescriptor,
    params: SpeciesParams,
    seed: u64,
    /// Axis along which the injection plane is crossed.
    direction: usize,
    zinject_plane: f64,
    /// Every local particle is past the plane.
    done_injecting: bool,
    pc: ParticleContainer,
}

impl RigidInjectedSpecies {
    pub fn new(
        descriptor: SpeciesDescriptor,
        params: SpeciesParams,
        run_seed: u64,
        direction: usize,
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
        let zinject_plane = params.zinject_plane;
        Self {
            descriptor,
            params,
            seed,
            direction,
            zinject_plane,
            done_injecting: false,
            pc,
        }
    }

    pub fn done_injecting(&self) -> bool {
        self.done_injecting
    }

    pub fn zinject_plane(&self) -> f64 {
        self.zinject_plane
    }

    fn update_done_injecting(&mut self) {
        let (d, plane) = (self.direction, self.zinject_plane);
        self.done_injecting = self.pc.iter().all(|p| p.pos[d] >= plane);
    }

    /// Advance particles on `lev`: upstream ones coast, the rest see the fields.
    fn advance(&mut self, lev: usize, dt: f64, push_momentum: bool, move_particles: bool) -> PicResult<()> {
        let (d, plane, done) = (self.direction, self.zinject_plane, self.done_injecting);
        let (q, m) = (self.pc.charge(), self.pc.mass());
        self.pc.par_for_each_mut_on(lev, |p: &mut Particle| {
            let coasting = !done && p.pos[d] < plane;
            if push_momentum && !coasting {
                p.mom = push::push_momentum_boris(p.mom, p.e, p.b, q, m, dt);
            }
            if move_particles {
                p.save_previous();
                push::push_position(&mut p.pos, p.mom, dt);
            }
        })
    }
}

impl ParticleSpecies for RigidInjectedSpecies {
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
        let n = inject_profile(&mut self.pc, &self.params, self.seed, comm)?;
        self.update_done_injecting();
        Ok(n)
    }

    fn field_gather_es(&mut self, e: &[MeshField]) -> PicResult<()> {
        gather_es_all(&mut self.pc, e)
    }

    fn field_gather(&mut self, lev: usize, fields: EmFields<'_>) -> PicResult<()> {
        self.pc.gather(lev, fields.e, Some(fields.b))
    }

    fn evolve_es(&mut self, e: &[MeshField], rho: &mut [MeshField], _t: f64, dt: f64) -> PicResult<()> {
        gather_es_all(&mut self.pc, e)?;
        let (d, plane, done) = (self.direction, self.zinject_plane, self.done_injecting);
        let (q, m) = (self.pc.charge(), self.pc.mass());
        self.pc.par_for_each_mut(|p| {
            if done || p.pos[d] >= plane {
                p.mom = push::push_momentum_es(p.mom, p.e, q, m, dt);
            }
            p.save_previous();
            push::push_position(&mut p.pos, p.mom, dt);
        });
        self.update_done_injecting();
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
        self.advance(lev, dt, true, true)?;
        self.pc.deposit_current_on(lev, &mut *targets.j)?;
        if let Some(rho2) = targets.rho2.as_deref_mut() {
            self.pc.deposit_charge_on(lev, rho2, 0, false)?;
        }
        self.update_done_injecting();
        Ok(())
    }

    fn push_x_es(&mut self, dt: f64) {
        self.pc.push_position(dt);
        self.update_done_injecting();
    }

    fn push_x(&mut self, dt: f64) {
        self.pc.push_position(dt);
        self.update_done_injecting();
    }

    fn push_p(&mut self, lev: usize, dt: f64, fields: EmFields<'_>) -> PicResult<()> {
        self.pc.gather(lev, fields.e, Some(fields.b))?;
        self.advance(lev, dt, true, false)
    }

    fn post_restart(&mut self) {
        self.update_done_injecting();
    }
}
