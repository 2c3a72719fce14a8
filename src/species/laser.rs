// species/laser.rs
// Laser antenna pseudo-species: a plane of particles whose prescribed motion
// drives the emitted field through the current it deposits

use std::f64::consts::PI;

use super::{CurrentTargets, EmFields, ParticleSpecies, SpeciesDescriptor};
use crate::config::{BoundaryPolicy, LaserParams, LASER_MOBILITY};
use crate::error::{PicError, PicResult};
use crate::mesh::{LevelLayout, MeshField};
use crate::parallel::Communicator;
use crate::particles::{push, Particle, ParticleContainer};
use crate::root_debug;
use crate::units::{ELECTRON_MASS, ELEMENTARY_CHARGE, EPSILON_0, SPEED_OF_LIGHT};

pub struct LaserSpecies {
    descriptor: SpeciesDescriptor,
    params: LaserParams,
    /// Unit polarization vector.
    polarization: [f64; 3],
    pc: ParticleContainer,
}

impl LaserSpecies {
    pub fn new(
        descriptor: SpeciesDescriptor,
        params: LaserParams,
        layouts: &[LevelLayout],
        comm: &dyn Communicator,
    ) -> PicResult<Self> {
        if params.direction > 2 {
            return Err(PicError::Config(format!(
                "laser.direction must be 0, 1 or 2, got {}",
                params.direction
            )));
        }
        let norm = params.polarization.iter().map(|c| c * c).sum::<f64>().sqrt();
        if norm == 0.0 || params.polarization[params.direction] != 0.0 {
            return Err(PicError::Config(format!(
                "laser.polarization {:?} must be non-zero and transverse to the antenna normal",
                params.polarization
            )));
        }
        if params.wavelength <= 0.0 || params.duration <= 0.0 || params.waist <= 0.0 {
            return Err(PicError::Config(
                "laser.wavelength, laser.duration and laser.waist must be positive".to_string(),
            ));
        }
        let polarization = params.polarization.map(|c| c / norm);
        let pc = ParticleContainer::new(
            &descriptor.name,
            ELEMENTARY_CHARGE,
            ELECTRON_MASS,
            BoundaryPolicy::Absorb,
            layouts,
            comm.rank(),
            comm.size(),
        );
        Ok(Self { descriptor, params, polarization, pc })
    }
}

/// Normalized emission amplitude of an antenna particle at time `t`.
fn antenna_amplitude(p: &LaserParams, t: f64, pos: [f64; 3]) -> f64 {
    let r2: f64 = (0..3)
        .filter(|&d| d != p.direction)
        .map(|d| (pos[d] - p.position[d]).powi(2))
        .sum();
    let transverse = (-r2 / (p.waist * p.waist)).exp();
    let envelope = (-((t - p.t_peak) / p.duration).powi(2)).exp();
    let omega = 2.0 * PI * SPEED_OF_LIGHT / p.wavelength;
    transverse * envelope * (omega * (t - p.t_peak)).sin()
}

impl ParticleSpecies for LaserSpecies {
    fn descriptor(&self) -> &SpeciesDescriptor {
        &self.descriptor
    }

    fn container(&self) -> &ParticleContainer {
        &self.pc
    }

    fn container_mut(&mut self) -> &mut ParticleContainer {
        &mut self.pc
    }

    /// One antenna particle at the center of every plane cell owned by this rank.
    fn init_data(&mut self, comm: &dyn Communicator) -> PicResult<usize> {
        let d = self.params.direction;
        let layout = self.pc.layout(0)?.clone();
        let geom = &layout.geom;
        if self.params.position[d] < geom.prob_lo[d] || self.params.position[d] >= geom.prob_hi[d] {
            root_debug!(comm, "Laser antenna plane lies outside the domain; no antenna particles");
            return Ok(0);
        }
        let dx = geom.cell_size();
        let area: f64 = (0..3).filter(|&k| k != d).map(|k| dx[k]).product();
        let weight = 2.0 * EPSILON_0 * self.params.e_max * area / (ELEMENTARY_CHARGE * LASER_MOBILITY);
        let plane = geom.cell_index(self.params.position)[d];

        let mut created = 0;
        let local: Vec<usize> = layout.dm.local_boxes(self.pc.rank()).collect();
        for i in local {
            let bx = layout.ba.get(i);
            if plane < bx.lo[d] || plane > bx.hi[d] {
                continue;
            }
            for cell in bx.cells().filter(|c| c[d] == plane) {
                let lo = geom.cell_lo(cell);
                let mut pos = [0.0; 3];
                for k in 0..3 {
                    pos[k] = if k == d { self.params.position[d] } else { lo[k] + 0.5 * dx[k] };
                }
                let id = geom.domain.offset(cell) as u64;
                self.pc.add_local(0, i, Particle::new(pos, [0.0; 3], weight, id))?;
                created += 1;
            }
        }
        Ok(created)
    }

    fn field_gather_es(&mut self, _e: &[MeshField]) -> PicResult<()> {
        Ok(())
    }

    fn field_gather(&mut self, _lev: usize, _fields: EmFields<'_>) -> PicResult<()> {
        Ok(())
    }

    fn evolve_es(&mut self, _e: &[MeshField], _rho: &mut [MeshField], _t: f64, _dt: f64) -> PicResult<()> {
        Ok(())
    }

    fn evolve(
        &mut self,
        lev: usize,
        _fields: EmFields<'_>,
        targets: &mut CurrentTargets<'_>,
        t: f64,
        dt: f64,
    ) -> PicResult<()> {
        let pol = self.polarization;
        let params = &self.params;
        self.pc.par_for_each_mut_on(lev, |p| {
            let beta = LASER_MOBILITY * antenna_amplitude(params, t, p.pos);
            let u = beta / (1.0 - beta * beta).sqrt() * SPEED_OF_LIGHT;
            p.save_previous();
            p.mom = [u * pol[0], u * pol[1], u * pol[2]];
            push::push_position(&mut p.pos, p.mom, dt);
        })?;
        self.pc.deposit_current_on(lev, &mut *targets.j)?;
        Ok(())
    }

    fn push_x_es(&mut self, _dt: f64) {}

    fn push_x(&mut self, _dt: f64) {}

    fn push_p(&mut self, _lev: usize, _dt: f64, _fields: EmFields<'_>) -> PicResult<()> {
        Ok(())
    }

    fn deposit_charge_on(&self, _lev: usize, _rho: &mut MeshField) -> PicResult<()> {
        Ok(())
    }

    fn sum_charge_local(&self) -> f64 {
        0.0
    }
}
