// multi_species/sequencer.rs
// Per-step passes over all species: lifecycle, gather, push and evolve

use rayon::prelude::*;

use super::{DepositionSession, LevelCurrents, LevelFields, MultiSpecies};
use crate::error::{PicError, PicResult};
use crate::mesh::MeshField;
use crate::parallel::{Communicator, CommunicatorExt};
use crate::profile_scope;
use crate::root_info;
use crate::species::{CurrentTargets, EmFields};

impl MultiSpecies {
    pub fn alloc_data(&mut self) {
        for s in &mut self.species {
            s.alloc_data();
        }
    }

    /// Create the initial particles of every species. Returns the global count.
    pub fn init_data(&mut self, comm: &dyn Communicator) -> PicResult<i64> {
        let mut created = Vec::with_capacity(self.species.len());
        for s in &mut self.species {
            created.push(s.init_data(comm)? as i64);
        }
        comm.all_reduce_sum_i64(&mut created)?;
        for (d, n) in self.descriptors.iter().zip(&created) {
            root_info!(comm, "Species '{}': {} particles created", d.name, n);
        }
        Ok(created.iter().sum())
    }

    /// Electrostatic gather on every level. Species are independent here.
    pub fn field_gather_es(&mut self, e: &[MeshField]) -> PicResult<()> {
        self.species.par_iter_mut().try_for_each(|s| s.field_gather_es(e))
    }

    pub fn field_gather(&mut self, lev: usize, fields: EmFields<'_>) -> PicResult<()> {
        self.check_level(lev)?;
        self.species.par_iter_mut().try_for_each(|s| s.field_gather(lev, fields))
    }

    /// Electrostatic step: zero `rho` on every level, let each species gather,
    /// push and deposit, then reduce each level once.
    pub fn evolve_es(
        &mut self,
        e: &[MeshField],
        rho: &mut [MeshField],
        t: f64,
        dt: f64,
        comm: &dyn Communicator,
    ) -> PicResult<()> {
        profile_scope!("evolve_es");
        let mut target = LevelFields::new(&self.layouts, rho)?;
        let mut session = DepositionSession::begin(&mut target);
        let species = &mut self.species;
        session.accumulate(|target| {
            for s in species.iter_mut() {
                s.evolve_es(e, target.fields, t, dt)?;
            }
            Ok(())
        })?;
        session.finish(comm)
    }

    /// Electromagnetic step on `lev`: zero J (and rho, rho2 when given) over
    /// their grown extent, evolve every species into them, then reduce each
    /// deposited field once.
    pub fn evolve(
        &mut self,
        lev: usize,
        fields: EmFields<'_>,
        targets: &mut CurrentTargets<'_>,
        t: f64,
        dt: f64,
        comm: &dyn Communicator,
    ) -> PicResult<()> {
        self.evolve_inner(lev, fields, targets, t, dt, Some(comm))
    }

    /// As [`evolve`](Self::evolve), leaving the per-rank partial sums unreduced.
    pub fn evolve_local(
        &mut self,
        lev: usize,
        fields: EmFields<'_>,
        targets: &mut CurrentTargets<'_>,
        t: f64,
        dt: f64,
    ) -> PicResult<()> {
        self.evolve_inner(lev, fields, targets, t, dt, None)
    }

    fn evolve_inner(
        &mut self,
        lev: usize,
        fields: EmFields<'_>,
        targets: &mut CurrentTargets<'_>,
        t: f64,
        dt: f64,
        comm: Option<&dyn Communicator>,
    ) -> PicResult<()> {
        profile_scope!("evolve");
        self.check_level(lev)?;
        let geom = &self.layouts[lev].geom;
        let mut target = LevelCurrents::new(geom, targets);
        let mut session = DepositionSession::begin(&mut target);
        let species = &mut self.species;
        session.accumulate(|cur| {
            for s in species.iter_mut() {
                s.evolve(lev, fields, cur.targets, t, dt)?;
            }
            Ok(())
        })?;
        match comm {
            Some(comm) => session.finish(comm),
            None => {
                session.finish_local();
                Ok(())
            }
        }
    }

    pub fn push_x_es(&mut self, dt: f64) {
        self.species.par_iter_mut().for_each(|s| s.push_x_es(dt));
    }

    pub fn push_x(&mut self, dt: f64) {
        self.species.par_iter_mut().for_each(|s| s.push_x(dt));
    }

    pub fn push_p(&mut self, lev: usize, dt: f64, fields: EmFields<'_>) -> PicResult<()> {
        self.check_level(lev)?;
        self.species.par_iter_mut().try_for_each(|s| s.push_p(lev, dt, fields))
    }

    pub(super) fn check_level(&self, lev: usize) -> PicResult<()> {
        if lev < self.layouts.len() {
            Ok(())
        } else {
            Err(PicError::LevelOutOfRange { lev, nlevels: self.layouts.len() })
        }
    }
}
