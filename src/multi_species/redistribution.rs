// multi_species/redistribution.rs
// Particle-to-rank reassignment, per-box counts and layout hooks

use super::MultiSpecies;
use crate::error::{PicError, PicResult};
use crate::mesh::{BoxArray, DistributionMap, MeshField};
use crate::parallel::{Communicator, CommunicatorExt};
use crate::particles::{RedistributeMode, RedistributeStats};
use crate::profile_scope;
use crate::root_debug;

impl MultiSpecies {
    /// Move every particle to the box and rank that own its position, with no
    /// restriction on how far it travelled.
    pub fn redistribute(&mut self, comm: &dyn Communicator) -> PicResult<RedistributeStats> {
        self.redistribute_with(RedistributeMode::Full, comm)
    }

    /// Redistribution for particles that moved at most a few cells since the
    /// last one. The allowed neighborhood is wider with a moving window.
    pub fn redistribute_local(&mut self, comm: &dyn Communicator) -> PicResult<RedistributeStats> {
        let mode = RedistributeMode::Local { num_ghost: self.redistribute_ghosts };
        self.redistribute_with(mode, comm)
    }

    fn redistribute_with(&mut self, mode: RedistributeMode, comm: &dyn Communicator) -> PicResult<RedistributeStats> {
        profile_scope!("redistribute");
        let mut total = RedistributeStats::default();
        for s in &mut self.species {
            let st = s.redistribute(mode, comm)?;
            total.kept += st.kept;
            total.sent += st.sent;
            total.received += st.received;
            total.absorbed += st.absorbed;
        }
        root_debug!(
            comm,
            "Redistribute ({:?}) on rank 0: kept {}, sent {}, received {}, absorbed {}",
            mode,
            total.kept,
            total.sent,
            total.received,
            total.absorbed
        );
        Ok(total)
    }

    /// Valid particles of all species in every box of `lev`, summed over ranks.
    pub fn number_of_particles_in_grid(&self, lev: usize, comm: &dyn Communicator) -> PicResult<Vec<i64>> {
        self.check_level(lev)?;
        let mut counts = vec![0i64; self.layouts[lev].ba.len()];
        for s in &self.species {
            let ci = s.number_of_particles_in_grid(lev)?;
            if ci.len() != counts.len() {
                return Err(PicError::IncompatibleField(format!(
                    "species '{}' reports {} boxes on level {}, expected {}",
                    s.descriptor().name,
                    ci.len(),
                    lev,
                    counts.len()
                )));
            }
            counts.iter_mut().zip(ci).for_each(|(c, n)| *c += n);
        }
        comm.all_reduce_sum_i64(&mut counts)?;
        Ok(counts)
    }

    /// Number of live particles of all species across all ranks.
    pub fn total_particles(&self, comm: &dyn Communicator) -> PicResult<i64> {
        let mut n = [self.species.iter().map(|s| s.container().num_local() as i64).sum::<i64>()];
        comm.all_reduce_sum_i64(&mut n)?;
        Ok(n[0])
    }

    /// Add one per particle of every species into the cell holding it.
    pub fn increment(&self, mf: &mut MeshField, lev: usize) -> PicResult<()> {
        self.check_level(lev)?;
        for s in &self.species {
            s.increment(mf, lev)?;
        }
        Ok(())
    }

    /// Install a new box array on `lev`. A full [`redistribute`](Self::redistribute)
    /// must follow before particles are used again.
    pub fn set_particle_box_array(&mut self, lev: usize, ba: BoxArray) -> PicResult<()> {
        self.check_level(lev)?;
        for s in &mut self.species {
            s.set_particle_box_array(lev, ba.clone())?;
        }
        let layout = &mut self.layouts[lev];
        if ba.len() != layout.dm.len() {
            layout.dm = DistributionMap::round_robin(ba.len(), self.nranks);
        }
        layout.ba = ba;
        Ok(())
    }

    pub fn set_particle_distribution_map(&mut self, lev: usize, dm: DistributionMap) -> PicResult<()> {
        self.check_level(lev)?;
        if dm.len() != self.layouts[lev].ba.len() {
            return Err(PicError::Config(format!(
                "distribution map has {} entries for {} boxes",
                dm.len(),
                self.layouts[lev].ba.len()
            )));
        }
        for s in &mut self.species {
            s.set_particle_distribution_map(lev, dm.clone())?;
        }
        self.layouts[lev].dm = dm;
        Ok(())
    }

    pub fn post_restart(&mut self) {
        for s in &mut self.species {
            s.post_restart();
        }
    }
}
