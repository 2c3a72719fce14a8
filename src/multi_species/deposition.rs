// multi_species/deposition.rs
// Zero, accumulate from every species, reduce once: charge and current density

use super::MultiSpecies;
use crate::error::{PicError, PicResult};
use crate::mesh::{Geometry, LevelLayout, MeshField};
use crate::parallel::{Communicator, CommunicatorExt};
use crate::profile_scope;
use crate::species::CurrentTargets;

/// A set of shared fields that species deposit into.
pub trait DepositTarget {
    /// Zero every field over its full grown extent.
    fn zero_all(&mut self);

    /// Boundary reduction, once per field.
    fn reduce(&mut self, comm: &dyn Communicator) -> PicResult<()>;
}

/// One field per refinement level, e.g. the charge density of every level.
pub struct LevelFields<'a> {
    geoms: Vec<&'a Geometry>,
    pub fields: &'a mut [MeshField],
}

impl<'a> LevelFields<'a> {
    pub fn new(layouts: &'a [LevelLayout], fields: &'a mut [MeshField]) -> PicResult<Self> {
        if fields.len() != layouts.len() {
            return Err(PicError::IncompatibleField(format!(
                "{} fields for {} levels",
                fields.len(),
                layouts.len()
            )));
        }
        for (lev, (f, l)) in fields.iter().zip(layouts).enumerate() {
            if f.box_array() != &l.ba || f.distribution_map() != &l.dm {
                return Err(PicError::IncompatibleField(format!(
                    "field on level {} does not match the particle layout",
                    lev
                )));
            }
        }
        Ok(Self { geoms: layouts.iter().map(|l| &l.geom).collect(), fields })
    }
}

impl DepositTarget for LevelFields<'_> {
    fn zero_all(&mut self) {
        self.fields.iter_mut().for_each(MeshField::zero);
    }

    fn reduce(&mut self, comm: &dyn Communicator) -> PicResult<()> {
        for (field, geom) in self.fields.iter_mut().zip(&self.geoms) {
            field.sum_boundary(geom, comm)?;
        }
        Ok(())
    }
}

/// Current (and optionally charge) densities of one level.
pub struct LevelCurrents<'a, 'b> {
    geom: &'a Geometry,
    pub targets: &'a mut CurrentTargets<'b>,
}

impl<'a, 'b> LevelCurrents<'a, 'b> {
    pub fn new(geom: &'a Geometry, targets: &'a mut CurrentTargets<'b>) -> Self {
        Self { geom, targets }
    }
}

impl DepositTarget for LevelCurrents<'_, '_> {
    fn zero_all(&mut self) {
        self.targets.j.zero();
        if let Some(rho) = self.targets.rho.as_deref_mut() {
            rho.zero();
        }
        if let Some(rho2) = self.targets.rho2.as_deref_mut() {
            rho2.zero();
        }
    }

    fn reduce(&mut self, comm: &dyn Communicator) -> PicResult<()> {
        self.targets.j.sum_boundary(self.geom, comm)?;
        if let Some(rho) = self.targets.rho.as_deref_mut() {
            rho.sum_boundary(self.geom, comm)?;
        }
        if let Some(rho2) = self.targets.rho2.as_deref_mut() {
            rho2.sum_boundary(self.geom, comm)?;
        }
        Ok(())
    }
}

impl DepositTarget for (&Geometry, &mut MeshField) {
    fn zero_all(&mut self) {
        self.1.zero();
    }

    fn reduce(&mut self, comm: &dyn Communicator) -> PicResult<()> {
        self.1.sum_boundary(self.0, comm)
    }
}

/// Exclusive access to a deposit target between zeroing and reduction.
///
/// `begin` zeroes the target, `accumulate` hands it to the depositors, and
/// `finish` runs the boundary reduction exactly once. The target stays
/// borrowed for the whole session, so no one can read it half-accumulated.
pub struct DepositionSession<'s, T: DepositTarget> {
    target: &'s mut T,
    closed: bool,
}

impl<'s, T: DepositTarget> DepositionSession<'s, T> {
    pub fn begin(target: &'s mut T) -> Self {
        target.zero_all();
        Self { target, closed: false }
    }

    pub fn accumulate<R>(&mut self, f: impl FnOnce(&mut T) -> PicResult<R>) -> PicResult<R> {
        f(self.target)
    }

    /// Sum ghost contributions into their owners, across ranks.
    pub fn finish(mut self, comm: &dyn Communicator) -> PicResult<()> {
        self.closed = true;
        self.target.reduce(comm)
    }

    /// Leave the per-rank partial sums in place; the caller reduces later.
    pub fn finish_local(mut self) {
        self.closed = true;
    }

    /// `finish` unless `local`.
    pub fn close(self, local: bool, comm: &dyn Communicator) -> PicResult<()> {
        if local {
            self.finish_local();
            Ok(())
        } else {
            self.finish(comm)
        }
    }
}

impl<T: DepositTarget> Drop for DepositionSession<'_, T> {
    fn drop(&mut self) {
        if !self.closed && !std::thread::panicking() {
            log::warn!("deposition session dropped before it was finished; fields are partial sums");
        }
    }
}

impl MultiSpecies {
    /// Charge density of every species summed into `rho[lev]` for all levels.
    /// Unless `local`, ghost contributions are reduced once at the end.
    pub fn deposit_charge(&self, rho: &mut [MeshField], local: bool, comm: &dyn Communicator) -> PicResult<()> {
        profile_scope!("deposit_charge");
        let mut target = LevelFields::new(&self.layouts, rho)?;
        let mut session = DepositionSession::begin(&mut target);
        session.accumulate(|t| {
            for s in &self.species {
                s.deposit_charge_local(t.fields)?;
            }
            Ok(())
        })?;
        session.close(local, comm)
    }

    /// Combined charge density of all species on `lev`, built from each
    /// species' local density.
    pub fn get_charge_density(&self, lev: usize, local: bool, comm: &dyn Communicator) -> PicResult<MeshField> {
        let layout = self
            .layouts
            .get(lev)
            .ok_or(PicError::LevelOutOfRange { lev, nlevels: self.layouts.len() })?;
        let mut rho = MeshField::new(&layout.ba, &layout.dm, 1, self.rho_ngrow, self.rank);
        {
            let mut target = (&layout.geom, &mut rho);
            let mut session = DepositionSession::begin(&mut target);
            session.accumulate(|(_, rho)| {
                for s in &self.species {
                    let rho_s = s.get_charge_density(lev, self.rho_ngrow, true, comm)?;
                    rho.add(&rho_s)?;
                }
                Ok(())
            })?;
            session.close(local, comm)?;
        }
        Ok(rho)
    }

    /// Total charge `sum q * w` of all species. With `local` the result covers
    /// this rank only and the caller is responsible for reducing it.
    pub fn sum_particle_charge(&self, local: bool, comm: &dyn Communicator) -> PicResult<f64> {
        let mut total = [self.species.iter().map(|s| s.sum_charge_local()).sum::<f64>()];
        if !local {
            comm.all_reduce_sum_f64(&mut total)?;
        }
        Ok(total[0])
    }
}
