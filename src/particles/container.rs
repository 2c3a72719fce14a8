// particles/container.rs
// Per-level, per-box particle storage of one species and the operations
// every species variant builds on

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::push;
use super::shape::CicStencil;
use super::Particle;
use crate::config::{BoundaryPolicy, InjectionProfile};
use crate::diagnostics::{DiagnosticParticles, SliceRequest};
use crate::error::{PicError, PicResult};
use crate::mesh::{BoxArray, DistributionMap, FieldBox, LevelLayout, MeshField};
use crate::parallel::{Communicator, CommunicatorExt};
use crate::profile_scope;
use crate::units::velocity;

/// Fixed chunk length for deposition scratch buffers, so summation order does
/// not depend on the number of worker threads.
const DEPOSIT_CHUNK: usize = 1024;

/// How far particles may have moved since the last redistribution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RedistributeMode {
    /// Any particle may land anywhere (after restart or regrid).
    Full,
    /// Every particle must still lie within `num_ghost` cells of its box.
    Local { num_ghost: i64 },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RedistributeStats {
    pub kept: usize,
    pub sent: usize,
    pub received: usize,
    pub absorbed: usize,
}

/// A particle in flight to another rank, tagged with its destination tile.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct Routed {
    lev: usize,
    bx: usize,
    particle: Particle,
}

struct ParticleLevel {
    layout: LevelLayout,
    tiles: BTreeMap<usize, Vec<Particle>>,
}

impl ParticleLevel {
    fn new(layout: LevelLayout) -> Self {
        Self { layout, tiles: BTreeMap::new() }
    }
}

/// All particles of one species owned by one rank.
pub struct ParticleContainer {
    name: String,
    charge: f64,
    mass: f64,
    boundary: BoundaryPolicy,
    rank: usize,
    nranks: usize,
    levels: Vec<ParticleLevel>,
    /// Particles displaced by a layout change, waiting for a full redistribution.
    orphans: Vec<Particle>,
}

impl ParticleContainer {
    pub fn new(
        name: &str,
        charge: f64,
        mass: f64,
        boundary: BoundaryPolicy,
        layouts: &[LevelLayout],
        rank: usize,
        nranks: usize,
    ) -> Self {
        Self {
            name: name.to_string(),
            charge,
            mass,
            boundary,
            rank,
            nranks,
            levels: layouts.iter().cloned().map(ParticleLevel::new).collect(),
            orphans: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn charge(&self) -> f64 {
        self.charge
    }

    pub fn mass(&self) -> f64 {
        self.mass
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    fn check_level(&self, lev: usize) -> PicResult<()> {
        if lev < self.levels.len() {
            Ok(())
        } else {
            Err(PicError::LevelOutOfRange { lev, nlevels: self.levels.len() })
        }
    }

    pub fn layout(&self, lev: usize) -> PicResult<&LevelLayout> {
        self.check_level(lev)?;
        Ok(&self.levels[lev].layout)
    }

    /// Create an empty tile for every locally owned box.
    pub fn alloc_data(&mut self) {
        let rank = self.rank;
        for level in &mut self.levels {
            for i in level.layout.dm.local_boxes(rank) {
                level.tiles.entry(i).or_default();
            }
        }
    }

    /// Finest (level, box) whose valid region contains `pos`.
    pub fn locate(&self, pos: [f64; 3]) -> Option<(usize, usize)> {
        self.levels.iter().enumerate().rev().find_map(|(lev, level)| {
            let cell = level.layout.geom.cell_index(pos);
            level.layout.ba.find(cell).map(|bx| (lev, bx))
        })
    }

    /// Store a particle in a locally owned tile.
    pub fn add_local(&mut self, lev: usize, bx: usize, particle: Particle) -> PicResult<()> {
        self.check_level(lev)?;
        let level = &mut self.levels[lev];
        if level.layout.dm.owner(bx) != self.rank {
            return Err(PicError::Config(format!(
                "box {} on level {} is not owned by rank {}",
                bx, lev, self.rank
            )));
        }
        level.tiles.entry(bx).or_default().push(particle);
        Ok(())
    }

    /// Tiles of one level in box order.
    pub fn tiles(&self, lev: usize) -> impl Iterator<Item = (usize, &Vec<Particle>)> {
        self.levels
            .get(lev)
            .into_iter()
            .flat_map(|l| l.tiles.iter().map(|(&i, t)| (i, t)))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Particle> {
        self.levels
            .iter()
            .flat_map(|l| l.tiles.values().flatten())
            .chain(self.orphans.iter())
    }

    pub fn num_local(&self) -> usize {
        self.levels
            .iter()
            .map(|l| l.tiles.values().map(Vec::len).sum::<usize>())
            .sum::<usize>()
            + self.orphans.len()
    }

    /// Apply `f` to every particle, tiles in parallel.
    pub fn par_for_each_mut<F>(&mut self, f: F)
    where
        F: Fn(&mut Particle) + Sync + Send,
    {
        for level in &mut self.levels {
            level.tiles.par_iter_mut().for_each(|(_, tile)| tile.par_iter_mut().for_each(&f));
        }
    }

    /// Same as [`par_for_each_mut`](Self::par_for_each_mut) restricted to one level.
    pub fn par_for_each_mut_on<F>(&mut self, lev: usize, f: F) -> PicResult<()>
    where
        F: Fn(&mut Particle) + Sync + Send,
    {
        self.check_level(lev)?;
        self.levels[lev]
            .tiles
            .par_iter_mut()
            .for_each(|(_, tile)| tile.par_iter_mut().for_each(&f));
        Ok(())
    }

    /// Fill a uniform plasma into the locally owned level-0 boxes.
    ///
    /// Particles sit on a regular `ppc` lattice inside each cell. Momenta are
    /// drawn from a generator seeded by the global cell index and ids derive
    /// from it too, so the initial state does not depend on the decomposition.
    pub fn inject_uniform(&mut self, profile: &InjectionProfile, seed: u64) -> PicResult<usize> {
        let nppc: usize = profile.ppc.iter().product();
        if profile.density <= 0.0 || nppc == 0 || self.levels.is_empty() {
            return Ok(0);
        }
        let level = &mut self.levels[0];
        let geom = level.layout.geom.clone();
        let dx = geom.cell_size();
        let weight = profile.density * geom.cell_volume() / nppc as f64;
        let region_lo = profile.region_lo.unwrap_or(geom.prob_lo);
        let region_hi = profile.region_hi.unwrap_or(geom.prob_hi);
        let domain = geom.domain;
        let rank = self.rank;

        let mut injected = 0;
        let local: Vec<usize> = level.layout.dm.local_boxes(rank).collect();
        for i in local {
            let bx = *level.layout.ba.get(i);
            let tile = level.tiles.entry(i).or_default();
            for cell in bx.cells() {
                let corner = geom.cell_lo(cell);
                let cell_id = domain.offset(cell) as u64;
                let mut rng = StdRng::seed_from_u64(
                    seed ^ cell_id.wrapping_mul(0x9E37_79B9_7F4A_7C15).rotate_left(17),
                );
                let mut k = 0u64;
                for c in 0..profile.ppc[2] {
                    for b in 0..profile.ppc[1] {
                        for a in 0..profile.ppc[0] {
                            let frac = [
                                (a as f64 + 0.5) / profile.ppc[0] as f64,
                                (b as f64 + 0.5) / profile.ppc[1] as f64,
                                (c as f64 + 0.5) / profile.ppc[2] as f64,
                            ];
                            let mut pos = [0.0; 3];
                            let mut mom = [0.0; 3];
                            for d in 0..3 {
                                pos[d] = corner[d] + frac[d] * dx[d];
                                let n: f64 = StandardNormal.sample(&mut rng);
                                mom[d] = profile.u_mean[d] + profile.u_thermal[d] * n;
                            }
                            k += 1;
                            let inside = (0..3).all(|d| pos[d] >= region_lo[d] && pos[d] < region_hi[d]);
                            if !inside {
                                continue;
                            }
                            let id = cell_id * nppc as u64 + k;
                            tile.push(Particle::new(pos, mom, weight, id));
                            injected += 1;
                        }
                    }
                }
            }
        }
        Ok(injected)
    }

    /// Interpolate E (and B, when given) at every particle of `lev`.
    pub fn gather(&mut self, lev: usize, e: &MeshField, b: Option<&MeshField>) -> PicResult<()> {
        self.check_level(lev)?;
        for (name, field) in [("E", Some(e)), ("B", b)] {
            if let Some(field) = field.filter(|f| f.ncomp() < 3) {
                return Err(PicError::IncompatibleField(format!(
                    "{} needs 3 components, got {}",
                    name,
                    field.ncomp()
                )));
            }
        }
        let level = &mut self.levels[lev];
        let geom = &level.layout.geom;
        level.tiles.par_iter_mut().try_for_each(|(&i, tile)| {
            let e_fab = e.fab(i).ok_or_else(|| missing_fab("E", i))?;
            let b_fab = match b {
                Some(b) => Some(b.fab(i).ok_or_else(|| missing_fab("B", i))?),
                None => None,
            };
            tile.par_iter_mut().for_each(|p| {
                let stencil = CicStencil::new(p.pos, geom);
                p.e = stencil.gather3(e_fab);
                p.b = b_fab.map(|f| stencil.gather3(f)).unwrap_or([0.0; 3]);
            });
            Ok(())
        })
    }

    /// Boris momentum update on `lev` with the gathered fields.
    pub fn push_momentum(&mut self, lev: usize, dt: f64) -> PicResult<()> {
        let (q, m) = (self.charge, self.mass);
        self.par_for_each_mut_on(lev, |p| {
            p.mom = push::push_momentum_boris(p.mom, p.e, p.b, q, m, dt);
        })
    }

    /// Electric-only momentum update on every level.
    pub fn push_momentum_es(&mut self, dt: f64) {
        let (q, m) = (self.charge, self.mass);
        self.par_for_each_mut(|p| {
            p.mom = push::push_momentum_es(p.mom, p.e, q, m, dt);
        });
    }

    /// Position update on one level, recording the previous phase-space point.
    pub fn push_position_on(&mut self, lev: usize, dt: f64) -> PicResult<()> {
        self.par_for_each_mut_on(lev, |p| {
            p.save_previous();
            push::push_position(&mut p.pos, p.mom, dt);
        })
    }

    /// Position update on every level.
    pub fn push_position(&mut self, dt: f64) {
        self.par_for_each_mut(|p| {
            p.save_previous();
            push::push_position(&mut p.pos, p.mom, dt);
        });
    }

    /// Add this species' charge density on `lev` into component `comp` of `rho`.
    /// With `at_previous`, particles are weighted at their previous position.
    /// Fails if any part of a particle's stencil lies beyond the ghost region.
    pub fn deposit_charge_on(
        &self,
        lev: usize,
        rho: &mut MeshField,
        comp: usize,
        at_previous: bool,
    ) -> PicResult<()> {
        profile_scope!("deposit_charge");
        self.check_level(lev)?;
        let level = &self.levels[lev];
        let geom = &level.layout.geom;
        let inv_vol = 1.0 / geom.cell_volume();
        if comp >= rho.ncomp() {
            return Err(PicError::IncompatibleField(format!(
                "charge component {} of a {}-component field",
                comp,
                rho.ncomp()
            )));
        }
        let q = self.charge;
        let mut dropped = 0;
        for (&i, tile) in &level.tiles {
            let fab = rho.fab_mut(i).ok_or_else(|| missing_fab("rho", i))?;
            dropped += deposit_chunked(tile, fab, |p, scratch| {
                let pos = if at_previous { p.prev_pos } else { p.pos };
                CicStencil::new(pos, geom).deposit(scratch, comp, &[q * p.weight * inv_vol])
            });
        }
        self.check_dropped("rho", dropped)
    }

    /// Add this species' current density on `lev` into components 0..3 of `j`,
    /// weighted at the mid-point of the last position push.
    pub fn deposit_current_on(&self, lev: usize, j: &mut MeshField) -> PicResult<()> {
        profile_scope!("deposit_current");
        self.check_level(lev)?;
        if j.ncomp() < 3 {
            return Err(PicError::IncompatibleField(format!(
                "current density needs 3 components, got {}",
                j.ncomp()
            )));
        }
        let level = &self.levels[lev];
        let geom = &level.layout.geom;
        let inv_vol = 1.0 / geom.cell_volume();
        let q = self.charge;
        let mut dropped = 0;
        for (&i, tile) in &level.tiles {
            let fab = j.fab_mut(i).ok_or_else(|| missing_fab("J", i))?;
            dropped += deposit_chunked(tile, fab, |p, scratch| {
                let mid = [
                    0.5 * (p.pos[0] + p.prev_pos[0]),
                    0.5 * (p.pos[1] + p.prev_pos[1]),
                    0.5 * (p.pos[2] + p.prev_pos[2]),
                ];
                let v = velocity(p.mom);
                let s = q * p.weight * inv_vol;
                CicStencil::new(mid, geom).deposit(scratch, 0, &[s * v[0], s * v[1], s * v[2]])
            });
        }
        self.check_dropped("J", dropped)
    }

    fn check_dropped(&self, field: &'static str, dropped: usize) -> PicResult<()> {
        if dropped > 0 {
            return Err(PicError::DepositOutsideGhosts {
                species: self.name.clone(),
                field,
                dropped,
            });
        }
        Ok(())
    }

    /// Sum of `q * w` over local particles.
    pub fn sum_charge(&self) -> f64 {
        self.charge * self.iter().map(|p| p.weight).sum::<f64>()
    }

    /// Valid particle count of every box on `lev`; zero for boxes owned elsewhere.
    pub fn counts(&self, lev: usize) -> PicResult<Vec<i64>> {
        self.check_level(lev)?;
        let level = &self.levels[lev];
        let mut counts = vec![0i64; level.layout.ba.len()];
        for (&i, tile) in &level.tiles {
            counts[i] = tile.len() as i64;
        }
        Ok(counts)
    }

    /// Add one per particle to component 0 of the cell holding it.
    pub fn increment(&self, mf: &mut MeshField, lev: usize) -> PicResult<()> {
        self.check_level(lev)?;
        let level = &self.levels[lev];
        for (&i, tile) in &level.tiles {
            let fab = mf.fab_mut(i).ok_or_else(|| missing_fab("count", i))?;
            for p in tile {
                fab.add_at(level.layout.geom.cell_index(p.pos), 0, 1.0);
            }
        }
        Ok(())
    }

    /// Replace the box array of `lev`. Particles on that level wait for a full
    /// redistribution.
    pub fn set_box_array(&mut self, lev: usize, ba: BoxArray) -> PicResult<()> {
        self.check_level(lev)?;
        let level = &mut self.levels[lev];
        if ba.len() != level.layout.dm.len() {
            // placeholder until a matching distribution map is installed
            level.layout.dm = DistributionMap::round_robin(ba.len(), self.nranks);
        }
        level.layout.ba = ba;
        self.orphan_level(lev);
        Ok(())
    }

    pub fn set_distribution_map(&mut self, lev: usize, dm: DistributionMap) -> PicResult<()> {
        self.check_level(lev)?;
        if dm.len() != self.levels[lev].layout.ba.len() {
            return Err(PicError::Config(format!(
                "distribution map has {} entries for {} boxes",
                dm.len(),
                self.levels[lev].layout.ba.len()
            )));
        }
        self.levels[lev].layout.dm = dm;
        self.orphan_level(lev);
        Ok(())
    }

    fn orphan_level(&mut self, lev: usize) {
        let rank = self.rank;
        let level = &mut self.levels[lev];
        for (_, mut tile) in std::mem::take(&mut level.tiles) {
            self.orphans.append(&mut tile);
        }
        for i in level.layout.dm.local_boxes(rank) {
            level.tiles.entry(i).or_default();
        }
    }

    /// Apply the domain boundary policy. Returns false if the particle is absorbed.
    fn apply_boundary(&self, p: &mut Particle) -> bool {
        let geom = &self.levels[0].layout.geom;
        geom.wrap_position(&mut p.pos);
        let outside = geom.outside_axes(p.pos);
        if !outside.iter().any(|&o| o) {
            return true;
        }
        match self.boundary {
            BoundaryPolicy::Absorb => false,
            BoundaryPolicy::Reflect => {
                let dx = geom.cell_size();
                for d in 0..3 {
                    if !outside[d] {
                        continue;
                    }
                    let (lo, hi) = (geom.prob_lo[d], geom.prob_hi[d]);
                    if p.pos[d] < lo {
                        p.pos[d] = 2.0 * lo - p.pos[d];
                    } else {
                        p.pos[d] = 2.0 * hi - p.pos[d];
                    }
                    p.pos[d] = p.pos[d].clamp(lo, hi - 1e-9 * dx[d]);
                    p.mom[d] = -p.mom[d];
                }
                true
            }
        }
    }

    /// Move every particle to the tile, and rank, that owns its position.
    ///
    /// In `Local` mode a particle found more than `num_ghost` cells away from
    /// its previous box is an invariant violation and aborts the call.
    pub fn redistribute(
        &mut self,
        mode: RedistributeMode,
        comm: &dyn Communicator,
    ) -> PicResult<RedistributeStats> {
        profile_scope!("redistribute");
        if let RedistributeMode::Local { .. } = mode {
            if !self.orphans.is_empty() {
                return Err(PicError::Config(format!(
                    "species '{}' has {} particles displaced by a layout change; a full redistribution is required",
                    self.name,
                    self.orphans.len()
                )));
            }
        }

        let mut stats = RedistributeStats::default();
        let mut outgoing: Vec<Vec<Routed>> = vec![Vec::new(); comm.size()];
        let mut staying: Vec<Routed> = Vec::new();

        let mut drained: Vec<(Option<(usize, usize)>, Particle)> = Vec::with_capacity(self.num_local());
        for (lev, level) in self.levels.iter_mut().enumerate() {
            for (bx, tile) in std::mem::take(&mut level.tiles) {
                drained.extend(tile.into_iter().map(|p| (Some((lev, bx)), p)));
            }
        }
        drained.extend(std::mem::take(&mut self.orphans).into_iter().map(|p| (None, p)));

        for (from, mut p) in drained {
            if let (RedistributeMode::Local { num_ghost }, Some((lev, bx))) = (mode, from) {
                let layout = &self.levels[lev].layout;
                let cell = layout.geom.cell_index(p.pos);
                if !layout.ba.get(bx).grow(num_ghost).contains(cell) {
                    return Err(PicError::RedistributeOutOfRange {
                        species: self.name.clone(),
                        id: p.id,
                        from_box: bx,
                        cell,
                    });
                }
            }
            if !self.apply_boundary(&mut p) {
                stats.absorbed += 1;
                continue;
            }
            let (lev, bx) = self.locate(p.pos).ok_or_else(|| {
                PicError::Config(format!(
                    "species '{}': no box contains position {:?}",
                    self.name, p.pos
                ))
            })?;
            let owner = self.levels[lev].layout.dm.owner(bx);
            let routed = Routed { lev, bx, particle: p };
            if owner == self.rank {
                stats.kept += 1;
                staying.push(routed);
            } else {
                stats.sent += 1;
                outgoing[owner].push(routed);
            }
        }

        let incoming = comm.exchange(outgoing)?;
        stats.received = incoming.len();

        self.alloc_data();
        for r in staying.into_iter().chain(incoming) {
            self.levels[r.lev].tiles.entry(r.bx).or_default().push(r.particle);
        }
        Ok(stats)
    }

    /// Copy out the particles crossing the slice, in lab-frame quantities,
    /// grouped by the (level, box) tile they live in.
    pub fn particle_slice(&self, request: &SliceRequest) -> DiagnosticParticles {
        profile_scope!("particle_slice");
        let d = request.direction;
        let mut out = DiagnosticParticles::new();
        for (lev, level) in self.levels.iter().enumerate() {
            for (&bx, tile) in &level.tiles {
                for p in tile {
                    let f = match request.crossing_fraction(p.prev_pos[d], p.pos[d]) {
                        Some(f) => f,
                        None => continue,
                    };
                    let mut pos = [0.0; 3];
                    let mut mom = [0.0; 3];
                    for k in 0..3 {
                        pos[k] = p.prev_pos[k] + f * (p.pos[k] - p.prev_pos[k]);
                        mom[k] = p.prev_mom[k] + f * (p.mom[k] - p.prev_mom[k]);
                    }
                    let t = request.t_boost - (1.0 - f) * request.dt;
                    let (t_lab, pos_lab, mom_lab) = request.to_lab(t, pos, mom);
                    out.entry((lev, bx)).or_default().push(t_lab, pos_lab, mom_lab, p.weight, p.id);
                }
            }
        }
        out
    }

    /// Drop every particle (used by variants that rebuild their population).
    pub fn clear(&mut self) {
        for level in &mut self.levels {
            level.tiles.values_mut().for_each(Vec::clear);
        }
        self.orphans.clear();
    }
}

fn missing_fab(field: &str, bx: usize) -> PicError {
    PicError::IncompatibleField(format!("{} has no local data for box {}", field, bx))
}

/// Deposit a tile through per-chunk scratch boxes merged in chunk order.
fn deposit_chunked<F>(tile: &[Particle], fab: &mut FieldBox, kernel: F) -> usize
where
    F: Fn(&Particle, &mut FieldBox) -> usize + Sync,
{
    if tile.is_empty() {
        return 0;
    }
    let valid = *fab.valid_box();
    let ngrow = valid.lo[0] - fab.grown_box().lo[0];
    let ncomp = fab.ncomp();
    let partials: Vec<(FieldBox, usize)> = tile
        .par_chunks(DEPOSIT_CHUNK)
        .map(|chunk| {
            let mut scratch = FieldBox::new(valid, ngrow, ncomp);
            let dropped = chunk.iter().map(|p| kernel(p, &mut scratch)).sum();
            (scratch, dropped)
        })
        .collect();
    let mut dropped = 0;
    for (scratch, d) in partials {
        fab.data_mut().iter_mut().zip(scratch.data()).for_each(|(a, b)| *a += b);
        dropped += d;
    }
    dropped
}
