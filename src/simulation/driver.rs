// simulation/driver.rs
// Contains the Simulation struct: mesh levels, shared fields, the species
// coordinator and one time step (evolve, redistribute, lab-frame slices)

use serde::Serialize;
use std::path::PathBuf;

use crate::config::{InputFile, LabFrameConfig, RunConfig, DEFAULT_CFL};
use crate::diagnostics::{LabFrameWriter, SliceRequest};
use crate::error::{PicError, PicResult};
use crate::mesh::{build_levels, LevelLayout, MeshField};
use crate::multi_species::MultiSpecies;
use crate::parallel::{Communicator, CommunicatorExt};
use crate::particles::push::courant_dt;
use crate::profile_scope;
use crate::root_info;
use crate::species::{CurrentTargets, EmFields};
use crate::units::{beta_from_gamma, SPEED_OF_LIGHT};

/// Boosted-frame slice tracking for lab-frame output.
struct LabFrameState {
    config: LabFrameConfig,
    writer: LabFrameWriter,
    /// Slice speed in the boosted frame (m/s, towards lower coordinates).
    speed: f64,
}

impl LabFrameState {
    fn slice_position(&self, t: f64) -> f64 {
        self.config.z_start - self.speed * t
    }
}

/// Totals reported at the end of a run.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RunSummary {
    pub steps: usize,
    pub time: f64,
    pub dt: f64,
    pub particles: i64,
    pub total_charge: f64,
    pub species: Vec<SpeciesSummary>,
    pub lab_frame_selected: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SpeciesSummary {
    pub name: String,
    pub kind: String,
    pub particles: i64,
}

/// One rank's share of a simulation.
pub struct Simulation<'c> {
    comm: &'c dyn Communicator,
    run: RunConfig,
    layouts: Vec<LevelLayout>,
    e: Vec<MeshField>,
    b: Vec<MeshField>,
    j: Vec<MeshField>,
    rho: Vec<MeshField>,
    pub species: MultiSpecies,
    pub dt: f64,
    pub step: usize,
    pub time: f64,
    lab_frame: Option<LabFrameState>,
    lab_frame_selected: i64,
}

impl<'c> Simulation<'c> {
    pub fn from_input(input: &InputFile, comm: &'c dyn Communicator) -> PicResult<Self> {
        let layouts = build_levels(&input.mesh, comm.size())?;
        let species = MultiSpecies::from_input(input, &layouts, comm)?;
        let ngrow = input.mesh.ngrow;
        let rank = comm.rank();
        let alloc = |ncomp: usize| -> Vec<MeshField> {
            layouts
                .iter()
                .map(|l| MeshField::new(&l.ba, &l.dm, ncomp, ngrow, rank))
                .collect()
        };
        let mut e = alloc(3);
        let mut b = alloc(3);
        let j = alloc(3);
        let rho = alloc(1);
        e.iter_mut().for_each(|f| fill_uniform(f, input.run.e_external));
        b.iter_mut().for_each(|f| fill_uniform(f, input.run.b_external));

        let finest = &layouts[layouts.len() - 1].geom;
        let dt = match input.run.dt {
            Some(dt) if dt > 0.0 => dt,
            Some(dt) => return Err(PicError::Config(format!("run.dt must be positive, got {}", dt))),
            None => courant_dt(finest.cell_size(), DEFAULT_CFL),
        };

        let lab_frame = input.run.lab_frame.clone().map(|config| {
            let writer = LabFrameWriter::new(PathBuf::from(&config.output_dir), rank);
            let speed = beta_from_gamma(input.run.gamma_boost) * SPEED_OF_LIGHT;
            LabFrameState { config, writer, speed }
        });
        if let Some(lf) = &lab_frame {
            if lf.config.interval == 0 {
                return Err(PicError::Config("run.lab_frame.interval must be at least 1".to_string()));
            }
        }

        root_info!(
            comm,
            "Mesh: {} level(s), {} box(es) on level 0, dt = {:.3e} s, {} rank(s)",
            layouts.len(),
            layouts[0].ba.len(),
            dt,
            comm.size()
        );

        Ok(Self {
            comm,
            run: input.run.clone(),
            layouts,
            e,
            b,
            j,
            rho,
            species,
            dt,
            step: 0,
            time: 0.0,
            lab_frame,
            lab_frame_selected: 0,
        })
    }

    /// Allocate particle storage, create the initial particles and hand each
    /// one to the rank that owns its position.
    pub fn init(&mut self) -> PicResult<i64> {
        self.species.alloc_data();
        let created = self.species.init_data(self.comm)?;
        self.species.redistribute(self.comm)?;
        Ok(created)
    }

    pub fn step(&mut self) -> PicResult<()> {
        profile_scope!("simulation_step");
        let (t, dt, comm) = (self.time, self.dt, self.comm);
        for lev in 0..self.layouts.len() {
            let fields = EmFields { e: &self.e[lev], b: &self.b[lev] };
            let mut targets = CurrentTargets {
                j: &mut self.j[lev],
                rho: Some(&mut self.rho[lev]),
                rho2: None,
            };
            self.species.evolve(lev, fields, &mut targets, t, dt, comm)?;
        }
        self.species.redistribute_local(comm)?;

        self.step += 1;
        self.time += dt;

        if let Some(lf) = &self.lab_frame {
            let request = SliceRequest {
                direction: self.run.boost_direction,
                z_old: lf.slice_position(t),
                z_new: lf.slice_position(self.time),
                t_boost: self.time,
                dt,
                gamma_boost: self.run.gamma_boost,
            };
            let i_lab = (self.step - 1) / lf.config.interval;
            let snapshot = format!("lab_{:05}", i_lab);
            self.lab_frame_selected += self
                .species
                .write_lab_frame_data(&snapshot, i_lab, &request, Some(&lf.writer), comm)?;
        }
        Ok(())
    }

    /// Run `run.n_steps` steps.
    pub fn run(&mut self) -> PicResult<RunSummary> {
        for _ in 0..self.run.n_steps {
            self.step()?;
        }
        self.summary()
    }

    /// Collective: every rank must call it.
    pub fn summary(&self) -> PicResult<RunSummary> {
        let mut counts: Vec<i64> = (0..self.species.len())
            .filter_map(|i| self.species.species(i))
            .map(|s| s.container().num_local() as i64)
            .collect();
        self.comm.all_reduce_sum_i64(&mut counts)?;
        let species = self
            .species
            .descriptors()
            .iter()
            .zip(&counts)
            .map(|(d, &n)| SpeciesSummary { name: d.name.clone(), kind: d.kind.to_string(), particles: n })
            .collect();
        Ok(RunSummary {
            steps: self.step,
            time: self.time,
            dt: self.dt,
            particles: counts.iter().sum(),
            total_charge: self.species.sum_particle_charge(false, self.comm)?,
            species,
            lab_frame_selected: self.lab_frame_selected,
        })
    }

    pub fn charge_density(&self, lev: usize) -> Option<&MeshField> {
        self.rho.get(lev)
    }

    pub fn current_density(&self, lev: usize) -> Option<&MeshField> {
        self.j.get(lev)
    }

    pub fn layouts(&self) -> &[LevelLayout] {
        &self.layouts
    }
}

/// Set every cell of `field`, ghosts included, to `value`.
fn fill_uniform(field: &mut MeshField, value: [f64; 3]) {
    for (_, fab) in field.fabs_mut() {
        let grown = *fab.grown_box();
        for cell in grown.cells() {
            for (comp, v) in value.iter().enumerate() {
                fab.set_at(cell, comp, *v);
            }
        }
    }
}
