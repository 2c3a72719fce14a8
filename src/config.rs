// config.rs
// Input-file surface for the particle subsystem and its one-shot validation

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::{PicError, PicResult};
use crate::species::{SpeciesDescriptor, SpeciesKind};

// ====================
// Defaults
// ====================
pub const DEFAULT_N_CELL: [i64; 3] = [32, 8, 8];
pub const DEFAULT_MAX_GRID_SIZE: i64 = 8;
pub const DEFAULT_NGROW: i64 = 2;
/// Courant number used when `run.dt` is not given.
pub const DEFAULT_CFL: f64 = 0.9;
/// Ghost count for local redistribution on a fixed grid.
pub const LOCAL_REDISTRIBUTE_GHOSTS: i64 = 1;
/// Ghost count for local redistribution while the window is moving.
pub const MOVING_WINDOW_REDISTRIBUTE_GHOSTS: i64 = 2;
/// Antenna particle speed amplitude as a fraction of c.
pub const LASER_MOBILITY: f64 = 0.01;

fn default_one() -> f64 {
    1.0
}

fn default_n_ranks() -> usize {
    1
}

fn default_n_steps() -> usize {
    10
}

fn default_charge() -> f64 {
    -1.0
}

fn default_ppc() -> [usize; 3] {
    [1, 1, 1]
}

fn default_boost_direction() -> usize {
    2
}

fn default_n_cell() -> [i64; 3] {
    DEFAULT_N_CELL
}

fn default_max_grid_size() -> i64 {
    DEFAULT_MAX_GRID_SIZE
}

fn default_ngrow() -> i64 {
    DEFAULT_NGROW
}

fn default_prob_hi() -> [f64; 3] {
    [1.0e-5, 1.0e-5, 1.0e-5]
}

fn default_periodic() -> [bool; 3] {
    [true, true, true]
}

fn default_snapshot_interval() -> usize {
    1
}

fn default_output_dir() -> String {
    "lab_frame_data".to_string()
}

/// Whole input file. Every table is optional; a missing table takes its defaults.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct InputFile {
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub particles: ParticlesConfig,
    /// Per-species physical parameters keyed by species name.
    #[serde(default)]
    pub species: BTreeMap<String, SpeciesParams>,
    pub laser: Option<LaserParams>,
    #[serde(default)]
    pub mesh: MeshConfig,
}

impl InputFile {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> PicResult<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> PicResult<Self> {
        let input: InputFile = toml::from_str(content)?;
        Ok(input)
    }

    /// Physical parameters for `name`, falling back to defaults (no injected particles).
    pub fn species_params(&self, name: &str) -> SpeciesParams {
        self.species.get(name).cloned().unwrap_or_default()
    }
}

/// Global switches that are not owned by the particle subsystem but change its behavior.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunConfig {
    /// Append a laser antenna pseudo-species after the declared species.
    #[serde(default)]
    pub use_laser: bool,
    /// The simulation window translates along `boost_direction`.
    #[serde(default)]
    pub do_moving_window: bool,
    /// Lorentz factor of the boosted frame (1 = lab frame).
    #[serde(default = "default_one")]
    pub gamma_boost: f64,
    #[serde(default = "default_boost_direction")]
    pub boost_direction: usize,
    #[serde(default)]
    pub seed: u64,
    /// Time step in seconds. Derived from the CFL limit when omitted.
    pub dt: Option<f64>,
    #[serde(default = "default_n_steps")]
    pub n_steps: usize,
    /// Number of in-process ranks the binary launches.
    #[serde(default = "default_n_ranks")]
    pub n_ranks: usize,
    /// Uniform external fields handed to the gather pass.
    #[serde(default)]
    pub e_external: [f64; 3],
    #[serde(default)]
    pub b_external: [f64; 3],
    pub lab_frame: Option<LabFrameConfig>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            use_laser: false,
            do_moving_window: false,
            gamma_boost: 1.0,
            boost_direction: default_boost_direction(),
            seed: 0,
            dt: None,
            n_steps: default_n_steps(),
            n_ranks: default_n_ranks(),
            e_external: [0.0; 3],
            b_external: [0.0; 3],
            lab_frame: None,
        }
    }
}

impl RunConfig {
    /// Ghost count used by local redistribution.
    pub fn local_redistribute_ghosts(&self) -> i64 {
        if self.do_moving_window {
            MOVING_WINDOW_REDISTRIBUTE_GHOSTS
        } else {
            LOCAL_REDISTRIBUTE_GHOSTS
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LabFrameConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    /// Steps between slice extractions.
    #[serde(default = "default_snapshot_interval")]
    pub interval: usize,
    /// Boosted-frame position of the slice at t = 0.
    #[serde(default)]
    pub z_start: f64,
}

/// Raw `[particles]` table, exactly as read.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ParticlesConfig {
    #[serde(default)]
    pub nspecies: i64,
    #[serde(default)]
    pub species_names: Vec<String>,
    /// Species that use the rigid-injected variant instead of the physical one.
    #[serde(default)]
    pub rigid_injected_species: Vec<String>,
    /// Finite-difference numerical Cherenkov correction.
    #[serde(default)]
    pub use_fdtd_nci_corr: bool,
    /// Lower the shape order used for the transverse current.
    #[serde(default)]
    pub l_lower_order_in_v: bool,
}

/// Validated species declarations. Only `ParticlesConfig::validate` builds one,
/// so holding a `SpeciesTable` means the checks have run.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeciesTable {
    descriptors: Vec<SpeciesDescriptor>,
    pub use_fdtd_nci_corr: bool,
    pub l_lower_order_in_v: bool,
}

impl SpeciesTable {
    pub fn descriptors(&self) -> &[SpeciesDescriptor] {
        &self.descriptors
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

impl ParticlesConfig {
    /// Check the declared species for consistency and resolve each one's kind.
    ///
    /// All species are `Physical` unless named in `rigid_injected_species`.
    /// Any inconsistency is fatal for the run and is returned as an error.
    pub fn validate(&self) -> PicResult<SpeciesTable> {
        if self.nspecies < 0 {
            return Err(PicError::NegativeSpeciesCount(self.nspecies));
        }
        let declared = self.nspecies as usize;
        if self.species_names.len() != declared {
            return Err(PicError::SpeciesCountMismatch {
                declared,
                names: self.species_names.len(),
            });
        }

        let mut kinds = vec![SpeciesKind::Physical; declared];
        for (i, name) in self.species_names.iter().enumerate() {
            if self.species_names[..i].contains(name) {
                return Err(PicError::Config(format!(
                    "species name '{}' is declared more than once",
                    name
                )));
            }
        }
        for name in &self.rigid_injected_species {
            let i = self
                .species_names
                .iter()
                .position(|n| n == name)
                .ok_or_else(|| PicError::UnknownOverrideSpecies { name: name.clone() })?;
            kinds[i] = SpeciesKind::RigidInjected;
        }

        let descriptors = self
            .species_names
            .iter()
            .zip(kinds)
            .enumerate()
            .map(|(index, (name, kind))| SpeciesDescriptor::new(name.clone(), kind, index))
            .collect();

        Ok(SpeciesTable {
            descriptors,
            use_fdtd_nci_corr: self.use_fdtd_nci_corr,
            l_lower_order_in_v: self.l_lower_order_in_v,
        })
    }
}

/// Behavior of particles reaching a non-periodic domain edge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryPolicy {
    #[default]
    Absorb,
    Reflect,
}

/// Uniform plasma injected at start-up. A zero density injects nothing.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct InjectionProfile {
    /// Physical number density (m^-3).
    #[serde(default)]
    pub density: f64,
    /// Macro-particles per cell along each axis.
    #[serde(default = "default_ppc")]
    pub ppc: [usize; 3],
    /// Injection region; defaults to the whole domain.
    pub region_lo: Option<[f64; 3]>,
    pub region_hi: Option<[f64; 3]>,
    /// Mean momentum `gamma * v` (m/s).
    #[serde(default)]
    pub u_mean: [f64; 3],
    /// Thermal spread of `gamma * v` (m/s).
    #[serde(default)]
    pub u_thermal: [f64; 3],
}

impl Default for InjectionProfile {
    fn default() -> Self {
        Self {
            density: 0.0,
            ppc: default_ppc(),
            region_lo: None,
            region_hi: None,
            u_mean: [0.0; 3],
            u_thermal: [0.0; 3],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SpeciesParams {
    /// Charge in units of the elementary charge.
    #[serde(default = "default_charge")]
    pub charge: f64,
    /// Mass in units of the electron mass.
    #[serde(default = "default_one")]
    pub mass: f64,
    #[serde(default)]
    pub profile: InjectionProfile,
    #[serde(default)]
    pub boundary: BoundaryPolicy,
    /// Rigid-injected species only: particles move ballistically until they
    /// cross this plane along the boost direction.
    #[serde(default)]
    pub zinject_plane: f64,
}

impl Default for SpeciesParams {
    fn default() -> Self {
        Self {
            charge: default_charge(),
            mass: 1.0,
            profile: InjectionProfile::default(),
            boundary: BoundaryPolicy::default(),
            zinject_plane: 0.0,
        }
    }
}

impl SpeciesParams {
    pub fn charge_si(&self) -> f64 {
        self.charge * crate::units::ELEMENTARY_CHARGE
    }

    pub fn mass_si(&self) -> f64 {
        self.mass * crate::units::ELECTRON_MASS
    }
}

/// Laser antenna description.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LaserParams {
    /// A point on the antenna plane.
    #[serde(default)]
    pub position: [f64; 3],
    /// Axis normal to the antenna plane.
    #[serde(default = "default_boost_direction")]
    pub direction: usize,
    /// Unit vector of the emitted field polarization.
    pub polarization: [f64; 3],
    /// Peak field amplitude (V/m).
    pub e_max: f64,
    pub wavelength: f64,
    /// Transverse Gaussian waist (m).
    pub waist: f64,
    /// Temporal Gaussian duration (s).
    pub duration: f64,
    /// Time of the envelope peak (s).
    #[serde(default)]
    pub t_peak: f64,
}

/// A refined patch given in the index space of the level below it.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RefinedRegion {
    pub lo: [i64; 3],
    pub hi: [i64; 3],
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MeshConfig {
    #[serde(default = "default_n_cell")]
    pub n_cell: [i64; 3],
    #[serde(default = "default_max_grid_size")]
    pub max_grid_size: i64,
    #[serde(default)]
    pub prob_lo: [f64; 3],
    #[serde(default = "default_prob_hi")]
    pub prob_hi: [f64; 3],
    #[serde(default = "default_periodic")]
    pub periodic: [bool; 3],
    /// Ghost width of the charge and current fields.
    #[serde(default = "default_ngrow")]
    pub ngrow: i64,
    /// One entry per refined level, refinement ratio 2.
    #[serde(default)]
    pub refined_regions: Vec<RefinedRegion>,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            n_cell: DEFAULT_N_CELL,
            max_grid_size: DEFAULT_MAX_GRID_SIZE,
            prob_lo: [0.0; 3],
            prob_hi: default_prob_hi(),
            periodic: default_periodic(),
            ngrow: DEFAULT_NGROW,
            refined_regions: Vec::new(),
        }
    }
}
