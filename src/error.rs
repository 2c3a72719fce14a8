// error.rs
// Error taxonomy for the species coordinator and its collaborators

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PicError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("particles.nspecies must be non-negative, got {0}")]
    NegativeSpeciesCount(i64),

    #[error("particles.species_names has {names} entries but particles.nspecies = {declared}")]
    SpeciesCountMismatch { declared: usize, names: usize },

    #[error("species '{name}' in particles.rigid_injected_species must be part of particles.species_names")]
    UnknownOverrideSpecies { name: String },

    #[error("Collective operation '{op}' failed: {detail}")]
    Collective { op: &'static str, detail: String },

    #[error(
        "Species '{species}': particle {id} left the neighborhood of box {from_box} \
         (cell {cell:?}) during local redistribution"
    )]
    RedistributeOutOfRange {
        species: String,
        id: u64,
        from_box: usize,
        cell: [i64; 3],
    },

    #[error(
        "Species '{species}': {dropped} {field} stencil points fell outside the ghost region; \
         mesh.ngrow is too small for how far particles travel between redistributions"
    )]
    DepositOutsideGhosts {
        species: String,
        field: &'static str,
        dropped: usize,
    },

    #[error("Level {lev} out of range ({nlevels} levels)")]
    LevelOutOfRange { lev: usize, nlevels: usize },

    #[error("Incompatible field: {0}")]
    IncompatibleField(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Encoding error: {0}")]
    Encode(#[from] bincode::Error),
}

pub type PicResult<T> = Result<T, PicError>;
