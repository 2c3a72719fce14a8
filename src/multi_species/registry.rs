// multi_species/registry.rs
// Builds one species object per declared species, plus the laser antenna

use super::MultiSpecies;
use crate::config::{InputFile, SpeciesTable};
use crate::error::{PicError, PicResult};
use crate::mesh::LevelLayout;
use crate::parallel::Communicator;
use crate::particles::shape::STENCIL_REACH;
use crate::root_info;
use crate::species::{
    LaserSpecies, ParticleSpecies, PhysicalSpecies, RigidInjectedSpecies, SpeciesDescriptor, SpeciesKind,
    LASER_SPECIES_NAME,
};

impl MultiSpecies {
    /// Validate `[particles]` and build the registry.
    pub fn from_input(input: &InputFile, layouts: &[LevelLayout], comm: &dyn Communicator) -> PicResult<Self> {
        let table = input.particles.validate()?;
        Self::new(&table, input, layouts, comm)
    }

    /// Instantiate every species of `table` in order. With `run.use_laser` a
    /// laser antenna is appended after them.
    pub fn new(
        table: &SpeciesTable,
        input: &InputFile,
        layouts: &[LevelLayout],
        comm: &dyn Communicator,
    ) -> PicResult<Self> {
        if layouts.is_empty() {
            return Err(PicError::Config("at least one mesh level is required".to_string()));
        }
        let run = &input.run;
        if run.boost_direction > 2 {
            return Err(PicError::Config(format!(
                "run.boost_direction must be 0, 1 or 2, got {}",
                run.boost_direction
            )));
        }

        let redistribute_ghosts = run.local_redistribute_ghosts();
        if input.mesh.ngrow < redistribute_ghosts + STENCIL_REACH {
            return Err(PicError::Config(format!(
                "mesh.ngrow = {} cannot hold the deposition of particles up to {} cell(s) outside \
                 their box; it must be at least {}",
                input.mesh.ngrow,
                redistribute_ghosts,
                redistribute_ghosts + STENCIL_REACH
            )));
        }

        let mut descriptors: Vec<SpeciesDescriptor> = table.descriptors().to_vec();
        let mut species: Vec<Box<dyn ParticleSpecies>> = Vec::with_capacity(descriptors.len() + 1);
        for desc in &descriptors {
            let params = input.species_params(&desc.name);
            let s: Box<dyn ParticleSpecies> = match desc.kind {
                SpeciesKind::Physical => Box::new(PhysicalSpecies::new(desc.clone(), params, run.seed, layouts, comm)),
                SpeciesKind::RigidInjected => Box::new(RigidInjectedSpecies::new(
                    desc.clone(),
                    params,
                    run.seed,
                    run.boost_direction,
                    layouts,
                    comm,
                )),
                SpeciesKind::Laser => {
                    return Err(PicError::Config(format!(
                        "species '{}' cannot be declared as a laser; use run.use_laser",
                        desc.name
                    )))
                }
            };
            species.push(s);
        }

        if run.use_laser {
            let params = input
                .laser
                .clone()
                .ok_or_else(|| PicError::Config("run.use_laser is set but there is no [laser] table".to_string()))?;
            let desc = SpeciesDescriptor::new(LASER_SPECIES_NAME, SpeciesKind::Laser, descriptors.len());
            species.push(Box::new(LaserSpecies::new(desc.clone(), params, layouts, comm)?));
            descriptors.push(desc);
        }

        for d in &descriptors {
            root_info!(comm, "Species {}: '{}' ({})", d.index, d.name, d.kind);
        }

        Ok(Self {
            species,
            descriptors,
            layouts: layouts.to_vec(),
            rank: comm.rank(),
            nranks: comm.size(),
            rho_ngrow: input.mesh.ngrow,
            redistribute_ghosts,
            use_fdtd_nci_corr: table.use_fdtd_nci_corr,
            l_lower_order_in_v: table.l_lower_order_in_v,
        })
    }
}
