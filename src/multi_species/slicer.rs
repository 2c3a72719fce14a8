// multi_species/slicer.rs
// Boosted-frame slice extraction across all species

use super::MultiSpecies;
use crate::diagnostics::{total_selected, DiagnosticParticles, LabFrameWriter, SliceRequest};
use crate::error::PicResult;
use crate::parallel::{Communicator, CommunicatorExt};
use crate::root_info;
use crate::species::SpeciesDescriptor;

impl MultiSpecies {
    /// Particles of every species crossing `request`, in registry order.
    /// Species stores are left untouched.
    pub fn particle_slices(&self, request: &SliceRequest) -> Vec<(SpeciesDescriptor, DiagnosticParticles)> {
        self.species
            .iter()
            .map(|s| (s.descriptor().clone(), s.particle_slice(request)))
            .collect()
    }

    /// Extract the slice of every species, log how many particles each one
    /// contributed over all ranks and, with a writer, append them to
    /// `snapshot` as lab-frame step `i_lab`. Returns the global total.
    pub fn write_lab_frame_data(
        &self,
        snapshot: &str,
        i_lab: usize,
        request: &SliceRequest,
        writer: Option<&LabFrameWriter>,
        comm: &dyn Communicator,
    ) -> PicResult<i64> {
        let slices = self.particle_slices(request);
        let mut selected: Vec<i64> = slices.iter().map(|(_, s)| total_selected(s) as i64).collect();
        comm.all_reduce_sum_i64(&mut selected)?;
        for ((desc, _), n) in slices.iter().zip(&selected) {
            root_info!(comm, "Diagnostics selected {} particles of '{}'.", n, desc.name);
        }
        if let Some(writer) = writer {
            for (desc, slice) in &slices {
                writer.append(snapshot, &desc.name, i_lab, slice)?;
            }
        }
        Ok(selected.iter().sum())
    }
}
