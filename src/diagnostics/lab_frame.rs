// diagnostics/lab_frame.rs
// Appends per-species lab-frame slices to gzip-compressed bincode files

use flate2::{read::MultiGzDecoder, write::GzEncoder, Compression};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{BufWriter, Cursor, Read, Write};
use std::path::{Path, PathBuf};

use super::{DiagnosticParticles, SliceParticles};
use crate::error::PicResult;
use crate::profile_scope;

/// One extraction's worth of particles for one species on one rank.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LabFrameBatch {
    pub i_lab: usize,
    pub rank: usize,
    pub particles: SliceParticles,
}

/// Writes `<dir>/<snapshot>/<species>.rank<r>.bin.gz`, one gzip member per batch.
pub struct LabFrameWriter {
    root: PathBuf,
    rank: usize,
}

impl LabFrameWriter {
    pub fn new<P: AsRef<Path>>(root: P, rank: usize) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            rank,
        }
    }

    pub fn path_for(&self, snapshot: &str, species: &str) -> PathBuf {
        self.root
            .join(snapshot)
            .join(format!("{}.rank{}.bin.gz", species, self.rank))
    }

    /// Flatten `slice` in key order and append it as one batch.
    pub fn append(
        &self,
        snapshot: &str,
        species: &str,
        i_lab: usize,
        slice: &DiagnosticParticles,
    ) -> PicResult<usize> {
        profile_scope!("lab_frame_write");
        let mut particles = SliceParticles::default();
        for group in slice.values() {
            particles.append(&mut group.clone());
        }
        let n = particles.len();
        let batch = LabFrameBatch { i_lab, rank: self.rank, particles };

        let path = self.path_for(snapshot, species);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::fast());
        bincode::serialize_into(&mut encoder, &batch)?;
        let mut writer = encoder.finish()?;
        writer.flush()?;
        Ok(n)
    }
}

/// Read back every batch appended to `path`.
pub fn read_batches<P: AsRef<Path>>(path: P) -> PicResult<Vec<LabFrameBatch>> {
    let data = std::fs::read(path.as_ref())?;
    let mut decoded = Vec::new();
    MultiGzDecoder::new(Cursor::new(data)).read_to_end(&mut decoded)?;

    let mut cursor = Cursor::new(decoded.as_slice());
    let mut batches = Vec::new();
    while (cursor.position() as usize) < decoded.len() {
        batches.push(bincode::deserialize_from(&mut cursor)?);
    }
    Ok(batches)
}
