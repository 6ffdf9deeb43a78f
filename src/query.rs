//! Uploaded query handling.
//!
//! An upload is staged into a private temporary `.fasta` file that lives for
//! exactly one run. The first FASTA record names the query: its identifier
//! labels the new leaf in the tree and is looked up again by the subtype
//! stage.

use crate::errors::PipelineError;
use anyhow::{Context, Result};
use bio::io::fasta;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Immutable description of one analysis run's input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisRequest {
    pub query_id: String,
    pub query_length: usize,
    pub sequence_path: PathBuf,
}

impl AnalysisRequest {
    /// Read the first record of the FASTA file at `path`.
    pub fn from_fasta(path: &Path) -> Result<Self, PipelineError> {
        let file = File::open(path).map_err(|e| {
            PipelineError::invalid_upload(format!("cannot open {}: {}", path.display(), e))
        })?;

        let record = match fasta::Reader::new(file).records().next() {
            Some(Ok(record)) => record,
            Some(Err(e)) => {
                return Err(PipelineError::invalid_upload(format!(
                    "not a FASTA file: {e}"
                )));
            }
            None => return Err(PipelineError::invalid_upload("no sequence records found")),
        };

        let query_id = record.id().to_string();
        validate_query_id(&query_id)?;

        let query_length = record.seq().len();
        if query_length == 0 {
            return Err(PipelineError::invalid_upload(format!(
                "sequence '{query_id}' is empty"
            )));
        }

        Ok(Self {
            query_id,
            query_length,
            sequence_path: path.to_path_buf(),
        })
    }
}

/// The identifier becomes part of output file names, so it must be a
/// single path component.
fn validate_query_id(id: &str) -> Result<(), PipelineError> {
    if id.is_empty() {
        return Err(PipelineError::invalid_upload(
            "first record has an empty identifier",
        ));
    }
    if id == "." || id == ".." || id.contains(['/', '\\']) {
        return Err(PipelineError::invalid_upload(format!(
            "identifier '{id}' cannot be used as a file name"
        )));
    }
    Ok(())
}

/// A private copy of the uploaded sequence.
#[derive(Debug)]
pub struct StagedUpload {
    file: NamedTempFile,
    sha256: String,
    bytes: u64,
}

impl StagedUpload {
    /// Stage a copy of the file at `path`.
    pub fn from_path(path: &Path) -> Result<Self> {
        let source =
            File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        Self::from_reader(source)
    }

    /// Stage everything readable from `reader` (used for stdin uploads).
    pub fn from_reader(mut reader: impl Read) -> Result<Self> {
        let mut file = tempfile::Builder::new()
            .prefix("subtyper-")
            .suffix(".fasta")
            .tempfile()
            .context("Failed to create temporary upload file")?;

        let mut hasher = Sha256::new();
        let mut bytes = 0u64;
        let mut buf = [0u8; 8192];
        loop {
            let n = reader.read(&mut buf).context("Failed to read upload")?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            file.write_all(&buf[..n])
                .context("Failed to write temporary upload file")?;
            bytes += n as u64;
        }
        file.flush().context("Failed to flush temporary upload file")?;

        Ok(Self {
            file,
            sha256: format!("{:x}", hasher.finalize()),
            bytes,
        })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn sha256(&self) -> &str {
        &self.sha256
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Delete the staged file. Best-effort: a file that is already gone is
    /// fine, anything else is logged.
    pub fn cleanup(self) {
        let path = self.file.path().to_path_buf();
        match self.file.close() {
            Ok(()) => tracing::debug!(path = %path.display(), "removed staged upload"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to remove staged upload")
            }
        }
    }
}
