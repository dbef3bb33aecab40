//! Probe-then-read resolution of candidate filenames
//!
//! Watcher notifications are edge-triggered and race with filesystem
//! mutations: a name reported as added may be gone by the time it is read,
//! or may turn out to be a directory. Resolution therefore probes metadata
//! first and treats "vanished or not a regular file" as a successful
//! no-content outcome, not an error.

use std::io;
use std::path::{Path, PathBuf};

use tracing::trace;

use crate::mirror::store::JsonPolicy;
use crate::mirror::{FileContent, MirrorError};

/// A filename under consideration, paired with its absolute path.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub name: String,
    pub path: PathBuf,
}

impl Candidate {
    pub fn new(directory: &Path, name: impl Into<String>) -> Self {
        let name = name.into();
        let path = directory.join(&name);
        Self { name, path }
    }
}

/// Disk type reported by the metadata probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DiskKind {
    Regular,
    /// Directory, special file, or vanished before the probe landed.
    Other,
}

async fn probe(candidate: &Candidate) -> Result<DiskKind, MirrorError> {
    match tokio::fs::metadata(&candidate.path).await {
        Ok(metadata) if metadata.is_file() => Ok(DiskKind::Regular),
        Ok(_) => Ok(DiskKind::Other),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            trace!("{:?} vanished before probe", candidate.name);
            Ok(DiskKind::Other)
        }
        Err(source) => Err(MirrorError::Probe { name: candidate.name.clone(), source }),
    }
}

/// Read the full content as UTF-8-lossy text. `None` means the file
/// vanished between probe and read.
async fn read_text(candidate: &Candidate) -> Result<Option<String>, MirrorError> {
    match tokio::fs::read(&candidate.path).await {
        Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            trace!("{:?} vanished between probe and read", candidate.name);
            Ok(None)
        }
        Err(source) => Err(MirrorError::Read { name: candidate.name.clone(), source }),
    }
}

fn decode(name: &str, text: String, policy: &JsonPolicy) -> Result<FileContent, MirrorError> {
    if policy.applies_to(name) {
        match serde_json::from_str(&text) {
            Ok(value) => Ok(FileContent::Json(value)),
            // Unlike a vanished file, malformed JSON is a real fault.
            Err(source) => Err(MirrorError::Decode { name: name.to_string(), source }),
        }
    } else {
        Ok(FileContent::Text(text))
    }
}

/// Resolve one candidate to its current cached representation:
/// probe, then read if regular, then decode under the JSON policy.
pub async fn resolve(
    candidate: &Candidate,
    policy: &JsonPolicy,
) -> Result<FileContent, MirrorError> {
    match probe(candidate).await? {
        DiskKind::Other => Ok(FileContent::None),
        DiskKind::Regular => match read_text(candidate).await? {
            None => Ok(FileContent::None),
            Some(text) => decode(&candidate.name, text, policy),
        },
    }
}
