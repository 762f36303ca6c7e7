//! Keyed result store.
//!
//! One JSON file per `(paradigm, n)`, at `<root>/<paradigm>/<n>.json`,
//! holding a map from configuration signature to its latest
//! [`RunRecord`]. Re-running a key overwrites that entry in place;
//! nothing is ever appended as a duplicate. Writes go through a
//! sibling temp file and an atomic rename, so a crashed run never
//! leaves a half-written file behind.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::Error;
use crate::models::{Paradigm, RunRecord};

/// Handle on a result tree rooted at one directory.
#[derive(Debug, Clone)]
pub struct ResultStore {
    root: PathBuf,
}

impl ResultStore {
    /// Opens (and creates, if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, Error> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn file_path(&self, paradigm: Paradigm, n: u32) -> PathBuf {
        self.root.join(paradigm.label()).join(format!("{n}.json"))
    }

    /// Inserts or overwrites the record under its own key.
    pub fn put(&self, record: &RunRecord) -> Result<(), Error> {
        let path = self.file_path(record.paradigm, record.n);
        let mut records = read_map(&path)?;
        let replaced = records
            .insert(record.signature.clone(), record.clone())
            .is_some();
        debug!(
            paradigm = record.paradigm.label(),
            n = record.n,
            signature = %record.signature,
            replaced,
            "storing run record"
        );
        write_map(&path, &records)
    }

    /// The record for one configuration key, if any.
    pub fn get(&self, paradigm: Paradigm, n: u32, signature: &str) -> Result<Option<RunRecord>, Error> {
        Ok(read_map(&self.file_path(paradigm, n))?.remove(signature))
    }

    /// All records for `(paradigm, n)`, keyed by signature.
    pub fn records(&self, paradigm: Paradigm, n: u32) -> Result<BTreeMap<String, RunRecord>, Error> {
        read_map(&self.file_path(paradigm, n))
    }

    /// Instance sizes for which the paradigm has any record, ascending.
    pub fn instances(&self, paradigm: Paradigm) -> Result<Vec<u32>, Error> {
        let dir = self.root.join(paradigm.label());
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<u32>().ok());
            if let Some(n) = stem {
                out.push(n);
            }
        }
        out.sort_unstable();
        Ok(out)
    }
}

fn read_map(path: &Path) -> Result<BTreeMap<String, RunRecord>, Error> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn write_map(path: &Path, records: &BTreeMap<String, RunRecord>) -> Result<(), Error> {
    let dir = path.parent().expect("store files live under the root");
    fs::create_dir_all(dir)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_vec_pretty(records)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
