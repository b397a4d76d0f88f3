//! Duplicate detection state: session index, manifest, numbering allocator
//!
//! Two separately-scoped stores. The session index holds perceptual hashes
//! seen since startup and is lost on restart. The manifest is an
//! append-only on-disk record of `<content-hash> <file-number>` lines and
//! is authoritative for persistence decisions.

use anyhow::{Context, Result};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

pub const MANIFEST_FILE: &str = "hashes.txt";

/// In-memory perceptual-hash set for the current server session.
#[derive(Debug, Default)]
pub struct SessionIndex {
    seen: HashSet<u64>,
}

impl SessionIndex {
    pub fn new() -> Self {
        SessionIndex::default()
    }

    pub fn is_duplicate(&self, hash: u64) -> bool {
        self.seen.contains(&hash)
    }

    pub fn record(&mut self, hash: u64) {
        self.seen.insert(hash);
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// Snapshot of the manifest plus the allocator state derived from it.
#[derive(Debug, Default)]
pub struct ManifestData {
    /// content-hash -> assigned file number
    pub known: HashMap<String, u32>,
    /// Gap numbers available for reuse, smallest first
    pub missing: BTreeSet<u32>,
    /// Highest number assigned so far
    pub max: u32,
}

/// Assign the next file number: smallest gap if one exists, else max+1.
/// `max` never decreases.
pub fn assign_number(data: &mut ManifestData) -> u32 {
    if let Some(n) = data.missing.iter().next().copied() {
        data.missing.remove(&n);
        data.max = data.max.max(n);
        return n;
    }
    data.max += 1;
    data.max
}

/// Create the save directory and an empty manifest if either is absent.
pub fn ensure_save_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("creating save directory {}", dir.display()))?;
    let manifest = dir.join(MANIFEST_FILE);
    if !manifest.exists() {
        std::fs::File::create(&manifest)
            .with_context(|| format!("creating manifest {}", manifest.display()))?;
    }
    Ok(())
}

/// Load the manifest and compute allocator state. A number counts as a gap
/// when its `<number>.png` no longer exists on disk, so files deleted out
/// of band free their numbers; malformed manifest lines are skipped.
pub fn load_manifest(dir: &Path) -> Result<ManifestData> {
    let manifest = dir.join(MANIFEST_FILE);
    let mut known: HashMap<String, u32> = HashMap::new();

    if manifest.exists() {
        let contents = std::fs::read_to_string(&manifest)
            .with_context(|| format!("reading manifest {}", manifest.display()))?;
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut parts = line.split_whitespace();
            if let (Some(hash), Some(num)) = (parts.next(), parts.next()) {
                if let Ok(n) = num.parse::<u32>() {
                    known.insert(hash.to_string(), n);
                }
            }
        }
    }

    let max = known.values().copied().max().unwrap_or(0);
    let mut missing = BTreeSet::new();
    for n in 1..=max {
        if !dir.join(format!("{n}.png")).exists() {
            missing.insert(n);
        }
    }

    Ok(ManifestData {
        known,
        missing,
        max,
    })
}

/// Append one `(hash, number)` pair. Callers serialize appends; the file
/// itself is only ever opened in append mode.
pub fn append_manifest(dir: &Path, hash: &str, number: u32) -> Result<()> {
    let manifest = dir.join(MANIFEST_FILE);
    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&manifest)
        .with_context(|| format!("opening manifest {}", manifest.display()))?;
    writeln!(f, "{hash} {number}")?;
    Ok(())
}
