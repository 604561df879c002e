//! Filesystem enumeration for the list and search operations

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Requested file name -> path relative to the upload directory ("" when not found)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SearchResults(pub BTreeMap<String, String>);

impl SearchResults {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Find the first regular file named `filename` anywhere under `root`.
///
/// Entries are visited in file-name order so the answer is stable, but only
/// one match is ever returned: duplicates in other directories are ignored.
/// Symlinks are not followed and unreadable entries are skipped.
pub fn resolve(root: &Path, filename: &str) -> Option<PathBuf> {
    if filename.is_empty() || filename.contains(['/', '\\']) {
        return None;
    }

    WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .find(|e| e.file_name() == OsStr::new(filename))
        .and_then(|e| e.path().strip_prefix(root).ok().map(Path::to_path_buf))
}

/// Resolve every name, rendering found paths with `/` separators
pub fn resolve_all<S: AsRef<str>>(root: &Path, names: &[S]) -> SearchResults {
    let mut results = BTreeMap::new();
    for name in names {
        let name = name.as_ref();
        let found = resolve(root, name)
            .map(|p| to_wire_path(&p))
            .unwrap_or_default();
        results.insert(name.to_string(), found);
    }
    SearchResults(results)
}

fn to_wire_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Immediate entries of `root` (files and directories), sorted by name.
/// A missing directory lists as empty.
pub fn list_entries(root: &Path) -> Result<Vec<String>> {
    let read_dir = match std::fs::read_dir(root) {
        Ok(rd) => rd,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut names = Vec::new();
    for entry in read_dir {
        let entry = entry?;
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    Ok(names)
}
