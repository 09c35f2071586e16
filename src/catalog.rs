//! Discovery and loading of recorded datasets.
//!
//! The dataset root holds one directory per category, each containing JSON
//! recordings. Listing order follows the directory listing and is stable for
//! a given snapshot; ids are 1-based positions in that listing.

use crate::error::DatasetError;
use crate::normalizer::normalize;
use crate::types::{DatasetDescriptor, DatasetGroups, DatasetInfo, Sample};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Snapshot of the datasets available on disk
#[derive(Debug, Clone)]
pub struct DatasetCatalog {
    root: PathBuf,
    entries: Vec<DatasetDescriptor>,
}

impl DatasetCatalog {
    /// Scan `root` for category directories holding `.json` recordings.
    ///
    /// A missing or unreadable root yields an empty catalog.
    pub fn scan(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let entries = match discover(&root) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Could not scan dataset directory {}: {}", root.display(), e);
                Vec::new()
            }
        };

        info!(
            "Dataset catalog: {} datasets under {}",
            entries.len(),
            root.display()
        );

        Self { root, entries }
    }

    pub fn list(&self) -> &[DatasetDescriptor] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve a 1-based dataset id
    pub fn get(&self, id: i64) -> Option<&DatasetDescriptor> {
        let index = usize::try_from(id).ok()?.checked_sub(1)?;
        self.entries.get(index)
    }

    /// 1-based id of a descriptor in this snapshot
    pub fn id_of(&self, descriptor: &DatasetDescriptor) -> Option<usize> {
        self.entries
            .iter()
            .position(|d| d == descriptor)
            .map(|i| i + 1)
    }

    /// Entries with their ids, as served by the HTTP listing
    pub fn infos(&self) -> Vec<DatasetInfo> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, d)| DatasetInfo::new(i + 1, d))
            .collect()
    }

    /// Entries grouped by category, listing order kept for categories and entries
    pub fn grouped(&self) -> DatasetGroups {
        self.entries.iter().cloned().collect()
    }

    /// Read, normalize and chronologically sort one dataset
    pub async fn load(
        &self,
        descriptor: &DatasetDescriptor,
    ) -> Result<Vec<Sample>, DatasetError> {
        let path = self.root.join(&descriptor.relative_path);
        let bytes = tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DatasetError::NotFound(path.clone())
            } else {
                DatasetError::Io {
                    path: path.clone(),
                    source: e,
                }
            }
        })?;

        let samples = parse_dataset(&path, &bytes, chrono::Utc::now().timestamp_millis())?;
        info!(
            "Loaded {} samples from {}",
            samples.len(),
            descriptor.relative_path
        );
        Ok(samples)
    }
}

/// Parse a recording that is either a bare array or `{samples: [...]}`.
///
/// `fallback_start_ms` anchors synthetic timestamps when the file carries no
/// `startTime` of its own.
pub fn parse_dataset(
    path: &Path,
    bytes: &[u8],
    fallback_start_ms: i64,
) -> Result<Vec<Sample>, DatasetError> {
    let parse_error = |message: String| DatasetError::Parse {
        path: path.to_path_buf(),
        message,
    };

    let document: Value =
        serde_json::from_slice(bytes).map_err(|e| parse_error(e.to_string()))?;

    let (raw, start_ms) = match document {
        Value::Array(items) => (items, fallback_start_ms),
        Value::Object(mut fields) => {
            let start_ms = fields
                .get("startTime")
                .and_then(Value::as_i64)
                .unwrap_or(fallback_start_ms);
            match fields.remove("samples") {
                Some(Value::Array(items)) => (items, start_ms),
                _ => return Err(parse_error("expected a `samples` array".to_string())),
            }
        }
        _ => {
            return Err(parse_error(
                "expected an array or an object with `samples`".to_string(),
            ))
        }
    };

    let mut samples: Vec<Sample> = raw
        .iter()
        .enumerate()
        .map(|(index, value)| normalize(value, index, start_ms))
        .collect();

    if samples.is_empty() {
        return Err(DatasetError::Empty(path.to_path_buf()));
    }

    samples.sort_by_key(|s| s.timestamp);
    Ok(samples)
}

/// "deep-breathing" -> "Deep Breathing"
pub fn category_label(dir_name: &str) -> String {
    dir_name
        .split('-')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn discover(root: &Path) -> std::io::Result<Vec<DatasetDescriptor>> {
    let mut result = Vec::new();

    for category in std::fs::read_dir(root)? {
        let category = category?;
        if !category.file_type()?.is_dir() {
            continue;
        }
        let dir_name = category.file_name().to_string_lossy().into_owned();
        let label = category_label(&dir_name);

        let files = match std::fs::read_dir(category.path()) {
            Ok(files) => files,
            Err(e) => {
                warn!("Skipping category {}: {}", dir_name, e);
                continue;
            }
        };

        for file in files {
            let file = file?;
            let filename = file.file_name().to_string_lossy().into_owned();
            if !filename.ends_with(".json") || !file.file_type()?.is_file() {
                continue;
            }
            result.push(DatasetDescriptor {
                relative_path: format!("{}/{}", dir_name, filename),
                filename,
                category: label.clone(),
            });
        }
    }

    Ok(result)
}
