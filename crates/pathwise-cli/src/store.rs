//! Roadmap store backed by a directory of JSON files, one per roadmap id.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;

use pathwise_core::schema::{Roadmap, validate_roadmap};
use pathwise_core::store::{RoadmapStore, StoreError};

#[derive(Debug, Clone)]
pub struct JsonDirStore {
    dir: PathBuf,
}

impl JsonDirStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File for `id`. Ids that could escape the directory are refused.
    fn path_for(&self, id: &str) -> Result<PathBuf> {
        let valid = !id.is_empty()
            && id != "."
            && id != ".."
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            bail!("invalid roadmap id {id:?}");
        }
        Ok(self.dir.join(format!("{id}.json")))
    }

    /// Write `roadmap` under its id, replacing any earlier version.
    pub fn save(&self, roadmap: &Roadmap) -> Result<PathBuf> {
        let path = self.path_for(&roadmap.id)?;
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create store directory {}", self.dir.display()))?;

        let contents = serde_json::to_string_pretty(roadmap).context("failed to serialize roadmap")?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, contents)
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &path)
            .with_context(|| format!("failed to move roadmap into place at {}", path.display()))?;

        tracing::debug!(roadmap_id = %roadmap.id, path = %path.display(), "roadmap saved");
        Ok(path)
    }

    /// Ids of every saved roadmap, sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("failed to read store directory {}", self.dir.display()));
            }
        };
        let mut ids = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[async_trait]
impl RoadmapStore for JsonDirStore {
    async fn fetch_roadmap(&self, id: &str) -> Result<Roadmap, StoreError> {
        let path = self.path_for(id)?;
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound { id: id.to_string() });
            }
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("failed to read {}", path.display()))
                    .into());
            }
        };

        let value: serde_json::Value = serde_json::from_str(&contents)
            .with_context(|| format!("{} is not valid JSON", path.display()))?;
        let roadmap = validate_roadmap(&value)
            .with_context(|| format!("stored roadmap {id} does not match the schema"))?;
        Ok(roadmap)
    }
}
