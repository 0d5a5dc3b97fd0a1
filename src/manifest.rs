use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::domain::{ModelId, RankingEntry};
use crate::error::AlphaPickleError;

pub const MANIFEST_FILE_NAME: &str = "ranking_debug.json";

/// Score keys in preference order: multimer runs rank by `iptm+ptm`, monomers by `plddts`.
const SCORE_KEYS: [&str; 2] = ["iptm+ptm", "plddts"];

#[derive(Debug, Clone)]
pub struct RankingManifest {
    path: PathBuf,
    entries: Vec<RankingEntry>,
}

impl RankingManifest {
    pub fn read(directory: &Path) -> Result<Self, AlphaPickleError> {
        let path = directory.join(MANIFEST_FILE_NAME);
        let content = fs::read_to_string(&path).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => AlphaPickleError::ManifestNotFound(path.clone()),
            _ => AlphaPickleError::Filesystem(format!("read {}: {err}", path.display())),
        })?;
        Self::parse(&path, &content)
    }

    pub fn parse(path: &Path, content: &str) -> Result<Self, AlphaPickleError> {
        let format_error = |reason: String| AlphaPickleError::ManifestFormat {
            path: path.to_path_buf(),
            reason,
        };

        let raw: Value =
            serde_json::from_str(content).map_err(|err| format_error(err.to_string()))?;
        let order = raw
            .get("order")
            .ok_or_else(|| format_error("missing `order` field".to_string()))?
            .as_array()
            .ok_or_else(|| format_error("`order` is not a list".to_string()))?;
        let scores = SCORE_KEYS
            .iter()
            .find_map(|key| raw.get(*key).and_then(Value::as_object));

        let entries = order
            .iter()
            .enumerate()
            .map(|(index, value)| {
                let name = value.as_str().ok_or_else(|| {
                    format_error(format!("`order[{index}]` is not a string: {value}"))
                })?;
                let model_id: ModelId = name
                    .parse()
                    .map_err(|err: AlphaPickleError| format_error(err.to_string()))?;
                let rank = u32::try_from(index + 1)
                    .map_err(|_| format_error("too many ranked models".to_string()))?;
                let score = scores
                    .and_then(|scores| scores.get(name))
                    .and_then(Value::as_f64);
                Ok(RankingEntry {
                    rank,
                    model_id,
                    score,
                })
            })
            .collect::<Result<Vec<_>, AlphaPickleError>>()?;

        debug!(path = %path.display(), models = entries.len(), "read ranking manifest");
        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &[RankingEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<RankingEntry> {
        self.entries
    }
}
