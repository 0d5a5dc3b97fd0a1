use std::collections::{HashMap, HashSet};
use std::io::BufRead;
use std::path::Path;

use tracing::{debug, warn};

use super::MetadataLoader;
use crate::domain::SourceKind;
use crate::error::AlphaPickleError;
use crate::record::{MetadataRecord, RecordNaming};
use crate::source::open_source;

const WATER_NAMES: [&str; 2] = ["HOH", "WAT"];

/// PDB coordinates with per-residue pLDDT stored in the B-factor column.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructureLoader;

impl MetadataLoader for StructureLoader {
    fn kind(&self) -> SourceKind {
        SourceKind::Pdb
    }

    fn load(&self, path: &Path, rank: Option<u32>) -> Result<MetadataRecord, AlphaPickleError> {
        let plddt = read_residue_bfactors(open_source(path)?, path)?;
        if plddt.is_empty() {
            return Err(AlphaPickleError::NoResiduesFound(path.to_path_buf()));
        }
        debug!(path = %path.display(), residues = plddt.len(), "loaded structure file");
        MetadataRecord::new(Some(plddt), None, RecordNaming::for_source(path, rank)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ResidueKey {
    model: usize,
    chain: String,
    hetero: String,
    seq: String,
    insertion: char,
}

#[derive(Debug, Default)]
struct ModelResidues {
    chain_order: Vec<String>,
    chains: HashMap<String, Vec<f64>>,
}

/// B-factor of the first atom of every residue: models in file order, chains and
/// residues in first-seen order.
fn read_residue_bfactors<R: BufRead>(reader: R, path: &Path) -> Result<Vec<f64>, AlphaPickleError> {
    let mut models: Vec<ModelResidues> = Vec::new();
    let mut seen: HashSet<ResidueKey> = HashSet::new();
    let mut model = 0usize;

    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|err| {
            AlphaPickleError::Filesystem(format!("read {}: {err}", path.display()))
        })?;
        let record = field(&line, 0, 6);
        match record {
            "MODEL" => {
                model = models.len();
                continue;
            }
            "ATOM" | "HETATM" => {}
            _ => continue,
        }

        let residue_name = field(&line, 17, 20);
        let hetero = if record == "HETATM" {
            if WATER_NAMES.contains(&residue_name) {
                "W".to_string()
            } else {
                format!("H_{residue_name}")
            }
        } else {
            String::new()
        };
        let key = ResidueKey {
            model,
            chain: field(&line, 21, 22).to_string(),
            hetero,
            seq: field(&line, 22, 26).to_string(),
            insertion: line.get(26..27).and_then(|s| s.chars().next()).unwrap_or(' '),
        };
        if seen.contains(&key) {
            continue;
        }

        let bfactor = match field(&line, 60, 66).parse::<f64>() {
            Ok(value) => value,
            Err(_) => {
                warn!(
                    path = %path.display(),
                    line = index + 1,
                    "blank or unreadable B-factor, using 0.0"
                );
                0.0
            }
        };

        while models.len() <= model {
            models.push(ModelResidues::default());
        }
        let residues = &mut models[model];
        if !residues.chains.contains_key(&key.chain) {
            residues.chain_order.push(key.chain.clone());
        }
        residues.chains.entry(key.chain.clone()).or_default().push(bfactor);
        seen.insert(key);
    }

    let mut plddt = Vec::with_capacity(seen.len());
    for mut residues in models {
        for chain in residues.chain_order {
            if let Some(values) = residues.chains.remove(&chain) {
                plddt.extend(values);
            }
        }
    }
    Ok(plddt)
}

/// Fixed-width PDB column `[start, end)`, trimmed; empty when the line is short.
fn field(line: &str, start: usize, end: usize) -> &str {
    let end = end.min(line.len());
    line.get(start..end).map(str::trim).unwrap_or("")
}
