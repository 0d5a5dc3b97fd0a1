use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::AlphaPickleError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    Pickle,
    Pdb,
    PaeJson,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Pickle => write!(f, "pickle"),
            SourceKind::Pdb => write!(f, "pdb"),
            SourceKind::PaeJson => write!(f, "pae-json"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelId(String);

impl ModelId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn result_file_name(&self) -> String {
        format!("result_{}.pkl", self.0)
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ModelId {
    type Err = AlphaPickleError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let is_valid = !value.is_empty()
            && value != "."
            && value != ".."
            && !value.chars().any(|ch| ch == '/' || ch == '\\' || ch.is_control());
        if !is_valid {
            return Err(AlphaPickleError::InvalidModelId(value.to_string()));
        }
        Ok(Self(value.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankingEntry {
    pub rank: u32,
    pub model_id: ModelId,
    pub score: Option<f64>,
}

impl RankingEntry {
    pub fn output_basename(&self) -> String {
        ranked_basename(self.rank)
    }
}

pub fn ranked_basename(rank: u32) -> String {
    format!("ranked_{rank}")
}
