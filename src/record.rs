use std::path::Path;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::domain::ranked_basename;
use crate::error::AlphaPickleError;
use crate::matrix::Matrix;
use crate::source::source_stem;

/// Files a record can be exported to, named `<output_basename><suffix>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Artifact {
    PlddtCsv,
    PlddtPlot,
    PlddtAttributes,
    PaeCsv,
    PaePlot,
}

impl Artifact {
    pub fn suffix(self) -> &'static str {
        match self {
            Artifact::PlddtCsv => "_pLDDT.csv",
            Artifact::PlddtPlot => "_pLDDT.svg",
            Artifact::PlddtAttributes => "_pLDDT.defattr",
            Artifact::PaeCsv => "_PAE.csv",
            Artifact::PaePlot => "_PAE.svg",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordNaming {
    pub output_basename: String,
    pub output_directory: Utf8PathBuf,
}

impl RecordNaming {
    /// `ranked_<rank>` when a rank is given, otherwise the source file stem.
    /// Artifacts always land next to the source file.
    pub fn for_source(path: &Path, rank: Option<u32>) -> Result<Self, AlphaPickleError> {
        let utf8 = Utf8Path::from_path(path).ok_or_else(|| {
            AlphaPickleError::Filesystem(format!("non UTF-8 path: {}", path.display()))
        })?;
        let output_directory = match utf8.parent() {
            Some(parent) if !parent.as_str().is_empty() => parent.to_path_buf(),
            _ => Utf8PathBuf::from("."),
        };
        let output_basename = match rank {
            Some(rank) => ranked_basename(rank),
            None => source_stem(path)?,
        };
        Ok(Self {
            output_basename,
            output_directory,
        })
    }
}

/// Format-independent pLDDT / PAE metadata for one source file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetadataRecord {
    residue_confidence: Option<Vec<f64>>,
    pairwise_error: Option<Matrix>,
    output_basename: String,
    output_directory: Utf8PathBuf,
}

impl MetadataRecord {
    pub fn new(
        residue_confidence: Option<Vec<f64>>,
        pairwise_error: Option<Matrix>,
        naming: RecordNaming,
    ) -> Result<Self, AlphaPickleError> {
        if let Some(pae) = &pairwise_error {
            if !pae.is_square() {
                return Err(AlphaPickleError::InconsistentDimensions(format!(
                    "pairwise error matrix is {}x{}, expected a square matrix",
                    pae.rows(),
                    pae.cols()
                )));
            }
            if let Some(plddt) = &residue_confidence {
                if plddt.len() != pae.rows() {
                    return Err(AlphaPickleError::InconsistentDimensions(format!(
                        "{} confidence values but pairwise error matrix is {}x{}",
                        plddt.len(),
                        pae.rows(),
                        pae.cols()
                    )));
                }
            }
        }

        Ok(Self {
            residue_confidence,
            pairwise_error,
            output_basename: naming.output_basename,
            output_directory: naming.output_directory,
        })
    }

    pub fn residue_confidence(&self) -> Option<&[f64]> {
        self.residue_confidence.as_deref()
    }

    pub fn pairwise_error(&self) -> Option<&Matrix> {
        self.pairwise_error.as_ref()
    }

    pub fn output_basename(&self) -> &str {
        &self.output_basename
    }

    pub fn output_directory(&self) -> &Utf8Path {
        &self.output_directory
    }

    pub fn residue_count(&self) -> usize {
        self.residue_confidence
            .as_ref()
            .map(Vec::len)
            .or_else(|| self.pairwise_error.as_ref().map(Matrix::rows))
            .unwrap_or(0)
    }

    pub fn artifact_path(&self, artifact: Artifact) -> Utf8PathBuf {
        self.output_directory
            .join(format!("{}{}", self.output_basename, artifact.suffix()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn naming_uses_source_directory() {
        let naming =
            RecordNaming::for_source(Path::new("out/af2/result_model_1.pkl"), None).unwrap();
        assert_eq!(naming.output_basename, "result_model_1");
        assert_eq!(naming.output_directory, Utf8PathBuf::from("out/af2"));

        let bare = RecordNaming::for_source(Path::new("model.pdb"), None).unwrap();
        assert_eq!(bare.output_directory, Utf8PathBuf::from("."));
    }

    #[test]
    fn artifact_paths() {
        let naming =
            RecordNaming::for_source(Path::new("/data/result_model_2.pkl"), Some(2)).unwrap();
        let record = MetadataRecord::new(Some(vec![50.0]), None, naming).unwrap();
        assert_eq!(
            record.artifact_path(Artifact::PlddtCsv),
            Utf8PathBuf::from("/data/ranked_2_pLDDT.csv")
        );
        assert_eq!(
            record.artifact_path(Artifact::PaePlot),
            Utf8PathBuf::from("/data/ranked_2_PAE.svg")
        );
    }
}
