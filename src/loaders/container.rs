use std::path::Path;

use tracing::{debug, warn};

use super::MetadataLoader;
use crate::domain::SourceKind;
use crate::error::AlphaPickleError;
use crate::matrix::Matrix;
use crate::pickle::{Unpickler, Value};
use crate::record::{MetadataRecord, RecordNaming};
use crate::source::open_source;

pub const PLDDT_FIELD: &str = "plddt";
pub const PAE_FIELD: &str = "predicted_aligned_error";

/// Results container: pickle records appended back to back, first record wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContainerLoader;

impl MetadataLoader for ContainerLoader {
    fn kind(&self) -> SourceKind {
        SourceKind::Pickle
    }

    fn load(&self, path: &Path, rank: Option<u32>) -> Result<MetadataRecord, AlphaPickleError> {
        let first = read_first_record(path)?;
        if !first.is_mapping() {
            return Err(AlphaPickleError::MalformedField {
                path: path.to_path_buf(),
                field: "<record>".to_string(),
                reason: format!("first record is a {}, not a dict", first.type_name()),
            });
        }

        let plddt = first
            .get(PLDDT_FIELD)
            .ok_or_else(|| AlphaPickleError::MissingField {
                path: path.to_path_buf(),
                field: PLDDT_FIELD.to_string(),
            })?
            .to_vector()
            .map_err(|reason| malformed(path, PLDDT_FIELD, reason))?;
        let pae = match first.get(PAE_FIELD) {
            None | Some(Value::None) => None,
            Some(value) => Some(
                value
                    .to_matrix()
                    .map_err(|reason| malformed(path, PAE_FIELD, reason))?,
            ),
        };

        debug!(
            path = %path.display(),
            residues = plddt.len(),
            pae = pae.as_ref().map(Matrix::rows),
            "loaded results container"
        );
        MetadataRecord::new(Some(plddt), pae, RecordNaming::for_source(path, rank)?)
    }
}

/// Scans every record so the whole stream is validated, keeping only the first.
fn read_first_record(path: &Path) -> Result<Value, AlphaPickleError> {
    let mut unpickler = Unpickler::new(open_source(path)?);
    let mut first = None;
    let mut count = 0usize;

    loop {
        match unpickler.load() {
            Ok(Some(record)) => {
                count += 1;
                if first.is_none() {
                    first = Some(record);
                }
            }
            Ok(None) => break,
            Err(err) if first.is_some() => {
                warn!(
                    path = %path.display(),
                    records = count,
                    error = %err,
                    "ignoring truncated trailing data in results container"
                );
                break;
            }
            Err(err) => return Err(err),
        }
    }

    if count > 1 {
        debug!(path = %path.display(), ignored = count - 1, "ignoring trailing records");
    }
    first.ok_or_else(|| AlphaPickleError::EmptyContainer(path.to_path_buf()))
}

fn malformed(path: &Path, field: &str, reason: String) -> AlphaPickleError {
    AlphaPickleError::MalformedField {
        path: path.to_path_buf(),
        field: field.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn write(dir: &Path, name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn reads_list_fields_and_names_by_rank() {
        let temp = tempfile::tempdir().unwrap();
        // {'plddt': [50.0, 60.0], 'predicted_aligned_error': None}
        let path = write(
            temp.path(),
            "result_model_1.pkl",
            b"\x80\x02}q\x00(X\x05\x00\x00\x00plddtq\x01]q\x02(G@I\x00\x00\x00\x00\x00\x00G@N\x00\x00\x00\x00\x00\x00eX\x17\x00\x00\x00predicted_aligned_errorq\x03Nu.",
        );

        let record = ContainerLoader.load(&path, Some(3)).unwrap();
        assert_eq!(record.residue_confidence(), Some(&[50.0, 60.0][..]));
        assert!(record.pairwise_error().is_none());
        assert_eq!(record.output_basename(), "ranked_3");
    }

    #[test]
    fn empty_file_is_an_empty_container() {
        let temp = tempfile::tempdir().unwrap();
        let path = write(temp.path(), "empty.pkl", b"");
        let err = ContainerLoader.load(&path, None).unwrap_err();
        assert_matches!(err, AlphaPickleError::EmptyContainer(_));
    }

    #[test]
    fn missing_plddt_is_reported() {
        let temp = tempfile::tempdir().unwrap();
        // {'ptm': 0.5}
        let path = write(
            temp.path(),
            "r.pkl",
            b"\x80\x02}q\x00X\x03\x00\x00\x00ptmq\x01G?\xe0\x00\x00\x00\x00\x00\x00s.",
        );
        let err = ContainerLoader.load(&path, None).unwrap_err();
        assert_matches!(err, AlphaPickleError::MissingField { field, .. } if field == "plddt");
    }

    #[test]
    fn ragged_pae_is_malformed() {
        let temp = tempfile::tempdir().unwrap();
        // {'plddt': [50.0, 60.0], 'predicted_aligned_error': [[1.0], [2.0, 3.0]]}
        let path = write(
            temp.path(),
            "r.pkl",
            b"\x80\x02}q\x00(X\x05\x00\x00\x00plddtq\x01]q\x02(G@I\x00\x00\x00\x00\x00\x00G@N\x00\x00\x00\x00\x00\x00eX\x17\x00\x00\x00predicted_aligned_errorq\x03]q\x04(]q\x05G?\xf0\x00\x00\x00\x00\x00\x00a]q\x06(G@\x00\x00\x00\x00\x00\x00\x00G@\x08\x00\x00\x00\x00\x00\x00eeu.",
        );
        let err = ContainerLoader.load(&path, None).unwrap_err();
        assert_matches!(err, AlphaPickleError::MalformedField { field, .. } if field == PAE_FIELD);
    }

    #[test]
    fn first_record_must_be_a_dict() {
        let temp = tempfile::tempdir().unwrap();
        // [{'plddt': [1.0]}]
        let path = write(
            temp.path(),
            "r.pkl",
            b"\x80\x02]q\x00}q\x01X\x05\x00\x00\x00plddtq\x02]q\x03G?\xf0\x00\x00\x00\x00\x00\x00asa.",
        );
        let err = ContainerLoader.load(&path, None).unwrap_err();
        assert_matches!(err, AlphaPickleError::MalformedField { .. });
    }

    #[test]
    fn truncated_trailing_record_is_ignored() {
        let temp = tempfile::tempdir().unwrap();
        // {'plddt': [80.0, 81.0]} at protocol 0, then half of a second record
        let mut bytes = b"(dp0\nVplddt\np1\n(lp2\nF80.0\naF81.0\nas.".to_vec();
        bytes.extend_from_slice(b"(dp0\nVpl");
        let path = write(temp.path(), "r.pkl", &bytes);

        let record = ContainerLoader.load(&path, None).unwrap();
        assert_eq!(record.residue_confidence(), Some(&[80.0, 81.0][..]));
        assert_eq!(record.output_basename(), "r");
    }
}
