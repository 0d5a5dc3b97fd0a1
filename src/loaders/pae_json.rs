use std::path::Path;

use serde_json::Value;
use tracing::{debug, warn};

use super::MetadataLoader;
use crate::domain::SourceKind;
use crate::error::AlphaPickleError;
use crate::matrix::Matrix;
use crate::record::{MetadataRecord, RecordNaming};
use crate::source::read_source_to_string;

const DENSE_FIELDS: [&str; 2] = ["predicted_aligned_error", "pae"];
const ROW_FIELD: &str = "residue1";
const COL_FIELD: &str = "residue2";
const VALUE_FIELD: &str = "distance";

/// Cells absent from a sparse PAE listing keep this value.
pub const SPARSE_FILL: f64 = 1.0;

/// Upper bound on cells of a matrix built from sparse indices (8192 x 8192).
pub const MAX_SPARSE_CELLS: usize = 1 << 26;

/// PAE JSON as written by AlphaFold DB (dense) or older ColabFold (sparse triplets).
#[derive(Debug, Clone, Copy, Default)]
pub struct PaeJsonLoader;

impl MetadataLoader for PaeJsonLoader {
    fn kind(&self) -> SourceKind {
        SourceKind::PaeJson
    }

    fn load(&self, path: &Path, rank: Option<u32>) -> Result<MetadataRecord, AlphaPickleError> {
        let content = read_source_to_string(path)?;
        let pae = parse_pae(path, &content)?;
        debug!(path = %path.display(), rows = pae.rows(), cols = pae.cols(), "loaded PAE JSON");
        MetadataRecord::new(None, Some(pae), RecordNaming::for_source(path, rank)?)
    }
}

pub fn parse_pae(path: &Path, content: &str) -> Result<Matrix, AlphaPickleError> {
    let document: Value = serde_json::from_str(content)
        .map_err(|err| malformed(path, "<document>", format!("invalid JSON: {err}")))?;
    let document = match document {
        Value::Array(mut items) => {
            if items.is_empty() {
                return Err(AlphaPickleError::UnrecognizedPaeFormat(path.to_path_buf()));
            }
            items.swap_remove(0)
        }
        other => other,
    };
    let Value::Object(fields) = &document else {
        return Err(AlphaPickleError::UnrecognizedPaeFormat(path.to_path_buf()));
    };

    if let Some((name, dense)) = DENSE_FIELDS
        .iter()
        .find_map(|name| fields.get(*name).map(|value| (*name, value)))
    {
        return dense_matrix(path, name, dense);
    }

    match (fields.get(ROW_FIELD), fields.get(COL_FIELD), fields.get(VALUE_FIELD)) {
        (Some(rows), Some(cols), Some(values)) => sparse_matrix(path, rows, cols, values),
        _ => Err(AlphaPickleError::UnrecognizedPaeFormat(path.to_path_buf())),
    }
}

fn dense_matrix(path: &Path, field: &str, value: &Value) -> Result<Matrix, AlphaPickleError> {
    let rows = value
        .as_array()
        .ok_or_else(|| malformed(path, field, "expected a list of rows".to_string()))?;
    if rows.is_empty() {
        return Err(malformed(path, field, "matrix has no rows".to_string()));
    }
    let rows = rows
        .iter()
        .enumerate()
        .map(|(index, row)| {
            numbers(row).ok_or_else(|| {
                malformed(path, field, format!("row {index} is not a list of numbers"))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Matrix::from_rows(rows)
        .ok_or_else(|| malformed(path, field, "rows have different lengths".to_string()))
}

/// 1-based `(residue1[k], residue2[k]) = distance[k]` over a matrix filled with
/// [`SPARSE_FILL`]. Only listed cells are set; the matrix is not symmetrised.
fn sparse_matrix(
    path: &Path,
    rows: &Value,
    cols: &Value,
    values: &Value,
) -> Result<Matrix, AlphaPickleError> {
    let rows = indices(path, ROW_FIELD, rows)?;
    let cols = indices(path, COL_FIELD, cols)?;
    let values = numbers(values).ok_or_else(|| {
        malformed(path, VALUE_FIELD, "expected a list of numbers".to_string())
    })?;
    if values.is_empty() {
        return Err(malformed(path, VALUE_FIELD, "no values".to_string()));
    }

    let pairs = rows.len().min(cols.len()).min(values.len());
    if rows.len() != pairs || cols.len() != pairs || values.len() != pairs {
        warn!(
            path = %path.display(),
            residue1 = rows.len(),
            residue2 = cols.len(),
            distance = values.len(),
            used = pairs,
            "sparse PAE sequences differ in length, extra entries ignored"
        );
    }

    // Dimensions come from the full index lists, not only the paired prefix.
    let row_count = rows.iter().copied().max().unwrap_or(0);
    let col_count = cols.iter().copied().max().unwrap_or(0);
    let mut matrix = row_count
        .checked_mul(col_count)
        .filter(|cells| *cells <= MAX_SPARSE_CELLS)
        .and_then(|_| Matrix::filled(row_count, col_count, SPARSE_FILL))
        .ok_or_else(|| {
            malformed(
                path,
                ROW_FIELD,
                format!(
                    "residue indices up to {row_count} x {col_count} exceed the \
                     {MAX_SPARSE_CELLS}-cell limit"
                ),
            )
        })?;
    for ((row, col), value) in rows.iter().zip(&cols).zip(&values) {
        matrix.set(row - 1, col - 1, *value);
    }
    Ok(matrix)
}

fn indices(path: &Path, field: &str, value: &Value) -> Result<Vec<usize>, AlphaPickleError> {
    let items = value
        .as_array()
        .ok_or_else(|| malformed(path, field, "expected a list of residue indices".to_string()))?;
    if items.is_empty() {
        return Err(malformed(path, field, "no residue indices".to_string()));
    }
    items
        .iter()
        .map(|item| {
            positive_index(item).ok_or_else(|| {
                malformed(path, field, format!("{item} is not a positive integer index"))
            })
        })
        .collect()
}

fn positive_index(value: &Value) -> Option<usize> {
    if let Some(index) = value.as_u64() {
        return usize::try_from(index).ok().filter(|index| *index > 0);
    }
    let float = value.as_f64()?;
    (float >= 1.0 && float.fract() == 0.0 && float <= usize::MAX as f64).then_some(float as usize)
}

fn numbers(value: &Value) -> Option<Vec<f64>> {
    value.as_array()?.iter().map(Value::as_f64).collect()
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

    fn parse(content: &str) -> Result<Matrix, AlphaPickleError> {
        parse_pae(Path::new("pae.json"), content)
    }

    #[test]
    fn sparse_cells_default_to_one() {
        let matrix =
            parse(r#"{"residue1": [1, 2], "residue2": [2, 1], "distance": [0.5, 3.0]}"#).unwrap();
        assert_eq!(matrix.to_rows(), vec![vec![1.0, 0.5], vec![3.0, 1.0]]);
    }

    #[test]
    fn sparse_is_not_symmetrised() {
        let matrix =
            parse(r#"[{"residue1": [1, 2], "residue2": [2, 2], "distance": [4.0, 0.0]}]"#).unwrap();
        assert_eq!(matrix.get(0, 1), Some(4.0));
        assert_eq!(matrix.get(1, 0), Some(1.0));
    }

    #[test]
    fn dense_field_and_alias() {
        let dense = parse(r#"[{"predicted_aligned_error": [[0, 1], [2, 0]]}]"#).unwrap();
        assert_eq!(dense.to_rows(), vec![vec![0.0, 1.0], vec![2.0, 0.0]]);

        let alias = parse(r#"{"pae": [[0.25]], "plddt": [90.0]}"#).unwrap();
        assert_eq!(alias.to_rows(), vec![vec![0.25]]);
    }

    #[test]
    fn unknown_layouts() {
        assert_matches!(parse("[]"), Err(AlphaPickleError::UnrecognizedPaeFormat(_)));
        assert_matches!(
            parse(r#"{"residue1": [1]}"#),
            Err(AlphaPickleError::UnrecognizedPaeFormat(_))
        );
    }

    #[test]
    fn invalid_indices() {
        assert_matches!(
            parse(r#"{"residue1": [0], "residue2": [1], "distance": [1.0]}"#),
            Err(AlphaPickleError::MalformedField { field, .. }) if field == "residue1"
        );
        assert_matches!(
            parse(r#"{"residue1": [1.5], "residue2": [1], "distance": [1.0]}"#),
            Err(AlphaPickleError::MalformedField { .. })
        );
        assert_matches!(
            parse(r#"{"residue1": [], "residue2": [], "distance": []}"#),
            Err(AlphaPickleError::MalformedField { .. })
        );
    }

    #[test]
    fn shortest_sequence_wins() {
        let matrix =
            parse(r#"{"residue1": [1, 2], "residue2": [1, 2], "distance": [7.0]}"#).unwrap();
        assert_eq!(matrix.to_rows(), vec![vec![7.0, 1.0], vec![1.0, 1.0]]);
    }
}
