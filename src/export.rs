use std::fs;
use std::io::{self, BufWriter, Write};

use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

use crate::error::AlphaPickleError;
use crate::matrix::Matrix;
use crate::record::{Artifact, MetadataRecord};

pub const PLDDT_COLUMN: &str = "pLDDT";

/// Writes `path` through a temporary file in the same directory, replacing it on success.
pub fn write_atomic<F>(path: &Utf8Path, write: F) -> Result<(), AlphaPickleError>
where
    F: FnOnce(&mut dyn Write) -> Result<(), AlphaPickleError>,
{
    let parent = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| AlphaPickleError::Filesystem(format!("create {parent}: {err}")))?;
    let temp = tempfile::Builder::new()
        .prefix(".alphapickle")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| AlphaPickleError::Filesystem(err.to_string()))?;

    let mut writer = BufWriter::new(temp);
    write(&mut writer)?;
    let temp = writer
        .into_inner()
        .map_err(|err| AlphaPickleError::Export(format!("{path}: {}", err.error())))?;
    temp.persist(path.as_std_path())
        .map_err(|err| AlphaPickleError::Filesystem(format!("persist {path}: {}", err.error)))?;
    debug!(path = %path, "wrote artifact");
    Ok(())
}

pub fn write_plddt_csv(record: &MetadataRecord) -> Result<Utf8PathBuf, AlphaPickleError> {
    let plddt = require_plddt(record)?;
    let path = record.artifact_path(Artifact::PlddtCsv);
    write_atomic(&path, |out| {
        let mut writer = csv::Writer::from_writer(out);
        writer.write_record([PLDDT_COLUMN]).map_err(csv_error)?;
        for value in plddt {
            writer.write_record([format_value(*value)]).map_err(csv_error)?;
        }
        writer.flush().map_err(io_error)
    })?;
    Ok(path)
}

/// Header `,0,1,...` then one row per matrix row, prefixed with its index.
pub fn write_pae_csv(record: &MetadataRecord) -> Result<Utf8PathBuf, AlphaPickleError> {
    let pae = require_pae(record)?;
    let path = record.artifact_path(Artifact::PaeCsv);
    write_atomic(&path, |out| {
        let mut writer = csv::Writer::from_writer(out);
        let header =
            std::iter::once(String::new()).chain((0..pae.cols()).map(|col| col.to_string()));
        writer.write_record(header).map_err(csv_error)?;
        for (index, row) in pae.iter_rows().enumerate() {
            let fields = std::iter::once(index.to_string())
                .chain(row.iter().map(|value| format_value(*value)));
            writer.write_record(fields).map_err(csv_error)?;
        }
        writer.flush().map_err(io_error)
    })?;
    Ok(path)
}

/// ChimeraX `defattr` file assigning pLDDT to residues `:1..:n`.
pub fn write_plddt_attributes(record: &MetadataRecord) -> Result<Utf8PathBuf, AlphaPickleError> {
    let plddt = require_plddt(record)?;
    let path = record.artifact_path(Artifact::PlddtAttributes);
    write_atomic(&path, |out| {
        writeln!(out, "attribute: {PLDDT_COLUMN}").map_err(io_error)?;
        writeln!(out, "match mode: 1-to-1").map_err(io_error)?;
        writeln!(out, "recipient: residues").map_err(io_error)?;
        for (index, value) in plddt.iter().enumerate() {
            writeln!(out, "\t:{}\t{}", index + 1, format_value(*value)).map_err(io_error)?;
        }
        Ok(())
    })?;
    Ok(path)
}

/// Shortest representation that reads back to the same `f64`, always with a decimal point.
pub fn format_value(value: f64) -> String {
    format!("{value:?}")
}

fn require_plddt(record: &MetadataRecord) -> Result<&[f64], AlphaPickleError> {
    record.residue_confidence().ok_or_else(|| {
        AlphaPickleError::Export(format!("{} has no pLDDT values", record.output_basename()))
    })
}

fn require_pae(record: &MetadataRecord) -> Result<&Matrix, AlphaPickleError> {
    record.pairwise_error().ok_or_else(|| {
        AlphaPickleError::Export(format!("{} has no PAE matrix", record.output_basename()))
    })
}

fn csv_error(err: csv::Error) -> AlphaPickleError {
    AlphaPickleError::Export(err.to_string())
}

fn io_error(err: io::Error) -> AlphaPickleError {
    AlphaPickleError::Export(err.to_string())
}
