use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use flate2::read::MultiGzDecoder;

use crate::error::AlphaPickleError;

const GZIP_EXTENSION: &str = "gz";

pub fn is_gzip(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case(GZIP_EXTENSION))
        .unwrap_or(false)
}

/// Opens a source file for buffered reading, decompressing `*.gz` inputs on the fly.
pub fn open_source(path: &Path) -> Result<Box<dyn BufRead>, AlphaPickleError> {
    let file = File::open(path)
        .map_err(|err| AlphaPickleError::Filesystem(format!("open {}: {err}", path.display())))?;
    if is_gzip(path) {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

pub fn read_source_to_string(path: &Path) -> Result<String, AlphaPickleError> {
    let mut reader = open_source(path)?;
    let mut content = String::new();
    reader
        .read_to_string(&mut content)
        .map_err(|err| AlphaPickleError::Filesystem(format!("read {}: {err}", path.display())))?;
    Ok(content)
}

/// File name without its extension; a trailing `.gz` is stripped first.
pub fn source_stem(path: &Path) -> Result<String, AlphaPickleError> {
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            AlphaPickleError::Filesystem(format!("invalid source file name: {}", path.display()))
        })?;
    let name = if is_gzip(path) {
        &name[..name.len() - GZIP_EXTENSION.len() - 1]
    } else {
        name
    };
    let stem = Path::new(name)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(name);
    Ok(stem.to_string())
}
