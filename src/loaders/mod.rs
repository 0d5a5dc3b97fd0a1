mod container;
mod pae_json;
mod structure;

use std::path::Path;

pub use container::ContainerLoader;
pub use pae_json::PaeJsonLoader;
pub use structure::StructureLoader;

use crate::domain::SourceKind;
use crate::error::AlphaPickleError;
use crate::record::MetadataRecord;

/// Reads one source file into a [`MetadataRecord`].
///
/// `rank` selects `ranked_<rank>` naming; without it the source file stem is used.
pub trait MetadataLoader: Send + Sync {
    fn kind(&self) -> SourceKind;

    fn load(&self, path: &Path, rank: Option<u32>) -> Result<MetadataRecord, AlphaPickleError>;
}

pub fn loader_for(kind: SourceKind) -> Box<dyn MetadataLoader> {
    match kind {
        SourceKind::Pickle => Box::new(ContainerLoader),
        SourceKind::Pdb => Box::new(StructureLoader),
        SourceKind::PaeJson => Box::new(PaeJsonLoader),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loader_matches_kind() {
        for kind in [SourceKind::Pickle, SourceKind::Pdb, SourceKind::PaeJson] {
            assert_eq!(loader_for(kind).kind(), kind);
        }
    }
}
