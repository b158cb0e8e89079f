// src/lib.rs
pub mod types;
pub mod error;
pub mod fileio;
pub mod parameters;
pub mod read_assignment;
pub mod taxdb;
pub mod contaminants;
pub mod taxonomy_edits;
pub mod data_table;
pub mod sample_attributes;
pub mod connector;
pub mod sync;
pub mod open_files;

use std::path::Path;

pub use crate::connector::{ClassificationBlock, Connector, MemoryConnector};
pub use crate::contaminants::ContaminantManager;
pub use crate::data_table::{DataTable, DocumentFormat};
pub use crate::error::{Error, Result};
pub use crate::open_files::OpenFiles;
pub use crate::parameters::Parameters;
pub use crate::read_assignment::ReadAssignmentCalculator;
pub use crate::sample_attributes::{AttributeWriteOptions, SampleAttributeTable};
pub use crate::sync::{Progress, SyncOptions};
pub use crate::taxonomy_edits::{Edit, TaxonomyEditJournal};
pub use crate::types::{BlastMode, ReadAssignmentMode};

/// Loads a summary document from `path`, in whichever format it was
/// written. `.gz` files are decompressed on the fly.
pub fn load_document<P: AsRef<Path>>(path: P) -> Result<DataTable> {
    let path = path.as_ref();
    let mut table = DataTable::new();
    let format = table.read_file(path)?;
    log::info!(
        "Loaded {} ({:?}): {} samples, {} classifications",
        path.display(),
        format,
        table.number_of_samples(),
        table.classification_names().len()
    );
    Ok(table)
}

/// Writes `table` to `path`, compressing when the name ends in `.gz`.
pub fn save_document<P: AsRef<Path>>(table: &DataTable, path: P) -> Result<()> {
    let path = path.as_ref();
    table.write_file(path)?;
    log::info!("Wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TAXONOMY;

    #[test]
    fn test_save_and_load_document() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let _ = env_logger::builder().is_test(true).try_init();
        let path = std::env::temp_dir().join(format!("megan-doc-lib-{}.megan.gz", std::process::id()));

        let mut table = DataTable::new();
        table.set_samples(&["S1".into(), "S2".into()], &[5, 6], &[40.0, 60.0], &[]);
        table.set_total_reads(100);
        table.class2counts_mut(TAXONOMY).insert(2, vec![40.0, 60.0]);
        table.disable_samples(&["S2"])?;
        save_document(&table, &path)?;

        let loaded = load_document(&path);
        std::fs::remove_file(&path)?;
        let mut loaded = loaded?;
        assert_eq!(loaded.sample_names(), vec!["S1"]);
        assert_eq!(loaded.all_sample_names(), vec!["S1", "S2"]);
        loaded.enable_samples(&["S2"]);
        assert_eq!(loaded.count(TAXONOMY, 2, 1), 60.0);
        Ok(())
    }

    #[test]
    fn test_load_missing_file_is_read_error() {
        let err = load_document("/nonexistent/megan-doc/file.megan").unwrap_err();
        assert!(matches!(err, Error::Read { .. }));
    }
}
