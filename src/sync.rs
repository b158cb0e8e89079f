//src/sync.rs

use std::io::BufRead;

use ahash::AHashMap;
use indicatif::ProgressBar;

use crate::connector::Connector;
use crate::data_table::{DataTable, DocumentFormat};
use crate::error::{Error, Result};
use crate::fileio::{file_base_name, file_name_without_path};
use crate::parameters::Parameters;
use crate::sample_attributes::{AttributeWriteOptions, SampleAttributeTable};
use crate::types::{BlastMode, ReadAssignmentMode, NOHITS_ID, TAXONOMY};

/// Auxiliary blob holding the document header.
pub const USER_STATE: &str = "USER_STATE";
/// Auxiliary blob holding the sample metadata.
pub const SAMPLE_ATTRIBUTES: &str = "SAMPLE_ATTRIBUTES";

/// Progress sink for long syncs; also the way a caller asks to stop.
pub trait Progress {
    fn set_progress(&self, done: u64, total: u64);

    fn is_cancelled(&self) -> bool {
        false
    }
}

impl Progress for () {
    fn set_progress(&self, _done: u64, _total: u64) {}
}

/// A finished or abandoned bar cancels the sync.
impl Progress for ProgressBar {
    fn set_progress(&self, done: u64, total: u64) {
        self.set_length(total);
        self.set_position(done);
    }

    fn is_cancelled(&self) -> bool {
        self.is_finished()
    }
}

/// What a full sync needs to know about the archive besides the connector.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Path or name of the archive; the sample is named after it.
    pub file_name: String,
    /// Weighting of reads; inferred from the stored parameters when unset.
    pub read_assignment_mode: Option<ReadAssignmentMode>,
}

impl SyncOptions {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            read_assignment_mode: None,
        }
    }

    pub fn with_read_assignment_mode(mut self, mode: ReadAssignmentMode) -> Self {
        self.read_assignment_mode = Some(mode);
        self
    }

    /// Name of the single sample of the archive.
    pub fn sample_name(&self) -> &str {
        file_name_without_path(&self.file_name)
    }
}

/// Rebuilds `table` and `attributes` from an archive.
///
/// The stored header and metadata, when present, are restored first. The
/// table then gets exactly one sample, named after the archive, whose counts
/// are the connector's per-class totals: raw read counts in read-count mode,
/// weighted sums otherwise.
pub fn sync_archive_to_summary<C, P>(
    options: &SyncOptions,
    connector: &C,
    table: &mut DataTable,
    attributes: &mut SampleAttributeTable,
    progress: &P,
) -> Result<()>
where
    C: Connector + ?Sized,
    P: Progress + ?Sized,
{
    table.clear();
    let sample_name = options.sample_name().to_string();
    let auxiliary = connector
        .auxiliary_data()
        .map_err(|e| Error::read("auxiliary data", e))?;

    if let Some(bytes) = auxiliary.get(USER_STATE) {
        read_user_state(bytes, table)?;
    }

    if let Some(bytes) = auxiliary.get(SAMPLE_ATTRIBUTES) {
        attributes.read(bytes.as_slice(), None, true)?;
        restore_sample_name(attributes, &sample_name, &options.file_name)?;
    } else {
        attributes.clear();
    }

    let uid = connector.uid().map_err(|e| Error::read("archive uid", e))?;
    let number_of_reads = connector
        .number_of_reads()
        .map_err(|e| Error::read("number of reads", e))?;
    let blast_mode = table.blast_mode();
    table.set_samples(
        &[sample_name.clone()],
        &[uid],
        &[number_of_reads as f32],
        &[blast_mode],
    );
    table.clear_counts();
    if table.total_reads() == 0 {
        table.set_total_reads(number_of_reads);
    }
    if !attributes.contains_sample(&sample_name) {
        attributes.add_sample(&sample_name, &[], false, false);
    }

    let mode = options.read_assignment_mode.unwrap_or_else(|| {
        table
            .parameters()
            .parse::<Parameters>()
            .ok()
            .and_then(|p| p.read_assignment_mode())
            .unwrap_or_default()
    });
    log::info!("Syncing {sample_name} ({number_of_reads} reads, mode {mode})");

    let additional_reads = table.additional_reads();
    sync_classification_blocks(connector, table, mode, additional_reads, progress)
}

/// Fills the counts of a table whose single sample was just recomputed.
///
/// The table is reset to one sample called `name`; total reads, additional
/// reads, the taxonomy algorithm and the parameter string are replaced.
#[allow(clippy::too_many_arguments)]
pub fn sync_recomputed_archive_to_summary<C, P>(
    mode: ReadAssignmentMode,
    name: &str,
    algorithm: &str,
    blast_mode: BlastMode,
    parameters: &str,
    connector: &C,
    table: &mut DataTable,
    additional_reads: u64,
    progress: &P,
) -> Result<()>
where
    C: Connector + ?Sized,
    P: Progress + ?Sized,
{
    let uid = connector.uid().map_err(|e| Error::read("archive uid", e))?;
    let number_of_reads = connector
        .number_of_reads()
        .map_err(|e| Error::read("number of reads", e))?;

    table.set_samples(
        &[name.to_string()],
        &[uid],
        &[number_of_reads as f32],
        &[blast_mode],
    );
    table.clear_counts();
    table.set_total_reads(number_of_reads);
    table.set_additional_reads(additional_reads);
    table.set_algorithm(TAXONOMY, algorithm);
    table.set_parameters(parameters);

    sync_classification_blocks(connector, table, mode, additional_reads, progress)
}

/// Stores the table header and the metadata in the archive.
pub fn save_auxiliary_data<C>(
    table: &DataTable,
    attributes: &SampleAttributeTable,
    connector: &mut C,
) -> Result<()>
where
    C: Connector + ?Sized,
{
    let mut user_state = Vec::new();
    table.write_header(&mut user_state)?;
    let mut sample_attributes = Vec::new();
    attributes.write(
        &mut sample_attributes,
        AttributeWriteOptions {
            include_secret: true,
            qiime: false,
        },
    )?;

    let mut data = AHashMap::new();
    data.insert(USER_STATE.to_string(), user_state);
    data.insert(SAMPLE_ATTRIBUTES.to_string(), sample_attributes);
    connector.put_auxiliary_data(data)?;
    Ok(())
}

/// Restores the header stored in the archive, upgrading the legacy format.
fn read_user_state(bytes: &[u8], table: &mut DataTable) -> Result<()> {
    let first_line = bytes
        .lines()
        .map_while(std::result::Result::ok)
        .find(|l| !l.trim().is_empty())
        .unwrap_or_default();
    match DocumentFormat::sniff(&first_line)? {
        DocumentFormat::Summary => table.read(bytes, true),
        DocumentFormat::Legacy => {
            log::info!("Upgrading legacy user state");
            table.import_legacy(bytes)
        }
    }
}

/// The metadata blob names its single sample arbitrarily; it is renamed to
/// the archive's sample. Some files carry a second row named after the bare
/// file name, which is dropped.
fn restore_sample_name(
    attributes: &mut SampleAttributeTable,
    sample_name: &str,
    file_name: &str,
) -> Result<()> {
    let Some(first) = attributes.sample_order().first().cloned() else {
        return Ok(());
    };
    if first != sample_name {
        attributes.rename_sample(&first, sample_name, true)?;
    }
    let base_name = file_base_name(file_name);
    if base_name != sample_name
        && attributes.number_of_samples() == 2
        && attributes.sample_order()[1] == base_name
    {
        log::debug!("Removing duplicate metadata row {base_name}");
        attributes.remove_sample(base_name);
    }
    Ok(())
}

fn sync_classification_blocks<C, P>(
    connector: &C,
    table: &mut DataTable,
    mode: ReadAssignmentMode,
    additional_reads: u64,
    progress: &P,
) -> Result<()>
where
    C: Connector + ?Sized,
    P: Progress + ?Sized,
{
    let names = connector
        .all_classification_names()
        .map_err(|e| Error::read("classification names", e))?;
    let total = names.len() as u64;

    for (i, name) in names.iter().enumerate() {
        if progress.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let block = connector
            .classification_block(name)
            .map_err(|e| Error::read(format!("classification {name}"), e))?;
        let class2counts = table.class2counts_mut(name);
        class2counts.clear();
        for (class_id, count) in block.iter() {
            let value = match mode {
                ReadAssignmentMode::ReadCount => count.sum as f32,
                _ => count.weighted_sum as f32,
            };
            class2counts.insert(class_id, vec![value]);
        }
        log::debug!("Synced {name}: {} classes", block.len());
        progress.set_progress(i as u64 + 1, total);
    }

    if additional_reads > 0 {
        let nohits = table.count(TAXONOMY, NOHITS_ID, 0);
        table.set_count(TAXONOMY, NOHITS_ID, 0, nohits + additional_reads as f32)?;
    }
    Ok(())
}
