//src/data_table/mod.rs

pub mod codec;

use std::collections::BTreeSet;
use std::fmt;

use ahash::{AHashMap, AHashSet};

use crate::error::{Error, Result};
use crate::types::{BlastMode, TAXONOMY};

pub use codec::{DocumentFormat, HeaderField};

/// Per-class count vectors of one classification, one slot per sample.
pub type Class2Counts = AHashMap<i32, Vec<f32>>;

/// Everything a table knows about one sample.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleRecord {
    pub name: String,
    pub blast_mode: BlastMode,
    pub size: f32,
    pub uid: i64,
}

/// The multi-sample classification summary of a document.
///
/// Samples are held as one record each, and every count vector is kept at
/// exactly `number_of_samples()` slots after each operation, so slot `i` of
/// every vector always belongs to `samples[i]`.
///
/// While samples are disabled, `original` holds the full table and the
/// visible samples and counts are a filtered copy of it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataTable {
    creator: Option<String>,
    creation_date: Option<String>,
    content_type: Option<String>,
    samples: Vec<SampleRecord>,
    merged_files: Vec<String>,
    total_reads: u64,
    additional_reads: u64,
    parameters: String,
    contaminants: String,
    color_table: Option<String>,
    color_table_heat_map: Option<String>,
    color_by_position: bool,
    color_edits: Option<String>,
    collapsed: AHashMap<String, BTreeSet<i32>>,
    algorithms: AHashMap<String, String>,
    node_styles: AHashMap<String, String>,
    node_formats: AHashMap<String, String>,
    edge_formats: AHashMap<String, String>,
    classifications: AHashMap<String, Class2Counts>,
    disabled: BTreeSet<String>,
    original: Option<Box<DataTable>>,
}

/// Millisecond wall-clock time, bumped until it differs from every `taken` uid.
fn fresh_uid(taken: &AHashSet<i64>) -> i64 {
    let mut uid = chrono::Utc::now().timestamp_millis();
    while taken.contains(&uid) {
        uid += 1;
    }
    uid
}

fn rename_record(samples: &mut [SampleRecord], old: &str, new: &str) {
    if let Some(record) = samples.iter_mut().find(|s| s.name == old) {
        record.name = new.to_string();
    }
}

impl DataTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets the table to empty.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Resets everything but the contaminants string, used when a document
    /// is reloaded in place.
    pub fn clear_data(&mut self) {
        let contaminants = std::mem::take(&mut self.contaminants);
        self.clear();
        self.contaminants = contaminants;
    }

    /// Replaces this table by a copy of the visible part of `other`.
    pub fn copy_from(&mut self, other: &DataTable) {
        *self = other.clone();
        self.disabled.clear();
        self.original = None;
    }

    // ---------------------------------------------------------------------
    //  Samples
    // ---------------------------------------------------------------------

    pub fn number_of_samples(&self) -> usize {
        self.samples.len()
    }

    pub fn samples(&self) -> &[SampleRecord] {
        &self.samples
    }

    pub fn sample_names(&self) -> Vec<&str> {
        self.samples.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn sample_index(&self, name: &str) -> Option<usize> {
        self.samples.iter().position(|s| s.name == name)
    }

    pub fn sample_sizes(&self) -> Vec<f32> {
        self.samples.iter().map(|s| s.size).collect()
    }

    pub fn sample_uids(&self) -> Vec<i64> {
        self.samples.iter().map(|s| s.uid).collect()
    }

    pub fn blast_modes(&self) -> Vec<BlastMode> {
        self.samples.iter().map(|s| s.blast_mode).collect()
    }

    /// Mode of the first sample, `Unknown` for an empty table.
    pub fn blast_mode(&self) -> BlastMode {
        self.samples
            .first()
            .map(|s| s.blast_mode)
            .unwrap_or_default()
    }

    pub fn total_reads_for_sample(&self, name: &str) -> Option<f32> {
        self.samples.iter().find(|s| s.name == name).map(|s| s.size)
    }

    fn uids(&self) -> AHashSet<i64> {
        let mut uids: AHashSet<i64> = self.samples.iter().map(|s| s.uid).collect();
        if let Some(original) = &self.original {
            uids.extend(original.samples.iter().map(|s| s.uid));
        }
        uids
    }

    /// Replaces all samples. Missing uids are generated, missing sizes are 0
    /// and missing modes are `Unknown`. Count vectors are resized to match.
    pub fn set_samples(
        &mut self,
        names: &[String],
        uids: &[i64],
        sizes: &[f32],
        modes: &[BlastMode],
    ) {
        let mut taken = AHashSet::new();
        self.samples = names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let uid = uids
                    .get(i)
                    .copied()
                    .filter(|uid| *uid != 0)
                    .unwrap_or_else(|| fresh_uid(&taken));
                taken.insert(uid);
                SampleRecord {
                    name: name.clone(),
                    blast_mode: modes.get(i).copied().unwrap_or_default(),
                    size: sizes.get(i).copied().unwrap_or(0.0),
                    uid,
                }
            })
            .collect();
        self.normalize_vectors();
        self.disabled.clear();
        self.original = None;
    }

    /// Pads or truncates every count vector to the sample count.
    fn normalize_vectors(&mut self) {
        let n = self.samples.len();
        for class2counts in self.classifications.values_mut() {
            for counts in class2counts.values_mut() {
                counts.resize(n, 0.0);
            }
        }
    }

    fn require_samples<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<usize>> {
        names
            .iter()
            .map(|name| {
                self.sample_index(name.as_ref())
                    .ok_or_else(|| Error::UnknownSample(name.as_ref().to_string()))
            })
            .collect()
    }

    /// Keeps the samples at `indices`, in that order, in both the sample
    /// records and every count vector.
    fn project(&mut self, indices: &[usize]) {
        let samples = indices.iter().map(|&i| self.samples[i].clone()).collect();
        for class2counts in self.classifications.values_mut() {
            for counts in class2counts.values_mut() {
                *counts = indices
                    .iter()
                    .map(|&i| counts.get(i).copied().unwrap_or(0.0))
                    .collect();
            }
        }
        self.samples = samples;
    }

    /// Rebuilds the samples and counts of this table from `source`, keeping
    /// the samples accepted by `keep`. Total reads becomes the sum of the
    /// kept sample sizes. Scalars and per-classification settings of `self`
    /// are left alone.
    fn rebuild_from(&mut self, source: &DataTable, keep: impl Fn(&SampleRecord) -> bool) {
        let indices: Vec<usize> = source
            .samples
            .iter()
            .enumerate()
            .filter(|(_, s)| keep(s))
            .map(|(i, _)| i)
            .collect();
        self.samples = source.samples.clone();
        self.classifications = source.classifications.clone();
        self.project(&indices);
        self.total_reads = self.sum_of_sizes();
    }

    fn sum_of_sizes(&self) -> u64 {
        self.samples.iter().map(|s| s.size as f64).sum::<f64>().round() as u64
    }

    /// Runs a structural edit against the full table. While samples are
    /// disabled that is the snapshot, after which the visible table is
    /// re-filtered from it.
    fn edit_full<T>(&mut self, op: impl FnOnce(&mut DataTable) -> Result<T>) -> Result<T> {
        let Some(mut full) = self.original.take() else {
            return op(self);
        };
        let result = op(&mut full);
        self.original = Some(full);
        self.refresh_visible();
        result
    }

    /// Removes the named samples. Total reads becomes the sum of the
    /// remaining sample sizes.
    pub fn remove_samples<S: AsRef<str>>(&mut self, names: &[S]) -> Result<()> {
        let remove: AHashSet<&str> = names.iter().map(|s| s.as_ref()).collect();
        self.edit_full(|table| {
            let keep: Vec<usize> = (0..table.samples.len())
                .filter(|&i| !remove.contains(table.samples[i].name.as_str()))
                .collect();
            table.project(&keep);
            table.total_reads = table.sum_of_sizes();
            Ok(())
        })?;
        self.disabled.retain(|name| !remove.contains(name.as_str()));
        self.drop_snapshot_if_unused();
        Ok(())
    }

    /// Merges `names` into one new sample `new_name`, appended at the end.
    ///
    /// The size is the sum of the constituent sizes, the mode is their
    /// common mode (`Unknown` if they differ) and each class count is the
    /// sum of the constituent counts.
    pub fn merge_samples<S: AsRef<str>>(&mut self, names: &[S], new_name: &str) -> Result<()> {
        self.require_samples(names)?;
        if self.sample_index(new_name).is_some() || self.disabled.contains(new_name) {
            return Err(Error::DuplicateSample(new_name.to_string()));
        }
        let uid = fresh_uid(&self.uids());

        self.edit_full(|table| {
            let indices = table.require_samples(names)?;
            let size: f32 = indices.iter().map(|&i| table.samples[i].size).sum();
            let mut modes = indices.iter().map(|&i| table.samples[i].blast_mode);
            let first = modes.next().unwrap_or_default();
            let blast_mode = if modes.all(|m| m == first) {
                first
            } else {
                BlastMode::Unknown
            };

            let n = table.samples.len();
            for class2counts in table.classifications.values_mut() {
                for counts in class2counts.values_mut() {
                    let sum: f32 = indices
                        .iter()
                        .map(|&i| counts.get(i).copied().unwrap_or(0.0))
                        .sum();
                    counts.resize(n, 0.0);
                    counts.push(sum);
                }
            }
            table.samples.push(SampleRecord {
                name: new_name.to_string(),
                blast_mode,
                size,
                uid,
            });
            Ok(())
        })?;
        log::info!("Merged {} samples into {new_name}", names.len());
        Ok(())
    }

    /// Fills `target` with the named samples of this table, in this table's
    /// order.
    pub fn extract_samples<S: AsRef<str>>(&self, names: &[S], target: &mut DataTable) -> Result<()> {
        self.require_samples(names)?;
        let wanted: AHashSet<&str> = names.iter().map(|s| s.as_ref()).collect();
        let others: Vec<String> = self
            .samples
            .iter()
            .filter(|s| !wanted.contains(s.name.as_str()))
            .map(|s| s.name.clone())
            .collect();

        target.clear();
        target.copy_from(self);
        target.remove_samples(&others)
    }

    /// Re-indexes samples and counts into `new_order`. Samples not listed
    /// are dropped; unknown names fail without changing the table.
    pub fn reorder_samples<S: AsRef<str>>(&mut self, new_order: &[S]) -> Result<()> {
        let indices = self.require_samples(new_order)?;
        let mut listed: AHashSet<&str> = AHashSet::with_capacity(new_order.len());
        for name in new_order {
            if !listed.insert(name.as_ref()) {
                return Err(Error::DuplicateSample(name.as_ref().to_string()));
            }
        }
        if self.original.is_none() {
            let dropped = indices.len() != self.samples.len();
            self.project(&indices);
            if dropped {
                self.total_reads = self.sum_of_sizes();
            }
            return Ok(());
        }

        // disabled samples keep their place after the visible ones
        let disabled = self.disabled.clone();
        let visible: Vec<String> = self.samples.iter().map(|s| s.name.clone()).collect();
        self.edit_full(|full| {
            let mut order: Vec<usize> = new_order
                .iter()
                .filter_map(|name| full.sample_index(name.as_ref()))
                .collect();
            order.extend(
                (0..full.samples.len()).filter(|&i| disabled.contains(&full.samples[i].name)),
            );
            let dropped = visible.len() != new_order.len();
            full.project(&order);
            if dropped {
                full.total_reads = full.sum_of_sizes();
            }
            Ok(())
        })
    }

    /// Renames a sample. Fails if `old` is unknown or `new` is taken.
    pub fn rename_sample(&mut self, old: &str, new: &str) -> Result<()> {
        if self.sample_index(old).is_none() && !self.disabled.contains(old) {
            return Err(Error::UnknownSample(old.to_string()));
        }
        if self.sample_index(new).is_some() || self.disabled.contains(new) {
            return Err(Error::DuplicateSample(new.to_string()));
        }
        rename_record(&mut self.samples, old, new);
        if let Some(original) = self.original.as_deref_mut() {
            rename_record(&mut original.samples, old, new);
        }
        if self.disabled.remove(old) {
            self.disabled.insert(new.to_string());
        }
        Ok(())
    }

    /// Appends a copy of sample `name` of `source` under a fresh uid.
    /// Only non-zero counts are copied.
    pub fn add_sample(&mut self, name: &str, source: &DataTable) -> Result<()> {
        let src = source
            .sample_index(name)
            .ok_or_else(|| Error::UnknownSample(name.to_string()))?;
        if self.sample_index(name).is_some() || self.disabled.contains(name) {
            return Err(Error::DuplicateSample(name.to_string()));
        }
        let uid = fresh_uid(&self.uids());
        let record = SampleRecord {
            uid,
            ..source.samples[src].clone()
        };

        self.edit_full(|table| {
            let target = table.samples.len();
            table.samples.push(record);
            table.normalize_vectors();
            for (classification, class2counts) in &source.classifications {
                let dest = table
                    .classifications
                    .entry(classification.clone())
                    .or_default();
                for (&class_id, counts) in class2counts {
                    let value = counts.get(src).copied().unwrap_or(0.0);
                    if value != 0.0 {
                        let slot = dest
                            .entry(class_id)
                            .or_insert_with(|| vec![0.0; target + 1]);
                        slot.resize(target + 1, 0.0);
                        slot[target] = value;
                    }
                }
            }
            Ok(())
        })
    }

    // ---------------------------------------------------------------------
    //  Enable / disable
    // ---------------------------------------------------------------------

    pub fn disabled_samples(&self) -> &BTreeSet<String> {
        &self.disabled
    }

    /// Records of all samples, disabled ones included.
    pub fn original_samples(&self) -> &[SampleRecord] {
        match &self.original {
            Some(original) => &original.samples,
            None => &self.samples,
        }
    }

    /// All samples, disabled ones included, in their stored order.
    pub fn all_sample_names(&self) -> Vec<&str> {
        match &self.original {
            Some(original) => original.sample_names(),
            None => self.sample_names(),
        }
    }

    fn snapshot(&self) -> DataTable {
        let mut full = self.clone();
        full.disabled.clear();
        full.original = None;
        full
    }

    fn refresh_visible(&mut self) {
        let Some(original) = self.original.take() else {
            return;
        };
        self.disabled
            .retain(|name| original.sample_index(name).is_some());
        let disabled = self.disabled.clone();
        self.rebuild_from(&original, |s| !disabled.contains(&s.name));
        self.original = Some(original);
    }

    /// Once nothing is disabled the snapshot is folded back and dropped.
    fn drop_snapshot_if_unused(&mut self) {
        if !self.disabled.is_empty() {
            return;
        }
        if let Some(original) = self.original.take() {
            let original = *original;
            self.samples = original.samples;
            self.classifications = original.classifications;
            self.total_reads = original.total_reads;
        }
    }

    /// Hides the named samples. The first call snapshots the full table.
    /// Returns whether the disabled set changed.
    pub fn disable_samples<S: AsRef<str>>(&mut self, names: &[S]) -> Result<bool> {
        for name in names {
            let name = name.as_ref();
            if self.sample_index(name).is_none() && !self.disabled.contains(name) {
                return Err(Error::UnknownSample(name.to_string()));
            }
        }
        let before = self.disabled.len();
        if self.original.is_none() {
            self.original = Some(Box::new(self.snapshot()));
        }
        self.disabled
            .extend(names.iter().map(|s| s.as_ref().to_string()));
        self.refresh_visible();
        let changed = self.disabled.len() != before;
        self.drop_snapshot_if_unused();
        Ok(changed)
    }

    /// Shows the named samples again, rebuilding them from the snapshot.
    /// Returns whether the disabled set changed.
    pub fn enable_samples<S: AsRef<str>>(&mut self, names: &[S]) -> bool {
        let before = self.disabled.len();
        for name in names {
            self.disabled.remove(name.as_ref());
        }
        let changed = self.disabled.len() != before;
        if changed {
            self.refresh_visible();
        }
        self.drop_snapshot_if_unused();
        changed
    }

    /// Makes exactly `names` disabled.
    pub fn set_disabled_samples<S: AsRef<str>>(&mut self, names: &[S]) -> Result<bool> {
        let wanted: BTreeSet<String> = names.iter().map(|s| s.as_ref().to_string()).collect();
        let enable: Vec<String> = self.disabled.difference(&wanted).cloned().collect();
        let mut changed = self.enable_samples(&enable);
        let disable: Vec<String> = wanted.difference(&self.disabled).cloned().collect();
        if !disable.is_empty() {
            changed |= self.disable_samples(&disable)?;
        }
        Ok(changed)
    }

    /// The full table with the current disabled set, as it is persisted.
    fn persisted_view(&self) -> std::borrow::Cow<'_, DataTable> {
        match (&self.original, self.disabled.is_empty()) {
            (Some(original), false) => {
                let mut full = self.clone();
                full.samples = original.samples.clone();
                full.classifications = original.classifications.clone();
                full.total_reads = original.total_reads;
                full.original = None;
                std::borrow::Cow::Owned(full)
            }
            _ => std::borrow::Cow::Borrowed(self),
        }
    }

    // ---------------------------------------------------------------------
    //  Counts
    // ---------------------------------------------------------------------

    /// Classification names, sorted.
    pub fn classification_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.classifications.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn class2counts(&self, classification: &str) -> Option<&Class2Counts> {
        self.classifications.get(classification)
    }

    /// The counts of `classification`, created empty if needed.
    pub fn class2counts_mut(&mut self, classification: &str) -> &mut Class2Counts {
        self.classifications
            .entry(classification.to_string())
            .or_default()
    }

    /// Drops all counts, keeping samples and settings.
    pub fn clear_counts(&mut self) {
        self.classifications.clear();
        if let Some(original) = self.original.as_deref_mut() {
            original.classifications.clear();
        }
    }

    pub fn classifications(&self) -> &AHashMap<String, Class2Counts> {
        &self.classifications
    }

    pub fn count(&self, classification: &str, class_id: i32, sample: usize) -> f32 {
        self.classifications
            .get(classification)
            .and_then(|c| c.get(&class_id))
            .and_then(|counts| counts.get(sample))
            .copied()
            .unwrap_or(0.0)
    }

    /// Sets one count, sizing the vector to the sample count. Fails if
    /// `sample` is not a visible sample index.
    pub fn set_count(
        &mut self,
        classification: &str,
        class_id: i32,
        sample: usize,
        value: f32,
    ) -> Result<()> {
        let n = self.samples.len();
        if sample >= n {
            return Err(Error::UnknownSample(format!("#{sample} of {n}")));
        }
        let counts = self
            .class2counts_mut(classification)
            .entry(class_id)
            .or_insert_with(|| vec![0.0; n]);
        if counts.len() < n {
            counts.resize(n, 0.0);
        }
        counts[sample] = value;
        Ok(())
    }

    /// Sum over all classes of `classification` for one sample.
    pub fn classification_total(&self, classification: &str, sample: usize) -> f64 {
        self.classifications
            .get(classification)
            .map(|c| {
                c.values()
                    .map(|counts| counts.get(sample).copied().unwrap_or(0.0) as f64)
                    .sum()
            })
            .unwrap_or(0.0)
    }

    // ---------------------------------------------------------------------
    //  Scalars
    // ---------------------------------------------------------------------

    pub fn creator(&self) -> Option<&str> {
        self.creator.as_deref()
    }

    pub fn set_creator(&mut self, creator: impl Into<String>) {
        self.creator = Some(creator.into());
    }

    pub fn creation_date(&self) -> Option<&str> {
        self.creation_date.as_deref()
    }

    pub fn set_creation_date(&mut self, date: impl Into<String>) {
        self.creation_date = Some(date.into());
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn set_content_type(&mut self, content_type: impl Into<String>) {
        self.content_type = Some(content_type.into());
    }

    pub fn total_reads(&self) -> u64 {
        self.total_reads
    }

    pub fn set_total_reads(&mut self, total_reads: u64) {
        self.total_reads = total_reads;
    }

    pub fn additional_reads(&self) -> u64 {
        self.additional_reads
    }

    pub fn set_additional_reads(&mut self, additional_reads: u64) {
        self.additional_reads = additional_reads;
    }

    pub fn parameters(&self) -> &str {
        &self.parameters
    }

    pub fn set_parameters(&mut self, parameters: impl Into<String>) {
        self.parameters = parameters.into();
    }

    pub fn contaminants(&self) -> &str {
        &self.contaminants
    }

    pub fn set_contaminants(&mut self, contaminants: impl Into<String>) {
        self.contaminants = contaminants.into();
    }

    pub fn merged_files(&self) -> &[String] {
        &self.merged_files
    }

    pub fn set_merged_files(&mut self, files: Vec<String>) {
        self.merged_files = files;
    }

    pub fn color_table(&self) -> Option<&str> {
        self.color_table.as_deref()
    }

    pub fn color_table_heat_map(&self) -> Option<&str> {
        self.color_table_heat_map.as_deref()
    }

    pub fn color_by_position(&self) -> bool {
        self.color_by_position
    }

    pub fn set_color_table(&mut self, name: &str, by_position: bool, heat_map: Option<&str>) {
        self.color_table = Some(name.to_string());
        self.color_by_position = by_position;
        self.color_table_heat_map = heat_map.map(str::to_string);
    }

    pub fn color_edits(&self) -> Option<&str> {
        self.color_edits.as_deref()
    }

    pub fn set_color_edits(&mut self, edits: Option<String>) {
        self.color_edits = edits;
    }

    // ---------------------------------------------------------------------
    //  Per-classification settings
    // ---------------------------------------------------------------------

    pub fn collapsed_ids(&self, classification: &str) -> Option<&BTreeSet<i32>> {
        self.collapsed.get(classification)
    }

    pub fn set_collapsed_ids(&mut self, classification: &str, ids: BTreeSet<i32>) {
        self.collapsed.insert(classification.to_string(), ids);
    }

    pub fn algorithm(&self, classification: &str) -> Option<&str> {
        self.algorithms.get(classification).map(String::as_str)
    }

    pub fn set_algorithm(&mut self, classification: &str, algorithm: impl Into<String>) {
        self.algorithms
            .insert(classification.to_string(), algorithm.into());
    }

    pub fn node_style(&self, classification: &str) -> Option<&str> {
        self.node_styles.get(classification).map(String::as_str)
    }

    pub fn set_node_style(&mut self, classification: &str, style: impl Into<String>) {
        self.node_styles
            .insert(classification.to_string(), style.into());
    }

    pub fn node_formats(&self, classification: &str) -> Option<&str> {
        self.node_formats.get(classification).map(String::as_str)
    }

    pub fn set_node_formats(&mut self, classification: &str, formats: impl Into<String>) {
        self.node_formats
            .insert(classification.to_string(), formats.into());
    }

    pub fn edge_formats(&self, classification: &str) -> Option<&str> {
        self.edge_formats.get(classification).map(String::as_str)
    }

    pub fn set_edge_formats(&mut self, classification: &str, formats: impl Into<String>) {
        self.edge_formats
            .insert(classification.to_string(), formats.into());
    }

    /// Derived size of sample `i`: sum of its positive taxonomy counts.
    fn taxonomy_size(&self, sample: usize) -> f32 {
        self.classifications
            .get(TAXONOMY)
            .map(|c| {
                c.values()
                    .filter_map(|counts| counts.get(sample).copied())
                    .filter(|v| *v > 0.0)
                    .sum()
            })
            .unwrap_or(0.0)
    }
}

impl fmt::Display for DataTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Samples: {} (disabled: {}), total reads: {}, additional reads: {}",
            self.samples.len(),
            self.disabled.len(),
            self.total_reads,
            self.additional_reads
        )?;
        for s in &self.samples {
            writeln!(f, "  {}\t{}\t{}\t{}", s.name, s.blast_mode, s.size, s.uid)?;
        }
        for name in self.classification_names() {
            let classes = self.classifications.get(name).map_or(0, |c| c.len());
            writeln!(f, "  {name}: {classes} classes")?;
        }
        Ok(())
    }
}
