//src/data_table/codec.rs

use std::collections::BTreeSet;
use std::fmt::Display;
use std::io::{self, BufRead, Read, Write};
use std::path::Path;

use super::DataTable;
use crate::error::{Error, Result};
use crate::fileio::{create_writer, open_reader};
use crate::types::{full_classification_name, short_classification_name, BlastMode, TAXONOMY};

/// First line of every summary written by this crate.
pub const SUMMARY_TAG: &str = "@MEGAN4";

/// Summary markers that share the current layout.
const SUMMARY_MARKERS: [&str; 4] = ["@MEGAN6", "@MEGAN4", "@MEGAN3", "!MEGAN4"];

/// Markers of a layout that is no longer supported.
const UNSUPPORTED_MARKERS: [&str; 2] = ["@MEGAN2", "!MEGAN2"];

/// Marker of the old semicolon-delimited single-sample format.
pub const LEGACY_TAG: &str = "!MEGAN";

/// Content type written into new summaries.
pub const CONTENT_TYPE_SUMMARY: &str = "Summary4";

/// Sentinel after which nothing is read.
pub const END_OF_DATA: &str = "END_OF_DATA_TABLE";

/// Which reader a document needs, decided from its first non-blank line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    /// Tab-separated multi-sample summary.
    Summary,
    /// Old single-sample `key=value` / `id=count;` format.
    Legacy,
}

impl DocumentFormat {
    pub fn sniff(first_line: &str) -> Result<DocumentFormat> {
        let line = first_line.trim();
        let tag = line.split('\t').next().unwrap_or_default();
        if SUMMARY_MARKERS.contains(&tag) {
            Ok(DocumentFormat::Summary)
        } else if UNSUPPORTED_MARKERS.contains(&tag) {
            Err(Error::UnsupportedFormat(tag.to_string()))
        } else if tag.starts_with(LEGACY_TAG) {
            Ok(DocumentFormat::Legacy)
        } else if tag.starts_with('@') {
            // summary without a leading marker line
            Ok(DocumentFormat::Summary)
        } else {
            Err(Error::UnknownFormat(truncate(line, 40).to_string()))
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

/// The header lines of a summary. Every tag is spelled exactly as it
/// appears in existing files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderField {
    Creator,
    CreationDate,
    ContentType,
    Names,
    BlastMode,
    Disabled,
    Merge,
    Uids,
    Sizes,
    TotalReads,
    AdditionalReads,
    Collapse,
    Algorithm,
    Parameters,
    Contaminants,
    NodeStyle,
    ColorTable,
    ColorEdits,
    NodeFormats,
    EdgeFormats,
}

impl HeaderField {
    pub const ALL: [HeaderField; 20] = [
        HeaderField::Creator,
        HeaderField::CreationDate,
        HeaderField::ContentType,
        HeaderField::Names,
        HeaderField::BlastMode,
        HeaderField::Disabled,
        HeaderField::Merge,
        HeaderField::Uids,
        HeaderField::Sizes,
        HeaderField::TotalReads,
        HeaderField::AdditionalReads,
        HeaderField::Collapse,
        HeaderField::Algorithm,
        HeaderField::Parameters,
        HeaderField::Contaminants,
        HeaderField::NodeStyle,
        HeaderField::ColorTable,
        HeaderField::ColorEdits,
        HeaderField::NodeFormats,
        HeaderField::EdgeFormats,
    ];

    pub fn tag(&self) -> &'static str {
        match self {
            HeaderField::Creator => "@Creator",
            HeaderField::CreationDate => "@CreationDate",
            HeaderField::ContentType => "@ContentType",
            HeaderField::Names => "@Names",
            HeaderField::BlastMode => "@BlastMode",
            HeaderField::Disabled => "@Disabled",
            HeaderField::Merge => "@Merge",
            HeaderField::Uids => "@Uids",
            HeaderField::Sizes => "@Sizes",
            HeaderField::TotalReads => "@TotalReads",
            HeaderField::AdditionalReads => "@AdditionalReads",
            HeaderField::Collapse => "@Collapse",
            HeaderField::Algorithm => "@Algorithm",
            HeaderField::Parameters => "@Parameters",
            HeaderField::Contaminants => "@Contaminants",
            HeaderField::NodeStyle => "@NodeStyle",
            HeaderField::ColorTable => "@ColorTable",
            HeaderField::ColorEdits => "@ColorEdits",
            HeaderField::NodeFormats => "@NodeFormats",
            HeaderField::EdgeFormats => "@EdgeFormats",
        }
    }

    pub fn from_tag(tag: &str) -> Option<HeaderField> {
        Self::ALL.iter().copied().find(|f| f.tag() == tag)
    }
}

/// Per-sample header values collected while reading; they may arrive in any
/// order and with different lengths, and are joined into sample records once
/// the header is complete.
#[derive(Debug, Default)]
struct PendingSamples {
    names: Vec<String>,
    modes: Vec<BlastMode>,
    uids: Vec<i64>,
    sizes: Vec<f32>,
    disabled: Vec<String>,
}

fn parse_number<T: std::str::FromStr>(token: &str, line: usize) -> Option<T> {
    match token.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("Line {line}: cannot parse number: {token}");
            None
        }
    }
}

/// Requires at least `n` payload tokens, logging otherwise.
fn payload<'a>(field: HeaderField, args: &'a [&'a str], n: usize, line: usize) -> Option<&'a [&'a str]> {
    if args.len() < n {
        log::warn!("Line {line}: too few tokens for {}", field.tag());
        None
    } else {
        Some(args)
    }
}

impl DataTable {
    fn apply_header(
        &mut self,
        field: HeaderField,
        args: &[&str],
        pending: &mut PendingSamples,
        line: usize,
    ) {
        let owned = |args: &[&str]| args.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        match field {
            HeaderField::Creator => self.creator = Some(args.join(" ")),
            HeaderField::CreationDate => self.creation_date = Some(args.join(" ")),
            HeaderField::ContentType => self.content_type = Some(args.join(" ")),
            HeaderField::Names => pending.names = owned(args),
            HeaderField::BlastMode => {
                pending.modes = args.iter().map(|s| BlastMode::parse_lenient(s)).collect()
            }
            HeaderField::Disabled => pending.disabled = owned(args),
            HeaderField::Merge => self.merged_files = owned(args),
            HeaderField::Uids => {
                pending.uids = args
                    .iter()
                    .map(|s| parse_number::<i64>(s, line).unwrap_or(0))
                    .collect()
            }
            HeaderField::Sizes => {
                pending.sizes = args
                    .iter()
                    .map(|s| parse_number::<f32>(s, line).unwrap_or(0.0))
                    .collect()
            }
            HeaderField::TotalReads => {
                if let Some(args) = payload(field, args, 1, line) {
                    // older files wrote the total as a float
                    if let Some(v) = parse_number::<f64>(args[0], line) {
                        self.total_reads = v.max(0.0).round() as u64;
                    }
                }
            }
            HeaderField::AdditionalReads => {
                if let Some(args) = payload(field, args, 1, line) {
                    if let Some(v) = parse_number::<f64>(args[0], line) {
                        self.additional_reads = v.max(0.0).round() as u64;
                    }
                }
            }
            HeaderField::Collapse => {
                if let Some(args) = payload(field, args, 1, line) {
                    let ids: BTreeSet<i32> = args[1..]
                        .iter()
                        .filter_map(|s| parse_number::<i32>(s, line))
                        .collect();
                    self.collapsed.insert(args[0].to_string(), ids);
                }
            }
            HeaderField::Algorithm => {
                if let Some(args) = payload(field, args, 2, line) {
                    self.algorithms.insert(args[0].to_string(), args[1..].join("\t"));
                }
            }
            HeaderField::Parameters => self.parameters = args.join("\t"),
            HeaderField::Contaminants => self.contaminants = args.join("\t"),
            HeaderField::NodeStyle => {
                if let Some(args) = payload(field, args, 2, line) {
                    self.node_styles.insert(args[0].to_string(), args[1].to_string());
                }
            }
            HeaderField::ColorTable => {
                if let Some(args) = payload(field, args, 1, line) {
                    self.color_table = Some(args[0].to_string());
                    self.color_by_position = args
                        .get(1)
                        .map(|s| s.eq_ignore_ascii_case("true"))
                        .unwrap_or(false);
                    self.color_table_heat_map = args.get(2).map(|s| s.to_string());
                }
            }
            HeaderField::ColorEdits => {
                self.color_edits = (!args.is_empty()).then(|| args.join("\t"))
            }
            HeaderField::NodeFormats => {
                if let Some(args) = payload(field, args, 2, line) {
                    self.node_formats.insert(args[0].to_string(), args[1..].join("\t"));
                }
            }
            HeaderField::EdgeFormats => {
                if let Some(args) = payload(field, args, 2, line) {
                    self.edge_formats.insert(args[0].to_string(), args[1..].join("\t"));
                }
            }
        }
    }

    fn apply_data_row(&mut self, tokens: &[&str], expected: usize, line: usize) {
        if tokens.len() < 3 {
            log::warn!("Line {line}: too few tokens in data row");
            return;
        }
        let classification = full_classification_name(tokens[0]).to_string();
        let Some(class_id) = parse_number::<i32>(tokens[1], line) else {
            return;
        };
        let values = &tokens[2..];
        let mut counts = vec![0.0f32; expected.max(values.len())];
        for (slot, token) in counts.iter_mut().zip(values) {
            *slot = parse_number::<f32>(token, line).unwrap_or(0.0);
        }
        self.classifications
            .entry(classification)
            .or_default()
            .insert(class_id, counts);
    }

    /// Joins the collected per-sample values into records and repairs
    /// anything missing: uids are generated, sizes derived from the taxonomy
    /// counts (or the total for a single sample), modes default to `Unknown`.
    fn finish_read(&mut self, pending: PendingSamples) -> Result<()> {
        let n = pending.names.len();
        if pending.uids.len() != n || pending.sizes.len() != n || pending.modes.len() != n {
            log::debug!(
                "Repairing sample arrays: names={}, uids={}, sizes={}, modes={}",
                n,
                pending.uids.len(),
                pending.sizes.len(),
                pending.modes.len()
            );
        }
        let sizes: Vec<f32> = (0..n)
            .map(|i| match pending.sizes.get(i) {
                Some(size) => *size,
                None if n == 1 && self.total_reads > 0 => self.total_reads as f32,
                None => self.taxonomy_size(i),
            })
            .collect();

        let classifications = std::mem::take(&mut self.classifications);
        self.set_samples(&pending.names, &pending.uids, &sizes, &pending.modes);
        self.classifications = classifications;
        self.normalize_vectors();

        if self.total_reads == 0 && n > 0 {
            self.total_reads = self.sum_of_sizes();
        }

        let disabled: Vec<&String> = pending
            .disabled
            .iter()
            .filter(|name| {
                let known = self.sample_index(name).is_some();
                if !known {
                    log::warn!("Ignoring unknown disabled sample: {name}");
                }
                known
            })
            .collect();
        if !disabled.is_empty() {
            self.disable_samples(&disabled)?;
        }
        Ok(())
    }

    /// Reads a summary. With `header_only`, reading stops at the first data
    /// row and no counts are loaded.
    ///
    /// Malformed lines are logged and skipped; rows already read are kept.
    pub fn read<R: BufRead>(&mut self, reader: R, header_only: bool) -> Result<()> {
        self.clear();
        let mut pending = PendingSamples::default();

        for (i, line) in reader.lines().enumerate() {
            let line_number = i + 1;
            let line = line.map_err(|e| Error::read("data table", e))?;
            let line = line.trim_end_matches(['\r', '\n']);
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            if trimmed == END_OF_DATA {
                break;
            }

            let tokens: Vec<&str> = line.split('\t').collect();
            let tag = tokens[0].trim();
            if SUMMARY_MARKERS.contains(&tag) {
                continue;
            }
            if UNSUPPORTED_MARKERS.contains(&tag) {
                return Err(Error::UnsupportedFormat(tag.to_string()));
            }

            if tag.starts_with('@') {
                match HeaderField::from_tag(tag) {
                    Some(field) => self.apply_header(field, &tokens[1..], &mut pending, line_number),
                    None => log::warn!("Line {line_number}: skipping unknown header tag: {tag}"),
                }
            } else if header_only {
                break;
            } else {
                self.apply_data_row(&tokens, pending.names.len(), line_number);
            }
        }

        self.finish_read(pending)
    }

    /// Reads a document in any supported format, choosing the reader from
    /// its first non-blank line.
    pub fn load<R: Read>(&mut self, mut reader: R) -> Result<DocumentFormat> {
        let mut text = String::new();
        reader
            .read_to_string(&mut text)
            .map_err(|e| Error::read("document", e))?;
        let first = text
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .ok_or_else(|| Error::UnknownFormat("empty document".to_string()))?;

        let format = DocumentFormat::sniff(first)?;
        match format {
            DocumentFormat::Summary => self.read(text.as_bytes(), false)?,
            DocumentFormat::Legacy => self.import_legacy(text.as_bytes())?,
        }
        Ok(format)
    }

    /// Loads a document from disk; `.gz` files are decompressed.
    pub fn read_file<P: AsRef<Path>>(&mut self, path: P) -> Result<DocumentFormat> {
        let path = path.as_ref();
        let reader = open_reader(path).map_err(|e| Error::read(path.display().to_string(), e))?;
        self.load(reader)
    }

    /// Writes the summary. While samples are disabled the full table is
    /// written together with the disabled set.
    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        self.persisted_view().write_table(w, false)
    }

    /// Writes only the header lines (no counts).
    pub fn write_header<W: Write>(&self, w: &mut W) -> io::Result<()> {
        self.persisted_view().write_table(w, true)
    }

    pub fn write_file<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut w = create_writer(path)?;
        self.write(&mut w)?;
        w.flush()
    }

    fn write_table<W: Write>(&self, w: &mut W, header_only: bool) -> io::Result<()> {
        let creator = self
            .creator
            .clone()
            .unwrap_or_else(|| concat!("megan-doc ", env!("CARGO_PKG_VERSION")).to_string());
        let date = self.creation_date.clone().unwrap_or_else(|| {
            chrono::Local::now()
                .format("%a %b %d %H:%M:%S %Y")
                .to_string()
        });
        let n = self.samples.len();

        writeln!(w, "{SUMMARY_TAG}")?;
        writeln!(w, "{}\t{creator}", HeaderField::Creator.tag())?;
        writeln!(w, "{}\t{date}", HeaderField::CreationDate.tag())?;
        writeln!(
            w,
            "{}\t{}",
            HeaderField::ContentType.tag(),
            self.content_type.as_deref().unwrap_or(CONTENT_TYPE_SUMMARY)
        )?;
        writeln!(
            w,
            "{}{}",
            HeaderField::Names.tag(),
            tabbed(self.samples.iter().map(|s| &s.name))
        )?;
        writeln!(
            w,
            "{}{}",
            HeaderField::BlastMode.tag(),
            tabbed(self.samples.iter().map(|s| s.blast_mode))
        )?;
        if !self.disabled.is_empty() {
            writeln!(
                w,
                "{}{}",
                HeaderField::Disabled.tag(),
                tabbed(&self.disabled)
            )?;
        }
        if !self.merged_files.is_empty() {
            writeln!(
                w,
                "{}{}",
                HeaderField::Merge.tag(),
                tabbed(&self.merged_files)
            )?;
        }
        writeln!(
            w,
            "{}{}",
            HeaderField::Uids.tag(),
            tabbed(self.samples.iter().map(|s| s.uid))
        )?;
        writeln!(
            w,
            "{}{}",
            HeaderField::Sizes.tag(),
            tabbed(self.samples.iter().map(|s| s.size))
        )?;
        writeln!(w, "{}\t{}", HeaderField::TotalReads.tag(), self.total_reads)?;
        if self.additional_reads > 0 {
            writeln!(
                w,
                "{}\t{}",
                HeaderField::AdditionalReads.tag(),
                self.additional_reads
            )?;
        }

        for name in sorted_keys(&self.collapsed) {
            writeln!(
                w,
                "{}\t{name}{}",
                HeaderField::Collapse.tag(),
                tabbed(&self.collapsed[name])
            )?;
        }
        for name in sorted_keys(&self.algorithms) {
            writeln!(w, "{}\t{name}\t{}", HeaderField::Algorithm.tag(), self.algorithms[name])?;
        }
        if !self.parameters.is_empty() {
            writeln!(w, "{}\t{}", HeaderField::Parameters.tag(), self.parameters)?;
        }
        if !self.contaminants.is_empty() {
            writeln!(w, "{}\t{}", HeaderField::Contaminants.tag(), self.contaminants)?;
        }
        for name in sorted_keys(&self.node_styles) {
            writeln!(w, "{}\t{name}\t{}", HeaderField::NodeStyle.tag(), self.node_styles[name])?;
        }
        if let Some(color_table) = &self.color_table {
            write!(
                w,
                "{}\t{color_table}\t{}",
                HeaderField::ColorTable.tag(),
                self.color_by_position
            )?;
            if let Some(heat_map) = &self.color_table_heat_map {
                write!(w, "\t{heat_map}")?;
            }
            writeln!(w)?;
        }
        if let Some(edits) = &self.color_edits {
            writeln!(w, "{}\t{edits}", HeaderField::ColorEdits.tag())?;
        }
        for name in sorted_keys(&self.node_formats) {
            writeln!(w, "{}\t{name}\t{}", HeaderField::NodeFormats.tag(), self.node_formats[name])?;
        }
        for name in sorted_keys(&self.edge_formats) {
            writeln!(w, "{}\t{name}\t{}", HeaderField::EdgeFormats.tag(), self.edge_formats[name])?;
        }

        if !header_only {
            for name in sorted_keys(&self.classifications) {
                let short = short_classification_name(name);
                let class2counts = &self.classifications[name];
                let mut ids: Vec<i32> = class2counts.keys().copied().collect();
                ids.sort_unstable();
                for id in ids {
                    let counts = &class2counts[&id];
                    write!(w, "{short}\t{id}")?;
                    for i in 0..n {
                        write!(w, "\t{}", counts.get(i).copied().unwrap_or(0.0))?;
                    }
                    writeln!(w)?;
                }
            }
        }
        writeln!(w, "{END_OF_DATA}")
    }

    /// Imports the old single-sample format:
    ///
    /// ```text
    /// !MEGAN
    /// @Name=sample1
    /// @Mode=BlastX
    /// @TotalReads=1000
    /// 2=40;10=5;
    /// SEED:12=3;14=5;
    /// ```
    ///
    /// Lines without a classification prefix hold taxonomy counts. The sample
    /// size is the sum of the positive taxonomy counts.
    pub fn import_legacy<R: BufRead>(&mut self, reader: R) -> Result<()> {
        self.clear();
        let mut name = "Unknown".to_string();
        let mut mode = BlastMode::Unknown;
        let mut total_reads = None;

        for (i, line) in reader.lines().enumerate() {
            let line_number = i + 1;
            let line = line.map_err(|e| Error::read("legacy document", e))?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(LEGACY_TAG) {
                continue;
            }

            if let Some(header) = line.strip_prefix('@') {
                let Some((key, value)) = header.split_once('=') else {
                    log::warn!("Line {line_number}: expected key=value: {line}");
                    continue;
                };
                let value = value.trim();
                match key.trim() {
                    "Creator" => self.creator = Some(value.to_string()),
                    "CreationDate" => self.creation_date = Some(value.to_string()),
                    "Name" => name = value.to_string(),
                    "Mode" => mode = BlastMode::parse_lenient(value),
                    "TotalReads" => total_reads = parse_number::<u64>(value, line_number),
                    "AdditionalReads" => {
                        self.additional_reads =
                            parse_number::<u64>(value, line_number).unwrap_or(0)
                    }
                    "Parameters" => self.parameters = value.to_string(),
                    "Contaminants" => self.contaminants = value.to_string(),
                    "Algorithm" => {
                        self.algorithms.insert(TAXONOMY.to_string(), value.to_string());
                    }
                    other => log::warn!("Line {line_number}: skipping unknown key: {other}"),
                }
                continue;
            }

            let (classification, entries) = match line.split_once(':') {
                Some((prefix, rest)) => (full_classification_name(prefix.trim()), rest),
                None => (TAXONOMY, line),
            };
            let class2counts = self
                .classifications
                .entry(classification.to_string())
                .or_default();
            for entry in entries.split(';').map(str::trim).filter(|e| !e.is_empty()) {
                let Some((id, count)) = entry.split_once('=') else {
                    log::warn!("Line {line_number}: expected id=count: {entry}");
                    continue;
                };
                let (Some(id), Some(count)) = (
                    parse_number::<i32>(id, line_number),
                    parse_number::<f32>(count, line_number),
                ) else {
                    continue;
                };
                class2counts.entry(id).or_insert_with(|| vec![0.0])[0] += count;
            }
        }

        self.content_type = Some(CONTENT_TYPE_SUMMARY.to_string());
        let classifications = std::mem::take(&mut self.classifications);
        self.set_samples(&[name], &[], &[], &[mode]);
        self.classifications = classifications;
        self.normalize_vectors();
        let size = self.taxonomy_size(0);
        self.samples[0].size = size;
        self.total_reads = total_reads.unwrap_or(size.round() as u64);
        Ok(())
    }
}

fn sorted_keys<V>(map: &ahash::AHashMap<String, V>) -> Vec<&String> {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort_unstable();
    keys
}

/// Each item preceded by a tab, the layout of every multi-valued header line.
fn tabbed<I>(items: I) -> String
where
    I: IntoIterator,
    I::Item: Display,
{
    items.into_iter().map(|item| format!("\t{item}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TAXONOMY;

    const TWO_SAMPLES: &str = "@MEGAN4\n\
        @Creator\ttest\n\
        @Names\tS1\tS2\n\
        @TotalReads\t100\n\
        TAX\t2\t40\t60\n\
        END_OF_DATA_TABLE\n";

    #[test]
    fn test_read_two_sample_example() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut table = DataTable::new();
        table.read(TWO_SAMPLES.as_bytes(), false)?;
        assert_eq!(table.sample_names(), vec!["S1", "S2"]);
        assert_eq!(table.class2counts(TAXONOMY).unwrap()[&2], vec![40.0, 60.0]);
        assert_eq!(table.total_reads(), 100);
        assert_eq!(table.creator(), Some("test"));
        // sizes are derived from the taxonomy counts
        assert_eq!(table.sample_sizes(), vec![40.0, 60.0]);
        assert_eq!(table.sample_uids().len(), 2);
        assert_ne!(table.sample_uids()[0], table.sample_uids()[1]);
        Ok(())
    }

    #[test]
    fn test_round_trip() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut table = DataTable::new();
        table.set_samples(
            &["A".into(), "B c".into()],
            &[1001, 1002],
            &[12.5, 300.0],
            &[BlastMode::BlastX, BlastMode::Classifier],
        );
        table.set_total_reads(312);
        table.set_additional_reads(4);
        table.set_parameters("minScore=50.0 readAssignmentMode=readCount");
        table.set_contaminants("2 10");
        table.set_algorithm(TAXONOMY, "naive");
        table.set_node_style(TAXONOMY, "Circle");
        table.set_collapsed_ids(TAXONOMY, [2, 5].into_iter().collect());
        table.set_color_table("Fews8", true, Some("GreenToBlack"));
        table.set_color_edits(Some("edit1\tedit2".into()));
        table.set_merged_files(vec!["x.rma6".into(), "y.rma6".into()]);
        table.class2counts_mut(TAXONOMY).insert(2, vec![10.0, 250.5]);
        table.class2counts_mut(TAXONOMY).insert(-1, vec![2.5, 0.0]);
        table.class2counts_mut("SEED").insert(17, vec![0.125, 3.0]);

        let mut buf = Vec::new();
        table.write(&mut buf)?;
        let mut copy = DataTable::new();
        copy.read(buf.as_slice(), false)?;

        assert_eq!(copy.samples(), table.samples());
        assert_eq!(copy.total_reads(), 312);
        assert_eq!(copy.additional_reads(), 4);
        assert_eq!(copy.parameters(), table.parameters());
        assert_eq!(copy.contaminants(), "2 10");
        assert_eq!(copy.algorithm(TAXONOMY), Some("naive"));
        assert_eq!(copy.node_style(TAXONOMY), Some("Circle"));
        assert_eq!(copy.collapsed_ids(TAXONOMY), table.collapsed_ids(TAXONOMY));
        assert_eq!(copy.color_table(), Some("Fews8"));
        assert!(copy.color_by_position());
        assert_eq!(copy.color_table_heat_map(), Some("GreenToBlack"));
        assert_eq!(copy.color_edits(), Some("edit1\tedit2"));
        assert_eq!(copy.merged_files(), table.merged_files());
        assert_eq!(copy.classifications(), table.classifications());
        Ok(())
    }

    #[test]
    fn test_tolerant_reading() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let text = "@MEGAN4\n\
            @Names\tS1\tS2\n\
            @Bogus\tx\n\
            # a comment\n\
            TAX\t5\n\
            TAX\tx\t1\t2\n\
            TAX\t3\t7\n\
            SEED\t4\t1\tnope\n\
            TAX\t6\t1\t2\t3\n";
        let mut table = DataTable::new();
        table.read(text.as_bytes(), false)?;
        let tax = table.class2counts(TAXONOMY).unwrap();
        assert_eq!(tax.len(), 2);
        assert_eq!(tax[&3], vec![7.0, 0.0]);
        assert_eq!(tax[&6], vec![1.0, 2.0]);
        assert_eq!(table.class2counts("SEED").unwrap()[&4], vec![1.0, 0.0]);
        Ok(())
    }

    #[test]
    fn test_header_only() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut table = DataTable::new();
        table.read(TWO_SAMPLES.as_bytes(), true)?;
        assert_eq!(table.sample_names(), vec!["S1", "S2"]);
        assert!(table.classification_names().is_empty());
        Ok(())
    }

    #[test]
    fn test_write_truncates_long_vectors() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut table = DataTable::new();
        table.set_samples(&["A".into()], &[1], &[3.0], &[]);
        table.class2counts_mut(TAXONOMY).insert(2, vec![3.0, 9.0, 9.0]);
        let mut buf = Vec::new();
        table.write(&mut buf)?;
        let text = String::from_utf8(buf)?;
        assert!(text.lines().any(|l| l == "TAX\t2\t3"));
        Ok(())
    }

    #[test]
    fn test_disabled_samples_persist_full_table() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut table = DataTable::new();
        table.read(TWO_SAMPLES.as_bytes(), false)?;
        table.disable_samples(&["S1"])?;
        assert_eq!(table.sample_names(), vec!["S2"]);

        let mut buf = Vec::new();
        table.write(&mut buf)?;
        let text = String::from_utf8(buf.clone())?;
        assert!(text.contains("@Names\tS1\tS2\n"));
        assert!(text.contains("@Disabled\tS1\n"));
        assert!(text.contains("TAX\t2\t40\t60\n"));

        let mut copy = DataTable::new();
        copy.read(buf.as_slice(), false)?;
        assert_eq!(copy.sample_names(), vec!["S2"]);
        assert_eq!(copy.class2counts(TAXONOMY).unwrap()[&2], vec![60.0]);
        copy.enable_samples(&["S1"]);
        assert_eq!(copy.sample_names(), vec!["S1", "S2"]);
        assert_eq!(copy.class2counts(TAXONOMY).unwrap()[&2], vec![40.0, 60.0]);
        Ok(())
    }

    #[test]
    fn test_sniff() {
        assert_eq!(DocumentFormat::sniff("@MEGAN6").unwrap(), DocumentFormat::Summary);
        assert_eq!(DocumentFormat::sniff("@MEGAN3").unwrap(), DocumentFormat::Summary);
        assert_eq!(DocumentFormat::sniff("@Names\tA").unwrap(), DocumentFormat::Summary);
        assert_eq!(DocumentFormat::sniff("!MEGAN").unwrap(), DocumentFormat::Legacy);
        assert!(matches!(
            DocumentFormat::sniff("@MEGAN2"),
            Err(Error::UnsupportedFormat(_))
        ));
        assert!(matches!(
            DocumentFormat::sniff(">read1"),
            Err(Error::UnknownFormat(_))
        ));
    }

    #[test]
    fn test_legacy_import() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let text = "!MEGAN\n\
            @Creator=MEGAN 2.1\n\
            @Name=gut\n\
            @Mode=blastx\n\
            @Parameters=minScore=35.0 topPercent=10\n\
            @Weird=1\n\
            2=40;10=5;-1=3;\n\
            10=1;\n\
            SEED:12=3;bad;\n";
        let mut table = DataTable::new();
        let format = table.load(text.as_bytes())?;
        assert_eq!(format, DocumentFormat::Legacy);
        assert_eq!(table.sample_names(), vec!["gut"]);
        assert_eq!(table.blast_mode(), BlastMode::BlastX);
        assert_eq!(table.parameters(), "minScore=35.0 topPercent=10");
        let tax = table.class2counts(TAXONOMY).unwrap();
        assert_eq!(tax[&10], vec![6.0]);
        assert_eq!(table.sample_sizes(), vec![49.0]);
        assert_eq!(table.total_reads(), 49);
        assert_eq!(table.class2counts("SEED").unwrap()[&12], vec![3.0]);
        Ok(())
    }

    #[test]
    fn test_round_trip_keeps_padded_sample_names() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut table = DataTable::new();
        table.set_samples(&["S1".into(), "S2 ".into(), " S3".into()], &[1, 2, 3], &[1.0, 2.0, 3.0], &[]);
        table.set_total_reads(6);

        let mut buf = Vec::new();
        table.write(&mut buf)?;
        let mut copy = DataTable::new();
        copy.read(buf.as_slice(), false)?;
        assert_eq!(copy.sample_names(), vec!["S1", "S2 ", " S3"]);

        copy.read("@Names\tA\tB\r\nTAX\t2\t1\t2\r\n".as_bytes(), false)?;
        assert_eq!(copy.sample_names(), vec!["A", "B"]);
        assert_eq!(copy.count(TAXONOMY, 2, 1), 2.0);
        Ok(())
    }

    #[test]
    fn test_load_rejects_old_format() {
        let mut table = DataTable::new();
        assert!(matches!(
            table.load("@MEGAN2\nfoo\n".as_bytes()),
            Err(Error::UnsupportedFormat(_))
        ));
    }
}
