//src/sample_attributes.rs

use std::cmp::Ordering;
use std::fmt;
use std::io::{self, BufRead, Write};

use ahash::{AHashMap, AHashSet};
use chrono::NaiveDate;

use crate::error::{Error, Result};

/// Header of the sample id column.
pub const SAMPLE_ID: &str = "#SampleID";
/// Attributes starting with this are internal bookkeeping.
pub const SECRET_PREFIX: &str = "@";
/// Attributes ending with this are never imported.
pub const HIDDEN_SUFFIX: &str = "[hidden]";
/// Written for absent values; read back as absent.
pub const MISSING: &str = "NA";

pub const BARCODE_SEQUENCE: &str = "BarcodeSequence";
pub const LINKER_PRIMER_SEQUENCE: &str = "LinkerPrimerSequence";
pub const DESCRIPTION: &str = "Description";

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%d.%m.%Y", "%m/%d/%Y"];

pub fn is_secret_attribute(name: &str) -> bool {
    name.starts_with(SECRET_PREFIX)
}

pub fn is_hidden_attribute(name: &str) -> bool {
    name.ends_with(HIDDEN_SUFFIX)
}

/// Attributes the viewer keeps per sample for its own use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecretAttribute {
    Color,
    Shape,
    Label,
    GroupId,
    Source,
}

impl SecretAttribute {
    pub fn name(&self) -> &'static str {
        match self {
            SecretAttribute::Color => "@Color",
            SecretAttribute::Shape => "@Shape",
            SecretAttribute::Label => "@Label",
            SecretAttribute::GroupId => "@GroupId",
            SecretAttribute::Source => "@Source",
        }
    }
}

/// Type of an attribute, inferred from all of its defined values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttributeType {
    #[default]
    Text,
    Integer,
    Float,
    Date,
}

impl AttributeType {
    fn infer<'a>(values: impl Iterator<Item = &'a str> + Clone) -> AttributeType {
        let mut values = values.peekable();
        if values.peek().is_none() {
            return AttributeType::Text;
        }
        if values.clone().all(|v| v.trim().parse::<i64>().is_ok()) {
            AttributeType::Integer
        } else if values.clone().all(|v| v.trim().parse::<f64>().is_ok()) {
            AttributeType::Float
        } else if values.all(|v| parse_date(v).is_some()) {
            AttributeType::Date
        } else {
            AttributeType::Text
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AttributeType::Text => "String",
            AttributeType::Integer => "Integer",
            AttributeType::Float => "Float",
            AttributeType::Date => "Date",
        };
        f.write_str(s)
    }
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(text.trim(), format).ok())
}

/// A value interpreted according to its attribute's type.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Date(NaiveDate),
}

impl AttributeValue {
    fn parse(text: &str, kind: AttributeType) -> AttributeValue {
        let trimmed = text.trim();
        let parsed = match kind {
            AttributeType::Integer => trimmed.parse().ok().map(AttributeValue::Integer),
            AttributeType::Float => trimmed.parse().ok().map(AttributeValue::Float),
            AttributeType::Date => parse_date(trimmed).map(AttributeValue::Date),
            AttributeType::Text => None,
        };
        parsed.unwrap_or_else(|| AttributeValue::Text(text.to_string()))
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Integer(v) => Some(*v as f64),
            AttributeValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            AttributeValue::Integer(_) | AttributeValue::Float(_) => 0,
            AttributeValue::Date(_) => 1,
            AttributeValue::Text(_) => 2,
        }
    }

    fn compare(&self, other: &AttributeValue) -> Ordering {
        match (self, other) {
            (AttributeValue::Text(a), AttributeValue::Text(b)) => a.cmp(b),
            (AttributeValue::Date(a), AttributeValue::Date(b)) => a.cmp(b),
            (AttributeValue::Integer(a), AttributeValue::Integer(b)) => a.cmp(b),
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a.total_cmp(&b),
                _ => self.rank().cmp(&other.rank()),
            },
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Text(v) => f.write_str(v),
            AttributeValue::Integer(v) => write!(f, "{v}"),
            AttributeValue::Float(v) => write!(f, "{v}"),
            AttributeValue::Date(v) => write!(f, "{}", v.format("%Y-%m-%d")),
        }
    }
}

/// Controls what [`SampleAttributeTable::write`] exports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttributeWriteOptions {
    /// Also write secret and hidden attributes.
    pub include_secret: bool,
    /// QIIME layout: `BarcodeSequence` and `LinkerPrimerSequence` right
    /// after the id column, `Description` last.
    pub qiime: bool,
}

/// Sample metadata: a sparse sample × attribute relation with explicit
/// presentation orders for both axes.
///
/// Values are kept as text. Absent values are simply not stored, so `NA`
/// never appears as a value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleAttributeTable {
    sample_order: Vec<String>,
    attribute_order: Vec<String>,
    values: AHashMap<String, AHashMap<String, String>>,
    types: AHashMap<String, AttributeType>,
}

fn is_missing(value: &str) -> bool {
    value.is_empty() || value == MISSING
}

impl SampleAttributeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn number_of_samples(&self) -> usize {
        self.sample_order.len()
    }

    pub fn number_of_attributes(&self) -> usize {
        self.attribute_order.len()
    }

    pub fn sample_order(&self) -> &[String] {
        &self.sample_order
    }

    pub fn attribute_order(&self) -> &[String] {
        &self.attribute_order
    }

    pub fn sample_set(&self) -> AHashSet<&str> {
        self.sample_order.iter().map(String::as_str).collect()
    }

    pub fn contains_sample(&self, sample: &str) -> bool {
        self.values.contains_key(sample)
    }

    pub fn contains_attribute(&self, attribute: &str) -> bool {
        self.types.contains_key(attribute)
    }

    /// Attributes that are neither secret nor hidden, in presentation order.
    pub fn user_attributes(&self) -> Vec<&str> {
        self.attribute_order
            .iter()
            .map(String::as_str)
            .filter(|a| !is_secret_attribute(a) && !is_hidden_attribute(a))
            .collect()
    }

    fn refresh_type(&mut self, attribute: &str) {
        let values = self
            .values
            .values()
            .filter_map(|row| row.get(attribute).map(String::as_str));
        let kind = AttributeType::infer(values);
        self.types.insert(attribute.to_string(), kind);
    }

    fn register_attribute(&mut self, attribute: &str) {
        if !self.types.contains_key(attribute) {
            self.attribute_order.push(attribute.to_string());
            self.types.insert(attribute.to_string(), AttributeType::Text);
        }
    }

    fn register_sample(&mut self, sample: &str) {
        if !self.values.contains_key(sample) {
            self.sample_order.push(sample.to_string());
            self.values.insert(sample.to_string(), AHashMap::new());
        }
    }

    fn refresh_types_of_row(&mut self, sample: &str) {
        let attributes: Vec<String> = self
            .values
            .get(sample)
            .map(|row| row.keys().cloned().collect())
            .unwrap_or_default();
        for attribute in attributes {
            self.refresh_type(&attribute);
        }
    }

    pub fn get(&self, sample: &str, attribute: &str) -> Option<&str> {
        self.values.get(sample)?.get(attribute).map(String::as_str)
    }

    /// Stores one value, adding the sample and the attribute if needed.
    /// An empty or `NA` value removes the entry.
    pub fn put(&mut self, sample: &str, attribute: &str, value: impl Into<String>) {
        let value = value.into();
        self.register_sample(sample);
        self.register_attribute(attribute);
        if let Some(row) = self.values.get_mut(sample) {
            if is_missing(&value) {
                row.remove(attribute);
            } else {
                row.insert(attribute.to_string(), value);
            }
        }
        self.refresh_type(attribute);
    }

    pub fn attribute_type(&self, attribute: &str) -> Option<AttributeType> {
        self.types.get(attribute).copied()
    }

    pub fn typed_value(&self, sample: &str, attribute: &str) -> Option<AttributeValue> {
        let text = self.get(sample, attribute)?;
        let kind = self.attribute_type(attribute).unwrap_or_default();
        Some(AttributeValue::parse(text, kind))
    }

    pub fn secret(&self, sample: &str, attribute: SecretAttribute) -> Option<&str> {
        self.get(sample, attribute.name())
    }

    pub fn put_secret(&mut self, sample: &str, attribute: SecretAttribute, value: impl Into<String>) {
        self.put(sample, attribute.name(), value)
    }

    // ---------------------------------------------------------------------
    //  Samples
    // ---------------------------------------------------------------------

    /// Adds a sample with the given values. An existing sample is only
    /// replaced with `allow_replace`; values of unknown attributes are only
    /// kept with `allow_add_attribute`. Returns whether the sample was added.
    pub fn add_sample(
        &mut self,
        sample: &str,
        values: &[(&str, &str)],
        allow_replace: bool,
        allow_add_attribute: bool,
    ) -> bool {
        if self.contains_sample(sample) {
            if !allow_replace {
                return false;
            }
            if let Some(row) = self.values.get_mut(sample) {
                row.clear();
            }
        }
        self.register_sample(sample);
        for &(attribute, value) in values {
            if !self.contains_attribute(attribute) && !allow_add_attribute {
                continue;
            }
            self.register_attribute(attribute);
            if !is_missing(value) {
                if let Some(row) = self.values.get_mut(sample) {
                    row.insert(attribute.to_string(), value.to_string());
                }
            }
        }
        let touched: Vec<String> = self.attribute_order.clone();
        for attribute in &touched {
            self.refresh_type(attribute);
        }
        true
    }

    pub fn remove_sample(&mut self, sample: &str) -> bool {
        let Some(row) = self.values.remove(sample) else {
            return false;
        };
        self.sample_order.retain(|s| s != sample);
        for attribute in row.keys() {
            self.refresh_type(attribute);
        }
        true
    }

    pub fn remove_samples<S: AsRef<str>>(&mut self, samples: &[S]) {
        for sample in samples {
            self.remove_sample(sample.as_ref());
        }
    }

    /// Renames a sample in place. With `allow_replace` an existing sample
    /// called `new` is dropped first.
    pub fn rename_sample(&mut self, old: &str, new: &str, allow_replace: bool) -> Result<()> {
        if !self.contains_sample(old) {
            return Err(Error::UnknownSample(old.to_string()));
        }
        if old == new {
            return Ok(());
        }
        if self.contains_sample(new) {
            if !allow_replace {
                return Err(Error::DuplicateSample(new.to_string()));
            }
            self.remove_sample(new);
        }
        if let Some(row) = self.values.remove(old) {
            self.values.insert(new.to_string(), row);
        }
        if let Some(slot) = self.sample_order.iter_mut().find(|s| *s == old) {
            *slot = new.to_string();
        }
        Ok(())
    }

    /// Copies the values of `source` into a new sample appended at the end.
    pub fn duplicate_sample(&mut self, source: &str, new: &str, allow_replace: bool) -> Result<()> {
        let row = self
            .values
            .get(source)
            .cloned()
            .ok_or_else(|| Error::UnknownSample(source.to_string()))?;
        if self.contains_sample(new) {
            if !allow_replace {
                return Err(Error::DuplicateSample(new.to_string()));
            }
            self.remove_sample(new);
        }
        self.sample_order.push(new.to_string());
        self.values.insert(new.to_string(), row);
        self.refresh_types_of_row(new);
        Ok(())
    }

    /// Adds sample `new` carrying every attribute whose value is shared by
    /// all of `samples`.
    pub fn merge_samples<S: AsRef<str>>(&mut self, samples: &[S], new: &str) -> Result<()> {
        let rows = samples
            .iter()
            .map(|s| {
                self.values
                    .get(s.as_ref())
                    .ok_or_else(|| Error::UnknownSample(s.as_ref().to_string()))
            })
            .collect::<Result<Vec<_>>>()?;
        if self.contains_sample(new) {
            return Err(Error::DuplicateSample(new.to_string()));
        }
        let merged: AHashMap<String, String> = match rows.split_first() {
            Some((first, rest)) => first
                .iter()
                .filter(|(attribute, value)| {
                    rest.iter().all(|row| row.get(*attribute) == Some(*value))
                })
                .map(|(a, v)| (a.clone(), v.clone()))
                .collect(),
            None => AHashMap::new(),
        };
        self.sample_order.push(new.to_string());
        self.values.insert(new.to_string(), merged);
        self.refresh_types_of_row(new);
        Ok(())
    }

    /// A table holding just `samples`, in this table's sample order, with
    /// this table's attribute order.
    pub fn extract<S: AsRef<str>>(&self, samples: &[S]) -> SampleAttributeTable {
        let wanted: AHashSet<&str> = samples.iter().map(|s| s.as_ref()).collect();
        let mut table = SampleAttributeTable {
            attribute_order: self.attribute_order.clone(),
            ..Default::default()
        };
        for sample in self.sample_order.iter().filter(|s| wanted.contains(s.as_str())) {
            table.sample_order.push(sample.clone());
            table
                .values
                .insert(sample.clone(), self.values[sample].clone());
        }
        for attribute in &self.attribute_order {
            table.refresh_type(attribute);
        }
        table
    }

    /// Copies the rows of `other` into this table. Existing samples are
    /// overwritten only with `allow_replace`, new samples added only with
    /// `allow_add_new_samples`.
    pub fn add_table(&mut self, other: &SampleAttributeTable, allow_replace: bool, allow_add_new_samples: bool) {
        for sample in &other.sample_order {
            let exists = self.contains_sample(sample);
            if (exists && !allow_replace) || (!exists && !allow_add_new_samples) {
                continue;
            }
            self.register_sample(sample);
            for attribute in &other.attribute_order {
                self.register_attribute(attribute);
                if let Some(value) = other.get(sample, attribute) {
                    if let Some(row) = self.values.get_mut(sample) {
                        row.insert(attribute.clone(), value.to_string());
                    }
                }
            }
        }
        for attribute in &other.attribute_order {
            self.refresh_type(attribute);
        }
    }

    /// Puts the listed samples first, in the given order; the rest follow
    /// in their previous order.
    pub fn set_sample_order<S: AsRef<str>>(&mut self, order: &[S]) -> Result<()> {
        for sample in order {
            if !self.contains_sample(sample.as_ref()) {
                return Err(Error::UnknownSample(sample.as_ref().to_string()));
            }
        }
        self.sample_order = reordered(&self.sample_order, order);
        Ok(())
    }

    pub fn set_attribute_order<S: AsRef<str>>(&mut self, order: &[S]) -> Result<()> {
        for attribute in order {
            if !self.contains_attribute(attribute.as_ref()) {
                return Err(Error::UnknownAttribute(attribute.as_ref().to_string()));
            }
        }
        self.attribute_order = reordered(&self.attribute_order, order);
        Ok(())
    }

    /// Sorts samples by the typed value of `attribute`. Samples without a
    /// value go last in either direction; ties keep their order.
    pub fn sort_samples_by_attribute(&mut self, attribute: &str, ascending: bool) -> Result<()> {
        if !self.contains_attribute(attribute) {
            return Err(Error::UnknownAttribute(attribute.to_string()));
        }
        let mut keyed: Vec<(Option<AttributeValue>, String)> = self
            .sample_order
            .iter()
            .map(|s| (self.typed_value(s, attribute), s.clone()))
            .collect();
        keyed.sort_by(|(a, _), (b, _)| match (a, b) {
            (Some(a), Some(b)) if ascending => a.compare(b),
            (Some(a), Some(b)) => b.compare(a),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        });
        self.sample_order = keyed.into_iter().map(|(_, s)| s).collect();
        Ok(())
    }

    // ---------------------------------------------------------------------
    //  Attributes
    // ---------------------------------------------------------------------

    /// Adds a column from `sample -> value` pairs. An existing attribute is
    /// only overwritten with `allow_replace`; values for samples not in the
    /// table are dropped unless `allow_add_new_samples`. Returns whether the
    /// attribute was added.
    pub fn add_attribute(
        &mut self,
        attribute: &str,
        values: &[(&str, &str)],
        allow_replace: bool,
        allow_add_new_samples: bool,
    ) -> bool {
        if self.contains_attribute(attribute) {
            if !allow_replace {
                return false;
            }
            for row in self.values.values_mut() {
                row.remove(attribute);
            }
        }
        self.register_attribute(attribute);
        for &(sample, value) in values {
            if !self.contains_sample(sample) {
                if !allow_add_new_samples {
                    continue;
                }
                self.register_sample(sample);
            }
            if is_missing(value) {
                continue;
            }
            if let Some(row) = self.values.get_mut(sample) {
                row.insert(attribute.to_string(), value.to_string());
            }
        }
        self.refresh_type(attribute);
        true
    }

    pub fn remove_attribute(&mut self, attribute: &str) -> bool {
        if self.types.remove(attribute).is_none() {
            return false;
        }
        self.attribute_order.retain(|a| a != attribute);
        for row in self.values.values_mut() {
            row.remove(attribute);
        }
        true
    }

    /// Copies column `attribute` to `new`, placed right after it.
    pub fn duplicate_attribute(&mut self, attribute: &str, new: &str, allow_replace: bool) -> Result<()> {
        if !self.contains_attribute(attribute) {
            return Err(Error::UnknownAttribute(attribute.to_string()));
        }
        if self.contains_attribute(new) {
            if !allow_replace {
                return Err(Error::DuplicateAttribute(new.to_string()));
            }
            self.remove_attribute(new);
        }
        for row in self.values.values_mut() {
            if let Some(value) = row.get(attribute).cloned() {
                row.insert(new.to_string(), value);
            }
        }
        self.insert_attribute_after(attribute, vec![new.to_string()]);
        self.refresh_type(new);
        Ok(())
    }

    fn insert_attribute_after(&mut self, anchor: &str, attributes: Vec<String>) {
        let at = self
            .attribute_order
            .iter()
            .position(|a| a == anchor)
            .map_or(self.attribute_order.len(), |i| i + 1);
        for attribute in &attributes {
            self.types.insert(attribute.clone(), AttributeType::Text);
        }
        let tail = self.attribute_order.split_off(at);
        self.attribute_order.extend(attributes);
        self.attribute_order.extend(tail);
    }

    /// One-hot encodes a categorical attribute into `attribute:value`
    /// columns of `1`/`0`, inserted right after `attribute`. Samples without
    /// a value get no value in the new columns. Returns the new columns.
    pub fn expand_attribute(&mut self, attribute: &str, allow_replace: bool) -> Result<Vec<String>> {
        if !self.contains_attribute(attribute) {
            return Err(Error::UnknownAttribute(attribute.to_string()));
        }
        let mut categories: Vec<String> = self
            .values
            .values()
            .filter_map(|row| row.get(attribute).cloned())
            .collect::<AHashSet<_>>()
            .into_iter()
            .collect();
        categories.sort_unstable();

        let columns: Vec<String> = categories
            .iter()
            .map(|value| format!("{attribute}:{value}"))
            .collect();
        if let Some(taken) = columns.iter().find(|c| self.contains_attribute(c)) {
            if !allow_replace {
                return Err(Error::DuplicateAttribute(taken.clone()));
            }
        }
        for column in &columns {
            self.remove_attribute(column);
        }

        for row in self.values.values_mut() {
            let Some(value) = row.get(attribute).cloned() else {
                continue;
            };
            for (category, column) in categories.iter().zip(&columns) {
                let flag = if *category == value { "1" } else { "0" };
                row.insert(column.clone(), flag.to_string());
            }
        }
        self.insert_attribute_after(attribute, columns.clone());
        for column in &columns {
            self.refresh_type(column);
        }
        Ok(columns)
    }

    /// Attributes with a numerical reading, per sample in sample order.
    ///
    /// Integer and float columns give their values, divided by the largest
    /// absolute value when `normalize` is set. Text columns with exactly two
    /// distinct values map the lexically smaller one to 0 and the other to 1.
    /// Absent values are 0. Secret and hidden attributes are skipped.
    pub fn numerical_attributes(&self, normalize: bool) -> Vec<(String, Vec<f64>)> {
        let mut result = Vec::new();
        for attribute in self.user_attributes() {
            let column: Vec<Option<&str>> = self
                .sample_order
                .iter()
                .map(|s| self.get(s, attribute))
                .collect();
            let values = match self.attribute_type(attribute).unwrap_or_default() {
                AttributeType::Integer | AttributeType::Float => {
                    let mut values: Vec<f64> = column
                        .iter()
                        .map(|v| v.and_then(|v| v.trim().parse().ok()).unwrap_or(0.0))
                        .collect();
                    let max = values.iter().fold(0.0f64, |m, v| m.max(v.abs()));
                    if normalize && max > 0.0 {
                        values.iter_mut().for_each(|v| *v /= max);
                    }
                    values
                }
                AttributeType::Text => {
                    let mut distinct: Vec<&str> = column.iter().flatten().copied().collect();
                    distinct.sort_unstable();
                    distinct.dedup();
                    let [_, high] = distinct.as_slice() else {
                        continue;
                    };
                    column
                        .iter()
                        .map(|v| if *v == Some(*high) { 1.0 } else { 0.0 })
                        .collect()
                }
                AttributeType::Date => continue,
            };
            result.push((attribute.to_string(), values));
        }
        result
    }

    // ---------------------------------------------------------------------
    //  Text format
    // ---------------------------------------------------------------------

    /// Reads a tab-separated metadata table. The first line names the
    /// attributes; each further line is one sample.
    ///
    /// Hidden columns are dropped, duplicate column names get a numeric
    /// suffix, and samples not in `known_samples` (when given) are skipped.
    /// Returns the number of samples read.
    pub fn read<R: BufRead>(
        &mut self,
        reader: R,
        known_samples: Option<&AHashSet<String>>,
        clear: bool,
    ) -> Result<usize> {
        if clear {
            self.clear();
        }
        let mut header: Option<Vec<Option<String>>> = None;
        let mut read = 0;
        let mut skipped = 0;
        let mut touched = AHashSet::new();

        for (i, line) in reader.lines().enumerate() {
            let line_number = i + 1;
            let line = line.map_err(|e| Error::read("sample attributes", e))?;
            if line.trim().is_empty() {
                continue;
            }
            let tokens = split_row(&line);

            let Some(columns) = &header else {
                header = Some(self.read_header(&tokens));
                continue;
            };
            if line.starts_with('#') {
                continue;
            }

            let sample = tokens[0].trim();
            if let Some(known) = known_samples {
                if !known.contains(sample) {
                    log::warn!("Line {line_number}: skipping unknown sample: {sample}");
                    skipped += 1;
                    continue;
                }
            }
            if tokens.len() > columns.len() + 1 {
                log::warn!("Line {line_number}: ignoring {} extra values", tokens.len() - columns.len() - 1);
            }
            self.register_sample(sample);
            let Some(row) = self.values.get_mut(sample) else {
                continue;
            };
            for (column, value) in columns.iter().zip(tokens.iter().skip(1)) {
                let Some(attribute) = column else {
                    continue;
                };
                if is_missing(value.trim()) {
                    row.remove(attribute);
                } else {
                    row.insert(attribute.clone(), value.trim().to_string());
                }
                touched.insert(attribute.clone());
            }
            read += 1;
        }

        if skipped > 0 {
            log::warn!("Skipped {skipped} samples not present in the document");
        }
        for attribute in &touched {
            self.refresh_type(attribute);
        }
        Ok(read)
    }

    /// Registers the attribute columns of a header row. Hidden columns map
    /// to `None`.
    fn read_header(&mut self, tokens: &[String]) -> Vec<Option<String>> {
        let mut seen = AHashSet::new();
        tokens
            .iter()
            .skip(1)
            .map(|name| {
                let name = name.trim();
                if is_hidden_attribute(name) {
                    return None;
                }
                let mut unique = name.to_string();
                let mut suffix = 1;
                while !seen.insert(unique.clone()) {
                    unique = format!("{name}-{suffix}");
                    suffix += 1;
                }
                if unique != name {
                    log::warn!("Duplicate attribute {name} renamed to {unique}");
                }
                self.register_attribute(&unique);
                Some(unique)
            })
            .collect()
    }

    pub fn write<W: Write>(&self, w: &mut W, options: AttributeWriteOptions) -> io::Result<()> {
        let fixed = [BARCODE_SEQUENCE, LINKER_PRIMER_SEQUENCE, DESCRIPTION];
        let mut columns: Vec<&str> = self
            .attribute_order
            .iter()
            .map(String::as_str)
            .filter(|a| options.include_secret || (!is_secret_attribute(a) && !is_hidden_attribute(a)))
            .filter(|a| !options.qiime || !fixed.contains(a))
            .collect();
        if options.qiime {
            columns.insert(0, LINKER_PRIMER_SEQUENCE);
            columns.insert(0, BARCODE_SEQUENCE);
            columns.push(DESCRIPTION);
        }

        write!(w, "{SAMPLE_ID}")?;
        for column in &columns {
            write!(w, "\t{}", quoted(column))?;
        }
        writeln!(w)?;
        for sample in &self.sample_order {
            write!(w, "{}", quoted(sample))?;
            for column in &columns {
                write!(w, "\t{}", quoted(self.get(sample, column).unwrap_or(MISSING)))?;
            }
            writeln!(w)?;
        }
        Ok(())
    }
}

impl fmt::Display for SampleAttributeTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Samples: {}, attributes: {}",
            self.sample_order.len(),
            self.attribute_order.len()
        )?;
        for attribute in &self.attribute_order {
            writeln!(
                f,
                "  {attribute}\t{}",
                self.attribute_type(attribute).unwrap_or_default()
            )?;
        }
        Ok(())
    }
}

fn reordered<S: AsRef<str>>(current: &[String], first: &[S]) -> Vec<String> {
    let listed: AHashSet<&str> = first.iter().map(|s| s.as_ref()).collect();
    let mut order: Vec<String> = Vec::with_capacity(current.len());
    for name in first {
        if !order.iter().any(|o| o == name.as_ref()) {
            order.push(name.as_ref().to_string());
        }
    }
    order.extend(current.iter().filter(|c| !listed.contains(c.as_str())).cloned());
    order
}

fn quoted(value: &str) -> std::borrow::Cow<'_, str> {
    if value.contains(['\t', '"']) {
        format!("\"{}\"", value.replace('"', "\"\"")).into()
    } else {
        value.into()
    }
}

/// Splits a tab-separated row. A field that starts with `"` runs to its
/// closing quote and may hold tabs; `""` inside it is a literal quote.
fn split_row(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut at_start = true;
    let mut chars = line.trim_end_matches(['\r', '\n']).chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' if at_start => in_quotes = true,
            '\t' if !in_quotes => {
                fields.push(std::mem::take(&mut field));
                at_start = true;
                continue;
            }
            _ => field.push(c),
        }
        at_start = false;
    }
    fields.push(field);
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    const METADATA: &str = "#SampleID\tSite\tDepth\tDate\tKind\tNote[hidden]\n\
        A\tlake\t10\t2020-05-01\tsoil\tx\n\
        B\triver\t2.5\t2021-01-15\twater\ty\n\
        C\tlake\tNA\t2019-12-31\tsoil\tz\n";

    fn table() -> SampleAttributeTable {
        let mut table = SampleAttributeTable::new();
        table.read(METADATA.as_bytes(), None, true).unwrap();
        table
    }

    #[test]
    fn test_read_and_types() {
        let table = table();
        assert_eq!(table.sample_order(), ["A", "B", "C"]);
        assert_eq!(table.attribute_order(), ["Site", "Depth", "Date", "Kind"]);
        assert_eq!(table.attribute_type("Depth"), Some(AttributeType::Float));
        assert_eq!(table.attribute_type("Date"), Some(AttributeType::Date));
        assert_eq!(table.attribute_type("Site"), Some(AttributeType::Text));
        assert_eq!(table.get("C", "Depth"), None);
        assert_eq!(
            table.typed_value("B", "Depth"),
            Some(AttributeValue::Float(2.5))
        );
    }

    #[test]
    fn test_read_known_samples_and_duplicate_headers() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let text = "#SampleID\tx\tx\nA\t1\t2\nZ\t3\t4\n";
        let known: AHashSet<String> = ["A".to_string()].into_iter().collect();
        let mut table = SampleAttributeTable::new();
        let read = table.read(text.as_bytes(), Some(&known), true)?;
        assert_eq!(read, 1);
        assert_eq!(table.attribute_order(), ["x", "x-1"]);
        assert_eq!(table.get("A", "x-1"), Some("2"));
        assert!(!table.contains_sample("Z"));
        assert_eq!(table.attribute_type("x"), Some(AttributeType::Integer));
        Ok(())
    }

    #[test]
    fn test_write_round_trip_with_quotes() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut table = table();
        table.put("A", "Comment", "has\ttab");
        table.put_secret("A", SecretAttribute::Color, "255 0 0");

        let mut buf = Vec::new();
        table.write(&mut buf, AttributeWriteOptions::default())?;
        let text = String::from_utf8(buf.clone())?;
        assert!(text.starts_with("#SampleID\tSite\tDepth\tDate\tKind\tComment\n"));
        assert!(text.contains("\"has\ttab\""));
        assert!(!text.contains("@Color"));
        assert!(text.contains("C\tlake\tNA\t"));

        let mut copy = SampleAttributeTable::new();
        copy.read(buf.as_slice(), None, true)?;
        assert_eq!(copy.get("A", "Comment"), Some("has\ttab"));
        assert_eq!(copy.get("C", "Depth"), None);

        let mut buf = Vec::new();
        table.write(
            &mut buf,
            AttributeWriteOptions {
                include_secret: true,
                qiime: false,
            },
        )?;
        let mut copy = SampleAttributeTable::new();
        copy.read(buf.as_slice(), None, true)?;
        assert_eq!(copy.secret("A", SecretAttribute::Color), Some("255 0 0"));
        Ok(())
    }

    #[test]
    fn test_write_round_trip_with_embedded_quote() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut table = SampleAttributeTable::new();
        table.put("A", "Size", "5\" core");
        table.put("A", "Site", "lake");
        table.put("B", "Size", "2\"");
        table.put("B", "Site", "say \"hi\"\tthere");

        let mut buf = Vec::new();
        table.write(&mut buf, AttributeWriteOptions::default())?;
        assert!(String::from_utf8(buf.clone())?.contains("\"5\"\" core\"\tlake"));

        let mut copy = SampleAttributeTable::new();
        copy.read(buf.as_slice(), None, true)?;
        assert_eq!(copy.get("A", "Size"), Some("5\" core"));
        assert_eq!(copy.get("A", "Site"), Some("lake"));
        assert_eq!(copy.get("B", "Size"), Some("2\""));
        assert_eq!(copy.get("B", "Site"), Some("say \"hi\"\tthere"));
        Ok(())
    }

    #[test]
    fn test_split_row_keeps_inner_quotes() {
        assert_eq!(split_row("a\t5\" core\tb\n"), vec!["a", "5\" core", "b"]);
        assert_eq!(split_row("\"x\"\"y\"\t\"\""), vec!["x\"y", ""]);
    }

    #[test]
    fn test_sort_samples_with_nan() {
        let mut table = SampleAttributeTable::new();
        for (i, value) in ["2.5", "NaN", "1.5", "NaN", "0.5"].iter().enumerate() {
            table.put(&format!("S{i}"), "Depth", *value);
        }
        table.sort_samples_by_attribute("Depth", true).unwrap();
        assert_eq!(table.sample_order(), ["S4", "S2", "S0", "S1", "S3"]);
    }

    #[test]
    fn test_qiime_layout() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut table = table();
        table.put("A", DESCRIPTION, "first");
        let mut buf = Vec::new();
        table.write(
            &mut buf,
            AttributeWriteOptions {
                include_secret: false,
                qiime: true,
            },
        )?;
        let text = String::from_utf8(buf)?;
        let header = text.lines().next().unwrap_or_default();
        assert_eq!(
            header,
            "#SampleID\tBarcodeSequence\tLinkerPrimerSequence\tSite\tDepth\tDate\tKind\tDescription"
        );
        assert!(text.lines().any(|l| l.starts_with("A\tNA\tNA\tlake") && l.ends_with("\tfirst")));
        Ok(())
    }

    #[test]
    fn test_rename_and_duplicate_sample() {
        let mut table = table();
        table.rename_sample("A", "A2", false).unwrap();
        assert_eq!(table.sample_order(), ["A2", "B", "C"]);
        assert!(matches!(
            table.rename_sample("A2", "B", false),
            Err(Error::DuplicateSample(_))
        ));
        table.rename_sample("A2", "B", true).unwrap();
        assert_eq!(table.sample_order(), ["B", "C"]);
        assert_eq!(table.get("B", "Site"), Some("lake"));

        table.duplicate_sample("C", "D", false).unwrap();
        assert_eq!(table.get("D", "Date"), Some("2019-12-31"));
        assert!(table.duplicate_sample("C", "D", false).is_err());
        assert!(matches!(
            table.duplicate_sample("nope", "E", true),
            Err(Error::UnknownSample(_))
        ));
    }

    #[test]
    fn test_add_sample_flags() {
        let mut table = table();
        assert!(!table.add_sample("A", &[("Site", "sea")], false, false));
        assert_eq!(table.get("A", "Site"), Some("lake"));
        assert!(table.add_sample("D", &[("Site", "sea"), ("New", "1")], false, false));
        assert_eq!(table.get("D", "Site"), Some("sea"));
        assert!(!table.contains_attribute("New"));
        assert!(table.add_sample("A", &[("New", "1")], true, true));
        assert_eq!(table.get("A", "Site"), None);
        assert_eq!(table.get("A", "New"), Some("1"));
    }

    #[test]
    fn test_add_remove_duplicate_attribute() {
        let mut table = table();
        assert!(!table.add_attribute("Site", &[("A", "x")], false, false));
        assert!(table.add_attribute("pH", &[("A", "7"), ("Z", "6")], false, false));
        assert!(!table.contains_sample("Z"));
        assert_eq!(table.attribute_type("pH"), Some(AttributeType::Integer));

        table.duplicate_attribute("Site", "Place", false).unwrap();
        assert_eq!(table.attribute_order()[..2], ["Site", "Place"]);
        assert_eq!(table.get("B", "Place"), Some("river"));
        assert!(matches!(
            table.duplicate_attribute("Site", "Place", false),
            Err(Error::DuplicateAttribute(_))
        ));

        assert!(table.remove_attribute("Place"));
        assert!(!table.remove_attribute("Place"));
        assert_eq!(table.get("B", "Place"), None);
    }

    #[test]
    fn test_expand_attribute() {
        let mut table = table();
        let columns = table.expand_attribute("Site", false).unwrap();
        assert_eq!(columns, ["Site:lake", "Site:river"]);
        assert_eq!(
            table.attribute_order(),
            ["Site", "Site:lake", "Site:river", "Depth", "Date", "Kind"]
        );
        assert_eq!(table.get("B", "Site:lake"), Some("0"));
        assert_eq!(table.get("B", "Site:river"), Some("1"));
        assert_eq!(table.attribute_type("Site:lake"), Some(AttributeType::Integer));
        assert!(table.expand_attribute("Site", false).is_err());
        assert!(table.expand_attribute("Site", true).is_ok());
        assert_eq!(table.number_of_attributes(), 6);
    }

    #[test]
    fn test_numerical_attributes() {
        let table = table();
        let numerical = table.numerical_attributes(true);
        let names: Vec<&str> = numerical.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["Site", "Depth", "Kind"]);
        assert_eq!(numerical[0].1, vec![0.0, 1.0, 0.0]);
        assert_eq!(numerical[1].1, vec![1.0, 0.25, 0.0]);
        assert_eq!(numerical[2].1, vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_sort_samples() {
        let mut table = table();
        table.sort_samples_by_attribute("Depth", true).unwrap();
        assert_eq!(table.sample_order(), ["B", "A", "C"]);
        table.sort_samples_by_attribute("Depth", false).unwrap();
        assert_eq!(table.sample_order(), ["A", "B", "C"]);
        table.sort_samples_by_attribute("Date", true).unwrap();
        assert_eq!(table.sample_order(), ["C", "A", "B"]);

        let before = table.sample_order().to_vec();
        assert!(table.sort_samples_by_attribute("missing", true).is_err());
        assert_eq!(table.sample_order(), before.as_slice());
    }

    #[test]
    fn test_orders() {
        let mut table = table();
        table.set_sample_order(&["C"]).unwrap();
        assert_eq!(table.sample_order(), ["C", "A", "B"]);
        assert!(table.set_sample_order(&["Q"]).is_err());
        table.set_attribute_order(&["Kind", "Site"]).unwrap();
        assert_eq!(table.attribute_order(), ["Kind", "Site", "Depth", "Date"]);
    }

    #[test]
    fn test_merge_extract_add_table() {
        let mut table = table();
        table.merge_samples(&["A", "C"], "AC").unwrap();
        assert_eq!(table.get("AC", "Site"), Some("lake"));
        assert_eq!(table.get("AC", "Kind"), Some("soil"));
        assert_eq!(table.get("AC", "Date"), None);
        assert!(table.merge_samples(&["A"], "AC").is_err());

        let part = table.extract(&["C", "A"]);
        assert_eq!(part.sample_order(), ["A", "C"]);
        assert_eq!(part.attribute_order(), table.attribute_order());

        let mut other = SampleAttributeTable::new();
        other.put("A", "Site", "sea");
        other.put("E", "Site", "pond");
        let mut merged = part.clone();
        merged.add_table(&other, false, true);
        assert_eq!(merged.get("A", "Site"), Some("lake"));
        assert_eq!(merged.get("E", "Site"), Some("pond"));
        let mut merged = part;
        merged.add_table(&other, true, false);
        assert_eq!(merged.get("A", "Site"), Some("sea"));
        assert!(!merged.contains_sample("E"));
    }

    #[test]
    fn test_remove_sample_refreshes_type() {
        let mut table = SampleAttributeTable::new();
        table.put("A", "v", "1");
        table.put("B", "v", "one");
        assert_eq!(table.attribute_type("v"), Some(AttributeType::Text));
        assert!(table.remove_sample("B"));
        assert_eq!(table.attribute_type("v"), Some(AttributeType::Integer));
        assert_eq!(table.user_attributes(), ["v"]);
    }
}
