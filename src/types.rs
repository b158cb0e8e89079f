//src/types.rs

use std::fmt;
use std::str::FromStr;

/// Reads without any alignment.
pub const NOHITS_ID: i32 = -1;

/// Name of the taxonomy classification.
pub const TAXONOMY: &str = "Taxonomy";

/// Short tag used for the taxonomy in data rows.
const TAXONOMY_SHORT: &str = "TAX";

/// Maps a classification name to the tag written at the start of a data row.
/// Only the taxonomy has a short tag, everything else is written as is.
pub fn short_classification_name(name: &str) -> &str {
    if name == TAXONOMY {
        TAXONOMY_SHORT
    } else {
        name
    }
}

/// Inverse of [`short_classification_name`].
pub fn full_classification_name(short: &str) -> &str {
    if short.eq_ignore_ascii_case(TAXONOMY_SHORT) {
        TAXONOMY
    } else {
        short
    }
}

/// The alignment mode a sample was computed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlastMode {
    #[default]
    Unknown,
    BlastN,
    BlastX,
    BlastP,
    Classifier,
}

impl BlastMode {
    pub const ALL: [BlastMode; 5] = [
        BlastMode::Unknown,
        BlastMode::BlastN,
        BlastMode::BlastX,
        BlastMode::BlastP,
        BlastMode::Classifier,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BlastMode::Unknown => "Unknown",
            BlastMode::BlastN => "BlastN",
            BlastMode::BlastX => "BlastX",
            BlastMode::BlastP => "BlastP",
            BlastMode::Classifier => "Classifier",
        }
    }

    /// Case-insensitive lookup; anything unrecognised is `Unknown`.
    pub fn parse_lenient(s: &str) -> Self {
        Self::ALL
            .iter()
            .copied()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .unwrap_or(BlastMode::Unknown)
    }
}

impl fmt::Display for BlastMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a read contributes to the count of the class it is assigned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ReadAssignmentMode {
    #[default]
    ReadCount,
    ReadLength,
    AlignedBases,
    ReadMagnitude,
}

impl ReadAssignmentMode {
    pub const ALL: [ReadAssignmentMode; 4] = [
        ReadAssignmentMode::ReadCount,
        ReadAssignmentMode::ReadLength,
        ReadAssignmentMode::AlignedBases,
        ReadAssignmentMode::ReadMagnitude,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReadAssignmentMode::ReadCount => "readCount",
            ReadAssignmentMode::ReadLength => "readLength",
            ReadAssignmentMode::AlignedBases => "alignedBases",
            ReadAssignmentMode::ReadMagnitude => "readMagnitude",
        }
    }
}

impl fmt::Display for ReadAssignmentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReadAssignmentMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown read assignment mode: {s}"))
    }
}

/// One alignment of a read.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchBlock {
    pub taxon_id: i32,
    /// Aligned query span; `start > end` for reverse-strand matches.
    pub query_start: u32,
    pub query_end: u32,
    /// Matches filtered out by the current analysis parameters.
    pub ignored: bool,
}

impl MatchBlock {
    pub fn new(taxon_id: i32, query_start: u32, query_end: u32) -> Self {
        Self {
            taxon_id,
            query_start,
            query_end,
            ignored: false,
        }
    }

    /// The aligned span as a half-open `(start, end)` pair in forward orientation.
    pub fn query_span(&self) -> (u32, u32) {
        if self.query_start <= self.query_end {
            (self.query_start, self.query_end)
        } else {
            (self.query_end, self.query_start)
        }
    }
}

/// A minimal representation of a read and its alignments.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReadBlock {
    pub name: String,
    pub header: String,
    pub length: u32,
    pub matches: Vec<MatchBlock>,
}

impl ReadBlock {
    /// Matches that are not ignored.
    pub fn active_matches(&self) -> impl Iterator<Item = &MatchBlock> {
        self.matches.iter().filter(|m| !m.ignored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_names() {
        assert_eq!(short_classification_name("Taxonomy"), "TAX");
        assert_eq!(short_classification_name("SEED"), "SEED");
        assert_eq!(full_classification_name("TAX"), "Taxonomy");
        assert_eq!(full_classification_name("tax"), "Taxonomy");
        assert_eq!(full_classification_name("KEGG"), "KEGG");
    }

    #[test]
    fn test_blast_mode_lenient() {
        assert_eq!(BlastMode::parse_lenient("blastx"), BlastMode::BlastX);
        assert_eq!(BlastMode::parse_lenient("nonsense"), BlastMode::Unknown);
    }

    #[test]
    fn test_assignment_mode_from_str() {
        assert_eq!(
            "alignedbases".parse::<ReadAssignmentMode>(),
            Ok(ReadAssignmentMode::AlignedBases)
        );
        assert!("bogus".parse::<ReadAssignmentMode>().is_err());
    }

    #[test]
    fn test_reverse_span() {
        let m = MatchBlock::new(5, 20, 10);
        assert_eq!(m.query_span(), (10, 20));
    }
}
