//src/read_assignment.rs

use rust_lapper::{Interval, Lapper};

use crate::types::{ReadAssignmentMode, ReadBlock};

/// Interval type used to accumulate aligned query spans.
pub type Span = Interval<u32, ()>;

/// Header annotations that carry a read's magnitude, e.g. `read7 weight=12`.
const MAGNITUDE_TAGS: [&str; 2] = ["magnitude=", "weight="];

/// Extracts the abundance annotation from a read header.
///
/// Two syntaxes are understood: a `magnitude=<n>` or `weight=<n>` token
/// anywhere in the header, and (only when enabled) an older form in which the
/// first word of the header ends in `_<n>`, as in `read7_12`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MagnitudeParser {
    underscore_syntax: bool,
}

impl MagnitudeParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_underscore_syntax(mut self, enabled: bool) -> Self {
        self.underscore_syntax = enabled;
        self
    }

    pub fn underscore_syntax(&self) -> bool {
        self.underscore_syntax
    }

    /// Returns the annotated magnitude, or `None` if the header carries none.
    pub fn parse(&self, header: &str) -> Option<u32> {
        for tag in MAGNITUDE_TAGS {
            if let Some(pos) = header.find(tag) {
                if let Some(value) = leading_number(&header[pos + tag.len()..]) {
                    return Some(value);
                }
            }
        }

        if self.underscore_syntax {
            let first_word = header
                .trim_start_matches(['>', '@'])
                .split_whitespace()
                .next()?;
            let pos = first_word.rfind('_')?;
            return first_word[pos + 1..].parse().ok();
        }
        None
    }
}

/// Parses the run of ASCII digits at the start of `s`.
fn leading_number(s: &str) -> Option<u32> {
    let end = s
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    s[..end].parse().ok()
}

/// Computes how much a single read contributes to its assigned class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadAssignmentCalculator {
    mode: ReadAssignmentMode,
    magnitudes: MagnitudeParser,
}

impl ReadAssignmentCalculator {
    pub fn new(mode: ReadAssignmentMode) -> Self {
        Self {
            mode,
            magnitudes: MagnitudeParser::default(),
        }
    }

    pub fn with_magnitude_parser(mut self, parser: MagnitudeParser) -> Self {
        self.magnitudes = parser;
        self
    }

    pub fn mode(&self) -> ReadAssignmentMode {
        self.mode
    }

    /// Weight of `read` under the configured policy.
    ///
    /// `scratch` is only used by [`ReadAssignmentMode::AlignedBases`]; it lets
    /// callers reuse one allocation across many reads and is left empty.
    pub fn compute(&self, read: &ReadBlock, scratch: &mut Vec<Span>) -> u32 {
        match self.mode {
            ReadAssignmentMode::ReadCount => 1,
            ReadAssignmentMode::ReadLength => read.length.max(1),
            ReadAssignmentMode::AlignedBases => aligned_bases(read, scratch),
            ReadAssignmentMode::ReadMagnitude => self
                .magnitudes
                .parse(&read.header)
                .unwrap_or(1)
                .max(1),
        }
    }
}

/// Number of distinct query positions covered by the read's active matches.
fn aligned_bases(read: &ReadBlock, scratch: &mut Vec<Span>) -> u32 {
    scratch.clear();
    scratch.extend(read.active_matches().filter_map(|m| {
        let (start, stop) = m.query_span();
        (stop > start).then_some(Interval { start, stop, val: () })
    }));
    if scratch.is_empty() {
        return 0;
    }

    let lapper = Lapper::new(std::mem::take(scratch));
    let covered = lapper.cov();
    *scratch = lapper.intervals;
    scratch.clear();
    covered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MatchBlock;

    fn read_with(header: &str, length: u32, spans: &[(u32, u32)]) -> ReadBlock {
        ReadBlock {
            name: "r1".into(),
            header: header.into(),
            length,
            matches: spans
                .iter()
                .map(|&(s, e)| MatchBlock::new(2, s, e))
                .collect(),
        }
    }

    #[test]
    fn test_read_count_is_one() {
        let calc = ReadAssignmentCalculator::new(ReadAssignmentMode::ReadCount);
        let read = read_with("r1", 150, &[(0, 100)]);
        assert_eq!(calc.compute(&read, &mut Vec::new()), 1);
    }

    #[test]
    fn test_read_length_has_floor_of_one() {
        let calc = ReadAssignmentCalculator::new(ReadAssignmentMode::ReadLength);
        assert_eq!(calc.compute(&read_with("r1", 150, &[]), &mut Vec::new()), 150);
        assert_eq!(calc.compute(&read_with("r1", 0, &[]), &mut Vec::new()), 1);
    }

    #[test]
    fn test_aligned_bases_does_not_double_count_overlaps() {
        let calc = ReadAssignmentCalculator::new(ReadAssignmentMode::AlignedBases);
        let read = read_with("r1", 100, &[(0, 10), (5, 15)]);
        let mut scratch = Vec::new();
        assert_eq!(calc.compute(&read, &mut scratch), 15);
        assert!(scratch.is_empty());
    }

    #[test]
    fn test_aligned_bases_handles_reverse_and_ignored_matches() {
        let calc = ReadAssignmentCalculator::new(ReadAssignmentMode::AlignedBases);
        let mut read = read_with("r1", 100, &[(30, 20), (50, 60)]);
        assert_eq!(calc.compute(&read, &mut Vec::new()), 20);
        read.matches[1].ignored = true;
        assert_eq!(calc.compute(&read, &mut Vec::new()), 10);
    }

    #[test]
    fn test_magnitude_from_header() {
        let calc = ReadAssignmentCalculator::new(ReadAssignmentMode::ReadMagnitude);
        let read = read_with("r1 weight=42 sample=x", 100, &[]);
        assert_eq!(calc.compute(&read, &mut Vec::new()), 42);
        let read = read_with("r1 magnitude=7", 100, &[]);
        assert_eq!(calc.compute(&read, &mut Vec::new()), 7);
        let read = read_with("r1", 100, &[]);
        assert_eq!(calc.compute(&read, &mut Vec::new()), 1);
    }

    #[test]
    fn test_underscore_magnitude_is_gated() {
        let read = read_with(">read7_12 some text", 100, &[]);
        let plain = ReadAssignmentCalculator::new(ReadAssignmentMode::ReadMagnitude);
        assert_eq!(plain.compute(&read, &mut Vec::new()), 1);

        let legacy = plain.with_magnitude_parser(MagnitudeParser::new().with_underscore_syntax(true));
        assert_eq!(legacy.compute(&read, &mut Vec::new()), 12);
    }
}
