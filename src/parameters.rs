//src/parameters.rs

use std::fmt;
use std::str::FromStr;

use crate::types::ReadAssignmentMode;

pub const MIN_SCORE: &str = "minScore";
pub const MAX_EXPECTED: &str = "maxExpected";
pub const TOP_PERCENT: &str = "topPercent";
pub const MIN_SUPPORT: &str = "minSupport";
pub const MIN_SUPPORT_PERCENT: &str = "minSupportPercent";
pub const LCA_ALGORITHM: &str = "lcaAlgorithm";
pub const READ_ASSIGNMENT_MODE: &str = "readAssignmentMode";

/// The free-form analysis parameter string of a document, e.g.
/// `minScore=50.0 topPercent=10.0 readAssignmentMode=readCount`.
///
/// Tokens keep their order; words without `=` are kept as flags so that
/// formatting reproduces what was read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameters {
    entries: Vec<(String, Option<String>)>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .and_then(|(_, v)| v.as_deref())
    }

    pub fn has_flag(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key)?.parse().ok()
    }

    /// Sets `key`, keeping its position if it is already present.
    pub fn set(&mut self, key: &str, value: impl ToString) {
        let value = Some(value.to_string());
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key.to_string(), value)),
        }
    }

    pub fn remove(&mut self, key: &str) {
        self.entries.retain(|(k, _)| k != key);
    }

    /// The read assignment mode recorded in the parameters, if any.
    pub fn read_assignment_mode(&self) -> Option<ReadAssignmentMode> {
        let value = self.get(READ_ASSIGNMENT_MODE)?;
        match value.parse() {
            Ok(mode) => Some(mode),
            Err(err) => {
                log::warn!("{err}");
                None
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromStr for Parameters {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let entries = s
            .split_whitespace()
            .map(|token| match token.split_once('=') {
                Some((k, v)) => (k.to_string(), Some(v.to_string())),
                None => (token.to_string(), None),
            })
            .collect();
        Ok(Self { entries })
    }
}

impl fmt::Display for Parameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (k, v)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            match v {
                Some(v) => write!(f, "{k}={v}")?,
                None => f.write_str(k)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_format() {
        let text = "minScore=50.0 maxExpected=0.01 longReads readAssignmentMode=alignedBases";
        let params: Parameters = text.parse().unwrap();
        assert_eq!(params.get_f64(MIN_SCORE), Some(50.0));
        assert!(params.has_flag("longReads"));
        assert_eq!(
            params.read_assignment_mode(),
            Some(ReadAssignmentMode::AlignedBases)
        );
        assert_eq!(params.to_string(), text);
    }

    #[test]
    fn test_set_keeps_position() {
        let mut params: Parameters = "a=1 b=2".parse().unwrap();
        params.set("a", 3);
        params.set(TOP_PERCENT, 10.0);
        assert_eq!(params.to_string(), "a=3 b=2 topPercent=10");
        params.remove("b");
        assert_eq!(params.to_string(), "a=3 topPercent=10");
    }

    #[test]
    fn test_missing_or_bad_mode() {
        let params: Parameters = "readAssignmentMode=bogus".parse().unwrap();
        assert_eq!(params.read_assignment_mode(), None);
        assert_eq!(Parameters::new().read_assignment_mode(), None);
    }
}
