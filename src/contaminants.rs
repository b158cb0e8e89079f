//src/contaminants.rs

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use ahash::AHashSet;

use crate::error::{Error, Result};
use crate::taxdb::{ClassificationTree, NameIdMap};
use crate::types::ReadBlock;

/// A set of contaminant taxa together with all of their descendants.
#[derive(Debug, Clone, Default)]
pub struct ContaminantManager {
    seeds: BTreeSet<i32>,
    closure: AHashSet<i32>,
}

impl ContaminantManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads contaminant taxa from a line-oriented stream. Each line is either
    /// a single taxon name, or a whitespace-separated list of taxon ids and
    /// names. Unresolvable words are logged and skipped.
    pub fn read<R: BufRead, T: ClassificationTree>(
        &mut self,
        reader: R,
        names: &NameIdMap,
        tree: &T,
    ) -> Result<()> {
        self.seeds.clear();
        for line in reader.lines() {
            let line = line.map_err(|e| Error::read("contaminants", e))?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some(id) = names.id(line) {
                self.seeds.insert(id);
                continue;
            }
            for word in line.split(|c: char| c.is_whitespace() || c == ',' || c == ';') {
                if word.is_empty() {
                    continue;
                }
                match word.parse::<i32>().ok().or_else(|| names.id(word)) {
                    Some(id) => {
                        self.seeds.insert(id);
                    }
                    None => log::warn!("Unknown contaminant taxon: {word}"),
                }
            }
        }
        self.compute_closure(tree);
        Ok(())
    }

    pub fn read_file<P: AsRef<Path>, T: ClassificationTree>(
        &mut self,
        path: P,
        names: &NameIdMap,
        tree: &T,
    ) -> Result<()> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| Error::read(path.display().to_string(), e))?;
        self.read(BufReader::new(file), names, tree)
    }

    /// Replaces the seed set by the numeric ids in a whitespace-separated
    /// string, as stored in a document's contaminants field.
    pub fn parse_taxon_ids<T: ClassificationTree>(&mut self, ids: &str, tree: &T) {
        self.seeds = ids
            .split_whitespace()
            .filter_map(|word| match word.parse::<i32>() {
                Ok(id) => Some(id),
                Err(_) => {
                    log::warn!("Skipping non-numeric contaminant id: {word}");
                    None
                }
            })
            .collect();
        self.compute_closure(tree);
    }

    /// The seed ids, space separated and ascending.
    pub fn taxon_ids_string(&self) -> String {
        self.seeds
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn seeds(&self) -> &BTreeSet<i32> {
        &self.seeds
    }

    /// Recomputes seeds-plus-descendants with one traversal from the root:
    /// a node is in the closure if it or any ancestor is a seed.
    pub fn compute_closure<T: ClassificationTree>(&mut self, tree: &T) {
        self.closure.clear();
        let Some(root) = tree.root() else {
            self.closure.extend(self.seeds.iter().copied());
            return;
        };

        let mut visited = AHashSet::new();
        let mut stack = vec![(root, false)];
        while let Some((node, parent_in_closure)) = stack.pop() {
            let in_closure = parent_in_closure || self.seeds.contains(&node);
            if in_closure {
                self.closure.insert(node);
            }
            // A node reached by several parents is expanded again once it
            // is known to be inside the closure.
            if !visited.insert((node, in_closure)) {
                continue;
            }
            for child in tree.children(node) {
                stack.push((child, in_closure));
            }
        }
        // seeds missing from the tree still count
        self.closure.extend(self.seeds.iter().copied());
    }

    pub fn contains(&self, taxon: i32) -> bool {
        self.closure.contains(&taxon)
    }

    /// A short read is a contaminant if any active match hits the closure.
    pub fn is_contaminant_short_read(&self, read: &ReadBlock) -> bool {
        read.active_matches().any(|m| self.closure.contains(&m.taxon_id))
    }

    /// A long read is judged by its single assigned taxon.
    pub fn is_contaminant_long_read(&self, assigned_taxon: i32) -> bool {
        self.closure.contains(&assigned_taxon)
    }

    pub fn len(&self) -> usize {
        self.closure.len()
    }

    pub fn is_empty(&self) -> bool {
        self.closure.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxdb::parse_taxdb;
    use crate::types::MatchBlock;

    const TAXDB: &str = "1\t1\troot\tno rank\n\
                         2\t1\tBacteria\tsuperkingdom\n\
                         20\t2\tA\tphylum\n\
                         21\t2\tB\tphylum\n\
                         22\t21\tC\tclass\n\
                         3\t1\tArchaea\tsuperkingdom\n\
                         30\t3\tD\tphylum\n";

    #[test]
    fn test_closure_contains_seed_and_descendants_only() {
        let (tree, _, _) = parse_taxdb(TAXDB.as_bytes()).unwrap();
        let mut cm = ContaminantManager::new();
        cm.parse_taxon_ids("2", &tree);
        for id in [2, 20, 21, 22] {
            assert!(cm.contains(id), "missing {id}");
        }
        for id in [1, 3, 30] {
            assert!(!cm.contains(id), "unexpected {id}");
        }
        assert_eq!(cm.len(), 4);
    }

    #[test]
    fn test_read_names_and_ids() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let (tree, names, _) = parse_taxdb(TAXDB.as_bytes())?;
        let mut cm = ContaminantManager::new();
        cm.read("# header\nArchaea\n22 A nonsense\n".as_bytes(), &names, &tree)?;
        assert_eq!(cm.taxon_ids_string(), "3 20 22");
        assert!(cm.contains(30));
        assert!(!cm.contains(21));
        Ok(())
    }

    #[test]
    fn test_short_and_long_reads() {
        let (tree, _, _) = parse_taxdb(TAXDB.as_bytes()).unwrap();
        let mut cm = ContaminantManager::new();
        cm.parse_taxon_ids("21", &tree);

        let mut read = ReadBlock {
            name: "r".into(),
            header: "r".into(),
            length: 100,
            matches: vec![MatchBlock::new(30, 0, 50), MatchBlock::new(22, 0, 50)],
        };
        assert!(cm.is_contaminant_short_read(&read));
        read.matches[1].ignored = true;
        assert!(!cm.is_contaminant_short_read(&read));

        assert!(cm.is_contaminant_long_read(22));
        assert!(!cm.is_contaminant_long_read(20));
    }
}
