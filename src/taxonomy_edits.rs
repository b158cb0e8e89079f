//src/taxonomy_edits.rs

use std::fmt;
use std::str::FromStr;

use crate::error::Error;
use crate::taxdb::{ClassificationTree, NameIdMap};

/// One structural change to a classification tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Edit {
    Append { parent: i32, id: i32, name: String },
    Delete { id: i32 },
    Rename { id: i32, name: String },
}

/// Names are written between tabs, so tabs and newlines become spaces.
fn clean_name(name: &str) -> String {
    name.replace(['\t', '\n', '\r'], " ")
}

impl fmt::Display for Edit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Edit::Append { parent, id, name } => {
                write!(f, "append\t{parent}\t{id}\t{}", clean_name(name))
            }
            Edit::Delete { id } => write!(f, "delete\t{id}"),
            Edit::Rename { id, name } => write!(f, "rename\t{id}\t{}", clean_name(name)),
        }
    }
}

impl FromStr for Edit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = s.split('\t').collect();
        let id_at = |i: usize| -> Result<i32, Error> {
            fields
                .get(i)
                .ok_or_else(|| Error::InvalidEdit(format!("missing field {i}: {s}")))?
                .trim()
                .parse::<i32>()
                .map_err(|e| Error::InvalidEdit(format!("{e}: {s}")))
        };

        match (fields[0], fields.len()) {
            ("append", 4) => Ok(Edit::Append {
                parent: id_at(1)?,
                id: id_at(2)?,
                name: fields[3].to_string(),
            }),
            ("delete", 2) => Ok(Edit::Delete { id: id_at(1)? }),
            ("rename", 3) => Ok(Edit::Rename {
                id: id_at(1)?,
                name: fields[2].to_string(),
            }),
            _ => Err(Error::InvalidEdit(s.to_string())),
        }
    }
}

/// Outcome of replaying a journal against a tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub applied: usize,
    pub skipped: usize,
}

/// Ordered, append-only log of taxonomy edits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaxonomyEditJournal {
    edits: Vec<Edit>,
}

impl TaxonomyEditJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, edit: Edit) {
        self.edits.push(edit);
    }

    pub fn append(&mut self, parent: i32, id: i32, name: impl Into<String>) {
        self.push(Edit::Append {
            parent,
            id,
            name: name.into(),
        });
    }

    pub fn delete(&mut self, id: i32) {
        self.push(Edit::Delete { id });
    }

    pub fn rename(&mut self, id: i32, name: impl Into<String>) {
        self.push(Edit::Rename {
            id,
            name: name.into(),
        });
    }

    pub fn edits(&self) -> &[Edit] {
        &self.edits
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn clear(&mut self) {
        self.edits.clear();
    }

    /// Replays the journal in order against `tree`. Edits that do not fit
    /// the tree (unknown parent, duplicate id, node with several parents)
    /// are logged and skipped. Renames do not touch the tree.
    pub fn apply_to_tree<T: ClassificationTree>(&self, tree: &mut T) -> ApplyReport {
        let mut report = ApplyReport::default();
        for edit in &self.edits {
            let ok = match edit {
                Edit::Append { parent, id, .. } => {
                    if !tree.contains(*parent) {
                        log::warn!("Append: no such parent node: {parent}");
                        false
                    } else if tree.contains(*id) {
                        log::warn!("Append: node already exists: {id}");
                        false
                    } else {
                        tree.add_child(*parent, *id)
                    }
                }
                Edit::Delete { id } => delete_and_splice(tree, *id),
                Edit::Rename { .. } => true,
            };
            if ok {
                report.applied += 1;
            } else {
                report.skipped += 1;
            }
        }
        report
    }

    /// Replays appends and renames against an id/name map.
    pub fn apply_to_names(&self, names: &mut NameIdMap) {
        for edit in &self.edits {
            match edit {
                Edit::Append { id, name, .. } | Edit::Rename { id, name } => {
                    names.put(*id, name.as_str())
                }
                Edit::Delete { .. } => {}
            }
        }
    }
}

/// Removes `id`, attaching its children directly to its single parent.
fn delete_and_splice<T: ClassificationTree>(tree: &mut T, id: i32) -> bool {
    if !tree.contains(id) {
        log::warn!("Delete: no such node: {id}");
        return false;
    }
    let parents = tree.parents(id);
    let &[parent] = parents.as_slice() else {
        log::warn!("Delete: node {id} has {} parents, skipped", parents.len());
        return false;
    };
    let children = tree.children(id);
    tree.remove_node(id);
    for child in children {
        tree.add_edge(parent, child);
    }
    true
}

impl fmt::Display for TaxonomyEditJournal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for edit in &self.edits {
            writeln!(f, "{edit}")?;
        }
        Ok(())
    }
}

impl FromStr for TaxonomyEditJournal {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let edits = s
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| {
                line.parse::<Edit>().map_err(|e| Error::Parse {
                    line: i + 1,
                    message: e.to_string(),
                })
            })
            .collect::<Result<Vec<Edit>, _>>()?;
        Ok(Self { edits })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxdb::IdTree;

    fn tree() -> IdTree {
        let mut tree = IdTree::new(1);
        tree.add_child(1, 2);
        tree.add_child(2, 10);
        tree.add_child(10, 11);
        tree.add_child(10, 12);
        tree
    }

    #[test]
    fn test_apply_append_and_delete() {
        let mut journal = TaxonomyEditJournal::new();
        journal.append(2, 100, "New genus");
        journal.delete(10);
        journal.rename(2, "Eubacteria");

        let mut tree = tree();
        let report = journal.apply_to_tree(&mut tree);
        assert_eq!(report, ApplyReport { applied: 3, skipped: 0 });

        assert!(!tree.contains(10));
        let mut kids = tree.children(2);
        kids.sort();
        assert_eq!(kids, vec![11, 12, 100]);
        assert_eq!(tree.parents(11), vec![2]);
    }

    #[test]
    fn test_apply_skips_bad_edits() {
        let mut journal = TaxonomyEditJournal::new();
        journal.append(999, 100, "orphan");
        journal.append(1, 2, "duplicate");
        journal.delete(4242);

        let mut tree = tree();
        tree.add_edge(1, 11);
        journal.delete(11);

        let report = journal.apply_to_tree(&mut tree);
        assert_eq!(report, ApplyReport { applied: 0, skipped: 4 });
        assert!(tree.contains(11));
    }

    #[test]
    fn test_reapply_is_safe() {
        let mut journal = TaxonomyEditJournal::new();
        journal.append(2, 100, "x");
        journal.delete(10);
        let mut tree = tree();
        journal.apply_to_tree(&mut tree);
        let again = journal.apply_to_tree(&mut tree);
        assert_eq!(again.skipped, 2);
        assert_eq!(tree.len(), 5);
    }

    #[test]
    fn test_apply_to_names() {
        let mut journal = TaxonomyEditJournal::new();
        journal.append(2, 100, "New genus");
        journal.rename(2, "Eubacteria");
        let mut names = NameIdMap::new();
        names.put(2, "Bacteria");
        journal.apply_to_names(&mut names);
        assert_eq!(names.name(100), Some("New genus"));
        assert_eq!(names.id("Eubacteria"), Some(2));
        assert_eq!(names.id("Bacteria"), None);
    }

    #[test]
    fn test_text_round_trip() -> Result<(), Box<dyn std::error::Error>> {
        let mut journal = TaxonomyEditJournal::new();
        journal.append(2, 100, "New genus sp. 1");
        journal.delete(10);
        journal.rename(-5, "odd\tname");

        let text = journal.to_string();
        let parsed: TaxonomyEditJournal = text.parse()?;
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed.edits()[0], journal.edits()[0]);
        assert_eq!(parsed.edits()[1], journal.edits()[1]);
        assert_eq!(
            parsed.edits()[2],
            Edit::Rename { id: -5, name: "odd name".into() }
        );
        assert_eq!(parsed.to_string(), text);
        Ok(())
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("move\t1\t2".parse::<Edit>().is_err());
        assert!("delete\tx".parse::<Edit>().is_err());
        assert!(matches!(
            "delete\t5\n\nrename\t7".parse::<TaxonomyEditJournal>(),
            Err(Error::Parse { line: 3, .. })
        ));
    }
}
