//src/taxdb.rs

use std::io::{self, BufRead};

use ahash::{AHashMap, AHashSet};

/// The narrow view of a classification tree that the document model needs.
///
/// Nodes are addressed by their integer class id. A node may have more than
/// one parent in a damaged tree; consumers must check.
pub trait ClassificationTree {
    fn root(&self) -> Option<i32>;
    fn contains(&self, id: i32) -> bool;
    fn parents(&self, id: i32) -> Vec<i32>;
    fn children(&self, id: i32) -> Vec<i32>;
    /// Creates `id` as a new child of `parent`. Returns false if `parent` is
    /// missing or `id` already exists.
    fn add_child(&mut self, parent: i32, id: i32) -> bool;
    /// Removes `id` and all edges touching it. Returns false if missing.
    fn remove_node(&mut self, id: i32) -> bool;
    /// Adds an edge between two existing nodes.
    fn add_edge(&mut self, parent: i32, child: i32) -> bool;
}

/// Adjacency-list tree keyed by class id.
#[derive(Debug, Clone, Default)]
pub struct IdTree {
    root: Option<i32>,
    children: AHashMap<i32, Vec<i32>>,
    parents: AHashMap<i32, Vec<i32>>,
}

impl IdTree {
    pub fn new(root: i32) -> Self {
        let mut tree = Self::default();
        tree.root = Some(root);
        tree.children.insert(root, Vec::new());
        tree.parents.insert(root, Vec::new());
        tree
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Builds a tree from `child -> parent` pairs. A node that is its own
    /// parent (or whose parent is 0) is taken as the root.
    pub fn from_parent_map(parent_map: &AHashMap<i32, i32>) -> Self {
        let mut tree = Self::default();
        for (&child, &parent) in parent_map {
            tree.children.entry(child).or_default();
            tree.parents.entry(child).or_default();
            if parent == child || parent == 0 {
                tree.root = Some(child);
            }
        }
        for (&child, &parent) in parent_map {
            if parent != child && parent != 0 && tree.children.contains_key(&parent) {
                tree.add_edge(parent, child);
            }
        }
        for ids in tree.children.values_mut() {
            ids.sort_unstable();
        }
        tree
    }

    /// All ids in the subtree below `id`, including `id`.
    pub fn subtree(&self, id: i32) -> AHashSet<i32> {
        let mut seen = AHashSet::new();
        let mut stack = vec![id];
        while let Some(node) = stack.pop() {
            if seen.insert(node) {
                if let Some(kids) = self.children.get(&node) {
                    stack.extend(kids.iter().copied());
                }
            }
        }
        seen
    }
}

impl ClassificationTree for IdTree {
    fn root(&self) -> Option<i32> {
        self.root
    }

    fn contains(&self, id: i32) -> bool {
        self.children.contains_key(&id)
    }

    fn parents(&self, id: i32) -> Vec<i32> {
        self.parents.get(&id).cloned().unwrap_or_default()
    }

    fn children(&self, id: i32) -> Vec<i32> {
        self.children.get(&id).cloned().unwrap_or_default()
    }

    fn add_child(&mut self, parent: i32, id: i32) -> bool {
        if !self.contains(parent) || self.contains(id) {
            return false;
        }
        self.children.insert(id, Vec::new());
        self.parents.insert(id, Vec::new());
        self.add_edge(parent, id)
    }

    fn remove_node(&mut self, id: i32) -> bool {
        let Some(kids) = self.children.remove(&id) else {
            return false;
        };
        for kid in kids {
            if let Some(p) = self.parents.get_mut(&kid) {
                p.retain(|&x| x != id);
            }
        }
        for parent in self.parents.remove(&id).unwrap_or_default() {
            if let Some(c) = self.children.get_mut(&parent) {
                c.retain(|&x| x != id);
            }
        }
        if self.root == Some(id) {
            self.root = None;
        }
        true
    }

    fn add_edge(&mut self, parent: i32, child: i32) -> bool {
        if !self.contains(parent) || !self.contains(child) {
            return false;
        }
        let kids = self.children.entry(parent).or_default();
        if !kids.contains(&child) {
            kids.push(child);
            self.parents.entry(child).or_default().push(parent);
        }
        true
    }
}

/// Two-way mapping between class ids and names.
#[derive(Debug, Clone, Default)]
pub struct NameIdMap {
    id2name: AHashMap<i32, String>,
    name2id: AHashMap<String, i32>,
}

impl NameIdMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the name of `id`, replacing any previous name.
    pub fn put(&mut self, id: i32, name: impl Into<String>) {
        let name = name.into();
        if let Some(old) = self.id2name.insert(id, name.clone()) {
            if self.name2id.get(&old) == Some(&id) {
                self.name2id.remove(&old);
            }
        }
        self.name2id.insert(name, id);
    }

    pub fn remove(&mut self, id: i32) -> Option<String> {
        let name = self.id2name.remove(&id)?;
        if self.name2id.get(&name) == Some(&id) {
            self.name2id.remove(&name);
        }
        Some(name)
    }

    pub fn name(&self, id: i32) -> Option<&str> {
        self.id2name.get(&id).map(String::as_str)
    }

    pub fn id(&self, name: &str) -> Option<i32> {
        self.name2id.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.id2name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id2name.is_empty()
    }
}

/// Parses a taxDB stream in the format:
/// ```text
/// <taxid>\t<parentid>\t<taxname>\t<rank>
/// ```
/// Returns the tree, the id/name map and a `taxid -> rank` map.
/// Malformed lines are skipped.
pub fn parse_taxdb<R: BufRead>(
    reader: R,
) -> io::Result<(IdTree, NameIdMap, AHashMap<i32, String>)> {
    let mut parent_map = AHashMap::new();
    let mut names = NameIdMap::new();
    let mut ranks = AHashMap::new();

    for line_result in reader.lines() {
        let line = line_result?;
        let parts: Vec<&str> = line.split('\t').collect();
        if parts.len() < 4 {
            continue;
        }

        let (Ok(taxid), Ok(parentid)) = (parts[0].trim().parse::<i32>(), parts[1].trim().parse::<i32>())
        else {
            log::debug!("Skipping taxDB line: {line}");
            continue;
        };
        if taxid != 0 {
            parent_map.insert(taxid, parentid);
            names.put(taxid, parts[2].trim());
            ranks.insert(taxid, parts[3].trim().to_string());
        }
    }

    let tree = IdTree::from_parent_map(&parent_map);
    log::info!("Loaded taxonomy with {} nodes", tree.len());
    Ok((tree, names, ranks))
}
