//src/connector.rs

use std::io;

use ahash::AHashMap;
use rayon::prelude::*;

use crate::read_assignment::{ReadAssignmentCalculator, Span};
use crate::types::ReadBlock;

/// Raw and weighted read totals of one class.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ClassCount {
    /// Number of reads assigned to the class.
    pub sum: u64,
    /// Sum of the per-read weights of those reads.
    pub weighted_sum: f64,
}

/// Per-class totals of one classification as reported by an archive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassificationBlock {
    name: String,
    counts: AHashMap<i32, ClassCount>,
}

impl ClassificationBlock {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            counts: AHashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adds to the totals of `class_id`.
    pub fn add(&mut self, class_id: i32, sum: u64, weighted_sum: f64) {
        let count = self.counts.entry(class_id).or_default();
        count.sum += sum;
        count.weighted_sum += weighted_sum;
    }

    pub fn sum(&self, class_id: i32) -> u64 {
        self.counts.get(&class_id).map_or(0, |c| c.sum)
    }

    pub fn weighted_sum(&self, class_id: i32) -> f64 {
        self.counts.get(&class_id).map_or(0.0, |c| c.weighted_sum)
    }

    /// Class ids, ascending.
    pub fn class_ids(&self) -> Vec<i32> {
        let mut ids: Vec<i32> = self.counts.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn iter(&self) -> impl Iterator<Item = (i32, &ClassCount)> {
        self.counts.iter().map(|(id, count)| (*id, count))
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

/// Read access to an analysed archive, plus its auxiliary blobs.
///
/// Failures are plain I/O errors; callers wrap them with context.
pub trait Connector {
    fn uid(&self) -> io::Result<i64>;
    fn number_of_reads(&self) -> io::Result<u64>;
    fn all_classification_names(&self) -> io::Result<Vec<String>>;
    fn classification_block(&self, name: &str) -> io::Result<ClassificationBlock>;
    fn auxiliary_data(&self) -> io::Result<AHashMap<String, Vec<u8>>>;
    fn put_auxiliary_data(&mut self, data: AHashMap<String, Vec<u8>>) -> io::Result<()>;
}

/// A read together with the class it was assigned to in each
/// classification.
#[derive(Debug, Clone, Default)]
pub struct AssignedRead {
    pub read: ReadBlock,
    pub classes: Vec<(String, i32)>,
}

/// Thread-local partial totals: classification -> class id -> (reads, weight).
type PartialTotals = AHashMap<String, AHashMap<i32, (u64, u64)>>;

fn merge_partial_totals(mut a: PartialTotals, b: PartialTotals) -> PartialTotals {
    for (name, classes) in b {
        let target = a.entry(name).or_default();
        for (id, (reads, weight)) in classes {
            let t = target.entry(id).or_default();
            t.0 += reads;
            t.1 += weight;
        }
    }
    a
}

/// Connector over data held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    uid: i64,
    number_of_reads: u64,
    blocks: Vec<ClassificationBlock>,
    auxiliary: AHashMap<String, Vec<u8>>,
}

impl MemoryConnector {
    pub fn new(uid: i64) -> Self {
        Self {
            uid,
            ..Default::default()
        }
    }

    /// Aggregates assigned reads into classification blocks, weighting each
    /// read with `calculator`.
    ///
    /// Weights are summed as integers, so the totals do not depend on how
    /// rayon splits the work.
    pub fn from_reads(uid: i64, reads: &[AssignedRead], calculator: &ReadAssignmentCalculator) -> Self {
        let totals = reads
            .par_iter()
            .fold(
                || (PartialTotals::default(), Vec::<Span>::new()),
                |(mut acc, mut scratch), assigned| {
                    let weight = calculator.compute(&assigned.read, &mut scratch) as u64;
                    for (classification, class_id) in &assigned.classes {
                        let t = acc
                            .entry(classification.clone())
                            .or_default()
                            .entry(*class_id)
                            .or_default();
                        t.0 += 1;
                        t.1 += weight;
                    }
                    (acc, scratch)
                },
            )
            .map(|(acc, _)| acc)
            .reduce(PartialTotals::default, merge_partial_totals);

        let mut names: Vec<&String> = totals.keys().collect();
        names.sort_unstable();
        let blocks = names
            .into_iter()
            .map(|name| {
                let mut block = ClassificationBlock::new(name.as_str());
                for (&id, &(reads, weight)) in &totals[name] {
                    block.add(id, reads, weight as f64);
                }
                block
            })
            .collect();

        log::debug!("Aggregated {} reads into {} classifications", reads.len(), totals.len());
        Self {
            uid,
            number_of_reads: reads.len() as u64,
            blocks,
            auxiliary: AHashMap::new(),
        }
    }

    pub fn set_number_of_reads(&mut self, number_of_reads: u64) {
        self.number_of_reads = number_of_reads;
    }

    /// Adds or replaces the block of the same name.
    pub fn put_block(&mut self, block: ClassificationBlock) {
        match self.blocks.iter_mut().find(|b| b.name == block.name) {
            Some(existing) => *existing = block,
            None => self.blocks.push(block),
        }
    }

    pub fn auxiliary(&self, label: &str) -> Option<&[u8]> {
        self.auxiliary.get(label).map(Vec::as_slice)
    }

    pub fn set_auxiliary(&mut self, label: &str, data: impl Into<Vec<u8>>) {
        self.auxiliary.insert(label.to_string(), data.into());
    }
}

impl Connector for MemoryConnector {
    fn uid(&self) -> io::Result<i64> {
        Ok(self.uid)
    }

    fn number_of_reads(&self) -> io::Result<u64> {
        Ok(self.number_of_reads)
    }

    fn all_classification_names(&self) -> io::Result<Vec<String>> {
        Ok(self.blocks.iter().map(|b| b.name.clone()).collect())
    }

    fn classification_block(&self, name: &str) -> io::Result<ClassificationBlock> {
        self.blocks
            .iter()
            .find(|b| b.name == name)
            .cloned()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no classification block: {name}"),
                )
            })
    }

    fn auxiliary_data(&self) -> io::Result<AHashMap<String, Vec<u8>>> {
        Ok(self.auxiliary.clone())
    }

    fn put_auxiliary_data(&mut self, data: AHashMap<String, Vec<u8>>) -> io::Result<()> {
        self.auxiliary.extend(data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MatchBlock, ReadAssignmentMode, TAXONOMY};

    fn read(name: &str, length: u32, spans: &[(u32, u32)]) -> ReadBlock {
        ReadBlock {
            name: name.to_string(),
            header: name.to_string(),
            length,
            matches: spans
                .iter()
                .map(|&(start, end)| MatchBlock::new(2, start, end))
                .collect(),
        }
    }

    fn assigned(reads: Vec<(ReadBlock, i32)>) -> Vec<AssignedRead> {
        reads
            .into_iter()
            .map(|(read, id)| AssignedRead {
                read,
                classes: vec![(TAXONOMY.to_string(), id), ("SEED".to_string(), 1)],
            })
            .collect()
    }

    #[test]
    fn test_from_reads_counts_and_weights() -> io::Result<()> {
        let reads = assigned(vec![
            (read("r1", 100, &[(0, 10), (5, 15)]), 2),
            (read("r2", 50, &[(0, 20)]), 2),
            (read("r3", 70, &[]), -1),
        ]);
        let calculator = ReadAssignmentCalculator::new(ReadAssignmentMode::AlignedBases);
        let connector = MemoryConnector::from_reads(42, &reads, &calculator);

        assert_eq!(connector.uid()?, 42);
        assert_eq!(connector.number_of_reads()?, 3);
        assert_eq!(connector.all_classification_names()?, vec!["SEED", TAXONOMY]);

        let tax = connector.classification_block(TAXONOMY)?;
        assert_eq!(tax.sum(2), 2);
        assert_eq!(tax.weighted_sum(2), 35.0);
        assert_eq!(tax.sum(-1), 1);
        assert_eq!(tax.weighted_sum(-1), 0.0);
        assert_eq!(tax.class_ids(), vec![-1, 2]);

        let seed = connector.classification_block("SEED")?;
        assert_eq!(seed.sum(1), 3);
        Ok(())
    }

    #[test]
    fn test_missing_block_is_error() {
        let connector = MemoryConnector::new(1);
        let err = connector.classification_block("KEGG").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_auxiliary_data() -> io::Result<()> {
        let mut connector = MemoryConnector::new(1);
        connector.set_auxiliary("A", b"one".to_vec());
        let mut data = AHashMap::new();
        data.insert("B".to_string(), b"two".to_vec());
        connector.put_auxiliary_data(data)?;
        let all = connector.auxiliary_data()?;
        assert_eq!(all.len(), 2);
        assert_eq!(connector.auxiliary("B"), Some(&b"two"[..]));
        Ok(())
    }
}
