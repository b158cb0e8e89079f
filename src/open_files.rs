//src/open_files.rs

use ahash::AHashMap;
use parking_lot::Mutex;

/// Reference counts of documents currently open, keyed by file name and uid.
///
/// Owned by whatever manages document lifecycles; shareable across threads
/// behind an `Arc`.
#[derive(Debug, Default)]
pub struct OpenFiles {
    counts: Mutex<AHashMap<(String, i64), usize>>,
}

impl OpenFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one more holder of the document; returns the new count.
    pub fn acquire(&self, file_name: &str, uid: i64) -> usize {
        let mut counts = self.counts.lock();
        let count = counts.entry((file_name.to_string(), uid)).or_insert(0);
        *count += 1;
        *count
    }

    /// Drops one holder; returns the remaining count. Releasing a document
    /// that is not open is a no-op returning 0.
    pub fn release(&self, file_name: &str, uid: i64) -> usize {
        let mut counts = self.counts.lock();
        let key = (file_name.to_string(), uid);
        match counts.get_mut(&key) {
            Some(count) if *count > 1 => {
                *count -= 1;
                *count
            }
            Some(_) => {
                counts.remove(&key);
                0
            }
            None => {
                log::debug!("Release of unregistered file: {file_name}");
                0
            }
        }
    }

    pub fn count(&self, file_name: &str, uid: i64) -> usize {
        self.counts
            .lock()
            .get(&(file_name.to_string(), uid))
            .copied()
            .unwrap_or(0)
    }

    pub fn is_open(&self, file_name: &str, uid: i64) -> bool {
        self.count(file_name, uid) > 0
    }

    /// Whether any document with this file name is open, whatever its uid.
    pub fn is_file_open(&self, file_name: &str) -> bool {
        self.counts.lock().keys().any(|(name, _)| name == file_name)
    }
}
