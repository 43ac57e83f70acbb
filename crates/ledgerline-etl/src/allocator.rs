//! Catalog identifier allocation.

use parking_lot::Mutex;

#[derive(Debug)]
struct Counter {
    next: u64,
    first_minted: Option<u64>,
}

/// Hands out catalog identifiers to every worker of a run.
///
/// Identifiers are consumed as soon as they are returned, whether or not the
/// caller manages to write them into a file.
#[derive(Debug)]
pub struct IdAllocator {
    counter: Mutex<Counter>,
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new(0)
    }
}

impl IdAllocator {
    /// Allocator whose first identifier is `seed + 1`.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            counter: Mutex::new(Counter {
                next: seed + 1,
                first_minted: None,
            }),
        }
    }

    /// Restart the sequence after `seed`, forgetting what was minted.
    pub fn initialize(&self, seed: u64) {
        let mut counter = self.counter.lock();
        counter.next = seed + 1;
        counter.first_minted = None;
    }

    /// Mint the next unused identifier.
    pub fn allocate(&self) -> u64 {
        let mut counter = self.counter.lock();
        let id = counter.next;
        counter.next += 1;
        counter.first_minted.get_or_insert(id);
        id
    }

    /// First and last identifier minted since the last seeding.
    pub fn minted_range(&self) -> Option<(u64, u64)> {
        let counter = self.counter.lock();
        counter.first_minted.map(|first| (first, counter.next - 1))
    }
}
