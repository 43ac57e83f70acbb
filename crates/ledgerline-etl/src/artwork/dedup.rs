//! Near-duplicate detection for cover images.

use parking_lot::Mutex;
use std::convert::Infallible;
use std::fs;
use std::io;
use std::path::Path;

use super::codec::{cover_index, load_gray};
use super::phash::{DctHasher, ImageHash, PerceptualHasher};

/// Outcome of offering a fingerprint to the [`DedupStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The image is new; save it under this index.
    Admitted(u32),
    /// The image is a near-duplicate of the one stored under `of`.
    Duplicate { of: u32, distance: u32 },
}

impl Admission {
    /// Cover index the song should be linked to either way.
    #[must_use]
    pub const fn index(self) -> u32 {
        match self {
            Self::Admitted(index) | Self::Duplicate { of: index, .. } => index,
        }
    }
}

#[derive(Debug)]
struct Entry {
    index: u32,
    hash: ImageHash,
}

#[derive(Debug)]
struct Entries {
    list: Vec<Entry>,
    next_index: u32,
}

/// Fingerprints of every cover accepted during a run.
///
/// All workers share one store. Each admission scans the whole list under a
/// single lock, so this is the one point where image processing serializes.
/// The store only grows and lives for one run.
#[derive(Debug)]
pub struct DedupStore<H = DctHasher> {
    hasher: H,
    threshold: u32,
    entries: Mutex<Entries>,
}

impl DedupStore<DctHasher> {
    /// Store using the DCT hasher; fingerprints closer than `threshold`
    /// bits are duplicates.
    #[must_use]
    pub fn new(threshold: u32) -> Self {
        Self::with_hasher(DctHasher::new(), threshold)
    }
}

impl<H: PerceptualHasher> DedupStore<H> {
    #[must_use]
    pub fn with_hasher(hasher: H, threshold: u32) -> Self {
        Self {
            hasher,
            threshold,
            entries: Mutex::new(Entries {
                list: Vec::new(),
                next_index: 1,
            }),
        }
    }

    pub const fn hasher(&self) -> &H {
        &self.hasher
    }

    pub fn len(&self) -> usize {
        self.entries.lock().list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().list.is_empty()
    }

    /// Compare `hash` against every stored fingerprint and admit it when
    /// none is within the threshold.
    pub fn admit(&self, hash: ImageHash) -> Admission {
        match self.admit_with(hash, |_| Ok::<_, Infallible>(())) {
            Ok(admission) => admission,
            Err(never) => match never {},
        }
    }

    /// Like [`admit`](Self::admit), but runs `save` with the new index
    /// before the fingerprint is stored.
    ///
    /// The store stays locked while `save` runs, so no other caller can be
    /// told it duplicates an image that is not on disk yet. When `save`
    /// fails the fingerprint is dropped but the index stays consumed.
    pub fn admit_with<E>(
        &self,
        hash: ImageHash,
        save: impl FnOnce(u32) -> Result<(), E>,
    ) -> Result<Admission, E> {
        let mut entries = self.entries.lock();

        let closest = entries
            .list
            .iter()
            .map(|entry| (entry.index, self.hasher.distance(entry.hash, hash)))
            .min_by_key(|(_, distance)| *distance);

        if let Some((of, distance)) = closest.filter(|(_, d)| *d < self.threshold) {
            return Ok(Admission::Duplicate { of, distance });
        }

        let index = entries.next_index;
        entries.next_index += 1;
        save(index)?;
        entries.list.push(Entry { index, hash });
        Ok(Admission::Admitted(index))
    }

    /// Admit `hash` and return its new index, or `None` for a duplicate.
    pub fn try_admit(&self, hash: ImageHash) -> Option<u32> {
        match self.admit(hash) {
            Admission::Admitted(index) => Some(index),
            Admission::Duplicate { .. } => None,
        }
    }

    /// Register a fingerprint under a known index without deduplicating.
    ///
    /// Later admissions are numbered after the highest registered index.
    pub fn register(&self, index: u32, hash: ImageHash) {
        let mut entries = self.entries.lock();
        entries.list.push(Entry { index, hash });
        entries.next_index = entries.next_index.max(index.saturating_add(1));
    }

    /// Keep `index` from being handed out without storing a fingerprint.
    fn reserve(&self, index: u32) {
        let mut entries = self.entries.lock();
        entries.next_index = entries.next_index.max(index.saturating_add(1));
    }

    /// Register the covers already saved in `images_dir` (`1.jpg`, ...).
    ///
    /// Files that cannot be decoded are logged and take no part in
    /// deduplication, but their indices are still never reused. A missing
    /// directory registers nothing.
    pub fn seed_from_directory(&self, images_dir: &Path) -> io::Result<usize> {
        let dir = match fs::read_dir(images_dir) {
            Ok(dir) => dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        let mut covers: Vec<(u32, std::path::PathBuf)> = dir
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter_map(|path| cover_index(&path).map(|index| (index, path)))
            .collect();
        covers.sort_unstable_by_key(|(index, _)| *index);

        let mut seeded = 0;
        for (index, path) in covers {
            match load_gray(&path) {
                Ok(gray) => {
                    self.register(index, self.hasher.hash(&gray));
                    seeded += 1;
                }
                Err(e) => {
                    log::warn!("Skipping unreadable cover {}: {}", path.display(), e);
                    self.reserve(index);
                }
            }
        }
        Ok(seeded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};
    use std::sync::Arc;
    use std::thread;
    use tempfile::TempDir;

    fn hash(bits: u64) -> ImageHash {
        ImageHash::from_bits(bits)
    }

    #[test]
    fn test_first_image_gets_index_one() {
        let store = DedupStore::new(10);
        assert_eq!(store.try_admit(hash(0)), Some(1));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_near_duplicate_is_rejected() {
        let store = DedupStore::new(10);
        assert_eq!(store.try_admit(hash(0)), Some(1));
        // Three bits apart
        assert_eq!(store.try_admit(hash(0b111)), None);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_distance_at_threshold_is_distinct() {
        let store = DedupStore::new(10);
        store.try_admit(hash(0));
        assert_eq!(store.try_admit(hash(0b11_1111_1111)), Some(2));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_duplicate_reports_closest_match() {
        let store = DedupStore::new(10);
        store.admit(hash(0));
        store.admit(hash(u64::MAX));
        assert_eq!(
            store.admit(hash(u64::MAX ^ 1)),
            Admission::Duplicate { of: 2, distance: 1 }
        );
        assert_eq!(store.admit(hash(u64::MAX ^ 1)).index(), 2);
    }

    #[test]
    fn test_register_moves_next_index() {
        let store = DedupStore::new(10);
        store.register(7, hash(0));
        assert_eq!(store.try_admit(hash(u64::MAX)), Some(8));
        assert!(store.try_admit(hash(1)).is_none());
    }

    #[test]
    fn test_concurrent_admissions_get_unique_indices() {
        let store = Arc::new(DedupStore::new(1));
        let handles: Vec<_> = (0..8u64)
            .map(|worker| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    (0..16u64)
                        .filter_map(|n| store.try_admit(hash(worker * 16 + n)))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut indices: Vec<u32> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        indices.sort_unstable();
        // Distinct hashes with threshold 1: nothing is a duplicate
        assert_eq!(indices, (1..=128).collect::<Vec<_>>());
    }

    #[test]
    fn test_seed_from_missing_directory() {
        let store = DedupStore::new(10);
        let seeded = store
            .seed_from_directory(Path::new("/nonexistent/covers"))
            .unwrap();
        assert_eq!(seeded, 0);
        assert!(store.is_empty());
    }

    #[test]
    fn test_seed_from_directory() {
        let temp_dir = TempDir::new().unwrap();
        let img = GrayImage::from_fn(32, 32, |x, y| Luma([((x * y) % 256) as u8]));
        img.save(temp_dir.path().join("3.jpg")).unwrap();
        std::fs::write(temp_dir.path().join("5.jpg"), b"corrupt").unwrap();
        std::fs::write(temp_dir.path().join("notes.txt"), b"ignored").unwrap();

        let store = DedupStore::new(10);
        let seeded = store.seed_from_directory(temp_dir.path()).unwrap();
        assert_eq!(seeded, 1);

        let saved = load_gray(&temp_dir.path().join("3.jpg")).unwrap();
        let saved_hash = store.hasher().hash(&saved);
        assert_eq!(
            store.admit(saved_hash),
            Admission::Duplicate { of: 3, distance: 0 }
        );
        // The corrupt 5.jpg takes no part in matching but keeps its name
        assert_eq!(store.len(), 1);
        assert_eq!(store.try_admit(hash(!saved_hash.bits())), Some(6));
    }

    #[test]
    fn test_failed_save_does_not_store_fingerprint() {
        let store = DedupStore::new(10);
        let failed = store.admit_with(hash(0), |index| Err(index));
        assert_eq!(failed, Err(1));
        assert!(store.is_empty());

        let mut saved = Vec::new();
        let admission = store
            .admit_with(hash(0b11), |index| {
                saved.push(index);
                Ok::<_, u32>(())
            })
            .unwrap();
        assert_eq!(admission, Admission::Admitted(2));
        assert_eq!(saved, vec![2]);
    }

    #[test]
    fn test_duplicate_skips_save() {
        let store = DedupStore::new(10);
        store.admit(hash(0));
        let admission = store
            .admit_with(hash(1), |_| -> Result<(), ()> { panic!("duplicates are not saved") })
            .unwrap();
        assert_eq!(admission, Admission::Duplicate { of: 1, distance: 1 });
    }
}
