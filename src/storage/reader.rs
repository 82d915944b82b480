//! Paged random-access reader
//!
//! The record area is split into pages of [`PAGE_SIZE`] records. A page is read
//! from disk the first time one of its ids is looked up and then stays in
//! memory until it is evicted. When the resident budget is exhausted the page
//! with the fewest hits goes.
//!
//! Locking is two-level. The table mutex only covers slot assignment and
//! eviction. Each page owns a mutex held while its records are loaded, so
//! concurrent lookups in the same page wait for one load and lookups in other
//! pages do not wait at all. Pages are handed out as `Arc`s and stay usable
//! after eviction by whoever still holds them.
//!
//! A snapshot keeps the file handle it was loaded from. Once a new file is
//! renamed over the path, older snapshots keep reading the file they were
//! opened on until [`RankFileReader::reload`] swaps them out.

use super::format::{decode_rank, Header, DEFAULT_PAGE_BUDGET, PAGE_SIZE, RECORD_SIZE};
use super::{StorageError, StorageResult};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{debug, error, info};

/// One page of ranks
struct Page {
    index: u64,
    hits: AtomicU64,
    values: Mutex<Option<Arc<[f64]>>>,
}

impl Page {
    fn new(index: u64) -> Self {
        Self {
            index,
            hits: AtomicU64::new(0),
            values: Mutex::new(None),
        }
    }
}

struct Slots {
    pages: Vec<Option<Arc<Page>>>,
    resident: usize,
}

/// Snapshot of one loaded file
struct PageTable {
    path: PathBuf,
    file: Option<File>,
    header_len: u64,
    size: u64,
    thresholds: Vec<f64>,
    budget: usize,
    slots: Mutex<Slots>,
}

impl PageTable {
    fn empty(path: PathBuf, budget: usize) -> Self {
        Self {
            path,
            file: None,
            header_len: 0,
            size: 0,
            thresholds: Vec::new(),
            budget,
            slots: Mutex::new(Slots {
                pages: Vec::new(),
                resident: 0,
            }),
        }
    }

    fn load(path: &Path, budget: usize) -> StorageResult<Self> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No rank file at {:?}, starting empty", path);
                return Ok(Self::empty(path.to_path_buf(), budget));
            }
            Err(source) => {
                return Err(StorageError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let len = file
            .metadata()
            .map_err(|source| StorageError::Read {
                path: path.to_path_buf(),
                source,
            })?
            .len();
        let header = Header::read_from(&mut BufReader::new(&file), path)?;
        let header_len = header.len();
        let size = len.saturating_sub(header_len) / RECORD_SIZE;
        let page_count = size.div_ceil(PAGE_SIZE) as usize;

        info!(
            "Loaded rank file {:?}: {} records, {} thresholds, {} pages",
            path,
            size,
            header.thresholds.len(),
            page_count
        );

        Ok(Self {
            path: path.to_path_buf(),
            file: Some(file),
            header_len,
            size,
            thresholds: header.thresholds,
            budget,
            slots: Mutex::new(Slots {
                pages: vec![None; page_count],
                resident: 0,
            }),
        })
    }

    /// Resolve the page that owns `index`, installing it if needed
    fn page(&self, index: u64) -> Option<Arc<Page>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = index as usize;
        if let Some(page) = slots.pages.get(slot)?.as_ref() {
            return Some(Arc::clone(page));
        }

        if slots.resident >= self.budget {
            let victim = slots
                .pages
                .iter()
                .enumerate()
                .filter_map(|(i, p)| p.as_ref().map(|p| (i, p.hits.load(Ordering::Relaxed))))
                .min_by_key(|(_, hits)| *hits)
                .map(|(i, _)| i);
            if let Some(victim) = victim {
                debug!("Evicting page {}", victim);
                slots.pages[victim] = None;
                slots.resident -= 1;
            }
        }

        let page = Arc::new(Page::new(index));
        slots.pages[slot] = Some(Arc::clone(&page));
        slots.resident += 1;
        Some(page)
    }

    /// Records of `page`, loaded on first use
    fn values(&self, page: &Page) -> Option<Arc<[f64]>> {
        let mut values = page.values.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(loaded) = values.as_ref() {
            return Some(Arc::clone(loaded));
        }

        match self.read_page(page.index) {
            Ok(loaded) => {
                let loaded: Arc<[f64]> = loaded.into();
                *values = Some(Arc::clone(&loaded));
                Some(loaded)
            }
            Err(e) => {
                error!("Failed to load page {} of {:?}: {}", page.index, self.path, e);
                None
            }
        }
    }

    fn read_page(&self, index: u64) -> io::Result<Vec<f64>> {
        let first_id = index * PAGE_SIZE;
        let count = PAGE_SIZE.min(self.size - first_id);

        let file = self
            .file
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no rank file"))?;
        let mut raw = vec![0u8; (count * RECORD_SIZE) as usize];
        read_exact_at(file, &mut raw, self.header_len + first_id * RECORD_SIZE)?;

        let mut buf = &raw[..];
        Ok((0..count).map(|_| decode_rank(&mut buf)).collect())
    }

    fn resident(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .resident
    }
}

#[cfg(unix)]
fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(windows)]
fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_read(buf, offset) {
            Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
            Ok(n) => {
                buf = &mut buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Random-access reader over a rank file
pub struct RankFileReader {
    path: PathBuf,
    page_budget: usize,
    table: RwLock<Arc<PageTable>>,
}

impl RankFileReader {
    /// Open the rank file at `path`. A missing file reads as empty.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        Self::with_page_budget(path, DEFAULT_PAGE_BUDGET)
    }

    /// Open with at most `page_budget` resident pages
    pub fn with_page_budget(path: impl AsRef<Path>, page_budget: usize) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        let page_budget = page_budget.max(1);
        let table = PageTable::load(&path, page_budget)?;
        Ok(Self {
            path,
            page_budget,
            table: RwLock::new(Arc::new(table)),
        })
    }

    fn snapshot(&self) -> Arc<PageTable> {
        Arc::clone(&self.table.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Raw rank of `id`, `None` outside `[1, size)` or when its page can't be read
    pub fn read(&self, id: u64) -> Option<f64> {
        let table = self.snapshot();
        if id < 1 || id >= table.size {
            return None;
        }

        let page = table.page(id / PAGE_SIZE)?;
        page.hits.fetch_add(1, Ordering::Relaxed);
        let values = table.values(&page)?;
        values.get((id % PAGE_SIZE) as usize).copied()
    }

    /// Drop every cached page and re-read the header and size from disk.
    ///
    /// Lookups already in flight finish against the previous snapshot. On error
    /// the previous snapshot stays in place.
    pub fn reload(&self) -> StorageResult<()> {
        let table = PageTable::load(&self.path, self.page_budget)?;
        *self.table.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(table);
        Ok(())
    }

    /// Number of records, slot 0 included
    pub fn size(&self) -> u64 {
        self.snapshot().size
    }

    pub fn thresholds(&self) -> Vec<f64> {
        self.snapshot().thresholds.clone()
    }

    pub fn header_len(&self) -> u64 {
        self.snapshot().header_len
    }

    /// Pages currently held in memory
    pub fn resident_pages(&self) -> usize {
        self.snapshot().resident()
    }

    pub fn page_budget(&self) -> usize {
        self.page_budget
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
