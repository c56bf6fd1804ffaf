//! PhysicalFile — the external buffer-pool collaborator. Out of scope
//! ("Version/MVCC page manager and buffer pool (assumed to
//! exist; the core calls into it)"); this module only declares the
//! interface the core consumes, plus one concrete, single-process
//! implementation (`FilePhysicalFile`) so the rest of the crate has
//! something real to run its tests against.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{Error, Result};
use crate::types::PageId;

/// How a page was fixed ("Fix modes (scoped resources)").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixMode {
    /// Never dirtied.
    ReadOnly,
    /// Mid-transaction bytes can be rolled back per-page; ordinary Update
    /// mode.
    WriteDiscardable,
    /// Flush is the only path to persistence; Batch mode.
    Write,
}

impl FixMode {
    pub fn is_writable(&self) -> bool {
        !matches!(self, FixMode::ReadOnly)
    }

    pub fn is_discardable(&self) -> bool {
        matches!(self, FixMode::WriteDiscardable)
    }
}

/// "open(transaction, mode): mode ∈ {ReadOnly, Update, Batch}".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    ReadOnly,
    Update,
    Batch,
}

impl OpenMode {
    pub fn fix_mode(&self) -> FixMode {
        match self {
            OpenMode::ReadOnly => FixMode::ReadOnly,
            OpenMode::Update => FixMode::WriteDiscardable,
            OpenMode::Batch => FixMode::Write,
        }
    }
}

/// The durable byte store beneath one open file. Page 0 always exists once
/// `create()` has run; it is the HeaderPage ("Persistent layout").
pub trait PhysicalFile: Send + Sync {
    fn create(&mut self) -> Result<()>;
    fn destroy(&mut self) -> Result<()>;
    fn mount(&mut self) -> Result<()>;
    fn unmount(&mut self) -> Result<()>;
    fn flush(&mut self) -> Result<()>;

    fn start_backup(&mut self, restorable: bool) -> Result<()>;
    fn end_backup(&mut self) -> Result<()>;
    fn recover(&mut self, timestamp: u64) -> Result<()>;
    fn restore(&mut self, timestamp: u64) -> Result<()>;

    fn page_data_size(&self) -> usize;
    fn set_batch(&mut self, batch: bool);

    /// Allocates a fresh page id and zero-fills its backing bytes.
    fn allocate_page(&mut self) -> Result<PageId>;
    fn read_page(&self, id: PageId) -> Result<Vec<u8>>;
    fn write_page(&mut self, id: PageId, data: &[u8]) -> Result<()>;
    /// Releases a page's storage for reuse. The host may defer the actual
    /// reclamation ("freePage(): schedules the page for release at next
    /// flush").
    fn free_page(&mut self, id: PageId) -> Result<()>;
}

/// A single-process, file-backed `PhysicalFile`. Pages are fixed-size
/// slots in one flat file; freed pages are tracked and handed back out by
/// `allocate_page` before the file is grown.
pub struct FilePhysicalFile {
    dir: PathBuf,
    data_path: PathBuf,
    file: Option<Mutex<File>>,
    page_size: usize,
    next_page_id: PageId,
    free_list: Vec<PageId>,
    batch: bool,
}

impl FilePhysicalFile {
    pub fn new<P: AsRef<Path>>(dir: P, page_size: usize) -> Self {
        let dir = dir.as_ref().to_path_buf();
        let data_path = dir.join("data.pages");
        Self {
            dir,
            data_path,
            file: None,
            page_size,
            next_page_id: 1, // page 0 is the HeaderPage
            free_list: Vec::new(),
            batch: false,
        }
    }

    fn file(&self) -> Result<std::sync::MutexGuard<'_, File>> {
        self.file
            .as_ref()
            .ok_or_else(|| Error::FileNotFound("file not mounted".into()))?
            .lock()
            .map_err(|_| Error::FileNotFound("file mutex poisoned".into()))
    }
}

impl PhysicalFile for FilePhysicalFile {
    fn create(&mut self) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let result = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(true)
            .open(&self.data_path);
        match result {
            Ok(f) => {
                self.file = Some(Mutex::new(f));
                self.next_page_id = 1;
                Ok(())
            }
            Err(e) => {
                // "any exception during create leaves no directory behind".
                let _ = std::fs::remove_dir_all(&self.dir);
                Err(e.into())
            }
        }
    }

    fn destroy(&mut self) -> Result<()> {
        self.file = None;
        if self.dir.exists() {
            std::fs::remove_dir_all(&self.dir)?;
        }
        Ok(())
    }

    fn mount(&mut self) -> Result<()> {
        let f = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.data_path)?;
        let len = f.metadata()?.len() as usize;
        self.next_page_id = (len / self.page_size).max(1) as PageId;
        self.file = Some(Mutex::new(f));
        Ok(())
    }

    fn unmount(&mut self) -> Result<()> {
        self.flush()?;
        self.file = None;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if let Some(f) = &self.file {
            f.lock()
                .map_err(|_| Error::FileNotFound("file mutex poisoned".into()))?
                .sync_all()?;
        }
        Ok(())
    }

    fn start_backup(&mut self, _restorable: bool) -> Result<()> {
        self.flush()
    }

    fn end_backup(&mut self) -> Result<()> {
        Ok(())
    }

    fn recover(&mut self, _timestamp: u64) -> Result<()> {
        Ok(())
    }

    fn restore(&mut self, _timestamp: u64) -> Result<()> {
        Ok(())
    }

    fn page_data_size(&self) -> usize {
        self.page_size
    }

    fn set_batch(&mut self, batch: bool) {
        self.batch = batch;
    }

    fn allocate_page(&mut self) -> Result<PageId> {
        let id = if let Some(id) = self.free_list.pop() {
            id
        } else {
            let id = self.next_page_id;
            self.next_page_id += 1;
            id
        };
        self.write_page(id, &vec![0u8; self.page_size])?;
        Ok(id)
    }

    fn read_page(&self, id: PageId) -> Result<Vec<u8>> {
        let mut file = self.file()?;
        let offset = id as u64 * self.page_size as u64;
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; self.page_size];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn write_page(&mut self, id: PageId, data: &[u8]) -> Result<()> {
        if data.len() != self.page_size {
            return Err(Error::BadArgument(format!(
                "page write of {} bytes does not match page size {}",
                data.len(),
                self.page_size
            )));
        }
        let file = self.file()?;
        let mut file = file;
        let offset = id as u64 * self.page_size as u64;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        Ok(())
    }

    fn free_page(&mut self, id: PageId) -> Result<()> {
        self.free_list.push(id);
        Ok(())
    }
}
