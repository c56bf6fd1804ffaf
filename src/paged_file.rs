//! C1 PagedFile — adapts the external `PhysicalFile` to the engine's fix-mode
//! vocabulary.

use log::trace;

use crate::error::{Error, Result};
use crate::physical::{FixMode, OpenMode, PhysicalFile};
use crate::types::PageId;

pub struct PagedFile<PF: PhysicalFile> {
    physical: PF,
    mode: Option<OpenMode>,
}

impl<PF: PhysicalFile> PagedFile<PF> {
    pub fn new(physical: PF) -> Self {
        Self {
            physical,
            mode: None,
        }
    }

    /// "open(transaction, mode)".
    pub fn open(&mut self, mode: OpenMode) {
        self.physical.set_batch(matches!(mode, OpenMode::Batch));
        self.mode = Some(mode);
    }

    pub fn close(&mut self) {
        self.physical.set_batch(false);
        self.mode = None;
    }

    fn require_open(&self) -> Result<OpenMode> {
        self.mode
            .ok_or_else(|| Error::BadArgument("file is not open".into()))
    }

    pub fn current_fix_mode(&self) -> Result<FixMode> {
        Ok(self.require_open()?.fix_mode())
    }

    pub fn create(&mut self) -> Result<()> {
        self.physical.create()
    }

    pub fn destroy(&mut self) -> Result<()> {
        self.physical.destroy()
    }

    pub fn mount(&mut self) -> Result<()> {
        self.physical.mount()
    }

    pub fn unmount(&mut self) -> Result<()> {
        self.physical.unmount()
    }

    pub fn flush(&mut self) -> Result<()> {
        self.physical.flush()
    }

    pub fn start_backup(&mut self, restorable: bool) -> Result<()> {
        self.physical.start_backup(restorable)
    }

    pub fn end_backup(&mut self) -> Result<()> {
        self.physical.end_backup()
    }

    pub fn recover(&mut self, timestamp: u64) -> Result<()> {
        self.physical.recover(timestamp)
    }

    pub fn restore(&mut self, timestamp: u64) -> Result<()> {
        self.physical.restore(timestamp)
    }

    pub fn page_size(&self) -> usize {
        self.physical.page_data_size()
    }

    /// "allocatePage: returns a new physical page fixed at
    /// the current mode."
    pub fn allocate_page(&mut self) -> Result<(PageId, FixMode)> {
        let mode = self.current_fix_mode()?;
        let id = self.physical.allocate_page()?;
        Ok((id, mode))
    }

    /// "attachPage(pageId, mode?): returns an in-memory Page
    /// for the given id, choosing mode from the current file mode unless
    /// overridden."
    pub fn attach_page(
        &self,
        id: PageId,
        mode: Option<FixMode>,
    ) -> Result<(Vec<u8>, FixMode)> {
        let mode = match mode {
            Some(m) => m,
            None => self.current_fix_mode()?,
        };
        let bytes = self.physical.read_page(id)?;
        trace!(
            "attached page {} ({} bytes): {}",
            id,
            bytes.len(),
            hex::encode(&bytes[..bytes.len().min(16)])
        );
        Ok((bytes, mode))
    }

    pub fn write_back(&mut self, id: PageId, data: &[u8]) -> Result<()> {
        self.physical.write_page(id, data)
    }

    /// "freePage(page): schedules the page for release at
    /// next flush."
    pub fn free_page(&mut self, id: PageId) -> Result<()> {
        self.physical.free_page(id)
    }
}
