use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use dbcommon::{DbError, DbResult, PageId};

use crate::Page;

/// A file at a known path, containing a concatenation of `total_pages`
/// page-sized blocks. Holds no opinion about what's stored in each page —
/// that's the [`crate::layout`] family's job.
#[derive(Debug)]
pub struct StorageContainer {
    file: File,
    path: PathBuf,
    page_size: usize,
}

impl StorageContainer {
    /// Opens an existing container, or creates one zero-extended to
    /// `initial_pages` pages. Fails with `ContainerCorrupt` if an existing
    /// file's length is not a multiple of `page_size`.
    pub fn open(path: impl AsRef<Path>, page_size: usize, initial_pages: u64) -> DbResult<Self> {
        let path = path.as_ref().to_path_buf();
        let existed = path.exists();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        let mut container = Self {
            file,
            path,
            page_size,
        };

        if existed {
            let len = container.file.metadata()?.len();
            if len % page_size as u64 != 0 {
                return Err(DbError::ContainerCorrupt(format!(
                    "file length {len} is not a multiple of page size {page_size}"
                )));
            }
        } else {
            container.set_total_pages(initial_pages)?;
        }

        Ok(container)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn total_pages(&self) -> DbResult<u64> {
        Ok(self.file.metadata()?.len() / self.page_size as u64)
    }

    fn set_total_pages(&mut self, total_pages: u64) -> DbResult<()> {
        self.file.set_len(total_pages * self.page_size as u64)?;
        Ok(())
    }

    /// Reads the page at `id.page_number`, or `None` if it is beyond the
    /// container's current length.
    pub fn read_page(&mut self, id: PageId) -> DbResult<Option<Page>> {
        if id.page_number >= self.total_pages()? {
            return Ok(None);
        }
        let mut buf = vec![0u8; self.page_size];
        self.file
            .seek(SeekFrom::Start(id.page_number * self.page_size as u64))?;
        self.file.read_exact(&mut buf)?;
        Ok(Some(Page::from_bytes(id, buf)))
    }

    /// Writes `page`'s bytes to its offset. Durability is bounded by
    /// `write_all` reaching the OS — no `fsync` is issued (see Non-goals).
    pub fn write_page(&mut self, page: &Page) -> DbResult<()> {
        let offset = page.page_id().page_number * self.page_size as u64;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(page.buffer())?;
        self.file.flush()?;
        Ok(())
    }

    /// Extends the file by exactly one zero-filled page, returning its
    /// page number.
    pub fn extend_by_one_page(&mut self) -> DbResult<u64> {
        let new_page_number = self.total_pages()?;
        self.set_total_pages(new_page_number + 1)?;
        Ok(new_page_number)
    }
}
