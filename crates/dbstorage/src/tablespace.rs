use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use dbcommon::{DbError, DbResult, PageId};

use crate::container::StorageContainer;
use crate::layout::{ContainerMetadataPage, FreeSpaceMapPage};
use crate::Page;

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_millis() as u64
}

/// A named tablespace: a [`StorageContainer`] whose page 0 and page 1 are
/// reserved for container metadata and the free-space map. All allocation
/// within a tablespace flows through here, so the FSM, the metadata page's
/// `total_pages`, and the file's actual length never drift apart.
pub struct Tablespace {
    name: String,
    page_size: usize,
    container: StorageContainer,
}

impl Tablespace {
    /// Creates a brand-new tablespace at `path`, pre-allocating
    /// `initial_pages` pages (must be at least 2: metadata + FSM). Pages
    /// `2..initial_pages` are marked free in the FSM, ready for
    /// [`Tablespace::allocate_page`] without touching the file again.
    pub fn create(
        name: impl Into<String>,
        path: impl AsRef<Path>,
        page_size: usize,
        initial_pages: u64,
    ) -> DbResult<Self> {
        let name = name.into();
        if initial_pages < 2 {
            return Err(DbError::ContainerCorrupt(
                "a tablespace needs at least 2 pages for metadata and the free-space map".into(),
            ));
        }

        let mut container = StorageContainer::open(path, page_size, initial_pages)?;
        let now = now_ms();

        let mut metadata_page = Page::new(PageId::new(&name, 0), page_size);
        {
            let mut metadata = ContainerMetadataPage::initialize(&mut metadata_page, &name, page_size as u32, now)?;
            metadata.set_total_pages(initial_pages);
        }
        container.write_page(&metadata_page)?;

        let mut fsm_page = Page::new(PageId::new(&name, 1), page_size);
        {
            let mut fsm = FreeSpaceMapPage::initialize(&mut fsm_page);
            for page_number in 2..initial_pages {
                fsm.mark_page_as_free(page_number as i64);
            }
        }
        container.write_page(&fsm_page)?;

        Ok(Self {
            name,
            page_size,
            container,
        })
    }

    /// Reopens an existing tablespace. Rejects the file if its stored page
    /// size does not match `page_size`, and refreshes `last_opened_at_ms`.
    pub fn open(name: impl Into<String>, path: impl AsRef<Path>, page_size: usize) -> DbResult<Self> {
        let name = name.into();
        let mut container = StorageContainer::open(path, page_size, 2)?;

        let mut metadata_page = container
            .read_page(PageId::new(&name, 0))?
            .ok_or_else(|| DbError::ContainerCorrupt("missing container metadata page".into()))?;

        let stored_page_size = ContainerMetadataPage::wrap(&mut metadata_page).page_size();
        if stored_page_size as usize != page_size {
            return Err(DbError::ContainerCorrupt(format!(
                "declared page size {page_size} does not match stored page size {stored_page_size}"
            )));
        }

        ContainerMetadataPage::wrap(&mut metadata_page).set_last_opened_at_ms(now_ms());
        container.write_page(&metadata_page)?;

        Ok(Self {
            name,
            page_size,
            container,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn total_pages(&self) -> DbResult<u64> {
        self.container.total_pages()
    }

    /// Reads a page by number, checking that `id` actually names this
    /// tablespace before touching the container.
    pub fn read_page(&mut self, id: &PageId) -> DbResult<Option<Page>> {
        self.check_tablespace(id)?;
        self.container.read_page(id.clone())
    }

    pub fn write_page(&mut self, page: &Page) -> DbResult<()> {
        self.check_tablespace(page.page_id())?;
        self.container.write_page(page)
    }

    fn check_tablespace(&self, id: &PageId) -> DbResult<()> {
        if id.tablespace != self.name {
            return Err(DbError::WrongTablespace {
                expected: self.name.clone(),
                actual: id.tablespace.clone(),
                page_number: id.page_number,
            });
        }
        Ok(())
    }

    /// Allocates a fresh, zero-filled page: takes a free slot from the FSM
    /// if one exists, otherwise extends the file by exactly one page and
    /// bumps the metadata page's `total_pages`.
    pub fn allocate_page(&mut self) -> DbResult<Page> {
        let fsm_id = PageId::new(&self.name, 1);
        let mut fsm_page = self
            .container
            .read_page(fsm_id)?
            .ok_or_else(|| DbError::ContainerCorrupt("missing free-space map page".into()))?;

        let candidate = FreeSpaceMapPage::wrap(&mut fsm_page).allocate_page();

        let page_number = match candidate {
            Some(page_number) => {
                self.container.write_page(&fsm_page)?;
                page_number as u64
            }
            None => {
                let page_number = self.container.extend_by_one_page()?;
                self.bump_total_pages(page_number + 1)?;
                page_number
            }
        };

        Ok(Page::new(PageId::new(&self.name, page_number), self.page_size))
    }

    fn bump_total_pages(&mut self, total_pages: u64) -> DbResult<()> {
        let mut metadata_page = self
            .container
            .read_page(PageId::new(&self.name, 0))?
            .ok_or_else(|| DbError::ContainerCorrupt("missing container metadata page".into()))?;
        ContainerMetadataPage::wrap(&mut metadata_page).set_total_pages(total_pages);
        self.container.write_page(&metadata_page)
    }
}
