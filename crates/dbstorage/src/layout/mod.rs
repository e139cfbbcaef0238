//! The page layout family: typed readers/writers over a [`Page`]'s bytes.
//!
//! Every layout shares the 21-byte common header (see [`header`]); the
//! [`LayoutFactory`] dispatches an already-resident page to its matching
//! variant by reading byte 0 and validating the magic number in bytes 1..5.

pub mod container_metadata;
pub mod free_space_map;
pub mod header;
pub mod index;
pub mod table_data;
pub mod table_header;

pub use container_metadata::ContainerMetadataPage;
pub use free_space_map::FreeSpaceMapPage;
pub use header::{CommonHeader, PageType, HEADER_SIZE, MAGIC};
pub use index::IndexPage;
pub use table_data::{TableDataPage, ROW_DIRECTORY_ENTRY_SIZE};
pub use table_header::{ColumnDef, TableHeaderPage};

use crate::Page;

/// Identifies which layout a resident page should be read through, without
/// borrowing the page — a tagged, `dyn`-free stand-in for the interface
/// dispatch the original system used reflection for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayoutTag {
    ContainerMetadata,
    FreeSpaceMap,
    TableHeader,
    TableData,
    IndexLeaf,
    IndexInternal,
    /// Byte 0 or the magic number didn't match any known, initialized page.
    Uninitialized,
}

/// Reads a page's header and reports which layout applies, without
/// constructing a borrowed view (use the per-layout `wrap`/`initialize`
/// constructors for that once the tag is known).
pub struct LayoutFactory;

impl LayoutFactory {
    pub fn identify(page: &Page) -> LayoutTag {
        match header::read_common_header(page) {
            None => LayoutTag::Uninitialized,
            Some(h) => match h.page_type {
                PageType::ContainerMetadata => LayoutTag::ContainerMetadata,
                PageType::FreeSpaceMap => LayoutTag::FreeSpaceMap,
                PageType::TableHeader => LayoutTag::TableHeader,
                PageType::TableData => LayoutTag::TableData,
                PageType::IndexLeaf => LayoutTag::IndexLeaf,
                PageType::IndexInternal => LayoutTag::IndexInternal,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbcommon::PageId;

    #[test]
    fn identifies_uninitialized_pages() {
        let page = Page::new(PageId::new("T1", 9), 4096);
        assert_eq!(LayoutFactory::identify(&page), LayoutTag::Uninitialized);
    }

    #[test]
    fn identifies_table_data_pages() {
        let mut page = Page::new(PageId::new("T1", 9), 4096);
        TableDataPage::initialize(&mut page);
        assert_eq!(LayoutFactory::identify(&page), LayoutTag::TableData);
    }

    #[test]
    fn identifies_container_metadata_pages() {
        let mut page = Page::new(PageId::new("T1", 0), 4096);
        ContainerMetadataPage::initialize(&mut page, "T1", 4096, 0).unwrap();
        assert_eq!(LayoutFactory::identify(&page), LayoutTag::ContainerMetadata);
    }
}
