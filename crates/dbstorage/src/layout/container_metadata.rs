use dbcommon::{DbError, DbResult};

use super::header::{self, CommonHeader, PageType, HEADER_SIZE};
use crate::Page;

const NAME_MAX_BYTES: usize = 64;
const NAME_LEN_OFFSET: usize = HEADER_SIZE;
const NAME_OFFSET: usize = NAME_LEN_OFFSET + 1;
const PAGE_SIZE_OFFSET: usize = NAME_OFFSET + NAME_MAX_BYTES;
const CREATED_AT_OFFSET: usize = PAGE_SIZE_OFFSET + 4;
const LAST_OPENED_AT_OFFSET: usize = CREATED_AT_OFFSET + 8;
const TOTAL_PAGES_OFFSET: usize = LAST_OPENED_AT_OFFSET + 8;
const FSM_PAGE_ID_OFFSET: usize = TOTAL_PAGES_OFFSET + 8;
const BODY_END: usize = FSM_PAGE_ID_OFFSET + 8;

/// Page 0 of every tablespace: records the tablespace's own identity,
/// declared page size, and page count.
pub struct ContainerMetadataPage<'a> {
    page: &'a mut Page,
}

impl<'a> ContainerMetadataPage<'a> {
    pub fn wrap(page: &'a mut Page) -> Self {
        Self { page }
    }

    pub fn initialize(
        page: &'a mut Page,
        tablespace_name: &str,
        page_size: u32,
        created_at_ms: u64,
    ) -> DbResult<Self> {
        if page.page_size() < BODY_END {
            return Err(DbError::ContainerCorrupt(format!(
                "page size {} too small for container metadata ({BODY_END} bytes needed)",
                page.page_size()
            )));
        }
        header::write_common_header(
            page,
            &CommonHeader {
                page_type: PageType::ContainerMetadata,
                next_page_id: None,
                prev_page_id: None,
                count: 0,
                free_space_offset: BODY_END as u32,
            },
        );
        let mut view = Self { page };
        view.set_tablespace_name(tablespace_name);
        view.set_page_size(page_size);
        view.set_created_at_ms(created_at_ms);
        view.set_last_opened_at_ms(created_at_ms);
        view.set_total_pages(2); // metadata + FSM pages exist from the start
        view.set_free_space_map_page_id(1);
        Ok(view)
    }

    pub fn tablespace_name(&self) -> String {
        let buf = self.page.buffer();
        let len = buf[NAME_LEN_OFFSET] as usize;
        String::from_utf8_lossy(&buf[NAME_OFFSET..NAME_OFFSET + len]).into_owned()
    }

    pub fn set_tablespace_name(&mut self, name: &str) {
        let truncated: String = name.chars().take(64).collect();
        let bytes = truncated.as_bytes();
        let len = bytes.len().min(NAME_MAX_BYTES);
        let buf = self.page.buffer_mut();
        buf[NAME_LEN_OFFSET] = len as u8;
        buf[NAME_OFFSET..NAME_OFFSET + NAME_MAX_BYTES].fill(0);
        buf[NAME_OFFSET..NAME_OFFSET + len].copy_from_slice(&bytes[..len]);
        self.page.mark_dirty();
    }

    pub fn page_size(&self) -> u32 {
        u32::from_be_bytes(
            self.page.buffer()[PAGE_SIZE_OFFSET..PAGE_SIZE_OFFSET + 4]
                .try_into()
                .unwrap(),
        )
    }

    pub fn set_page_size(&mut self, page_size: u32) {
        self.page.buffer_mut()[PAGE_SIZE_OFFSET..PAGE_SIZE_OFFSET + 4]
            .copy_from_slice(&page_size.to_be_bytes());
        self.page.mark_dirty();
    }

    pub fn created_at_ms(&self) -> u64 {
        self.read_u64(CREATED_AT_OFFSET)
    }

    pub fn set_created_at_ms(&mut self, value: u64) {
        self.write_u64(CREATED_AT_OFFSET, value);
    }

    pub fn last_opened_at_ms(&self) -> u64 {
        self.read_u64(LAST_OPENED_AT_OFFSET)
    }

    pub fn set_last_opened_at_ms(&mut self, value: u64) {
        self.write_u64(LAST_OPENED_AT_OFFSET, value);
    }

    pub fn total_pages(&self) -> u64 {
        self.read_u64(TOTAL_PAGES_OFFSET)
    }

    pub fn set_total_pages(&mut self, value: u64) {
        self.write_u64(TOTAL_PAGES_OFFSET, value);
    }

    pub fn free_space_map_page_id(&self) -> u64 {
        self.read_u64(FSM_PAGE_ID_OFFSET)
    }

    pub fn set_free_space_map_page_id(&mut self, value: u64) {
        self.write_u64(FSM_PAGE_ID_OFFSET, value);
    }

    fn read_u64(&self, offset: usize) -> u64 {
        u64::from_be_bytes(self.page.buffer()[offset..offset + 8].try_into().unwrap())
    }

    fn write_u64(&mut self, offset: usize, value: u64) {
        self.page.buffer_mut()[offset..offset + 8].copy_from_slice(&value.to_be_bytes());
        self.page.mark_dirty();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbcommon::PageId;

    #[test]
    fn initialize_then_reopen_round_trips() {
        let mut page = Page::new(PageId::new("T1", 0), 4096);
        {
            let mut view =
                ContainerMetadataPage::initialize(&mut page, "T1", 4096, 1_700_000_000_000)
                    .unwrap();
            assert_eq!(view.tablespace_name(), "T1");
            view.set_total_pages(4);
        }
        let view = ContainerMetadataPage::wrap(&mut page);
        assert_eq!(view.page_size(), 4096);
        assert_eq!(view.total_pages(), 4);
        assert_eq!(view.free_space_map_page_id(), 1);
    }

    #[test]
    fn name_longer_than_64_chars_is_truncated() {
        let mut page = Page::new(PageId::new("T1", 0), 4096);
        let long_name = "x".repeat(200);
        let view = ContainerMetadataPage::initialize(&mut page, &long_name, 4096, 0).unwrap();
        assert_eq!(view.tablespace_name().len(), 64);
    }
}
