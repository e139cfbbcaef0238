use super::header::{self, CommonHeader, PageType, HEADER_SIZE};
use crate::Page;

/// Size in bytes of one row-directory slot: `(i32 row_offset, i32 row_length)`.
pub const ROW_DIRECTORY_ENTRY_SIZE: usize = 8;

/// A slotted table-data page. The row directory grows upward from
/// `HEADER_SIZE`; row bytes grow downward from `page_size`. See
/// `free_space_offset` for the boundary between the two.
pub struct TableDataPage<'a> {
    page: &'a mut Page,
}

impl<'a> TableDataPage<'a> {
    pub fn wrap(page: &'a mut Page) -> Self {
        Self { page }
    }

    pub fn initialize(page: &'a mut Page) -> Self {
        let page_size = page.page_size() as u32;
        header::write_common_header(
            page,
            &CommonHeader {
                page_type: PageType::TableData,
                next_page_id: None,
                prev_page_id: None,
                count: 0,
                free_space_offset: page_size,
            },
        );
        Self { page }
    }

    fn header(&self) -> CommonHeader {
        header::read_common_header(self.page).expect("page was initialized as table data")
    }

    fn write_header(&mut self, header: CommonHeader) {
        header::write_common_header(self.page, &header);
    }

    pub fn row_count(&self) -> u32 {
        self.header().count
    }

    pub fn free_space_offset(&self) -> u32 {
        self.header().free_space_offset
    }

    pub fn next_page_id(&self) -> Option<u32> {
        self.header().next_page_id
    }

    pub fn set_next_page_id(&mut self, next: Option<u32>) {
        let mut header = self.header();
        header.next_page_id = next;
        self.write_header(header);
    }

    pub fn prev_page_id(&self) -> Option<u32> {
        self.header().prev_page_id
    }

    pub fn set_prev_page_id(&mut self, prev: Option<u32>) {
        let mut header = self.header();
        header.prev_page_id = prev;
        self.write_header(header);
    }

    fn directory_end(&self) -> u32 {
        HEADER_SIZE as u32 + ROW_DIRECTORY_ENTRY_SIZE as u32 * self.row_count()
    }

    /// Bytes available for a new row, including its 8-byte directory slot.
    pub fn free_space(&self) -> u32 {
        self.free_space_offset().saturating_sub(self.directory_end())
    }

    fn slot_offset(&self, index: u32) -> usize {
        HEADER_SIZE + index as usize * ROW_DIRECTORY_ENTRY_SIZE
    }

    fn read_slot(&self, index: u32) -> (u32, u32) {
        let offset = self.slot_offset(index);
        let buf = self.page.buffer();
        let row_offset = i32::from_be_bytes(buf[offset..offset + 4].try_into().unwrap());
        let row_length = i32::from_be_bytes(buf[offset + 4..offset + 8].try_into().unwrap());
        (row_offset as u32, row_length as u32)
    }

    fn write_slot(&mut self, index: u32, row_offset: u32, row_length: u32) {
        let offset = self.slot_offset(index);
        let buf = self.page.buffer_mut();
        buf[offset..offset + 4].copy_from_slice(&(row_offset as i32).to_be_bytes());
        buf[offset + 4..offset + 8].copy_from_slice(&(row_length as i32).to_be_bytes());
    }

    /// Appends `bytes` as a new row. Returns `false` (without mutating
    /// anything) if the page does not have `bytes.len() + 8` free bytes.
    pub fn add_row(&mut self, bytes: &[u8]) -> bool {
        let need = bytes.len() as u32 + ROW_DIRECTORY_ENTRY_SIZE as u32;
        if self.free_space() < need {
            return false;
        }

        let row_count = self.row_count();
        let new_offset = self.free_space_offset() - bytes.len() as u32;
        let end = new_offset as usize + bytes.len();
        self.page.buffer_mut()[new_offset as usize..end].copy_from_slice(bytes);

        self.write_slot(row_count, new_offset, bytes.len() as u32);

        let mut header = self.header();
        header.count = row_count + 1;
        header.free_space_offset = new_offset;
        self.write_header(header);
        true
    }

    /// Reads the row stored at directory slot `index`, or `None` if that
    /// slot does not exist.
    pub fn get_row(&self, index: u32) -> Option<Vec<u8>> {
        if index >= self.row_count() {
            return None;
        }
        let (offset, length) = self.read_slot(index);
        let start = offset as usize;
        let end = start + length as usize;
        Some(self.page.buffer()[start..end].to_vec())
    }

    pub fn get_all_rows(&self) -> Vec<Vec<u8>> {
        (0..self.row_count())
            .map(|i| self.get_row(i).expect("index within row_count"))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbcommon::PageId;

    #[test]
    fn add_and_get_rows_round_trip() {
        let mut page = Page::new(PageId::new("T1", 2), 4096);
        let mut table = TableDataPage::initialize(&mut page);

        assert!(table.add_row(&[0x01, 0x02, 0x03]));
        assert!(table.add_row(&[0xAA, 0xBB]));

        assert_eq!(table.row_count(), 2);
        assert_eq!(table.get_row(0), Some(vec![0x01, 0x02, 0x03]));
        assert_eq!(table.get_row(1), Some(vec![0xAA, 0xBB]));
        assert_eq!(table.free_space(), 4096 - 21 - 16 - 5);
    }

    #[test]
    fn add_row_rejects_when_full() {
        let mut page = Page::new(PageId::new("T1", 2), 200);
        let mut table = TableDataPage::initialize(&mut page);

        let row = vec![0u8; 10];
        let mut inserted = 0;
        while table.add_row(&row) {
            inserted += 1;
        }

        // floor((200 - 21) / (10 + 8)) = 9
        assert_eq!(inserted, 9);
        assert_eq!(table.row_count(), 9);
    }

    #[test]
    fn chaining_pointers_round_trip() {
        let mut page = Page::new(PageId::new("T1", 2), 256);
        let mut table = TableDataPage::initialize(&mut page);
        assert_eq!(table.next_page_id(), None);
        table.set_next_page_id(Some(9));
        assert_eq!(table.next_page_id(), Some(9));
    }

    #[test]
    fn all_rows_preserve_insertion_order() {
        let mut page = Page::new(PageId::new("T1", 2), 4096);
        let mut table = TableDataPage::initialize(&mut page);
        for i in 0..5u8 {
            assert!(table.add_row(&[i, i, i]));
        }
        let rows = table.get_all_rows();
        assert_eq!(rows.len(), 5);
        for (i, row) in rows.iter().enumerate() {
            assert_eq!(row, &vec![i as u8; 3]);
        }
    }
}
