use crate::Page;

/// Fixed constant stamped at byte 1 of every initialized page; distinguishes
/// initialized pages from zero-filled junk.
pub const MAGIC: u32 = 0xDB10_DB10;

/// Size in bytes of the header every page layout shares, starting at offset 0.
pub const HEADER_SIZE: usize = 21;

/// Stable on-disk tag identifying how a page's body is laid out.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageType {
    TableHeader = 1,
    TableData = 2,
    IndexLeaf = 3,
    IndexInternal = 4,
    ContainerMetadata = 5,
    FreeSpaceMap = 6,
}

impl PageType {
    pub fn from_u8(id: u8) -> Option<Self> {
        match id {
            1 => Some(PageType::TableHeader),
            2 => Some(PageType::TableData),
            3 => Some(PageType::IndexLeaf),
            4 => Some(PageType::IndexInternal),
            5 => Some(PageType::ContainerMetadata),
            6 => Some(PageType::FreeSpaceMap),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Decoded view of the 21-byte common header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommonHeader {
    pub page_type: PageType,
    /// `None` is the on-disk `-1` sentinel.
    pub next_page_id: Option<u32>,
    /// `None` is the on-disk `-1` sentinel.
    pub prev_page_id: Option<u32>,
    pub count: u32,
    pub free_space_offset: u32,
}

fn encode_sentinel(value: Option<u32>) -> i32 {
    match value {
        Some(v) => v as i32,
        None => -1,
    }
}

fn decode_sentinel(value: i32) -> Option<u32> {
    if value < 0 { None } else { Some(value as u32) }
}

/// Reads the common header, returning `None` if the magic number does not
/// match (an uninitialized or junk page).
pub fn read_common_header(page: &Page) -> Option<CommonHeader> {
    let buf = page.buffer();
    if buf.len() < HEADER_SIZE {
        return None;
    }
    let magic = u32::from_be_bytes(buf[1..5].try_into().unwrap());
    if magic != MAGIC {
        return None;
    }
    let page_type = PageType::from_u8(buf[0])?;
    let next = i32::from_be_bytes(buf[5..9].try_into().unwrap());
    let prev = i32::from_be_bytes(buf[9..13].try_into().unwrap());
    let count = u32::from_be_bytes(buf[13..17].try_into().unwrap());
    let free_space_offset = u32::from_be_bytes(buf[17..21].try_into().unwrap());
    Some(CommonHeader {
        page_type,
        next_page_id: decode_sentinel(next),
        prev_page_id: decode_sentinel(prev),
        count,
        free_space_offset,
    })
}

/// Stamps the common header, including the magic number. Always marks the
/// page dirty — writing a header is always a mutation worth flushing.
pub fn write_common_header(page: &mut Page, header: &CommonHeader) {
    {
        let buf = page.buffer_mut();
        buf[0] = header.page_type.as_u8();
        buf[1..5].copy_from_slice(&MAGIC.to_be_bytes());
        buf[5..9].copy_from_slice(&encode_sentinel(header.next_page_id).to_be_bytes());
        buf[9..13].copy_from_slice(&encode_sentinel(header.prev_page_id).to_be_bytes());
        buf[13..17].copy_from_slice(&header.count.to_be_bytes());
        buf[17..21].copy_from_slice(&header.free_space_offset.to_be_bytes());
    }
    page.mark_dirty();
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbcommon::PageId;

    #[test]
    fn header_round_trips() {
        let mut page = Page::new(PageId::new("T1", 2), 256);
        let header = CommonHeader {
            page_type: PageType::TableData,
            next_page_id: Some(7),
            prev_page_id: None,
            count: 3,
            free_space_offset: 200,
        };
        write_common_header(&mut page, &header);
        assert!(page.is_dirty());
        assert_eq!(read_common_header(&page), Some(header));
    }

    #[test]
    fn uninitialized_page_has_no_header() {
        let page = Page::new(PageId::new("T1", 2), 256);
        assert_eq!(read_common_header(&page), None);
    }
}
