use dbcommon::{DbError, DbResult};
use dbtypes::SqlType;

use super::header::{self, CommonHeader, PageType, HEADER_SIZE};
use crate::Page;

const TABLE_NAME_MAX_BYTES: usize = 128;
const NAME_LEN_OFFSET: usize = HEADER_SIZE;
const NAME_OFFSET: usize = NAME_LEN_OFFSET + 1;
const FIRST_DATA_PAGE_OFFSET: usize = NAME_OFFSET + TABLE_NAME_MAX_BYTES;
const COLUMN_COUNT_OFFSET: usize = FIRST_DATA_PAGE_OFFSET + 8;
const COLUMNS_OFFSET: usize = COLUMN_COUNT_OFFSET + 2;

const COLUMN_NAME_MAX_BYTES: usize = 64;
/// name_len(1) + name(64) + type_id(1) + nullable(1) + max_length(2) + is_pk(1)
const COLUMN_SLOT_SIZE: usize = 1 + COLUMN_NAME_MAX_BYTES + 1 + 1 + 2 + 1;

/// Sentinel stored on disk for "no first data page yet".
const NO_PAGE: u64 = u64::MAX;

/// Decoded column definition, as stored in a `TableHeaderPageLayout`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: SqlType,
    pub nullable: bool,
    pub is_primary_key: bool,
}

/// Page holding a user (or system catalog) table's schema: its name, the
/// id of its first data page, and its ordered column list.
pub struct TableHeaderPage<'a> {
    page: &'a mut Page,
}

impl<'a> TableHeaderPage<'a> {
    pub fn wrap(page: &'a mut Page) -> Self {
        Self { page }
    }

    pub fn initialize(page: &'a mut Page, table_name: &str) -> DbResult<Self> {
        if page.page_size() < COLUMNS_OFFSET {
            return Err(DbError::ContainerCorrupt(format!(
                "page size {} too small for a table header",
                page.page_size()
            )));
        }
        header::write_common_header(
            page,
            &CommonHeader {
                page_type: PageType::TableHeader,
                next_page_id: None,
                prev_page_id: None,
                count: 0,
                free_space_offset: COLUMNS_OFFSET as u32,
            },
        );
        let mut view = Self { page };
        view.set_table_name(table_name);
        view.set_first_data_page_id(None);
        view
            .page
            .buffer_mut()[COLUMN_COUNT_OFFSET..COLUMN_COUNT_OFFSET + 2]
            .copy_from_slice(&0u16.to_be_bytes());
        Ok(view)
    }

    pub fn table_name(&self) -> String {
        let buf = self.page.buffer();
        let len = buf[NAME_LEN_OFFSET] as usize;
        String::from_utf8_lossy(&buf[NAME_OFFSET..NAME_OFFSET + len]).into_owned()
    }

    pub fn set_table_name(&mut self, name: &str) {
        let bytes = name.as_bytes();
        let len = bytes.len().min(TABLE_NAME_MAX_BYTES);
        let buf = self.page.buffer_mut();
        buf[NAME_LEN_OFFSET] = len as u8;
        buf[NAME_OFFSET..NAME_OFFSET + TABLE_NAME_MAX_BYTES].fill(0);
        buf[NAME_OFFSET..NAME_OFFSET + len].copy_from_slice(&bytes[..len]);
        self.page.mark_dirty();
    }

    pub fn first_data_page_id(&self) -> Option<u64> {
        let raw = u64::from_be_bytes(
            self.page.buffer()[FIRST_DATA_PAGE_OFFSET..FIRST_DATA_PAGE_OFFSET + 8]
                .try_into()
                .unwrap(),
        );
        if raw == NO_PAGE { None } else { Some(raw) }
    }

    pub fn set_first_data_page_id(&mut self, page_id: Option<u64>) {
        let raw = page_id.unwrap_or(NO_PAGE);
        self.page.buffer_mut()[FIRST_DATA_PAGE_OFFSET..FIRST_DATA_PAGE_OFFSET + 8]
            .copy_from_slice(&raw.to_be_bytes());
        self.page.mark_dirty();
    }

    pub fn column_count(&self) -> u16 {
        u16::from_be_bytes(
            self.page.buffer()[COLUMN_COUNT_OFFSET..COLUMN_COUNT_OFFSET + 2]
                .try_into()
                .unwrap(),
        )
    }

    fn column_slot_offset(index: u16) -> usize {
        COLUMNS_OFFSET + index as usize * COLUMN_SLOT_SIZE
    }

    /// Appends a column definition. Returns `PageTooSmall` if the header
    /// page has no room left for another fixed-size column slot.
    pub fn add_column(&mut self, column: &ColumnDef) -> DbResult<()> {
        let count = self.column_count();
        let offset = Self::column_slot_offset(count);
        if offset + COLUMN_SLOT_SIZE > self.page.page_size() {
            return Err(DbError::PageTooSmall {
                needed: offset + COLUMN_SLOT_SIZE,
                page_size: self.page.page_size(),
            });
        }

        let name_bytes = column.name.as_bytes();
        let name_len = name_bytes.len().min(COLUMN_NAME_MAX_BYTES);
        let (type_id, max_length) = match column.data_type {
            SqlType::Varchar { max_length } => (SqlType::Varchar { max_length }.type_id(), max_length),
            other => (other.type_id(), 0),
        };

        let buf = self.page.buffer_mut();
        let mut cursor = offset;
        buf[cursor] = name_len as u8;
        cursor += 1;
        buf[cursor..cursor + COLUMN_NAME_MAX_BYTES].fill(0);
        buf[cursor..cursor + name_len].copy_from_slice(&name_bytes[..name_len]);
        cursor += COLUMN_NAME_MAX_BYTES;
        buf[cursor] = type_id;
        cursor += 1;
        buf[cursor] = column.nullable as u8;
        cursor += 1;
        buf[cursor..cursor + 2].copy_from_slice(&max_length.to_be_bytes());
        cursor += 2;
        buf[cursor] = column.is_primary_key as u8;

        let new_count = count + 1;
        self.page.buffer_mut()[COLUMN_COUNT_OFFSET..COLUMN_COUNT_OFFSET + 2]
            .copy_from_slice(&new_count.to_be_bytes());
        self.page.mark_dirty();
        Ok(())
    }

    pub fn columns(&self) -> Vec<ColumnDef> {
        (0..self.column_count())
            .map(|i| self.read_column(i))
            .collect()
    }

    fn read_column(&self, index: u16) -> ColumnDef {
        let offset = Self::column_slot_offset(index);
        let buf = self.page.buffer();
        let mut cursor = offset;
        let name_len = buf[cursor] as usize;
        cursor += 1;
        let name = String::from_utf8_lossy(&buf[cursor..cursor + name_len]).into_owned();
        cursor += COLUMN_NAME_MAX_BYTES;
        let type_id = buf[cursor];
        cursor += 1;
        let nullable = buf[cursor] != 0;
        cursor += 1;
        let max_length = u16::from_be_bytes(buf[cursor..cursor + 2].try_into().unwrap());
        cursor += 2;
        let is_primary_key = buf[cursor] != 0;
        let data_type = SqlType::from_type_id(type_id, max_length)
            .expect("column type id was validated at write time");
        ColumnDef {
            name,
            data_type,
            nullable,
            is_primary_key,
        }
    }
}
