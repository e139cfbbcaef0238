use dbcommon::{DbError, DbResult};
use dbtypes::SqlType;

use super::header::{self, CommonHeader, PageType, HEADER_SIZE};
use crate::Page;

const IS_LEAF_OFFSET: usize = HEADER_SIZE;
const KEY_TYPE_OFFSET: usize = IS_LEAF_OFFSET + 1;
const BODY_OFFSET: u32 = (KEY_TYPE_OFFSET + 3) as u32; // reserve room for max_length

/// A B-tree index page: leaf or internal, distinguished by `page_type`.
/// Only root-page initialization is implemented here — insertion, split,
/// and search are out of scope for this re-implementation (see
/// `SPEC_FULL.md` §9, Open Question 1) and are left as an explicit stub.
pub struct IndexPage<'a> {
    page: &'a mut Page,
}

impl<'a> IndexPage<'a> {
    pub fn wrap(page: &'a mut Page) -> Self {
        Self { page }
    }

    /// Stamps a fresh root page. `is_leaf` is `true` for a brand-new,
    /// single-node index (every root starts as a leaf).
    pub fn initialize_root(page: &'a mut Page, key_type: SqlType) -> Self {
        header::write_common_header(
            page,
            &CommonHeader {
                page_type: PageType::IndexLeaf,
                next_page_id: None,
                prev_page_id: None,
                count: 0,
                free_space_offset: BODY_OFFSET,
            },
        );
        let mut view = Self { page };
        view.set_is_leaf(true);
        view.set_key_type(key_type);
        view
    }

    pub fn is_leaf(&self) -> bool {
        self.page.buffer()[IS_LEAF_OFFSET] != 0
    }

    fn set_is_leaf(&mut self, is_leaf: bool) {
        self.page.buffer_mut()[IS_LEAF_OFFSET] = is_leaf as u8;
        self.page.mark_dirty();
    }

    pub fn key_type(&self) -> Option<SqlType> {
        let buf = self.page.buffer();
        let type_id = buf[KEY_TYPE_OFFSET];
        let max_length = u16::from_be_bytes(
            buf[KEY_TYPE_OFFSET + 1..KEY_TYPE_OFFSET + 3]
                .try_into()
                .unwrap(),
        );
        SqlType::from_type_id(type_id, max_length)
    }

    fn set_key_type(&mut self, key_type: SqlType) {
        let max_length = match key_type {
            SqlType::Varchar { max_length } => max_length,
            _ => 0,
        };
        let buf = self.page.buffer_mut();
        buf[KEY_TYPE_OFFSET] = key_type.type_id();
        buf[KEY_TYPE_OFFSET + 1..KEY_TYPE_OFFSET + 3].copy_from_slice(&max_length.to_be_bytes());
        self.page.mark_dirty();
    }

    pub fn key_count(&self) -> u32 {
        header::read_common_header(self.page)
            .map(|h| h.count)
            .unwrap_or(0)
    }

    /// Always fails: key insertion/search is not implemented, matching the
    /// original system's scope.
    pub fn insert_key(&mut self, _key_bytes: &[u8], _child_or_value: u32) -> DbResult<()> {
        Err(DbError::Storage(
            "index key insertion is not implemented".into(),
        ))
    }
}
