//! Page-oriented persistent storage: fixed-size pages, byte-exact binary
//! page formats, and the tablespace container they live in.
//!
//! This crate owns three layers:
//! - [`Page`]: an in-memory, pinnable, dirty-trackable byte buffer.
//! - [`layout`]: typed readers/writers over a page's bytes, one module per
//!   on-disk page type (container metadata, free-space map, table header,
//!   table data, index).
//! - [`container`] and [`tablespace`]: the file-backed container a
//!   tablespace's pages live in, and the allocation bookkeeping
//!   (free-space map + metadata page) that keeps it consistent.

pub mod container;
pub mod layout;
pub mod page;
pub mod tablespace;

pub use container::StorageContainer;
pub use page::Page;
pub use tablespace::Tablespace;

