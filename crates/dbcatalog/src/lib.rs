//! Self-hosted system catalog: a [`SchemaManager`] that stores table and
//! index metadata as ordinary rows in `SYS_*` tables, using the same page
//! layouts and buffer pool as user data. [`Engine`] is the front door that
//! ties a set of tablespaces, their buffer pools, and the schema manager
//! together.

#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use ahash::RandomState;
use hashbrown::HashMap;

use dbbuffer::{BufferPool, PageCleanerConfig};
use dbcommon::{DbError, DbResult, PageId, RecordId, Row, StorageConfig};
use dbstorage::layout::{header, ColumnDef, IndexPage, LayoutFactory, LayoutTag, TableDataPage, TableHeaderPage, ROW_DIRECTORY_ENTRY_SIZE};
use dbstorage::Tablespace;
use dbtypes::{SqlType, Value};

type Map<K, V> = HashMap<K, V, RandomState>;

pub const SYSTEM_TABLESPACE: &str = "SYSTEM";

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_millis() as u64
}

/// A user or system-catalog table's logical schema plus the page ids that
/// anchor it on disk.
#[derive(Clone, Debug, PartialEq)]
pub struct Table {
    pub name: String,
    pub tablespace_name: String,
    pub columns: Vec<ColumnDef>,
    pub primary_key: Vec<String>,
    pub header_page_id: PageId,
    pub first_data_page_id: PageId,
}

/// A table index's logical definition plus its root page.
#[derive(Clone, Debug, PartialEq)]
pub struct Index {
    pub name: String,
    pub table_name: String,
    pub tablespace_name: String,
    pub columns: Vec<String>,
    pub unique: bool,
    pub root_page_id: PageId,
}

fn catalog_table_specs() -> Vec<(String, Vec<ColumnDef>)> {
    let varchar = |max_length: u16| SqlType::Varchar { max_length };
    let column = |name: &str, data_type: SqlType, nullable: bool, is_primary_key: bool| ColumnDef {
        name: name.to_string(),
        data_type,
        nullable,
        is_primary_key,
    };

    vec![
        (
            "SYS_TABLESPACES".to_string(),
            vec![
                column("TABLESPACE_NAME", varchar(128), false, true),
                column("CONTAINER_PATH", varchar(512), false, false),
                column("PAGE_SIZE", SqlType::Integer, false, false),
                column("CREATION_TIME", SqlType::Integer, false, false),
            ],
        ),
        (
            "SYS_TABLES".to_string(),
            vec![
                column("TABLE_NAME", varchar(128), false, true),
                column("TABLESPACE_NAME", varchar(128), false, false),
                column("HEADER_PAGE_ID", SqlType::Integer, false, false),
                column("FIRST_DATA_PAGE_ID", SqlType::Integer, false, false),
            ],
        ),
        (
            "SYS_COLUMNS".to_string(),
            vec![
                column("TABLE_NAME", varchar(128), false, true),
                column("COLUMN_NAME", varchar(64), false, true),
                column("COLUMN_POSITION", SqlType::Integer, false, false),
                column("DATA_TYPE", SqlType::Integer, false, false),
                column("NULLABLE", SqlType::Boolean, false, false),
                column("MAX_LENGTH", SqlType::Integer, true, false),
                column("IS_PRIMARY_KEY", SqlType::Boolean, false, false),
            ],
        ),
        (
            "SYS_INDEXES".to_string(),
            vec![
                column("INDEX_NAME", varchar(128), false, true),
                column("TABLE_NAME", varchar(128), false, false),
                column("TABLESPACE_NAME", varchar(128), false, false),
                column("UNIQUE_FLAG", SqlType::Boolean, false, false),
                column("ROOT_PAGE_ID", SqlType::Integer, false, false),
            ],
        ),
        (
            "SYS_INDEX_COLUMNS".to_string(),
            vec![
                column("INDEX_NAME", varchar(128), false, true),
                column("COLUMN_NAME", varchar(64), false, true),
                column("COLUMN_POSITION", SqlType::Integer, false, false),
            ],
        ),
    ]
}

fn row_text(row: &Row, column: &str) -> DbResult<String> {
    match row.get(column) {
        Some(Value::Varchar(s)) => Ok(s.clone()),
        _ => Err(DbError::Catalog(format!("missing or wrong-typed column '{column}'"))),
    }
}

fn row_int(row: &Row, column: &str) -> DbResult<i64> {
    match row.get(column) {
        Some(Value::Integer(n)) => Ok(*n),
        _ => Err(DbError::Catalog(format!("missing or wrong-typed column '{column}'"))),
    }
}

fn row_bool(row: &Row, column: &str) -> DbResult<bool> {
    match row.get(column) {
        Some(Value::Boolean(b)) => Ok(*b),
        _ => Err(DbError::Catalog(format!("missing or wrong-typed column '{column}'"))),
    }
}

/// Allocates and stamps a header page plus an initial data page for a new
/// table, linking them, but records no catalog metadata — used both to
/// create ordinary tables and, during bootstrap, the `SYS_*` tables
/// themselves (before `SYS_TABLES`/`SYS_COLUMNS` exist to record into).
fn allocate_table_pages(pool: &Arc<BufferPool>, name: &str, columns: &[ColumnDef]) -> DbResult<Table> {
    let mut header_guard = pool.allocate_page()?;
    let header_page_number = header_guard.page_number();
    header_guard.with_page_mut(|page| -> DbResult<()> {
        let mut header = TableHeaderPage::initialize(page, name)?;
        for column in columns {
            header.add_column(column)?;
        }
        Ok(())
    })?;
    header_guard.mark_dirty();
    drop(header_guard);

    let mut data_guard = pool.allocate_page()?;
    let data_page_number = data_guard.page_number();
    data_guard.with_page_mut(|page| {
        TableDataPage::initialize(page);
    });
    data_guard.mark_dirty();
    drop(data_guard);

    let mut header_guard = pool
        .fetch_page(&PageId::new(pool.tablespace_name(), header_page_number))?
        .expect("page just allocated is resident");
    header_guard.with_page_mut(|page| TableHeaderPage::wrap(page).set_first_data_page_id(Some(data_page_number)));
    header_guard.mark_dirty();
    drop(header_guard);

    Ok(Table {
        name: name.to_string(),
        tablespace_name: pool.tablespace_name().to_string(),
        columns: columns.to_vec(),
        primary_key: columns
            .iter()
            .filter(|c| c.is_primary_key)
            .map(|c| c.name.clone())
            .collect(),
        header_page_id: PageId::new(pool.tablespace_name(), header_page_number),
        first_data_page_id: PageId::new(pool.tablespace_name(), data_page_number),
    })
}

/// Verifies the header page's magic number and `first_data_page_id` range,
/// repairing either in place if corrupt. An intentional, educational
/// resilience feature rather than a defense against concurrent writers.
fn repair_header_if_needed(pool: &BufferPool, table: &mut Table) -> DbResult<()> {
    let header_id = table.header_page_id.clone();
    let mut guard = pool
        .fetch_page(&header_id)?
        .ok_or_else(|| DbError::ContainerCorrupt(format!("header page missing for table '{}'", table.name)))?;

    let has_valid_header = guard.with_page(|page| header::read_common_header(page).is_some());
    if !has_valid_header {
        eprintln!(
            "dbcatalog: header page for table '{}' had a bad magic number; rewriting",
            table.name
        );
        guard.with_page_mut(|page| {
            let _ = TableHeaderPage::initialize(page, &table.name);
        });
        guard.mark_dirty();
    }
    drop(guard);

    let total_pages = pool.total_pages()?;
    let is_valid = |page_number: u64| page_number >= 2 && page_number < total_pages;

    // Tier 1: the header's own stored first_data_page_id is authoritative.
    let mut guard = pool.fetch_page(&header_id)?.expect("header page still resident");
    let on_disk = guard.with_page(|page| TableHeaderPage::wrap(page).first_data_page_id());
    drop(guard);

    let resolved = match on_disk {
        Some(page_number) if is_valid(page_number) => Some(page_number),
        _ => {
            // Tier 2: fall back to the in-memory Table's cached pointer.
            let cached = table.first_data_page_id.page_number;
            if is_valid(cached) {
                eprintln!(
                    "dbcatalog: table '{}' had a missing or out-of-range on-disk first_data_page_id; \
                     falling back to the cached value ({cached})",
                    table.name
                );
                Some(cached)
            } else {
                None
            }
        }
    };

    let first_data_page_number = match resolved {
        Some(page_number) => page_number,
        None => {
            // Tier 3: both the on-disk and cached pointers are unusable.
            eprintln!(
                "dbcatalog: table '{}' had no usable first_data_page_id on disk or in memory; allocating a fresh data page",
                table.name
            );
            let mut data_guard = pool.allocate_page()?;
            let new_first = data_guard.page_number();
            data_guard.with_page_mut(|page| {
                TableDataPage::initialize(page);
            });
            data_guard.mark_dirty();
            drop(data_guard);
            new_first
        }
    };

    table.first_data_page_id = PageId::new(pool.tablespace_name(), first_data_page_number);

    let mut guard = pool.fetch_page(&header_id)?.expect("header page still resident");
    let needs_rewrite = guard.with_page(|page| TableHeaderPage::wrap(page).first_data_page_id()) != Some(first_data_page_number);
    if needs_rewrite {
        guard.with_page_mut(|page| TableHeaderPage::wrap(page).set_first_data_page_id(Some(first_data_page_number)));
        guard.mark_dirty();
    }

    Ok(())
}

/// Inserts `row` into `table`, walking the chained data pages for room and
/// allocating a new one if the chain is full. Bounds the walk by the
/// tablespace's total page count to detect an (otherwise impossible, but
/// defensively guarded against) circular chain.
fn insert_row_into_table(pool: &BufferPool, table: &mut Table, row: &Row) -> DbResult<RecordId> {
    let bytes = row.encode()?;
    let needed = bytes.len() as u32 + ROW_DIRECTORY_ENTRY_SIZE as u32;

    repair_header_if_needed(pool, table)?;

    let total_pages = pool.total_pages()?;
    let mut current = table.first_data_page_id.page_number;
    let mut steps = 0u64;

    loop {
        if steps > total_pages {
            return Err(DbError::Storage(format!(
                "circular data page chain detected for table '{}'",
                table.name
            )));
        }
        steps += 1;

        let mut guard = pool
            .fetch_page(&PageId::new(pool.tablespace_name(), current))?
            .ok_or_else(|| DbError::ContainerCorrupt(format!("data page {current} missing for table '{}'", table.name)))?;

        let (slot, next_page_id) = guard.with_page_mut(|page| {
            let mut view = TableDataPage::wrap(page);
            if needed > view.free_space() {
                (None, view.next_page_id())
            } else {
                let row_count_before = view.row_count();
                let inserted = view.add_row(&bytes);
                debug_assert!(inserted, "free_space check should guarantee add_row succeeds");
                (Some(row_count_before), None)
            }
        });

        if let Some(slot) = slot {
            guard.mark_dirty();
            return Ok(RecordId {
                page_id: PageId::new(pool.tablespace_name(), current),
                slot: slot as u16,
            });
        }
        drop(guard);

        match next_page_id {
            Some(next) => current = next as u64,
            None => {
                let mut new_guard = pool.allocate_page()?;
                let new_page_number = new_guard.page_number();
                new_guard.with_page_mut(|page| {
                    TableDataPage::initialize(page);
                });
                new_guard.mark_dirty();
                drop(new_guard);

                let mut prior_guard = pool
                    .fetch_page(&PageId::new(pool.tablespace_name(), current))?
                    .expect("page just walked is still resident");
                prior_guard
                    .with_page_mut(|page| TableDataPage::wrap(page).set_next_page_id(Some(new_page_number as u32)));
                prior_guard.mark_dirty();
                drop(prior_guard);

                current = new_page_number;
            }
        }
    }
}

/// Walks a table's data-page chain end to end, decoding every row.
fn read_all_rows(pool: &Arc<BufferPool>, table: &Table) -> DbResult<Vec<Row>> {
    let mut rows = Vec::new();
    let mut current = table.first_data_page_id.page_number;
    let total_pages = pool.total_pages()?;
    let mut steps = 0u64;

    loop {
        if steps > total_pages {
            return Err(DbError::Storage(format!(
                "circular data page chain detected for table '{}'",
                table.name
            )));
        }
        steps += 1;

        let Some(mut guard) = pool.fetch_page(&PageId::new(pool.tablespace_name(), current))? else {
            break;
        };
        let (raw_rows, next) = guard.with_page_mut(|page| {
            let view = TableDataPage::wrap(page);
            (view.get_all_rows(), view.next_page_id())
        });
        drop(guard);

        for bytes in raw_rows {
            rows.push(Row::decode(&bytes)?);
        }

        match next {
            Some(next_page_number) => current = next_page_number as u64,
            None => break,
        }
    }

    Ok(rows)
}

fn read_columns_for_table(rows: &[Row], table_name: &str) -> DbResult<Vec<ColumnDef>> {
    let mut entries: Vec<(i64, ColumnDef)> = Vec::new();
    for row in rows {
        if row_text(row, "TABLE_NAME")? != table_name {
            continue;
        }
        let name = row_text(row, "COLUMN_NAME")?;
        let position = row_int(row, "COLUMN_POSITION")?;
        let type_id = row_int(row, "DATA_TYPE")? as u8;
        let nullable = row_bool(row, "NULLABLE")?;
        let max_length = match row.get("MAX_LENGTH") {
            Some(Value::Integer(n)) => *n as u16,
            _ => 0,
        };
        let is_primary_key = row_bool(row, "IS_PRIMARY_KEY")?;
        let data_type = SqlType::from_type_id(type_id, max_length)
            .ok_or_else(|| DbError::Catalog(format!("unknown type id {type_id} for column '{name}'")))?;
        entries.push((
            position,
            ColumnDef {
                name,
                data_type,
                nullable,
                is_primary_key,
            },
        ));
    }
    entries.sort_by_key(|(position, _)| *position);
    Ok(entries.into_iter().map(|(_, column)| column).collect())
}

fn read_index_columns(rows: &[Row], index_name: &str) -> DbResult<Vec<String>> {
    let mut entries: Vec<(i64, String)> = Vec::new();
    for row in rows {
        if row_text(row, "INDEX_NAME")? != index_name {
            continue;
        }
        entries.push((row_int(row, "COLUMN_POSITION")?, row_text(row, "COLUMN_NAME")?));
    }
    entries.sort_by_key(|(position, _)| *position);
    Ok(entries.into_iter().map(|(_, name)| name).collect())
}

/// Manages the `SYSTEM` tablespace's five catalog tables and the in-memory
/// index of table/index definitions built from them.
pub struct SchemaManager {
    tables: Map<String, Table>,
    indexes: Map<String, Index>,
}

impl SchemaManager {
    /// Initializes the catalog tables if page 2 of the `SYSTEM` tablespace
    /// is uninitialized, otherwise reconstructs the in-memory index from
    /// the existing `SYS_*` rows.
    pub fn bootstrap(pools: &Map<String, Arc<BufferPool>>) -> DbResult<Self> {
        let system_pool = pools
            .get(SYSTEM_TABLESPACE)
            .ok_or_else(|| DbError::Catalog("SYSTEM tablespace is not registered".into()))?;

        let mut manager = Self {
            tables: Map::default(),
            indexes: Map::default(),
        };

        let page_two_tag = system_pool
            .fetch_page(&PageId::new(SYSTEM_TABLESPACE, 2))?
            .map(|guard| guard.with_page(LayoutFactory::identify));

        match page_two_tag {
            Some(LayoutTag::TableHeader) => manager.load_existing(system_pool)?,
            _ => manager.create_catalog_tables(system_pool)?,
        }

        Ok(manager)
    }

    fn create_catalog_tables(&mut self, system_pool: &Arc<BufferPool>) -> DbResult<()> {
        let mut created = Vec::new();
        for (name, columns) in catalog_table_specs() {
            let table = allocate_table_pages(system_pool, &name, &columns)?;
            created.push(table);
        }
        for table in &created {
            self.tables.insert(table.name.clone(), table.clone());
        }
        for table in &created {
            self.record_table_metadata(system_pool, table)?;
        }
        system_pool.flush_all()?;
        Ok(())
    }

    fn load_existing(&mut self, system_pool: &Arc<BufferPool>) -> DbResult<()> {
        for (index, (name, columns)) in catalog_table_specs().into_iter().enumerate() {
            let header_page_number = 2 + index as u64 * 2;
            let data_page_number = header_page_number + 1;
            let primary_key = columns.iter().filter(|c| c.is_primary_key).map(|c| c.name.clone()).collect();
            self.tables.insert(
                name.clone(),
                Table {
                    name,
                    tablespace_name: SYSTEM_TABLESPACE.to_string(),
                    columns,
                    primary_key,
                    header_page_id: PageId::new(SYSTEM_TABLESPACE, header_page_number),
                    first_data_page_id: PageId::new(SYSTEM_TABLESPACE, data_page_number),
                },
            );
        }

        let sys_tables = self.tables.get("SYS_TABLES").expect("just inserted").clone();
        let sys_tables_rows = read_all_rows(system_pool, &sys_tables)?;
        let sys_columns = self.tables.get("SYS_COLUMNS").expect("just inserted").clone();
        let sys_columns_rows = read_all_rows(system_pool, &sys_columns)?;

        for row in &sys_tables_rows {
            let name = row_text(row, "TABLE_NAME")?;
            if self.tables.contains_key(&name) {
                continue;
            }
            let tablespace_name = row_text(row, "TABLESPACE_NAME")?;
            let header_page_number = row_int(row, "HEADER_PAGE_ID")? as u64;
            let first_data_page_number = row_int(row, "FIRST_DATA_PAGE_ID")? as u64;
            let columns = read_columns_for_table(&sys_columns_rows, &name)?;
            let primary_key = columns.iter().filter(|c| c.is_primary_key).map(|c| c.name.clone()).collect();

            self.tables.insert(
                name.clone(),
                Table {
                    name,
                    tablespace_name: tablespace_name.clone(),
                    columns,
                    primary_key,
                    header_page_id: PageId::new(&tablespace_name, header_page_number),
                    first_data_page_id: PageId::new(&tablespace_name, first_data_page_number),
                },
            );
        }

        let sys_indexes = self.tables.get("SYS_INDEXES").expect("just inserted").clone();
        let sys_indexes_rows = read_all_rows(system_pool, &sys_indexes)?;
        let sys_index_columns = self.tables.get("SYS_INDEX_COLUMNS").expect("just inserted").clone();
        let sys_index_columns_rows = read_all_rows(system_pool, &sys_index_columns)?;

        for row in &sys_indexes_rows {
            let name = row_text(row, "INDEX_NAME")?;
            let table_name = row_text(row, "TABLE_NAME")?;
            let tablespace_name = row_text(row, "TABLESPACE_NAME")?;
            let unique = row_bool(row, "UNIQUE_FLAG")?;
            let root_page_number = row_int(row, "ROOT_PAGE_ID")? as u64;
            let columns = read_index_columns(&sys_index_columns_rows, &name)?;

            self.indexes.insert(
                name.clone(),
                Index {
                    name,
                    table_name,
                    tablespace_name: tablespace_name.clone(),
                    columns,
                    unique,
                    root_page_id: PageId::new(&tablespace_name, root_page_number),
                },
            );
        }

        Ok(())
    }

    fn record_table_metadata(&mut self, system_pool: &Arc<BufferPool>, table: &Table) -> DbResult<()> {
        let row = Row::new(vec![
            ("TABLE_NAME".into(), Value::Varchar(table.name.clone())),
            ("TABLESPACE_NAME".into(), Value::Varchar(table.tablespace_name.clone())),
            ("HEADER_PAGE_ID".into(), Value::Integer(table.header_page_id.page_number as i64)),
            (
                "FIRST_DATA_PAGE_ID".into(),
                Value::Integer(table.first_data_page_id.page_number as i64),
            ),
        ]);
        let sys_tables = self.tables.get_mut("SYS_TABLES").expect("SYS_TABLES exists");
        insert_row_into_table(system_pool, sys_tables, &row)?;

        for (position, column) in table.columns.iter().enumerate() {
            let max_length = match column.data_type {
                SqlType::Varchar { max_length } => Value::Integer(max_length as i64),
                _ => Value::Null,
            };
            let row = Row::new(vec![
                ("TABLE_NAME".into(), Value::Varchar(table.name.clone())),
                ("COLUMN_NAME".into(), Value::Varchar(column.name.clone())),
                ("COLUMN_POSITION".into(), Value::Integer(position as i64)),
                ("DATA_TYPE".into(), Value::Integer(column.data_type.type_id() as i64)),
                ("NULLABLE".into(), Value::Boolean(column.nullable)),
                ("MAX_LENGTH".into(), max_length),
                ("IS_PRIMARY_KEY".into(), Value::Boolean(column.is_primary_key)),
            ]);
            let sys_columns = self.tables.get_mut("SYS_COLUMNS").expect("SYS_COLUMNS exists");
            insert_row_into_table(system_pool, sys_columns, &row)?;
        }
        Ok(())
    }

    fn record_index_metadata(&mut self, system_pool: &Arc<BufferPool>, index: &Index) -> DbResult<()> {
        let row = Row::new(vec![
            ("INDEX_NAME".into(), Value::Varchar(index.name.clone())),
            ("TABLE_NAME".into(), Value::Varchar(index.table_name.clone())),
            ("TABLESPACE_NAME".into(), Value::Varchar(index.tablespace_name.clone())),
            ("UNIQUE_FLAG".into(), Value::Boolean(index.unique)),
            ("ROOT_PAGE_ID".into(), Value::Integer(index.root_page_id.page_number as i64)),
        ]);
        let sys_indexes = self.tables.get_mut("SYS_INDEXES").expect("SYS_INDEXES exists");
        insert_row_into_table(system_pool, sys_indexes, &row)?;

        for (position, column) in index.columns.iter().enumerate() {
            let row = Row::new(vec![
                ("INDEX_NAME".into(), Value::Varchar(index.name.clone())),
                ("COLUMN_NAME".into(), Value::Varchar(column.clone())),
                ("COLUMN_POSITION".into(), Value::Integer(position as i64)),
            ]);
            let sys_index_columns = self.tables.get_mut("SYS_INDEX_COLUMNS").expect("SYS_INDEX_COLUMNS exists");
            insert_row_into_table(system_pool, sys_index_columns, &row)?;
        }
        Ok(())
    }

    pub fn record_tablespace(&mut self, pools: &Map<String, Arc<BufferPool>>, row: Row) -> DbResult<()> {
        let system_pool = pools.get(SYSTEM_TABLESPACE).expect("SYSTEM pool always registered");
        let sys_tablespaces = self.tables.get_mut("SYS_TABLESPACES").expect("SYS_TABLESPACES exists");
        insert_row_into_table(system_pool, sys_tablespaces, &row)?;
        system_pool.flush_all()?;
        Ok(())
    }

    pub fn create_table(
        &mut self,
        pools: &Map<String, Arc<BufferPool>>,
        name: &str,
        tablespace_name: &str,
        columns: Vec<ColumnDef>,
        primary_key: Vec<String>,
    ) -> DbResult<Table> {
        if self.tables.contains_key(name) {
            return Err(DbError::Catalog(format!("table '{name}' already exists")));
        }
        let pool = pools
            .get(tablespace_name)
            .ok_or_else(|| DbError::Catalog(format!("unknown tablespace '{tablespace_name}'")))?;

        let mut table = allocate_table_pages(pool, name, &columns)?;
        table.primary_key = primary_key;
        self.tables.insert(table.name.clone(), table.clone());

        let system_pool = pools.get(SYSTEM_TABLESPACE).expect("SYSTEM pool always registered");
        self.record_table_metadata(system_pool, &table)?;
        pool.flush_all()?;
        if !Arc::ptr_eq(pool, system_pool) {
            system_pool.flush_all()?;
        }
        Ok(table)
    }

    pub fn create_index(
        &mut self,
        pools: &Map<String, Arc<BufferPool>>,
        name: &str,
        table_name: &str,
        columns: Vec<String>,
        unique: bool,
    ) -> DbResult<Index> {
        if self.indexes.contains_key(name) {
            return Err(DbError::Catalog(format!("index '{name}' already exists")));
        }
        if columns.is_empty() {
            return Err(DbError::Catalog("index must reference at least one column".into()));
        }
        let table = self
            .tables
            .get(table_name)
            .ok_or_else(|| DbError::Catalog(format!("unknown table '{table_name}'")))?
            .clone();
        for column in &columns {
            if !table.columns.iter().any(|c| &c.name == column) {
                return Err(DbError::Catalog(format!(
                    "unknown column '{column}' on table '{table_name}'"
                )));
            }
        }

        let pool = pools
            .get(&table.tablespace_name)
            .ok_or_else(|| DbError::Catalog(format!("unknown tablespace '{}'", table.tablespace_name)))?;

        let key_type = table
            .columns
            .iter()
            .find(|c| c.name == columns[0])
            .expect("column presence checked above")
            .data_type;

        let mut root_guard = pool.allocate_page()?;
        let root_page_number = root_guard.page_number();
        root_guard.with_page_mut(|page| {
            IndexPage::initialize_root(page, key_type);
        });
        root_guard.mark_dirty();
        drop(root_guard);

        let index = Index {
            name: name.to_string(),
            table_name: table_name.to_string(),
            tablespace_name: table.tablespace_name.clone(),
            columns,
            unique,
            root_page_id: PageId::new(&table.tablespace_name, root_page_number),
        };
        self.indexes.insert(index.name.clone(), index.clone());

        let system_pool = pools.get(SYSTEM_TABLESPACE).expect("SYSTEM pool always registered");
        self.record_index_metadata(system_pool, &index)?;
        system_pool.flush_all()?;
        Ok(index)
    }

    pub fn insert_row(&mut self, pools: &Map<String, Arc<BufferPool>>, table_name: &str, row: Row) -> DbResult<RecordId> {
        let tablespace_name = self
            .tables
            .get(table_name)
            .ok_or_else(|| DbError::Catalog(format!("unknown table '{table_name}'")))?
            .tablespace_name
            .clone();
        let pool = pools
            .get(&tablespace_name)
            .ok_or_else(|| DbError::Catalog(format!("unknown tablespace '{tablespace_name}'")))?
            .clone();
        let table = self.tables.get_mut(table_name).expect("checked above");
        insert_row_into_table(&pool, table, &row)
    }

    pub fn get_table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    pub fn get_index(&self, name: &str) -> Option<&Index> {
        self.indexes.get(name)
    }

    pub fn all_tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.values()
    }

    pub fn all_indexes(&self) -> impl Iterator<Item = &Index> {
        self.indexes.values()
    }

    /// Removes the table's catalog registration. Rows already written to its
    /// data pages are left in place as a tombstone — the educational system
    /// does not implement physical space reclamation (see `DESIGN.md`).
    pub fn drop_table(&mut self, name: &str) -> DbResult<()> {
        if self.tables.remove(name).is_none() {
            return Err(DbError::Catalog(format!("unknown table '{name}'")));
        }
        self.indexes.retain(|_, index| index.table_name != name);
        Ok(())
    }

    pub fn drop_index(&mut self, name: &str) -> DbResult<()> {
        self.indexes
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| DbError::Catalog(format!("unknown index '{name}'")))
    }
}

/// Front door tying a set of tablespaces, their buffer pools, and the
/// [`SchemaManager`] together.
pub struct Engine {
    config: StorageConfig,
    pools: Map<String, Arc<BufferPool>>,
    schema: SchemaManager,
}

impl Engine {
    /// Opens (or creates) the `SYSTEM` tablespace under `config.data_dir`
    /// and bootstraps the catalog.
    pub fn open(config: StorageConfig) -> DbResult<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        let system_path = config.data_dir.join(format!("{SYSTEM_TABLESPACE}.dat"));

        let system_tablespace = if system_path.exists() {
            Tablespace::open(SYSTEM_TABLESPACE, &system_path, config.page_size)?
        } else {
            // 2 bookkeeping pages + (header, data) per catalog table, 5 tables.
            Tablespace::create(SYSTEM_TABLESPACE, &system_path, config.page_size, 2 + 5 * 2)?
        };

        let mut pools = Map::default();
        let system_pool = Self::wrap_pool(system_tablespace, &config);
        pools.insert(SYSTEM_TABLESPACE.to_string(), system_pool);

        let schema = SchemaManager::bootstrap(&pools)?;

        Ok(Self { config, pools, schema })
    }

    fn wrap_pool(tablespace: Tablespace, config: &StorageConfig) -> Arc<BufferPool> {
        let pool = Arc::new(BufferPool::new(
            tablespace,
            config.buffer_pool_pages,
            config.pin_tracking_enabled,
        ));
        pool.start_cleaner(PageCleanerConfig {
            enabled: config.cleaner_enabled,
            check_interval: Duration::from_millis(config.cleaner_interval_ms),
            dirty_page_threshold: config.cleaner_dirty_threshold,
        });
        pool
    }

    /// Creates a new tablespace and records it in `SYS_TABLESPACES`. Returns
    /// `false` without creating anything if the name is already registered.
    pub fn create_tablespace(&mut self, name: &str, initial_pages: u64) -> DbResult<bool> {
        if self.pools.contains_key(name) {
            return Ok(false);
        }
        let path = self.config.data_dir.join(format!("{name}.dat"));
        let tablespace = Tablespace::create(name, &path, self.config.page_size, initial_pages)?;
        let pool = Self::wrap_pool(tablespace, &self.config);
        self.pools.insert(name.to_string(), pool);

        let row = Row::new(vec![
            ("TABLESPACE_NAME".into(), Value::Varchar(name.to_string())),
            ("CONTAINER_PATH".into(), Value::Varchar(path.display().to_string())),
            ("PAGE_SIZE".into(), Value::Integer(self.config.page_size as i64)),
            ("CREATION_TIME".into(), Value::Integer(now_ms() as i64)),
        ]);
        self.schema.record_tablespace(&self.pools, row)?;

        Ok(true)
    }

    pub fn get_buffer_pool(&self, tablespace_name: &str) -> Option<&Arc<BufferPool>> {
        self.pools.get(tablespace_name)
    }

    pub fn all_tablespace_names(&self) -> Vec<String> {
        self.pools.keys().cloned().collect()
    }

    pub fn create_table(
        &mut self,
        name: &str,
        tablespace_name: &str,
        columns: Vec<ColumnDef>,
        primary_key: Vec<String>,
    ) -> DbResult<Table> {
        self.schema.create_table(&self.pools, name, tablespace_name, columns, primary_key)
    }

    pub fn create_index(&mut self, name: &str, table_name: &str, columns: Vec<String>, unique: bool) -> DbResult<Index> {
        self.schema.create_index(&self.pools, name, table_name, columns, unique)
    }

    pub fn insert_row(&mut self, table_name: &str, row: Row) -> DbResult<RecordId> {
        self.schema.insert_row(&self.pools, table_name, row)
    }

    pub fn get_table(&self, name: &str) -> Option<&Table> {
        self.schema.get_table(name)
    }

    pub fn get_index(&self, name: &str) -> Option<&Index> {
        self.schema.get_index(name)
    }

    pub fn all_tables(&self) -> impl Iterator<Item = &Table> {
        self.schema.all_tables()
    }

    pub fn all_indexes(&self) -> impl Iterator<Item = &Index> {
        self.schema.all_indexes()
    }

    pub fn drop_table(&mut self, name: &str) -> DbResult<()> {
        self.schema.drop_table(name)
    }

    pub fn drop_index(&mut self, name: &str) -> DbResult<()> {
        self.schema.drop_index(name)
    }

    pub fn shutdown(&mut self) -> DbResult<()> {
        for pool in self.pools.values() {
            pool.shutdown()?;
        }
        Ok(())
    }
}
