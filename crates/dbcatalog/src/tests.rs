use tempfile::tempdir;

use dbcommon::{Row, StorageConfig};
use dbstorage::layout::TableDataPage;
use dbtypes::{SqlType, Value};

use super::*;

fn engine_in(dir: &tempfile::TempDir) -> Engine {
    let config = StorageConfig::builder()
        .data_dir(dir.path().to_path_buf())
        .page_size(4096)
        .buffer_pool_pages(64)
        .cleaner_enabled(false)
        .build();
    Engine::open(config).unwrap()
}

#[test]
fn bootstrap_lays_out_fixed_system_pages() {
    let dir = tempdir().unwrap();
    let engine = engine_in(&dir);

    let expected = [
        ("SYS_TABLESPACES", 2u64, 3u64),
        ("SYS_TABLES", 4, 5),
        ("SYS_COLUMNS", 6, 7),
        ("SYS_INDEXES", 8, 9),
        ("SYS_INDEX_COLUMNS", 10, 11),
    ];
    for (name, header_page, data_page) in expected {
        let table = engine.get_table(name).unwrap_or_else(|| panic!("{name} missing"));
        assert_eq!(table.header_page_id.page_number, header_page);
        assert_eq!(table.first_data_page_id.page_number, data_page);
        assert_eq!(table.tablespace_name, SYSTEM_TABLESPACE);
    }
}

#[test]
fn reopen_is_idempotent_and_does_not_duplicate_catalog_tables() {
    let dir = tempdir().unwrap();
    {
        let mut engine = engine_in(&dir);
        engine.shutdown().unwrap();
    }
    let engine = engine_in(&dir);
    assert_eq!(engine.all_tables().count(), 5);
}

#[test]
fn create_table_rejects_duplicate_name() {
    let dir = tempdir().unwrap();
    let mut engine = engine_in(&dir);
    engine.create_tablespace("APP", 4).unwrap();
    let columns = vec![ColumnDef {
        name: "id".into(),
        data_type: SqlType::Integer,
        nullable: false,
        is_primary_key: true,
    }];
    engine
        .create_table("widgets", "APP", columns.clone(), vec!["id".into()])
        .unwrap();
    let err = engine.create_table("widgets", "APP", columns, vec!["id".into()]).unwrap_err();
    assert!(matches!(err, DbError::Catalog(_)));
}

#[test]
fn reopen_rebuilds_catalog_from_existing_rows() {
    let dir = tempdir().unwrap();
    {
        let mut engine = engine_in(&dir);
        engine.create_tablespace("APP", 4).unwrap();
        engine
            .create_table(
                "widgets",
                "APP",
                vec![
                    ColumnDef {
                        name: "id".into(),
                        data_type: SqlType::Integer,
                        nullable: false,
                        is_primary_key: true,
                    },
                    ColumnDef {
                        name: "label".into(),
                        data_type: SqlType::Varchar { max_length: 64 },
                        nullable: true,
                        is_primary_key: false,
                    },
                ],
                vec!["id".into()],
            )
            .unwrap();
        engine
            .create_index("widgets_by_label", "widgets", vec!["label".into()], false)
            .unwrap();
        engine
            .insert_row(
                "widgets",
                Row::new(vec![
                    ("id".into(), Value::Integer(1)),
                    ("label".into(), Value::Varchar("first".into())),
                ]),
            )
            .unwrap();
        engine.shutdown().unwrap();
    }

    let engine = engine_in(&dir);

    let table = engine.get_table("widgets").expect("table survives reopen");
    assert_eq!(table.tablespace_name, "APP");
    assert_eq!(table.columns.len(), 2);
    assert_eq!(table.primary_key, vec!["id".to_string()]);

    let index = engine.get_index("widgets_by_label").expect("index survives reopen");
    assert_eq!(index.columns, vec!["label".to_string()]);
    assert!(!index.unique);

    let pool = engine.get_buffer_pool("APP").unwrap();
    let rows = read_all_rows(pool, table).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("label"), Some(&Value::Varchar("first".into())));
}

#[test]
fn row_chaining_spills_into_new_data_page() {
    // S6
    let dir = tempdir().unwrap();
    let mut engine = engine_in(&dir);
    engine.create_tablespace("APP", 4).unwrap();
    engine
        .create_table(
            "blobs",
            "APP",
            vec![ColumnDef {
                name: "payload".into(),
                data_type: SqlType::Varchar { max_length: 2000 },
                nullable: false,
                is_primary_key: false,
            }],
            vec![],
        )
        .unwrap();

    let payload = "x".repeat(900);
    for _ in 0..6 {
        engine
            .insert_row(
                "blobs",
                Row::new(vec![("payload".into(), Value::Varchar(payload.clone()))]),
            )
            .unwrap();
    }

    let table = engine.get_table("blobs").unwrap().clone();
    let pool = engine.get_buffer_pool("APP").unwrap();
    let rows = read_all_rows(pool, &table).unwrap();
    assert_eq!(rows.len(), 6);

    let mut first_page_guard = pool.fetch_page(&table.first_data_page_id).unwrap().unwrap();
    let next = first_page_guard.with_page_mut(|page| TableDataPage::wrap(page).next_page_id());
    assert!(next.is_some(), "six ~900-byte rows should overflow a single 4096-byte page");
}

#[test]
fn drop_table_removes_catalog_entry_but_leaves_rows_on_disk() {
    let dir = tempdir().unwrap();
    let mut engine = engine_in(&dir);
    engine.create_tablespace("APP", 4).unwrap();
    engine
        .create_table(
            "scratch",
            "APP",
            vec![ColumnDef {
                name: "id".into(),
                data_type: SqlType::Integer,
                nullable: false,
                is_primary_key: true,
            }],
            vec!["id".into()],
        )
        .unwrap();
    engine
        .insert_row("scratch", Row::new(vec![("id".into(), Value::Integer(7))]))
        .unwrap();

    let first_data_page_id = engine.get_table("scratch").unwrap().first_data_page_id.clone();
    engine.drop_table("scratch").unwrap();
    assert!(engine.get_table("scratch").is_none());

    let pool = engine.get_buffer_pool("APP").unwrap();
    let mut guard = pool.fetch_page(&first_data_page_id).unwrap().unwrap();
    let row_count = guard.with_page_mut(|page| TableDataPage::wrap(page).row_count());
    assert_eq!(row_count, 1, "dropping a table must not physically erase its rows");
}

#[test]
fn drop_table_cascades_to_its_indexes() {
    let dir = tempdir().unwrap();
    let mut engine = engine_in(&dir);
    engine.create_tablespace("APP", 4).unwrap();
    engine
        .create_table(
            "scratch",
            "APP",
            vec![ColumnDef {
                name: "id".into(),
                data_type: SqlType::Integer,
                nullable: false,
                is_primary_key: true,
            }],
            vec!["id".into()],
        )
        .unwrap();
    engine.create_index("scratch_by_id", "scratch", vec!["id".into()], true).unwrap();

    engine.drop_table("scratch").unwrap();
    assert!(engine.get_index("scratch_by_id").is_none());
}

#[test]
fn create_tablespace_is_idempotent_by_name() {
    let dir = tempdir().unwrap();
    let mut engine = engine_in(&dir);
    assert!(engine.create_tablespace("APP", 4).unwrap());
    assert!(!engine.create_tablespace("APP", 4).unwrap());
    assert_eq!(engine.all_tablespace_names().len(), 2); // SYSTEM + APP
}

fn scratch_table(engine: &mut Engine) -> Table {
    engine.create_tablespace("APP", 4).unwrap();
    engine
        .create_table(
            "scratch",
            "APP",
            vec![ColumnDef {
                name: "id".into(),
                data_type: SqlType::Integer,
                nullable: false,
                is_primary_key: true,
            }],
            vec!["id".into()],
        )
        .unwrap();
    engine.get_table("scratch").unwrap().clone()
}

#[test]
fn repair_rewrites_a_header_with_a_bad_magic_number() {
    let dir = tempdir().unwrap();
    let mut engine = engine_in(&dir);
    let mut table = scratch_table(&mut engine);
    let pool = engine.get_buffer_pool("APP").unwrap().clone();

    {
        let mut guard = pool.fetch_page(&table.header_page_id).unwrap().unwrap();
        guard.with_page_mut(|page| page.buffer_mut()[1] = 0);
        guard.mark_dirty();
    }

    repair_header_if_needed(&pool, &mut table).unwrap();

    let guard = pool.fetch_page(&table.header_page_id).unwrap().unwrap();
    assert!(guard.with_page(|page| header::read_common_header(page).is_some()));
}

#[test]
fn repair_falls_back_to_cached_pointer_when_on_disk_pointer_is_corrupt() {
    // Tier 2: the on-disk first_data_page_id is out of range, but the
    // in-memory Table's cached pointer still points at a valid page.
    let dir = tempdir().unwrap();
    let mut engine = engine_in(&dir);
    let mut table = scratch_table(&mut engine);
    let pool = engine.get_buffer_pool("APP").unwrap().clone();
    let cached = table.first_data_page_id.page_number;

    {
        let mut guard = pool.fetch_page(&table.header_page_id).unwrap().unwrap();
        guard.with_page_mut(|page| TableHeaderPage::wrap(page).set_first_data_page_id(Some(9999)));
        guard.mark_dirty();
    }

    repair_header_if_needed(&pool, &mut table).unwrap();

    assert_eq!(table.first_data_page_id.page_number, cached);
    let guard = pool.fetch_page(&table.header_page_id).unwrap().unwrap();
    let on_disk = guard.with_page(|page| TableHeaderPage::wrap(page).first_data_page_id());
    assert_eq!(on_disk, Some(cached));
}

#[test]
fn repair_allocates_a_fresh_page_when_both_pointers_are_invalid() {
    // Tier 3: neither the on-disk nor the cached first_data_page_id is usable.
    let dir = tempdir().unwrap();
    let mut engine = engine_in(&dir);
    let mut table = scratch_table(&mut engine);
    let pool = engine.get_buffer_pool("APP").unwrap().clone();

    {
        let mut guard = pool.fetch_page(&table.header_page_id).unwrap().unwrap();
        guard.with_page_mut(|page| TableHeaderPage::wrap(page).set_first_data_page_id(Some(9999)));
        guard.mark_dirty();
    }
    table.first_data_page_id = PageId::new("APP", 9999);

    repair_header_if_needed(&pool, &mut table).unwrap();

    let total_pages = pool.total_pages().unwrap();
    assert!(table.first_data_page_id.page_number >= 2 && table.first_data_page_id.page_number < total_pages);
    let guard = pool.fetch_page(&table.header_page_id).unwrap().unwrap();
    let on_disk = guard.with_page(|page| TableHeaderPage::wrap(page).first_data_page_id());
    assert_eq!(on_disk, Some(table.first_data_page_id.page_number));
}
