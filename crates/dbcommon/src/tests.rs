use super::*;
use dbtypes::Value;
use std::io;

#[test]
fn config_defaults_are_sane() {
    let cfg = StorageConfig::default();
    assert_eq!(cfg.page_size, 4096);
    assert_eq!(cfg.buffer_pool_pages, 256);
    assert!(cfg.cleaner_enabled);
    assert_eq!(cfg.cleaner_dirty_threshold, 10);
}

#[test]
fn builder_overrides_defaults() {
    let cfg = StorageConfig::builder()
        .page_size(8192)
        .buffer_pool_pages(16)
        .cleaner_enabled(false)
        .build();
    assert_eq!(cfg.page_size, 8192);
    assert_eq!(cfg.buffer_pool_pages, 16);
    assert!(!cfg.cleaner_enabled);
}

#[test]
fn db_error_formats_cleanly() {
    let err = DbError::Storage("corruption".into());
    assert!(format!("{err}").contains("storage"));

    let err = DbError::WrongTablespace {
        expected: "T1".into(),
        actual: "T2".into(),
        page_number: 4,
    };
    assert!(format!("{err}").contains("T1"));
    assert!(format!("{err}").contains("T2"));
}

#[test]
fn io_error_converts() {
    let e = io::Error::other("oops");
    let db_err: DbError = e.into();
    assert!(matches!(db_err, DbError::Io(_)));
}

#[test]
fn row_round_trips_through_encode_decode() {
    let row = Row::new(vec![
        ("id".into(), Value::Integer(1)),
        ("name".into(), Value::Varchar("Ada".into())),
        ("active".into(), Value::Boolean(true)),
        ("score".into(), Value::Null),
    ]);

    let bytes = row.encode().unwrap();
    let decoded = Row::decode(&bytes).unwrap();

    assert_eq!(row, decoded);
    assert_eq!(decoded.get("name"), Some(&Value::Varchar("Ada".into())));
    assert_eq!(decoded.get("missing"), None);
}

#[test]
fn page_id_equality_is_component_wise() {
    let a = PageId::new("T1", 2);
    let b = PageId::new("T1", 2);
    let c = PageId::new("T2", 2);
    assert_eq!(a, b);
    assert_ne!(a, c);
}
