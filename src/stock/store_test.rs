use tempfile::tempdir;

use super::*;
use crate::StorageBackendKind;
use crate::StorageConfig;

fn exercise_store(store: &dyn StockStore) {
    assert!(store.find_by_id(1).unwrap().is_none());

    store.save(&StockRecord::new(1, 100)).unwrap();
    store.save(&StockRecord::new(2, 5)).unwrap();
    assert_eq!(store.find_by_id(1).unwrap(), Some(StockRecord::new(1, 100)));

    // save overwrites
    store.save(&StockRecord::new(1, 99)).unwrap();
    assert_eq!(store.find_by_id(1).unwrap().map(|r| r.quantity()), Some(99));
    assert_eq!(store.find_by_id(2).unwrap().map(|r| r.quantity()), Some(5));

    store.delete_all().unwrap();
    assert!(store.find_by_id(1).unwrap().is_none());
    assert!(store.find_by_id(2).unwrap().is_none());
}

#[test]
fn test_mem_store_operations() {
    let store = MemStockStore::new();
    exercise_store(&store);
    assert!(store.is_empty());
}

#[test]
fn test_sled_store_operations() {
    let dir = tempdir().unwrap();
    let store = SledStockStore::open(dir.path().join("db")).unwrap();
    exercise_store(&store);
}

#[test]
fn test_sled_stores_on_one_db_share_records() {
    let dir = tempdir().unwrap();
    let db = sled::open(dir.path().join("db")).unwrap();
    let writer = SledStockStore::with_db(db.clone()).unwrap();
    let reader = SledStockStore::with_db(db).unwrap();

    writer.save(&StockRecord::new(7, 42)).unwrap();
    assert!(writer.flush().is_ok());

    assert_eq!(reader.find_by_id(7).unwrap(), Some(StockRecord::new(7, 42)));
}

#[test]
fn test_sled_store_reports_corrupt_record() {
    let dir = tempdir().unwrap();
    let db = sled::open(dir.path().join("db")).unwrap();
    let tree = db.open_tree(crate::constants::STOCK_TREE_NAMESPACE).unwrap();
    tree.insert(3u64.to_be_bytes(), vec![1u8]).unwrap();
    let store = SledStockStore::with_db(db).unwrap();

    let err = store.find_by_id(3).unwrap_err();

    assert!(matches!(
        err,
        crate::Error::System(crate::SystemError::Storage(crate::StorageError::BincodeError(_)))
    ));
}

#[test]
fn test_build_store_selects_backend() {
    let memory = build_store(&StorageConfig::default()).unwrap();
    memory.save(&StockRecord::new(1, 1)).unwrap();
    assert!(memory.find_by_id(1).unwrap().is_some());

    let dir = tempdir().unwrap();
    let sled = build_store(&StorageConfig {
        backend: StorageBackendKind::Sled,
        db_path: Some(dir.path().join("db")),
    })
    .unwrap();
    sled.save(&StockRecord::new(1, 1)).unwrap();
    assert!(sled.find_by_id(1).unwrap().is_some());
}
