// Integration tests: database-level CRUD over real files
use a2zdb_core::{A2zError, Database};
use serde_json::{json, Map, Value};
use tempfile::TempDir;

fn q(value: Value) -> Map<String, Value> {
    value.as_object().unwrap().clone()
}

fn open(dir: &TempDir, name: &str) -> Database {
    Database::open(name, dir.path()).unwrap()
}

#[test]
fn test_basic_crud_scenario() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let db = open(&dir, "store");
    db.create_collection("items", None)?;

    db.insert_one("items", json!({"_id": "a", "price": 10}))?;
    db.insert_one("items", json!({"_id": "b", "price": 20}))?;

    let expensive = db.find("items", Some(&q(json!({"price": {"$gt": 10}}))))?;
    assert_eq!(expensive.len(), 1);
    assert_eq!(expensive[0].id(), "b");
    assert_eq!(expensive[0].get("price"), Some(&json!(20)));

    let changed = db.update_one("items", &q(json!({"_id": "a"})), &q(json!({"$set": {"price": 15}})))?;
    assert!(changed);

    let all = db.find("items", None)?;
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].id(), "a");
    assert_eq!(all[0].get("price"), Some(&json!(15)));
    assert_eq!(all[1].get("price"), Some(&json!(20)));
    Ok(())
}

#[test]
fn test_insert_with_explicit_id_roundtrip() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let db = open(&dir, "store");
    db.create_collection("items", None)?;

    db.insert_one("items", json!({"_id": "d1", "nested": {"k": [1, 2]}}))?;
    let results = db.find("items", Some(&q(json!({"_id": "d1"}))))?;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].get("nested"), Some(&json!({"k": [1, 2]})));
    Ok(())
}

#[test]
fn test_set_unset_idempotent() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let db = open(&dir, "store");
    db.create_collection("items", None)?;
    db.insert_one("items", json!({"_id": "a", "keep": 1, "drop": 2}))?;

    for _ in 0..2 {
        db.update_one("items", &q(json!({"_id": "a"})), &q(json!({"$set": {"keep": 9}})))?;
    }
    let after_set = db.find_one("items", &q(json!({"_id": "a"})))?.unwrap();
    assert_eq!(after_set.get("keep"), Some(&json!(9)));

    for _ in 0..2 {
        db.update_one("items", &q(json!({"_id": "a"})), &q(json!({"$unset": ["drop"]})))?;
    }
    let after_unset = db.find_one("items", &q(json!({"_id": "a"})))?.unwrap();
    assert!(!after_unset.contains("drop"));
    Ok(())
}

#[test]
fn test_push_operator_end_to_end() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let db = open(&dir, "store");
    db.create_collection("items", None)?;
    db.insert_one("items", json!({"_id": "a"}))?;

    db.update_one("items", &q(json!({"_id": "a"})), &q(json!({"$push": {"tags": "x"}})))?;
    db.update_one("items", &q(json!({"_id": "a"})), &q(json!({"$push": {"tags": "y"}})))?;
    let doc = db.find_one("items", &q(json!({"_id": "a"})))?.unwrap();
    assert_eq!(doc.get("tags"), Some(&json!(["x", "y"])));

    // Pushing into a scalar field is a validation error
    db.update_one("items", &q(json!({"_id": "a"})), &q(json!({"$set": {"count": 2}})))?;
    let result =
        db.update_one("items", &q(json!({"_id": "a"})), &q(json!({"$push": {"count": 1}})));
    assert!(matches!(result, Err(A2zError::Validation(_))));
    // The failed push left the document untouched
    let doc = db.find_one("items", &q(json!({"_id": "a"})))?.unwrap();
    assert_eq!(doc.get("count"), Some(&json!(2)));
    Ok(())
}

#[test]
fn test_on_disk_layout() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let db = open(&dir, "store");
    db.create_collection("items", None)?;
    db.insert_one("items", json!({"_id": "a", "n": 1}))?;

    let collection_file = dir.path().join("store").join("items.json");
    assert!(collection_file.exists());
    assert!(dir.path().join("store").join(".transactions").is_dir());

    // Collection file is a well-formed JSON array of documents
    let parsed: Vec<Value> = serde_json::from_str(&std::fs::read_to_string(collection_file)?)?;
    assert_eq!(parsed.len(), 1);
    assert_eq!(parsed[0]["_id"], json!("a"));
    Ok(())
}

#[test]
fn test_mutations_visible_after_return() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let db = open(&dir, "store");
    db.create_collection("items", None)?;

    let ids = db.insert_many(
        "items",
        vec![json!({"n": 1}), json!({"n": 2}), json!({"n": 3})],
    )?;
    assert_eq!(ids.len(), 3);
    assert_eq!(db.count_documents("items", None)?, 3);

    let deleted = db.delete_many("items", &q(json!({"n": {"$lt": 3}})))?;
    assert_eq!(deleted, 2);
    assert_eq!(db.count_documents("items", None)?, 1);
    Ok(())
}

#[test]
fn test_find_one_returns_first_in_sequence_order() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let db = open(&dir, "store");
    db.create_collection("items", None)?;
    db.insert_many(
        "items",
        vec![
            json!({"_id": "a", "g": 1}),
            json!({"_id": "b", "g": 1}),
        ],
    )?;

    let first = db.find_one("items", &q(json!({"g": 1})))?.unwrap();
    assert_eq!(first.id(), "a");
    assert!(db.find_one("items", &q(json!({"g": 2})))?.is_none());
    Ok(())
}

#[test]
fn test_bad_database_name_fails_before_io() {
    let dir = TempDir::new().unwrap();
    for bad in ["", "white space", "semi;colon", "../up"] {
        assert!(matches!(
            Database::open(bad, dir.path()),
            Err(A2zError::Validation(_))
        ));
        assert!(!dir.path().join(bad).exists());
    }
}

#[test]
fn test_nested_predicate_queries() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let db = open(&dir, "store");
    db.create_collection("people", None)?;
    db.insert_many(
        "people",
        vec![
            json!({"_id": "a", "address": {"city": "Amritsar", "zip": 143001}}),
            json!({"_id": "b", "address": {"city": "Delhi", "zip": 110001}}),
        ],
    )?;

    let results = db.find("people", Some(&q(json!({"address": {"city": "Amritsar"}}))))?;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id(), "a");

    let results = db.find("people", Some(&q(json!({"address": {"zip": {"$gt": 120000}}}))))?;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id(), "a");
    Ok(())
}
