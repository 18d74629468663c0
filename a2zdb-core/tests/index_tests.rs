// Index integration tests: acceleration, equivalence with full scans,
// maintenance across mutation sequences
use a2zdb_core::Database;
use serde_json::{json, Map, Value};
use tempfile::TempDir;

fn q(value: Value) -> Map<String, Value> {
    value.as_object().unwrap().clone()
}

fn seeded(dir: &TempDir) -> Database {
    let db = Database::open("store", dir.path()).unwrap();
    db.create_collection("items", None).unwrap();
    db.insert_many(
        "items",
        vec![
            json!({"_id": "a", "category": "x", "price": 5}),
            json!({"_id": "b", "category": "y", "price": 10}),
            json!({"_id": "c", "category": "x", "price": 15}),
        ],
    )
    .unwrap();
    db
}

#[test]
fn test_index_acceleration_scenario() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let db = seeded(&dir);
    db.create_index("items", "category")?;

    db.enable_indexing("items", true)?;
    let with_index = db.find("items", Some(&q(json!({"category": "x"}))))?;
    let ids: Vec<&str> = with_index.iter().map(|d| d.id()).collect();
    assert_eq!(ids, vec!["a", "c"]);

    db.enable_indexing("items", false)?;
    let without_index = db.find("items", Some(&q(json!({"category": "x"}))))?;
    assert_eq!(with_index, without_index);
    Ok(())
}

#[test]
fn test_index_equivalence_across_condition_shapes() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let db = seeded(&dir);
    db.create_index("items", "category")?;

    let queries = [
        json!({"category": "x"}),
        json!({"category": {"$eq": "y"}}),
        json!({"category": {"$in": ["x", "y"]}}),
        json!({"category": {"$in": []}}),
        json!({"category": "missing-value"}),
        json!({"category": "x", "price": {"$gt": 10}}),
        json!({"price": {"$gt": 5}}),
    ];
    for query in queries {
        db.enable_indexing("items", true)?;
        let indexed = db.find("items", Some(&q(query.clone())))?;
        db.enable_indexing("items", false)?;
        let scanned = db.find("items", Some(&q(query.clone())))?;
        assert_eq!(indexed, scanned, "divergence for query {query}");
    }
    Ok(())
}

#[test]
fn test_unindexed_condition_falls_back_to_scan() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let db = seeded(&dir);
    db.create_index("items", "category")?;
    db.enable_indexing("items", true)?;

    // Range conditions never qualify for the index plan
    let results = db.find("items", Some(&q(json!({"category": {"$ne": "x"}}))))?;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id(), "b");
    Ok(())
}

#[test]
fn test_index_stays_consistent_through_mutations() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let db = seeded(&dir);
    db.create_index("items", "category")?;
    db.enable_indexing("items", true)?;

    db.update_many(
        "items",
        &q(json!({"_id": "a"})),
        &q(json!({"$set": {"category": "z"}})),
    )?;
    db.delete_many("items", &q(json!({"_id": "b"})))?;
    db.insert_one("items", json!({"_id": "d", "category": "z"}))?;

    let z_docs = db.find("items", Some(&q(json!({"category": "z"}))))?;
    let ids: Vec<&str> = z_docs.iter().map(|d| d.id()).collect();
    assert_eq!(ids, vec!["a", "d"]);
    assert!(db.find("items", Some(&q(json!({"category": "y"}))))?.is_empty());
    Ok(())
}

#[test]
fn test_index_on_non_string_values() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let db = Database::open("store", dir.path())?;
    db.create_collection("mixed", None)?;
    db.insert_many(
        "mixed",
        vec![
            json!({"_id": "i", "k": 7}),
            json!({"_id": "f", "k": 7.5}),
            json!({"_id": "b", "k": true}),
            json!({"_id": "n", "k": null}),
            json!({"_id": "arr", "k": [1, 2]}),
        ],
    )?;
    db.create_index("mixed", "k")?;
    db.enable_indexing("mixed", true)?;

    for (query, expected) in [
        (json!({"k": 7}), "i"),
        (json!({"k": 7.5}), "f"),
        (json!({"k": true}), "b"),
        (json!({"k": null}), "n"),
        (json!({"k": [1, 2]}), "arr"),
    ] {
        let results = db.find("mixed", Some(&q(query)))?;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id(), expected);
    }

    // An array value and its JSON text are distinct index keys
    db.insert_one("mixed", json!({"_id": "s", "k": "[1,2]"}))?;
    let results = db.find("mixed", Some(&q(json!({"k": [1, 2]}))))?;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id(), "arr");
    Ok(())
}

#[test]
fn test_list_indexes_via_database() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let db = seeded(&dir);
    db.create_index("items", "category")?;
    db.create_index("items", "price")?;
    assert_eq!(
        db.list_indexes("items")?,
        vec![
            json!({"name": "category_index", "key": "category"}),
            json!({"name": "price_index", "key": "price"}),
        ]
    );
    Ok(())
}
