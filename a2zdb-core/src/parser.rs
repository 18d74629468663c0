// src/parser.rs
// Surface-language parser: keyword-directed, verbs case-insensitive,
// operand JSON case-sensitive.

use crate::error::{A2zError, Result};
use crate::logging::log_operation;
use crate::permissions::Permission;
use serde_json::{Map, Value};

/// A parsed surface-language command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    BeginTransaction,
    Commit,
    Rollback,
    CreateDb { name: String },
    DropDb { name: String },
    UseDb { name: String },
    CreateCollection { name: String },
    DropCollection { name: String },
    CreateIndex { field: String, collection: String },
    ListIndexes { collection: String },
    EnableIndexing { enable: bool },
    Insert { collection: String, document: Map<String, Value> },
    InsertMany { collection: String, documents: Vec<Map<String, Value>> },
    Update {
        collection: String,
        query: Map<String, Value>,
        update: Map<String, Value>,
    },
    Delete { collection: String, query: Map<String, Value> },
    Find { collection: String, query: Map<String, Value> },
    Aggregate { collection: String, pipeline: Value },
    Backup { name: String },
    Restore { name: String },
}

impl Command {
    /// The capability an external policy boundary must grant before this
    /// command may be dispatched
    pub fn required_permission(&self) -> Permission {
        match self {
            Command::BeginTransaction => Permission::BeginTx,
            Command::Commit => Permission::Commit,
            Command::Rollback => Permission::Rollback,
            Command::CreateDb { .. } => Permission::CreateDb,
            Command::DropDb { .. } => Permission::DropDb,
            Command::UseDb { .. } => Permission::UseDb,
            Command::CreateCollection { .. } => Permission::CreateCollection,
            Command::DropCollection { .. } => Permission::DropCollection,
            Command::CreateIndex { .. } => Permission::CreateIndex,
            Command::ListIndexes { .. } => Permission::ListIndexes,
            // Toggling index usage shapes how reads execute
            Command::EnableIndexing { .. } => Permission::CreateIndex,
            Command::Insert { .. } | Command::InsertMany { .. } => Permission::Insert,
            Command::Update { .. } => Permission::Update,
            Command::Delete { .. } => Permission::Delete,
            Command::Find { .. } | Command::Aggregate { .. } => Permission::Read,
            Command::Backup { .. } => Permission::Backup,
            Command::Restore { .. } => Permission::Restore,
        }
    }
}

/// Parse one command line of the surface language
pub fn parse(input: &str) -> Result<Command> {
    let input = input.trim();

    let result = parse_inner(input);
    match &result {
        Ok(command) => log_operation(
            "QUERY_PARSE",
            "QUERY",
            "SUCCESS",
            &format!("{command:?}"),
        ),
        Err(e) => log_operation(
            "QUERY_PARSE",
            "ERROR",
            "FAILED",
            &format!("query:{input}, error:{e}"),
        ),
    }
    result
}

fn parse_inner(input: &str) -> Result<Command> {
    // Transaction verbs and index toggles are exact commands
    if input.eq_ignore_ascii_case("begin tx") {
        return Ok(Command::BeginTransaction);
    }
    if input.eq_ignore_ascii_case("commit") {
        return Ok(Command::Commit);
    }
    if input.eq_ignore_ascii_case("rollback") {
        return Ok(Command::Rollback);
    }
    if input.eq_ignore_ascii_case("index chalo karo") {
        return Ok(Command::EnableIndexing { enable: true });
    }
    if input.eq_ignore_ascii_case("index band karo") {
        return Ok(Command::EnableIndexing { enable: false });
    }

    if let Some(rest) = strip_verb(input, "nava database banao") {
        return Ok(Command::CreateDb { name: required_name(rest, "nava database banao <name>")? });
    }
    if let Some(rest) = strip_verb(input, "database nu mitao") {
        return Ok(Command::DropDb { name: required_name(rest, "database nu mitao <name>")? });
    }
    if let Some(rest) = strip_verb(input, "database chalao") {
        return Ok(Command::UseDb { name: required_name(rest, "database chalao <name>")? });
    }
    if let Some(rest) = strip_verb(input, "nava collection banao") {
        return Ok(Command::CreateCollection {
            name: required_name(rest, "nava collection banao <name>")?,
        });
    }
    if let Some(rest) = strip_verb(input, "collection nu mitao") {
        return Ok(Command::DropCollection {
            name: required_name(rest, "collection nu mitao <name>")?,
        });
    }
    if let Some(rest) = strip_verb(input, "index banao") {
        let mut parts = rest.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some(field), Some(collection)) => {
                return Ok(Command::CreateIndex {
                    field: field.to_string(),
                    collection: collection.to_string(),
                })
            }
            _ => {
                return Err(syntax_error(
                    "Invalid create index syntax. Use: index banao <field> <collection>",
                ))
            }
        }
    }
    if let Some(rest) = strip_verb(input, "index dikhao") {
        return Ok(Command::ListIndexes {
            collection: required_name(rest, "index dikhao <collection>")?,
        });
    }

    if let Some(rest) = strip_verb(input, "dakhil karo") {
        return parse_insert(rest);
    }
    if let Some(rest) = strip_verb(input, "badlo") {
        return parse_update(rest);
    }
    if let Some(rest) = strip_verb(input, "mitao") {
        let (collection, query_text) = rest.split_once('{').ok_or_else(|| {
            syntax_error("Invalid delete syntax. Use: mitao <collection> {query}")
        })?;
        let query = json_object(&format!("{{{query_text}"))?;
        return Ok(Command::Delete {
            collection: required_name(collection, "mitao <collection> {query}")?,
            query,
        });
    }
    if let Some(rest) = strip_verb(input, "labbo") {
        return parse_find(rest);
    }
    if let Some(rest) = strip_verb(input, "aggregate in") {
        let (collection, pipeline_text) = rest.split_once('[').ok_or_else(|| {
            syntax_error("Invalid aggregate syntax. Use: aggregate in <collection> [pipeline]")
        })?;
        let pipeline = json_value(&format!("[{pipeline_text}"))?;
        if !pipeline.is_array() {
            return Err(syntax_error("Aggregation pipeline must be a JSON array"));
        }
        return Ok(Command::Aggregate {
            collection: required_name(collection, "aggregate in <collection> [pipeline]")?,
            pipeline,
        });
    }
    if let Some(rest) = strip_verb(input, "backup banao") {
        return Ok(Command::Backup { name: required_name(rest, "backup banao <database>")? });
    }
    if let Some(rest) = strip_verb(input, "restore karo") {
        return Ok(Command::Restore { name: required_name(rest, "restore karo <database>")? });
    }

    Err(syntax_error(&format!("Unknown query command: {input}")))
}

fn parse_insert(rest: &str) -> Result<Command> {
    let (collection, data) = rest.split_once(char::is_whitespace).ok_or_else(|| {
        syntax_error(
            "Missing document data. Use: dakhil karo <collection> {document} or [documents]",
        )
    })?;
    let data = data.trim();
    if data.is_empty() {
        return Err(syntax_error("Document data cannot be empty"));
    }

    if data.starts_with('{') {
        let document = json_object(data)?;
        Ok(Command::Insert {
            collection: collection.to_string(),
            document,
        })
    } else if data.starts_with('[') {
        let parsed = json_value(data)?;
        let items = parsed
            .as_array()
            .ok_or_else(|| syntax_error("Multi-document data must be a JSON array"))?;
        let mut documents = Vec::with_capacity(items.len());
        for item in items {
            match item.as_object() {
                Some(map) => documents.push(map.clone()),
                None => {
                    return Err(syntax_error(
                        "All elements in array must be documents (objects)",
                    ))
                }
            }
        }
        Ok(Command::InsertMany {
            collection: collection.to_string(),
            documents,
        })
    } else {
        Err(syntax_error(
            "Data must be a document {} or array of documents []",
        ))
    }
}

fn parse_update(rest: &str) -> Result<Command> {
    let (collection, rest) = rest.split_once(char::is_whitespace).ok_or_else(|| {
        syntax_error("Missing query and update data. Use: badlo <collection> {query} {update}")
    })?;
    let rest = rest.trim();
    if !rest.starts_with('{') {
        return Err(syntax_error(
            "Query must start with '{'. Use: badlo <collection> {query} {update}",
        ));
    }

    // Balanced-brace scan splits the two consecutive JSON objects
    let (query_text, update_text) = split_balanced_object(rest)?;
    let update_text = update_text.trim();
    if update_text.is_empty() {
        return Err(syntax_error(
            "Missing update JSON object. Use: badlo <collection> {query} {update}",
        ));
    }
    if !update_text.starts_with('{') {
        return Err(syntax_error(
            "Update must start with '{'. Use: badlo <collection> {query} {update}",
        ));
    }

    Ok(Command::Update {
        collection: collection.to_string(),
        query: json_object(query_text)?,
        update: json_object(update_text)?,
    })
}

fn parse_find(rest: &str) -> Result<Command> {
    match rest.find('{') {
        Some(pos) => {
            let collection = required_name(&rest[..pos], "labbo <collection> [{query}]")?;
            let query = json_object(&rest[pos..])?;
            Ok(Command::Find { collection, query })
        }
        None => Ok(Command::Find {
            collection: required_name(rest, "labbo <collection> [{query}]")?,
            query: Map::new(),
        }),
    }
}

/// Slice off the first balanced `{...}` group; the remainder follows it
fn split_balanced_object(text: &str) -> Result<(&str, &str)> {
    let mut depth = 0usize;
    for (i, ch) in text.char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Ok((&text[..i + 1], &text[i + 1..]));
                }
            }
            _ => {}
        }
    }
    Err(syntax_error("Invalid query JSON: missing closing '}'"))
}

/// Case-insensitive verb prefix match; requires a token boundary after the
/// verb and returns the trimmed operand text
fn strip_verb<'a>(input: &'a str, verb: &str) -> Option<&'a str> {
    let bytes = input.as_bytes();
    let verb_bytes = verb.as_bytes();
    if bytes.len() < verb_bytes.len() {
        return None;
    }
    if !bytes[..verb_bytes.len()].eq_ignore_ascii_case(verb_bytes) {
        return None;
    }
    let rest = &input[verb_bytes.len()..];
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return None;
    }
    Some(rest.trim())
}

fn required_name(text: &str, usage: &str) -> Result<String> {
    let name = text.trim();
    if name.is_empty() || name.contains(char::is_whitespace) {
        return Err(syntax_error(&format!("Missing or invalid name. Use: {usage}")));
    }
    Ok(name.to_string())
}

fn json_value(text: &str) -> Result<Value> {
    serde_json::from_str(text).map_err(|e| A2zError::from_json_error(&e, text))
}

fn json_object(text: &str) -> Result<Map<String, Value>> {
    match json_value(text)? {
        Value::Object(map) => Ok(map),
        _ => Err(syntax_error("Expected a JSON object")),
    }
}

fn syntax_error(message: &str) -> A2zError {
    A2zError::Parse {
        message: message.to_string(),
        offset: 0,
        line: 1,
        column: 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_transaction_verbs() {
        assert_eq!(parse("begin tx").unwrap(), Command::BeginTransaction);
        assert_eq!(parse("COMMIT").unwrap(), Command::Commit);
        assert_eq!(parse("  rollback  ").unwrap(), Command::Rollback);
    }

    #[test]
    fn test_database_verbs() {
        assert_eq!(
            parse("nava database banao store").unwrap(),
            Command::CreateDb { name: "store".to_string() }
        );
        assert_eq!(
            parse("database nu mitao store").unwrap(),
            Command::DropDb { name: "store".to_string() }
        );
        assert_eq!(
            parse("DATABASE CHALAO store").unwrap(),
            Command::UseDb { name: "store".to_string() }
        );
    }

    #[test]
    fn test_collection_verbs() {
        assert_eq!(
            parse("nava collection banao items").unwrap(),
            Command::CreateCollection { name: "items".to_string() }
        );
        assert_eq!(
            parse("collection nu mitao items").unwrap(),
            Command::DropCollection { name: "items".to_string() }
        );
    }

    #[test]
    fn test_index_verbs() {
        assert_eq!(
            parse("index banao category items").unwrap(),
            Command::CreateIndex {
                field: "category".to_string(),
                collection: "items".to_string()
            }
        );
        assert_eq!(
            parse("index dikhao items").unwrap(),
            Command::ListIndexes { collection: "items".to_string() }
        );
        assert_eq!(parse("index chalo karo").unwrap(), Command::EnableIndexing { enable: true });
        assert_eq!(parse("index band karo").unwrap(), Command::EnableIndexing { enable: false });
        assert!(parse("index banao onlyfield").is_err());
    }

    #[test]
    fn test_insert_single() {
        let command = parse(r#"dakhil karo users {"name":"ada"}"#).unwrap();
        assert_eq!(
            command,
            Command::Insert {
                collection: "users".to_string(),
                document: json!({"name": "ada"}).as_object().unwrap().clone(),
            }
        );
    }

    #[test]
    fn test_insert_many() {
        let command = parse(r#"dakhil karo users [{"a":1},{"a":2}]"#).unwrap();
        match command {
            Command::InsertMany { collection, documents } => {
                assert_eq!(collection, "users");
                assert_eq!(documents.len(), 2);
            }
            other => panic!("expected InsertMany, got {other:?}"),
        }
        assert!(parse(r#"dakhil karo users [{"a":1}, 5]"#).is_err());
    }

    #[test]
    fn test_insert_operand_casing_preserved() {
        // Verb casing is free; JSON operands stay case-sensitive
        let command = parse(r#"DAKHIL KARO users {"Name":"Ada"}"#).unwrap();
        match command {
            Command::Insert { document, .. } => {
                assert!(document.contains_key("Name"));
                assert_eq!(document["Name"], json!("Ada"));
            }
            other => panic!("expected Insert, got {other:?}"),
        }
    }

    #[test]
    fn test_update_splits_two_objects() {
        let command = parse(r#"badlo users {"name":"ada"} {"$set":{"age":30}}"#).unwrap();
        assert_eq!(
            command,
            Command::Update {
                collection: "users".to_string(),
                query: json!({"name": "ada"}).as_object().unwrap().clone(),
                update: json!({"$set": {"age": 30}}).as_object().unwrap().clone(),
            }
        );
    }

    #[test]
    fn test_update_with_nested_braces() {
        let command =
            parse(r#"badlo users {"profile":{"city":"Moga"}} {"$set":{"profile":{"city":"Pune"}}}"#)
                .unwrap();
        match command {
            Command::Update { query, update, .. } => {
                assert_eq!(query["profile"]["city"], json!("Moga"));
                assert_eq!(update["$set"]["profile"]["city"], json!("Pune"));
            }
            other => panic!("expected Update, got {other:?}"),
        }
    }

    #[test]
    fn test_update_missing_second_object() {
        assert!(parse(r#"badlo users {"a":1}"#).is_err());
        assert!(parse(r#"badlo users {"a":1"#).is_err());
        assert!(parse("badlo users").is_err());
    }

    #[test]
    fn test_delete() {
        let command = parse(r#"mitao users {"name":"ada"}"#).unwrap();
        assert_eq!(
            command,
            Command::Delete {
                collection: "users".to_string(),
                query: json!({"name": "ada"}).as_object().unwrap().clone(),
            }
        );
        assert!(parse("mitao users").is_err());
    }

    #[test]
    fn test_find_with_and_without_query() {
        assert_eq!(
            parse(r#"labbo users {"age":{"$gt":18}}"#).unwrap(),
            Command::Find {
                collection: "users".to_string(),
                query: json!({"age": {"$gt": 18}}).as_object().unwrap().clone(),
            }
        );
        assert_eq!(
            parse("labbo users").unwrap(),
            Command::Find { collection: "users".to_string(), query: Map::new() }
        );
    }

    #[test]
    fn test_aggregate() {
        let command = parse(r#"aggregate in sales [{"$group":{"_id":"$g"}}]"#).unwrap();
        match command {
            Command::Aggregate { collection, pipeline } => {
                assert_eq!(collection, "sales");
                assert_eq!(pipeline.as_array().unwrap().len(), 1);
            }
            other => panic!("expected Aggregate, got {other:?}"),
        }
        assert!(parse("aggregate in sales").is_err());
    }

    #[test]
    fn test_backup_restore() {
        assert_eq!(
            parse("backup banao store").unwrap(),
            Command::Backup { name: "store".to_string() }
        );
        assert_eq!(
            parse("restore karo store").unwrap(),
            Command::Restore { name: "store".to_string() }
        );
        assert!(parse("backup banao").is_err());
    }

    #[test]
    fn test_unknown_verb_is_structured_error() {
        match parse("select * from users") {
            Err(A2zError::Parse { message, .. }) => {
                assert!(message.contains("Unknown query command"));
            }
            other => panic!("expected Parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_json_reports_position() {
        match parse(r#"dakhil karo users {"name": }"#) {
            Err(A2zError::Parse { line, column, .. }) => {
                assert_eq!(line, 1);
                assert!(column > 1);
            }
            other => panic!("expected Parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_required_permissions() {
        assert_eq!(
            parse("labbo users").unwrap().required_permission(),
            Permission::Read
        );
        assert_eq!(
            parse("begin tx").unwrap().required_permission(),
            Permission::BeginTx
        );
        assert_eq!(
            parse(r#"mitao users {"a":1}"#).unwrap().required_permission(),
            Permission::Delete
        );
        assert_eq!(
            parse("backup banao store").unwrap().required_permission(),
            Permission::Backup
        );
    }
}
