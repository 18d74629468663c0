// src/update.rs
// Update operator dialect: $set / $unset / $push

use crate::document::Document;
use crate::error::{A2zError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A parsed update mutation. Exactly one operator per update; a bare field
/// map is shorthand for `$set`.
///
/// The externally tagged serde form (`{"set": {...}}`, `{"unset": [...]}`,
/// `{"push": {...}}`) is what lands in journal records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateSpec {
    /// Deep-merge the given fields into the document
    Set(Map<String, Value>),
    /// Remove the named top-level fields; missing fields are a no-op
    Unset(Vec<String>),
    /// Append to array fields; absent fields become one-element arrays
    Push(Map<String, Value>),
}

impl UpdateSpec {
    /// Parse an update payload.
    ///
    /// Recognized shapes:
    /// - `{"$set": {..}}`
    /// - `{"$unset": ["f", ..]}` or `{"$unset": {"f": .., ..}}` (keys)
    /// - `{"$push": {..}}`
    /// - a plain field map (treated as `$set`)
    ///
    /// More than one operator, an operator mixed with plain fields, or an
    /// unknown `$`-operator are validation errors.
    pub fn parse(update: &Map<String, Value>) -> Result<UpdateSpec> {
        let operator_keys: Vec<&String> =
            update.keys().filter(|k| k.starts_with('$')).collect();

        if operator_keys.is_empty() {
            return Ok(UpdateSpec::Set(update.clone()));
        }
        if operator_keys.len() > 1 || operator_keys.len() != update.len() {
            return Err(A2zError::Validation(
                "Update must carry exactly one operator".to_string(),
            ));
        }

        let key = operator_keys[0].as_str();
        let operand = &update[key];
        match key {
            "$set" => match operand {
                Value::Object(fields) => Ok(UpdateSpec::Set(fields.clone())),
                _ => Err(A2zError::Validation("$set requires an object".to_string())),
            },
            "$unset" => match operand {
                Value::Array(names) => {
                    let mut fields = Vec::with_capacity(names.len());
                    for name in names {
                        match name.as_str() {
                            Some(s) => fields.push(s.to_string()),
                            None => {
                                return Err(A2zError::Validation(
                                    "$unset entries must be field names".to_string(),
                                ))
                            }
                        }
                    }
                    Ok(UpdateSpec::Unset(fields))
                }
                // Mongo-style {"field": ""} form: the keys name the fields
                Value::Object(map) => Ok(UpdateSpec::Unset(map.keys().cloned().collect())),
                _ => Err(A2zError::Validation(
                    "$unset requires an array or object of field names".to_string(),
                )),
            },
            "$push" => match operand {
                Value::Object(fields) => Ok(UpdateSpec::Push(fields.clone())),
                _ => Err(A2zError::Validation("$push requires an object".to_string())),
            },
            other => Err(A2zError::Validation(format!(
                "Unknown update operator: {other}"
            ))),
        }
    }

    /// Apply this mutation to a document. `_id` is immutable and may not be
    /// targeted by any operator.
    pub fn apply(&self, doc: &mut Document) -> Result<()> {
        match self {
            UpdateSpec::Set(fields) => {
                if fields.contains_key("_id") {
                    return Err(A2zError::Validation("Cannot modify _id".to_string()));
                }
                doc.merge(fields);
                Ok(())
            }
            UpdateSpec::Unset(fields) => {
                for field in fields {
                    if field == "_id" {
                        return Err(A2zError::Validation("Cannot modify _id".to_string()));
                    }
                    doc.remove(field);
                }
                Ok(())
            }
            UpdateSpec::Push(fields) => {
                for (field, value) in fields {
                    if field == "_id" {
                        return Err(A2zError::Validation("Cannot modify _id".to_string()));
                    }
                    doc.push(field, value.clone())?;
                }
                Ok(())
            }
        }
    }
}
