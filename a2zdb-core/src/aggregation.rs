// src/aggregation.rs
// Aggregation pipeline implementation

use crate::error::{A2zError, Result};
use crate::query::matches_map;
use crate::value_utils::{compare_values, compare_values_with_none, get_path};
use serde_json::{Map, Number, Value};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Aggregation pipeline: an ordered list of stages applied to a working set
/// initialized from the collection's sequence. An empty pipeline is the
/// identity.
#[derive(Debug, Clone)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

/// Pipeline stage
#[derive(Debug, Clone)]
pub enum Stage {
    Match(Map<String, Value>),
    Group(GroupStage),
    Sort(Vec<(String, SortDirection)>),
    Limit(usize),
    Skip(usize),
    Project(Vec<(String, ProjectField)>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// One `$project` entry: include by dotted read, exclude, or literal assign
#[derive(Debug, Clone)]
pub enum ProjectField {
    Include,
    Exclude,
    Literal(Value),
}

/// `$group` stage: key expression plus named accumulators
#[derive(Debug, Clone)]
pub struct GroupStage {
    id: GroupId,
    accumulators: Vec<(String, Accumulator)>,
}

/// How the group key is computed for each document
#[derive(Debug, Clone)]
pub enum GroupId {
    /// `"$path"` - dotted-path read
    Path(String),
    /// Mapping - tuple of dotted-path reads of each value
    Tuple(Vec<String>),
    /// `null` or `"$none"` - everything in one group
    None,
    /// Any other literal
    Literal(Value),
}

/// `{operator, field}` accumulator
#[derive(Debug, Clone)]
pub struct Accumulator {
    op: AccumulatorOp,
    field: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccumulatorOp {
    Sum,
    Avg,
    Min,
    Max,
    Count,
    First,
    Last,
}

impl AccumulatorOp {
    fn parse(name: &str) -> Option<AccumulatorOp> {
        match name {
            "$sum" => Some(AccumulatorOp::Sum),
            "$avg" => Some(AccumulatorOp::Avg),
            "$min" => Some(AccumulatorOp::Min),
            "$max" => Some(AccumulatorOp::Max),
            "$count" => Some(AccumulatorOp::Count),
            "$first" => Some(AccumulatorOp::First),
            "$last" => Some(AccumulatorOp::Last),
            _ => None,
        }
    }
}

impl Pipeline {
    /// Parse a pipeline from a JSON array of single-key stage objects
    pub fn from_json(pipeline: &Value) -> Result<Pipeline> {
        let stages_json = pipeline
            .as_array()
            .ok_or_else(|| A2zError::Aggregation("Pipeline must be an array".to_string()))?;

        let mut stages = Vec::with_capacity(stages_json.len());
        for stage_json in stages_json {
            stages.push(Stage::from_json(stage_json)?);
        }
        Ok(Pipeline { stages })
    }

    /// Run the pipeline over the working set
    pub fn execute(&self, mut docs: Vec<Value>) -> Result<Vec<Value>> {
        for stage in &self.stages {
            docs = stage.execute(docs)?;
        }
        Ok(docs)
    }
}

impl Stage {
    fn from_json(stage_json: &Value) -> Result<Stage> {
        let obj = stage_json
            .as_object()
            .ok_or_else(|| A2zError::Aggregation("Stage must be an object".to_string()))?;
        if obj.len() != 1 {
            return Err(A2zError::Aggregation(
                "Each stage must have exactly one operator".to_string(),
            ));
        }
        let (name, spec) = obj.iter().next().ok_or_else(|| {
            A2zError::Aggregation("Each stage must have exactly one operator".to_string())
        })?;

        match name.as_str() {
            "$match" => {
                let query = spec.as_object().ok_or_else(|| {
                    A2zError::Aggregation("$match must be an object".to_string())
                })?;
                Ok(Stage::Match(query.clone()))
            }
            "$group" => Ok(Stage::Group(GroupStage::from_json(spec)?)),
            "$sort" => {
                let fields = spec.as_object().ok_or_else(|| {
                    A2zError::Aggregation("$sort must be an object".to_string())
                })?;
                let mut sort = Vec::with_capacity(fields.len());
                for (field, direction) in fields {
                    let direction = match direction.as_i64() {
                        Some(1) => SortDirection::Ascending,
                        Some(-1) => SortDirection::Descending,
                        _ => {
                            return Err(A2zError::Aggregation(format!(
                                "$sort direction for '{field}' must be 1 or -1"
                            )))
                        }
                    };
                    sort.push((field.clone(), direction));
                }
                Ok(Stage::Sort(sort))
            }
            "$limit" => Ok(Stage::Limit(parse_stage_count(spec, "$limit")?)),
            "$skip" => Ok(Stage::Skip(parse_stage_count(spec, "$skip")?)),
            "$project" => {
                let fields = spec.as_object().ok_or_else(|| {
                    A2zError::Aggregation("$project must be an object".to_string())
                })?;
                let mut projection = Vec::with_capacity(fields.len());
                for (field, spec) in fields {
                    projection.push((field.clone(), ProjectField::from_json(field, spec)?));
                }
                Ok(Stage::Project(projection))
            }
            other => Err(A2zError::Aggregation(format!(
                "Unknown pipeline stage: {other}"
            ))),
        }
    }

    fn execute(&self, docs: Vec<Value>) -> Result<Vec<Value>> {
        match self {
            Stage::Match(query) => Ok(docs
                .into_iter()
                .filter(|doc| match doc.as_object() {
                    Some(map) => matches_map(map, query),
                    None => false,
                })
                .collect()),
            Stage::Group(stage) => stage.execute(docs),
            Stage::Sort(fields) => {
                let mut docs = docs;
                docs.sort_by(|a, b| {
                    for (field, direction) in fields {
                        let ordering =
                            compare_values_with_none(get_path(a, field), get_path(b, field));
                        let ordering = match direction {
                            SortDirection::Ascending => ordering,
                            SortDirection::Descending => ordering.reverse(),
                        };
                        if ordering != Ordering::Equal {
                            return ordering;
                        }
                    }
                    Ordering::Equal
                });
                Ok(docs)
            }
            Stage::Limit(n) => {
                let mut docs = docs;
                docs.truncate(*n);
                Ok(docs)
            }
            Stage::Skip(n) => Ok(docs.into_iter().skip(*n).collect()),
            Stage::Project(fields) => Ok(docs
                .iter()
                .map(|doc| {
                    let mut out = Map::new();
                    for (field, spec) in fields {
                        match spec {
                            ProjectField::Include => {
                                out.insert(
                                    field.clone(),
                                    get_path(doc, field).cloned().unwrap_or(Value::Null),
                                );
                            }
                            ProjectField::Exclude => {}
                            ProjectField::Literal(value) => {
                                out.insert(field.clone(), value.clone());
                            }
                        }
                    }
                    Value::Object(out)
                })
                .collect()),
        }
    }
}

fn parse_stage_count(spec: &Value, stage: &str) -> Result<usize> {
    spec.as_u64()
        .map(|n| n as usize)
        .ok_or_else(|| A2zError::Aggregation(format!("{stage} must be a non-negative integer")))
}

impl ProjectField {
    fn from_json(field: &str, spec: &Value) -> Result<ProjectField> {
        match spec {
            Value::Number(n) if n.as_i64() == Some(1) => Ok(ProjectField::Include),
            Value::Number(n) if n.as_i64() == Some(0) => Ok(ProjectField::Exclude),
            Value::Object(obj) if obj.len() == 1 && obj.contains_key("$literal") => {
                Ok(ProjectField::Literal(obj["$literal"].clone()))
            }
            _ => Err(A2zError::Aggregation(format!(
                "Invalid projection for '{field}': expected 0, 1 or {{\"$literal\": value}}"
            ))),
        }
    }
}

impl GroupStage {
    fn from_json(spec: &Value) -> Result<GroupStage> {
        let obj = spec
            .as_object()
            .ok_or_else(|| A2zError::Aggregation("$group must be an object".to_string()))?;

        let id_value = obj
            .get("_id")
            .ok_or_else(|| A2zError::Aggregation("$group must have an _id field".to_string()))?;

        let id = match id_value {
            Value::Null => GroupId::None,
            Value::String(s) if s == "$none" => GroupId::None,
            Value::String(s) if s.starts_with('$') => GroupId::Path(s.clone()),
            Value::Object(mapping) => {
                let mut paths = Vec::with_capacity(mapping.len());
                for (name, path) in mapping {
                    match path.as_str() {
                        Some(p) => paths.push(p.to_string()),
                        None => {
                            return Err(A2zError::Aggregation(format!(
                                "$group _id component '{name}' must be a field path"
                            )))
                        }
                    }
                }
                GroupId::Tuple(paths)
            }
            literal => GroupId::Literal(literal.clone()),
        };

        let mut accumulators = Vec::new();
        for (field, spec) in obj {
            if field == "_id" {
                continue;
            }
            accumulators.push((field.clone(), Accumulator::from_json(field, spec)?));
        }

        Ok(GroupStage { id, accumulators })
    }

    fn execute(&self, docs: Vec<Value>) -> Result<Vec<Value>> {
        // Groups keep first-seen order; the canonical JSON text of the key
        // is the hash key.
        let mut order: Vec<String> = Vec::new();
        let mut groups: HashMap<String, GroupData> = HashMap::new();

        for doc in &docs {
            let key_value = self.group_key(doc);
            let canonical = serde_json::to_string(&key_value)?;

            if !groups.contains_key(&canonical) {
                order.push(canonical.clone());
                groups.insert(
                    canonical.clone(),
                    GroupData {
                        key: key_value,
                        states: self
                            .accumulators
                            .iter()
                            .map(|_| AccumulatorState::default())
                            .collect(),
                    },
                );
            }

            if let Some(group) = groups.get_mut(&canonical) {
                for ((_, accumulator), state) in self.accumulators.iter().zip(&mut group.states)
                {
                    state.observe(accumulator, doc);
                }
            }
        }

        let mut results = Vec::with_capacity(order.len());
        for canonical in order {
            if let Some(group) = groups.remove(&canonical) {
                let mut out = Map::new();
                out.insert("_id".to_string(), group.key);
                for ((field, accumulator), state) in
                    self.accumulators.iter().zip(group.states)
                {
                    out.insert(field.clone(), state.finish(accumulator));
                }
                results.push(Value::Object(out));
            }
        }
        Ok(results)
    }

    fn group_key(&self, doc: &Value) -> Value {
        match &self.id {
            GroupId::None => Value::Null,
            GroupId::Path(path) => get_path(doc, path).cloned().unwrap_or(Value::Null),
            GroupId::Tuple(paths) => Value::Array(
                paths
                    .iter()
                    .map(|path| get_path(doc, path).cloned().unwrap_or(Value::Null))
                    .collect(),
            ),
            GroupId::Literal(literal) => literal.clone(),
        }
    }
}

struct GroupData {
    key: Value,
    states: Vec<AccumulatorState>,
}

impl Accumulator {
    fn from_json(output_field: &str, spec: &Value) -> Result<Accumulator> {
        let obj = spec.as_object().ok_or_else(|| {
            A2zError::Aggregation(format!(
                "Accumulator for '{output_field}' must be {{\"operator\": .., \"field\": ..}}"
            ))
        })?;

        let op_name = obj
            .get("operator")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                A2zError::Aggregation(format!(
                    "Accumulator for '{output_field}' is missing an operator"
                ))
            })?;
        let op = AccumulatorOp::parse(op_name).ok_or_else(|| {
            A2zError::Aggregation(format!("Unsupported aggregation operator: {op_name}"))
        })?;

        // Field defaults to the output field name; a leading $ is stripped
        // at read time.
        let field = obj
            .get("field")
            .and_then(Value::as_str)
            .unwrap_or(output_field)
            .to_string();

        Ok(Accumulator { op, field })
    }
}

/// Running state for one accumulator within one group
#[derive(Default)]
struct AccumulatorState {
    /// Integer-exact running sum for $sum/$avg while every input is an i64
    int_sum: i64,
    float_sum: f64,
    all_int: bool,
    numeric_seen: usize,
    count: usize,
    extremum: Option<Value>,
    first: Option<Value>,
    last: Option<Value>,
}

impl AccumulatorState {
    fn observe(&mut self, accumulator: &Accumulator, doc: &Value) {
        let value = get_path(doc, &accumulator.field);
        match accumulator.op {
            AccumulatorOp::Sum | AccumulatorOp::Avg => {
                if let Some(Value::Number(n)) = value {
                    if self.numeric_seen == 0 {
                        self.all_int = true;
                    }
                    self.numeric_seen += 1;
                    if let Some(i) = n.as_i64() {
                        self.int_sum = self.int_sum.wrapping_add(i);
                        self.float_sum += i as f64;
                    } else {
                        self.all_int = false;
                        self.float_sum += n.as_f64().unwrap_or(0.0);
                    }
                }
            }
            AccumulatorOp::Min => {
                if let Some(v) = value {
                    if !v.is_null() {
                        self.fold_extremum(v, Ordering::Less);
                    }
                }
            }
            AccumulatorOp::Max => {
                if let Some(v) = value {
                    if !v.is_null() {
                        self.fold_extremum(v, Ordering::Greater);
                    }
                }
            }
            AccumulatorOp::Count => {
                self.count += 1;
            }
            AccumulatorOp::First => {
                let non_null = value.filter(|v| !v.is_null());
                if self.first.is_none() {
                    self.first = non_null.cloned();
                }
            }
            AccumulatorOp::Last => {
                self.last = Some(value.cloned().unwrap_or(Value::Null));
            }
        }
    }

    /// Keep `candidate` when it compares `wanted` against the current
    /// extremum; incomparable candidates leave the extremum unchanged.
    fn fold_extremum(&mut self, candidate: &Value, wanted: Ordering) {
        match &self.extremum {
            None => self.extremum = Some(candidate.clone()),
            Some(current) => {
                if compare_values(candidate, current) == Some(wanted) {
                    self.extremum = Some(candidate.clone());
                }
            }
        }
    }

    fn finish(self, accumulator: &Accumulator) -> Value {
        match accumulator.op {
            AccumulatorOp::Sum => {
                if self.numeric_seen == 0 {
                    Value::Number(Number::from(0))
                } else if self.all_int {
                    Value::Number(Number::from(self.int_sum))
                } else {
                    Number::from_f64(self.float_sum)
                        .map(Value::Number)
                        .unwrap_or(Value::Null)
                }
            }
            AccumulatorOp::Avg => {
                if self.numeric_seen == 0 {
                    Value::Number(Number::from(0))
                } else {
                    let avg = self.float_sum / self.numeric_seen as f64;
                    Number::from_f64(avg).map(Value::Number).unwrap_or(Value::Null)
                }
            }
            AccumulatorOp::Min | AccumulatorOp::Max => self.extremum.unwrap_or(Value::Null),
            AccumulatorOp::Count => Value::Number(Number::from(self.count as i64)),
            AccumulatorOp::First => self.first.unwrap_or(Value::Null),
            AccumulatorOp::Last => self.last.unwrap_or(Value::Null),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(pipeline: Value, docs: Vec<Value>) -> Result<Vec<Value>> {
        Pipeline::from_json(&pipeline)?.execute(docs)
    }

    fn sample() -> Vec<Value> {
        vec![
            json!({"_id": "1", "g": "a", "n": 1}),
            json!({"_id": "2", "g": "a", "n": 3}),
            json!({"_id": "3", "g": "b", "n": 2}),
        ]
    }

    #[test]
    fn test_empty_pipeline_is_identity() {
        let docs = sample();
        assert_eq!(run(json!([]), docs.clone()).unwrap(), docs);
    }

    #[test]
    fn test_match_stage() {
        let results = run(json!([{"$match": {"g": "a"}}]), sample()).unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|d| d["g"] == json!("a")));
    }

    #[test]
    fn test_group_sum_and_sort() {
        let results = run(
            json!([
                {"$group": {"_id": "$g", "total": {"operator": "$sum", "field": "n"}}},
                {"$sort": {"_id": 1}}
            ]),
            sample(),
        )
        .unwrap();
        assert_eq!(
            results,
            vec![
                json!({"_id": "a", "total": 4}),
                json!({"_id": "b", "total": 2}),
            ]
        );
    }

    #[test]
    fn test_group_sum_stays_integer() {
        let results = run(
            json!([{"$group": {"_id": null, "total": {"operator": "$sum", "field": "n"}}}]),
            sample(),
        )
        .unwrap();
        assert_eq!(results, vec![json!({"_id": null, "total": 6})]);
    }

    #[test]
    fn test_group_avg_min_max_count() {
        let results = run(
            json!([{"$group": {
                "_id": "$g",
                "avg": {"operator": "$avg", "field": "n"},
                "lo": {"operator": "$min", "field": "n"},
                "hi": {"operator": "$max", "field": "n"},
                "cnt": {"operator": "$count", "field": "n"}
            }}, {"$sort": {"_id": 1}}]),
            sample(),
        )
        .unwrap();
        assert_eq!(results[0]["avg"], json!(2.0));
        assert_eq!(results[0]["lo"], json!(1));
        assert_eq!(results[0]["hi"], json!(3));
        assert_eq!(results[0]["cnt"], json!(2));
        assert_eq!(results[1]["cnt"], json!(1));
    }

    #[test]
    fn test_group_first_last() {
        let results = run(
            json!([{"$group": {
                "_id": "$g",
                "first": {"operator": "$first", "field": "n"},
                "last": {"operator": "$last", "field": "n"}
            }}, {"$sort": {"_id": 1}}]),
            sample(),
        )
        .unwrap();
        assert_eq!(results[0]["first"], json!(1));
        assert_eq!(results[0]["last"], json!(3));
    }

    #[test]
    fn test_group_missing_field_semantics() {
        let docs = vec![json!({"_id": "1", "g": "a"})];
        let results = run(
            json!([{"$group": {
                "_id": "$g",
                "total": {"operator": "$sum", "field": "n"},
                "avg": {"operator": "$avg", "field": "n"},
                "lo": {"operator": "$min", "field": "n"}
            }}]),
            docs,
        )
        .unwrap();
        assert_eq!(results[0]["total"], json!(0));
        assert_eq!(results[0]["avg"], json!(0));
        assert_eq!(results[0]["lo"], json!(null));
    }

    #[test]
    fn test_group_tuple_key() {
        let docs = vec![
            json!({"g": "a", "h": 1, "n": 1}),
            json!({"g": "a", "h": 1, "n": 2}),
            json!({"g": "a", "h": 2, "n": 3}),
        ];
        let results = run(
            json!([{"$group": {
                "_id": {"grp": "$g", "sub": "$h"},
                "total": {"operator": "$sum", "field": "n"}
            }}]),
            docs,
        )
        .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["_id"], json!(["a", 1]));
        assert_eq!(results[0]["total"], json!(3));
        assert_eq!(results[1]["_id"], json!(["a", 2]));
    }

    #[test]
    fn test_group_none_sentinel() {
        for id in [json!(null), json!("$none")] {
            let results = run(
                json!([{"$group": {"_id": id, "cnt": {"operator": "$count", "field": "n"}}}]),
                sample(),
            )
            .unwrap();
            assert_eq!(results.len(), 1);
            assert_eq!(results[0]["_id"], json!(null));
            assert_eq!(results[0]["cnt"], json!(3));
        }
    }

    #[test]
    fn test_sort_descending_and_stability() {
        let docs = vec![
            json!({"k": 1, "tag": "first"}),
            json!({"k": 2, "tag": "x"}),
            json!({"k": 1, "tag": "second"}),
        ];
        let results = run(json!([{"$sort": {"k": -1}}]), docs).unwrap();
        assert_eq!(results[0]["k"], json!(2));
        // Equal keys preserve input order
        assert_eq!(results[1]["tag"], json!("first"));
        assert_eq!(results[2]["tag"], json!("second"));
    }

    #[test]
    fn test_limit_and_skip() {
        let results = run(json!([{"$skip": 1}, {"$limit": 1}]), sample()).unwrap();
        assert_eq!(results, vec![json!({"_id": "2", "g": "a", "n": 3})]);
    }

    #[test]
    fn test_project_whitelist_only() {
        let docs = vec![json!({"_id": "1", "a": 1, "b": {"c": 2}, "drop": 3})];
        let results = run(
            json!([{"$project": {"a": 1, "nested": {"$literal": "yes"}, "drop": 0, "b.c": 1}}]),
            docs,
        )
        .unwrap();
        // No implicit _id pass-through; excluded fields simply don't appear
        assert_eq!(
            results,
            vec![json!({"a": 1, "nested": "yes", "b.c": 2})]
        );
    }

    #[test]
    fn test_project_missing_field_becomes_null() {
        let results = run(json!([{"$project": {"ghost": 1}}]), sample()).unwrap();
        assert!(results.iter().all(|d| d["ghost"] == json!(null)));
    }

    #[test]
    fn test_invalid_stage_and_operator_errors() {
        assert!(Pipeline::from_json(&json!([{"$flatten": {}}])).is_err());
        assert!(Pipeline::from_json(&json!([{"$limit": -1}])).is_err());
        assert!(Pipeline::from_json(&json!([{"$sort": {"k": 2}}])).is_err());
        assert!(Pipeline::from_json(&json!([{"$project": {"a": "str"}}])).is_err());
        assert!(Pipeline::from_json(
            &json!([{"$group": {"_id": "$g", "x": {"operator": "$median", "field": "n"}}}])
        )
        .is_err());
        assert!(Pipeline::from_json(&json!([{"$group": {"total": {"operator": "$sum"}}}])).is_err());
    }
}
