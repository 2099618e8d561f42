// shelfbase-core/src/aggregation.rs
// Aggregation pipeline implementation

use crate::error::{Result, ShelfError};
use crate::find_options::apply_sort;
use crate::query::Query;
use crate::value_utils::{as_number, get_nested_value, number_value};
use serde_json::{Map, Value};
use std::collections::HashMap;

fn agg_error(message: impl Into<String>) -> ShelfError {
    ShelfError::AggregationError(message.into())
}

/// Split a single-key object into its `(key, value)` pair
fn single_entry<'a>(obj: &'a Map<String, Value>, what: &str) -> Result<(&'a String, &'a Value)> {
    let mut entries = obj.iter();
    match (entries.next(), entries.next()) {
        (Some(entry), None) => Ok(entry),
        _ => Err(agg_error(format!("{} must have exactly one operator", what))),
    }
}

// ============================================================================
// EXPRESSIONS
// ============================================================================

/// Expression evaluated against a single document
///
/// Used by `$project` computed fields, `$group._id` and accumulators.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// `"$field"` or `"$nested.field"`
    Field(String),
    Literal(Value),
    Operator(ExprOp, Vec<Expression>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExprOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Mod,
    Floor,
    Round,
    ToString,
    Concat,
}

impl ExprOp {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "$add" => ExprOp::Add,
            "$subtract" => ExprOp::Subtract,
            "$multiply" => ExprOp::Multiply,
            "$divide" => ExprOp::Divide,
            "$mod" => ExprOp::Mod,
            "$floor" => ExprOp::Floor,
            "$round" => ExprOp::Round,
            "$toString" => ExprOp::ToString,
            "$concat" => ExprOp::Concat,
            _ => return None,
        })
    }

    /// Accepted argument counts (min, max)
    fn arity(self) -> (usize, usize) {
        match self {
            ExprOp::Add | ExprOp::Multiply | ExprOp::Concat => (1, usize::MAX),
            ExprOp::Subtract | ExprOp::Divide | ExprOp::Mod => (2, 2),
            ExprOp::Floor | ExprOp::ToString => (1, 1),
            ExprOp::Round => (1, 2),
        }
    }
}

impl Expression {
    pub fn from_json(value: &Value) -> Result<Self> {
        match value {
            Value::String(s) if s.starts_with('$') => {
                Ok(Expression::Field(s.trim_start_matches('$').to_string()))
            }
            Value::Object(obj) if obj.keys().any(|k| k.starts_with('$')) => {
                let (name, args) = single_entry(obj, "Expression")?;
                let op = ExprOp::from_name(name)
                    .ok_or_else(|| agg_error(format!("Unknown expression operator: {}", name)))?;
                let args = match args {
                    Value::Array(items) => items
                        .iter()
                        .map(Expression::from_json)
                        .collect::<Result<Vec<_>>>()?,
                    single => vec![Expression::from_json(single)?],
                };
                let (min, max) = op.arity();
                if args.len() < min || args.len() > max {
                    return Err(agg_error(format!(
                        "{} got {} argument(s)",
                        name,
                        args.len()
                    )));
                }
                Ok(Expression::Operator(op, args))
            }
            other => Ok(Expression::Literal(other.clone())),
        }
    }

    pub fn evaluate(&self, doc: &Value) -> Result<Value> {
        match self {
            Expression::Field(path) => Ok(get_nested_value(doc, path).cloned().unwrap_or(Value::Null)),
            Expression::Literal(value) => Ok(value.clone()),
            Expression::Operator(op, args) => {
                let values = args
                    .iter()
                    .map(|arg| arg.evaluate(doc))
                    .collect::<Result<Vec<_>>>()?;
                evaluate_operator(*op, &values)
            }
        }
    }
}

fn evaluate_operator(op: ExprOp, values: &[Value]) -> Result<Value> {
    match op {
        ExprOp::ToString => Ok(match &values[0] {
            Value::Null => Value::Null,
            Value::String(s) => Value::String(s.clone()),
            other => Value::String(other.to_string()),
        }),
        ExprOp::Concat => {
            let mut out = String::new();
            for value in values {
                match value {
                    Value::Null => return Ok(Value::Null),
                    Value::String(s) => out.push_str(s),
                    other => return Err(agg_error(format!("$concat only supports strings, got {}", other))),
                }
            }
            Ok(Value::String(out))
        }
        ExprOp::Round => {
            let places = match values.get(1) {
                Some(p) => p
                    .as_i64()
                    .ok_or_else(|| agg_error("$round place must be an integer"))?,
                None => 0,
            };
            Ok(match as_number(&values[0]) {
                Some(n) => {
                    let factor = 10f64.powi(places as i32);
                    number_value((n * factor).round() / factor)
                }
                None => Value::Null,
            })
        }
        _ => {
            // Arithmetic: any missing or non-numeric operand yields null
            let Some(nums) = values.iter().map(as_number).collect::<Option<Vec<f64>>>() else {
                return Ok(Value::Null);
            };
            let result = match op {
                ExprOp::Add => nums.iter().sum(),
                ExprOp::Multiply => nums.iter().product(),
                ExprOp::Subtract => nums[0] - nums[1],
                ExprOp::Divide | ExprOp::Mod if nums[1] == 0.0 => {
                    return Err(agg_error("Division by zero"));
                }
                ExprOp::Divide => nums[0] / nums[1],
                ExprOp::Mod => nums[0] % nums[1],
                ExprOp::Floor => nums[0].floor(),
                _ => unreachable!("non-arithmetic operators handled above"),
            };
            Ok(number_value(result))
        }
    }
}

// ============================================================================
// PIPELINE
// ============================================================================

/// Aggregation pipeline
#[derive(Debug, Clone)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

/// Pipeline stage
#[derive(Debug, Clone)]
pub enum Stage {
    Match(Query),
    Project(ProjectStage),
    Group(GroupStage),
    Sort(Vec<(String, i32)>),
    Skip(usize),
    Limit(usize),
}

/// $project stage - reshape documents
#[derive(Debug, Clone)]
pub struct ProjectStage {
    fields: Vec<(String, ProjectField)>,
}

#[derive(Debug, Clone)]
pub enum ProjectField {
    Include,
    Exclude,
    Computed(Expression),
}

/// $group stage - group documents and compute aggregates
#[derive(Debug, Clone)]
pub struct GroupStage {
    id: Expression,
    accumulators: Vec<(String, Accumulator)>,
}

#[derive(Debug, Clone)]
pub enum Accumulator {
    Sum(Expression),
    Avg(Expression),
    Min(Expression),
    Max(Expression),
    First(Expression),
    Last(Expression),
}

impl Pipeline {
    /// Create pipeline from JSON array
    pub fn from_json(pipeline_json: &Value) -> Result<Self> {
        let stages_array = pipeline_json
            .as_array()
            .ok_or_else(|| agg_error("Pipeline must be an array"))?;
        if stages_array.is_empty() {
            return Err(agg_error("Pipeline cannot be empty"));
        }

        let stages = stages_array
            .iter()
            .map(Stage::from_json)
            .collect::<Result<Vec<_>>>()?;
        Ok(Pipeline { stages })
    }

    /// Leading `$match` filter, if any, so the store can pre-filter
    pub fn leading_match(&self) -> Option<&Query> {
        match self.stages.first() {
            Some(Stage::Match(query)) => Some(query),
            _ => None,
        }
    }

    /// Execute pipeline on documents
    pub fn execute(&self, mut docs: Vec<Value>) -> Result<Vec<Value>> {
        for stage in &self.stages {
            docs = stage.execute(docs)?;
        }
        Ok(docs)
    }
}

impl Stage {
    fn from_json(stage_json: &Value) -> Result<Self> {
        let obj = stage_json
            .as_object()
            .ok_or_else(|| agg_error("Stage must be an object"))?;
        let (stage_name, spec) = single_entry(obj, "Each stage")?;

        match stage_name.as_str() {
            "$match" => Ok(Stage::Match(Query::from_json(spec)?)),
            "$project" => Ok(Stage::Project(ProjectStage::from_json(spec)?)),
            "$group" => Ok(Stage::Group(GroupStage::from_json(spec)?)),
            "$sort" => {
                let keys = spec
                    .as_object()
                    .ok_or_else(|| agg_error("$sort must be an object"))?;
                let mut sort = Vec::with_capacity(keys.len());
                for (field, dir) in keys {
                    match dir.as_i64() {
                        Some(d @ (1 | -1)) => sort.push((field.clone(), d as i32)),
                        _ => return Err(agg_error(format!("$sort direction for '{}' must be 1 or -1", field))),
                    }
                }
                Ok(Stage::Sort(sort))
            }
            "$skip" => Ok(Stage::Skip(parse_count(spec, "$skip")?)),
            "$limit" => Ok(Stage::Limit(parse_count(spec, "$limit")?)),
            _ => Err(agg_error(format!("Unknown pipeline stage: {}", stage_name))),
        }
    }

    fn execute(&self, docs: Vec<Value>) -> Result<Vec<Value>> {
        match self {
            Stage::Match(query) => {
                let mut results = Vec::new();
                for doc in docs {
                    if query.matches(&doc)? {
                        results.push(doc);
                    }
                }
                Ok(results)
            }
            Stage::Project(stage) => docs.iter().map(|doc| stage.project_document(doc)).collect(),
            Stage::Group(stage) => stage.execute(docs),
            Stage::Sort(sort) => {
                let mut docs = docs;
                apply_sort(&mut docs, sort);
                Ok(docs)
            }
            Stage::Skip(n) => Ok(docs.into_iter().skip(*n).collect()),
            Stage::Limit(n) => Ok(docs.into_iter().take(*n).collect()),
        }
    }
}

fn parse_count(spec: &Value, stage: &str) -> Result<usize> {
    spec.as_u64()
        .map(|n| n as usize)
        .ok_or_else(|| agg_error(format!("{} must be a non-negative integer", stage)))
}

impl ProjectStage {
    fn from_json(spec: &Value) -> Result<Self> {
        let obj = spec
            .as_object()
            .ok_or_else(|| agg_error("$project must be an object"))?;

        let mut fields = Vec::with_capacity(obj.len());
        for (field, value) in obj {
            let action = match value {
                Value::Bool(true) => ProjectField::Include,
                Value::Bool(false) => ProjectField::Exclude,
                Value::Number(n) if n.as_i64() == Some(1) => ProjectField::Include,
                Value::Number(n) if n.as_i64() == Some(0) => ProjectField::Exclude,
                Value::String(s) if s.starts_with('$') => ProjectField::Computed(Expression::from_json(value)?),
                Value::Object(_) => ProjectField::Computed(Expression::from_json(value)?),
                other => {
                    return Err(agg_error(format!(
                        "Invalid $project value for '{}': {}",
                        field, other
                    )))
                }
            };
            fields.push((field.clone(), action));
        }

        let include_mode = fields
            .iter()
            .any(|(_, a)| !matches!(a, ProjectField::Exclude));
        let non_id_exclusions = fields
            .iter()
            .any(|(f, a)| matches!(a, ProjectField::Exclude) && f != "_id");
        if include_mode && non_id_exclusions {
            return Err(agg_error("$project cannot mix inclusion and exclusion"));
        }

        Ok(ProjectStage { fields })
    }

    fn project_document(&self, doc: &Value) -> Result<Value> {
        let Value::Object(obj) = doc else {
            return Err(agg_error("$project input must be a document"));
        };

        let include_mode = self
            .fields
            .iter()
            .any(|(_, a)| !matches!(a, ProjectField::Exclude));
        let action_for = |field: &str| self.fields.iter().find(|(f, _)| f == field).map(|(_, a)| a);

        let mut result = Map::new();
        if include_mode {
            if !matches!(action_for("_id"), Some(ProjectField::Exclude)) {
                if let Some(id) = obj.get("_id") {
                    result.insert("_id".to_string(), id.clone());
                }
            }
            for (field, action) in &self.fields {
                match action {
                    ProjectField::Include => {
                        if let Some(value) = get_nested_value(doc, field) {
                            result.insert(field.clone(), value.clone());
                        }
                    }
                    ProjectField::Computed(expr) => {
                        result.insert(field.clone(), expr.evaluate(doc)?);
                    }
                    ProjectField::Exclude => {}
                }
            }
        } else {
            for (field, value) in obj {
                if action_for(field).is_none() {
                    result.insert(field.clone(), value.clone());
                }
            }
        }

        Ok(Value::Object(result))
    }
}

impl GroupStage {
    fn from_json(spec: &Value) -> Result<Self> {
        let obj = spec
            .as_object()
            .ok_or_else(|| agg_error("$group must be an object"))?;
        let id = obj
            .get("_id")
            .map(Expression::from_json)
            .transpose()?
            .ok_or_else(|| agg_error("Group stage must have _id field"))?;

        let mut accumulators = Vec::new();
        for (field, value) in obj {
            if field == "_id" {
                continue;
            }
            accumulators.push((field.clone(), Accumulator::from_json(value)?));
        }

        Ok(GroupStage { id, accumulators })
    }

    /// Groups are emitted in the order their key is first seen
    fn execute(&self, docs: Vec<Value>) -> Result<Vec<Value>> {
        let mut positions: HashMap<String, usize> = HashMap::new();
        let mut groups: Vec<(Value, Vec<Value>)> = Vec::new();

        for doc in docs {
            let key = self.id.evaluate(&doc)?;
            let canonical = serde_json::to_string(&key)?;
            match positions.get(&canonical) {
                Some(&pos) => groups[pos].1.push(doc),
                None => {
                    positions.insert(canonical, groups.len());
                    groups.push((key, vec![doc]));
                }
            }
        }

        let mut results = Vec::with_capacity(groups.len());
        for (key, group_docs) in groups {
            let mut result = Map::new();
            result.insert("_id".to_string(), key);
            for (field, accumulator) in &self.accumulators {
                result.insert(field.clone(), accumulator.compute(&group_docs)?);
            }
            results.push(Value::Object(result));
        }
        Ok(results)
    }
}

impl Accumulator {
    fn from_json(spec: &Value) -> Result<Self> {
        let obj = spec
            .as_object()
            .ok_or_else(|| agg_error("Accumulator must be an object"))?;
        let (op, value) = single_entry(obj, "Accumulator")?;
        let expr = Expression::from_json(value)?;

        match op.as_str() {
            "$sum" => Ok(Accumulator::Sum(expr)),
            "$avg" => Ok(Accumulator::Avg(expr)),
            "$min" => Ok(Accumulator::Min(expr)),
            "$max" => Ok(Accumulator::Max(expr)),
            "$first" => Ok(Accumulator::First(expr)),
            "$last" => Ok(Accumulator::Last(expr)),
            _ => Err(agg_error(format!("Unknown accumulator: {}", op))),
        }
    }

    fn numbers(expr: &Expression, docs: &[Value]) -> Result<Vec<f64>> {
        let mut nums = Vec::with_capacity(docs.len());
        for doc in docs {
            if let Some(n) = as_number(&expr.evaluate(doc)?) {
                nums.push(n);
            }
        }
        Ok(nums)
    }

    fn compute(&self, docs: &[Value]) -> Result<Value> {
        match self {
            Accumulator::Sum(expr) => Ok(number_value(Self::numbers(expr, docs)?.iter().sum())),
            Accumulator::Avg(expr) => {
                let nums = Self::numbers(expr, docs)?;
                if nums.is_empty() {
                    return Ok(Value::Null);
                }
                Ok(number_value(nums.iter().sum::<f64>() / nums.len() as f64))
            }
            Accumulator::Min(expr) => Ok(Self::numbers(expr, docs)?
                .into_iter()
                .reduce(f64::min)
                .map(number_value)
                .unwrap_or(Value::Null)),
            Accumulator::Max(expr) => Ok(Self::numbers(expr, docs)?
                .into_iter()
                .reduce(f64::max)
                .map(number_value)
                .unwrap_or(Value::Null)),
            Accumulator::First(expr) => match docs.first() {
                Some(doc) => expr.evaluate(doc),
                None => Ok(Value::Null),
            },
            Accumulator::Last(expr) => match docs.last() {
                Some(doc) => expr.evaluate(doc),
                None => Ok(Value::Null),
            },
        }
    }
}
