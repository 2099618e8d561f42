// shelfbase-core/src/store/memory.rs
//! In-process document store
//!
//! Collections keep documents in insertion order (keyed by a sequence
//! number) so that unsorted reads and sort ties are deterministic.
//!
//! ```text
//! MemoryStore
//!   └── RwLock<HashMap<collection, CollectionState>>
//!         ├── documents:  BTreeMap<seq, Value>
//!         ├── seq_by_id:  HashMap<DocumentId, seq>
//!         └── indexes:    Vec<SecondaryIndex>
//! ```

use crate::aggregation::Pipeline;
use crate::document::{as_object_mut, DocumentId};
use crate::error::{Result, ShelfError};
use crate::find_options::FindOptions;
use crate::index::{IndexScan, IndexSpec, ScanBounds, SecondaryIndex};
use crate::query::Query;
use crate::store::{DocumentStore, UpdateResult};
use crate::value_utils::{get_nested_value, number_value, remove_nested_value, set_nested_value};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, info};

/// Serializable form of one collection, used by [`FileStore`](crate::store::FileStore)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectionSnapshot {
    pub documents: Vec<Value>,
    #[serde(default)]
    pub indexes: Vec<IndexSpec>,
}

#[derive(Debug, Clone, Default)]
struct CollectionState {
    documents: BTreeMap<u64, Value>,
    seq_by_id: HashMap<DocumentId, u64>,
    next_seq: u64,
    last_id: u64,
    indexes: Vec<SecondaryIndex>,
}

/// How a filter will be answered
struct QueryPlan {
    index_name: Option<String>,
    scan: Option<IndexScan>,
}

impl CollectionState {
    fn push(&mut self, id: DocumentId, doc: Value) {
        for index in &mut self.indexes {
            index.insert(&id, &doc);
        }
        if let DocumentId::Int(i) = id {
            if i > 0 && i as u64 > self.last_id {
                self.last_id = i as u64;
            }
        }
        self.seq_by_id.insert(id, self.next_seq);
        self.documents.insert(self.next_seq, doc);
        self.next_seq += 1;
    }

    /// First index whose leading field carries an indexable condition
    fn plan(&self, query: &Query) -> QueryPlan {
        for index in &self.indexes {
            let bounds = query
                .field_condition(index.spec().leading_field())
                .and_then(ScanBounds::from_condition);
            if let Some(bounds) = bounds {
                return QueryPlan {
                    index_name: Some(index.name()),
                    scan: Some(index.scan(&bounds)),
                };
            }
        }
        QueryPlan {
            index_name: None,
            scan: None,
        }
    }

    /// Documents the plan has to examine, in insertion order
    fn candidates(&self, plan: &QueryPlan) -> Vec<(u64, &Value)> {
        match &plan.scan {
            Some(scan) => {
                let mut seqs: Vec<u64> = scan
                    .ids
                    .iter()
                    .filter_map(|id| self.seq_by_id.get(id).copied())
                    .collect();
                seqs.sort_unstable();
                seqs.dedup();
                seqs.into_iter()
                    .filter_map(|seq| self.documents.get(&seq).map(|doc| (seq, doc)))
                    .collect()
            }
            None => self.documents.iter().map(|(seq, doc)| (*seq, doc)).collect(),
        }
    }

    fn matching(&self, query: &Query) -> Result<Vec<(u64, &Value)>> {
        let plan = self.plan(query);
        let mut out = Vec::new();
        for (seq, doc) in self.candidates(&plan) {
            if query.matches(doc)? {
                out.push((seq, doc));
            }
        }
        Ok(out)
    }

    fn first_match(&self, query: &Query) -> Result<Option<u64>> {
        let plan = self.plan(query);
        for (seq, doc) in self.candidates(&plan) {
            if query.matches(doc)? {
                return Ok(Some(seq));
            }
        }
        Ok(None)
    }

    fn snapshot(&self) -> CollectionSnapshot {
        CollectionSnapshot {
            documents: self.documents.values().cloned().collect(),
            indexes: self.indexes.iter().map(|i| i.spec().clone()).collect(),
        }
    }
}

/// In-memory backend
pub struct MemoryStore {
    collections: RwLock<HashMap<String, CollectionState>>,
    closed: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            collections: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Rebuild a store from snapshots, recreating indexes
    pub fn from_snapshot(snapshot: HashMap<String, CollectionSnapshot>) -> Result<Self> {
        let store = MemoryStore::new();
        for (name, collection) in snapshot {
            store.insert_many(&name, collection.documents)?;
            for spec in &collection.indexes {
                store.create_index(&name, spec)?;
            }
        }
        Ok(store)
    }

    pub fn snapshot(&self) -> HashMap<String, CollectionSnapshot> {
        self.collections
            .read()
            .iter()
            .map(|(name, state)| (name.clone(), state.snapshot()))
            .collect()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ShelfError::StoreUnavailable(
                "connection is closed".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply update operators to a copy of `doc`
fn apply_update(doc: &Value, update: &Value) -> Result<Value> {
    let ops = update
        .as_object()
        .filter(|ops| !ops.is_empty())
        .ok_or_else(|| ShelfError::InvalidQuery("Update must be a non-empty object".to_string()))?;

    let mut updated = doc.clone();
    for (op, fields) in ops {
        let fields = fields
            .as_object()
            .ok_or_else(|| ShelfError::InvalidQuery(format!("{} needs an object", op)))?;
        if fields.keys().any(|f| f == "_id" || f.starts_with("_id.")) {
            return Err(ShelfError::InvalidQuery("_id is immutable".to_string()));
        }

        match op.as_str() {
            "$set" => {
                for (field, value) in fields {
                    set_nested_value(&mut updated, field, value.clone());
                }
            }
            "$unset" => {
                for field in fields.keys() {
                    remove_nested_value(&mut updated, field);
                }
            }
            "$inc" => {
                for (field, delta) in fields {
                    let delta = delta.as_f64().ok_or_else(|| {
                        ShelfError::InvalidQuery(format!("$inc amount for '{}' must be numeric", field))
                    })?;
                    let current = match get_nested_value(&updated, field) {
                        None | Some(Value::Null) => 0.0,
                        Some(v) => v.as_f64().ok_or_else(|| {
                            ShelfError::InvalidQuery(format!("Cannot $inc non-numeric field '{}'", field))
                        })?,
                    };
                    set_nested_value(&mut updated, field, number_value(current + delta));
                }
            }
            other => {
                return Err(ShelfError::InvalidQuery(format!(
                    "Unsupported update operator: {}",
                    other
                )))
            }
        }
    }
    Ok(updated)
}

impl DocumentStore for MemoryStore {
    fn insert_many(&self, collection: &str, docs: Vec<Value>) -> Result<Vec<DocumentId>> {
        self.ensure_open()?;
        let mut collections = self.collections.write();
        let state = collections.entry(collection.to_string()).or_default();

        // Prepare the whole batch before touching the collection
        let mut next_id = state.last_id;
        let mut batch_ids = HashSet::with_capacity(docs.len());
        let mut prepared = Vec::with_capacity(docs.len());
        for mut doc in docs {
            let obj = as_object_mut(&mut doc)?;
            let id = match obj.get("_id") {
                Some(id) => serde_json::from_value::<DocumentId>(id.clone())
                    .map_err(|e| ShelfError::Serialization(format!("Invalid _id: {}", e)))?,
                None => {
                    let id = DocumentId::new_auto(next_id);
                    next_id += 1;
                    obj.insert("_id".to_string(), id.to_value());
                    id
                }
            };
            if let DocumentId::Int(i) = id {
                if i > 0 {
                    next_id = next_id.max(i as u64);
                }
            }
            if state.seq_by_id.contains_key(&id) || !batch_ids.insert(id.clone()) {
                return Err(ShelfError::InvalidArgument(format!(
                    "Duplicate _id {} in '{}'",
                    id, collection
                )));
            }
            prepared.push((id, doc));
        }

        let ids: Vec<DocumentId> = prepared.iter().map(|(id, _)| id.clone()).collect();
        for (id, doc) in prepared {
            state.push(id, doc);
        }
        debug!(collection, inserted = ids.len(), "insert_many");
        Ok(ids)
    }

    fn find(&self, collection: &str, filter: &Value, options: &FindOptions) -> Result<Vec<Value>> {
        self.ensure_open()?;
        options.validate()?;
        let query = Query::from_json(filter)?;

        let collections = self.collections.read();
        let Some(state) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        let docs = state
            .matching(&query)?
            .into_iter()
            .map(|(_, doc)| doc.clone())
            .collect();
        let results = options.apply(docs);
        debug!(collection, %filter, returned = results.len(), "find");
        Ok(results)
    }

    fn count(&self, collection: &str, filter: &Value) -> Result<u64> {
        self.ensure_open()?;
        let query = Query::from_json(filter)?;
        let collections = self.collections.read();
        match collections.get(collection) {
            Some(state) => Ok(state.matching(&query)?.len() as u64),
            None => Ok(0),
        }
    }

    fn update_one(&self, collection: &str, filter: &Value, update: &Value) -> Result<UpdateResult> {
        self.ensure_open()?;
        let query = Query::from_json(filter)?;
        let mut collections = self.collections.write();
        let Some(state) = collections.get_mut(collection) else {
            return Ok(UpdateResult::default());
        };
        let Some(seq) = state.first_match(&query)? else {
            return Ok(UpdateResult::default());
        };

        let old = state.documents[&seq].clone();
        let new = apply_update(&old, update)?;
        if new == old {
            return Ok(UpdateResult {
                matched: 1,
                modified: 0,
            });
        }

        let id = DocumentId::of(&old)?;
        for index in &mut state.indexes {
            index.remove(&id, &old);
            index.insert(&id, &new);
        }
        state.documents.insert(seq, new);
        debug!(collection, %filter, %id, "update_one");
        Ok(UpdateResult {
            matched: 1,
            modified: 1,
        })
    }

    fn delete_one(&self, collection: &str, filter: &Value) -> Result<u64> {
        self.ensure_open()?;
        let query = Query::from_json(filter)?;
        let mut collections = self.collections.write();
        let Some(state) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let Some(seq) = state.first_match(&query)? else {
            return Ok(0);
        };

        if let Some(doc) = state.documents.remove(&seq) {
            let id = DocumentId::of(&doc)?;
            for index in &mut state.indexes {
                index.remove(&id, &doc);
            }
            state.seq_by_id.remove(&id);
            debug!(collection, %filter, %id, "delete_one");
        }
        Ok(1)
    }

    fn aggregate(&self, collection: &str, pipeline: &Value) -> Result<Vec<Value>> {
        self.ensure_open()?;
        let pipeline = Pipeline::from_json(pipeline)?;
        let docs = {
            let collections = self.collections.read();
            match collections.get(collection) {
                Some(state) => match pipeline.leading_match() {
                    Some(query) => state
                        .matching(query)?
                        .into_iter()
                        .map(|(_, doc)| doc.clone())
                        .collect(),
                    None => state.documents.values().cloned().collect(),
                },
                None => Vec::new(),
            }
        };
        let results = pipeline.execute(docs)?;
        debug!(collection, returned = results.len(), "aggregate");
        Ok(results)
    }

    fn create_index(&self, collection: &str, spec: &IndexSpec) -> Result<String> {
        self.ensure_open()?;
        let spec = IndexSpec::new(spec.fields.clone())?;
        let name = spec.name();

        let mut collections = self.collections.write();
        let state = collections.entry(collection.to_string()).or_default();
        if state.indexes.iter().any(|i| i.name() == name) {
            debug!(collection, index = %name, "index already exists");
            return Ok(name);
        }

        let mut index = SecondaryIndex::new(spec);
        for doc in state.documents.values() {
            index.insert(&DocumentId::of(doc)?, doc);
        }
        info!(collection, index = %name, entries = index.len(), "created index");
        state.indexes.push(index);
        Ok(name)
    }

    fn list_indexes(&self, collection: &str) -> Result<Vec<String>> {
        self.ensure_open()?;
        let collections = self.collections.read();
        Ok(collections
            .get(collection)
            .map(|state| state.indexes.iter().map(|i| i.name()).collect())
            .unwrap_or_default())
    }

    fn explain(&self, collection: &str, filter: &Value) -> Result<Value> {
        self.ensure_open()?;
        let query = Query::from_json(filter)?;
        let started = Instant::now();

        let collections = self.collections.read();
        let empty = CollectionState::default();
        let state = collections.get(collection).unwrap_or(&empty);

        let plan = state.plan(&query);
        let candidates = state.candidates(&plan);
        let docs_examined = candidates.len() as u64;
        let mut returned = 0u64;
        for (_, doc) in &candidates {
            if query.matches(doc)? {
                returned += 1;
            }
        }

        let winning_plan = match &plan.index_name {
            Some(name) => json!({
                "stage": "FETCH",
                "inputStage": {"stage": "IXSCAN", "indexName": name}
            }),
            None => json!({"stage": "COLLSCAN"}),
        };
        let keys_examined = plan.scan.as_ref().map(|s| s.keys_examined).unwrap_or(0);

        Ok(json!({
            "queryPlanner": {
                "namespace": collection,
                "parsedQuery": filter,
                "winningPlan": winning_plan,
            },
            "executionStats": {
                "nReturned": returned,
                "totalKeysExamined": keys_examined,
                "totalDocsExamined": docs_examined,
                "executionTimeMicros": started.elapsed().as_micros() as u64,
            }
        }))
    }

    fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!("memory store closed");
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }
}
