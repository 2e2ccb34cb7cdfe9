//! In-memory document store
//!
//! Collections are guarded by a single `RwLock`; each trait call takes the
//! lock once, so every call is atomic on its own. Reads that produce a plan
//! run the query for real, the way `executionStats` explains do.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Instant;

use parking_lot::RwLock;
use serde_json::{json, Map, Value};

use super::document::{Document, DocumentId, ID_FIELD};
use super::errors::{StoreError, StoreResult};
use super::index::{IndexKey, IndexOptions, IndexSpec, IndexTree, Interval, RecordId};
use super::matcher::FilterExpr;
use super::plan::{self, PlanStage};
use super::planner::{self, AccessPath, IndexChoice};
use super::projection::Projection;
use super::query::{AggregationQuery, Explainable, LogicalQuery, Stage, Verbosity};
use super::sorter::SortSpec;
use super::update::UpdateSpec;
use super::{DeleteOutcome, DocumentStore, InsertOutcome, UpdateOutcome};

#[derive(Debug, Clone)]
struct Collection {
    records: BTreeMap<RecordId, Document>,
    next_record: RecordId,
    /// `_id_` is always at position 0
    indexes: Vec<IndexTree>,
}

/// Record ids reached by an access path, in delivery order
struct Access {
    records: Vec<RecordId>,
    stage: PlanStage,
    /// True when delivery order already satisfies the requested sort
    sorted: bool,
}

impl Collection {
    fn new() -> Self {
        Self {
            records: BTreeMap::new(),
            next_record: 1,
            indexes: vec![IndexTree::new(IndexSpec::primary())],
        }
    }

    fn check_unique(&self, document: &Document, own: Option<RecordId>) -> StoreResult<()> {
        for tree in &self.indexes {
            if let Some(key) = tree.conflict(document, own) {
                return Err(duplicate_key(&tree.spec, &key));
            }
        }
        Ok(())
    }

    fn insert(&mut self, document: Document) -> StoreResult<Value> {
        let document = prepare_insert(document)?;
        self.check_unique(&document, None)?;

        let id = document.get(ID_FIELD).cloned().unwrap_or(Value::Null);
        let record = self.next_record;
        self.next_record += 1;
        for tree in &mut self.indexes {
            tree.insert(record, &document);
        }
        self.records.insert(record, document);
        Ok(id)
    }

    fn replace(&mut self, record: RecordId, updated: Document) -> StoreResult<()> {
        self.check_unique(&updated, Some(record))?;
        if let Some(old) = self.records.get(&record) {
            for tree in &mut self.indexes {
                tree.remove(record, old);
            }
        }
        for tree in &mut self.indexes {
            tree.insert(record, &updated);
        }
        self.records.insert(record, updated);
        Ok(())
    }

    fn remove(&mut self, record: RecordId) {
        if let Some(old) = self.records.remove(&record) {
            for tree in &mut self.indexes {
                tree.remove(record, &old);
            }
        }
    }

    fn add_index(&mut self, spec: IndexSpec) -> StoreResult<String> {
        if let Some(existing) = self
            .indexes
            .iter()
            .find(|t| t.spec.name == spec.name || t.spec.keys == spec.keys)
        {
            if existing.spec == spec {
                return Ok(spec.name);
            }
            return Err(StoreError::InvalidIndex(format!(
                "an index named '{}' with a conflicting definition already exists",
                existing.spec.name
            )));
        }

        let mut tree = IndexTree::new(spec);
        for (record, document) in &self.records {
            if let Some(key) = tree.conflict(document, Some(*record)) {
                return Err(duplicate_key(&tree.spec, &key));
            }
            tree.insert(*record, document);
        }

        let name = tree.spec.name.clone();
        self.indexes.push(tree);
        Ok(name)
    }

    /// Runs the chosen access path and applies the full filter
    fn access(&self, filter: &FilterExpr, sort: &SortSpec) -> Access {
        match planner::choose(filter, &self.indexes) {
            AccessPath::CollScan => {
                let records: Vec<RecordId> = self
                    .records
                    .iter()
                    .filter(|(_, d)| filter.matches(d))
                    .map(|(id, _)| *id)
                    .collect();
                let stage = PlanStage::leaf(plan::COLLSCAN)
                    .with_detail("direction", "forward")
                    .with_detail("nReturned", records.len())
                    .with_detail("docsExamined", self.records.len());
                Access {
                    records,
                    stage,
                    sorted: false,
                }
            }
            AccessPath::IdHack(key) => {
                let (candidates, keys_examined) = self.indexes[0].scan(&[Interval::point(key)]);
                let records = self.fetch_matching(&candidates, filter);
                let stage = PlanStage::leaf(plan::IDHACK)
                    .with_detail("keysExamined", keys_examined)
                    .with_detail("docsExamined", candidates.len())
                    .with_detail("nReturned", records.len());
                Access {
                    records,
                    stage,
                    sorted: true,
                }
            }
            AccessPath::IndexScan(choice) => {
                let (mut candidates, scan, sorted) = self.index_scan(&choice, sort);
                if sorted && sort.single().is_some_and(|(_, dir)| dir < 0) {
                    candidates.reverse();
                }
                let records = self.fetch_matching(&candidates, filter);
                let stage = PlanStage::wrap(plan::FETCH, scan)
                    .with_detail("nReturned", records.len())
                    .with_detail("docsExamined", candidates.len());
                Access {
                    records,
                    stage,
                    sorted,
                }
            }
            AccessPath::Union(choices) => {
                let mut seen = HashSet::new();
                let mut candidates = Vec::new();
                let mut scans = Vec::with_capacity(choices.len());
                let mut dups = 0u64;
                for choice in &choices {
                    let (ids, scan, _) = self.index_scan(choice, &SortSpec::default());
                    for id in ids {
                        if seen.insert(id) {
                            candidates.push(id);
                        } else {
                            dups += 1;
                        }
                    }
                    scans.push(scan);
                }
                let union = PlanStage::union(plan::OR, scans)
                    .with_detail("nReturned", candidates.len())
                    .with_detail("dupsDropped", dups);
                let records = self.fetch_matching(&candidates, filter);
                let stage = PlanStage::wrap(plan::FETCH, union)
                    .with_detail("nReturned", records.len())
                    .with_detail("docsExamined", candidates.len());
                Access {
                    records,
                    stage,
                    sorted: false,
                }
            }
        }
    }

    fn index_scan(&self, choice: &IndexChoice, sort: &SortSpec) -> (Vec<RecordId>, PlanStage, bool) {
        let tree = &self.indexes[choice.index];
        let (ids, keys_examined) = tree.scan(&choice.intervals);

        let leading = tree.spec.leading_field();
        let leading_dir = tree.spec.keys[0].1;
        let sorted = !tree.is_multikey()
            && sort
                .single()
                .is_some_and(|(field, _)| field == leading);
        let direction = match sort.single() {
            Some((_, dir)) if sorted && dir != leading_dir => "backward",
            _ => "forward",
        };

        let bounds: Vec<Value> = choice
            .intervals
            .iter()
            .map(|i| Value::String(i.describe()))
            .collect();
        let mut index_bounds = Map::new();
        index_bounds.insert(leading.to_string(), Value::Array(bounds));

        let stage = PlanStage::leaf(plan::IXSCAN)
            .with_detail("keyPattern", tree.spec.key_pattern())
            .with_detail("indexName", tree.spec.name.as_str())
            .with_detail("isMultiKey", tree.is_multikey())
            .with_detail("isUnique", tree.spec.unique)
            .with_detail("isSparse", tree.spec.sparse)
            .with_detail("direction", direction)
            .with_detail("indexBounds", index_bounds)
            .with_detail("keysExamined", keys_examined)
            .with_detail("nReturned", ids.len());
        (ids, stage, sorted)
    }

    fn fetch_matching(&self, candidates: &[RecordId], filter: &FilterExpr) -> Vec<RecordId> {
        candidates
            .iter()
            .copied()
            .filter(|id| self.records.get(id).is_some_and(|d| filter.matches(d)))
            .collect()
    }
}

fn duplicate_key(spec: &IndexSpec, key: &[IndexKey]) -> StoreError {
    let rendered = spec
        .fields()
        .zip(key)
        .map(|(field, k)| format!("{}: {}", field, k))
        .collect::<Vec<_>>()
        .join(", ");
    StoreError::DuplicateKey {
        index: spec.name.clone(),
        key: format!("{{ {} }}", rendered),
    }
}

/// Validates a new document and gives it an `_id` if it lacks one
fn prepare_insert(document: Document) -> StoreResult<Document> {
    if let Some(key) = document.keys().find(|k| k.starts_with('$')) {
        return Err(StoreError::InvalidDocument(format!(
            "top-level field names cannot start with '$': {}",
            key
        )));
    }

    match document.get(ID_FIELD) {
        Some(Value::Array(_)) => Err(StoreError::InvalidDocument(
            "the '_id' value cannot be an array".into(),
        )),
        Some(_) => Ok(document),
        None => {
            let mut with_id = Map::with_capacity(document.len() + 1);
            with_id.insert(ID_FIELD.to_string(), DocumentId::generate().to_value());
            with_id.extend(document);
            Ok(with_id)
        }
    }
}

/// A plan-producing read and the documents it returned
struct Execution {
    documents: Vec<Document>,
    stage: PlanStage,
}

/// Document store held entirely in memory
#[derive(Debug)]
pub struct MemoryStore {
    database: String,
    collections: RwLock<HashMap<String, Collection>>,
}

impl MemoryStore {
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collections: RwLock::new(HashMap::new()),
        }
    }

    fn namespace(&self, collection: &str) -> String {
        format!("{}.{}", self.database, collection)
    }

    fn execute_find(
        collection: Option<&Collection>,
        query: &LogicalQuery,
    ) -> StoreResult<Execution> {
        let filter = FilterExpr::parse(&query.filter)?;
        let sort = match &query.modifiers.sort {
            Some(spec) => SortSpec::parse(spec)?,
            None => SortSpec::default(),
        };
        let projection = match &query.modifiers.projection {
            Some(spec) => Projection::parse(spec)?,
            None => Projection::Identity,
        };

        let Some(collection) = collection else {
            return Ok(Execution {
                documents: Vec::new(),
                stage: PlanStage::leaf(plan::EOF).with_detail("nReturned", 0),
            });
        };

        let access = collection.access(&filter, &sort);
        let mut documents: Vec<Document> = access
            .records
            .iter()
            .filter_map(|id| collection.records.get(id).cloned())
            .collect();
        let mut stage = access.stage;

        if !sort.is_empty() && !access.sorted {
            sort.apply(&mut documents);
            let pattern = query.modifiers.sort.clone().unwrap_or_default();
            stage = PlanStage::wrap(plan::SORT, stage)
                .with_detail("sortPattern", pattern)
                .with_detail("nReturned", documents.len());
        }

        if let Some(skip) = query.modifiers.skip.filter(|n| *n > 0) {
            let skip = usize::try_from(skip).unwrap_or(usize::MAX).min(documents.len());
            documents.drain(..skip);
            stage = PlanStage::wrap(plan::SKIP, stage)
                .with_detail("skipAmount", skip)
                .with_detail("nReturned", documents.len());
        }

        if let Some(limit) = query.modifiers.limit.filter(|n| *n > 0) {
            documents.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
            stage = PlanStage::wrap(plan::LIMIT, stage)
                .with_detail("limitAmount", limit)
                .with_detail("nReturned", documents.len());
        }

        if !projection.is_identity() {
            let name = if projection.is_simple() {
                plan::PROJECTION_SIMPLE
            } else {
                plan::PROJECTION_DEFAULT
            };
            documents = documents.iter().map(|d| projection.apply(d)).collect();
            let transform = query.modifiers.projection.clone().unwrap_or_default();
            stage = PlanStage::wrap(name, stage)
                .with_detail("transformBy", transform)
                .with_detail("nReturned", documents.len());
        }

        Ok(Execution { documents, stage })
    }

    fn explain_find(
        &self,
        collection: Option<&Collection>,
        query: &LogicalQuery,
        verbosity: Verbosity,
    ) -> StoreResult<Value> {
        let started = Instant::now();
        let execution = Self::execute_find(collection, query)?;
        let elapsed = started.elapsed().as_millis() as u64;

        let mut out = Map::new();
        out.insert(
            "queryPlanner".into(),
            json!({
                "namespace": self.namespace(&query.collection),
                "parsedQuery": query.filter,
                "winningPlan": execution.stage.without_stats().to_value(),
                "rejectedPlans": [],
            }),
        );
        if verbosity == Verbosity::ExecutionStats {
            out.insert(
                "executionStats".into(),
                json!({
                    "executionSuccess": true,
                    "nReturned": execution.documents.len(),
                    "executionTimeMillis": elapsed,
                    "totalKeysExamined": execution.stage.total("keysExamined"),
                    "totalDocsExamined": execution.stage.total("docsExamined"),
                    "executionStages": execution.stage.to_value(),
                }),
            );
        }
        Ok(Value::Object(out))
    }

    /// The find an aggregation's leading `$match` turns into, plus the
    /// stages left to run after it
    fn split_pipeline(query: &AggregationQuery) -> (LogicalQuery, &[Stage]) {
        match query.leading_match() {
            Some(filter) => (
                LogicalQuery::new(query.collection.clone(), filter.clone()),
                &query.stages[1..],
            ),
            None => (
                LogicalQuery::new(query.collection.clone(), Document::new()),
                &query.stages[..],
            ),
        }
    }

    fn update(
        &self,
        collection: &str,
        filter: &Document,
        update: &Document,
        multi: bool,
    ) -> StoreResult<UpdateOutcome> {
        let filter = FilterExpr::parse(filter)?;
        let spec = UpdateSpec::parse(update)?;

        let mut collections = self.collections.write();
        let Some(coll) = collections.get_mut(collection) else {
            return Ok(UpdateOutcome {
                acknowledged: true,
                ..Default::default()
            });
        };

        let mut targets = coll.access(&filter, &SortSpec::default()).records;
        if !multi {
            targets.truncate(1);
        }

        let mut modified = 0;
        for record in &targets {
            let Some(current) = coll.records.get(record) else {
                continue;
            };
            let mut next = current.clone();
            if spec.apply(&mut next)? {
                coll.replace(*record, next)?;
                modified += 1;
            }
        }

        Ok(UpdateOutcome {
            matched_count: targets.len() as u64,
            modified_count: modified,
            acknowledged: true,
        })
    }

    fn delete(&self, collection: &str, filter: &Document, multi: bool) -> StoreResult<DeleteOutcome> {
        let filter = FilterExpr::parse(filter)?;

        let mut collections = self.collections.write();
        let Some(coll) = collections.get_mut(collection) else {
            return Ok(DeleteOutcome::default());
        };

        let mut targets = coll.access(&filter, &SortSpec::default()).records;
        if !multi {
            targets.truncate(1);
        }
        for record in &targets {
            coll.remove(*record);
        }
        Ok(DeleteOutcome {
            deleted_count: targets.len() as u64,
        })
    }
}

fn apply_stage(documents: &mut Vec<Document>, stage: &Stage) -> StoreResult<()> {
    match stage {
        Stage::Match(filter) => {
            let filter = FilterExpr::parse(filter)?;
            documents.retain(|d| filter.matches(d));
        }
        Stage::Project(spec) => {
            if spec.is_empty() {
                return Err(StoreError::InvalidProjection(
                    "$project requires at least one output field".into(),
                ));
            }
            let projection = Projection::parse(spec)?;
            *documents = documents.iter().map(|d| projection.apply(d)).collect();
        }
        Stage::Sort(spec) => {
            if spec.is_empty() {
                return Err(StoreError::InvalidQuery(
                    "$sort stage must have at least one sort key".into(),
                ));
            }
            SortSpec::parse(spec)?.apply(documents);
        }
        Stage::Skip(n) => {
            let n = usize::try_from(*n).unwrap_or(usize::MAX).min(documents.len());
            documents.drain(..n);
        }
        Stage::Limit(n) => {
            if *n == 0 {
                return Err(StoreError::InvalidQuery("the limit must be positive".into()));
            }
            documents.truncate(usize::try_from(*n).unwrap_or(usize::MAX));
        }
    }
    Ok(())
}

impl DocumentStore for MemoryStore {
    fn database(&self) -> &str {
        &self.database
    }

    fn find(&self, query: &LogicalQuery) -> StoreResult<Vec<Document>> {
        let collections = self.collections.read();
        Self::execute_find(collections.get(&query.collection), query).map(|e| e.documents)
    }

    fn count(&self, collection: &str, filter: &Document) -> StoreResult<u64> {
        let filter = FilterExpr::parse(filter)?;
        let collections = self.collections.read();
        Ok(collections.get(collection).map_or(0, |coll| {
            coll.access(&filter, &SortSpec::default()).records.len() as u64
        }))
    }

    fn explain(&self, target: Explainable<'_>, verbosity: Verbosity) -> StoreResult<Value> {
        let collections = self.collections.read();
        let collection = collections.get(target.collection());

        match target {
            Explainable::Find(query) => self.explain_find(collection, query, verbosity),
            Explainable::Aggregate(query) => {
                let (cursor_query, rest) = Self::split_pipeline(query);
                let cursor = self.explain_find(collection, &cursor_query, verbosity)?;

                let mut stages = Vec::with_capacity(rest.len() + 1);
                stages.push(json!({ "$cursor": cursor }));
                stages.extend(rest.iter().map(Stage::to_value));
                Ok(json!({ "stages": stages }))
            }
        }
    }

    fn aggregate(&self, query: &AggregationQuery) -> StoreResult<Vec<Document>> {
        let (cursor_query, rest) = Self::split_pipeline(query);
        let mut documents = {
            let collections = self.collections.read();
            Self::execute_find(collections.get(&query.collection), &cursor_query)?.documents
        };
        for stage in rest {
            apply_stage(&mut documents, stage)?;
        }
        Ok(documents)
    }

    fn insert_one(&self, collection: &str, document: Document) -> StoreResult<Value> {
        let mut collections = self.collections.write();
        collections
            .entry(collection.to_string())
            .or_insert_with(Collection::new)
            .insert(document)
    }

    fn insert_many(&self, collection: &str, documents: Vec<Document>) -> StoreResult<InsertOutcome> {
        let mut collections = self.collections.write();
        let coll = collections
            .entry(collection.to_string())
            .or_insert_with(Collection::new);

        let mut staged = coll.clone();
        let mut inserted_ids = Vec::with_capacity(documents.len());
        for document in documents {
            inserted_ids.push(staged.insert(document)?);
        }
        *coll = staged;
        Ok(InsertOutcome { inserted_ids })
    }

    fn update_one(
        &self,
        collection: &str,
        filter: &Document,
        update: &Document,
    ) -> StoreResult<UpdateOutcome> {
        self.update(collection, filter, update, false)
    }

    fn update_many(
        &self,
        collection: &str,
        filter: &Document,
        update: &Document,
    ) -> StoreResult<UpdateOutcome> {
        self.update(collection, filter, update, true)
    }

    fn delete_one(&self, collection: &str, filter: &Document) -> StoreResult<DeleteOutcome> {
        self.delete(collection, filter, false)
    }

    fn delete_many(&self, collection: &str, filter: &Document) -> StoreResult<DeleteOutcome> {
        self.delete(collection, filter, true)
    }

    fn create_index(
        &self,
        collection: &str,
        keys: &Document,
        options: IndexOptions,
    ) -> StoreResult<String> {
        let spec = IndexSpec::new(keys, options)?;
        let mut collections = self.collections.write();
        collections
            .entry(collection.to_string())
            .or_insert_with(Collection::new)
            .add_index(spec)
    }

    fn list_indexes(&self, collection: &str) -> StoreResult<Vec<IndexSpec>> {
        let collections = self.collections.read();
        Ok(collections
            .get(collection)
            .map(|coll| coll.indexes.iter().map(|t| t.spec.clone()).collect())
            .unwrap_or_default())
    }
}
