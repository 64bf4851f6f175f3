//! In-memory collection state shared by both engines.
//!
//! Every write is planned against the current state into a list of
//! [`Mutation`]s and then applied. The log engine persists the plan
//! between the two steps, so a write is either fully logged and applied
//! or not at all.

use super::{ReplaceOutcome, ScanRequest, ID_FIELD};
use crate::error::{CoreError, CoreResult};
use crate::id::EntityId;
use crate::query::{compare_documents, Filter};
use scopedb_codec::{Document, Value};
use std::collections::{BTreeMap, HashMap, HashSet};

/// A single planned change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Mutation {
    Put { collection: String, doc: Document },
    Delete { collection: String, id: EntityId },
}

impl Mutation {
    pub(crate) fn to_value(&self) -> Value {
        let mut map = BTreeMap::new();
        match self {
            Self::Put { collection, doc } => {
                map.insert("op".to_string(), Value::from("put"));
                map.insert("c".to_string(), Value::from(collection.as_str()));
                map.insert("doc".to_string(), Value::from(doc.clone()));
            }
            Self::Delete { collection, id } => {
                map.insert("op".to_string(), Value::from("del"));
                map.insert("c".to_string(), Value::from(collection.as_str()));
                map.insert("id".to_string(), Value::from(id));
            }
        }
        Value::Map(map)
    }

    pub(crate) fn from_value(value: &Value) -> CoreResult<Self> {
        let map = value
            .as_map()
            .ok_or_else(|| CoreError::invalid_format("log operation is not a map"))?;
        let text = |key: &str| {
            map.get(key)
                .and_then(Value::as_text)
                .ok_or_else(|| CoreError::invalid_format(format!("log operation missing `{key}`")))
        };
        let collection = text("c")?.to_string();
        match text("op")? {
            "put" => {
                let doc = map
                    .get("doc")
                    .and_then(Value::as_map)
                    .ok_or_else(|| CoreError::invalid_format("put operation without document"))?;
                Ok(Self::Put {
                    collection,
                    doc: Document::from(doc.clone()),
                })
            }
            "del" => Ok(Self::Delete {
                collection,
                id: EntityId::from_hex(text("id")?)?,
            }),
            other => Err(CoreError::invalid_format(format!(
                "unknown log operation `{other}`"
            ))),
        }
    }
}

/// Collections of documents keyed by id.
#[derive(Debug, Default)]
pub(crate) struct Collections {
    inner: HashMap<String, BTreeMap<EntityId, Document>>,
}

pub(crate) fn document_id(doc: &Document) -> CoreResult<EntityId> {
    match doc.get(ID_FIELD) {
        Some(value) => EntityId::try_from(value),
        None => Err(CoreError::invalid_operation("document has no _id")),
    }
}

impl Collections {
    fn collection(&self, name: &str) -> Option<&BTreeMap<EntityId, Document>> {
        self.inner.get(name)
    }

    fn contains(&self, collection: &str, id: &EntityId) -> bool {
        self.collection(collection)
            .is_some_and(|docs| docs.contains_key(id))
    }

    fn matching<'a>(
        &'a self,
        collection: &str,
        filter: &'a Filter,
    ) -> impl Iterator<Item = (&'a EntityId, &'a Document)> + 'a {
        self.collection(collection)
            .into_iter()
            .flat_map(|docs| docs.iter())
            .filter(move |(_, doc)| filter.matches(doc))
    }

    pub(crate) fn plan_insert(&self, collection: &str, docs: Vec<Document>) -> CoreResult<Vec<Mutation>> {
        let mut seen = HashSet::with_capacity(docs.len());
        let mut plan = Vec::with_capacity(docs.len());
        for doc in docs {
            let id = document_id(&doc)?;
            if !seen.insert(id) || self.contains(collection, &id) {
                return Err(CoreError::DuplicateId {
                    collection: collection.to_string(),
                    id: id.to_hex(),
                });
            }
            plan.push(Mutation::Put {
                collection: collection.to_string(),
                doc,
            });
        }
        Ok(plan)
    }

    pub(crate) fn plan_replace(
        &self,
        collection: &str,
        filter: &Filter,
        doc: Document,
        upsert: bool,
    ) -> CoreResult<(ReplaceOutcome, Vec<Mutation>)> {
        let new_id = document_id(&doc)?;
        let matched = self.matching(collection, filter).map(|(id, _)| *id).next();
        let duplicate = || CoreError::DuplicateId {
            collection: collection.to_string(),
            id: new_id.to_hex(),
        };

        let mut plan = Vec::with_capacity(2);
        let outcome = match matched {
            Some(old_id) => {
                if old_id != new_id {
                    if self.contains(collection, &new_id) {
                        return Err(duplicate());
                    }
                    plan.push(Mutation::Delete {
                        collection: collection.to_string(),
                        id: old_id,
                    });
                }
                ReplaceOutcome::Replaced
            }
            None if upsert => {
                if self.contains(collection, &new_id) {
                    return Err(duplicate());
                }
                ReplaceOutcome::Inserted
            }
            None => return Ok((ReplaceOutcome::Missed, plan)),
        };
        plan.push(Mutation::Put {
            collection: collection.to_string(),
            doc,
        });
        Ok((outcome, plan))
    }

    pub(crate) fn plan_update_fields(
        &self,
        collection: &str,
        filter: &Filter,
        set: &Document,
    ) -> CoreResult<Vec<Mutation>> {
        if set.contains(ID_FIELD) {
            return Err(CoreError::invalid_operation("cannot change _id with a field update"));
        }
        Ok(self
            .matching(collection, filter)
            .map(|(_, doc)| {
                let mut updated = doc.clone();
                updated.merge(set);
                Mutation::Put {
                    collection: collection.to_string(),
                    doc: updated,
                }
            })
            .collect())
    }

    pub(crate) fn plan_delete(&self, collection: &str, filter: &Filter) -> Vec<Mutation> {
        self.matching(collection, filter)
            .map(|(id, _)| Mutation::Delete {
                collection: collection.to_string(),
                id: *id,
            })
            .collect()
    }

    pub(crate) fn count(&self, collection: &str, filter: &Filter) -> u64 {
        self.matching(collection, filter).count() as u64
    }

    /// Materializes a scan: filter, stable sort over `_id` order, then window.
    pub(crate) fn select(&self, collection: &str, request: &ScanRequest) -> Vec<Document> {
        let mut docs: Vec<&Document> = self
            .matching(collection, &request.filter)
            .map(|(_, doc)| doc)
            .collect();
        if !request.sort.is_empty() {
            docs.sort_by(|a, b| compare_documents(&request.sort, a, b));
        }
        docs.into_iter()
            .skip(request.skip)
            .take(request.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    pub(crate) fn apply(&mut self, plan: Vec<Mutation>) -> CoreResult<()> {
        for mutation in plan {
            match mutation {
                Mutation::Put { collection, doc } => {
                    let id = document_id(&doc)?;
                    self.inner.entry(collection).or_default().insert(id, doc);
                }
                Mutation::Delete { collection, id } => {
                    if let Some(docs) = self.inner.get_mut(&collection) {
                        docs.remove(&id);
                    }
                }
            }
        }
        Ok(())
    }

    /// Total number of stored documents.
    pub(crate) fn len(&self) -> usize {
        self.inner.values().map(BTreeMap::len).sum()
    }

    /// Every stored document as a `Put`, for rewriting a log.
    pub(crate) fn snapshot(&self) -> Vec<Mutation> {
        self.inner
            .iter()
            .flat_map(|(collection, docs)| {
                docs.values().map(move |doc| Mutation::Put {
                    collection: collection.clone(),
                    doc: doc.clone(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::SortOrder;

    fn doc(n: u8, name: &str) -> Document {
        let mut d = Document::new();
        d.set(ID_FIELD, EntityId::from_bytes([n; 12]));
        d.set("name", name);
        d
    }

    fn loaded(docs: Vec<Document>) -> Collections {
        let mut state = Collections::default();
        let plan = state.plan_insert("c", docs).unwrap();
        state.apply(plan).unwrap();
        state
    }

    #[test]
    fn insert_rejects_duplicates_in_batch_and_store() {
        let state = loaded(vec![doc(1, "a")]);
        assert!(matches!(
            state.plan_insert("c", vec![doc(1, "again")]),
            Err(CoreError::DuplicateId { .. })
        ));
        assert!(matches!(
            state.plan_insert("c", vec![doc(2, "x"), doc(2, "y")]),
            Err(CoreError::DuplicateId { .. })
        ));
        assert!(state.plan_insert("other", vec![doc(1, "a")]).is_ok());
    }

    #[test]
    fn replace_outcomes() {
        let state = loaded(vec![doc(1, "a")]);
        let by_id = Filter::eq(ID_FIELD, EntityId::from_bytes([1; 12]));

        let (outcome, plan) = state.plan_replace("c", &by_id, doc(1, "b"), false).unwrap();
        assert_eq!(outcome, ReplaceOutcome::Replaced);
        assert_eq!(plan.len(), 1);

        let miss = Filter::eq("name", "zzz");
        let (outcome, plan) = state.plan_replace("c", &miss, doc(2, "b"), false).unwrap();
        assert_eq!(outcome, ReplaceOutcome::Missed);
        assert!(plan.is_empty());

        let (outcome, _) = state.plan_replace("c", &miss, doc(2, "b"), true).unwrap();
        assert_eq!(outcome, ReplaceOutcome::Inserted);

        assert!(matches!(
            state.plan_replace("c", &miss, doc(1, "b"), true),
            Err(CoreError::DuplicateId { .. })
        ));
    }

    #[test]
    fn update_fields_merges() {
        let mut state = loaded(vec![doc(1, "a"), doc(2, "b")]);
        let mut set = Document::new();
        set.set("address.city", "Oslo");
        let plan = state.plan_update_fields("c", &Filter::eq("name", "a"), &set).unwrap();
        assert_eq!(plan.len(), 1);
        state.apply(plan).unwrap();
        assert_eq!(state.count("c", &Filter::eq("address.city", "Oslo")), 1);
    }

    #[test]
    fn select_sorts_then_windows() {
        let state = loaded(vec![doc(1, "c"), doc(2, "a"), doc(3, "b")]);
        let request = ScanRequest::new(Filter::All)
            .sorted(vec![SortOrder::asc("name")])
            .window(1, Some(1));
        let docs = state.select("c", &request);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].get("name"), Some(&Value::from("b")));
    }

    #[test]
    fn mutation_value_round_trip() {
        let put = Mutation::Put {
            collection: "c".into(),
            doc: doc(4, "x"),
        };
        let del = Mutation::Delete {
            collection: "c".into(),
            id: EntityId::from_bytes([4; 12]),
        };
        assert_eq!(Mutation::from_value(&put.to_value()).unwrap(), put);
        assert_eq!(Mutation::from_value(&del.to_value()).unwrap(), del);
        assert!(Mutation::from_value(&Value::from("nope")).is_err());
    }
}
