//! Persistence collaborator consumed by the import engine.
//!
//! The engine never talks to a database directly. It inserts finished
//! records through [`EntityStore::insert`], uses a handful of narrow update
//! operations while resolving deferred references, and brackets everything
//! in one transaction via `begin`/`commit`/`rollback`.

use crate::import::model::{Category, Record};
use thiserror::Error;
use tracing::warn;

/// Typed failure reported by the persistence layer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PersistError {
    #[error("{category} already exists: {key}")]
    Duplicate { category: Category, key: String },

    #[error("invalid {category}: {reason}")]
    Validation { category: Category, reason: String },

    #[error("{category} {id} is locked by {holder}")]
    LockConflict {
        category: Category,
        id: i64,
        holder: String,
    },

    #[error("{category} references missing {parent} {id}")]
    MissingParent {
        category: Category,
        parent: Category,
        id: i64,
    },

    #[error("database error: {0}")]
    Backend(String),
}

impl PersistError {
    /// A natural-key duplicate on a globally shared category leaves the
    /// existing row untouched and lets the import carry on. Everything else
    /// aborts the import.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PersistError::Duplicate {
                category: Category::KeywordDefinition | Category::CoreData,
                ..
            }
        )
    }
}

/// Advisory row locks shared with other sessions of the multi-user system.
pub trait RecordLocks {
    /// Fails with [`PersistError::LockConflict`] when another owner holds it.
    fn acquire(&mut self, category: Category, id: i64) -> Result<(), PersistError>;
    fn release(&mut self, category: Category, id: i64) -> Result<(), PersistError>;
}

/// Insert-only persistence per category plus the narrow updates needed by
/// the deferred reference passes.
pub trait EntityStore: RecordLocks {
    fn begin(&mut self) -> Result<(), PersistError>;
    fn commit(&mut self) -> Result<(), PersistError>;
    fn rollback(&mut self) -> Result<(), PersistError>;

    /// Inserts a fully resolved record and returns its new surrogate id.
    fn insert(&mut self, record: &Record) -> Result<i64, PersistError>;

    fn set_collection_parent(&mut self, id: i64, parent_id: i64) -> Result<(), PersistError>;

    fn set_transcript_links(
        &mut self,
        id: i64,
        clip_id: i64,
        source_transcript_id: i64,
    ) -> Result<(), PersistError>;

    /// Rich-text body of a document, quote or transcript.
    fn body(&mut self, category: Category, id: i64) -> Result<Option<String>, PersistError>;

    fn set_body(&mut self, category: Category, id: i64, body: &str) -> Result<(), PersistError>;
}

/// Holds a row lock for the guard's lifetime; release is attempted on drop
/// on every path, including early returns with `?`.
pub struct LockGuard<'a, S: RecordLocks + ?Sized> {
    store: &'a mut S,
    category: Category,
    id: i64,
}

impl<'a, S: RecordLocks + ?Sized> LockGuard<'a, S> {
    pub fn acquire(store: &'a mut S, category: Category, id: i64) -> Result<Self, PersistError> {
        store.acquire(category, id)?;
        Ok(LockGuard {
            store,
            category,
            id,
        })
    }

    pub fn store(&mut self) -> &mut S {
        self.store
    }
}

impl<S: RecordLocks + ?Sized> Drop for LockGuard<'_, S> {
    fn drop(&mut self) {
        if let Err(e) = self.store.release(self.category, self.id) {
            warn!(category = %self.category, id = self.id, error = %e, "failed to release record lock");
        }
    }
}

/// In-memory store used by unit tests across the engine.
#[cfg(test)]
pub mod memory {
    use super::*;
    use crate::import::model::{
        CollectionRecord, DocumentRecord, QuoteRecord, TranscriptRecord,
    };
    use std::collections::{BTreeMap, HashMap};

    #[derive(Debug, Clone, Default)]
    struct Tables {
        rows: BTreeMap<(Category, i64), Record>,
        next: HashMap<Category, i64>,
    }

    #[derive(Debug, Default)]
    pub struct MemoryStore {
        live: Tables,
        snapshot: Option<Tables>,
        pub locks: HashMap<(Category, i64), String>,
        pub owner: String,
        pub begins: usize,
        pub commits: usize,
        pub rollbacks: usize,
        /// Fails the n-th insert (1-based) with the given error.
        pub fail_insert: Option<(usize, PersistError)>,
        inserts: usize,
    }

    impl MemoryStore {
        pub fn new() -> Self {
            MemoryStore {
                owner: "test".into(),
                ..Default::default()
            }
        }

        pub fn get(&self, category: Category, id: i64) -> Option<&Record> {
            self.live.rows.get(&(category, id))
        }

        pub fn count(&self, category: Category) -> usize {
            self.live.rows.keys().filter(|(c, _)| *c == category).count()
        }

        pub fn all(&self, category: Category) -> Vec<(i64, &Record)> {
            self.live
                .rows
                .iter()
                .filter(|((c, _), _)| *c == category)
                .map(|((_, id), r)| (*id, r))
                .collect()
        }

        pub fn in_transaction(&self) -> bool {
            self.snapshot.is_some()
        }

        fn exists(&self, category: Category, id: i64) -> bool {
            id == 0 || self.live.rows.contains_key(&(category, id))
        }
    }

    impl RecordLocks for MemoryStore {
        fn acquire(&mut self, category: Category, id: i64) -> Result<(), PersistError> {
            match self.locks.get(&(category, id)) {
                Some(holder) if *holder != self.owner => Err(PersistError::LockConflict {
                    category,
                    id,
                    holder: holder.clone(),
                }),
                _ => {
                    self.locks.insert((category, id), self.owner.clone());
                    Ok(())
                }
            }
        }

        fn release(&mut self, category: Category, id: i64) -> Result<(), PersistError> {
            if self.locks.get(&(category, id)) == Some(&self.owner) {
                self.locks.remove(&(category, id));
            }
            Ok(())
        }
    }

    impl EntityStore for MemoryStore {
        fn begin(&mut self) -> Result<(), PersistError> {
            self.begins += 1;
            self.snapshot = Some(self.live.clone());
            Ok(())
        }

        fn commit(&mut self) -> Result<(), PersistError> {
            self.commits += 1;
            self.snapshot = None;
            Ok(())
        }

        fn rollback(&mut self) -> Result<(), PersistError> {
            self.rollbacks += 1;
            if let Some(t) = self.snapshot.take() {
                self.live = t;
            }
            Ok(())
        }

        fn insert(&mut self, record: &Record) -> Result<i64, PersistError> {
            self.inserts += 1;
            if let Some((n, err)) = &self.fail_insert {
                if *n == self.inserts {
                    return Err(err.clone());
                }
            }
            let category = record.category();
            let parent = match record {
                Record::Document(r) => Some((Category::Library, r.library_num)),
                Record::Episode(r) => Some((Category::Library, r.library_num)),
                Record::Quote(r) => Some((Category::Collection, r.collection_num)),
                Record::Clip(r) => Some((Category::Collection, r.collection_num)),
                _ => None,
            };
            if let Some((parent, id)) = parent {
                if !self.exists(parent, id) {
                    return Err(PersistError::MissingParent { category, parent, id });
                }
            }
            if let Record::KeywordDefinition(k) = record {
                let dup = self.live.rows.values().any(|r| {
                    matches!(r, Record::KeywordDefinition(o)
                        if o.keyword_group == k.keyword_group && o.keyword == k.keyword)
                });
                if dup {
                    return Err(PersistError::Duplicate {
                        category,
                        key: format!("{} : {}", k.keyword_group, k.keyword),
                    });
                }
            }
            let next = self.live.next.entry(category).or_insert(100);
            *next += 1;
            let id = *next;
            self.live.rows.insert((category, id), record.clone());
            Ok(id)
        }

        fn set_collection_parent(&mut self, id: i64, parent_id: i64) -> Result<(), PersistError> {
            match self.live.rows.get_mut(&(Category::Collection, id)) {
                Some(Record::Collection(CollectionRecord { parent_num, .. })) => {
                    *parent_num = parent_id;
                    Ok(())
                }
                _ => Err(PersistError::Backend(format!("no collection {id}"))),
            }
        }

        fn set_transcript_links(
            &mut self,
            id: i64,
            clip_id: i64,
            source_transcript_id: i64,
        ) -> Result<(), PersistError> {
            match self.live.rows.get_mut(&(Category::Transcript, id)) {
                Some(Record::Transcript(TranscriptRecord {
                    clip_num,
                    source_transcript_num,
                    ..
                })) => {
                    *clip_num = clip_id;
                    *source_transcript_num = source_transcript_id;
                    Ok(())
                }
                _ => Err(PersistError::Backend(format!("no transcript {id}"))),
            }
        }

        fn body(&mut self, category: Category, id: i64) -> Result<Option<String>, PersistError> {
            Ok(self
                .live
                .rows
                .get(&(category, id))
                .and_then(|r| r.rich_text())
                .map(str::to_string))
        }

        fn set_body(&mut self, category: Category, id: i64, text: &str) -> Result<(), PersistError> {
            match self.live.rows.get_mut(&(category, id)) {
                Some(Record::Document(DocumentRecord { body, .. }))
                | Some(Record::Quote(QuoteRecord { body, .. }))
                | Some(Record::Transcript(TranscriptRecord { body, .. })) => {
                    *body = text.to_string();
                    Ok(())
                }
                _ => Err(PersistError::Backend(format!("no body for {category} {id}"))),
            }
        }
    }
}
