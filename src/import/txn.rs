use crate::store::{EntityStore, PersistError};
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TxState {
    NotStarted,
    InProgress,
    Committed,
    RolledBack,
}

/// Brackets an import in one store transaction. The transaction begins on
/// first use; dropping while it is still open rolls it back.
pub struct ImportTransaction<'a, S: EntityStore + ?Sized> {
    store: &'a mut S,
    state: TxState,
}

impl<'a, S: EntityStore + ?Sized> ImportTransaction<'a, S> {
    pub fn new(store: &'a mut S) -> Self {
        ImportTransaction {
            store,
            state: TxState::NotStarted,
        }
    }

    pub fn state(&self) -> TxState {
        self.state
    }

    /// Store handle for persistence calls; begins the transaction if needed.
    pub fn store(&mut self) -> Result<&mut S, PersistError> {
        match self.state {
            TxState::NotStarted => {
                self.store.begin()?;
                self.state = TxState::InProgress;
            }
            TxState::InProgress => {}
            TxState::Committed | TxState::RolledBack => {
                return Err(PersistError::Backend(
                    "import transaction already finished".into(),
                ));
            }
        }
        Ok(&mut *self.store)
    }

    /// Commits an open transaction. With nothing written there is nothing to
    /// commit and the state stays `NotStarted`.
    pub fn commit(&mut self) -> Result<TxState, PersistError> {
        if self.state == TxState::InProgress {
            if let Err(e) = self.store.commit() {
                self.rollback();
                return Err(e);
            }
            self.state = TxState::Committed;
            info!("import transaction committed");
        }
        Ok(self.state)
    }

    /// Rolls back an open transaction. Failure to roll back is logged; the
    /// store is expected to discard the uncommitted work on its own.
    pub fn rollback(&mut self) -> TxState {
        if self.state == TxState::InProgress {
            if let Err(e) = self.store.rollback() {
                warn!(error = %e, "import rollback failed");
            }
            self.state = TxState::RolledBack;
            info!("import transaction rolled back");
        }
        self.state
    }
}

impl<S: EntityStore + ?Sized> Drop for ImportTransaction<'_, S> {
    fn drop(&mut self) {
        self.rollback();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::model::{LibraryRecord, Record};
    use crate::store::memory::MemoryStore;
    use crate::import::model::Category;

    #[test]
    fn begins_lazily() {
        let mut store = MemoryStore::new();
        {
            let mut tx = ImportTransaction::new(&mut store);
            assert_eq!(tx.state(), TxState::NotStarted);
            assert_eq!(tx.commit().expect("commit"), TxState::NotStarted);
        }
        assert_eq!(store.begins, 0);
        assert_eq!(store.commits, 0);
    }

    #[test]
    fn commit_keeps_rows() {
        let mut store = MemoryStore::new();
        {
            let mut tx = ImportTransaction::new(&mut store);
            tx.store()
                .expect("begin")
                .insert(&Record::Library(LibraryRecord::default()))
                .expect("insert");
            assert_eq!(tx.commit().expect("commit"), TxState::Committed);
        }
        assert_eq!(store.count(Category::Library), 1);
        assert_eq!(store.rollbacks, 0);
    }

    #[test]
    fn drop_while_open_rolls_back() {
        let mut store = MemoryStore::new();
        {
            let mut tx = ImportTransaction::new(&mut store);
            tx.store()
                .expect("begin")
                .insert(&Record::Library(LibraryRecord::default()))
                .expect("insert");
        }
        assert_eq!(store.count(Category::Library), 0);
        assert_eq!(store.rollbacks, 1);
        assert!(!store.in_transaction());
    }

    #[test]
    fn finished_transaction_refuses_more_work() {
        let mut store = MemoryStore::new();
        let mut tx = ImportTransaction::new(&mut store);
        tx.store().expect("begin");
        assert_eq!(tx.rollback(), TxState::RolledBack);
        assert!(tx.store().is_err());
    }
}
