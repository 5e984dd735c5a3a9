use super::model::Category;
use super::session::ImportReport;
use super::vocab::FormatVersion;
use crate::store::PersistError;
use thiserror::Error;

/// Fatal conditions. Anything reported through this type ends the import
/// and, once writes have begun, forces a rollback.
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("unsupported format version {found} (newest supported is {supported})")]
    UnsupportedVersion {
        found: FormatVersion,
        supported: FormatVersion,
    },

    #[error("line {line}: malformed format version {text:?}")]
    BadVersion { line: usize, text: String },

    #[error("line {line}: {message}")]
    Structure { line: usize, message: String },

    #[error("line {line}: {category} {old_id} appears more than once in the export")]
    DuplicateSourceId {
        line: usize,
        category: Category,
        old_id: i64,
    },

    #[error("line {line}: failed to import {category}{}: {source}", describe_old_id(.old_id))]
    Persist {
        line: usize,
        category: Category,
        old_id: Option<i64>,
        #[source]
        source: PersistError,
    },

    #[error("{pass} pass failed: {source}")]
    Resolve {
        pass: &'static str,
        #[source]
        source: PersistError,
    },

    #[error("transaction {action} failed: {source}")]
    Transaction {
        action: &'static str,
        #[source]
        source: PersistError,
    },

    #[error("import declined: {0}")]
    Declined(String),

    #[error("failed to read export: {0}")]
    Io(#[from] std::io::Error),
}

fn describe_old_id(old_id: &Option<i64>) -> String {
    match old_id {
        Some(id) => format!(" {id}"),
        None => String::new(),
    }
}

impl ImportError {
    /// Stable code used in IPC error envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            ImportError::UnsupportedVersion { .. } => "import_unsupported_version",
            ImportError::BadVersion { .. }
            | ImportError::Structure { .. }
            | ImportError::DuplicateSourceId { .. } => "import_bad_format",
            ImportError::Persist {
                source: PersistError::LockConflict { .. },
                ..
            } => "import_lock_conflict",
            ImportError::Persist { .. } => "import_persist_failed",
            ImportError::Resolve { .. } => "import_resolve_failed",
            ImportError::Transaction { .. } => "import_tx_failed",
            ImportError::Declined(_) => "import_declined",
            ImportError::Io(_) => "import_read_failed",
        }
    }
}

/// A fatal import together with everything the session recorded before it
/// stopped.
#[derive(Error, Debug)]
#[error("{error}")]
pub struct ImportFailure {
    #[source]
    pub error: ImportError,
    pub report: ImportReport,
}
