//! Project import engine.
//!
//! Reads a line-oriented project export, persists every record through an
//! [`EntityStore`] with freshly assigned ids, rewrites references through
//! per-category remap tables, fixes forward references once the stream is
//! exhausted and commits everything in one transaction, or nothing at all.

pub mod coerce;
pub mod error;
pub mod model;
pub mod parser;
pub mod persist;
pub mod remap;
pub mod resolve;
pub mod session;
pub mod txn;
pub mod vocab;

pub use coerce::TextCodec;
pub use error::{ImportError, ImportFailure};
pub use model::Category;
pub use session::{Diagnostic, ImportOptions, ImportReport, IssueKind};
pub use txn::TxState;
pub use vocab::FormatVersion;

use crate::store::{EntityStore, PersistError};
use parser::{Event, TagParser};
use session::ImportSession;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{info, warn};
use txn::ImportTransaction;

/// Questions the engine asks its caller mid-import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prompt {
    /// The export predates UTF-8 exports; short fields are decoded with
    /// `codec`. Asked before anything is written.
    LegacyFormat {
        version: FormatVersion,
        codec: TextCodec,
    },
    /// Recoverable issues were recorded. Declining rolls the import back.
    ReviewIssues { count: usize },
}

pub trait ImportDecider {
    fn confirm(&mut self, prompt: &Prompt) -> bool;
}

impl<F: FnMut(&Prompt) -> bool> ImportDecider for F {
    fn confirm(&mut self, prompt: &Prompt) -> bool {
        self(prompt)
    }
}

/// Answers prompts from fixed settings (config file or request params).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoDecider {
    pub confirm_legacy: bool,
    pub accept_issues: bool,
}

impl Default for AutoDecider {
    fn default() -> Self {
        AutoDecider {
            confirm_legacy: true,
            accept_issues: true,
        }
    }
}

impl ImportDecider for AutoDecider {
    fn confirm(&mut self, prompt: &Prompt) -> bool {
        match prompt {
            Prompt::LegacyFormat { .. } => self.confirm_legacy,
            Prompt::ReviewIssues { .. } => self.accept_issues,
        }
    }
}

fn begin_failed(source: PersistError) -> ImportError {
    ImportError::Transaction {
        action: "begin",
        source,
    }
}

/// Imports one export from `reader` into `store`.
pub fn import_project<R: BufRead, S: EntityStore + ?Sized>(
    mut reader: R,
    store: &mut S,
    options: ImportOptions,
    decider: &mut dyn ImportDecider,
) -> Result<ImportReport, ImportFailure> {
    let mut session = ImportSession::new(options);
    let mut tx = ImportTransaction::new(store);
    let mut parser = TagParser::new();
    let mut hasher = Sha256::new();
    let mut buf = Vec::new();
    info!(session = session.id(), "import started");

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                session.halt(e.into());
                break;
            }
        }
        hasher.update(&buf);

        match parser.feed(&buf, &mut session) {
            Ok(None) => {}
            Ok(Some(Event::Version(version))) => {
                info!(%version, codec = %session.text_codec(), "format version detected");
                if version.uses_legacy_codec() {
                    let prompt = Prompt::LegacyFormat {
                        version,
                        codec: session.text_codec(),
                    };
                    if !decider.confirm(&prompt) {
                        session.halt(ImportError::Declined(format!(
                            "legacy format {version} was not confirmed"
                        )));
                    }
                }
            }
            Ok(Some(Event::Record { record, line })) => {
                let result = tx
                    .store()
                    .map_err(begin_failed)
                    .and_then(|store| persist::persist_record(record, line, &mut session, store));
                if let Err(e) = result {
                    session.halt(e);
                }
            }
            Err(e) => session.halt(e),
        }

        // A record is always finished before this check.
        if !session.should_continue() {
            break;
        }
    }

    if session.should_continue() {
        if let Err(e) = parser.finish(&session) {
            session.halt(e);
        }
    }
    session.set_source_digest(hex::encode(hasher.finalize()));

    if session.should_continue() {
        if let Err(e) = run_deferred_passes(&mut session, &mut tx) {
            session.halt(e);
        }
    }

    if session.should_continue() && !session.diagnostics.is_empty() {
        let count = session.diagnostics.len();
        if !decider.confirm(&Prompt::ReviewIssues { count }) {
            session.halt(ImportError::Declined(format!(
                "{count} recoverable issue(s) were not accepted"
            )));
        }
    }

    if let Some(error) = session.take_fatal() {
        let outcome = tx.rollback();
        warn!(session = session.id(), code = error.code(), error = %error, "import failed");
        return Err(ImportFailure {
            error,
            report: session.report(outcome),
        });
    }

    match tx.commit() {
        Ok(outcome) => {
            let report = session.report(outcome);
            info!(
                session = session.id(),
                imported = report.total_imported(),
                issues = report.issues.len(),
                "import finished"
            );
            Ok(report)
        }
        Err(source) => {
            let error = ImportError::Transaction {
                action: "commit",
                source,
            };
            warn!(session = session.id(), error = %error, "import failed");
            Err(ImportFailure {
                error,
                report: session.report(tx.state()),
            })
        }
    }
}

fn run_deferred_passes<S: EntityStore + ?Sized>(
    session: &mut ImportSession,
    tx: &mut ImportTransaction<'_, S>,
) -> Result<(), ImportError> {
    let deferred = std::mem::take(&mut session.deferred);

    if !deferred.collection_parents.is_empty() {
        let store = tx.store().map_err(begin_failed)?;
        let n = resolve::resolve_collection_parents(
            &session.remap,
            &deferred.collection_parents,
            store,
            &mut session.diagnostics,
        )
        .map_err(|source| ImportError::Resolve {
            pass: "collection parent",
            source,
        })?;
        info!(updated = n, "collection parents resolved");
    }

    if !deferred.clip_transcripts.is_empty() {
        let store = tx.store().map_err(begin_failed)?;
        let n = resolve::resolve_clip_transcripts(
            &session.remap,
            &deferred.clip_transcripts,
            store,
            &mut session.diagnostics,
        )
        .map_err(|source| ImportError::Resolve {
            pass: "clip transcript",
            source,
        })?;
        info!(updated = n, "clip transcript links resolved");
    }

    if !deferred.rich_text.is_empty() {
        let store = tx.store().map_err(begin_failed)?;
        let n = resolve::rewrite_hyperlinks(
            &session.remap,
            &deferred.rich_text,
            store,
            &mut session.diagnostics,
        )
        .map_err(|source| ImportError::Resolve {
            pass: "hyperlink",
            source,
        })?;
        info!(updated = n, "hyperlinks rewritten");
    }

    Ok(())
}

/// Opens `path` and imports it.
pub fn import_file<S: EntityStore + ?Sized>(
    path: &Path,
    store: &mut S,
    options: ImportOptions,
    decider: &mut dyn ImportDecider,
) -> Result<ImportReport, ImportFailure> {
    match File::open(path) {
        Ok(f) => import_project(BufReader::new(f), store, options, decider),
        Err(e) => {
            let report = ImportSession::new(options).report(TxState::NotStarted);
            Err(ImportFailure {
                error: ImportError::Io(e),
                report,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    const HEADER: &str = "<TRANSANAXML>\n<TRANSANAXMLVERSION>\n1.5\n</TRANSANAXMLVERSION>\n";

    fn export(body: &str) -> String {
        format!("{HEADER}{body}</TRANSANAXML>\n")
    }

    fn run(input: &str, store: &mut MemoryStore) -> Result<ImportReport, ImportFailure> {
        import_project(input.as_bytes(), store, ImportOptions::default(), &mut AutoDecider::default())
    }

    #[test]
    fn forward_collection_parent_resolves_and_commits() {
        let input = export(
            "<Series>\n<Num>\n7\n</Num>\n</Series>\n\
<Collection>\n<Num>\n9\n</Num>\n<ParentCollectNum>\n3\n</ParentCollectNum>\n</Collection>\n\
<Collection>\n<Num>\n3\n</Num>\n</Collection>\n",
        );
        let mut store = MemoryStore::new();
        let report = run(&input, &mut store).expect("import");
        assert_eq!(report.outcome, TxState::Committed);
        assert_eq!(report.imported(Category::Collection), 2);
        let cols = store.all(Category::Collection);
        let (parent_id, _) = cols
            .iter()
            .find(|(_, r)| matches!(r, model::Record::Collection(c) if c.parent_num == 0))
            .copied()
            .expect("root collection");
        assert!(cols
            .iter()
            .any(|(_, r)| matches!(r, model::Record::Collection(c) if c.parent_num == parent_id)));
        assert!(report.issues.is_empty());
        assert_eq!(report.source_sha256.as_deref().map(str::len), Some(64));
    }

    #[test]
    fn fatal_error_rolls_back_everything() {
        let input = export(
            "<Series>\n<Num>\n1\n</Num>\n</Series>\n\
<Episode>\n<Num>\n2\n</Num>\n<SeriesNum>\n99\n</SeriesNum>\n</Episode>\n",
        );
        let mut store = MemoryStore::new();
        let failure = run(&input, &mut store).unwrap_err();
        assert_eq!(failure.error.code(), "import_persist_failed");
        assert_eq!(failure.report.outcome, TxState::RolledBack);
        assert_eq!(failure.report.imported(Category::Library), 1);
        assert_eq!(store.count(Category::Library), 0);
    }

    #[test]
    fn input_after_a_fatal_record_is_not_consumed() {
        let input = export(
            "<Series>\n<Num>\n1\n</Num>\n</Series>\n\
<Episode>\n<Num>\n2\n</Num>\n<SeriesNum>\n99\n</SeriesNum>\n</Episode>\n\
<Series>\n<Num>\n3\n</Num>\n</Series>\n\
<Note>\n<Num>\n4\n</Num>\n<ClipNum>\n5\n</ClipNum>\n</Note>\n\
<Note>\n<Num>\nseven\n</Num>\n</Note>\n",
        );
        let mut store = MemoryStore::new();
        let failure = run(&input, &mut store).unwrap_err();
        let ImportError::Persist { line, category, .. } = &failure.error else {
            panic!("expected a persistence failure, got {:?}", failure.error);
        };
        assert_eq!(*category, Category::Episode);
        assert_eq!(*line, 10);
        assert_eq!(failure.report.imported(Category::Library), 1);
        assert_eq!(failure.report.imported(Category::Note), 0);
        assert_eq!(failure.report.total_imported(), 1);
        assert!(failure.report.issues.is_empty(), "{:?}", failure.report.issues);
        assert_eq!(store.count(Category::Library), 0);
    }

    #[test]
    fn unsupported_version_writes_nothing() {
        let input = "<TRANSANAXMLVERSION>\n2.0\n</TRANSANAXMLVERSION>\n<Series>\n</Series>\n";
        let mut store = MemoryStore::new();
        let failure = run(input, &mut store).unwrap_err();
        assert!(matches!(failure.error, ImportError::UnsupportedVersion { .. }));
        assert_eq!(failure.report.outcome, TxState::NotStarted);
        assert_eq!(store.begins, 0);
    }

    #[test]
    fn declining_legacy_prompt_abandons_before_writes() {
        let input = "<TRANSANAXMLVERSION>\n1.0\n</TRANSANAXMLVERSION>\n<Series>\n<Num>\n1\n</Num>\n</Series>\n";
        let mut store = MemoryStore::new();
        let mut asked = Vec::new();
        let mut decider = |p: &Prompt| {
            asked.push(*p);
            false
        };
        let failure =
            import_project(input.as_bytes(), &mut store, ImportOptions::default(), &mut decider)
                .unwrap_err();
        assert_eq!(failure.error.code(), "import_declined");
        assert_eq!(store.begins, 0);
        assert_eq!(
            asked,
            vec![Prompt::LegacyFormat {
                version: FormatVersion::V1_0,
                codec: TextCodec::Latin1
            }]
        );
    }

    #[test]
    fn declining_review_rolls_back() {
        let input = export("<Note>\n<Num>\n1\n</Num>\n<ClipNum>\n5\n</ClipNum>\n</Note>\n");
        let mut store = MemoryStore::new();
        let mut decider = AutoDecider {
            confirm_legacy: true,
            accept_issues: false,
        };
        let failure =
            import_project(input.as_bytes(), &mut store, ImportOptions::default(), &mut decider)
                .unwrap_err();
        assert_eq!(failure.error.code(), "import_declined");
        assert_eq!(failure.report.outcome, TxState::RolledBack);
        assert_eq!(failure.report.issues.len(), 1);
        assert_eq!(store.count(Category::Note), 0);
    }

    #[test]
    fn accepted_issues_are_reported_after_commit() {
        let input = export(
            "<Collection>\n<Num>\n1\n</Num>\n</Collection>\n\
<Quote>\n<Num>\n2\n</Num>\n<CollectNum>\n1\n</CollectNum>\n<XMLText>\nsee clip:44\n</XMLText>\n</Quote>\n",
        );
        let mut store = MemoryStore::new();
        let report = run(&input, &mut store).expect("import");
        assert_eq!(report.outcome, TxState::Committed);
        let refs: Vec<_> = report.issues_of(IssueKind::Reference).collect();
        assert_eq!(refs.len(), 1);
        let (_, quote) = store.all(Category::Quote)[0];
        assert_eq!(quote.rich_text(), Some("see clip:0"));
    }

    #[test]
    fn empty_export_commits_nothing() {
        let mut store = MemoryStore::new();
        let report = run(&export(""), &mut store).expect("import");
        assert_eq!(report.outcome, TxState::NotStarted);
        assert_eq!(report.total_imported(), 0);
    }

    #[test]
    fn missing_file_is_a_read_failure() {
        let mut store = MemoryStore::new();
        let failure = import_file(
            Path::new("/nonexistent/qdastore-export.xml"),
            &mut store,
            ImportOptions::default(),
            &mut AutoDecider::default(),
        )
        .unwrap_err();
        assert_eq!(failure.error.code(), "import_read_failed");
    }
}
