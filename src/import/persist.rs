//! Hands finished records to the store: strips the old id, rewrites every
//! reference through the remap tables, inserts, then registers the new id.
//!
//! Required parents must already be known. Optional references that never
//! resolved fall back to zero with a diagnostic. Collection parents and clip
//! transcript links are queued for the resolver.

use super::error::ImportError;
use super::model::{Category, ClipRecord, Record, SubRecordPersistence, TranscriptRecord};
use super::remap::Lookup;
use super::session::{BodyRef, ClipRef, ClipTranscriptLink, CollectionParentLink, ImportSession, IssueKind};
use crate::store::{EntityStore, PersistError};
use tracing::debug;

/// Context of the record currently being persisted.
struct Ctx {
    category: Category,
    old_id: Option<i64>,
    line: usize,
}

impl Ctx {
    fn fatal(&self, source: PersistError) -> ImportError {
        ImportError::Persist {
            line: self.line,
            category: self.category,
            old_id: self.old_id,
            source,
        }
    }

    /// Parent that must already have been imported.
    fn required(&self, session: &ImportSession, parent: Category, old: i64) -> Result<i64, ImportError> {
        match session.remap.lookup(parent, old) {
            Lookup::Known(id) => Ok(id),
            Lookup::NotYetKnown => Err(self.fatal(PersistError::MissingParent {
                category: self.category,
                parent,
                id: old,
            })),
        }
    }

    /// Reference that degrades to "none" when its target was never imported.
    fn optional(&self, session: &mut ImportSession, target: Category, old: i64) -> i64 {
        match session.remap.lookup(target, old) {
            Lookup::Known(id) => id,
            Lookup::NotYetKnown => {
                session.diagnostics.push(
                    IssueKind::Reference,
                    Some(self.category),
                    self.old_id,
                    self.line,
                    format!("{target} {old} was not imported; reference cleared"),
                );
                0
            }
        }
    }
}

/// Outcome of one record, for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persisted {
    Inserted(i64),
    /// Dropped without a write (keyword assignment with no owner).
    Dropped,
    /// Store reported a recoverable duplicate; the existing row was kept.
    Kept,
}

/// Persists one record. An `Err` is fatal for the whole import.
pub fn persist_record<S: EntityStore + ?Sized>(
    mut record: Record,
    line: usize,
    session: &mut ImportSession,
    store: &mut S,
) -> Result<Persisted, ImportError> {
    let category = record.category();
    // Zero never identifies a record, so it is never registered.
    let old_id = record.take_source_id().filter(|id| *id != 0);
    let ctx = Ctx {
        category,
        old_id,
        line,
    };

    if let Some(old) = old_id {
        if let Lookup::Known(_) = session.remap.lookup(category, old) {
            return Err(ImportError::DuplicateSourceId {
                line,
                category,
                old_id: old,
            });
        }
    }

    let mut pending_parent = None;
    let mut clip_link = None;
    resolve_references(&ctx, &mut record, session, &mut pending_parent, &mut clip_link)?;

    if let Record::KeywordAssignment(ka) = &record {
        if !ka.has_owner() {
            debug!(line, keyword = %ka.keyword, "keyword assignment has no owner; dropped");
            session.count_skipped(category);
            return Ok(Persisted::Dropped);
        }
    }

    let new_id = match store.insert(&record) {
        Ok(id) => id,
        Err(e) if e.is_recoverable() => {
            session.diagnostics.push(
                IssueKind::Persistence,
                Some(category),
                old_id,
                line,
                format!("{e}; existing record kept"),
            );
            session.count_skipped(category);
            return Ok(Persisted::Kept);
        }
        Err(e) => return Err(ctx.fatal(e)),
    };
    debug!(%category, old_id = ?old_id, new_id, line, "record imported");

    if let Some(old) = old_id {
        session
            .remap
            .record(category, old, new_id)
            .map_err(|_| ImportError::DuplicateSourceId {
                line,
                category,
                old_id: old,
            })?;
    }
    session.count_imported(category);
    note_rich_text(session, &record, new_id, old_id, line);

    if let Some(old_parent_id) = pending_parent {
        session.deferred.collection_parents.push(CollectionParentLink {
            child_id: new_id,
            old_child_id: old_id,
            old_parent_id,
            line,
        });
    }
    if let Some((old_clip, old_source_id)) = clip_link {
        session.deferred.clip_transcripts.push(ClipTranscriptLink {
            transcript_id: new_id,
            old_transcript_id: old_id,
            clip: ClipRef::Old(old_clip),
            old_source_id,
            line,
        });
    }

    if let Record::Clip(clip) = &record {
        persist_embedded_transcripts(&ctx, clip, new_id, session, store)?;
    }

    Ok(Persisted::Inserted(new_id))
}

fn resolve_references(
    ctx: &Ctx,
    record: &mut Record,
    session: &mut ImportSession,
    pending_parent: &mut Option<i64>,
    clip_link: &mut Option<(i64, i64)>,
) -> Result<(), ImportError> {
    match record {
        Record::Library(_) | Record::CoreData(_) | Record::KeywordDefinition(_) => {}
        Record::Document(r) => {
            r.library_num = ctx.required(session, Category::Library, r.library_num)?;
        }
        Record::Episode(r) => {
            r.library_num = ctx.required(session, Category::Library, r.library_num)?;
        }
        Record::Transcript(r) => {
            if r.clip_num != 0 || r.source_transcript_num != 0 {
                // Clip transcript: links are fixed once every clip is in.
                r.episode_num = ctx.optional(session, Category::Episode, r.episode_num);
                *clip_link = Some((r.clip_num, r.source_transcript_num));
                r.clip_num = 0;
                r.source_transcript_num = 0;
            } else {
                r.episode_num = ctx.required(session, Category::Episode, r.episode_num)?;
            }
        }
        Record::Collection(r) => match session.remap.lookup(Category::Collection, r.parent_num) {
            Lookup::Known(id) => r.parent_num = id,
            Lookup::NotYetKnown => {
                *pending_parent = Some(r.parent_num);
                r.parent_num = 0;
            }
        },
        Record::Quote(r) => {
            r.collection_num = ctx.required(session, Category::Collection, r.collection_num)?;
        }
        Record::QuotePosition(r) => {
            r.quote_num = ctx.required(session, Category::Quote, r.quote_num)?;
            r.document_num = ctx.required(session, Category::Document, r.document_num)?;
        }
        Record::Clip(r) => {
            r.collection_num = ctx.required(session, Category::Collection, r.collection_num)?;
            r.episode_num = ctx.required(session, Category::Episode, r.episode_num)?;
            if session.version().is_some_and(|v| v.has_multi_transcript_clips()) {
                for t in &mut r.transcripts {
                    t.persistence = SubRecordPersistence::DoNotPersist;
                }
            }
        }
        Record::AdditionalVideo(r) => {
            r.episode_num = ctx.optional(session, Category::Episode, r.episode_num);
            r.clip_num = ctx.optional(session, Category::Clip, r.clip_num);
        }
        Record::Snapshot(r) => {
            r.collection_num = ctx.required(session, Category::Collection, r.collection_num)?;
            r.library_num = ctx.optional(session, Category::Library, r.library_num);
            r.episode_num = ctx.optional(session, Category::Episode, r.episode_num);
            r.transcript_num = ctx.optional(session, Category::Transcript, r.transcript_num);
        }
        Record::KeywordAssignment(r) => {
            r.document_num = ctx.optional(session, Category::Document, r.document_num);
            r.episode_num = ctx.optional(session, Category::Episode, r.episode_num);
            r.quote_num = ctx.optional(session, Category::Quote, r.quote_num);
            r.clip_num = ctx.optional(session, Category::Clip, r.clip_num);
            r.snapshot_num = ctx.optional(session, Category::Snapshot, r.snapshot_num);
        }
        Record::Note(r) => {
            r.library_num = ctx.optional(session, Category::Library, r.library_num);
            r.document_num = ctx.optional(session, Category::Document, r.document_num);
            r.episode_num = ctx.optional(session, Category::Episode, r.episode_num);
            r.collection_num = ctx.optional(session, Category::Collection, r.collection_num);
            r.clip_num = ctx.optional(session, Category::Clip, r.clip_num);
            r.snapshot_num = ctx.optional(session, Category::Snapshot, r.snapshot_num);
            r.transcript_num = ctx.optional(session, Category::Transcript, r.transcript_num);
            r.quote_num = ctx.optional(session, Category::Quote, r.quote_num);
        }
        Record::Filter(r) => {
            if let Some(scope) = r.scope_category() {
                r.report_scope = ctx.optional(session, scope, r.report_scope);
            }
        }
    }
    Ok(())
}

fn note_rich_text(
    session: &mut ImportSession,
    record: &Record,
    id: i64,
    old_id: Option<i64>,
    line: usize,
) {
    // Bodies without a colon cannot hold a link marker.
    if record.rich_text().is_some_and(|b| b.contains(':')) {
        session.deferred.rich_text.push(BodyRef {
            category: record.category(),
            id,
            old_id,
            line,
        });
    }
}

/// Older exports carry a clip's only transcript inside the clip block. It is
/// written as a transcript row owned by the new clip.
fn persist_embedded_transcripts<S: EntityStore + ?Sized>(
    ctx: &Ctx,
    clip: &ClipRecord,
    clip_id: i64,
    session: &mut ImportSession,
    store: &mut S,
) -> Result<(), ImportError> {
    for embedded in &clip.transcripts {
        if embedded.persistence == SubRecordPersistence::DoNotPersist {
            continue;
        }
        let transcript = Record::Transcript(TranscriptRecord {
            name: clip.name.clone(),
            episode_num: clip.episode_num,
            clip_num: clip_id,
            clip_start: clip.clip_start,
            clip_stop: clip.clip_stop,
            body: embedded.body.clone(),
            ..TranscriptRecord::default()
        });
        let transcript_id = store.insert(&transcript).map_err(|e| ImportError::Persist {
            line: ctx.line,
            category: Category::Transcript,
            old_id: None,
            source: e,
        })?;
        debug!(clip_id, transcript_id, "embedded clip transcript imported");
        session.count_imported(Category::Transcript);
        note_rich_text(session, &transcript, transcript_id, None, ctx.line);
        session.deferred.clip_transcripts.push(ClipTranscriptLink {
            transcript_id,
            old_transcript_id: None,
            clip: ClipRef::Resolved(clip_id),
            old_source_id: embedded.source_transcript_num,
            line: ctx.line,
        });
    }
    Ok(())
}
