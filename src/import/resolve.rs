//! Post-parse passes that fix references to records imported after the
//! record that mentions them. Each pass holds a row lock around its update.

use super::model::Category;
use super::remap::{Lookup, RemapTables};
use super::session::{BodyRef, ClipRef, ClipTranscriptLink, CollectionParentLink, Diagnostics, IssueKind};
use crate::store::{EntityStore, LockGuard, PersistError};
use regex::{Captures, Regex};
use std::borrow::Cow;
use std::sync::OnceLock;
use tracing::debug;

/// Re-parents collections whose parent appeared later in the export.
/// Returns the number of collections updated.
pub fn resolve_collection_parents<S: EntityStore + ?Sized>(
    remap: &RemapTables,
    links: &[CollectionParentLink],
    store: &mut S,
    diagnostics: &mut Diagnostics,
) -> Result<usize, PersistError> {
    let mut updated = 0;
    for link in links {
        let Lookup::Known(parent_id) = remap.lookup(Category::Collection, link.old_parent_id) else {
            diagnostics.push(
                IssueKind::Reference,
                Some(Category::Collection),
                link.old_child_id,
                link.line,
                format!(
                    "parent collection {} was not imported; left at the top level",
                    link.old_parent_id
                ),
            );
            continue;
        };
        let mut guard = LockGuard::acquire(store, Category::Collection, link.child_id)?;
        guard.store().set_collection_parent(link.child_id, parent_id)?;
        debug!(child = link.child_id, parent = parent_id, "collection parent resolved");
        updated += 1;
    }
    Ok(updated)
}

/// Points clip transcripts at their clip and source transcript.
pub fn resolve_clip_transcripts<S: EntityStore + ?Sized>(
    remap: &RemapTables,
    links: &[ClipTranscriptLink],
    store: &mut S,
    diagnostics: &mut Diagnostics,
) -> Result<usize, PersistError> {
    let mut updated = 0;
    for link in links {
        let mut unresolved = |what: Category, old: i64| {
            diagnostics.push(
                IssueKind::Reference,
                Some(Category::Transcript),
                link.old_transcript_id,
                link.line,
                format!("{what} {old} was not imported; link cleared"),
            );
            0
        };
        let clip_id = match link.clip {
            ClipRef::Resolved(id) => id,
            ClipRef::Old(old) => match remap.lookup(Category::Clip, old) {
                Lookup::Known(id) => id,
                Lookup::NotYetKnown => unresolved(Category::Clip, old),
            },
        };
        let source_id = match remap.lookup(Category::Transcript, link.old_source_id) {
            Lookup::Known(id) => id,
            Lookup::NotYetKnown => unresolved(Category::Transcript, link.old_source_id),
        };
        let mut guard = LockGuard::acquire(store, Category::Transcript, link.transcript_id)?;
        guard
            .store()
            .set_transcript_links(link.transcript_id, clip_id, source_id)?;
        updated += 1;
    }
    Ok(updated)
}

/// Link marker found in a body whose target was never imported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DanglingLink {
    pub category: Category,
    pub old_id: i64,
    pub marker: String,
}

fn marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(library|series|document|episode|transcript|collection|quote|clip|snapshot|note):(\d+)",
        )
        .expect("valid link marker regex")
    })
}

fn marker_category(kind: &str) -> Option<Category> {
    Some(match kind.to_ascii_lowercase().as_str() {
        "library" | "series" => Category::Library,
        "document" => Category::Document,
        "episode" => Category::Episode,
        "transcript" => Category::Transcript,
        "collection" => Category::Collection,
        "quote" => Category::Quote,
        "clip" => Category::Clip,
        "snapshot" => Category::Snapshot,
        "note" => Category::Note,
        _ => return None,
    })
}

/// Rewrites every `type:old-id` marker to the new id. Markers whose target
/// was never imported become `type:0` and are returned.
pub fn rewrite_links<'t>(text: &'t str, remap: &RemapTables) -> (Cow<'t, str>, Vec<DanglingLink>) {
    let mut dangling = Vec::new();
    let out = marker_regex().replace_all(text, |caps: &Captures| {
        let kind = &caps[1];
        let (Some(category), Ok(old_id)) = (marker_category(kind), caps[2].parse::<i64>()) else {
            return caps[0].to_string();
        };
        match remap.lookup(category, old_id) {
            Lookup::Known(new_id) => format!("{kind}:{new_id}"),
            Lookup::NotYetKnown => {
                dangling.push(DanglingLink {
                    category,
                    old_id,
                    marker: caps[0].to_string(),
                });
                format!("{kind}:0")
            }
        }
    });
    (out, dangling)
}

/// Rewrites link markers in every queued body. Dangling links are reported,
/// never fatal. Returns the number of bodies changed.
pub fn rewrite_hyperlinks<S: EntityStore + ?Sized>(
    remap: &RemapTables,
    bodies: &[BodyRef],
    store: &mut S,
    diagnostics: &mut Diagnostics,
) -> Result<usize, PersistError> {
    let mut changed = 0;
    for body_ref in bodies {
        let Some(body) = store.body(body_ref.category, body_ref.id)? else {
            continue;
        };
        let (rewritten, dangling) = rewrite_links(&body, remap);
        for d in &dangling {
            diagnostics.push(
                IssueKind::Reference,
                Some(body_ref.category),
                body_ref.old_id,
                body_ref.line,
                format!(
                    "link {} in {} {} points to a {} that was not imported",
                    d.marker, body_ref.category, body_ref.id, d.category
                ),
            );
        }
        if rewritten != body.as_str() {
            let mut guard = LockGuard::acquire(store, body_ref.category, body_ref.id)?;
            guard.store().set_body(body_ref.category, body_ref.id, &rewritten)?;
            changed += 1;
        }
    }
    Ok(changed)
}
