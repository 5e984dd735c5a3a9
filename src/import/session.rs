use super::coerce::TextCodec;
use super::error::ImportError;
use super::model::{Category, Field, FieldKind};
use super::remap::RemapTables;
use super::txn::TxState;
use super::vocab::FormatVersion;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;
use uuid::Uuid;

/// Codec and locking settings supplied by the caller (config file or IPC
/// params).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportOptions {
    /// Codec for exports that declare UTF-8 era versions.
    pub default_codec: TextCodec,
    /// Codec assumed for short fields of legacy exports.
    pub legacy_codec: TextCodec,
    /// Forces one codec for every version when set.
    pub codec_override: Option<TextCodec>,
    /// Label stored with record locks taken by this import.
    pub lock_owner: String,
}

impl Default for ImportOptions {
    fn default() -> Self {
        ImportOptions {
            default_codec: TextCodec::Utf8,
            legacy_codec: TextCodec::Latin1,
            codec_override: None,
            lock_owner: "qdastored".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum IssueKind {
    /// Natural-key duplicate on a shared category; existing row kept.
    Persistence,
    /// Reference to a record that was never imported; replaced by zero.
    Reference,
    /// Malformed scalar; field left at its default.
    Field,
    /// Stray or unknown markup that was skipped.
    Structure,
}

/// One recoverable problem, with enough context to find it in the export.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub kind: IssueKind,
    pub category: Option<Category>,
    pub old_id: Option<i64>,
    pub line: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn push(
        &mut self,
        kind: IssueKind,
        category: Option<Category>,
        old_id: Option<i64>,
        line: usize,
        reason: impl Into<String>,
    ) {
        let reason = reason.into();
        warn!(?kind, category = ?category, old_id = ?old_id, line, "{reason}");
        self.items.push(Diagnostic {
            kind,
            category,
            old_id,
            line,
            reason,
        });
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    pub fn count(&self, kind: IssueKind) -> usize {
        self.items.iter().filter(|d| d.kind == kind).count()
    }
}

/// Collection inserted at root whose parent had not been imported yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionParentLink {
    pub child_id: i64,
    pub old_child_id: Option<i64>,
    pub old_parent_id: i64,
    pub line: usize,
}

/// Clip side of a clip transcript: already translated, or still an old id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipRef {
    Resolved(i64),
    Old(i64),
}

/// Clip transcript whose clip and source transcript are fixed up after the
/// main parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipTranscriptLink {
    pub transcript_id: i64,
    pub old_transcript_id: Option<i64>,
    pub clip: ClipRef,
    pub old_source_id: i64,
    pub line: usize,
}

/// Persisted rich-text body that may contain internal hyperlinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyRef {
    pub category: Category,
    pub id: i64,
    /// Export id of the owning record; `None` for transcripts split out of a clip.
    pub old_id: Option<i64>,
    pub line: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Deferred {
    pub collection_parents: Vec<CollectionParentLink>,
    pub clip_transcripts: Vec<ClipTranscriptLink>,
    pub rich_text: Vec<BodyRef>,
}

/// State for exactly one import run.
#[derive(Debug)]
pub struct ImportSession {
    id: String,
    options: ImportOptions,
    version: Option<FormatVersion>,
    pub remap: RemapTables,
    pub deferred: Deferred,
    pub diagnostics: Diagnostics,
    imported: [usize; Category::COUNT],
    skipped: [usize; Category::COUNT],
    keep_going: bool,
    fatal: Option<ImportError>,
    source_sha256: Option<String>,
}

impl ImportSession {
    pub fn new(options: ImportOptions) -> Self {
        ImportSession {
            id: Uuid::new_v4().to_string(),
            options,
            version: None,
            remap: RemapTables::new(),
            deferred: Deferred::default(),
            diagnostics: Diagnostics::default(),
            imported: [0; Category::COUNT],
            skipped: [0; Category::COUNT],
            keep_going: true,
            fatal: None,
            source_sha256: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn version(&self) -> Option<FormatVersion> {
        self.version
    }

    /// Accepts the declared version. Newer-than-supported versions are fatal.
    pub fn set_version(&mut self, version: FormatVersion) -> Result<(), ImportError> {
        if !version.is_supported() {
            return Err(ImportError::UnsupportedVersion {
                found: version,
                supported: FormatVersion::LATEST,
            });
        }
        self.version = Some(version);
        Ok(())
    }

    /// Codec used for short fields and plain long text.
    pub fn text_codec(&self) -> TextCodec {
        if let Some(c) = self.options.codec_override {
            return c;
        }
        match self.version {
            Some(v) if v.uses_legacy_codec() => self.options.legacy_codec,
            _ => self.options.default_codec,
        }
    }

    pub fn codec_for(&self, field: Field) -> TextCodec {
        match (field.kind(), self.version) {
            (FieldKind::RichText, Some(v)) if v.rich_text_is_fixed_utf8() => TextCodec::Utf8,
            _ => self.text_codec(),
        }
    }

    pub fn should_continue(&self) -> bool {
        self.keep_going
    }

    /// Records a fatal condition; the driver stops consuming input.
    pub fn halt(&mut self, error: ImportError) {
        self.keep_going = false;
        if self.fatal.is_none() {
            self.fatal = Some(error);
        }
    }

    pub fn take_fatal(&mut self) -> Option<ImportError> {
        self.fatal.take()
    }

    pub fn count_imported(&mut self, category: Category) {
        self.imported[category.index()] += 1;
    }

    pub fn count_skipped(&mut self, category: Category) {
        self.skipped[category.index()] += 1;
    }

    pub fn imported(&self, category: Category) -> usize {
        self.imported[category.index()]
    }

    pub fn set_source_digest(&mut self, digest: String) {
        self.source_sha256 = Some(digest);
    }

    pub fn report(&self, outcome: TxState) -> ImportReport {
        let per_category = |counts: &[usize; Category::COUNT]| {
            Category::ALL
                .iter()
                .filter(|c| counts[c.index()] > 0)
                .map(|c| (*c, counts[c.index()]))
                .collect::<BTreeMap<_, _>>()
        };
        ImportReport {
            session_id: self.id.clone(),
            format_version: self.version,
            source_sha256: self.source_sha256.clone(),
            imported: per_category(&self.imported),
            skipped: per_category(&self.skipped),
            issues: self.diagnostics.iter().cloned().collect(),
            outcome,
        }
    }
}

/// Structured result of one import run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub session_id: String,
    pub format_version: Option<FormatVersion>,
    pub source_sha256: Option<String>,
    pub imported: BTreeMap<Category, usize>,
    pub skipped: BTreeMap<Category, usize>,
    pub issues: Vec<Diagnostic>,
    pub outcome: TxState,
}

impl ImportReport {
    pub fn imported(&self, category: Category) -> usize {
        self.imported.get(&category).copied().unwrap_or(0)
    }

    pub fn total_imported(&self) -> usize {
        self.imported.values().sum()
    }

    pub fn issues_of(&self, kind: IssueKind) -> impl Iterator<Item = &Diagnostic> {
        self.issues.iter().filter(move |d| d.kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_versions_use_legacy_codec_except_rich_text() {
        let mut s = ImportSession::new(ImportOptions::default());
        s.set_version(FormatVersion::V1_0).expect("supported");
        assert_eq!(s.codec_for(Field::Id), TextCodec::Latin1);
        assert_eq!(s.codec_for(Field::NoteText), TextCodec::Latin1);
        assert_eq!(s.codec_for(Field::RtfText), TextCodec::Utf8);
    }

    #[test]
    fn override_applies_to_short_fields() {
        let mut s = ImportSession::new(ImportOptions {
            codec_override: Some(TextCodec::Latin1),
            ..ImportOptions::default()
        });
        s.set_version(FormatVersion::V1_5).expect("supported");
        assert_eq!(s.codec_for(Field::Id), TextCodec::Latin1);
        assert_eq!(s.codec_for(Field::XmlText), TextCodec::Latin1);
    }

    #[test]
    fn future_version_is_rejected() {
        let mut s = ImportSession::new(ImportOptions::default());
        let err = s.set_version(FormatVersion::new(1, 6)).unwrap_err();
        assert!(matches!(err, ImportError::UnsupportedVersion { .. }));
        assert_eq!(s.version(), None);
    }

    #[test]
    fn halt_keeps_first_fatal() {
        let mut s = ImportSession::new(ImportOptions::default());
        assert!(s.should_continue());
        s.halt(ImportError::Declined("first".into()));
        s.halt(ImportError::Declined("second".into()));
        assert!(!s.should_continue());
        assert!(matches!(s.take_fatal(), Some(ImportError::Declined(m)) if m == "first"));
    }

    #[test]
    fn sessions_have_distinct_ids() {
        let a = ImportSession::new(ImportOptions::default());
        let b = ImportSession::new(ImportOptions::default());
        assert_ne!(a.id(), b.id());
    }
}
