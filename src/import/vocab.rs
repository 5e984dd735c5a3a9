use super::model::{Category, Field};
use serde::{Serialize, Serializer};
use std::fmt;

/// Version declared by the `TRANSANAXMLVERSION` tag at the top of an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FormatVersion {
    pub major: u16,
    pub minor: u16,
}

impl FormatVersion {
    /// Legacy exports; short fields were written in a legacy 8-bit codec.
    pub const V1_0: FormatVersion = FormatVersion::new(1, 0);
    /// UTF-8 exports, filter records.
    pub const V1_1: FormatVersion = FormatVersion::new(1, 1);
    /// Multi-transcript clips.
    pub const V1_2: FormatVersion = FormatVersion::new(1, 2);
    /// Additional videos, keyword coding styles.
    pub const V1_3: FormatVersion = FormatVersion::new(1, 3);
    /// Snapshots.
    pub const V1_4: FormatVersion = FormatVersion::new(1, 4);
    /// Documents, quotes and quote positions.
    pub const V1_5: FormatVersion = FormatVersion::new(1, 5);

    pub const LATEST: FormatVersion = FormatVersion::V1_5;

    pub const fn new(major: u16, minor: u16) -> Self {
        FormatVersion { major, minor }
    }

    pub fn parse(s: &str) -> Option<FormatVersion> {
        let t = s.trim();
        let (major, minor) = match t.split_once('.') {
            Some((a, b)) => (a.trim(), b.trim()),
            None => (t, "0"),
        };
        Some(FormatVersion {
            major: major.parse().ok()?,
            minor: minor.parse().ok()?,
        })
    }

    pub fn is_supported(self) -> bool {
        self >= FormatVersion::V1_0 && self <= FormatVersion::LATEST
    }

    /// Exports older than this wrote short fields in the legacy codec.
    pub fn uses_legacy_codec(self) -> bool {
        self < FormatVersion::V1_1
    }

    /// Rich-text bodies in these exports are always UTF-8 regardless of the
    /// codec configured for the session.
    pub fn rich_text_is_fixed_utf8(self) -> bool {
        self < FormatVersion::V1_2
    }

    /// Clip transcripts arrive as independent Transcript records.
    pub fn has_multi_transcript_clips(self) -> bool {
        self >= FormatVersion::V1_2
    }
}

impl fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl Serialize for FormatVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

pub const ROOT_TAG: &str = "TRANSANAXML";
pub const VERSION_TAG: &str = "TRANSANAXMLVERSION";

// (object tag, section tag, category, first version)
const OBJECTS: &[(&str, &str, Category, FormatVersion)] = &[
    ("SERIES", "SERIESFILE", Category::Library, FormatVersion::V1_0),
    ("DOCUMENT", "DOCUMENTFILE", Category::Document, FormatVersion::V1_5),
    ("EPISODE", "EPISODEFILE", Category::Episode, FormatVersion::V1_0),
    ("COREDATA", "COREDATAFILE", Category::CoreData, FormatVersion::V1_0),
    ("TRANSCRIPT", "TRANSCRIPTFILE", Category::Transcript, FormatVersion::V1_0),
    ("COLLECTION", "COLLECTIONFILE", Category::Collection, FormatVersion::V1_0),
    ("QUOTE", "QUOTEFILE", Category::Quote, FormatVersion::V1_5),
    ("QUOTEPOSITION", "QUOTEPOSITIONFILE", Category::QuotePosition, FormatVersion::V1_5),
    ("CLIP", "CLIPFILE", Category::Clip, FormatVersion::V1_0),
    ("ADDITIONALVID", "ADDITIONALVIDSFILE", Category::AdditionalVideo, FormatVersion::V1_3),
    ("SNAPSHOT", "SNAPSHOTFILE", Category::Snapshot, FormatVersion::V1_4),
    ("KEYWORDRECORD", "KEYWORDFILE", Category::KeywordDefinition, FormatVersion::V1_0),
    ("CLIPKEYWORD", "CLIPKEYWORDFILE", Category::KeywordAssignment, FormatVersion::V1_0),
    ("NOTE", "NOTEFILE", Category::Note, FormatVersion::V1_0),
    ("FILTER", "FILTERFILE", Category::Filter, FormatVersion::V1_1),
];

const V10: FormatVersion = FormatVersion::V1_0;
const V12: FormatVersion = FormatVersion::V1_2;
const V13: FormatVersion = FormatVersion::V1_3;
const V14: FormatVersion = FormatVersion::V1_4;
const V15: FormatVersion = FormatVersion::V1_5;

// (category, field tag, field, first version)
const FIELDS: &[(Category, &str, Field, FormatVersion)] = &[
    (Category::Library, "NUM", Field::Num, V10),
    (Category::Library, "ID", Field::Id, V10),
    (Category::Library, "COMMENT", Field::Comment, V10),
    (Category::Library, "OWNER", Field::Owner, V10),
    (Category::Library, "DEFAULTKEYWORDGROUP", Field::DefaultKeywordGroup, V10),
    (Category::Document, "NUM", Field::Num, V15),
    (Category::Document, "ID", Field::Id, V15),
    (Category::Document, "LIBRARYNUM", Field::LibraryNum, V15),
    (Category::Document, "AUTHOR", Field::Author, V15),
    (Category::Document, "COMMENT", Field::Comment, V15),
    (Category::Document, "IMPORTEDFILE", Field::ImportedFile, V15),
    (Category::Document, "IMPORTDATE", Field::ImportDate, V15),
    (Category::Document, "DOCUMENTLENGTH", Field::DocumentLength, V15),
    (Category::Document, "XMLTEXT", Field::XmlText, V15),
    (Category::Episode, "NUM", Field::Num, V10),
    (Category::Episode, "ID", Field::Id, V10),
    (Category::Episode, "SERIESNUM", Field::LibraryNum, V10),
    (Category::Episode, "DATE", Field::Date, V10),
    (Category::Episode, "MEDIAFILE", Field::MediaFile, V10),
    (Category::Episode, "LENGTH", Field::Length, V10),
    (Category::Episode, "COMMENT", Field::Comment, V10),
    (Category::CoreData, "NUM", Field::Num, V10),
    (Category::CoreData, "MEDIAFILE", Field::MediaFile, V10),
    (Category::CoreData, "TITLE", Field::Title, V10),
    (Category::CoreData, "CREATOR", Field::Creator, V10),
    (Category::CoreData, "SUBJECT", Field::Subject, V10),
    (Category::CoreData, "DESCRIPTION", Field::Description, V10),
    (Category::CoreData, "PUBLISHER", Field::Publisher, V10),
    (Category::CoreData, "DATE", Field::Date, V10),
    (Category::CoreData, "LANGUAGE", Field::Language, V10),
    (Category::CoreData, "RIGHTS", Field::Rights, V10),
    (Category::Transcript, "NUM", Field::Num, V10),
    (Category::Transcript, "ID", Field::Id, V10),
    (Category::Transcript, "EPISODENUM", Field::EpisodeNum, V10),
    (Category::Transcript, "TRANSCRIBER", Field::Transcriber, V10),
    (Category::Transcript, "COMMENT", Field::Comment, V10),
    (Category::Transcript, "RTFTEXT", Field::RtfText, V10),
    (Category::Transcript, "SOURCETRANSCRIPTNUM", Field::SourceTranscriptNum, V12),
    (Category::Transcript, "CLIPNUM", Field::ClipNum, V12),
    (Category::Transcript, "SORTORDER", Field::SortOrder, V12),
    (Category::Transcript, "CLIPSTART", Field::ClipStart, V12),
    (Category::Transcript, "CLIPSTOP", Field::ClipStop, V12),
    (Category::Transcript, "MINTRANSCRIPTWIDTH", Field::MinTranscriptWidth, V12),
    (Category::Collection, "NUM", Field::Num, V10),
    (Category::Collection, "ID", Field::Id, V10),
    (Category::Collection, "PARENTCOLLECTNUM", Field::ParentCollectNum, V10),
    (Category::Collection, "COMMENT", Field::Comment, V10),
    (Category::Collection, "OWNER", Field::Owner, V10),
    (Category::Collection, "DEFAULTKEYWORDGROUP", Field::DefaultKeywordGroup, V10),
    (Category::Quote, "NUM", Field::Num, V15),
    (Category::Quote, "ID", Field::Id, V15),
    (Category::Quote, "COLLECTNUM", Field::CollectNum, V15),
    (Category::Quote, "SORTORDER", Field::SortOrder, V15),
    (Category::Quote, "COMMENT", Field::Comment, V15),
    (Category::Quote, "XMLTEXT", Field::XmlText, V15),
    (Category::QuotePosition, "QUOTENUM", Field::QuoteNum, V15),
    (Category::QuotePosition, "DOCUMENTNUM", Field::DocumentNum, V15),
    (Category::QuotePosition, "STARTCHAR", Field::StartChar, V15),
    (Category::QuotePosition, "ENDCHAR", Field::EndChar, V15),
    (Category::Clip, "NUM", Field::Num, V10),
    (Category::Clip, "ID", Field::Id, V10),
    (Category::Clip, "COLLECTNUM", Field::CollectNum, V10),
    (Category::Clip, "EPISODENUM", Field::EpisodeNum, V10),
    (Category::Clip, "MEDIAFILE", Field::MediaFile, V10),
    (Category::Clip, "CLIPSTART", Field::ClipStart, V10),
    (Category::Clip, "CLIPSTOP", Field::ClipStop, V10),
    (Category::Clip, "OFFSET", Field::Offset, V10),
    (Category::Clip, "AUDIO", Field::Audio, V10),
    (Category::Clip, "COMMENT", Field::Comment, V10),
    (Category::Clip, "SORTORDER", Field::SortOrder, V10),
    (Category::Clip, "TRANSCRIPTNUM", Field::TranscriptNum, V10),
    (Category::Clip, "RTFTEXT", Field::RtfText, V10),
    (Category::AdditionalVideo, "NUM", Field::Num, V13),
    (Category::AdditionalVideo, "EPISODENUM", Field::EpisodeNum, V13),
    (Category::AdditionalVideo, "CLIPNUM", Field::ClipNum, V13),
    (Category::AdditionalVideo, "MEDIAFILE", Field::MediaFile, V13),
    (Category::AdditionalVideo, "OFFSET", Field::Offset, V13),
    (Category::AdditionalVideo, "AUDIO", Field::Audio, V13),
    (Category::Snapshot, "NUM", Field::Num, V14),
    (Category::Snapshot, "ID", Field::Id, V14),
    (Category::Snapshot, "COLLECTNUM", Field::CollectNum, V14),
    (Category::Snapshot, "IMAGEFILE", Field::ImageFile, V14),
    (Category::Snapshot, "IMAGESCALE", Field::ImageScale, V14),
    (Category::Snapshot, "IMAGECOORDSX", Field::ImageCoordsX, V14),
    (Category::Snapshot, "IMAGECOORDSY", Field::ImageCoordsY, V14),
    (Category::Snapshot, "IMAGESIZEW", Field::ImageSizeW, V14),
    (Category::Snapshot, "IMAGESIZEH", Field::ImageSizeH, V14),
    (Category::Snapshot, "SERIESNUM", Field::LibraryNum, V14),
    (Category::Snapshot, "EPISODENUM", Field::EpisodeNum, V14),
    (Category::Snapshot, "TRANSCRIPTNUM", Field::TranscriptNum, V14),
    (Category::Snapshot, "SNAPSHOTTIMECODE", Field::SnapshotTimeCode, V14),
    (Category::Snapshot, "SNAPSHOTDURATION", Field::SnapshotDuration, V14),
    (Category::Snapshot, "COMMENT", Field::Comment, V14),
    (Category::Snapshot, "SORTORDER", Field::SortOrder, V14),
    (Category::KeywordDefinition, "KEYWORDGROUP", Field::KeywordGroup, V10),
    (Category::KeywordDefinition, "KEYWORD", Field::Keyword, V10),
    (Category::KeywordDefinition, "DEFINITION", Field::Definition, V10),
    (Category::KeywordDefinition, "LINECOLORNAME", Field::LineColorName, V13),
    (Category::KeywordDefinition, "LINECOLORDEF", Field::LineColorDef, V13),
    (Category::KeywordDefinition, "DRAWMODE", Field::DrawMode, V13),
    (Category::KeywordDefinition, "LINEWIDTH", Field::LineWidth, V13),
    (Category::KeywordDefinition, "LINESTYLE", Field::LineStyle, V13),
    (Category::KeywordAssignment, "EPISODENUM", Field::EpisodeNum, V10),
    (Category::KeywordAssignment, "CLIPNUM", Field::ClipNum, V10),
    (Category::KeywordAssignment, "KEYWORDGROUP", Field::KeywordGroup, V10),
    (Category::KeywordAssignment, "KEYWORD", Field::Keyword, V10),
    (Category::KeywordAssignment, "EXAMPLE", Field::Example, V10),
    (Category::KeywordAssignment, "SNAPSHOTNUM", Field::SnapshotNum, V14),
    (Category::KeywordAssignment, "DOCUMENTNUM", Field::DocumentNum, V15),
    (Category::KeywordAssignment, "QUOTENUM", Field::QuoteNum, V15),
    (Category::Note, "NUM", Field::Num, V10),
    (Category::Note, "ID", Field::Id, V10),
    (Category::Note, "SERIESNUM", Field::LibraryNum, V10),
    (Category::Note, "EPISODENUM", Field::EpisodeNum, V10),
    (Category::Note, "COLLECTNUM", Field::CollectNum, V10),
    (Category::Note, "CLIPNUM", Field::ClipNum, V10),
    (Category::Note, "TRANSCRIPTNUM", Field::TranscriptNum, V10),
    (Category::Note, "NOTETAKER", Field::NoteTaker, V10),
    (Category::Note, "NOTETEXT", Field::NoteText, V10),
    (Category::Note, "SNAPSHOTNUM", Field::SnapshotNum, V14),
    (Category::Note, "DOCUMENTNUM", Field::DocumentNum, V15),
    (Category::Note, "QUOTENUM", Field::QuoteNum, V15),
    (Category::Filter, "REPORTTYPE", Field::ReportType, FormatVersion::V1_1),
    (Category::Filter, "REPORTSCOPE", Field::ReportScope, FormatVersion::V1_1),
    (Category::Filter, "CONFIGNAME", Field::ConfigName, FormatVersion::V1_1),
    (Category::Filter, "FILTERDATATYPE", Field::FilterDataType, FormatVersion::V1_1),
    (Category::Filter, "FILTERDATA", Field::FilterData, FormatVersion::V1_1),
];

/// A line recognised as markup: `<NAME>` or `</NAME>`, name upper-cased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagLine {
    pub name: String,
    pub closing: bool,
}

/// Classifies a raw line. `None` means the line is payload content.
pub fn tag_line(line: &str) -> Option<TagLine> {
    let t = line.trim();
    if t.len() < 3 || !t.starts_with('<') || !t.ends_with('>') {
        return None;
    }
    let inner = &t[1..t.len() - 1];
    if inner.starts_with('?') || inner.starts_with('!') {
        return Some(TagLine {
            name: inner[..1].to_string(),
            closing: false,
        });
    }
    let (closing, name) = match inner.strip_prefix('/') {
        Some(rest) => (true, rest.trim()),
        None => (false, inner.trim()),
    };
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    Some(TagLine {
        name: name.to_ascii_uppercase(),
        closing,
    })
}

/// Structural meaning of a tag line in the current context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tag {
    /// `<?xml ...?>` or `<!DOCTYPE ...>`.
    Prolog,
    Root,
    Version,
    VersionClose,
    Section,
    ObjectOpen(Category),
    ObjectClose(Category),
    FieldOpen(Field),
    FieldClose(Field),
    Unknown(String),
}

pub fn section_for(name: &str) -> Option<Category> {
    OBJECTS
        .iter()
        .find(|(_, section, _, _)| *section == name)
        .map(|(_, _, c, _)| *c)
}

pub fn object_for(name: &str) -> Option<Category> {
    OBJECTS
        .iter()
        .find(|(obj, _, _, _)| *obj == name)
        .map(|(_, _, c, _)| *c)
}

pub fn object_tag(category: Category) -> &'static str {
    OBJECTS
        .iter()
        .find(|(_, _, c, _)| *c == category)
        .map(|(obj, _, _, _)| *obj)
        .unwrap_or("")
}

/// First format version in which the category can appear.
pub fn object_since(category: Category) -> FormatVersion {
    OBJECTS
        .iter()
        .find(|(_, _, c, _)| *c == category)
        .map(|(_, _, _, v)| *v)
        .unwrap_or(FormatVersion::LATEST)
}

/// Field selector for `name` within `category`, with its first version.
pub fn field_for(category: Category, name: &str) -> Option<(Field, FormatVersion)> {
    FIELDS
        .iter()
        .find(|(c, n, _, _)| *c == category && *n == name)
        .map(|(_, _, f, v)| (*f, *v))
}

/// Tag name that opens/closes `field` in `category`.
pub fn field_tag(category: Category, field: Field) -> &'static str {
    FIELDS
        .iter()
        .find(|(c, _, f, _)| *c == category && *f == field)
        .map(|(_, n, _, _)| *n)
        .unwrap_or("")
}

/// Resolves a tag line given the category of the object currently open.
/// Field tags are scoped to that category; object tags win when no object
/// is open.
pub fn classify(tag: &TagLine, open: Option<Category>) -> Tag {
    let name = tag.name.as_str();
    if name == "?" || name == "!" {
        return Tag::Prolog;
    }
    if name == ROOT_TAG {
        return Tag::Root;
    }
    if name == VERSION_TAG {
        return if tag.closing {
            Tag::VersionClose
        } else {
            Tag::Version
        };
    }
    if let Some(category) = open {
        if let Some((field, _)) = field_for(category, name) {
            return if tag.closing {
                Tag::FieldClose(field)
            } else {
                Tag::FieldOpen(field)
            };
        }
    }
    if let Some(category) = object_for(name) {
        return if tag.closing {
            Tag::ObjectClose(category)
        } else {
            Tag::ObjectOpen(category)
        };
    }
    if section_for(name).is_some() {
        return Tag::Section;
    }
    Tag::Unknown(name.to_string())
}
