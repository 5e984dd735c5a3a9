use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;

/// Entity categories carried by a project export. Each has its own id space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Category {
    Library,
    Document,
    Episode,
    Transcript,
    Collection,
    Quote,
    QuotePosition,
    Clip,
    Snapshot,
    AdditionalVideo,
    KeywordDefinition,
    KeywordAssignment,
    Note,
    Filter,
    CoreData,
}

impl Category {
    pub const COUNT: usize = 15;

    pub const ALL: [Category; Category::COUNT] = [
        Category::Library,
        Category::Document,
        Category::Episode,
        Category::Transcript,
        Category::Collection,
        Category::Quote,
        Category::QuotePosition,
        Category::Clip,
        Category::Snapshot,
        Category::AdditionalVideo,
        Category::KeywordDefinition,
        Category::KeywordAssignment,
        Category::Note,
        Category::Filter,
        Category::CoreData,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Library => "library",
            Category::Document => "document",
            Category::Episode => "episode",
            Category::Transcript => "transcript",
            Category::Collection => "collection",
            Category::Quote => "quote",
            Category::QuotePosition => "quotePosition",
            Category::Clip => "clip",
            Category::Snapshot => "snapshot",
            Category::AdditionalVideo => "additionalVideo",
            Category::KeywordDefinition => "keywordDefinition",
            Category::KeywordAssignment => "keywordAssignment",
            Category::Note => "note",
            Category::Filter => "filter",
            Category::CoreData => "coreData",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed payload produced by the coercion layer for one field.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(Option<i64>),
    Float(Option<f64>),
    Bool(bool),
    Date(Option<NaiveDate>),
    Text(String),
}

impl Value {
    fn int(self) -> Option<i64> {
        match self {
            Value::Int(v) => v,
            Value::Float(v) => v.map(|f| f as i64),
            _ => None,
        }
    }

    /// Reference-shaped integer: absent means "no reference".
    fn reference(self) -> i64 {
        self.int().unwrap_or(0)
    }

    fn float(self) -> Option<f64> {
        match self {
            Value::Float(v) => v,
            Value::Int(v) => v.map(|i| i as f64),
            _ => None,
        }
    }

    fn flag(self) -> bool {
        match self {
            Value::Bool(b) => b,
            Value::Int(v) => v.unwrap_or(0) != 0,
            _ => false,
        }
    }

    fn date(self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => d,
            _ => None,
        }
    }

    fn text(self) -> String {
        match self {
            Value::Text(s) => s,
            Value::Int(Some(i)) => i.to_string(),
            Value::Float(Some(f)) => f.to_string(),
            _ => String::new(),
        }
    }
}

/// Logical field selected by a field tag. Which categories accept which field
/// lives in the vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Num,
    Id,
    Comment,
    Owner,
    DefaultKeywordGroup,
    LibraryNum,
    Author,
    ImportedFile,
    ImportDate,
    DocumentLength,
    XmlText,
    Date,
    MediaFile,
    Length,
    Title,
    Creator,
    Subject,
    Description,
    Publisher,
    Language,
    Rights,
    EpisodeNum,
    SourceTranscriptNum,
    ClipNum,
    SortOrder,
    Transcriber,
    ClipStart,
    ClipStop,
    MinTranscriptWidth,
    RtfText,
    ParentCollectNum,
    CollectNum,
    QuoteNum,
    DocumentNum,
    StartChar,
    EndChar,
    TranscriptNum,
    Offset,
    Audio,
    ImageFile,
    ImageScale,
    ImageCoordsX,
    ImageCoordsY,
    ImageSizeW,
    ImageSizeH,
    SnapshotTimeCode,
    SnapshotDuration,
    SnapshotNum,
    KeywordGroup,
    Keyword,
    Definition,
    LineColorName,
    LineColorDef,
    DrawMode,
    LineWidth,
    LineStyle,
    Example,
    NoteTaker,
    NoteText,
    ReportType,
    ReportScope,
    ConfigName,
    FilterDataType,
    FilterData,
}

/// How raw payload text for a field is coerced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Int,
    Float,
    Bool,
    Date,
    Text,
    /// Multi-line plain text (note text, keyword definition, filter payload).
    LongText,
    /// Multi-line rich-text body that may carry internal hyperlinks.
    RichText,
}

impl Field {
    pub fn kind(self) -> FieldKind {
        use Field::*;
        match self {
            Num | LibraryNum | DocumentLength | Length | EpisodeNum | SourceTranscriptNum
            | ClipNum | SortOrder | ClipStart | ClipStop | MinTranscriptWidth
            | ParentCollectNum | CollectNum | QuoteNum | DocumentNum | StartChar | EndChar
            | TranscriptNum | Offset | ImageCoordsX | ImageCoordsY | ImageSizeW | ImageSizeH
            | SnapshotTimeCode | SnapshotDuration | SnapshotNum | LineWidth | ReportType
            | ReportScope | FilterDataType => FieldKind::Int,
            ImageScale => FieldKind::Float,
            Audio | Example => FieldKind::Bool,
            ImportDate | Date => FieldKind::Date,
            XmlText | RtfText => FieldKind::RichText,
            Description | Definition | NoteText | FilterData => FieldKind::LongText,
            _ => FieldKind::Text,
        }
    }

    pub fn is_multiline(self) -> bool {
        matches!(self.kind(), FieldKind::RichText | FieldKind::LongText)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LibraryRecord {
    pub num: Option<i64>,
    pub name: String,
    pub comment: String,
    pub owner: String,
    pub default_keyword_group: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentRecord {
    pub num: Option<i64>,
    pub name: String,
    pub library_num: i64,
    pub author: String,
    pub comment: String,
    pub imported_file: String,
    pub import_date: Option<NaiveDate>,
    pub document_length: Option<i64>,
    pub body: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EpisodeRecord {
    pub num: Option<i64>,
    pub name: String,
    pub library_num: i64,
    pub date: Option<NaiveDate>,
    pub media_file: String,
    pub length_ms: Option<i64>,
    pub comment: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoreDataRecord {
    pub num: Option<i64>,
    pub media_file: String,
    pub title: String,
    pub creator: String,
    pub subject: String,
    pub description: String,
    pub publisher: String,
    pub date: Option<NaiveDate>,
    pub language: String,
    pub rights: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranscriptRecord {
    pub num: Option<i64>,
    pub name: String,
    pub episode_num: i64,
    pub source_transcript_num: i64,
    pub clip_num: i64,
    pub sort_order: Option<i64>,
    pub transcriber: String,
    pub clip_start: Option<i64>,
    pub clip_stop: Option<i64>,
    pub comment: String,
    pub min_width: Option<i64>,
    pub body: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectionRecord {
    pub num: Option<i64>,
    pub name: String,
    pub parent_num: i64,
    pub comment: String,
    pub owner: String,
    pub default_keyword_group: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuoteRecord {
    pub num: Option<i64>,
    pub name: String,
    pub collection_num: i64,
    pub sort_order: Option<i64>,
    pub comment: String,
    pub body: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuotePositionRecord {
    pub quote_num: i64,
    pub document_num: i64,
    pub start_char: Option<i64>,
    pub end_char: Option<i64>,
}

/// Whether a transcript carried inside a clip block is written with the clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubRecordPersistence {
    #[default]
    Pending,
    /// Persisted later in the stream as an independent Transcript record.
    DoNotPersist,
}

/// Transcript embedded in a clip block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClipTranscript {
    pub persistence: SubRecordPersistence,
    pub source_transcript_num: i64,
    pub body: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClipRecord {
    pub num: Option<i64>,
    pub name: String,
    pub collection_num: i64,
    pub episode_num: i64,
    pub media_file: String,
    pub clip_start: Option<i64>,
    pub clip_stop: Option<i64>,
    pub offset_ms: Option<i64>,
    pub audio: bool,
    pub comment: String,
    pub sort_order: Option<i64>,
    pub transcripts: Vec<ClipTranscript>,
}

impl ClipRecord {
    fn embedded_transcript(&mut self) -> &mut ClipTranscript {
        if self.transcripts.is_empty() {
            self.transcripts.push(ClipTranscript::default());
        }
        let last = self.transcripts.len() - 1;
        &mut self.transcripts[last]
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdditionalVideoRecord {
    pub num: Option<i64>,
    pub episode_num: i64,
    pub clip_num: i64,
    pub media_file: String,
    pub offset_ms: Option<i64>,
    pub audio: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotRecord {
    pub num: Option<i64>,
    pub name: String,
    pub collection_num: i64,
    pub image_file: String,
    pub image_scale: Option<f64>,
    pub coords_x: Option<i64>,
    pub coords_y: Option<i64>,
    pub size_w: Option<i64>,
    pub size_h: Option<i64>,
    pub library_num: i64,
    pub episode_num: i64,
    pub transcript_num: i64,
    pub time_code: Option<i64>,
    pub duration: Option<i64>,
    pub comment: String,
    pub sort_order: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeywordDefinitionRecord {
    pub keyword_group: String,
    pub keyword: String,
    pub definition: String,
    pub line_color_name: String,
    pub line_color_def: String,
    pub draw_mode: String,
    pub line_width: Option<i64>,
    pub line_style: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeywordAssignmentRecord {
    pub document_num: i64,
    pub episode_num: i64,
    pub quote_num: i64,
    pub clip_num: i64,
    pub snapshot_num: i64,
    pub keyword_group: String,
    pub keyword: String,
    pub example: bool,
}

impl KeywordAssignmentRecord {
    pub fn has_owner(&self) -> bool {
        [
            self.document_num,
            self.episode_num,
            self.quote_num,
            self.clip_num,
            self.snapshot_num,
        ]
        .iter()
        .any(|n| *n != 0)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NoteRecord {
    pub num: Option<i64>,
    pub name: String,
    pub library_num: i64,
    pub document_num: i64,
    pub episode_num: i64,
    pub collection_num: i64,
    pub clip_num: i64,
    pub snapshot_num: i64,
    pub transcript_num: i64,
    pub quote_num: i64,
    pub note_taker: String,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterRecord {
    pub report_type: i64,
    pub report_scope: i64,
    pub config_name: String,
    pub filter_data_type: i64,
    pub filter_data: String,
}

impl FilterRecord {
    /// Category implied for `report_scope` by the report type.
    pub fn scope_category(&self) -> Option<Category> {
        match self.report_type {
            1..=4 => Some(Category::Library),
            5..=8 => Some(Category::Episode),
            9..=12 => Some(Category::Collection),
            13..=14 => Some(Category::Document),
            _ => None,
        }
    }
}

/// A record under construction, one variant per category.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Library(LibraryRecord),
    Document(DocumentRecord),
    Episode(EpisodeRecord),
    Transcript(TranscriptRecord),
    Collection(CollectionRecord),
    Quote(QuoteRecord),
    QuotePosition(QuotePositionRecord),
    Clip(ClipRecord),
    Snapshot(SnapshotRecord),
    AdditionalVideo(AdditionalVideoRecord),
    KeywordDefinition(KeywordDefinitionRecord),
    KeywordAssignment(KeywordAssignmentRecord),
    Note(NoteRecord),
    Filter(FilterRecord),
    CoreData(CoreDataRecord),
}

impl Record {
    pub fn new(category: Category) -> Self {
        match category {
            Category::Library => Record::Library(Default::default()),
            Category::Document => Record::Document(Default::default()),
            Category::Episode => Record::Episode(Default::default()),
            Category::Transcript => Record::Transcript(Default::default()),
            Category::Collection => Record::Collection(Default::default()),
            Category::Quote => Record::Quote(Default::default()),
            Category::QuotePosition => Record::QuotePosition(Default::default()),
            Category::Clip => Record::Clip(Default::default()),
            Category::Snapshot => Record::Snapshot(Default::default()),
            Category::AdditionalVideo => Record::AdditionalVideo(Default::default()),
            Category::KeywordDefinition => Record::KeywordDefinition(Default::default()),
            Category::KeywordAssignment => Record::KeywordAssignment(Default::default()),
            Category::Note => Record::Note(Default::default()),
            Category::Filter => Record::Filter(Default::default()),
            Category::CoreData => Record::CoreData(Default::default()),
        }
    }

    pub fn category(&self) -> Category {
        match self {
            Record::Library(_) => Category::Library,
            Record::Document(_) => Category::Document,
            Record::Episode(_) => Category::Episode,
            Record::Transcript(_) => Category::Transcript,
            Record::Collection(_) => Category::Collection,
            Record::Quote(_) => Category::Quote,
            Record::QuotePosition(_) => Category::QuotePosition,
            Record::Clip(_) => Category::Clip,
            Record::Snapshot(_) => Category::Snapshot,
            Record::AdditionalVideo(_) => Category::AdditionalVideo,
            Record::KeywordDefinition(_) => Category::KeywordDefinition,
            Record::KeywordAssignment(_) => Category::KeywordAssignment,
            Record::Note(_) => Category::Note,
            Record::Filter(_) => Category::Filter,
            Record::CoreData(_) => Category::CoreData,
        }
    }

    /// Old identifier as read from the export, if the category carries one.
    pub fn source_id(&self) -> Option<i64> {
        match self {
            Record::Library(r) => r.num,
            Record::Document(r) => r.num,
            Record::Episode(r) => r.num,
            Record::Transcript(r) => r.num,
            Record::Collection(r) => r.num,
            Record::Quote(r) => r.num,
            Record::Clip(r) => r.num,
            Record::Snapshot(r) => r.num,
            Record::AdditionalVideo(r) => r.num,
            Record::Note(r) => r.num,
            Record::CoreData(r) => r.num,
            Record::QuotePosition(_)
            | Record::KeywordDefinition(_)
            | Record::KeywordAssignment(_)
            | Record::Filter(_) => None,
        }
    }

    /// Removes the old identifier, leaving the record unassigned.
    pub fn take_source_id(&mut self) -> Option<i64> {
        match self {
            Record::Library(r) => r.num.take(),
            Record::Document(r) => r.num.take(),
            Record::Episode(r) => r.num.take(),
            Record::Transcript(r) => r.num.take(),
            Record::Collection(r) => r.num.take(),
            Record::Quote(r) => r.num.take(),
            Record::Clip(r) => r.num.take(),
            Record::Snapshot(r) => r.num.take(),
            Record::AdditionalVideo(r) => r.num.take(),
            Record::Note(r) => r.num.take(),
            Record::CoreData(r) => r.num.take(),
            Record::QuotePosition(_)
            | Record::KeywordDefinition(_)
            | Record::KeywordAssignment(_)
            | Record::Filter(_) => None,
        }
    }

    /// Rich-text body, for categories whose bodies may carry hyperlinks.
    pub fn rich_text(&self) -> Option<&str> {
        match self {
            Record::Document(r) => Some(&r.body),
            Record::Quote(r) => Some(&r.body),
            Record::Transcript(r) => Some(&r.body),
            _ => None,
        }
    }

    /// Stores a coerced value. Fields the vocabulary never routes to this
    /// category are ignored.
    pub fn set(&mut self, field: Field, value: Value) {
        use Field as F;
        match self {
            Record::Library(r) => match field {
                F::Num => r.num = value.int(),
                F::Id => r.name = value.text(),
                F::Comment => r.comment = value.text(),
                F::Owner => r.owner = value.text(),
                F::DefaultKeywordGroup => r.default_keyword_group = value.text(),
                _ => {}
            },
            Record::Document(r) => match field {
                F::Num => r.num = value.int(),
                F::Id => r.name = value.text(),
                F::LibraryNum => r.library_num = value.reference(),
                F::Author => r.author = value.text(),
                F::Comment => r.comment = value.text(),
                F::ImportedFile => r.imported_file = value.text(),
                F::ImportDate => r.import_date = value.date(),
                F::DocumentLength => r.document_length = value.int(),
                F::XmlText => r.body = value.text(),
                _ => {}
            },
            Record::Episode(r) => match field {
                F::Num => r.num = value.int(),
                F::Id => r.name = value.text(),
                F::LibraryNum => r.library_num = value.reference(),
                F::Date => r.date = value.date(),
                F::MediaFile => r.media_file = value.text(),
                F::Length => r.length_ms = value.int(),
                F::Comment => r.comment = value.text(),
                _ => {}
            },
            Record::CoreData(r) => match field {
                F::Num => r.num = value.int(),
                F::MediaFile => r.media_file = value.text(),
                F::Title => r.title = value.text(),
                F::Creator => r.creator = value.text(),
                F::Subject => r.subject = value.text(),
                F::Description => r.description = value.text(),
                F::Publisher => r.publisher = value.text(),
                F::Date => r.date = value.date(),
                F::Language => r.language = value.text(),
                F::Rights => r.rights = value.text(),
                _ => {}
            },
            Record::Transcript(r) => match field {
                F::Num => r.num = value.int(),
                F::Id => r.name = value.text(),
                F::EpisodeNum => r.episode_num = value.reference(),
                F::SourceTranscriptNum => r.source_transcript_num = value.reference(),
                F::ClipNum => r.clip_num = value.reference(),
                F::SortOrder => r.sort_order = value.int(),
                F::Transcriber => r.transcriber = value.text(),
                F::ClipStart => r.clip_start = value.int(),
                F::ClipStop => r.clip_stop = value.int(),
                F::Comment => r.comment = value.text(),
                F::MinTranscriptWidth => r.min_width = value.int(),
                F::RtfText => r.body = value.text(),
                _ => {}
            },
            Record::Collection(r) => match field {
                F::Num => r.num = value.int(),
                F::Id => r.name = value.text(),
                F::ParentCollectNum => r.parent_num = value.reference(),
                F::Comment => r.comment = value.text(),
                F::Owner => r.owner = value.text(),
                F::DefaultKeywordGroup => r.default_keyword_group = value.text(),
                _ => {}
            },
            Record::Quote(r) => match field {
                F::Num => r.num = value.int(),
                F::Id => r.name = value.text(),
                F::CollectNum => r.collection_num = value.reference(),
                F::SortOrder => r.sort_order = value.int(),
                F::Comment => r.comment = value.text(),
                F::XmlText => r.body = value.text(),
                _ => {}
            },
            Record::QuotePosition(r) => match field {
                F::QuoteNum => r.quote_num = value.reference(),
                F::DocumentNum => r.document_num = value.reference(),
                F::StartChar => r.start_char = value.int(),
                F::EndChar => r.end_char = value.int(),
                _ => {}
            },
            Record::Clip(r) => match field {
                F::Num => r.num = value.int(),
                F::Id => r.name = value.text(),
                F::CollectNum => r.collection_num = value.reference(),
                F::EpisodeNum => r.episode_num = value.reference(),
                F::MediaFile => r.media_file = value.text(),
                F::ClipStart => r.clip_start = value.int(),
                F::ClipStop => r.clip_stop = value.int(),
                F::Offset => r.offset_ms = value.int(),
                F::Audio => r.audio = value.flag(),
                F::Comment => r.comment = value.text(),
                F::SortOrder => r.sort_order = value.int(),
                F::TranscriptNum => {
                    r.embedded_transcript().source_transcript_num = value.reference()
                }
                F::RtfText => r.embedded_transcript().body = value.text(),
                _ => {}
            },
            Record::AdditionalVideo(r) => match field {
                F::Num => r.num = value.int(),
                F::EpisodeNum => r.episode_num = value.reference(),
                F::ClipNum => r.clip_num = value.reference(),
                F::MediaFile => r.media_file = value.text(),
                F::Offset => r.offset_ms = value.int(),
                F::Audio => r.audio = value.flag(),
                _ => {}
            },
            Record::Snapshot(r) => match field {
                F::Num => r.num = value.int(),
                F::Id => r.name = value.text(),
                F::CollectNum => r.collection_num = value.reference(),
                F::ImageFile => r.image_file = value.text(),
                F::ImageScale => r.image_scale = value.float(),
                F::ImageCoordsX => r.coords_x = value.int(),
                F::ImageCoordsY => r.coords_y = value.int(),
                F::ImageSizeW => r.size_w = value.int(),
                F::ImageSizeH => r.size_h = value.int(),
                F::LibraryNum => r.library_num = value.reference(),
                F::EpisodeNum => r.episode_num = value.reference(),
                F::TranscriptNum => r.transcript_num = value.reference(),
                F::SnapshotTimeCode => r.time_code = value.int(),
                F::SnapshotDuration => r.duration = value.int(),
                F::Comment => r.comment = value.text(),
                F::SortOrder => r.sort_order = value.int(),
                _ => {}
            },
            Record::KeywordDefinition(r) => match field {
                F::KeywordGroup => r.keyword_group = value.text(),
                F::Keyword => r.keyword = value.text(),
                F::Definition => r.definition = value.text(),
                F::LineColorName => r.line_color_name = value.text(),
                F::LineColorDef => r.line_color_def = value.text(),
                F::DrawMode => r.draw_mode = value.text(),
                F::LineWidth => r.line_width = value.int(),
                F::LineStyle => r.line_style = value.text(),
                _ => {}
            },
            Record::KeywordAssignment(r) => match field {
                F::DocumentNum => r.document_num = value.reference(),
                F::EpisodeNum => r.episode_num = value.reference(),
                F::QuoteNum => r.quote_num = value.reference(),
                F::ClipNum => r.clip_num = value.reference(),
                F::SnapshotNum => r.snapshot_num = value.reference(),
                F::KeywordGroup => r.keyword_group = value.text(),
                F::Keyword => r.keyword = value.text(),
                F::Example => r.example = value.flag(),
                _ => {}
            },
            Record::Note(r) => match field {
                F::Num => r.num = value.int(),
                F::Id => r.name = value.text(),
                F::LibraryNum => r.library_num = value.reference(),
                F::DocumentNum => r.document_num = value.reference(),
                F::EpisodeNum => r.episode_num = value.reference(),
                F::CollectNum => r.collection_num = value.reference(),
                F::ClipNum => r.clip_num = value.reference(),
                F::SnapshotNum => r.snapshot_num = value.reference(),
                F::TranscriptNum => r.transcript_num = value.reference(),
                F::QuoteNum => r.quote_num = value.reference(),
                F::NoteTaker => r.note_taker = value.text(),
                F::NoteText => r.text = value.text(),
                _ => {}
            },
            Record::Filter(r) => match field {
                F::ReportType => r.report_type = value.reference(),
                F::ReportScope => r.report_scope = value.reference(),
                F::ConfigName => r.config_name = value.text(),
                F::FilterDataType => r.filter_data_type = value.reference(),
                F::FilterData => r.filter_data = value.text(),
                _ => {}
            },
        }
    }
}
