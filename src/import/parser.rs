use super::coerce::coerce;
use super::error::ImportError;
use super::model::{Field, Record};
use super::session::{ImportSession, IssueKind};
use super::vocab::{self, FormatVersion, Tag, TagLine};
use tracing::debug;

/// What the parser hands back to the driver after a line.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The declared format version was read and accepted.
    Version(FormatVersion),
    /// A record block closed. `line` is where it opened.
    Record { record: Record, line: usize },
}

#[derive(Debug)]
enum Slot {
    Field(Field),
    /// Unknown or version-gated field; its content line is dropped.
    Skipped(String),
}

#[derive(Debug)]
enum State {
    Idle,
    ReadingVersion {
        text: Option<String>,
    },
    InObject {
        record: Record,
        opened_at: usize,
    },
    InField {
        record: Record,
        opened_at: usize,
        slot: Slot,
        buf: Vec<u8>,
        lines: usize,
    },
}

/// Single-pass line state machine over an export.
#[derive(Debug)]
pub struct TagParser {
    state: State,
    line: usize,
}

impl Default for TagParser {
    fn default() -> Self {
        Self::new()
    }
}

fn strip_eol(raw: &[u8]) -> &[u8] {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    raw.strip_suffix(b"\r").unwrap_or(raw)
}

fn is_blank(raw: &[u8]) -> bool {
    raw.iter().all(|b| b.is_ascii_whitespace())
}

fn structure(line: usize, message: impl Into<String>) -> ImportError {
    ImportError::Structure {
        line,
        message: message.into(),
    }
}

impl TagParser {
    pub fn new() -> Self {
        TagParser {
            state: State::Idle,
            line: 0,
        }
    }

    /// Consumes one raw line (terminator optional). Errors are fatal.
    pub fn feed(
        &mut self,
        raw: &[u8],
        session: &mut ImportSession,
    ) -> Result<Option<Event>, ImportError> {
        self.line += 1;
        let body = strip_eol(raw);
        let text = String::from_utf8_lossy(body);
        let tag = vocab::tag_line(&text);
        let state = std::mem::replace(&mut self.state, State::Idle);
        self.step(state, body, tag, session)
    }

    /// Signals end of input. Fails if a block is still open.
    pub fn finish(&mut self, session: &ImportSession) -> Result<(), ImportError> {
        let state = std::mem::replace(&mut self.state, State::Idle);
        match state {
            State::Idle => {}
            State::ReadingVersion { .. } => {
                return Err(structure(self.line, "end of input inside the version tag"));
            }
            State::InObject { record, opened_at } | State::InField { record, opened_at, .. } => {
                return Err(structure(
                    self.line,
                    format!(
                        "end of input inside <{}> opened at line {opened_at}",
                        vocab::object_tag(record.category())
                    ),
                ));
            }
        }
        if session.version().is_none() {
            return Err(structure(self.line, "export declares no format version"));
        }
        Ok(())
    }

    fn step(
        &mut self,
        state: State,
        body: &[u8],
        tag: Option<TagLine>,
        session: &mut ImportSession,
    ) -> Result<Option<Event>, ImportError> {
        let line = self.line;
        match state {
            State::Idle => self.idle(body, tag, session),

            State::ReadingVersion { text } => match tag {
                Some(t) if vocab::classify(&t, None) == Tag::VersionClose => {
                    let raw = text.unwrap_or_default();
                    let version = FormatVersion::parse(&raw)
                        .ok_or(ImportError::BadVersion { line, text: raw })?;
                    session.set_version(version)?;
                    debug!(%version, "format version declared");
                    Ok(Some(Event::Version(version)))
                }
                Some(t) => Err(structure(
                    line,
                    format!("unexpected <{}> inside the version tag", t.name),
                )),
                None if is_blank(body) => {
                    self.state = State::ReadingVersion { text };
                    Ok(None)
                }
                None => {
                    let content = String::from_utf8_lossy(body).trim().to_string();
                    if let Some(prev) = text {
                        return Err(ImportError::BadVersion {
                            line,
                            text: format!("{prev} {content}"),
                        });
                    }
                    self.state = State::ReadingVersion {
                        text: Some(content),
                    };
                    Ok(None)
                }
            },

            State::InObject { record, opened_at } => {
                self.in_object(record, opened_at, body, tag, session)
            }

            State::InField {
                mut record,
                opened_at,
                slot,
                mut buf,
                lines,
            } => {
                let multiline = matches!(slot, Slot::Field(f) if f.is_multiline());
                let closes_slot = tag.as_ref().is_some_and(|t| {
                    t.closing
                        && match &slot {
                            Slot::Field(f) => {
                                vocab::classify(t, Some(record.category())) == Tag::FieldClose(*f)
                            }
                            Slot::Skipped(name) => t.name == *name,
                        }
                });

                if closes_slot {
                    finalize(&mut record, &slot, &buf, line, session);
                    self.state = State::InObject { record, opened_at };
                    return Ok(None);
                }

                if multiline {
                    if lines > 0 {
                        buf.push(b'\n');
                    }
                    buf.extend_from_slice(body);
                    self.state = State::InField {
                        record,
                        opened_at,
                        slot,
                        buf,
                        lines: lines + 1,
                    };
                    return Ok(None);
                }

                if tag.is_some() {
                    // Value line missing: close the field empty and let the
                    // object state handle this tag.
                    finalize(&mut record, &slot, &buf, line, session);
                    return self.in_object(record, opened_at, body, tag, session);
                }

                buf.extend_from_slice(body);
                finalize(&mut record, &slot, &buf, line, session);
                self.state = State::InObject { record, opened_at };
                Ok(None)
            }
        }
    }

    fn idle(
        &mut self,
        body: &[u8],
        tag: Option<TagLine>,
        session: &mut ImportSession,
    ) -> Result<Option<Event>, ImportError> {
        let line = self.line;
        let Some(t) = tag else {
            let text = String::from_utf8_lossy(body);
            let trimmed = text.trim();
            // Blank lines and DOCTYPE continuation lines.
            if trimmed.is_empty() || trimmed.starts_with("<!") || trimmed == "]>" {
                return Ok(None);
            }
            session.diagnostics.push(
                IssueKind::Structure,
                None,
                None,
                line,
                format!("stray content outside any record: {trimmed:?}"),
            );
            return Ok(None);
        };

        match vocab::classify(&t, None) {
            Tag::Prolog | Tag::Root | Tag::Section | Tag::VersionClose => Ok(None),
            Tag::Version => {
                if session.version().is_some() {
                    return Err(structure(line, "format version declared twice"));
                }
                self.state = State::ReadingVersion { text: None };
                Ok(None)
            }
            Tag::ObjectOpen(category) => {
                let Some(version) = session.version() else {
                    return Err(structure(
                        line,
                        format!("<{}> appears before the format version", t.name),
                    ));
                };
                if vocab::object_since(category) > version {
                    return Err(structure(
                        line,
                        format!("<{}> is not part of format {version}", t.name),
                    ));
                }
                self.state = State::InObject {
                    record: Record::new(category),
                    opened_at: line,
                };
                Ok(None)
            }
            Tag::ObjectClose(_) => Err(structure(
                line,
                format!("</{}> closes a record that was never opened", t.name),
            )),
            Tag::FieldOpen(_) | Tag::FieldClose(_) | Tag::Unknown(_) => {
                session.diagnostics.push(
                    IssueKind::Structure,
                    None,
                    None,
                    line,
                    format!("unknown tag <{}> outside any record", t.name),
                );
                Ok(None)
            }
        }
    }

    fn in_object(
        &mut self,
        record: Record,
        opened_at: usize,
        body: &[u8],
        tag: Option<TagLine>,
        session: &mut ImportSession,
    ) -> Result<Option<Event>, ImportError> {
        let line = self.line;
        let category = record.category();
        let open_tag = vocab::object_tag(category);

        let Some(t) = tag else {
            if !is_blank(body) {
                session.diagnostics.push(
                    IssueKind::Structure,
                    Some(category),
                    record.source_id(),
                    line,
                    "content outside any field was skipped",
                );
            }
            self.state = State::InObject { record, opened_at };
            return Ok(None);
        };

        match vocab::classify(&t, Some(category)) {
            Tag::FieldOpen(field) => {
                let since = vocab::field_for(category, &t.name).map(|(_, v)| v);
                let available = match (since, session.version()) {
                    (Some(since), Some(version)) => since <= version,
                    _ => false,
                };
                let slot = if available {
                    Slot::Field(field)
                } else {
                    session.diagnostics.push(
                        IssueKind::Structure,
                        Some(category),
                        record.source_id(),
                        line,
                        format!("<{}> is not part of the declared format; skipped", t.name),
                    );
                    Slot::Skipped(t.name)
                };
                self.state = State::InField {
                    record,
                    opened_at,
                    slot,
                    buf: Vec::new(),
                    lines: 0,
                };
                Ok(None)
            }
            Tag::FieldClose(_) => {
                self.state = State::InObject { record, opened_at };
                Ok(None)
            }
            Tag::ObjectClose(closed) if closed == category => Ok(Some(Event::Record {
                record,
                line: opened_at,
            })),
            Tag::ObjectClose(_) => Err(structure(
                line,
                format!("</{}> does not close <{open_tag}> opened at line {opened_at}", t.name),
            )),
            Tag::ObjectOpen(_) => Err(structure(
                line,
                format!("<{}> opened inside <{open_tag}> (line {opened_at})", t.name),
            )),
            Tag::Unknown(name) if t.closing => {
                debug!(tag = %name, "ignoring stray close tag");
                self.state = State::InObject { record, opened_at };
                Ok(None)
            }
            Tag::Unknown(name) => {
                session.diagnostics.push(
                    IssueKind::Structure,
                    Some(category),
                    record.source_id(),
                    line,
                    format!("unknown field <{name}> in <{open_tag}>; skipped"),
                );
                self.state = State::InField {
                    record,
                    opened_at,
                    slot: Slot::Skipped(name),
                    buf: Vec::new(),
                    lines: 0,
                };
                Ok(None)
            }
            Tag::Prolog | Tag::Root | Tag::Version | Tag::VersionClose | Tag::Section => {
                Err(structure(
                    line,
                    format!("<{}> inside <{open_tag}> opened at line {opened_at}", t.name),
                ))
            }
        }
    }
}

fn finalize(record: &mut Record, slot: &Slot, buf: &[u8], line: usize, session: &mut ImportSession) {
    let Slot::Field(field) = slot else {
        return;
    };
    let coerced = coerce(*field, buf, session.codec_for(*field));
    if let Some(issue) = coerced.issue {
        session.diagnostics.push(
            IssueKind::Field,
            Some(record.category()),
            record.source_id(),
            line,
            format!("{}: {issue}", vocab::field_tag(record.category(), *field)),
        );
    }
    record.set(*field, coerced.value);
}
