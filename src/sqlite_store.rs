//! `EntityStore` over the workspace SQLite database.

use crate::import::model::{Category, Record};
use crate::import::ImportReport;
use crate::store::{EntityStore, PersistError, RecordLocks};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use serde_json::json;

impl From<rusqlite::Error> for PersistError {
    fn from(e: rusqlite::Error) -> Self {
        PersistError::Backend(e.to_string())
    }
}

pub fn table_for(category: Category) -> &'static str {
    match category {
        Category::Library => "libraries",
        Category::Document => "documents",
        Category::Episode => "episodes",
        Category::Transcript => "transcripts",
        Category::Collection => "collections",
        Category::Quote => "quotes",
        Category::QuotePosition => "quote_positions",
        Category::Clip => "clips",
        Category::Snapshot => "snapshots",
        Category::AdditionalVideo => "additional_videos",
        Category::KeywordDefinition => "keywords",
        Category::KeywordAssignment => "keyword_assignments",
        Category::Note => "notes",
        Category::Filter => "filters",
        Category::CoreData => "core_data",
    }
}

fn day(d: Option<NaiveDate>) -> Option<String> {
    d.map(|d| d.format("%Y-%m-%d").to_string())
}

pub struct SqliteStore<'c> {
    conn: &'c Connection,
    owner: String,
    tx: Option<Transaction<'c>>,
}

impl<'c> SqliteStore<'c> {
    pub fn new(conn: &'c Connection, owner: impl Into<String>) -> Self {
        SqliteStore {
            conn,
            owner: owner.into(),
            tx: None,
        }
    }

    fn lock_holder(&self, category: Category, id: i64) -> Result<Option<String>, PersistError> {
        Ok(self
            .conn
            .query_row(
                "SELECT owner FROM record_locks WHERE category = ? AND record_id = ?",
                params![category.as_str(), id],
                |r| r.get(0),
            )
            .optional()?)
    }

    /// Looks rows up by rowid, which is also what `insert` returns; keyword
    /// tables have a composite key and no `id` column.
    fn exists(&self, category: Category, id: i64) -> Result<bool, PersistError> {
        let sql = format!("SELECT 1 FROM {} WHERE rowid = ?", table_for(category));
        Ok(self
            .conn
            .query_row(&sql, [id], |_| Ok(()))
            .optional()?
            .is_some())
    }

    /// A non-zero parent must exist and must not be locked by someone else.
    fn check_parent(&self, category: Category, parent: Category, id: i64) -> Result<(), PersistError> {
        if id == 0 {
            return Ok(());
        }
        if !self.exists(parent, id)? {
            return Err(PersistError::MissingParent { category, parent, id });
        }
        match self.lock_holder(parent, id)? {
            Some(holder) if holder != self.owner => Err(PersistError::LockConflict {
                category: parent,
                id,
                holder,
            }),
            _ => Ok(()),
        }
    }

    fn body_table(category: Category) -> Result<&'static str, PersistError> {
        match category {
            Category::Document | Category::Quote | Category::Transcript => Ok(table_for(category)),
            other => Err(PersistError::Validation {
                category: other,
                reason: "category has no rich-text body".into(),
            }),
        }
    }

    fn insert_record(&self, record: &Record) -> Result<(), PersistError> {
        let c = self.conn;
        let category = record.category();
        match record {
            Record::Library(r) => {
                let taken = !r.name.is_empty()
                    && c.query_row("SELECT 1 FROM libraries WHERE name = ?", [&r.name], |_| Ok(()))
                        .optional()?
                        .is_some();
                if taken {
                    return Err(PersistError::Duplicate {
                        category,
                        key: r.name.clone(),
                    });
                }
                c.execute(
                    "INSERT INTO libraries(name, comment, owner, default_keyword_group)
                     VALUES(?, ?, ?, ?)",
                    params![r.name, r.comment, r.owner, r.default_keyword_group],
                )?;
            }
            Record::Document(r) => {
                self.check_parent(category, Category::Library, r.library_num)?;
                c.execute(
                    "INSERT INTO documents(name, library_id, author, comment, imported_file,
                        import_date, document_length, body)
                     VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
                    params![
                        r.name,
                        r.library_num,
                        r.author,
                        r.comment,
                        r.imported_file,
                        day(r.import_date),
                        r.document_length,
                        r.body
                    ],
                )?;
            }
            Record::Episode(r) => {
                self.check_parent(category, Category::Library, r.library_num)?;
                c.execute(
                    "INSERT INTO episodes(name, library_id, recorded_on, media_file, length_ms, comment)
                     VALUES(?, ?, ?, ?, ?, ?)",
                    params![r.name, r.library_num, day(r.date), r.media_file, r.length_ms, r.comment],
                )?;
            }
            Record::CoreData(r) => {
                let taken = c
                    .query_row(
                        "SELECT 1 FROM core_data WHERE media_file = ?",
                        [&r.media_file],
                        |_| Ok(()),
                    )
                    .optional()?
                    .is_some();
                if taken {
                    return Err(PersistError::Duplicate {
                        category,
                        key: r.media_file.clone(),
                    });
                }
                c.execute(
                    "INSERT INTO core_data(media_file, title, creator, subject, description,
                        publisher, published_on, language, rights)
                     VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    params![
                        r.media_file,
                        r.title,
                        r.creator,
                        r.subject,
                        r.description,
                        r.publisher,
                        day(r.date),
                        r.language,
                        r.rights
                    ],
                )?;
            }
            Record::Transcript(r) => {
                self.check_parent(category, Category::Episode, r.episode_num)?;
                self.check_parent(category, Category::Clip, r.clip_num)?;
                c.execute(
                    "INSERT INTO transcripts(name, episode_id, transcriber, comment, body, clip_id,
                        source_transcript_id, sort_order, clip_start, clip_stop, min_width)
                     VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    params![
                        r.name,
                        r.episode_num,
                        r.transcriber,
                        r.comment,
                        r.body,
                        r.clip_num,
                        r.source_transcript_num,
                        r.sort_order,
                        r.clip_start,
                        r.clip_stop,
                        r.min_width
                    ],
                )?;
            }
            Record::Collection(r) => {
                self.check_parent(category, Category::Collection, r.parent_num)?;
                c.execute(
                    "INSERT INTO collections(name, parent_id, comment, owner, default_keyword_group)
                     VALUES(?, ?, ?, ?, ?)",
                    params![r.name, r.parent_num, r.comment, r.owner, r.default_keyword_group],
                )?;
            }
            Record::Quote(r) => {
                self.check_parent(category, Category::Collection, r.collection_num)?;
                c.execute(
                    "INSERT INTO quotes(name, collection_id, sort_order, comment, body)
                     VALUES(?, ?, ?, ?, ?)",
                    params![r.name, r.collection_num, r.sort_order, r.comment, r.body],
                )?;
            }
            Record::QuotePosition(r) => {
                self.check_parent(category, Category::Quote, r.quote_num)?;
                self.check_parent(category, Category::Document, r.document_num)?;
                c.execute(
                    "INSERT INTO quote_positions(quote_id, document_id, start_char, end_char)
                     VALUES(?, ?, ?, ?)",
                    params![r.quote_num, r.document_num, r.start_char, r.end_char],
                )?;
            }
            Record::Clip(r) => {
                self.check_parent(category, Category::Collection, r.collection_num)?;
                self.check_parent(category, Category::Episode, r.episode_num)?;
                c.execute(
                    "INSERT INTO clips(name, collection_id, episode_id, media_file, clip_start,
                        clip_stop, offset_ms, audio, comment, sort_order)
                     VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    params![
                        r.name,
                        r.collection_num,
                        r.episode_num,
                        r.media_file,
                        r.clip_start,
                        r.clip_stop,
                        r.offset_ms,
                        r.audio,
                        r.comment,
                        r.sort_order
                    ],
                )?;
            }
            Record::AdditionalVideo(r) => {
                c.execute(
                    "INSERT INTO additional_videos(episode_id, clip_id, media_file, offset_ms, audio)
                     VALUES(?, ?, ?, ?, ?)",
                    params![r.episode_num, r.clip_num, r.media_file, r.offset_ms, r.audio],
                )?;
            }
            Record::Snapshot(r) => {
                self.check_parent(category, Category::Collection, r.collection_num)?;
                c.execute(
                    "INSERT INTO snapshots(name, collection_id, image_file, image_scale, coords_x,
                        coords_y, size_w, size_h, library_id, episode_id, transcript_id,
                        time_code, duration, comment, sort_order)
                     VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    params![
                        r.name,
                        r.collection_num,
                        r.image_file,
                        r.image_scale,
                        r.coords_x,
                        r.coords_y,
                        r.size_w,
                        r.size_h,
                        r.library_num,
                        r.episode_num,
                        r.transcript_num,
                        r.time_code,
                        r.duration,
                        r.comment,
                        r.sort_order
                    ],
                )?;
            }
            Record::KeywordDefinition(r) => {
                if r.keyword_group.is_empty() || r.keyword.is_empty() {
                    return Err(PersistError::Validation {
                        category,
                        reason: "keyword group and keyword are required".into(),
                    });
                }
                let taken = c
                    .query_row(
                        "SELECT 1 FROM keywords WHERE keyword_group = ? AND keyword = ?",
                        params![r.keyword_group, r.keyword],
                        |_| Ok(()),
                    )
                    .optional()?
                    .is_some();
                if taken {
                    return Err(PersistError::Duplicate {
                        category,
                        key: format!("{} : {}", r.keyword_group, r.keyword),
                    });
                }
                c.execute(
                    "INSERT INTO keywords(keyword_group, keyword, definition, line_color_name,
                        line_color_def, draw_mode, line_width, line_style)
                     VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
                    params![
                        r.keyword_group,
                        r.keyword,
                        r.definition,
                        r.line_color_name,
                        r.line_color_def,
                        r.draw_mode,
                        r.line_width,
                        r.line_style
                    ],
                )?;
            }
            Record::KeywordAssignment(r) => {
                if r.keyword_group.is_empty() || r.keyword.is_empty() {
                    return Err(PersistError::Validation {
                        category,
                        reason: "keyword group and keyword are required".into(),
                    });
                }
                c.execute(
                    "INSERT INTO keyword_assignments(document_id, episode_id, quote_id, clip_id,
                        snapshot_id, keyword_group, keyword, example)
                     VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
                    params![
                        r.document_num,
                        r.episode_num,
                        r.quote_num,
                        r.clip_num,
                        r.snapshot_num,
                        r.keyword_group,
                        r.keyword,
                        r.example
                    ],
                )?;
            }
            Record::Note(r) => {
                c.execute(
                    "INSERT INTO notes(name, library_id, document_id, episode_id, collection_id,
                        clip_id, snapshot_id, transcript_id, quote_id, note_taker, note_text)
                     VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    params![
                        r.name,
                        r.library_num,
                        r.document_num,
                        r.episode_num,
                        r.collection_num,
                        r.clip_num,
                        r.snapshot_num,
                        r.transcript_num,
                        r.quote_num,
                        r.note_taker,
                        r.text
                    ],
                )?;
            }
            Record::Filter(r) => {
                c.execute(
                    "INSERT INTO filters(report_type, report_scope, config_name, filter_data_type,
                        filter_data)
                     VALUES(?, ?, ?, ?, ?)",
                    params![
                        r.report_type,
                        r.report_scope,
                        r.config_name,
                        r.filter_data_type,
                        r.filter_data
                    ],
                )?;
            }
        }
        Ok(())
    }
}

impl RecordLocks for SqliteStore<'_> {
    fn acquire(&mut self, category: Category, id: i64) -> Result<(), PersistError> {
        match self.lock_holder(category, id)? {
            Some(holder) if holder != self.owner => {
                Err(PersistError::LockConflict { category, id, holder })
            }
            Some(_) => Ok(()),
            None => {
                self.conn.execute(
                    "INSERT INTO record_locks(category, record_id, owner, locked_at)
                     VALUES(?, ?, ?, ?)",
                    params![category.as_str(), id, self.owner, chrono::Utc::now().to_rfc3339()],
                )?;
                Ok(())
            }
        }
    }

    fn release(&mut self, category: Category, id: i64) -> Result<(), PersistError> {
        self.conn.execute(
            "DELETE FROM record_locks WHERE category = ? AND record_id = ? AND owner = ?",
            params![category.as_str(), id, self.owner],
        )?;
        Ok(())
    }
}

impl EntityStore for SqliteStore<'_> {
    fn begin(&mut self) -> Result<(), PersistError> {
        if self.tx.is_some() {
            return Err(PersistError::Backend("transaction already open".into()));
        }
        self.tx = Some(Transaction::new_unchecked(
            self.conn,
            TransactionBehavior::Immediate,
        )?);
        Ok(())
    }

    fn commit(&mut self) -> Result<(), PersistError> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| PersistError::Backend("no open transaction".into()))?;
        // A failed commit drops the transaction, which rolls it back.
        tx.commit()?;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), PersistError> {
        match self.tx.take() {
            Some(tx) => Ok(tx.rollback()?),
            None => Ok(()),
        }
    }

    fn insert(&mut self, record: &Record) -> Result<i64, PersistError> {
        self.insert_record(record)?;
        Ok(self.conn.last_insert_rowid())
    }

    fn set_collection_parent(&mut self, id: i64, parent_id: i64) -> Result<(), PersistError> {
        if id == parent_id {
            return Err(PersistError::Validation {
                category: Category::Collection,
                reason: format!("collection {id} cannot be its own parent"),
            });
        }
        self.check_parent(Category::Collection, Category::Collection, parent_id)?;
        let changed = self.conn.execute(
            "UPDATE collections SET parent_id = ? WHERE id = ?",
            params![parent_id, id],
        )?;
        if changed == 0 {
            return Err(PersistError::Backend(format!("collection {id} not found")));
        }
        Ok(())
    }

    fn set_transcript_links(
        &mut self,
        id: i64,
        clip_id: i64,
        source_transcript_id: i64,
    ) -> Result<(), PersistError> {
        let changed = self.conn.execute(
            "UPDATE transcripts SET clip_id = ?, source_transcript_id = ? WHERE id = ?",
            params![clip_id, source_transcript_id, id],
        )?;
        if changed == 0 {
            return Err(PersistError::Backend(format!("transcript {id} not found")));
        }
        Ok(())
    }

    fn body(&mut self, category: Category, id: i64) -> Result<Option<String>, PersistError> {
        let table = Self::body_table(category)?;
        let sql = format!("SELECT body FROM {} WHERE id = ?", table);
        Ok(self.conn.query_row(&sql, [id], |r| r.get(0)).optional()?)
    }

    fn set_body(&mut self, category: Category, id: i64, body: &str) -> Result<(), PersistError> {
        let table = Self::body_table(category)?;
        let sql = format!("UPDATE {} SET body = ? WHERE id = ?", table);
        self.conn.execute(&sql, params![body, id])?;
        Ok(())
    }
}

/// Row count per category, in category order.
pub fn category_counts(conn: &Connection) -> anyhow::Result<Vec<(Category, i64)>> {
    let mut out = Vec::with_capacity(Category::COUNT);
    for category in Category::ALL {
        let sql = format!("SELECT COUNT(*) FROM {}", table_for(category));
        let n: i64 = conn.query_row(&sql, [], |r| r.get(0))?;
        out.push((category, n));
    }
    Ok(out)
}

pub fn record_import_run(conn: &Connection, source_path: &str, report: &ImportReport) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO import_runs(session_id, source_path, source_sha256, format_version,
            imported_count, issue_count, finished_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        params![
            report.session_id,
            source_path,
            report.source_sha256,
            report.format_version.map(|v| v.to_string()),
            report.total_imported() as i64,
            report.issues.len() as i64,
            chrono::Utc::now().to_rfc3339()
        ],
    )?;
    Ok(())
}

pub fn list_import_runs(conn: &Connection) -> anyhow::Result<Vec<serde_json::Value>> {
    let mut stmt = conn.prepare(
        "SELECT session_id, source_path, source_sha256, format_version, imported_count,
            issue_count, finished_at
         FROM import_runs ORDER BY finished_at, rowid",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok(json!({
                "sessionId": r.get::<_, String>(0)?,
                "sourcePath": r.get::<_, String>(1)?,
                "sourceSha256": r.get::<_, Option<String>>(2)?,
                "formatVersion": r.get::<_, Option<String>>(3)?,
                "importedCount": r.get::<_, i64>(4)?,
                "issueCount": r.get::<_, i64>(5)?,
                "finishedAt": r.get::<_, String>(6)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
