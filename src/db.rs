use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE: &str = "qdastore.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    create_schema(&conn)?;
    Ok(conn)
}

/// Creates every table the SQLite store writes to. Zero is the "no
/// reference" sentinel in all reference columns, so there are no foreign keys.
pub fn create_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS libraries(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            comment TEXT NOT NULL DEFAULT '',
            owner TEXT NOT NULL DEFAULT '',
            default_keyword_group TEXT NOT NULL DEFAULT ''
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS documents(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            library_id INTEGER NOT NULL DEFAULT 0,
            author TEXT NOT NULL DEFAULT '',
            comment TEXT NOT NULL DEFAULT '',
            imported_file TEXT NOT NULL DEFAULT '',
            import_date TEXT,
            document_length INTEGER,
            body TEXT NOT NULL DEFAULT ''
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_documents_library ON documents(library_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS episodes(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            library_id INTEGER NOT NULL DEFAULT 0,
            recorded_on TEXT,
            media_file TEXT NOT NULL DEFAULT '',
            length_ms INTEGER,
            comment TEXT NOT NULL DEFAULT ''
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_episodes_library ON episodes(library_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS core_data(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            media_file TEXT NOT NULL UNIQUE,
            title TEXT NOT NULL DEFAULT '',
            creator TEXT NOT NULL DEFAULT '',
            subject TEXT NOT NULL DEFAULT '',
            description TEXT NOT NULL DEFAULT '',
            publisher TEXT NOT NULL DEFAULT '',
            published_on TEXT,
            language TEXT NOT NULL DEFAULT '',
            rights TEXT NOT NULL DEFAULT ''
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS transcripts(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            episode_id INTEGER NOT NULL DEFAULT 0,
            transcriber TEXT NOT NULL DEFAULT '',
            comment TEXT NOT NULL DEFAULT '',
            body TEXT NOT NULL DEFAULT ''
        )",
        [],
    )?;
    // Multi-transcript clips added clip ownership and ordering to transcripts.
    ensure_transcripts_clip_columns(conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_transcripts_episode ON transcripts(episode_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_transcripts_clip ON transcripts(clip_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS collections(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            parent_id INTEGER NOT NULL DEFAULT 0,
            comment TEXT NOT NULL DEFAULT '',
            owner TEXT NOT NULL DEFAULT '',
            default_keyword_group TEXT NOT NULL DEFAULT ''
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_collections_parent ON collections(parent_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS quotes(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            collection_id INTEGER NOT NULL DEFAULT 0,
            sort_order INTEGER,
            comment TEXT NOT NULL DEFAULT '',
            body TEXT NOT NULL DEFAULT ''
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS quote_positions(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            quote_id INTEGER NOT NULL,
            document_id INTEGER NOT NULL,
            start_char INTEGER,
            end_char INTEGER
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS clips(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            collection_id INTEGER NOT NULL DEFAULT 0,
            episode_id INTEGER NOT NULL DEFAULT 0,
            media_file TEXT NOT NULL DEFAULT '',
            clip_start INTEGER,
            clip_stop INTEGER,
            offset_ms INTEGER,
            audio INTEGER NOT NULL DEFAULT 1,
            comment TEXT NOT NULL DEFAULT '',
            sort_order INTEGER
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_clips_collection ON clips(collection_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS additional_videos(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            episode_id INTEGER NOT NULL DEFAULT 0,
            clip_id INTEGER NOT NULL DEFAULT 0,
            media_file TEXT NOT NULL DEFAULT '',
            offset_ms INTEGER,
            audio INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS snapshots(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            collection_id INTEGER NOT NULL DEFAULT 0,
            image_file TEXT NOT NULL DEFAULT '',
            image_scale REAL,
            coords_x INTEGER,
            coords_y INTEGER,
            size_w INTEGER,
            size_h INTEGER,
            library_id INTEGER NOT NULL DEFAULT 0,
            episode_id INTEGER NOT NULL DEFAULT 0,
            transcript_id INTEGER NOT NULL DEFAULT 0,
            time_code INTEGER,
            duration INTEGER,
            comment TEXT NOT NULL DEFAULT '',
            sort_order INTEGER
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS keywords(
            keyword_group TEXT NOT NULL,
            keyword TEXT NOT NULL,
            definition TEXT NOT NULL DEFAULT '',
            PRIMARY KEY(keyword_group, keyword)
        )",
        [],
    )?;
    // Coding styles arrived after the first keyword layout.
    ensure_keywords_style_columns(conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS keyword_assignments(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            document_id INTEGER NOT NULL DEFAULT 0,
            episode_id INTEGER NOT NULL DEFAULT 0,
            quote_id INTEGER NOT NULL DEFAULT 0,
            clip_id INTEGER NOT NULL DEFAULT 0,
            snapshot_id INTEGER NOT NULL DEFAULT 0,
            keyword_group TEXT NOT NULL,
            keyword TEXT NOT NULL,
            example INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_keyword_assignments_keyword
            ON keyword_assignments(keyword_group, keyword)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS notes(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            library_id INTEGER NOT NULL DEFAULT 0,
            document_id INTEGER NOT NULL DEFAULT 0,
            episode_id INTEGER NOT NULL DEFAULT 0,
            collection_id INTEGER NOT NULL DEFAULT 0,
            clip_id INTEGER NOT NULL DEFAULT 0,
            snapshot_id INTEGER NOT NULL DEFAULT 0,
            transcript_id INTEGER NOT NULL DEFAULT 0,
            quote_id INTEGER NOT NULL DEFAULT 0,
            note_taker TEXT NOT NULL DEFAULT '',
            note_text TEXT NOT NULL DEFAULT ''
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS filters(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            report_type INTEGER NOT NULL,
            report_scope INTEGER NOT NULL DEFAULT 0,
            config_name TEXT NOT NULL DEFAULT '',
            filter_data_type INTEGER NOT NULL DEFAULT 0,
            filter_data TEXT NOT NULL DEFAULT ''
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS record_locks(
            category TEXT NOT NULL,
            record_id INTEGER NOT NULL,
            owner TEXT NOT NULL,
            locked_at TEXT NOT NULL,
            PRIMARY KEY(category, record_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS import_runs(
            session_id TEXT PRIMARY KEY,
            source_path TEXT NOT NULL,
            source_sha256 TEXT,
            format_version TEXT,
            imported_count INTEGER NOT NULL,
            finished_at TEXT NOT NULL
        )",
        [],
    )?;
    ensure_import_runs_issue_count(conn)?;

    Ok(())
}

fn ensure_transcripts_clip_columns(conn: &Connection) -> anyhow::Result<()> {
    if !table_has_column(conn, "transcripts", "clip_id")? {
        conn.execute(
            "ALTER TABLE transcripts ADD COLUMN clip_id INTEGER NOT NULL DEFAULT 0",
            [],
        )?;
    }
    if !table_has_column(conn, "transcripts", "source_transcript_id")? {
        conn.execute(
            "ALTER TABLE transcripts ADD COLUMN source_transcript_id INTEGER NOT NULL DEFAULT 0",
            [],
        )?;
    }
    if !table_has_column(conn, "transcripts", "sort_order")? {
        conn.execute("ALTER TABLE transcripts ADD COLUMN sort_order INTEGER", [])?;
    }
    if !table_has_column(conn, "transcripts", "clip_start")? {
        conn.execute("ALTER TABLE transcripts ADD COLUMN clip_start INTEGER", [])?;
    }
    if !table_has_column(conn, "transcripts", "clip_stop")? {
        conn.execute("ALTER TABLE transcripts ADD COLUMN clip_stop INTEGER", [])?;
    }
    if !table_has_column(conn, "transcripts", "min_width")? {
        conn.execute("ALTER TABLE transcripts ADD COLUMN min_width INTEGER", [])?;
    }
    Ok(())
}

fn ensure_keywords_style_columns(conn: &Connection) -> anyhow::Result<()> {
    for (column, decl) in [
        ("line_color_name", "TEXT NOT NULL DEFAULT ''"),
        ("line_color_def", "TEXT NOT NULL DEFAULT ''"),
        ("draw_mode", "TEXT NOT NULL DEFAULT ''"),
        ("line_width", "INTEGER"),
        ("line_style", "TEXT NOT NULL DEFAULT ''"),
    ] {
        if !table_has_column(conn, "keywords", column)? {
            conn.execute(
                &format!("ALTER TABLE keywords ADD COLUMN {} {}", column, decl),
                [],
            )?;
        }
    }
    Ok(())
}

fn ensure_import_runs_issue_count(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "import_runs", "issue_count")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE import_runs ADD COLUMN issue_count INTEGER NOT NULL DEFAULT 0",
        [],
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
