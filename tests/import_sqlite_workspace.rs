use qdastored::db;
use qdastored::import::{self, AutoDecider, Category, ImportOptions, IssueKind, TextCodec, TxState};
use qdastored::sqlite_store::{self, SqliteStore};
use rusqlite::Connection;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

fn fixture_path(rel: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(rel)
}

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn open_workspace(prefix: &str) -> Connection {
    db::open_db(&temp_dir(prefix)).expect("open workspace db")
}

fn options() -> ImportOptions {
    ImportOptions {
        lock_owner: "importer".into(),
        ..ImportOptions::default()
    }
}

fn count(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
        .expect("count")
}

fn id_by_name(conn: &Connection, table: &str, name: &str) -> i64 {
    conn.query_row(
        &format!("SELECT id FROM {table} WHERE name = ?"),
        [name],
        |r| r.get(0),
    )
    .expect("row by name")
}

#[test]
fn full_export_lands_with_fresh_ids_and_resolved_links() {
    let conn = open_workspace("qdastore-import-full");
    let mut store = SqliteStore::new(&conn, "importer");
    let report = import::import_file(
        &fixture_path("interviews_v15.xml"),
        &mut store,
        options(),
        &mut AutoDecider::default(),
    )
    .expect("import");

    assert_eq!(report.outcome, TxState::Committed);
    assert_eq!(report.imported(Category::Library), 1);
    assert_eq!(report.imported(Category::Collection), 2);
    assert_eq!(report.imported(Category::Transcript), 2);
    assert_eq!(report.imported(Category::KeywordAssignment), 1);
    assert_eq!(report.skipped.get(&Category::KeywordAssignment), Some(&1));
    assert!(report.issues.is_empty(), "{:?}", report.issues);

    let themes = id_by_name(&conn, "collections", "Themes");
    let trust = id_by_name(&conn, "collections", "Trust");
    let parent: i64 = conn
        .query_row("SELECT parent_id FROM collections WHERE id = ?", [trust], |r| r.get(0))
        .expect("parent");
    assert_eq!(parent, themes);

    let clip = id_by_name(&conn, "clips", "First answer");
    let clip_collection: i64 = conn
        .query_row("SELECT collection_id FROM clips WHERE id = ?", [clip], |r| r.get(0))
        .expect("clip collection");
    assert_eq!(clip_collection, trust);

    let source = id_by_name(&conn, "transcripts", "Session one transcript");
    let (clip_id, source_id): (i64, i64) = conn
        .query_row(
            "SELECT clip_id, source_transcript_id FROM transcripts WHERE name = ?",
            ["First answer text"],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .expect("clip transcript");
    assert_eq!((clip_id, source_id), (clip, source));

    let body: String = conn
        .query_row("SELECT body FROM transcripts WHERE id = ?", [source], |r| r.get(0))
        .expect("body");
    assert!(body.contains(&format!("collection:{themes},")), "{body}");
    assert!(body.contains(&format!("clip:{clip}.")), "{body}");

    let note_clip: i64 = conn
        .query_row("SELECT clip_id FROM notes", [], |r| r.get(0))
        .expect("note");
    assert_eq!(note_clip, clip);

    let locks = count(&conn, "record_locks");
    assert_eq!(locks, 0);
}

#[test]
fn lock_held_by_another_user_rolls_back_every_row() {
    let conn = open_workspace("qdastore-import-locked");
    // The first collection in the export is assigned id 1.
    conn.execute(
        "INSERT INTO record_locks(category, record_id, owner, locked_at)
         VALUES('collection', 1, 'alice', '2026-01-01T00:00:00Z')",
        [],
    )
    .expect("foreign lock");

    let mut store = SqliteStore::new(&conn, "importer");
    let failure = import::import_file(
        &fixture_path("interviews_v15.xml"),
        &mut store,
        options(),
        &mut AutoDecider::default(),
    )
    .unwrap_err();

    assert_eq!(failure.error.code(), "import_lock_conflict");
    assert_eq!(failure.report.outcome, TxState::RolledBack);
    for category in Category::ALL {
        let table = sqlite_store::table_for(category);
        assert_eq!(count(&conn, table), 0, "{table} should be empty");
    }
    assert_eq!(count(&conn, "record_locks"), 1);
}

#[test]
fn reimporting_a_project_fails_on_the_library_name() {
    let conn = open_workspace("qdastore-import-twice");
    {
        let mut store = SqliteStore::new(&conn, "importer");
        import::import_file(
            &fixture_path("interviews_v15.xml"),
            &mut store,
            options(),
            &mut AutoDecider::default(),
        )
        .expect("first import");
    }

    // A second copy of the same project collides on the library name.
    let mut store = SqliteStore::new(&conn, "importer");
    let failure = import::import_file(
        &fixture_path("interviews_v15.xml"),
        &mut store,
        options(),
        &mut AutoDecider::default(),
    )
    .unwrap_err();
    assert_eq!(failure.error.code(), "import_persist_failed");
    assert_eq!(count(&conn, "libraries"), 1);
    assert_eq!(count(&conn, "keywords"), 1);
    assert_eq!(count(&conn, "clips"), 1);
}

#[test]
fn existing_keyword_definition_is_left_untouched() {
    let conn = open_workspace("qdastore-import-keyword");
    conn.execute(
        "INSERT INTO keywords(keyword_group, keyword, definition) VALUES('Affect', 'Trust', 'original')",
        [],
    )
    .expect("seed keyword");

    let mut store = SqliteStore::new(&conn, "importer");
    let report = import::import_file(
        &fixture_path("interviews_v15.xml"),
        &mut store,
        options(),
        &mut AutoDecider::default(),
    )
    .expect("import");

    assert_eq!(report.outcome, TxState::Committed);
    let kept: Vec<_> = report.issues_of(IssueKind::Persistence).collect();
    assert_eq!(kept.len(), 1, "{kept:?}");
    assert_eq!(kept[0].category, Some(Category::KeywordDefinition));
    assert_eq!(report.skipped.get(&Category::KeywordDefinition), Some(&1));
    let definition: String = conn
        .query_row("SELECT definition FROM keywords", [], |r| r.get(0))
        .expect("keyword");
    assert_eq!(definition, "original");
    assert_eq!(count(&conn, "keyword_assignments"), 1);
}

#[test]
fn dangling_marker_is_zeroed_with_one_issue() {
    let conn = open_workspace("qdastore-import-dangling");
    let mut store = SqliteStore::new(&conn, "importer");
    let report = import::import_file(
        &fixture_path("dangling_link_v15.xml"),
        &mut store,
        options(),
        &mut AutoDecider::default(),
    )
    .expect("import");

    let issues: Vec<_> = report.issues_of(IssueKind::Reference).collect();
    assert_eq!(issues.len(), 1, "{issues:?}");
    assert_eq!(issues[0].category, Some(Category::Document));
    assert_eq!(issues[0].old_id, Some(2));
    let doc = id_by_name(&conn, "documents", "Field notes");
    let body: String = conn
        .query_row("SELECT body FROM documents WHERE id = ?", [doc], |r| r.get(0))
        .expect("body");
    assert!(body.contains("quote:0"), "{body}");
    assert!(body.contains(&format!("document:{doc}.")), "{body}");
}

#[test]
fn legacy_export_decodes_latin1_and_splits_embedded_transcript() {
    let conn = open_workspace("qdastore-import-legacy");
    let mut store = SqliteStore::new(&conn, "importer");
    let report = import::import_file(
        &fixture_path("legacy_v10_latin1.xml"),
        &mut store,
        options(),
        &mut AutoDecider::default(),
    )
    .expect("import");

    assert_eq!(report.format_version.map(|v| v.to_string()).as_deref(), Some("1.0"));
    assert_eq!(id_by_name(&conn, "libraries", "Entrevues été"), 1);
    assert_eq!(count(&conn, "episodes"), 1);
    assert_eq!(id_by_name(&conn, "collections", "Résumés"), 1);

    let clip = id_by_name(&conn, "clips", "Extrait");
    let (clip_id, body): (i64, String) = conn
        .query_row("SELECT clip_id, body FROM transcripts", [], |r| {
            Ok((r.get(0)?, r.get(1)?))
        })
        .expect("embedded transcript");
    assert_eq!(clip_id, clip);
    assert!(body.contains("Texte intégral"), "{body}");
}

#[test]
fn legacy_codec_override_reads_short_fields_as_utf8() {
    let conn = open_workspace("qdastore-import-override");
    let mut store = SqliteStore::new(&conn, "importer");
    let opts = ImportOptions {
        codec_override: Some(TextCodec::Utf8),
        ..options()
    };
    let report = import::import_file(
        &fixture_path("legacy_v10_latin1.xml"),
        &mut store,
        opts,
        &mut AutoDecider::default(),
    )
    .expect("import");

    // Latin-1 bytes are not valid UTF-8; the replacement is reported.
    assert!(report.issues_of(IssueKind::Field).count() >= 1);
    let name: String = conn
        .query_row("SELECT name FROM libraries", [], |r| r.get(0))
        .expect("library");
    assert!(name.starts_with("Entrevues "));
    assert_ne!(name, "Entrevues été");
}

#[test]
fn committed_run_is_listed() {
    let conn = open_workspace("qdastore-import-runs");
    let path = fixture_path("dangling_link_v15.xml");
    let mut store = SqliteStore::new(&conn, "importer");
    let report = import::import_file(&path, &mut store, options(), &mut AutoDecider::default())
        .expect("import");
    sqlite_store::record_import_run(&conn, &path.to_string_lossy(), &report).expect("record");

    let runs = sqlite_store::list_import_runs(&conn).expect("runs");
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0]["sessionId"], report.session_id.as_str());
    assert_eq!(runs[0]["formatVersion"], "1.5");
    assert_eq!(runs[0]["importedCount"], 2);
    assert_eq!(runs[0]["issueCount"], 1);
}
