use crate::import::{self, TextCodec};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::sqlite_store::{self, SqliteStore};
use serde_json::json;
use std::path::PathBuf;
use tracing::warn;

fn codec_param(req: &Request, key: &str) -> Result<Option<TextCodec>, String> {
    match req.params.get(key).and_then(|v| v.as_str()) {
        None => Ok(None),
        Some(label) => TextCodec::from_label(label)
            .map(Some)
            .ok_or_else(|| format!("unsupported codec for {key}: {label}")),
    }
}

fn handle_import_xml(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(path) = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from)
    else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    let mut options = state.config.import_options();
    match codec_param(req, "codec") {
        Ok(c) => options.codec_override = c,
        Err(m) => return err(&req.id, "bad_params", m, None),
    }
    match codec_param(req, "legacyCodec") {
        Ok(Some(c)) => options.legacy_codec = c,
        Ok(None) => {}
        Err(m) => return err(&req.id, "bad_params", m, None),
    }
    let mut decider = state.config.decider();
    if let Some(v) = req.params.get("confirmLegacy").and_then(|v| v.as_bool()) {
        decider.confirm_legacy = v;
    }
    if let Some(v) = req.params.get("acceptIssues").and_then(|v| v.as_bool()) {
        decider.accept_issues = v;
    }

    let mut store = SqliteStore::new(conn, options.lock_owner.clone());
    match import::import_file(&path, &mut store, options, &mut decider) {
        Ok(report) => {
            if report.outcome == import::TxState::Committed {
                if let Err(e) =
                    sqlite_store::record_import_run(conn, &path.to_string_lossy(), &report)
                {
                    warn!(error = %e, "failed to record import run");
                }
            }
            ok(&req.id, json!({ "report": report }))
        }
        Err(failure) => err(
            &req.id,
            failure.error.code(),
            failure.error.to_string(),
            Some(json!({
                "path": path.to_string_lossy(),
                "report": failure.report,
            })),
        ),
    }
}

fn handle_counts(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match sqlite_store::category_counts(conn) {
        Ok(counts) => {
            let mut map = serde_json::Map::new();
            for (category, n) in counts {
                map.insert(category.as_str().to_string(), json!(n));
            }
            ok(&req.id, json!({ "counts": map }))
        }
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_imports(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match sqlite_store::list_import_runs(conn) {
        Ok(runs) => ok(&req.id, json!({ "imports": runs })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "project.importXml" => Some(handle_import_xml(state, req)),
        "project.counts" => Some(handle_counts(state, req)),
        "project.imports" => Some(handle_imports(state, req)),
        _ => None,
    }
}
