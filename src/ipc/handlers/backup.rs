use crate::backup;
use crate::error::GradebookError;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::params;
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_backup_export_bundle(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let out_path = params::path(req, "outPath")?;
    let store = params::store(state)?;

    let export = store
        .exclusive(|t| Ok(backup::export_tables_bundle(t.settings(), &out_path)))?
        .map_err(|e| HandlerErr::new("io_failed", 500, format!("{e:#}")))?;

    Ok(json!({
        "path": out_path.to_string_lossy(),
        "bundleFormat": export.bundle_format,
        "entryCount": export.entry_count
    }))
}

fn handle_backup_import_bundle(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let in_path = params::path(req, "inPath")?;
    let store = params::store(state)?;

    let import = store
        .exclusive(|t| Ok(backup::import_tables_bundle(&in_path, t.settings())))?
        .map_err(|e| GradebookError::Bundle(format!("{e:#}")))?;

    Ok(json!({
        "bundleFormatDetected": import.bundle_format_detected,
        "tablesRestored": import.tables_restored
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "backup.exportBundle" => handle_backup_export_bundle(state, req),
        "backup.importBundle" => handle_backup_import_bundle(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
