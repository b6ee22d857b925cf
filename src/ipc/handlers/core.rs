use crate::config::Settings;
use crate::db;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::params;
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_health(state: &mut AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let files = state.store.as_ref().map(|s| {
        let settings = s.settings();
        json!({
            "students": settings.students_file.to_string_lossy(),
            "grades": settings.grades_file.to_string_lossy(),
            "groups": settings.groups_file.to_string_lossy(),
            "studentsInGroups": settings.membership_file.to_string_lossy(),
        })
    });
    Ok(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
        "configured": state.store.is_some(),
        "files": files,
    }))
}

fn handle_workspace_select(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let path = params::path(req, "path")?;
    std::fs::create_dir_all(&path).map_err(|e| {
        HandlerErr::new(
            "io_failed",
            500,
            format!("failed to create workspace {}: {e}", path.to_string_lossy()),
        )
    })?;

    let store = db::open_store(Settings::in_workspace(&path))?;
    // Validate the files up front so a broken workspace is reported on select.
    store.load()?;
    tracing::info!(workspace = %path.display(), "workspace selected");

    state.workspace = Some(path.clone());
    state.store = Some(store);
    Ok(json!({ "workspacePath": path.to_string_lossy() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "health" => handle_health(state, req),
        "workspace.select" => handle_workspace_select(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
