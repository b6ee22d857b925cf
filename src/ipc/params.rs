use crate::db::Store;
use crate::ipc::error::HandlerErr;
use crate::ipc::types::{AppState, Request};
use chrono::NaiveDate;

pub fn store<'a>(state: &'a AppState) -> Result<&'a Store, HandlerErr> {
    state.store.as_ref().ok_or_else(HandlerErr::no_workspace)
}

pub fn id(req: &Request, key: &str) -> Result<i64, HandlerErr> {
    match req.params.get(key) {
        None => Err(HandlerErr::bad_params(format!("missing {key}"))),
        Some(v) => v
            .as_i64()
            .ok_or_else(|| HandlerErr::bad_params(format!("{key} must be an integer"))),
    }
}

/// Trimmed, non-empty, single-line text.
pub fn text(req: &Request, key: &str) -> Result<String, HandlerErr> {
    let Some(v) = req.params.get(key).and_then(|v| v.as_str()) else {
        return Err(HandlerErr::bad_params(format!("missing {key}")));
    };
    let t = v.trim();
    if t.is_empty() {
        return Err(HandlerErr::bad_params(format!("{key} must not be empty")));
    }
    if t.contains('\n') || t.contains('\r') {
        return Err(HandlerErr::bad_params(format!(
            "{key} must not contain line breaks"
        )));
    }
    Ok(t.to_string())
}

pub fn opt_date(req: &Request, key: &str) -> Result<Option<NaiveDate>, HandlerErr> {
    match req.params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => {
            let Some(s) = v.as_str() else {
                return Err(HandlerErr::bad_params(format!(
                    "{key} must be a YYYY-MM-DD string"
                )));
            };
            NaiveDate::parse_from_str(s.trim(), crate::model::STORED_DATE_FORMAT)
                .map(Some)
                .map_err(|_| HandlerErr::bad_params(format!("{key} must be a YYYY-MM-DD string")))
        }
    }
}

/// Optional integer list; a missing key is an empty list.
pub fn id_list(req: &Request, key: &str) -> Result<Vec<i64>, HandlerErr> {
    let Some(v) = req.params.get(key) else {
        return Ok(Vec::new());
    };
    if v.is_null() {
        return Ok(Vec::new());
    }
    let Some(items) = v.as_array() else {
        return Err(HandlerErr::bad_params(format!(
            "{key} must be an array of integers"
        )));
    };
    items
        .iter()
        .map(|item| {
            item.as_i64().ok_or_else(|| {
                HandlerErr::bad_params(format!("{key} must be an array of integers"))
            })
        })
        .collect()
}

pub fn path(req: &Request, key: &str) -> Result<std::path::PathBuf, HandlerErr> {
    match req.params.get(key).and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => Ok(std::path::PathBuf::from(v.trim())),
        _ => Err(HandlerErr::bad_params(format!("missing {key}"))),
    }
}
