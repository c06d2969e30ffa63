use chrono::NaiveDate;
use serde_json::json;

use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    require_session, required_bool, required_period, required_str, HandlerErr,
};
use crate::ipc::types::{AppState, Request, WorkspaceService};
use crate::rollup::{build_rollup, daily_series, summarize, Rollup};
use crate::service::Session;
use crate::store::{AttendanceMark, AttendanceRow, Period};

const DEFAULT_WINDOW_DAYS: u32 = 31;
const MAX_WINDOW_DAYS: u32 = 31;

fn row_json(row: &AttendanceRow) -> serde_json::Value {
    json!({
        "studentId": row.student_id,
        "roll": row.roll,
        "name": row.name,
        "class": row.class,
        "section": row.section,
        "date": row.date.to_string(),
        "status": row.status.as_str(),
    })
}

fn window_days(params: &serde_json::Value) -> Result<u32, HandlerErr> {
    let days = match params.get("windowDays") {
        None => return Ok(DEFAULT_WINDOW_DAYS),
        Some(v) if v.is_null() => return Ok(DEFAULT_WINDOW_DAYS),
        Some(v) => v
            .as_u64()
            .ok_or_else(|| HandlerErr::bad_params("windowDays must be a number"))?,
    };
    if days == 0 || days > u64::from(MAX_WINDOW_DAYS) {
        return Err(HandlerErr::bad_params("windowDays must be between 1 and 31"));
    }
    Ok(days as u32)
}

/// Explicit studentIds narrow the aggregation; without them the whole
/// roster is included.
fn requested_student_ids(
    service: &WorkspaceService,
    session: &Session,
    params: &serde_json::Value,
) -> Result<Vec<String>, HandlerErr> {
    if let Some(v) = params.get("studentIds") {
        if !v.is_null() {
            let ids = v
                .as_array()
                .ok_or_else(|| HandlerErr::bad_params("studentIds must be an array"))?;
            return Ok(ids
                .iter()
                .filter_map(|x| x.as_str().map(|s| s.to_string()))
                .collect());
        }
    }
    let roster = service.list_students(session)?;
    Ok(roster.into_iter().map(|s| s.id).collect())
}

fn month_rollup(
    service: &WorkspaceService,
    session: &Session,
    period: Period,
) -> Result<Rollup, HandlerErr> {
    let rows = service.list_attendance(session, period)?;
    let marks: Vec<AttendanceMark> = rows.iter().map(AttendanceRow::mark).collect();
    Ok(build_rollup(&marks))
}

fn mark(
    service: &WorkspaceService,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let session = require_session(service, params)?;
    let student_id = required_str(params, "studentId")?;
    let date_raw = required_str(params, "date")?;
    let present = required_bool(params, "present")?;
    let date = NaiveDate::parse_from_str(&date_raw, "%Y-%m-%d")
        .map_err(|_| HandlerErr::bad_params("date must be YYYY-MM-DD"))?;
    service.mark_attendance(&session, &student_id, date, present)?;
    Ok(json!({ "ok": true }))
}

fn list(
    service: &WorkspaceService,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let session = require_session(service, params)?;
    let period = required_period(params)?;
    let rows = service.list_attendance(&session, period)?;
    let records: Vec<serde_json::Value> = rows.iter().map(row_json).collect();
    Ok(json!({ "records": records }))
}

fn summary(
    service: &WorkspaceService,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let session = require_session(service, params)?;
    let period = required_period(params)?;
    let days = window_days(params)?;
    let student_ids = requested_student_ids(service, &session, params)?;
    let rollup = month_rollup(service, &session, period)?;
    Ok(json!(summarize(&rollup, &student_ids, days)))
}

fn series(
    service: &WorkspaceService,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let session = require_session(service, params)?;
    let period = required_period(params)?;
    let days = window_days(params)?;
    let student_ids = requested_student_ids(service, &session, params)?;
    let rollup = month_rollup(service, &session, period)?;
    Ok(json!(daily_series(&rollup, &student_ids, days)))
}

fn status_totals(
    service: &WorkspaceService,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let session = require_session(service, params)?;
    let period = required_period(params)?;
    let totals = service.attendance_status_totals(&session, period)?;
    Ok(json!(totals))
}

fn handle_mark(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(service) = state.service.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match mark(service, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(service) = state.service.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match list(service, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_summary(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(service) = state.service.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match summary(service, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_series(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(service) = state.service.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match series(service, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_status_totals(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(service) = state.service.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match status_totals(service, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.mark" => Some(handle_mark(state, req)),
        "attendance.list" => Some(handle_list(state, req)),
        "attendance.summary" => Some(handle_summary(state, req)),
        "attendance.dailySeries" => Some(handle_series(state, req)),
        "attendance.statusTotals" => Some(handle_status_totals(state, req)),
        _ => None,
    }
}
