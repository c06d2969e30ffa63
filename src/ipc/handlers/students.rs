use serde_json::json;

use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{optional_str, require_session, required_str, HandlerErr};
use crate::ipc::types::{AppState, Request, WorkspaceService};
use crate::store::{NewStudent, Student};

fn student_json(student: &Student) -> serde_json::Value {
    json!({
        "id": student.id,
        "roll": student.roll,
        "name": student.name,
        "class": student.class,
        "section": student.section,
        "mobile": student.mobile,
    })
}

fn list(
    service: &WorkspaceService,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let session = require_session(service, params)?;
    let students = service.list_students(&session)?;
    let rows: Vec<serde_json::Value> = students.iter().map(student_json).collect();
    Ok(json!({ "students": rows }))
}

fn create(
    service: &WorkspaceService,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let session = require_session(service, params)?;
    let student = NewStudent {
        roll: required_str(params, "roll")?,
        name: required_str(params, "name")?,
        class: optional_str(params, "class")?.unwrap_or_default(),
        section: optional_str(params, "section")?.unwrap_or_default(),
        mobile: optional_str(params, "mobile")?,
    };
    let student_id = service.create_student(&session, &student)?;
    Ok(json!({ "studentId": student_id }))
}

fn delete(
    service: &WorkspaceService,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let session = require_session(service, params)?;
    let student_id = required_str(params, "studentId")?;
    service.delete_student(&session, &student_id)?;
    Ok(json!({ "ok": true }))
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

fn handle_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(service) = state.service.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match create(service, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(service) = state.service.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match delete(service, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_list(state, req)),
        "students.create" => Some(handle_create(state, req)),
        "students.delete" => Some(handle_delete(state, req)),
        _ => None,
    }
}
