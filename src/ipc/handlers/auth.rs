use serde_json::json;

use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{require_session, required_str, HandlerErr};
use crate::ipc::types::{AppState, Request, WorkspaceService};

fn register(
    service: &WorkspaceService,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let email = required_str(params, "email")?;
    let password = required_str(params, "password")?;
    let user_id = service.register_user(&email, &password)?;
    Ok(json!({ "userId": user_id }))
}

fn login(
    service: &WorkspaceService,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let email = required_str(params, "email")?;
    let password = required_str(params, "password")?;
    let token = service.authenticate(&email, &password)?;
    Ok(json!({ "token": token }))
}

fn me(
    service: &WorkspaceService,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let session = require_session(service, params)?;
    let profile = service.current_user(&session)?;
    Ok(json!({
        "id": profile.id,
        "email": profile.email,
        "role": profile.role.as_str(),
    }))
}

fn reverify(
    service: &WorkspaceService,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let session = require_session(service, params)?;
    let password = required_str(params, "password")?;
    service.reverify(&session, &password)?;
    Ok(json!({ "ok": true }))
}

fn handle_register(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(service) = state.service.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match register(service, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_login(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(service) = state.service.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match login(service, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_me(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(service) = state.service.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match me(service, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_reverify(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(service) = state.service.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match reverify(service, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "auth.register" => Some(handle_register(state, req)),
        "auth.login" => Some(handle_login(state, req)),
        "auth.me" => Some(handle_me(state, req)),
        "auth.reverify" => Some(handle_reverify(state, req)),
        _ => None,
    }
}
