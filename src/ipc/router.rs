use super::handlers;
use super::subscriptions;
use super::types::{AppState, Request};
use crate::ipc::error::err;

/// Dispatch one request. The first element is always the reply; any further
/// elements are subscription snapshot events triggered by a successful
/// mutation, to be written after the reply in order.
pub fn handle_request(state: &mut AppState, req: Request) -> Vec<serde_json::Value> {
    let reply = dispatch(state, &req);
    let mutated = reply.get("ok").and_then(|v| v.as_bool()) == Some(true);
    let mut out = vec![reply];
    if mutated {
        out.extend(subscriptions::after_method(state, &req));
    }
    out
}

fn dispatch(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Some(resp) = handlers::core::try_handle(state, req) {
        return resp;
    }
    if let Some(resp) = handlers::users::try_handle(state, req) {
        return resp;
    }
    if let Some(resp) = handlers::students::try_handle(state, req) {
        return resp;
    }
    if let Some(resp) = handlers::attendance::try_handle(state, req) {
        return resp;
    }
    if let Some(resp) = handlers::recap::try_handle(state, req) {
        return resp;
    }
    if let Some(resp) = subscriptions::try_handle(state, req) {
        return resp;
    }

    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}
