mod error;
mod handlers;
mod router;
mod subscriptions;
mod types;

pub use router::handle_request;
pub use types::{AppState, Request};
