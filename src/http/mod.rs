//! HTTP front end that turns admission decisions into responses.

mod server;
mod service;

pub use server::HttpServer;
pub use service::{caller_key, router, ANONYMOUS_CALLER, CALLER_ID_HEADER};
