//! # Server Module
//!
//! Request/response types, the [`App`] pipeline and the listener.
//!
//! A request flows through:
//!
//! 1. middleware `before` (logger, static files), which may answer directly
//! 2. routing: no match gives `404`, a match under another method `405` with `Allow`
//! 3. the route's chain: binder and validation, before hooks, handler, after hooks
//! 4. the renderer, unless a stage already wrote the response or aborted
//! 5. middleware `after`, in reverse order
//!
//! A panic anywhere in the chain is caught and answered with `500`.

mod app;
mod http_server;
mod request;
mod response;

pub use app::App;
pub use http_server::{HttpServer, ServerHandle};
pub use request::{parse_cookies, Request};
pub use response::Response;
