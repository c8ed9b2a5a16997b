use std::time::Duration;

use crate::context::Context;

/// Request interceptor run around routing and the handler chain.
///
/// `before` may answer the request itself by writing a response and calling
/// [`Context::abort`]; routing is then skipped. `after` always runs, in
/// reverse registration order.
pub trait Middleware: Send + Sync {
    fn before(&self, _ctx: &mut Context) {}
    fn after(&self, _ctx: &mut Context, _latency: Duration) {}
}
