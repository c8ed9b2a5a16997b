use std::time::Duration;

use tracing::{debug, info};

use super::Middleware;
use crate::config::Mode;
use crate::context::Context;

/// Request log line per response.
///
/// Logged at `info` in development and at `debug` in production.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggerMiddleware {
    mode: Mode,
}

impl LoggerMiddleware {
    pub fn new(mode: Mode) -> Self {
        Self { mode }
    }
}

impl Middleware for LoggerMiddleware {
    fn after(&self, ctx: &mut Context, latency: Duration) {
        let latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        if self.mode.is_production() {
            debug!(
                request_id = %ctx.request_id(),
                method = %ctx.request.method,
                path = %ctx.request.path,
                status = ctx.response.status,
                latency_ms,
                "Request completed"
            );
        } else {
            info!(
                request_id = %ctx.request_id(),
                method = %ctx.request.method,
                path = %ctx.request.path,
                status = ctx.response.status,
                bytes = ctx.response.body.len(),
                latency_ms,
                "Request completed"
            );
        }
    }
}
