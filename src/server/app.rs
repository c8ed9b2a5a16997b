use std::any::Any;
use std::io;
use std::net::ToSocketAddrs;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info};

use super::http_server::{HttpServer, ServerHandle};
use super::{Request, Response};
use crate::config::Config;
use crate::context::{Context, Engine};
use crate::middleware::{LoggerMiddleware, Middleware, StaticMiddleware};
use crate::router::Router;
use crate::validator::Validator;
use crate::walker::{register, Dispatch, RouteTree, WalkError};

/// A complete application: routes, middleware and the shared engine.
///
/// [`App::handle`] runs the whole request pipeline without a socket, which
/// is how most tests drive it; [`App::serve`] puts it behind a listener.
pub struct App {
    router: Router,
    middlewares: Vec<Arc<dyn Middleware>>,
    engine: Arc<Engine>,
    workers: usize,
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("routes", &self.router.len())
            .field("middlewares", &self.middlewares.len())
            .field("engine", &self.engine)
            .finish()
    }
}

impl Default for App {
    fn default() -> Self {
        Self::with_engine(Engine::default())
    }
}

impl App {
    /// Application configured from `config`, with the request logger and,
    /// when `static_dir` is set, the static file middleware installed.
    pub fn new(config: &Config) -> Self {
        let mut app = Self::with_engine(Engine::from_config(config));
        app.workers = config.workers.max(1);
        app.use_middleware(LoggerMiddleware::new(config.mode));
        if let Some(dir) = &config.static_dir {
            app.use_middleware(StaticMiddleware::new("", dir.clone()));
        }
        app
    }

    /// Application with an explicit engine and no middleware.
    pub fn with_engine(engine: Engine) -> Self {
        Self {
            router: Router::new(),
            middlewares: Vec::new(),
            engine: Arc::new(engine),
            workers: 1,
        }
    }

    /// Replace the validator used by every binder. Only effective before
    /// the engine is shared with a running server.
    #[must_use]
    pub fn with_validator(mut self, validator: Arc<Validator>) -> Self {
        if let Some(engine) = Arc::get_mut(&mut self.engine) {
            engine.validator = validator;
        }
        self
    }

    /// Walk `dispatcher` and register its routes.
    pub fn register<D: Dispatch + RouteTree>(&mut self, dispatcher: D) -> Result<(), WalkError> {
        register(&mut self.router, Arc::new(dispatcher))
    }

    pub fn use_middleware(&mut self, middleware: impl Middleware + 'static) {
        self.middlewares.push(Arc::new(middleware));
    }

    #[must_use]
    pub fn router(&self) -> &Router {
        &self.router
    }

    #[must_use]
    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Run one request through middleware, routing, the handler chain and
    /// the renderer.
    pub fn handle(&self, request: Request) -> Response {
        let start = Instant::now();
        let mut ctx = Context::new(request, Arc::clone(&self.engine));

        for mw in &self.middlewares {
            mw.before(&mut ctx);
            if ctx.is_aborted() {
                break;
            }
        }
        if !ctx.is_aborted() {
            self.dispatch(&mut ctx);
        }

        let latency = start.elapsed();
        for mw in self.middlewares.iter().rev() {
            mw.after(&mut ctx, latency);
        }
        ctx.into_response()
    }

    fn dispatch(&self, ctx: &mut Context) {
        let Some(matched) = self.router.route(&ctx.request.method, &ctx.request.path) else {
            let allowed = self.router.allowed_methods(&ctx.request.path);
            if allowed.is_empty() {
                ctx.text(404, "404 page not found");
            } else {
                let allow: Vec<&str> = allowed.iter().map(http::Method::as_str).collect();
                ctx.response.set_header("Allow", allow.join(", "));
                ctx.text(405, "405 method not allowed");
            }
            return;
        };

        let route = matched.route;
        ctx.params = matched.params;
        ctx.mvc.view.clone_from(&route.entry.view);
        ctx.mvc.render = route.entry.render;

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| route.run(ctx)));
        if let Err(payload) = outcome {
            error!(
                request_id = %ctx.request_id(),
                method = %ctx.request.method,
                path = %ctx.request.path,
                route_pattern = %route.entry.pattern,
                panic = %panic_message(payload.as_ref()),
                "Handler panicked"
            );
            ctx.response.headers.clear();
            ctx.cache = None;
            ctx.text(500, "500 internal server error");
            ctx.abort();
            return;
        }
        if !ctx.is_aborted() {
            ctx.render_mvc();
        }
    }

    /// Serve on `addr` with the configured number of worker threads.
    pub fn serve<A: ToSocketAddrs>(self, addr: A) -> io::Result<ServerHandle> {
        self.router.dump_routes();
        let workers = self.workers;
        let handle = HttpServer::new(Arc::new(self)).workers(workers).start(addr)?;
        info!(addr = %handle.addr(), workers, "Server listening");
        Ok(handle)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
