//! # Request Context
//!
//! [`Context`] is the single per-request object threaded through the handler
//! chain. It owns the parsed [`Request`], the [`Response`] under construction,
//! the [`Mvc`] envelope, the bound argument record and the route parameters.
//!
//! The shared [`Engine`] (renderer, validator, limits) is reachable from every
//! context so that stages need no other state.

use std::any::Any;
use std::sync::Arc;

use ulid::Ulid;

use crate::binder::FormData;
use crate::config::{Config, Mode};
use crate::mvc::Mvc;
use crate::render::{CacheParams, Renderer};
use crate::router::ParamVec;
use crate::server::{Request, Response};
use crate::signer::Sha256Signer;
use crate::validator::Validator;

/// Default bound on an in-memory multipart body: 10 MiB.
pub const DEFAULT_MAX_MEMORY: usize = 10 << 20;

/// Immutable state shared by every request.
#[derive(Debug)]
pub struct Engine {
    pub renderer: Renderer,
    pub validator: Arc<Validator>,
    /// Largest multipart body parsed in memory.
    pub max_memory: usize,
    pub mode: Mode,
}

impl Default for Engine {
    fn default() -> Self {
        Self {
            renderer: Renderer::default(),
            validator: Arc::new(Validator::new()),
            max_memory: DEFAULT_MAX_MEMORY,
            mode: Mode::Development,
        }
    }
}

impl Engine {
    /// Renderer, validator and limits for `config`.
    ///
    /// Templates reload on every render in development mode; a sign secret
    /// enables signed JSON responses.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let mut renderer = Renderer::new().with_indent(config.indent);
        if let Some(dir) = &config.template_dir {
            renderer = renderer.with_templates(dir.clone(), !config.mode.is_production());
        }
        if let Some(secret) = &config.sign_secret {
            renderer = renderer.with_signer(Arc::new(Sha256Signer::new(secret.as_str())));
        }
        Self {
            renderer,
            validator: Arc::new(Validator::new()),
            max_memory: config.max_memory,
            mode: config.mode,
        }
    }
}

/// Per-request state passed to every stage of the handler chain.
pub struct Context {
    pub request: Request,
    pub response: Response,
    pub mvc: Mvc,
    /// Path parameters extracted by the router.
    pub params: ParamVec,
    /// When set, the rendered body is captured here and an `Expires` header added.
    pub cache: Option<CacheParams>,
    engine: Arc<Engine>,
    form: Option<FormData>,
    args: Option<Box<dyn Any + Send>>,
    written: bool,
    aborted: bool,
    request_id: Ulid,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("request_id", &self.request_id.to_string())
            .field("method", &self.request.method)
            .field("path", &self.request.path)
            .field("mvc", &self.mvc)
            .field("written", &self.written)
            .field("aborted", &self.aborted)
            .finish_non_exhaustive()
    }
}

impl Context {
    pub fn new(request: Request, engine: Arc<Engine>) -> Self {
        Self {
            request,
            response: Response::new(200),
            mvc: Mvc::default(),
            params: ParamVec::new(),
            cache: None,
            engine,
            form: None,
            args: None,
            written: false,
            aborted: false,
            request_id: Ulid::new(),
        }
    }

    #[must_use]
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub(crate) fn shared_engine(&self) -> Arc<Engine> {
        Arc::clone(&self.engine)
    }

    #[must_use]
    pub fn renderer(&self) -> &Renderer {
        &self.engine.renderer
    }

    #[must_use]
    pub fn request_id(&self) -> Ulid {
        self.request_id
    }

    /// Path parameter by name; the last occurrence wins.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    /// The request body parsed as a form, parsed once on first use.
    ///
    /// Multipart bodies larger than the engine's `max_memory` yield an
    /// empty form.
    pub fn form(&mut self) -> &FormData {
        let max_memory = self.engine.max_memory;
        let request = &self.request;
        self.form
            .get_or_insert_with(|| FormData::from_request(request, max_memory))
    }

    /// Stop the chain; later stages and MVC rendering are skipped.
    pub fn abort(&mut self) {
        self.aborted = true;
    }

    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    /// Whether a render operation already produced the response.
    #[must_use]
    pub fn is_written(&self) -> bool {
        self.written
    }

    pub(crate) fn mark_written(&mut self) {
        self.written = true;
    }

    /// Store the bound argument record.
    pub fn set_args<A: Any + Send>(&mut self, args: A) {
        self.args = Some(Box::new(args));
    }

    /// The bound argument record, if it has type `A`.
    #[must_use]
    pub fn args<A: Any>(&self) -> Option<&A> {
        self.args.as_deref().and_then(|a| a.downcast_ref())
    }

    pub(crate) fn take_args(&mut self) -> Option<Box<dyn Any + Send>> {
        self.args.take()
    }

    pub(crate) fn restore_args(&mut self, args: Option<Box<dyn Any + Send>>) {
        if self.args.is_none() {
            self.args = args;
        }
    }

    /// Finish the request and hand back the response.
    #[must_use]
    pub fn into_response(self) -> Response {
        let mut response = self.response;
        response.finish();
        response
    }
}
