//! # Dispatcher Walker
//!
//! Turns a tree of dispatcher records into registered routes.
//!
//! A dispatcher is a struct deriving [`Dispatcher`](crate::Dispatcher) whose
//! fields carry `#[route(...)]` attributes. The walker visits those fields in
//! declaration order and classifies each by its type:
//!
//! | Field type | Effect |
//! |------------|--------|
//! | argument record (`#[derive(Args)]`) | terminal route: binder, before hooks, handler, after hooks |
//! | nested dispatcher (`#[derive(Dispatcher)]`) | group at `filter_url(url)`; its fields resolve methods on the child |
//! | plain group (`#[derive(RouteGroup)]`) | group at `filter_url(url)`; its fields resolve methods on the same owner and are not filtered again |
//! | `()` | terminal route running only the handler |
//! | `Box<T>` | rejected with [`WalkError::PointerArgs`] |
//!
//! Hook and handler names are resolved through the owner's [`MethodTable`]
//! exactly once, here. A missing or incompatible hook is logged and skipped;
//! an argument route without a usable handler still binds and renders; a
//! plain route without one is a startup error.
//!
//! ```rust,ignore
//! #[derive(Dispatcher)]
//! struct Api {
//!     #[route(url = "/users")]
//!     users: Users,
//!     #[route(url = "/post/json", before = "check")]
//!     post_json: PostJson,
//! }
//!
//! impl Dispatch for Api {
//!     fn filter_url(&self, url: &str) -> String {
//!         format!("/v1{url}")
//!     }
//! }
//! ```

mod methods;
mod owner;

use std::any::{type_name, TypeId};
use std::fmt;
use std::sync::Arc;

use http::Method;
use tracing::{debug, warn};

pub use methods::{DispatchMethod, MethodTable};
pub use owner::Owner;

use crate::binder::{bind_request, Args};
use crate::context::Context;
use crate::mvc::RenderKind;
use crate::router::{RouteEntry, RouteError, Router, Stage};

/// A dispatcher: a record whose methods can serve routes.
pub trait Dispatch: MethodTable + Send + Sync + 'static {
    /// Rewrite each URL declared on this dispatcher's fields.
    fn filter_url(&self, url: &str) -> String {
        url.to_string()
    }
}

/// The `#[route(...)]` attribute of one field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FieldDecl {
    pub name: &'static str,
    pub url: &'static str,
    pub method: Option<&'static str>,
    pub handler: Option<&'static str>,
    pub before: &'static str,
    pub after: &'static str,
    pub view: Option<&'static str>,
}

impl FieldDecl {
    /// Declared handler, or `<field>_handler`.
    #[must_use]
    pub fn handler_name(&self) -> String {
        self.handler
            .map_or_else(|| format!("{}_handler", self.name), str::to_string)
    }

    /// Declared view, or `<field>.html`.
    #[must_use]
    pub fn view_name(&self) -> String {
        self.view
            .map_or_else(|| format!("{}.html", self.name), str::to_string)
    }
}

/// Records whose routed fields can be walked. Derived.
pub trait RouteTree: Sized + Send + Sync + 'static {
    /// Attach every routed field; `owner` resolves hooks and handlers,
    /// `node` reaches the fields themselves.
    fn walk_fields<O: Dispatch>(
        owner: &Owner<O>,
        node: &Owner<Self>,
        group: &mut Group<'_>,
    ) -> Result<(), WalkError>;
}

/// How a field of a given type joins the route tree under owner `O`.
pub trait RouteField<O: Dispatch>: Sized + 'static {
    fn attach(
        owner: &Owner<O>,
        node: Owner<Self>,
        decl: &FieldDecl,
        group: &mut Group<'_>,
    ) -> Result<(), WalkError>;
}

/// Startup failures while walking a dispatcher tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalkError {
    Route(RouteError),
    /// Argument records must be fields by value.
    PointerArgs { field: &'static str, type_name: &'static str },
    /// A plain route whose handler is missing or takes arguments.
    MissingHandler { pattern: String, handler: String },
    BadMethod { field: &'static str, method: String },
}

impl fmt::Display for WalkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WalkError::Route(e) => write!(f, "{e}"),
            WalkError::PointerArgs { field, type_name } => {
                write!(f, "field '{field}': pointer argument type {type_name} is not accepted")
            }
            WalkError::MissingHandler { pattern, handler } => {
                write!(f, "route {pattern}: handler '{handler}' not found")
            }
            WalkError::BadMethod { field, method } => {
                write!(f, "field '{field}': unsupported method '{method}'")
            }
        }
    }
}

impl std::error::Error for WalkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WalkError::Route(e) => Some(e),
            _ => None,
        }
    }
}

impl From<RouteError> for WalkError {
    fn from(e: RouteError) -> Self {
        WalkError::Route(e)
    }
}

/// A router view with a URL prefix.
pub struct Group<'r> {
    router: &'r mut Router,
    prefix: String,
    // Inside a plain group the owner's filter already applied to the prefix.
    plain: bool,
}

impl<'r> Group<'r> {
    pub fn new(router: &'r mut Router) -> Self {
        Self {
            router,
            prefix: String::new(),
            plain: false,
        }
    }

    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Prefix joined with `path`, without a trailing slash.
    #[must_use]
    pub fn join(&self, path: &str) -> String {
        let mut full = self.prefix.trim_end_matches('/').to_string();
        let path = path.trim_matches('/');
        if !path.is_empty() {
            full.push('/');
            full.push_str(path);
        }
        if full.is_empty() {
            full.push('/');
        }
        full
    }

    /// Nested group at `path` below this one.
    pub fn group(&mut self, path: &str) -> Group<'_> {
        let prefix = self.join(path);
        let plain = self.plain;
        self.nested_at(prefix, plain)
    }

    fn nested_at(&mut self, prefix: String, plain: bool) -> Group<'_> {
        Group {
            router: &mut *self.router,
            prefix,
            plain,
        }
    }

    /// Full pattern for a field URL declared on `owner`.
    fn pattern<O: Dispatch>(&self, owner: &Owner<O>, url: &str) -> String {
        if self.plain {
            self.join(url)
        } else {
            self.join(&owner.get().filter_url(url))
        }
    }

    pub fn add(&mut self, entry: RouteEntry, chain: Vec<Stage>) -> Result<(), RouteError> {
        self.router.add(entry, chain)
    }
}

/// Register every route of `dispatcher`.
pub fn register<D: Dispatch + RouteTree>(router: &mut Router, dispatcher: Arc<D>) -> Result<(), WalkError> {
    let root = Owner::root(dispatcher);
    let before = router.len();
    D::walk_fields(&root, &root, &mut Group::new(router))?;
    debug!(
        dispatcher = %type_name::<D>(),
        routes = router.len() - before,
        "Dispatcher registered"
    );
    Ok(())
}

const METHODS: [Method; 7] = [
    Method::HEAD,
    Method::OPTIONS,
    Method::PATCH,
    Method::DELETE,
    Method::PUT,
    Method::GET,
    Method::POST,
];

fn route_method(decl: &FieldDecl, default: Method) -> Result<Method, WalkError> {
    let Some(raw) = decl.method else {
        return Ok(default);
    };
    let upper = raw.trim().to_ascii_uppercase();
    METHODS
        .iter()
        .find(|m| m.as_str() == upper)
        .cloned()
        .ok_or_else(|| WalkError::BadMethod {
            field: decl.name,
            method: raw.to_string(),
        })
}

fn hook_stage<O: Dispatch>(owner: &Owner<O>, hook: fn(&O, &mut Context)) -> Stage {
    let owner = owner.clone();
    Arc::new(move |ctx: &mut Context| hook(owner.get(), ctx))
}

/// Resolve a comma-separated hook list; unusable names are skipped.
fn hooks<O: Dispatch>(owner: &Owner<O>, names: &str, pattern: &str, position: &'static str) -> Vec<Stage> {
    let mut stages = Vec::new();
    for name in names.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        match O::lookup(name) {
            Some(DispatchMethod::Hook(hook)) => stages.push(hook_stage(owner, hook)),
            Some(DispatchMethod::Handler { args_name, .. }) => warn!(
                pattern = %pattern,
                hook = %name,
                position,
                args = %args_name,
                "Hook takes arguments, skipped"
            ),
            None => warn!(
                pattern = %pattern,
                hook = %name,
                position,
                dispatcher = %type_name::<O>(),
                "Hook not found, skipped"
            ),
        }
    }
    stages
}

fn handler_stage<O: Dispatch>(owner: &Owner<O>, method: DispatchMethod<O>) -> Stage {
    match method {
        DispatchMethod::Hook(hook) => hook_stage(owner, hook),
        DispatchMethod::Handler { call, .. } => {
            let owner = owner.clone();
            Arc::new(move |ctx: &mut Context| {
                let Some(mut args) = ctx.take_args() else {
                    warn!(request_id = %ctx.request_id(), "No bound arguments for handler");
                    return;
                };
                call(owner.get(), &mut *args, ctx);
                ctx.restore_args(Some(args));
            })
        }
    }
}

/// Register the terminal route for argument record `A`.
pub fn attach_args<O: Dispatch, A: Args>(owner: &Owner<O>, decl: &FieldDecl, group: &mut Group<'_>) -> Result<(), WalkError> {
    if decl.url.is_empty() {
        debug!(field = %decl.name, "Argument field without url, skipped");
        return Ok(());
    }
    let default_method = if A::HAS_FIELDS { Method::POST } else { Method::GET };
    let method = route_method(decl, default_method)?;
    let pattern = group.pattern(owner, decl.url);
    let handler_name = decl.handler_name();

    let bind: Stage = Arc::new(bind_request::<A>);
    let mut chain = vec![bind];
    chain.extend(hooks(owner, decl.before, &pattern, "before"));

    let resolved = match O::lookup(&handler_name) {
        Some(m) if m.accepts(TypeId::of::<A>()) => {
            chain.push(handler_stage(owner, m));
            handler_name
        }
        Some(m) => {
            warn!(
                pattern = %pattern,
                handler = %handler_name,
                expected = %type_name::<A>(),
                found = ?m,
                "Handler argument type mismatch, skipped"
            );
            String::new()
        }
        None => {
            warn!(
                pattern = %pattern,
                handler = %handler_name,
                dispatcher = %type_name::<O>(),
                "Handler not found, route only binds and renders"
            );
            String::new()
        }
    };
    chain.extend(hooks(owner, decl.after, &pattern, "after"));

    let entry = RouteEntry::new(method, pattern)
        .with_handler(resolved)
        .with_args(type_name::<A>())
        .with_view(decl.view_name(), A::default_render());
    group.add(entry, chain)?;
    Ok(())
}

/// Recurse into a nested dispatcher, which becomes the owner of its fields.
pub fn attach_dispatcher<O: Dispatch, D: Dispatch + RouteTree>(
    owner: &Owner<O>,
    node: Owner<D>,
    decl: &FieldDecl,
    group: &mut Group<'_>,
) -> Result<(), WalkError> {
    let prefix = group.pattern(owner, decl.url);
    debug!(field = %decl.name, prefix = %prefix, dispatcher = %type_name::<D>(), "Entering dispatcher group");
    D::walk_fields(&node, &node, &mut group.nested_at(prefix, false))
}

/// Recurse into a plain group; its fields keep resolving methods on `owner`.
pub fn attach_group<O: Dispatch, G: RouteTree>(
    owner: &Owner<O>,
    node: Owner<G>,
    decl: &FieldDecl,
    group: &mut Group<'_>,
) -> Result<(), WalkError> {
    let prefix = group.pattern(owner, decl.url);
    debug!(field = %decl.name, prefix = %prefix, "Entering route group");
    G::walk_fields(owner, &node, &mut group.nested_at(prefix, true))
}

/// Plain route: no binder, the handler is required.
impl<O: Dispatch> RouteField<O> for () {
    fn attach(owner: &Owner<O>, _node: Owner<Self>, decl: &FieldDecl, group: &mut Group<'_>) -> Result<(), WalkError> {
        if decl.url.is_empty() {
            debug!(field = %decl.name, "Plain field without url, skipped");
            return Ok(());
        }
        let method = route_method(decl, Method::GET)?;
        let pattern = group.pattern(owner, decl.url);
        let handler_name = decl.handler_name();
        let Some(DispatchMethod::Hook(handler)) = O::lookup(&handler_name) else {
            return Err(WalkError::MissingHandler {
                pattern,
                handler: handler_name,
            });
        };

        let mut chain = hooks(owner, decl.before, &pattern, "before");
        chain.push(hook_stage(owner, handler));
        chain.extend(hooks(owner, decl.after, &pattern, "after"));

        let entry = RouteEntry::new(method, pattern)
            .with_handler(handler_name)
            .with_view(decl.view_name(), RenderKind::Html);
        group.add(entry, chain)?;
        Ok(())
    }
}

impl<O: Dispatch, T: 'static> RouteField<O> for Box<T> {
    fn attach(_owner: &Owner<O>, _node: Owner<Self>, decl: &FieldDecl, _group: &mut Group<'_>) -> Result<(), WalkError> {
        Err(WalkError::PointerArgs {
            field: decl.name,
            type_name: type_name::<T>(),
        })
    }
}
