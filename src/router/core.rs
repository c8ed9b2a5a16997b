//! Route registry and matching.
//!
//! The registry keeps every route in registration order for listing and a
//! radix tree for lookup. It is add-only while the application is built and
//! read-only once serving.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use http::Method;
use smallvec::SmallVec;
use tracing::{debug, info, warn};

use super::radix::{param_name, segments, RadixRouter};
use crate::context::Context;
use crate::mvc::RenderKind;

/// Maximum number of path parameters before heap allocation.
/// Most routes have ≤4 path params (e.g., /users/{id}/posts/{postId}).
pub const MAX_INLINE_PARAMS: usize = 8;

/// Stack-allocated path parameter storage for the hot path.
///
/// Param names are `Arc<str>` shared with the route tree; values are the
/// per-request URL segments.
pub type ParamVec = SmallVec<[(Arc<str>, String); MAX_INLINE_PARAMS]>;

/// One stage of a route's handler chain.
pub type Stage = Arc<dyn Fn(&mut Context) + Send + Sync>;

/// Listing metadata for a registered route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    pub method: Method,
    pub pattern: String,
    /// Template used when the route renders HTML.
    pub view: String,
    pub render: RenderKind,
    /// Type name of the argument record, `-` for plain routes.
    pub args_type: &'static str,
    /// Name of the resolved handler method, empty when none.
    pub handler: String,
}

impl RouteEntry {
    #[must_use]
    pub fn new(method: Method, pattern: impl Into<String>) -> Self {
        Self {
            method,
            pattern: pattern.into(),
            view: String::new(),
            render: RenderKind::Html,
            args_type: "-",
            handler: String::new(),
        }
    }

    #[must_use]
    pub fn with_handler(mut self, handler: impl Into<String>) -> Self {
        self.handler = handler.into();
        self
    }

    #[must_use]
    pub fn with_view(mut self, view: impl Into<String>, render: RenderKind) -> Self {
        self.view = view.into();
        self.render = render;
        self
    }

    #[must_use]
    pub fn with_args(mut self, args_type: &'static str) -> Self {
        self.args_type = args_type;
        self
    }
}

/// A registered route: its entry plus the ordered handler chain.
pub struct Route {
    pub entry: RouteEntry,
    pub chain: Vec<Stage>,
}

impl Route {
    #[must_use]
    pub fn new(entry: RouteEntry, chain: Vec<Stage>) -> Self {
        Self { entry, chain }
    }

    /// Run the chain in order, stopping once a stage aborts.
    pub fn run(&self, ctx: &mut Context) {
        for stage in &self.chain {
            if ctx.is_aborted() {
                break;
            }
            stage(ctx);
        }
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("entry", &self.entry)
            .field("stages", &self.chain.len())
            .finish()
    }
}

/// Result of successfully matching a request to a route.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub route: Arc<Route>,
    /// Path parameters extracted from the URL (e.g., `{id}` → `("id", "123")`)
    pub params: ParamVec,
}

impl RouteMatch {
    /// Path parameter by name; the last occurrence wins.
    #[inline]
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Registration failures. These are startup errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    /// Same method and pattern (parameter names ignored) registered twice.
    Duplicate { method: Method, pattern: String },
    /// Pattern not starting with `/`, or with an empty `{}` segment.
    InvalidPattern { pattern: String },
}

impl fmt::Display for RouteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteError::Duplicate { method, pattern } => {
                write!(f, "duplicate route {method} {pattern}")
            }
            RouteError::InvalidPattern { pattern } => {
                write!(f, "invalid route pattern '{pattern}'")
            }
        }
    }
}

impl std::error::Error for RouteError {}

/// `/users/{id}` and `/users/{uid}` share the key `/users/{}`.
fn shape(pattern: &str) -> String {
    let mut key = String::with_capacity(pattern.len());
    for seg in segments(pattern) {
        key.push('/');
        key.push_str(if param_name(seg).is_some() { "{}" } else { seg });
    }
    if key.is_empty() {
        key.push('/');
    }
    key
}

fn check_pattern(pattern: &str) -> Result<(), RouteError> {
    let bad = !pattern.starts_with('/')
        || segments(pattern)
            .iter()
            .any(|s| param_name(s).is_some_and(str::is_empty));
    if bad {
        Err(RouteError::InvalidPattern {
            pattern: pattern.to_string(),
        })
    } else {
        Ok(())
    }
}

/// Ordered route registry with radix-tree matching.
#[derive(Default)]
pub struct Router {
    radix: RadixRouter,
    routes: Vec<Arc<Route>>,
    shapes: HashSet<(Method, String)>,
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.routes.len())
            .finish()
    }
}

impl Router {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a route. Duplicate method/pattern pairs are rejected.
    pub fn add(&mut self, entry: RouteEntry, chain: Vec<Stage>) -> Result<(), RouteError> {
        check_pattern(&entry.pattern)?;
        let key = (entry.method.clone(), shape(&entry.pattern));
        if !self.shapes.insert(key) {
            return Err(RouteError::Duplicate {
                method: entry.method,
                pattern: entry.pattern,
            });
        }
        debug!(
            method = %entry.method,
            pattern = %entry.pattern,
            handler = %entry.handler,
            args = %entry.args_type,
            stages = chain.len(),
            "Route registered"
        );
        let route = Arc::new(Route::new(entry, chain));
        self.radix.insert(Arc::clone(&route));
        self.routes.push(route);
        Ok(())
    }

    /// Match a request to a route.
    #[must_use]
    pub fn route(&self, method: &Method, path: &str) -> Option<RouteMatch> {
        // RT1: Route match attempt
        debug!(method = %method, path = %path, "Route match attempt");
        match self.radix.route(method, path) {
            Some((route, params)) => {
                // RT3: Route matched
                debug!(
                    method = %method,
                    path = %path,
                    route_pattern = %route.entry.pattern,
                    path_params = ?params,
                    "Route matched"
                );
                Some(RouteMatch { route, params })
            }
            None => {
                // RT4: No route found
                warn!(method = %method, path = %path, "No route matched");
                None
            }
        }
    }

    /// Methods registered for `path`; empty when the path is unknown.
    #[must_use]
    pub fn allowed_methods(&self, path: &str) -> Vec<Method> {
        self.radix.methods(path)
    }

    /// Entries in registration order.
    pub fn entries(&self) -> impl Iterator<Item = &RouteEntry> {
        self.routes.iter().map(|r| &r.entry)
    }

    /// Entries sorted by pattern; registration order breaks ties.
    #[must_use]
    pub fn sorted_entries(&self) -> Vec<&RouteEntry> {
        let mut entries: Vec<&RouteEntry> = self.entries().collect();
        entries.sort_by(|a, b| a.pattern.cmp(&b.pattern));
        entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Formatted table of all routes sorted by pattern.
    #[must_use]
    pub fn route_table(&self) -> String {
        const HEADERS: [&str; 6] = ["METHOD", "PATTERN", "HANDLER", "ARGS", "RENDER", "VIEW"];
        let rows: Vec<[String; 6]> = self
            .sorted_entries()
            .into_iter()
            .map(|e| {
                [
                    e.method.to_string(),
                    e.pattern.clone(),
                    if e.handler.is_empty() { "-".into() } else { e.handler.clone() },
                    e.args_type.to_string(),
                    e.render.to_string(),
                    if e.view.is_empty() { "-".into() } else { e.view.clone() },
                ]
            })
            .collect();

        let mut widths = HEADERS.map(str::len);
        for row in &rows {
            for (w, cell) in widths.iter_mut().zip(row) {
                *w = (*w).max(cell.len());
            }
        }

        let mut out = String::new();
        let mut push_row = |cells: &[&str]| {
            let line: Vec<String> = cells
                .iter()
                .zip(widths)
                .map(|(c, w)| format!("{c:<w$}"))
                .collect();
            out.push_str(line.join("  ").trim_end());
            out.push('\n');
        };
        push_row(&HEADERS);
        for row in &rows {
            let cells: Vec<&str> = row.iter().map(String::as_str).collect();
            push_row(&cells);
        }
        out
    }

    /// Log the route table.
    pub fn dump_routes(&self) {
        // RT5: Routing table loaded
        info!(
            routes_count = self.routes.len(),
            "Routing table loaded\n{}",
            self.route_table()
        );
    }
}
