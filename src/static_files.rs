//! Static file serving.

use std::fs::File;
use std::path::{Component, Path, PathBuf};

use http::Method;
use tracing::debug;

use crate::context::Context;
use crate::middleware::Middleware;

/// Serves files below `base_dir` for `GET`/`HEAD` requests under `prefix`.
///
/// Requests that do not map to a regular file fall through to routing.
#[derive(Debug, Clone)]
pub struct StaticMiddleware {
    prefix: String,
    base_dir: PathBuf,
}

impl StaticMiddleware {
    pub fn new<P: Into<PathBuf>>(prefix: &str, base: P) -> Self {
        Self {
            prefix: prefix.trim_end_matches('/').to_string(),
            base_dir: base.into(),
        }
    }

    /// Map a URL path to a file below the base directory. Anything that
    /// would leave the directory yields `None`.
    fn map_path(&self, url_path: &str) -> Option<PathBuf> {
        let rest = url_path.strip_prefix(&self.prefix)?;
        if !self.prefix.is_empty() && !(rest.is_empty() || rest.starts_with('/')) {
            return None;
        }
        let mut pb = self.base_dir.clone();
        for comp in Path::new(rest.trim_start_matches('/')).components() {
            match comp {
                Component::Normal(s) => pb.push(s),
                Component::CurDir => {}
                _ => return None,
            }
        }
        Some(pb)
    }
}

impl Middleware for StaticMiddleware {
    fn before(&self, ctx: &mut Context) {
        if ctx.request.method != Method::GET && ctx.request.method != Method::HEAD {
            return;
        }
        let Some(mut path) = self.map_path(&ctx.request.path) else {
            return;
        };
        if path.is_dir() {
            path.push("index.html");
        }
        let Ok(file) = File::open(&path) else {
            return;
        };
        let Ok(meta) = file.metadata() else {
            return;
        };
        if !meta.is_file() {
            return;
        }
        debug!(path = %path.display(), "Serving static file");
        let name = path.to_string_lossy().into_owned();
        ctx.file(&name, meta.modified().ok(), file);
        if ctx.request.method == Method::HEAD {
            ctx.response.body.clear();
        }
        ctx.abort();
    }
}
