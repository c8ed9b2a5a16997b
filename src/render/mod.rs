//! # Response Renderer
//!
//! Serializes handler results with the right `Content-Type` and status.
//!
//! Every operation is a method on [`Context`] and writes the response
//! directly; once written, the MVC envelope is no longer rendered.
//!
//! | Operation | Content-Type | Body |
//! |-----------|--------------|------|
//! | [`Context::json`] | `application/json; charset=UTF-8` | JSON, indented when configured |
//! | [`Context::xml`] | `text/xml; charset=UTF-8` | XML, indented when configured |
//! | [`Context::text`] | `text/plain; charset=UTF-8` | literal text |
//! | [`Context::html`] | `text/html; charset=UTF-8` unless set | named template |
//! | [`Context::temp`] | `text/html; charset=UTF-8` unless set | inline template |
//! | [`Context::data`] | `application/octet-stream` unless set | literal bytes |
//! | [`Context::file`] | from the file name | range-capable file body |
//! | [`Context::redirect`] | none | `302` unless given |
//! | [`Context::status`] | none | status only |
//!
//! When no operation was called, [`Context::render_mvc`] renders the MVC
//! envelope according to its [`RenderKind`].
//!
//! ## Failure Handling
//!
//! Serialization and template errors never propagate: they are logged with
//! `error!` and turned into a `500` plain-text response carrying the error.
//!
//! ## Signing and Caching
//!
//! With a [`Signer`] configured, JSON responses carry `NF-Nonce`,
//! `NF-Timestamp` and `NF-Signature`. With [`CacheParams`] set on the
//! context, the final body is captured and an `Expires` header added.

mod file;
mod pool;

use std::collections::BTreeMap;
use std::fmt;
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use minijinja::value::ValueKind;
use minijinja::{path_loader, Environment};
use serde::Serialize;
use tracing::{debug, error};

pub use file::{not_modified, parse_range, ByteRange};
pub use pool::{BufferPool, PooledBuffer};

use crate::context::Context;
use crate::mvc::{Model, Payload, RenderKind};
use crate::signer::{SignContext, Signer};

/// Caller-level cache sink: receives the emitted body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheParams {
    pub key: String,
    /// Lifetime advertised through `Expires`.
    pub expires: Duration,
    /// Filled with the response body once rendered.
    pub body: Option<Vec<u8>>,
}

impl CacheParams {
    pub fn new(key: impl Into<String>, expires: Duration) -> Self {
        Self {
            key: key.into(),
            expires,
            body: None,
        }
    }
}

struct Templates {
    dir: PathBuf,
    reload: bool,
    env: Environment<'static>,
}

/// Shared rendering configuration.
pub struct Renderer {
    indent: bool,
    templates: Option<Templates>,
    signer: Option<Arc<dyn Signer>>,
    pool: BufferPool,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Renderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Renderer")
            .field("indent", &self.indent)
            .field("template_dir", &self.templates.as_ref().map(|t| &t.dir))
            .field("reload", &self.templates.as_ref().map(|t| t.reload))
            .field("signed", &self.signer.is_some())
            .finish()
    }
}

impl Renderer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            indent: false,
            templates: None,
            signer: None,
            pool: BufferPool::default(),
        }
    }

    /// Indent JSON and XML output.
    #[must_use]
    pub fn with_indent(mut self, indent: bool) -> Self {
        self.indent = indent;
        self
    }

    /// Load HTML templates from `dir`. With `reload`, every render reads
    /// the templates from disk again (development mode).
    #[must_use]
    pub fn with_templates(mut self, dir: impl Into<PathBuf>, reload: bool) -> Self {
        let dir = dir.into();
        let mut env = Environment::new();
        env.set_loader(path_loader(&dir));
        self.templates = Some(Templates { dir, reload, env });
        self
    }

    #[must_use]
    pub fn with_signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    #[must_use]
    pub fn indent(&self) -> bool {
        self.indent
    }

    #[must_use]
    pub fn signer(&self) -> Option<&dyn Signer> {
        self.signer.as_deref()
    }

    #[must_use]
    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    /// Execute the named template.
    pub fn render_template(&self, name: &str, data: minijinja::Value) -> Result<String, minijinja::Error> {
        let Some(templates) = &self.templates else {
            return Err(minijinja::Error::new(
                minijinja::ErrorKind::TemplateNotFound,
                format!("no template directory configured for {name}"),
            ));
        };
        if templates.reload {
            let mut env = Environment::new();
            env.set_loader(path_loader(&templates.dir));
            let tpl = env.get_template(name)?;
            tpl.render(data)
        } else {
            templates.env.get_template(name)?.render(data)
        }
    }

    /// Compile and execute an inline template source.
    pub fn render_inline(&self, source: &str, data: minijinja::Value) -> Result<String, minijinja::Error> {
        Environment::new().render_str(source, data)
    }
}

const HTML: &str = "text/html; charset=UTF-8";

fn content_type(kind: RenderKind) -> &'static str {
    kind.content_type().unwrap_or("application/octet-stream")
}

impl Context {
    /// Render `value` as JSON.
    pub fn json<T: Serialize + ?Sized>(&mut self, status: u16, value: &T) {
        let engine = self.shared_engine();
        let mut buf = engine.renderer.pool().acquire();
        let written = if engine.renderer.indent() {
            serde_json::to_writer_pretty(&mut *buf, value)
        } else {
            serde_json::to_writer(&mut *buf, value)
        };
        match written {
            Ok(()) => self.write_json(status, buf.to_vec()),
            Err(e) => self.fail("json", e),
        }
    }

    fn json_payload(&mut self, status: u16, payload: &dyn Payload) {
        let engine = self.shared_engine();
        let mut buf = engine.renderer.pool().acquire();
        match payload.write_json(&mut buf, engine.renderer.indent()) {
            Ok(()) => self.write_json(status, buf.to_vec()),
            Err(e) => self.fail("json", e),
        }
    }

    /// Signs (when configured) and writes a JSON body.
    fn write_json(&mut self, status: u16, body: Vec<u8>) {
        let engine = self.shared_engine();
        if let Some(signer) = engine.renderer.signer() {
            let sig = signer.sign(&SignContext {
                host: self.request.host(),
                method: self.request.method.as_str(),
                path: &self.request.path,
                body: &body,
            });
            for (name, value) in sig.headers() {
                self.response.set_header(name, value);
            }
        }
        self.write_body(status, Some(content_type(RenderKind::Json)), body);
    }

    /// Render `value` as XML.
    pub fn xml<T: Serialize + Send + Sync + 'static>(&mut self, status: u16, value: &T) {
        let indent = self.renderer().indent();
        match value.to_xml(indent) {
            Ok(s) => self.write_body(status, Some(content_type(RenderKind::Xml)), s.into_bytes()),
            Err(e) => self.fail("xml", e),
        }
    }

    pub fn text(&mut self, status: u16, body: impl Into<String>) {
        self.write_body(status, Some(content_type(RenderKind::Text)), body.into().into_bytes());
    }

    /// Render the named template against `data`.
    pub fn html(&mut self, status: u16, name: &str, data: minijinja::Value) {
        match self.renderer().render_template(name, data) {
            Ok(s) => self.write_html(status, s),
            Err(e) => self.fail("html", e),
        }
    }

    /// Render an inline template source against `data`.
    pub fn temp(&mut self, status: u16, source: &str, data: minijinja::Value) {
        match self.renderer().render_inline(source, data) {
            Ok(s) => self.write_html(status, s),
            Err(e) => self.fail("template", e),
        }
    }

    fn write_html(&mut self, status: u16, body: String) {
        let ct = self.response.header("Content-Type").is_none().then_some(HTML);
        self.write_body(status, ct, body.into_bytes());
    }

    /// Raw bytes; `application/octet-stream` unless a type is already set.
    pub fn data(&mut self, status: u16, body: Vec<u8>) {
        let ct = self
            .response
            .header("Content-Type")
            .is_none()
            .then_some(content_type(RenderKind::Data));
        self.write_body(status, ct, body);
    }

    /// Serve a file body with `Last-Modified`, `If-Modified-Since` and
    /// single-range support. The type is derived from `name`.
    pub fn file<R: Read + Seek>(&mut self, name: &str, modified: Option<SystemTime>, mut reader: R) {
        let ct = mime_guess::from_path(name).first_or_octet_stream().to_string();
        if let Some(modified) = modified {
            self.response
                .set_header("Last-Modified", httpdate::fmt_http_date(modified));
            if not_modified(modified, self.request.header("If-Modified-Since")) {
                self.write_body(304, None, Vec::new());
                return;
            }
        }
        let size = match reader.seek(SeekFrom::End(0)) {
            Ok(size) => size,
            Err(e) => return self.fail("file", e),
        };
        self.response.set_header("Accept-Ranges", "bytes");
        let range = self
            .request
            .header("Range")
            .map_or(ByteRange::Full, |h| parse_range(h, size));
        let (status, start, len) = match range {
            ByteRange::Full => (200, 0, size),
            ByteRange::Partial { start, end } => {
                self.response
                    .set_header("Content-Range", format!("bytes {start}-{end}/{size}"));
                (206, start, end - start + 1)
            }
            ByteRange::Unsatisfiable => {
                self.response
                    .set_header("Content-Range", format!("bytes */{size}"));
                self.write_body(416, None, Vec::new());
                return;
            }
        };
        let mut body = Vec::with_capacity(usize::try_from(len).unwrap_or_default());
        let read = reader
            .seek(SeekFrom::Start(start))
            .and_then(|_| reader.take(len).read_to_end(&mut body));
        match read {
            Ok(_) => self.write_body(status, Some(&ct), body),
            Err(e) => self.fail("file", e),
        }
    }

    /// Redirect to `location` (`302` unless `code` is given).
    pub fn redirect(&mut self, location: &str, code: Option<u16>) {
        self.response.set_header("Location", location);
        self.write_body(code.unwrap_or(302), None, Vec::new());
    }

    /// Status-only response.
    pub fn status(&mut self, code: u16) {
        self.write_body(code, None, Vec::new());
    }

    /// Status-only error response.
    pub fn error(&mut self, code: u16) {
        self.status(code);
    }

    /// Render the MVC envelope unless an operation already wrote the response.
    pub fn render_mvc(&mut self) {
        if self.is_written() {
            return;
        }
        let status = self.mvc.status;
        let model = std::mem::take(&mut self.mvc.model);
        debug!(
            request_id = %self.request_id(),
            render = %self.mvc.render,
            view = %self.mvc.view,
            status,
            "Rendering MVC envelope"
        );
        match self.mvc.render {
            RenderKind::Json => match &model {
                Model::Record(p) => self.json_payload(status, p.as_ref()),
                Model::Text(s) => self.json(status, s),
                Model::Bytes(b) => self.write_json(status, b.clone()),
                Model::Empty => self.json(status, &()),
            },
            RenderKind::Xml => match &model {
                Model::Record(p) => match p.to_xml(self.renderer().indent()) {
                    Ok(s) => self.write_body(status, Some(content_type(RenderKind::Xml)), s.into_bytes()),
                    Err(e) => self.fail("xml", e),
                },
                other => {
                    let body = raw_bytes(other);
                    self.write_body(status, Some(content_type(RenderKind::Xml)), body);
                }
            },
            RenderKind::Text => match &model {
                Model::Record(p) => {
                    let mut body = Vec::new();
                    match p.write_json(&mut body, self.renderer().indent()) {
                        Ok(()) => self.write_body(status, Some(content_type(RenderKind::Text)), body),
                        Err(e) => self.fail("text", e),
                    }
                }
                other => {
                    let body = raw_bytes(other);
                    self.write_body(status, Some(content_type(RenderKind::Text)), body);
                }
            },
            RenderKind::Data => match &model {
                Model::Record(p) => {
                    let mut body = Vec::new();
                    match p.write_json(&mut body, false) {
                        Ok(()) => self.data(status, body),
                        Err(e) => self.fail("data", e),
                    }
                }
                other => self.data(status, raw_bytes(other)),
            },
            RenderKind::Html => self.render_view(status, &model),
            RenderKind::File => match &model {
                Model::Text(path) => self.open_file(path),
                _ => self.status(404),
            },
            RenderKind::Redirect => match &model {
                Model::Text(location) => {
                    let code = (300..400).contains(&status).then_some(status);
                    self.redirect(location, code);
                }
                _ => self.fail("redirect", "redirect without a location"),
            },
            RenderKind::Status => self.status(status),
        }
        self.mvc.model = model;
    }

    fn render_view(&mut self, status: u16, model: &Model) {
        if self.mvc.view.is_empty() {
            return self.fail("html", "no view selected");
        }
        let base = match model {
            Model::Record(p) => p.to_template(),
            Model::Text(s) => minijinja::Value::from(s.as_str()),
            Model::Bytes(b) => minijinja::Value::from(String::from_utf8_lossy(b).into_owned()),
            Model::Empty => minijinja::Value::UNDEFINED,
        };
        let errors = self
            .mvc
            .errors
            .as_ref()
            .map(|e| e.to_model().errors)
            .unwrap_or_default();
        let data = template_data(base, errors);
        let view = self.mvc.view.clone();
        self.html(status, &view, data);
    }

    fn open_file(&mut self, path: &str) {
        let opened = std::fs::File::open(path).and_then(|f| {
            let modified = f.metadata()?.modified().ok();
            Ok((f, modified))
        });
        match opened {
            Ok((f, modified)) => self.file(path, modified, f),
            Err(e) => {
                debug!(path = %path, error = %e, "File not readable");
                self.status(404);
            }
        }
    }

    fn write_body(&mut self, status: u16, content_type: Option<&str>, body: Vec<u8>) {
        self.response.status = status;
        if let Some(ct) = content_type {
            self.response.set_header("Content-Type", ct);
        }
        if let Some(cache) = self.cache.as_mut() {
            let expires = SystemTime::now() + cache.expires;
            cache.body = Some(body.clone());
            self.response
                .set_header("Expires", httpdate::fmt_http_date(expires));
        }
        self.response.body = body;
        self.mark_written();
    }

    /// Replace the response with a 500 carrying `err`.
    fn fail(&mut self, op: &str, err: impl fmt::Display) {
        let message = err.to_string();
        error!(
            request_id = %self.request_id(),
            method = %self.request.method,
            path = %self.request.path,
            op,
            error = %message,
            "Render failed"
        );
        self.response.headers.clear();
        self.cache = None;
        self.write_body(500, Some(content_type(RenderKind::Text)), message.into_bytes());
    }
}

/// Template context: the model's own fields at the top level, plus `model`
/// and `errors`.
fn template_data(base: minijinja::Value, errors: Vec<crate::validator::FieldError>) -> minijinja::Value {
    let mut data = BTreeMap::new();
    if base.kind() == ValueKind::Map {
        if let Ok(keys) = base.try_iter() {
            for key in keys {
                if let (Some(name), Ok(value)) = (key.as_str(), base.get_item(&key)) {
                    data.insert(name.to_string(), value);
                }
            }
        }
    }
    data.insert("model".to_string(), base);
    data.insert("errors".to_string(), minijinja::Value::from_serialize(&errors));
    minijinja::Value::from_serialize(&data)
}

fn raw_bytes(model: &Model) -> Vec<u8> {
    match model {
        Model::Text(s) => s.clone().into_bytes(),
        Model::Bytes(b) => b.clone(),
        Model::Empty | Model::Record(_) => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Engine;
    use crate::server::Request;
    use crate::signer::Sha256Signer;
    use http::Method;
    use minijinja::context;
    use std::io::Cursor;

    #[derive(Serialize)]
    struct Item {
        a: String,
        b: i32,
    }

    fn ctx_with(renderer: Renderer, request: Request) -> Context {
        let engine = Engine {
            renderer,
            ..Engine::default()
        };
        Context::new(request, Arc::new(engine))
    }

    fn ctx() -> Context {
        ctx_with(Renderer::new(), Request::new(Method::GET, "/"))
    }

    #[test]
    fn test_json_and_content_type() {
        let mut c = ctx();
        c.json(201, &Item { a: "x".into(), b: 1 });
        assert!(c.is_written());
        let res = c.into_response();
        assert_eq!(res.status, 201);
        assert_eq!(res.header("Content-Type"), Some("application/json; charset=UTF-8"));
        assert_eq!(res.body_text(), r#"{"a":"x","b":1}"#);
        assert_eq!(res.header("Content-Length"), Some("15"));
    }

    #[test]
    fn test_json_buffer_returns_to_pool() {
        let mut c = ctx();
        c.json(200, &[1, 2, 3]);
        assert_eq!(c.renderer().pool().idle(), 1);
    }

    #[test]
    fn test_indented_xml() {
        let mut c = ctx_with(Renderer::new().with_indent(true), Request::new(Method::GET, "/"));
        c.xml(200, &Item { a: "x".into(), b: 1 });
        let res = c.into_response();
        assert_eq!(res.header("Content-Type"), Some("text/xml; charset=UTF-8"));
        assert_eq!(res.body_text(), "<Item>\n  <a>x</a>\n  <b>1</b>\n</Item>");
    }

    #[test]
    fn test_data_keeps_existing_content_type() {
        let mut c = ctx();
        c.response.set_header("Content-Type", "image/png");
        c.data(200, vec![1, 2]);
        assert_eq!(c.response.header("Content-Type"), Some("image/png"));
        let mut c = ctx();
        c.data(200, vec![1, 2]);
        assert_eq!(c.response.header("Content-Type"), Some("application/octet-stream"));
    }

    #[test]
    fn test_inline_template_and_failure() {
        let mut c = ctx();
        c.temp(200, "Hello {{ name }}!", context! { name => "nf" });
        assert_eq!(c.response.body_text(), "Hello nf!");
        assert_eq!(c.response.header("Content-Type"), Some("text/html; charset=UTF-8"));

        let mut c = ctx();
        c.temp(200, "{% if %}", context! {});
        assert_eq!(c.response.status, 500);
        assert_eq!(c.response.header("Content-Type"), Some("text/plain; charset=UTF-8"));
    }

    #[test]
    fn test_named_template_reload() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("hello.html"), "Hi {{ a }} {{ errors|length }}").unwrap();
        let mut c = ctx_with(
            Renderer::new().with_templates(dir.path(), true),
            Request::new(Method::GET, "/"),
        );
        c.mvc.view = "hello.html".into();
        c.mvc.model = Model::record(Item { a: "there".into(), b: 0 });
        c.render_mvc();
        assert_eq!(c.response.body_text(), "Hi there 0");

        std::fs::write(dir.path().join("hello.html"), "Bye {{ model.a }}").unwrap();
        let mut c2 = ctx_with(
            Renderer::new().with_templates(dir.path(), true),
            Request::new(Method::GET, "/"),
        );
        c2.mvc.view = "hello.html".into();
        c2.mvc.model = Model::record(Item { a: "now".into(), b: 0 });
        c2.render_mvc();
        assert_eq!(c2.response.body_text(), "Bye now");
    }

    #[test]
    fn test_missing_template_is_500() {
        let mut c = ctx();
        c.html(200, "nope.html", context! {});
        assert_eq!(c.response.status, 500);
    }

    #[test]
    fn test_redirect_default_and_explicit() {
        let mut c = ctx();
        c.redirect("/login", None);
        assert_eq!(c.response.status, 302);
        assert_eq!(c.response.header("Location"), Some("/login"));
        let mut c = ctx();
        c.mvc.render = RenderKind::Redirect;
        c.mvc.status = 301;
        c.mvc.model = Model::from("/moved");
        c.render_mvc();
        assert_eq!(c.response.status, 301);
    }

    #[test]
    fn test_file_range_and_conditional() {
        let data = b"0123456789".to_vec();
        let modified = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);

        let mut c = ctx_with(
            Renderer::new(),
            Request::new(Method::GET, "/f").with_header("Range", "bytes=2-4"),
        );
        c.file("notes.txt", Some(modified), Cursor::new(data.clone()));
        assert_eq!(c.response.status, 206);
        assert_eq!(c.response.body, b"234");
        assert_eq!(c.response.header("Content-Range"), Some("bytes 2-4/10"));
        assert!(c.response.header("Content-Type").unwrap().starts_with("text/plain"));

        let mut c = ctx_with(
            Renderer::new(),
            Request::new(Method::GET, "/f").with_header("Range", "bytes=20-"),
        );
        c.file("notes.txt", None, Cursor::new(data.clone()));
        assert_eq!(c.response.status, 416);

        let since = httpdate::fmt_http_date(modified);
        let mut c = ctx_with(
            Renderer::new(),
            Request::new(Method::GET, "/f").with_header("If-Modified-Since", &since),
        );
        c.file("notes.txt", Some(modified), Cursor::new(data));
        assert_eq!(c.response.status, 304);
        assert!(c.response.body.is_empty());
    }

    #[test]
    fn test_signed_json() {
        let signer = Arc::new(Sha256Signer::new("secret"));
        let mut c = ctx_with(
            Renderer::new().with_signer(signer.clone()),
            Request::new(Method::POST, "/post/json").with_header("Host", "api.local"),
        );
        c.json(200, &Item { a: "x".into(), b: 2 });
        let res = c.into_response();
        let sig = crate::signer::Signature {
            nonce: res.header("NF-Nonce").unwrap().to_string(),
            timestamp: res.header("NF-Timestamp").unwrap().parse().unwrap(),
            signature: res.header("NF-Signature").unwrap().to_string(),
        };
        let sctx = SignContext {
            host: "api.local",
            method: "POST",
            path: "/post/json",
            body: &res.body,
        };
        assert!(signer.verify(&sctx, &sig));
    }

    #[test]
    fn test_text_not_signed() {
        let mut c = ctx_with(
            Renderer::new().with_signer(Arc::new(Sha256Signer::new("s"))),
            Request::new(Method::GET, "/"),
        );
        c.text(200, "plain");
        assert!(c.response.header("NF-Signature").is_none());
    }

    #[test]
    fn test_cache_capture() {
        let mut c = ctx();
        c.cache = Some(CacheParams::new("k", Duration::from_secs(60)));
        c.text(200, "cached");
        assert_eq!(c.cache.as_ref().unwrap().body.as_deref(), Some(&b"cached"[..]));
        assert!(c.response.header("Expires").is_some());
    }

    #[test]
    fn test_render_mvc_skipped_when_written() {
        let mut c = ctx();
        c.text(200, "direct");
        c.mvc.render = RenderKind::Json;
        c.mvc.model = Model::from("ignored");
        c.render_mvc();
        assert_eq!(c.response.body_text(), "direct");
    }

    #[test]
    fn test_mvc_status_only() {
        let mut c = ctx();
        c.mvc.render = RenderKind::Status;
        c.mvc.status = 204;
        c.render_mvc();
        assert_eq!(c.response.status, 204);
        assert!(c.response.header("Content-Type").is_none());
    }
}
