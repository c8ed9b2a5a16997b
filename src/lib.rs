//! # nfweb
//!
//! **nfweb** is a declarative HTTP dispatch framework. An application describes its routes as
//! a tree of annotated structs; the framework walks that tree once at startup, registers every
//! route, and for each request binds the body into a typed argument record, validates it with
//! per-field rules, runs the user's handler, and renders the result.
//!
//! ## Architecture
//!
//! The library is organized into several key modules:
//!
//! - **[`validator`]** - Rule-based validation (`nonzero`, `len`, `min`, `max`, `regexp`, custom rules)
//! - **[`binder`]** - Form, URL, JSON and XML request decoding into argument records
//! - **[`router`]** - Route registry with radix-tree matching and a printable route table
//! - **[`walker`]** - Dispatcher tree traversal: groups, hooks, handlers and terminal routes
//! - **[`render`]** - JSON/XML/text/HTML/data/file/redirect responses, signing and caching
//! - **[`mvc`]** - The per-request view/model/render/status envelope
//! - **[`server`]** - The [`App`] pipeline and a multi-threaded `tiny_http` listener
//! - **[`middleware`]** - Request logging and static file serving
//! - **[`config`]** / **[`logging`]** - Environment and YAML configuration, `tracing` setup
//! - **[`codec`]** / **[`crypto`]** - URL value sets, MD5 signing, AES-GCM and digests
//!
//! ### Request Handling Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant Client
//!     participant Server as HttpServer<br/>(tiny_http)
//!     participant App as App::handle
//!     participant Router
//!     participant Binder as bind_request
//!     participant Handler as Dispatcher method
//!     participant Renderer
//!
//!     Client->>Server: POST /post/json
//!     Server->>App: Request (body buffered)
//!     App->>App: middleware before
//!     App->>Router: route(method, path)
//!     alt no route
//!         Router-->>Client: 404 / 405 + Allow
//!     end
//!     App->>Binder: decode + validate args
//!     alt JSON/XML validation failed
//!         Binder-->>Client: 200 {code: 10000, errors}
//!     end
//!     App->>Handler: before hooks, handler, after hooks
//!     Handler->>Handler: set mvc.model / render / status
//!     App->>Renderer: render_mvc
//!     Renderer-->>Client: response
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use nfweb::{dispatch_methods, Args, Context, Dispatch, Dispatcher, Model};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Args, Default, Deserialize, Serialize)]
//! #[args(json)]
//! pub struct PostJson {
//!     #[validate("len=5")]
//!     pub a: String,
//!     #[validate("min=2,max=6")]
//!     pub b: i64,
//! }
//!
//! #[derive(Dispatcher)]
//! pub struct Api {
//!     #[route(url = "/post/json")]
//!     post_json: PostJson,
//! }
//!
//! impl Dispatch for Api {}
//!
//! #[dispatch_methods]
//! impl Api {
//!     fn post_json_handler(&self, args: &mut PostJson, ctx: &mut Context) {
//!         args.a.push_str("54321");
//!         args.b += 10;
//!         ctx.mvc.model = Model::record(std::mem::take(args));
//!     }
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = nfweb::Config::from_env()?;
//!     let mut app = nfweb::App::new(&config);
//!     app.register(Api { post_json: PostJson::default() })?;
//!     app.serve(config.addr.as_str())?.join().ok();
//!     Ok(())
//! }
//! ```
//!
//! ## Attributes
//!
//! | Attribute | Where | Meaning |
//! |-----------|-------|---------|
//! | `#[route(url, method, handler, before, after, view)]` | dispatcher / group field | route or group declaration |
//! | `#[args(json \| xml \| form \| url, field = "name")]` | argument struct | request kind and optional payload source |
//! | `#[form("name")]`, `#[form(flatten)]`, `#[form(skip)]` | argument / bind field | form name, embedded record, ignored field |
//! | `#[validate("rule,rule=param")]`, `#[validate("-")]` | any validated field | rules, or skip |
//!
//! JSON and XML field names follow `serde` attributes.

extern crate self as nfweb;

pub mod binder;
pub mod codec;
pub mod config;
pub mod context;
pub mod crypto;
pub mod logging;
pub mod middleware;
pub mod mvc;
pub mod render;
pub mod router;
pub mod server;
pub mod signer;
pub mod static_files;
pub mod validator;
pub mod walker;

pub use nfweb_macros::{dispatch_methods, Args, Bind, Dispatcher, RouteGroup, Validate};

pub use binder::{bind_request, Args, Bind, FileHeader, FormData, RequestKind};
pub use config::{Config, Mode};
pub use context::{Context, Engine};
pub use mvc::{Model, Mvc, RenderKind};
pub use server::{App, Request, Response};
pub use validator::{ErrorMap, RuleError, Validate, Validator};
pub use walker::{Dispatch, WalkError};
