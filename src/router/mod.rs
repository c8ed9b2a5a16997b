//! # Router Module
//!
//! Route registration and path matching.
//!
//! ## Overview
//!
//! The router is responsible for:
//! - Holding every registered `(method, pattern, chain)` route in registration order
//! - Rejecting duplicate method/pattern pairs at startup
//! - Matching incoming requests and extracting `{param}` path segments
//! - Listing routes as a table sorted by pattern for operator visibility
//!
//! ## Architecture
//!
//! Routes are added once while the dispatcher tree is walked and then only read.
//! Lookup goes through a radix tree of path segments, so matching cost depends on
//! the path length rather than on the number of routes. Static segments are tried
//! before parameter segments.
//!
//! ## Example
//!
//! ```rust
//! use http::Method;
//! use nfweb::router::{RouteEntry, Router};
//!
//! let mut router = Router::new();
//! router
//!     .add(RouteEntry::new(Method::GET, "/v1/users/{id}"), Vec::new())
//!     .unwrap();
//!
//! let m = router.route(&Method::GET, "/v1/users/123").unwrap();
//! assert_eq!(m.param("id"), Some("123"));
//! assert_eq!(router.allowed_methods("/v1/users/9"), [Method::GET]);
//! ```

mod core;
mod radix;

pub use core::{
    ParamVec, Route, RouteEntry, RouteError, RouteMatch, Router, Stage, MAX_INLINE_PARAMS,
};
