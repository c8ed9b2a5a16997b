use http::Method;
use nfweb::router::RouteError;
use nfweb::{dispatch_methods, Args, Context, Dispatch, Dispatcher, RenderKind, RouteGroup, WalkError};

mod common;
use common::get;

#[derive(Args, Debug, Default)]
#[args(url)]
pub struct UserId;

#[derive(Args, Debug, Default, serde::Deserialize)]
#[args(json)]
pub struct NewUser {
    #[validate("nonzero")]
    pub name: String,
}

#[derive(Dispatcher, Default)]
pub struct Users {
    #[route(url = "/{id}")]
    show: UserId,
    #[route(url = "/", view = "users/new.html")]
    create: NewUser,
}

impl Dispatch for Users {}

#[dispatch_methods]
impl Users {
    fn show_handler(&self, _args: &mut UserId, ctx: &mut Context) {
        let id = ctx.param("id").unwrap_or_default().to_string();
        ctx.text(200, format!("user {id}"));
    }

    fn create_handler(&self, _args: &mut NewUser, _ctx: &mut Context) {}
}

#[derive(RouteGroup, Default)]
pub struct Admin {
    #[route(url = "/stats", handler = "admin_stats")]
    stats: (),
}

#[derive(Dispatcher, Default)]
pub struct Root {
    #[route(url = "/users")]
    users: Users,
    #[route(url = "/admin")]
    admin: Admin,
    #[route(url = "/health", method = "head")]
    health: (),
    // Not routed.
    #[allow(dead_code)]
    name: String,
}

impl Dispatch for Root {
    fn filter_url(&self, url: &str) -> String {
        format!("/v1{url}")
    }
}

#[dispatch_methods]
impl Root {
    fn admin_stats(&self, ctx: &mut Context) {
        ctx.text(200, "stats");
    }

    fn health_handler(&self, ctx: &mut Context) {
        ctx.status(204);
    }
}

fn app() -> nfweb::App {
    let mut app = nfweb::App::default();
    app.register(Root::default()).unwrap();
    app
}

#[test]
fn test_nested_group_with_filter() {
    let app = app();
    let patterns: Vec<String> = app.router().entries().map(|e| e.pattern.clone()).collect();
    assert_eq!(
        patterns,
        ["/v1/users/{id}", "/v1/users", "/v1/admin/stats", "/v1/health"]
    );

    let res = get(&app, "/v1/users/42");
    assert_eq!(res.status, 200);
    assert_eq!(res.body_text(), "user 42");
}

#[test]
fn test_route_defaults() {
    let app = app();
    let entries: Vec<_> = app.router().entries().collect();

    // Argument record without fields defaults to GET.
    assert_eq!(entries[0].method, Method::GET);
    assert_eq!(entries[0].handler, "show_handler");
    assert_eq!(entries[0].view, "show.html");
    assert_eq!(entries[0].render, RenderKind::Html);

    // With fields, POST; JSON kind renders JSON.
    assert_eq!(entries[1].method, Method::POST);
    assert_eq!(entries[1].view, "users/new.html");
    assert_eq!(entries[1].render, RenderKind::Json);
    assert!(entries[1].args_type.ends_with("NewUser"));

    // Group routes resolve methods on the enclosing dispatcher.
    assert_eq!(entries[2].handler, "admin_stats");
    assert_eq!(entries[3].method, Method::HEAD);
}

#[test]
fn test_group_handler_runs_on_owner() {
    let res = get(&app(), "/v1/admin/stats");
    assert_eq!(res.body_text(), "stats");
}

#[test]
fn test_registration_order_matches_sorted_table() {
    let app = app();
    let sorted: Vec<&str> = app
        .router()
        .sorted_entries()
        .into_iter()
        .map(|e| e.pattern.as_str())
        .collect();
    assert_eq!(
        sorted,
        ["/v1/admin/stats", "/v1/health", "/v1/users", "/v1/users/{id}"]
    );

    let table = app.router().route_table();
    let lines: Vec<&str> = table.lines().collect();
    assert!(lines[0].starts_with("METHOD"));
    assert!(lines[1].contains("/v1/admin/stats"));
    assert!(lines[4].contains("show_handler"));
}

#[derive(Dispatcher)]
pub struct Boxed {
    #[route(url = "/boxed")]
    boxed: Box<NewUser>,
}

impl Dispatch for Boxed {}

#[dispatch_methods]
impl Boxed {}

#[test]
fn test_pointer_args_rejected() {
    let mut app = nfweb::App::default();
    let err = app
        .register(Boxed {
            boxed: Box::default(),
        })
        .unwrap_err();
    assert!(matches!(err, WalkError::PointerArgs { field: "boxed", .. }));
}

#[derive(Dispatcher, Default)]
pub struct NoHandler {
    #[route(url = "/lonely")]
    lonely: (),
}

impl Dispatch for NoHandler {}

#[dispatch_methods]
impl NoHandler {}

#[test]
fn test_plain_route_without_handler_is_fatal() {
    let mut app = nfweb::App::default();
    let err = app.register(NoHandler::default()).unwrap_err();
    assert_eq!(
        err,
        WalkError::MissingHandler {
            pattern: "/lonely".to_string(),
            handler: "lonely_handler".to_string(),
        }
    );
}

#[derive(Dispatcher, Default)]
pub struct Unbound {
    #[route(url = "/unbound")]
    unbound: NewUser,
}

impl Dispatch for Unbound {}

#[dispatch_methods]
impl Unbound {}

#[test]
fn test_args_route_without_handler_still_binds() {
    let mut app = nfweb::App::default();
    app.register(Unbound::default()).unwrap();
    let entry = app.router().entries().next().unwrap();
    assert_eq!(entry.handler, "");

    let res = common::post_json(&app, "/unbound", r#"{"name":""}"#);
    let body = common::json_body(&res);
    assert_eq!(body["code"], 10000);
    assert_eq!(body["errors"][0]["field"], "name");
}

#[derive(Dispatcher, Default)]
pub struct Twice {
    #[route(url = "/same", handler = "same")]
    first: (),
    #[route(url = "/same", handler = "same")]
    second: (),
}

impl Dispatch for Twice {}

#[dispatch_methods]
impl Twice {
    fn same(&self, ctx: &mut Context) {
        ctx.status(204);
    }
}

#[test]
fn test_duplicate_route_is_fatal() {
    let mut app = nfweb::App::default();
    let err = app.register(Twice::default()).unwrap_err();
    assert_eq!(
        err,
        WalkError::Route(RouteError::Duplicate {
            method: Method::GET,
            pattern: "/same".to_string(),
        })
    );
}

#[derive(Dispatcher, Default)]
pub struct BadMethod {
    #[route(url = "/trace", method = "TRACE", handler = "noop")]
    trace: (),
}

impl Dispatch for BadMethod {}

#[dispatch_methods]
impl BadMethod {
    fn noop(&self, _ctx: &mut Context) {}
}

#[test]
fn test_unsupported_method_is_fatal() {
    let mut app = nfweb::App::default();
    let err = app.register(BadMethod::default()).unwrap_err();
    assert!(matches!(err, WalkError::BadMethod { field: "trace", .. }));
}
