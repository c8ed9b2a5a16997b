#![allow(dead_code)]

use http::Method;
use nfweb::{App, Request, Response};

pub const BOUNDARY: &str = "nfweb-test-boundary";

pub fn get(app: &App, target: &str) -> Response {
    app.handle(Request::new(Method::GET, target))
}

pub fn post_json(app: &App, target: &str, body: &str) -> Response {
    app.handle(
        Request::new(Method::POST, target)
            .with_header("Content-Type", "application/json")
            .with_body(body),
    )
}

pub fn post_form(app: &App, target: &str, body: &str) -> Response {
    app.handle(
        Request::new(Method::POST, target)
            .with_header("Content-Type", "application/x-www-form-urlencoded")
            .with_body(body),
    )
}

/// A `multipart/form-data` body with a single file part.
pub fn multipart_file(field: &str, filename: &str, contents: &str) -> Vec<u8> {
    format!(
        "--{BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n\
         Content-Type: application/octet-stream\r\n\
         \r\n\
         {contents}\r\n\
         --{BOUNDARY}--\r\n"
    )
    .into_bytes()
}

pub fn post_multipart(app: &App, target: &str, body: Vec<u8>) -> Response {
    app.handle(
        Request::new(Method::POST, target)
            .with_header(
                "Content-Type",
                &format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .with_body(body),
    )
}

pub fn json_body(res: &Response) -> serde_json::Value {
    serde_json::from_slice(&res.body).unwrap()
}
