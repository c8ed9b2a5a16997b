//! # Binder Module
//!
//! Decodes an HTTP request into a typed argument record and validates it.
//!
//! ## Request Kinds
//!
//! Every argument record declares a [`RequestKind`] through
//! `#[args(form | url | json | xml)]`:
//!
//! - **Form**: the body is parsed as `multipart/form-data` or
//!   `application/x-www-form-urlencoded`; each field is looked up by its form
//!   name and coerced from the first value (or every value for sequences).
//!   File fields take uploaded parts.
//! - **Url**: query parameters merged with the body read as URL-encoded,
//!   then bound like a form without files.
//! - **Json** / **Xml**: the payload is the whole body, or, when a field
//!   source is declared with `#[args(json, field = "file")]`, the named datum
//!   found in the form values, then the uploaded files, then the query.
//!
//! ## Validation Outcome
//!
//! After binding, the record is validated. Errors are handled according to
//! the kind's [`ValidationFormat`]: JSON and XML arguments answer with the
//! error model (status 200, code 10000) and stop the chain; form and URL
//! arguments hand the errors to the handler through `Mvc::errors`.
//!
//! A body that fails to decode is logged and reported as an `invalid value`
//! error on the `body` key, ahead of the field errors it causes.

mod form;
mod multipart;

use std::borrow::Cow;
use std::fmt;

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

pub use form::{bind_embedded, Bind, FileHeader, FormData, FormField, Scalar};
pub use multipart::parse_multipart;

use crate::context::Context;
use crate::mvc::RenderKind;
use crate::validator::{ErrorMap, RuleError, Validate};

/// Error-map key for a payload that did not decode.
pub const BODY_FIELD: &str = "body";

/// How a request body is decoded into an argument record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Form,
    Url,
    Json,
    Xml,
}

/// How validation errors reach the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationFormat {
    /// Render the error model as JSON and stop.
    Json,
    /// Render the error model as XML and stop.
    Xml,
    /// Store the errors in the MVC envelope for the handler.
    Envelope,
}

impl RequestKind {
    #[must_use]
    pub const fn validation_format(self) -> ValidationFormat {
        match self {
            RequestKind::Form | RequestKind::Url => ValidationFormat::Envelope,
            RequestKind::Json => ValidationFormat::Json,
            RequestKind::Xml => ValidationFormat::Xml,
        }
    }

    #[must_use]
    pub const fn default_render(self) -> RenderKind {
        match self {
            RequestKind::Form | RequestKind::Url => RenderKind::Html,
            RequestKind::Json => RenderKind::Json,
            RequestKind::Xml => RenderKind::Xml,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            RequestKind::Form => "form",
            RequestKind::Url => "url",
            RequestKind::Json => "json",
            RequestKind::Xml => "xml",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A JSON or XML payload that did not decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeError {
    pub kind: RequestKind,
    pub message: String,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} decode failed: {}", self.kind, self.message)
    }
}

impl std::error::Error for DecodeError {}

/// Decode JSON into a fresh record.
pub fn decode_json<T: DeserializeOwned>(payload: &[u8]) -> Result<T, DecodeError> {
    serde_json::from_slice(payload).map_err(|e| DecodeError {
        kind: RequestKind::Json,
        message: e.to_string(),
    })
}

/// Decode XML into a fresh record. The root element name is not checked.
pub fn decode_xml<T: DeserializeOwned>(payload: &[u8]) -> Result<T, DecodeError> {
    let text = std::str::from_utf8(payload).map_err(|e| DecodeError {
        kind: RequestKind::Xml,
        message: e.to_string(),
    })?;
    quick_xml::de::from_str(text).map_err(|e| DecodeError {
        kind: RequestKind::Xml,
        message: e.to_string(),
    })
}

/// An argument record bound per request.
///
/// Derived with `#[derive(Args)]`:
///
/// ```rust,ignore
/// #[derive(Args, Default, Deserialize, Serialize)]
/// #[args(json)]
/// pub struct PostJson {
///     #[validate("len=5")]
///     pub a: String,
///     #[validate("min=2,max=6")]
///     pub b: i64,
/// }
/// ```
pub trait Args: Validate + Default + Send + 'static {
    const KIND: RequestKind;
    /// Name of the form value, file or query parameter carrying the payload.
    const FIELD_SOURCE: Option<&'static str> = None;
    /// Whether the record declares any field; routes without a method default
    /// to `POST` when it does and `GET` otherwise.
    const HAS_FIELDS: bool = true;

    /// Populate from form values. Used by the form and URL kinds.
    fn bind_form(&mut self, _form: &FormData) {}

    /// Decode a JSON or XML payload into `self`.
    fn decode_body(&mut self, _payload: &[u8]) -> Result<(), DecodeError> {
        Ok(())
    }

    fn validation_format() -> ValidationFormat {
        Self::KIND.validation_format()
    }

    fn default_render() -> RenderKind {
        Self::KIND.default_render()
    }
}

/// Locate the encoded payload for a JSON or XML record.
fn payload<'a>(ctx: &'a mut Context, source: Option<&str>) -> Cow<'a, [u8]> {
    let Some(name) = source else {
        return Cow::Borrowed(&ctx.request.body);
    };
    let form = ctx.form();
    if let Some(v) = form.value(name) {
        return Cow::Owned(v.as_bytes().to_vec());
    }
    if let Some(f) = form.file(name) {
        return Cow::Owned(f.bytes.clone());
    }
    let query = ctx.request.query_values();
    match query.get(name) {
        Some(v) => Cow::Owned(v.as_bytes().to_vec()),
        None => {
            debug!(field = %name, "Payload field source not present");
            Cow::Owned(Vec::new())
        }
    }
}

/// Bind and validate `A` for the current request.
///
/// On success (or with errors handed to the handler) the record is stored on
/// the context; with a JSON or XML validation failure the error model is
/// written and the chain aborted.
pub fn bind_request<A: Args>(ctx: &mut Context) {
    let mut args = A::default();
    let mut errors = ErrorMap::new();

    match A::KIND {
        RequestKind::Form => args.bind_form(ctx.form()),
        RequestKind::Url => args.bind_form(&FormData::from_query(&ctx.request)),
        RequestKind::Json | RequestKind::Xml => {
            let body = payload(ctx, A::FIELD_SOURCE);
            if !body.is_empty() {
                if let Err(e) = args.decode_body(&body) {
                    warn!(
                        args = %std::any::type_name::<A>(),
                        kind = %A::KIND,
                        error = %e,
                        "Request body decode failed"
                    );
                    errors.insert(BODY_FIELD, RuleError::Invalid);
                }
            }
        }
    }

    if let Err(field_errors) = ctx.engine().validator.validate(&args) {
        for (field, errs) in field_errors.iter() {
            errors.extend_field(field, errs.iter().copied());
        }
    }

    if !errors.is_empty() {
        debug!(
            args = %std::any::type_name::<A>(),
            errors = %errors,
            "Argument validation failed"
        );
        match A::validation_format() {
            ValidationFormat::Json => {
                ctx.json(200, &errors.to_model());
                ctx.abort();
            }
            ValidationFormat::Xml => {
                ctx.xml(200, &errors.to_model());
                ctx.abort();
            }
            ValidationFormat::Envelope => ctx.mvc.errors = Some(errors),
        }
    }
    ctx.set_args(args);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_defaults() {
        assert_eq!(RequestKind::Json.validation_format(), ValidationFormat::Json);
        assert_eq!(RequestKind::Xml.validation_format(), ValidationFormat::Xml);
        assert_eq!(RequestKind::Url.validation_format(), ValidationFormat::Envelope);
        assert_eq!(RequestKind::Form.default_render(), RenderKind::Html);
        assert_eq!(RequestKind::Xml.default_render(), RenderKind::Xml);
    }

    #[derive(serde::Deserialize, Debug, PartialEq)]
    struct Pair {
        a: String,
        b: i64,
    }

    #[test]
    fn test_decode_helpers() {
        let p: Pair = decode_json(br#"{"a":"x","b":7}"#).unwrap();
        assert_eq!(p, Pair { a: "x".into(), b: 7 });
        let p: Pair = decode_xml(b"<xml><a>x</a><b>7</b></xml>").unwrap();
        assert_eq!(p, Pair { a: "x".into(), b: 7 });
        let err = decode_json::<Pair>(b"{").unwrap_err();
        assert_eq!(err.kind, RequestKind::Json);
        assert!(err.to_string().starts_with("json decode failed"));
    }
}
