//! # MVC Envelope
//!
//! The per-request carrier between a handler and the renderer: view name,
//! model, render kind and status. Handlers fill it in; after the handler
//! chain finishes the renderer reads it and picks the serializer.
//!
//! [`RenderKind`] and the `Content-Type` header are kept in one table
//! ([`RenderKind::content_type`] / [`RenderKind::from_content_type`]) so a
//! response can never carry a render kind with a mismatched type.

use std::any::Any;
use std::fmt;

use serde::Serialize;

use crate::validator::ErrorMap;

/// Selects the serializer used for a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RenderKind {
    #[default]
    Html,
    Json,
    Xml,
    Text,
    Data,
    File,
    Redirect,
    Status,
}

impl RenderKind {
    pub const ALL: [RenderKind; 8] = [
        RenderKind::Html,
        RenderKind::Json,
        RenderKind::Xml,
        RenderKind::Text,
        RenderKind::Data,
        RenderKind::File,
        RenderKind::Redirect,
        RenderKind::Status,
    ];

    /// The `Content-Type` this kind always emits. File types come from the
    /// file name; redirects and bare statuses have no body type.
    #[must_use]
    pub const fn content_type(self) -> Option<&'static str> {
        match self {
            RenderKind::Html => Some("text/html; charset=UTF-8"),
            RenderKind::Json => Some("application/json; charset=UTF-8"),
            RenderKind::Xml => Some("text/xml; charset=UTF-8"),
            RenderKind::Text => Some("text/plain; charset=UTF-8"),
            RenderKind::Data => Some("application/octet-stream"),
            RenderKind::File | RenderKind::Redirect | RenderKind::Status => None,
        }
    }

    /// Inverse of [`content_type`](Self::content_type).
    #[must_use]
    pub fn from_content_type(content_type: &str) -> Option<RenderKind> {
        Self::ALL
            .into_iter()
            .find(|k| k.content_type() == Some(content_type))
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            RenderKind::Html => "HTML",
            RenderKind::Json => "JSON",
            RenderKind::Xml => "XML",
            RenderKind::Text => "TEXT",
            RenderKind::Data => "DATA",
            RenderKind::File => "FILE",
            RenderKind::Redirect => "REDIRECT",
            RenderKind::Status => "STATUS",
        }
    }
}

impl fmt::Display for RenderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A model object the renderer can serialize in any format.
///
/// Blanket-implemented for every `Serialize + Send + Sync + 'static` type,
/// so handlers simply box their response structs.
pub trait Payload: Send + Sync + 'static {
    fn write_json(&self, out: &mut Vec<u8>, indent: bool) -> Result<(), String>;
    fn to_xml(&self, indent: bool) -> Result<String, String>;
    fn to_template(&self) -> minijinja::Value;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Serialize + Send + Sync + 'static> Payload for T {
    fn write_json(&self, out: &mut Vec<u8>, indent: bool) -> Result<(), String> {
        let written = if indent {
            serde_json::to_writer_pretty(out, self)
        } else {
            serde_json::to_writer(out, self)
        };
        written.map_err(|e| e.to_string())
    }

    fn to_xml(&self, indent: bool) -> Result<String, String> {
        let mut out = String::new();
        let mut ser = quick_xml::se::Serializer::new(&mut out);
        if indent {
            ser.indent(' ', 2);
        }
        self.serialize(ser).map_err(|e| e.to_string())?;
        Ok(out)
    }

    fn to_template(&self) -> minijinja::Value {
        minijinja::Value::from_serialize(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// The handler's result object.
#[derive(Default)]
pub enum Model {
    #[default]
    Empty,
    /// Literal text; also the location for redirects and the path for files.
    Text(String),
    Bytes(Vec<u8>),
    Record(Box<dyn Payload>),
}

impl Model {
    pub fn record<T: Payload>(value: T) -> Self {
        Model::Record(Box::new(value))
    }

    /// Borrow a record model as its concrete type.
    #[must_use]
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        match self {
            Model::Record(p) => p.as_any().downcast_ref(),
            _ => None,
        }
    }

    #[must_use]
    pub fn downcast_mut<T: 'static>(&mut self) -> Option<&mut T> {
        match self {
            Model::Record(p) => p.as_any_mut().downcast_mut(),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Model::Empty)
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Model::Empty => f.write_str("Empty"),
            Model::Text(s) => f.debug_tuple("Text").field(s).finish(),
            Model::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            Model::Record(_) => f.write_str("Record(..)"),
        }
    }
}

impl From<String> for Model {
    fn from(s: String) -> Self {
        Model::Text(s)
    }
}

impl From<&str> for Model {
    fn from(s: &str) -> Self {
        Model::Text(s.to_string())
    }
}

impl From<Vec<u8>> for Model {
    fn from(b: Vec<u8>) -> Self {
        Model::Bytes(b)
    }
}

/// Per-request view/model/render/status carrier.
#[derive(Debug)]
pub struct Mvc {
    /// Template name for HTML rendering.
    pub view: String,
    pub model: Model,
    pub render: RenderKind,
    pub status: u16,
    /// Validation result for routes whose errors are handed to the handler
    /// instead of being rendered directly.
    pub errors: Option<ErrorMap>,
}

impl Default for Mvc {
    fn default() -> Self {
        Self {
            view: String::new(),
            model: Model::Empty,
            render: RenderKind::Html,
            status: 200,
            errors: None,
        }
    }
}

impl Mvc {
    #[must_use]
    pub fn new(view: impl Into<String>, render: RenderKind) -> Self {
        Self {
            view: view.into(),
            render,
            ..Self::default()
        }
    }

    /// Whether binding or validation left errors for the handler.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.errors.as_ref().is_some_and(|e| !e.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[derive(Serialize)]
    struct Item {
        a: String,
        b: i32,
    }

    #[test]
    fn test_render_kind_content_type_bijection() {
        let mut seen = HashSet::new();
        for kind in RenderKind::ALL {
            if let Some(ct) = kind.content_type() {
                assert!(seen.insert(ct), "duplicate content type {ct}");
                assert_eq!(RenderKind::from_content_type(ct), Some(kind));
            }
        }
        assert_eq!(seen.len(), 5);
        assert_eq!(RenderKind::from_content_type("image/png"), None);
    }

    #[test]
    fn test_payload_formats() {
        let item = Item { a: "x".into(), b: 7 };
        let mut json = Vec::new();
        item.write_json(&mut json, false).unwrap();
        assert_eq!(json, br#"{"a":"x","b":7}"#);
        assert_eq!(item.to_xml(false).unwrap(), "<Item><a>x</a><b>7</b></Item>");
        let tpl = item.to_template();
        assert_eq!(tpl.get_attr("b").unwrap().to_string(), "7");
    }

    #[test]
    fn test_model_downcast() {
        let mut model = Model::record(Item { a: "x".into(), b: 1 });
        model.downcast_mut::<Item>().unwrap().b += 1;
        assert_eq!(model.downcast_ref::<Item>().unwrap().b, 2);
        assert!(model.downcast_ref::<String>().is_none());
        assert!(Model::from("t").downcast_ref::<Item>().is_none());
    }

    #[test]
    fn test_mvc_defaults() {
        let mvc = Mvc::default();
        assert_eq!(mvc.status, 200);
        assert_eq!(mvc.render, RenderKind::Html);
        assert!(!mvc.has_errors());
    }
}
