//! Form values, uploaded files and scalar coercion.

use std::collections::BTreeMap;
use std::fmt;

use tracing::warn;

use super::multipart::parse_multipart;
use crate::codec::Values;
use crate::server::Request;
use crate::validator::{FieldValue, Inspect};

/// One uploaded file part.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct FileHeader {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl FileHeader {
    #[must_use]
    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

impl fmt::Debug for FileHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileHeader")
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .field("size", &self.bytes.len())
            .finish()
    }
}

impl Inspect for FileHeader {
    fn inspect(&self) -> FieldValue<'_> {
        FieldValue::Opaque
    }
}

/// A parsed form: text values plus uploaded files by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormData {
    pub values: Values,
    pub files: BTreeMap<String, Vec<FileHeader>>,
}

impl FormData {
    #[must_use]
    pub fn from_values(values: Values) -> Self {
        Self {
            values,
            files: BTreeMap::new(),
        }
    }

    /// Parse the request body according to its `Content-Type`.
    ///
    /// `multipart/form-data` and `application/x-www-form-urlencoded` are
    /// understood; anything else gives an empty form. A multipart body that
    /// fails to parse (including one over `max_memory`) is logged and also
    /// gives an empty form.
    #[must_use]
    pub fn from_request(request: &Request, max_memory: usize) -> Self {
        match request.media_type().as_deref() {
            Some("multipart/form-data") => {
                let content_type = request.content_type().unwrap_or_default();
                match parse_multipart(&request.body, content_type, max_memory) {
                    Ok(form) => form,
                    Err(e) => {
                        warn!(
                            path = %request.path,
                            error = %e,
                            max_memory,
                            "Multipart form parse failed"
                        );
                        Self::default()
                    }
                }
            }
            Some("application/x-www-form-urlencoded") => {
                Self::from_values(Values::parse_bytes(&request.body))
            }
            _ => Self::default(),
        }
    }

    /// Query parameters merged with the body read as URL-encoded, whatever
    /// its declared type.
    #[must_use]
    pub fn from_query(request: &Request) -> Self {
        let mut values = request.query_values();
        values.merge(Values::parse_bytes(&request.body));
        Self::from_values(values)
    }

    #[must_use]
    pub fn value(&self, name: &str) -> Option<&str> {
        self.values.get(name)
    }

    #[must_use]
    pub fn file(&self, name: &str) -> Option<&FileHeader> {
        self.files.get(name).and_then(|f| f.first())
    }
}

/// A scalar settable from one form string.
///
/// Empty input yields the zero value; malformed input yields `None` and the
/// field is left untouched.
pub trait Scalar: Sized + Default + PartialEq {
    fn coerce(raw: &str) -> Option<Self>;
}

impl Scalar for String {
    fn coerce(raw: &str) -> Option<Self> {
        Some(raw.to_string())
    }
}

macro_rules! scalar_parse {
    ($($t:ty),*) => {
        $(
            impl Scalar for $t {
                fn coerce(raw: &str) -> Option<Self> {
                    if raw.is_empty() {
                        return Some(<$t>::default());
                    }
                    raw.parse().ok()
                }
            }
        )*
    };
}

scalar_parse!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64);

impl Scalar for bool {
    fn coerce(raw: &str) -> Option<Self> {
        match raw {
            "" => Some(false),
            "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
            "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
            _ => None,
        }
    }
}

/// A field that can be populated from a form by name.
///
/// Returns whether anything was assigned.
pub trait FormField {
    fn bind_field(&mut self, name: &str, form: &FormData) -> bool;

    /// Whether the field still holds its zero value.
    fn is_zero(&self) -> bool;
}

impl<T: Scalar> FormField for T {
    fn bind_field(&mut self, name: &str, form: &FormData) -> bool {
        match form.values.get(name).and_then(T::coerce) {
            Some(v) => {
                *self = v;
                true
            }
            None => false,
        }
    }

    fn is_zero(&self) -> bool {
        *self == T::default()
    }
}

impl<T: Scalar> FormField for Option<T> {
    fn bind_field(&mut self, name: &str, form: &FormData) -> bool {
        match form.values.get(name).and_then(T::coerce) {
            Some(v) => {
                *self = Some(v);
                true
            }
            None => false,
        }
    }

    fn is_zero(&self) -> bool {
        self.is_none()
    }
}

/// Every value in order; malformed entries become the zero value.
impl<T: Scalar> FormField for Vec<T> {
    fn bind_field(&mut self, name: &str, form: &FormData) -> bool {
        let raw = form.values.get_all(name);
        if raw.is_empty() {
            return false;
        }
        *self = raw
            .iter()
            .map(|v| T::coerce(v).unwrap_or_default())
            .collect();
        true
    }

    fn is_zero(&self) -> bool {
        self.is_empty()
    }
}

impl FormField for FileHeader {
    fn bind_field(&mut self, name: &str, form: &FormData) -> bool {
        match form.file(name) {
            Some(f) => {
                *self = f.clone();
                true
            }
            None => false,
        }
    }

    fn is_zero(&self) -> bool {
        *self == FileHeader::default()
    }
}

impl FormField for Option<FileHeader> {
    fn bind_field(&mut self, name: &str, form: &FormData) -> bool {
        *self = form.file(name).cloned();
        self.is_some()
    }

    fn is_zero(&self) -> bool {
        self.is_none()
    }
}

impl FormField for Vec<FileHeader> {
    fn bind_field(&mut self, name: &str, form: &FormData) -> bool {
        match form.files.get(name) {
            Some(files) if !files.is_empty() => {
                self.clone_from(files);
                true
            }
            _ => false,
        }
    }

    fn is_zero(&self) -> bool {
        self.is_empty()
    }
}

/// Records populated field by field from a form.
///
/// Derived with `#[derive(Bind)]` (or as part of `#[derive(Args)]` for form
/// and URL arguments). Returns whether any field was assigned.
pub trait Bind {
    fn bind(&mut self, form: &FormData) -> bool;

    /// Whether every bound field still holds its zero value.
    fn is_zero(&self) -> bool;
}

impl<T: Bind + ?Sized> Bind for Box<T> {
    fn bind(&mut self, form: &FormData) -> bool {
        (**self).bind(form)
    }

    fn is_zero(&self) -> bool {
        (**self).is_zero()
    }
}

/// Bind an embedded optional record: allocate it, bind it, and reset it to
/// `None` when it is still zero afterwards.
pub fn bind_embedded<B: Bind + Default>(slot: &mut Option<B>, form: &FormData) -> bool {
    let mut inner = B::default();
    if inner.bind(form) && !inner.is_zero() {
        *slot = Some(inner);
        true
    } else {
        *slot = None;
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;

    fn form(pairs: &[(&str, &str)]) -> FormData {
        FormData::from_values(pairs.iter().copied().collect())
    }

    #[test]
    fn test_scalar_coercion() {
        assert_eq!(i32::coerce(""), Some(0));
        assert_eq!(i32::coerce("42"), Some(42));
        assert_eq!(i32::coerce("4x"), None);
        assert_eq!(u8::coerce("-1"), None);
        assert_eq!(f64::coerce(""), Some(0.0));
        assert_eq!(bool::coerce("T"), Some(true));
        assert_eq!(bool::coerce("False"), Some(false));
        assert_eq!(bool::coerce("yes"), None);
    }

    #[test]
    fn test_malformed_scalar_leaves_field() {
        let f = form(&[("n", "abc"), ("m", "7")]);
        let mut n = 5i64;
        assert!(!n.bind_field("n", &f));
        assert_eq!(n, 5);
        let mut m = 0u16;
        assert!(m.bind_field("m", &f));
        assert_eq!(m, 7);
        let mut missing = String::from("keep");
        assert!(!missing.bind_field("zz", &f));
        assert_eq!(missing, "keep");
    }

    #[test]
    fn test_sequences_keep_order() {
        let f = form(&[("ids", "3"), ("ids", "x"), ("ids", "1")]);
        let mut ids: Vec<u32> = Vec::new();
        assert!(ids.bind_field("ids", &f));
        assert_eq!(ids, [3, 0, 1]);
    }

    #[test]
    fn test_files() {
        let mut f = FormData::default();
        f.files.entry("up".into()).or_default().push(FileHeader {
            filename: "a.txt".into(),
            content_type: Some("text/plain".into()),
            bytes: b"hi".to_vec(),
        });
        let mut one = FileHeader::default();
        assert!(one.bind_field("up", &f));
        assert_eq!(one.filename, "a.txt");
        let mut many: Vec<FileHeader> = Vec::new();
        assert!(many.bind_field("up", &f));
        assert_eq!(many.len(), 1);
        let mut none: Option<FileHeader> = None;
        assert!(!none.bind_field("down", &f));
    }

    #[derive(Default)]
    struct Page {
        page: u32,
    }

    impl Bind for Page {
        fn bind(&mut self, form: &FormData) -> bool {
            self.page.bind_field("page", form)
        }

        fn is_zero(&self) -> bool {
            self.page.is_zero()
        }
    }

    #[test]
    fn test_bind_embedded_resets_when_untouched() {
        let mut slot: Option<Box<Page>> = None;
        assert!(bind_embedded(&mut slot, &form(&[("page", "2")])));
        assert_eq!(slot.as_ref().map(|p| p.page), Some(2));
        assert!(!bind_embedded(&mut slot, &form(&[("other", "1")])));
        assert!(slot.is_none());
    }

    #[test]
    fn test_bind_embedded_resets_when_zero() {
        let mut slot: Option<Box<Page>> = Some(Box::new(Page { page: 7 }));
        assert!(!bind_embedded(&mut slot, &form(&[("page", "0")])));
        assert!(slot.is_none());
        assert!(!bind_embedded(&mut slot, &form(&[("page", "")])));
        assert!(slot.is_none());
    }

    #[test]
    fn test_zero_values() {
        assert!(0u32.is_zero());
        assert!(!String::from("x").is_zero());
        assert!(None::<i64>.is_zero());
        assert!(!Some(0i64).is_zero());
        assert!(Vec::<String>::new().is_zero());
        assert!(FileHeader::default().is_zero());
    }

    #[test]
    fn test_from_query_merges_body() {
        let req = Request::new(Method::GET, "/q?a=bb&dd=800").with_body("dd=900&e=1");
        let f = FormData::from_query(&req);
        assert_eq!(f.values.get_all("dd"), ["800".to_string(), "900".to_string()]);
        assert_eq!(f.value("e"), Some("1"));
    }

    #[test]
    fn test_from_request_urlencoded() {
        let req = Request::new(Method::POST, "/form")
            .with_header("Content-Type", "application/x-www-form-urlencoded")
            .with_body("a=hello");
        assert_eq!(FormData::from_request(&req, 1024).value("a"), Some("hello"));
        let json = Request::new(Method::POST, "/form")
            .with_header("Content-Type", "application/json")
            .with_body("{}");
        assert!(FormData::from_request(&json, 1024).values.is_empty());
    }
}
