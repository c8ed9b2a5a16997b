//! Reflective view of field values.
//!
//! Rules never see concrete Rust types. Every field is projected through
//! [`Inspect`] onto a [`FieldValue`], which exposes exactly what the rules
//! need: string contents, numeric value, collection length, or a nested
//! record to recurse into. `Option`, `Box`, `Arc` and references are
//! dereferenced on the way, and an unset `Option` becomes [`FieldValue::Null`].

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use super::Validate;

/// A field value as seen by validation rules.
#[derive(Clone, Copy)]
pub enum FieldValue<'a> {
    Str(&'a str),
    Int(i64),
    Uint(u64),
    Float(f64),
    Bool(bool),
    /// Sequence with its element count.
    Seq(usize),
    /// Mapping with its entry count.
    Map(usize),
    /// An unset optional or pointer.
    Null,
    /// A nested record.
    Record(&'a dyn Validate),
    /// Anything rules cannot look inside (uploaded files, handles).
    Opaque,
}

impl FieldValue<'_> {
    /// Whether this is the zero value for its type.
    ///
    /// Records and opaque values are never zero; only an unset pointer to
    /// them is.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        match *self {
            FieldValue::Str(s) => s.is_empty(),
            FieldValue::Int(v) => v == 0,
            FieldValue::Uint(v) => v == 0,
            FieldValue::Float(v) => v == 0.0,
            FieldValue::Bool(v) => !v,
            FieldValue::Seq(n) | FieldValue::Map(n) => n == 0,
            FieldValue::Null => true,
            FieldValue::Record(_) | FieldValue::Opaque => false,
        }
    }

    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            FieldValue::Str(_) => "string",
            FieldValue::Int(_) => "int",
            FieldValue::Uint(_) => "uint",
            FieldValue::Float(_) => "float",
            FieldValue::Bool(_) => "bool",
            FieldValue::Seq(_) => "seq",
            FieldValue::Map(_) => "map",
            FieldValue::Null => "null",
            FieldValue::Record(_) => "record",
            FieldValue::Opaque => "opaque",
        }
    }
}

impl fmt::Debug for FieldValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Str(s) => f.debug_tuple("Str").field(s).finish(),
            FieldValue::Int(v) => f.debug_tuple("Int").field(v).finish(),
            FieldValue::Uint(v) => f.debug_tuple("Uint").field(v).finish(),
            FieldValue::Float(v) => f.debug_tuple("Float").field(v).finish(),
            FieldValue::Bool(v) => f.debug_tuple("Bool").field(v).finish(),
            FieldValue::Seq(n) => f.debug_tuple("Seq").field(n).finish(),
            FieldValue::Map(n) => f.debug_tuple("Map").field(n).finish(),
            FieldValue::Null => f.write_str("Null"),
            FieldValue::Record(_) => f.write_str("Record(..)"),
            FieldValue::Opaque => f.write_str("Opaque"),
        }
    }
}

/// Projects a value onto [`FieldValue`].
///
/// Implemented for the standard scalar, string, collection and pointer
/// types. `#[derive(Validate)]` implements it for records as
/// [`FieldValue::Record`].
pub trait Inspect {
    fn inspect(&self) -> FieldValue<'_>;
}

impl Inspect for str {
    fn inspect(&self) -> FieldValue<'_> {
        FieldValue::Str(self)
    }
}

impl Inspect for String {
    fn inspect(&self) -> FieldValue<'_> {
        FieldValue::Str(self)
    }
}

impl Inspect for Cow<'_, str> {
    fn inspect(&self) -> FieldValue<'_> {
        FieldValue::Str(self)
    }
}

macro_rules! inspect_as {
    ($variant:ident($target:ty): $($t:ty),*) => {
        $(
            impl Inspect for $t {
                fn inspect(&self) -> FieldValue<'_> {
                    FieldValue::$variant(*self as $target)
                }
            }
        )*
    };
}

inspect_as!(Int(i64): i8, i16, i32, i64, isize);
inspect_as!(Uint(u64): u8, u16, u32, u64, usize);
inspect_as!(Float(f64): f32, f64);

impl Inspect for bool {
    fn inspect(&self) -> FieldValue<'_> {
        FieldValue::Bool(*self)
    }
}

impl<T> Inspect for [T] {
    fn inspect(&self) -> FieldValue<'_> {
        FieldValue::Seq(self.len())
    }
}

impl<T, const N: usize> Inspect for [T; N] {
    fn inspect(&self) -> FieldValue<'_> {
        FieldValue::Seq(N)
    }
}

impl<T> Inspect for Vec<T> {
    fn inspect(&self) -> FieldValue<'_> {
        FieldValue::Seq(self.len())
    }
}

impl<T> Inspect for VecDeque<T> {
    fn inspect(&self) -> FieldValue<'_> {
        FieldValue::Seq(self.len())
    }
}

impl<T, S> Inspect for HashSet<T, S> {
    fn inspect(&self) -> FieldValue<'_> {
        FieldValue::Seq(self.len())
    }
}

impl<T> Inspect for BTreeSet<T> {
    fn inspect(&self) -> FieldValue<'_> {
        FieldValue::Seq(self.len())
    }
}

impl<K, V, S> Inspect for HashMap<K, V, S> {
    fn inspect(&self) -> FieldValue<'_> {
        FieldValue::Map(self.len())
    }
}

impl<K, V> Inspect for BTreeMap<K, V> {
    fn inspect(&self) -> FieldValue<'_> {
        FieldValue::Map(self.len())
    }
}

impl<T: Inspect> Inspect for Option<T> {
    fn inspect(&self) -> FieldValue<'_> {
        match self {
            Some(v) => v.inspect(),
            None => FieldValue::Null,
        }
    }
}

impl<T: Inspect + ?Sized> Inspect for Box<T> {
    fn inspect(&self) -> FieldValue<'_> {
        (**self).inspect()
    }
}

impl<T: Inspect + ?Sized> Inspect for Arc<T> {
    fn inspect(&self) -> FieldValue<'_> {
        (**self).inspect()
    }
}

impl<T: Inspect + ?Sized> Inspect for Rc<T> {
    fn inspect(&self) -> FieldValue<'_> {
        (**self).inspect()
    }
}

impl<T: Inspect + ?Sized> Inspect for &T {
    fn inspect(&self) -> FieldValue<'_> {
        (**self).inspect()
    }
}

impl Inspect for () {
    fn inspect(&self) -> FieldValue<'_> {
        FieldValue::Opaque
    }
}

/// Dynamic JSON values keep their shape.
impl Inspect for serde_json::Value {
    fn inspect(&self) -> FieldValue<'_> {
        use serde_json::Value;
        match self {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    FieldValue::Int(i)
                } else if let Some(u) = n.as_u64() {
                    FieldValue::Uint(u)
                } else {
                    FieldValue::Float(n.as_f64().unwrap_or_default())
                }
            }
            Value::String(s) => FieldValue::Str(s),
            Value::Array(a) => FieldValue::Seq(a.len()),
            Value::Object(o) => FieldValue::Map(o.len()),
        }
    }
}
