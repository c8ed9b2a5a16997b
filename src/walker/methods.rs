//! Named methods of a dispatcher, resolved once at registration.

use std::any::{Any, TypeId};
use std::fmt;

use crate::context::Context;

/// A dispatcher method usable in a handler chain.
pub enum DispatchMethod<O> {
    /// `fn(&self, &mut Context)`: before/after hooks and plain handlers.
    Hook(fn(&O, &mut Context)),
    /// `fn(&self, &mut Args, &mut Context)`: a handler taking the bound
    /// argument record. `call` does nothing when the record has another type.
    Handler {
        args: TypeId,
        args_name: &'static str,
        call: fn(&O, &mut dyn Any, &mut Context),
    },
}

impl<O> Clone for DispatchMethod<O> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<O> Copy for DispatchMethod<O> {}

impl<O> fmt::Debug for DispatchMethod<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchMethod::Hook(_) => f.write_str("Hook"),
            DispatchMethod::Handler { args_name, .. } => {
                f.debug_struct("Handler").field("args", args_name).finish()
            }
        }
    }
}

impl<O> DispatchMethod<O> {
    /// Whether this method can be the handler for a route binding `args`.
    /// Hooks are accepted and read the record through [`Context::args`].
    #[must_use]
    pub fn accepts(&self, args: TypeId) -> bool {
        match self {
            DispatchMethod::Hook(_) => true,
            DispatchMethod::Handler { args: expected, .. } => *expected == args,
        }
    }
}

/// Method lookup by name.
///
/// Generated by `#[dispatch_methods]` on an inherent `impl` block: every
/// method shaped `(&self, &mut Context)` becomes a [`DispatchMethod::Hook`],
/// every method shaped `(&self, &mut A, &mut Context)` (or `&A`) becomes a
/// [`DispatchMethod::Handler`]. Other methods are not listed.
pub trait MethodTable: Sized + 'static {
    fn lookup(name: &str) -> Option<DispatchMethod<Self>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Api;

    impl MethodTable for Api {
        fn lookup(name: &str) -> Option<DispatchMethod<Self>> {
            match name {
                "hook" => Some(DispatchMethod::Hook(|_o: &Self, _ctx: &mut Context| {})),
                "typed" => Some(DispatchMethod::Handler {
                    args: TypeId::of::<u32>(),
                    args_name: "u32",
                    call: |_o: &Self, _a: &mut dyn Any, _ctx: &mut Context| {},
                }),
                _ => None,
            }
        }
    }

    #[test]
    fn test_accepts() {
        let hook = Api::lookup("hook").unwrap();
        let typed = Api::lookup("typed").unwrap();
        assert!(hook.accepts(TypeId::of::<String>()));
        assert!(typed.accepts(TypeId::of::<u32>()));
        assert!(!typed.accepts(TypeId::of::<i64>()));
        assert!(Api::lookup("missing").is_none());
        assert_eq!(format!("{typed:?}"), "Handler { args: \"u32\" }");
    }
}
