//! # Validator Module
//!
//! Rule-based structural validation for request argument records.
//!
//! ## Overview
//!
//! Each field of a record may carry a rule string such as
//! `#[validate("nonzero,len=5")]`. [`Validator::validate`] walks the record's
//! fields in declaration order, applies every rule to the field value and
//! collects the failures into an [`ErrorMap`] keyed by field name. Fields
//! whose errors list is empty are omitted.
//!
//! ## Built-in Rules
//!
//! | Rule | Strings | Sequences / maps | Numbers |
//! |------|---------|------------------|---------|
//! | `nonzero` | not empty | not empty | not 0 |
//! | `len=N` | `N` characters | `N` elements | equal to `N` |
//! | `min=N` | at least `N` characters | at least `N` elements | `>= N` |
//! | `max=N` | at most `N` characters | at most `N` elements | `<= N` |
//! | `regexp=P` | matches `P` | unsupported | unsupported |
//!
//! Booleans are zero when `false`; records are never zero, only an unset
//! `Option` or pointer to one is. Applying a rule to a type it does not
//! understand yields [`RuleError::Unsupported`]; a parameter that does not
//! parse yields [`RuleError::BadParameter`].
//!
//! ## Nested Records
//!
//! A field holding another `#[derive(Validate)]` record is validated
//! recursively when the field is `pub`; its errors are keyed
//! `outer.inner`. `#[validate("-")]` removes a field from validation.
//!
//! ## Custom Rules
//!
//! The rule table is open: [`Validator::register`] adds or replaces a rule,
//! and registering `None` removes one. A field naming any rule that is not in
//! the table reports a single [`RuleError::UnknownTag`] and nothing else.
//!
//! ```rust
//! use std::sync::Arc;
//! use nfweb::validator::{RuleError, Validator, FieldValue};
//!
//! let v = Validator::new();
//! v.register("even", Some(Arc::new(|value: FieldValue<'_>, _param: &str| match value {
//!     FieldValue::Int(i) if i % 2 == 0 => Ok(()),
//!     FieldValue::Int(_) => Err(RuleError::Invalid),
//!     _ => Err(RuleError::Unsupported),
//! })));
//! assert!(v.valid(&4, "even,min=2").is_ok());
//! assert_eq!(v.valid(&3, "even").unwrap_err(), vec![RuleError::Invalid]);
//! ```

mod rules;
mod value;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use dashmap::DashMap;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use rules::{Builtin, RegexCache};
pub use rules::{parse_rules, ParsedRule, Rule, RuleError, RuleFn};
pub use value::{FieldValue, Inspect};

/// Sentinel code carried by every validation error model.
pub const VALIDATION_ERROR_CODE: i32 = 10000;

/// One declared field of a record, as presented to the validator.
pub struct FieldInfo<'a> {
    /// Field name as declared.
    pub name: &'static str,
    /// Rule string from `#[validate(...)]`, empty when absent.
    pub rules: &'static str,
    /// Whether the field is `pub`; only public record fields are recursed into.
    pub exported: bool,
    pub value: &'a dyn Inspect,
}

/// Records whose fields can be enumerated for validation.
///
/// Usually derived with `#[derive(Validate)]`, which visits every field not
/// marked `#[validate("-")]` in declaration order.
pub trait Validate {
    fn visit_fields(&self, visit: &mut dyn FnMut(FieldInfo<'_>));
}

/// Ordered field → errors mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorMap {
    entries: Vec<(String, Vec<RuleError>)>,
}

impl ErrorMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one error to `field`, creating the entry on first use.
    pub fn insert(&mut self, field: impl Into<String>, error: RuleError) {
        self.extend_field(field, std::iter::once(error));
    }

    /// Append errors to `field`. Nothing is recorded for an empty iterator.
    pub fn extend_field(&mut self, field: impl Into<String>, errors: impl IntoIterator<Item = RuleError>) {
        let mut errors = errors.into_iter().peekable();
        if errors.peek().is_none() {
            return;
        }
        let field = field.into();
        match self.entries.iter_mut().find(|(k, _)| *k == field) {
            Some((_, existing)) => existing.extend(errors),
            None => self.entries.push((field, errors.collect())),
        }
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&[RuleError]> {
        self.entries
            .iter()
            .find(|(k, _)| k == field)
            .map(|(_, v)| v.as_slice())
    }

    #[must_use]
    pub fn contains(&self, field: &str) -> bool {
        self.get(field).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[RuleError])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Field names in the order their first error was recorded.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// The client-facing error model, one entry per field.
    #[must_use]
    pub fn to_model(&self) -> ValidationErrorModel {
        ValidationErrorModel {
            code: VALIDATION_ERROR_CODE,
            errors: self
                .iter()
                .map(|(field, errs)| FieldError {
                    field: field.to_string(),
                    error: join(errs),
                })
                .collect(),
        }
    }
}

fn join(errors: &[RuleError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for ErrorMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (field, errors)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{field}: {}", join(errors))?;
        }
        Ok(())
    }
}

impl std::error::Error for ErrorMap {}

/// Validation failure as rendered to clients (JSON or XML).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename = "result")]
pub struct ValidationErrorModel {
    pub code: i32,
    pub errors: Vec<FieldError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub error: String,
}

#[derive(Clone)]
enum RuleImpl {
    Builtin(Builtin),
    Custom(RuleFn),
}

/// Rule table plus the parse and regex caches.
///
/// One validator is shared by every request; rules are parsed once per
/// distinct rule string and regexes compiled once per pattern.
pub struct Validator {
    table: RwLock<HashMap<String, RuleImpl>>,
    parsed: DashMap<String, Arc<[ParsedRule]>>,
    regexes: RegexCache,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<&String> = table.keys().collect();
        names.sort();
        f.debug_struct("Validator").field("rules", &names).finish()
    }
}

impl Validator {
    /// Validator with the built-in rules registered.
    #[must_use]
    pub fn new() -> Self {
        let table = Builtin::ALL
            .iter()
            .map(|(name, kind)| ((*name).to_string(), RuleImpl::Builtin(*kind)))
            .collect();
        Self {
            table: RwLock::new(table),
            parsed: DashMap::new(),
            regexes: RegexCache::default(),
        }
    }

    /// Add, replace or (with `None`) remove a rule.
    pub fn register(&self, name: &str, rule: Option<RuleFn>) {
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        match rule {
            Some(f) => {
                table.insert(name.to_string(), RuleImpl::Custom(f));
            }
            None => {
                table.remove(name);
            }
        }
    }

    #[must_use]
    pub fn has_rule(&self, name: &str) -> bool {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Validate every field of `record`.
    pub fn validate(&self, record: &dyn Validate) -> Result<(), ErrorMap> {
        let mut errors = ErrorMap::new();
        self.walk(record, "", &mut errors);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate a single value against a rule string.
    pub fn valid(&self, value: &dyn Inspect, rules: &str) -> Result<(), Vec<RuleError>> {
        let errors = self.check(value.inspect(), rules);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn walk(&self, record: &dyn Validate, prefix: &str, errors: &mut ErrorMap) {
        record.visit_fields(&mut |field: FieldInfo<'_>| {
            let key = if prefix.is_empty() {
                field.name.to_string()
            } else {
                format!("{prefix}.{}", field.name)
            };
            let value = field.value.inspect();
            if !field.rules.is_empty() {
                errors.extend_field(key.as_str(), self.check(value, field.rules));
            }
            if let FieldValue::Record(inner) = value {
                if field.exported {
                    self.walk(inner, &key, errors);
                }
            }
        });
    }

    fn check(&self, value: FieldValue<'_>, rules: &str) -> Vec<RuleError> {
        let resolved = match self.resolve(rules) {
            Ok(r) => r,
            Err(e) => return vec![e],
        };
        resolved
            .iter()
            .filter_map(|rule| rule.check(value, &self.regexes).err())
            .collect()
    }

    fn parsed(&self, rules: &str) -> Arc<[ParsedRule]> {
        if let Some(hit) = self.parsed.get(rules) {
            return Arc::clone(hit.value());
        }
        let parsed: Arc<[ParsedRule]> = parse_rules(rules).into();
        self.parsed.insert(rules.to_string(), Arc::clone(&parsed));
        parsed
    }

    /// Resolve every entry of `rules` against the table; any unknown name
    /// fails the whole string.
    fn resolve(&self, rules: &str) -> Result<Vec<Rule>, RuleError> {
        let parsed = self.parsed(rules);
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        parsed
            .iter()
            .map(|p| match table.get(&p.name) {
                Some(RuleImpl::Builtin(kind)) => Ok(kind.with_param(&p.param)),
                Some(RuleImpl::Custom(f)) => Ok(Rule::Custom(p.param.clone(), Arc::clone(f))),
                None => Err(RuleError::UnknownTag),
            })
            .collect()
    }
}

static GLOBAL: Lazy<Validator> = Lazy::new(Validator::new);

/// Process default validator.
pub fn global() -> &'static Validator {
    &GLOBAL
}

/// Validate `record` with the process default validator.
pub fn validate(record: &dyn Validate) -> Result<(), ErrorMap> {
    GLOBAL.validate(record)
}

/// Validate one value with the process default validator.
pub fn valid(value: &dyn Inspect, rules: &str) -> Result<(), Vec<RuleError>> {
    GLOBAL.valid(value, rules)
}
