//! Rule strings and the built-in rule implementations.
//!
//! A rule string is `rule[,rule]*`, each rule being `name` or `name=param`
//! with whitespace trimmed on both sides. A literal comma inside a parameter
//! is written `\,`.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use regex::Regex;

use super::value::FieldValue;

/// Why a single rule rejected a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleError {
    ZeroValue,
    Min,
    Max,
    Len,
    Regexp,
    Unsupported,
    BadParameter,
    UnknownTag,
    Invalid,
}

impl fmt::Display for RuleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            RuleError::ZeroValue => "zero value",
            RuleError::Min => "less than min",
            RuleError::Max => "greater than max",
            RuleError::Len => "invalid length",
            RuleError::Regexp => "regular expression mismatch",
            RuleError::Unsupported => "unsupported type",
            RuleError::BadParameter => "bad parameter",
            RuleError::UnknownTag => "unknown tag",
            RuleError::Invalid => "invalid value",
        };
        f.write_str(text)
    }
}

impl std::error::Error for RuleError {}

/// User rule: receives the field value and the rule parameter.
pub type RuleFn = Arc<dyn Fn(FieldValue<'_>, &str) -> Result<(), RuleError> + Send + Sync>;

/// One `name=param` entry of a rule string, as written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRule {
    pub name: String,
    pub param: String,
}

/// A rule resolved against the validator's rule table.
#[derive(Clone)]
pub enum Rule {
    NonZero,
    Len(String),
    Min(String),
    Max(String),
    Regexp(String),
    Custom(String, RuleFn),
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::NonZero => f.write_str("NonZero"),
            Rule::Len(p) => f.debug_tuple("Len").field(p).finish(),
            Rule::Min(p) => f.debug_tuple("Min").field(p).finish(),
            Rule::Max(p) => f.debug_tuple("Max").field(p).finish(),
            Rule::Regexp(p) => f.debug_tuple("Regexp").field(p).finish(),
            Rule::Custom(p, _) => f.debug_tuple("Custom").field(p).finish(),
        }
    }
}

/// Built-in rule kinds, as stored in the rule table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Builtin {
    NonZero,
    Len,
    Min,
    Max,
    Regexp,
}

impl Builtin {
    pub(crate) const ALL: [(&'static str, Builtin); 5] = [
        ("nonzero", Builtin::NonZero),
        ("len", Builtin::Len),
        ("min", Builtin::Min),
        ("max", Builtin::Max),
        ("regexp", Builtin::Regexp),
    ];

    pub(crate) fn with_param(self, param: &str) -> Rule {
        let param = param.to_string();
        match self {
            Builtin::NonZero => Rule::NonZero,
            Builtin::Len => Rule::Len(param),
            Builtin::Min => Rule::Min(param),
            Builtin::Max => Rule::Max(param),
            Builtin::Regexp => Rule::Regexp(param),
        }
    }
}

/// Split a rule string into its entries.
///
/// Empty entries (a trailing comma, `a,,b`) are dropped.
#[must_use]
pub fn parse_rules(tag: &str) -> Vec<ParsedRule> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut chars = tag.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&',') => {
                current.push(',');
                chars.next();
            }
            ',' => {
                push_rule(&mut out, &current);
                current.clear();
            }
            _ => current.push(c),
        }
    }
    push_rule(&mut out, &current);
    out
}

fn push_rule(out: &mut Vec<ParsedRule>, raw: &str) {
    let (name, param) = match raw.split_once('=') {
        Some((n, p)) => (n.trim(), p.trim()),
        None => (raw.trim(), ""),
    };
    if name.is_empty() {
        return;
    }
    out.push(ParsedRule {
        name: name.to_string(),
        param: param.to_string(),
    });
}

/// Compiled regex cache keyed by pattern. `None` marks a pattern that does not compile.
#[derive(Default)]
pub(crate) struct RegexCache {
    compiled: DashMap<String, Option<Regex>>,
}

impl RegexCache {
    fn matches(&self, pattern: &str, input: &str) -> Result<bool, RuleError> {
        if let Some(entry) = self.compiled.get(pattern) {
            return match entry.value() {
                Some(re) => Ok(re.is_match(input)),
                None => Err(RuleError::BadParameter),
            };
        }
        let compiled = Regex::new(pattern).ok();
        let result = compiled
            .as_ref()
            .map(|re| re.is_match(input))
            .ok_or(RuleError::BadParameter);
        self.compiled.insert(pattern.to_string(), compiled);
        result
    }
}

impl Rule {
    /// Apply this rule to one value.
    ///
    /// Built-in rules other than `nonzero` ignore [`FieldValue::Null`]: an
    /// unset optional carries no length or magnitude to check.
    pub(crate) fn check(&self, value: FieldValue<'_>, regexes: &RegexCache) -> Result<(), RuleError> {
        match self {
            Rule::NonZero => {
                if value.is_zero() {
                    Err(RuleError::ZeroValue)
                } else {
                    Ok(())
                }
            }
            Rule::Len(p) => compare(value, p, Bound::Exact),
            Rule::Min(p) => compare(value, p, Bound::Lower),
            Rule::Max(p) => compare(value, p, Bound::Upper),
            Rule::Regexp(p) => match value {
                FieldValue::Null => Ok(()),
                FieldValue::Str(s) => {
                    if regexes.matches(p, s)? {
                        Ok(())
                    } else {
                        Err(RuleError::Regexp)
                    }
                }
                _ => Err(RuleError::Unsupported),
            },
            Rule::Custom(p, f) => f(value, p),
        }
    }
}

#[derive(Clone, Copy)]
enum Bound {
    Exact,
    Lower,
    Upper,
}

impl Bound {
    fn check<T: PartialOrd>(self, actual: T, param: T) -> Result<(), RuleError> {
        match self {
            Bound::Exact if actual != param => Err(RuleError::Len),
            Bound::Lower if actual < param => Err(RuleError::Min),
            Bound::Upper if actual > param => Err(RuleError::Max),
            _ => Ok(()),
        }
    }
}

fn parse_param<T: std::str::FromStr>(param: &str) -> Result<T, RuleError> {
    param.parse().map_err(|_| RuleError::BadParameter)
}

fn compare(value: FieldValue<'_>, param: &str, bound: Bound) -> Result<(), RuleError> {
    match value {
        FieldValue::Null => Ok(()),
        FieldValue::Str(s) => bound.check(s.chars().count() as i64, parse_param(param)?),
        FieldValue::Seq(n) | FieldValue::Map(n) => bound.check(n as i64, parse_param(param)?),
        FieldValue::Int(v) => bound.check(v, parse_param(param)?),
        FieldValue::Uint(v) => bound.check(v, parse_param(param)?),
        FieldValue::Float(v) => bound.check(v, parse_param(param)?),
        FieldValue::Bool(_) | FieldValue::Record(_) | FieldValue::Opaque => {
            Err(RuleError::Unsupported)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(name: &str, param: &str) -> ParsedRule {
        ParsedRule {
            name: name.into(),
            param: param.into(),
        }
    }

    #[test]
    fn test_parse_rules_trims_and_splits() {
        assert_eq!(
            parse_rules(" nonzero , min = 2,max=6 "),
            vec![rule("nonzero", ""), rule("min", "2"), rule("max", "6")]
        );
        assert!(parse_rules("").is_empty());
        assert_eq!(parse_rules("len=5,"), vec![rule("len", "5")]);
    }

    #[test]
    fn test_parse_rules_escaped_comma() {
        assert_eq!(
            parse_rules(r"regexp=^a{1\,3}$,nonzero"),
            vec![rule("regexp", "^a{1,3}$"), rule("nonzero", "")]
        );
    }

    #[test]
    fn test_len_min_max_per_type() {
        let re = RegexCache::default();
        let len5 = Rule::Len("5".into());
        assert_eq!(len5.check(FieldValue::Str("12345"), &re), Ok(()));
        assert_eq!(len5.check(FieldValue::Str("héllo"), &re), Ok(()));
        assert_eq!(len5.check(FieldValue::Str("123456"), &re), Err(RuleError::Len));
        assert_eq!(len5.check(FieldValue::Seq(5), &re), Ok(()));
        assert_eq!(len5.check(FieldValue::Int(5), &re), Ok(()));

        let min2 = Rule::Min("2".into());
        assert_eq!(min2.check(FieldValue::Int(1), &re), Err(RuleError::Min));
        assert_eq!(min2.check(FieldValue::Uint(2), &re), Ok(()));
        let max6 = Rule::Max("6".into());
        assert_eq!(max6.check(FieldValue::Int(300), &re), Err(RuleError::Max));
        assert_eq!(max6.check(FieldValue::Map(7), &re), Err(RuleError::Max));

        let minf = Rule::Min("0.5".into());
        assert_eq!(minf.check(FieldValue::Float(0.25), &re), Err(RuleError::Min));
    }

    #[test]
    fn test_bad_parameter_and_unsupported() {
        let re = RegexCache::default();
        assert_eq!(
            Rule::Min("x".into()).check(FieldValue::Int(1), &re),
            Err(RuleError::BadParameter)
        );
        assert_eq!(
            Rule::Min("1.5".into()).check(FieldValue::Int(1), &re),
            Err(RuleError::BadParameter)
        );
        assert_eq!(
            Rule::Len("1".into()).check(FieldValue::Bool(true), &re),
            Err(RuleError::Unsupported)
        );
        assert_eq!(
            Rule::Regexp("a".into()).check(FieldValue::Int(1), &re),
            Err(RuleError::Unsupported)
        );
    }

    #[test]
    fn test_regexp() {
        let re = RegexCache::default();
        let digits = Rule::Regexp("^[0-9]+$".into());
        assert_eq!(digits.check(FieldValue::Str("123"), &re), Ok(()));
        assert_eq!(digits.check(FieldValue::Str("12a"), &re), Err(RuleError::Regexp));
        // second lookup hits the cache
        assert_eq!(digits.check(FieldValue::Str("9"), &re), Ok(()));
        assert_eq!(
            Rule::Regexp("(".into()).check(FieldValue::Str("x"), &re),
            Err(RuleError::BadParameter)
        );
    }

    #[test]
    fn test_null_only_fails_nonzero() {
        let re = RegexCache::default();
        assert_eq!(Rule::NonZero.check(FieldValue::Null, &re), Err(RuleError::ZeroValue));
        assert_eq!(Rule::Len("3".into()).check(FieldValue::Null, &re), Ok(()));
        assert_eq!(Rule::Regexp("x".into()).check(FieldValue::Null, &re), Ok(()));
    }
}
