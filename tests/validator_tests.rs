use std::sync::Arc;

use nfweb::validator::{FieldValue, RuleError, Validator};
use nfweb::{Bind, FormData, Validate};
use serde::{Deserialize, Serialize};

#[derive(Validate, Debug, Default, Clone, Serialize, Deserialize)]
pub struct Address {
    #[validate("nonzero")]
    pub city: String,
    #[validate("len=5")]
    pub zip: String,
}

#[derive(Validate, Debug, Default, Clone, Serialize, Deserialize)]
pub struct Profile {
    #[validate("min=3,max=12")]
    pub name: String,
    #[validate("min=1,max=120")]
    pub age: u8,
    #[validate("regexp=^[a-z]+@[a-z]+\\.[a-z]{2\\,3}$")]
    pub email: String,
    #[validate("max=3")]
    pub tags: Vec<String>,
    pub home: Address,
    // Private records are not recursed into.
    work: Address,
    #[validate("-")]
    pub ignored: String,
    #[validate("min=10")]
    pub score: Option<i64>,
}

fn valid_profile() -> Profile {
    Profile {
        name: "alice".into(),
        age: 30,
        email: "alice@example.org".into(),
        tags: vec!["a".into()],
        home: Address {
            city: "Oslo".into(),
            zip: "01234".into(),
        },
        work: Address::default(),
        ignored: String::new(),
        score: None,
    }
}

#[test]
fn test_valid_record_passes() {
    let v = Validator::new();
    assert!(v.validate(&valid_profile()).is_ok());
}

#[test]
fn test_errors_follow_declaration_order() {
    let v = Validator::new();
    let mut p = valid_profile();
    p.name = "al".into();
    p.email = "not-an-email".into();
    p.tags = vec!["a".into(), "b".into(), "c".into(), "d".into()];
    p.home.zip = "123".into();
    p.score = Some(3);

    let errors = v.validate(&p).unwrap_err();
    let fields: Vec<&str> = errors.fields().collect();
    assert_eq!(fields, ["name", "email", "tags", "home.zip", "score"]);
    assert_eq!(errors.get("name"), Some(&[RuleError::Min][..]));
    assert_eq!(errors.get("email"), Some(&[RuleError::Regexp][..]));
    assert_eq!(errors.get("tags"), Some(&[RuleError::Max][..]));
    assert_eq!(errors.get("home.zip"), Some(&[RuleError::Len][..]));
    assert_eq!(errors.get("score"), Some(&[RuleError::Min][..]));
}

#[test]
fn test_round_trip_json_stays_valid() {
    let v = Validator::new();
    let p = valid_profile();
    let encoded = serde_json::to_string(&p).unwrap();
    let decoded: Profile = serde_json::from_str(&encoded).unwrap();
    assert!(v.validate(&decoded).is_ok());
}

#[test]
fn test_validation_is_idempotent() {
    let v = Validator::new();
    let mut p = valid_profile();
    p.age = 0;
    let first = v.validate(&p);
    for _ in 0..5 {
        assert_eq!(v.validate(&p), first);
    }
    assert!(v.validate(&valid_profile()).is_ok());
    assert!(v.validate(&valid_profile()).is_ok());
}

#[derive(Validate, Default)]
pub struct Custom {
    #[validate("even,min=2")]
    pub count: i64,
    #[validate("nonzero,frobnicate=3,max=1")]
    pub unknown: String,
}

#[test]
fn test_custom_and_unknown_rules() {
    let v = Validator::new();
    v.register(
        "even",
        Some(Arc::new(|value: FieldValue<'_>, _param: &str| match value {
            FieldValue::Int(i) if i % 2 == 0 => Ok(()),
            FieldValue::Int(_) => Err(RuleError::Invalid),
            _ => Err(RuleError::Unsupported),
        })),
    );

    let errors = v
        .validate(&Custom {
            count: 3,
            unknown: String::new(),
        })
        .unwrap_err();
    assert_eq!(errors.get("count"), Some(&[RuleError::Invalid][..]));
    assert_eq!(errors.get("unknown"), Some(&[RuleError::UnknownTag][..]));

    v.register("even", None);
    let errors = v
        .validate(&Custom {
            count: 4,
            unknown: "x".into(),
        })
        .unwrap_err();
    assert_eq!(errors.get("count"), Some(&[RuleError::UnknownTag][..]));
}

#[derive(Bind, Debug, Default)]
pub struct Page {
    #[form("page")]
    pub number: u32,
    #[form("size")]
    pub size: Option<u32>,
}

#[derive(Bind, Debug, Default)]
pub struct Filter {
    #[form("q")]
    pub query: String,
    #[form("tag")]
    pub tags: Vec<String>,
    #[form(flatten)]
    pub page: Option<Box<Page>>,
    #[form(skip)]
    pub cache_key: String,
    pub active: bool,
}

fn form(pairs: &[(&str, &str)]) -> FormData {
    FormData::from_values(pairs.iter().copied().collect())
}

#[test]
fn test_bind_derive() {
    let mut f = Filter::default();
    assert!(f.bind(&form(&[
        ("q", "rust"),
        ("tag", "a"),
        ("tag", "b"),
        ("page", "3"),
        ("cache_key", "nope"),
        ("active", "T"),
    ])));
    assert_eq!(f.query, "rust");
    assert_eq!(f.tags, ["a", "b"]);
    assert_eq!(f.page.as_ref().map(|p| p.number), Some(3));
    assert_eq!(f.page.as_ref().and_then(|p| p.size), None);
    assert!(f.cache_key.is_empty());
    assert!(f.active);
}

#[test]
fn test_embedded_record_left_unset_when_absent() {
    let mut f = Filter::default();
    assert!(f.bind(&form(&[("q", "x")])));
    assert!(f.page.is_none());
    assert!(!Filter::default().bind(&form(&[])));
}

#[derive(Bind, Debug, Default)]
pub struct Tagged {
    #[form("a,omitempty")]
    pub a: String,
    #[form(",omitempty")]
    pub count: i32,
    #[form(" limit , omitempty")]
    pub max: u32,
}

#[test]
fn test_bind_uses_first_tag_segment() {
    let mut t = Tagged::default();
    assert!(t.bind(&form(&[("a", "hello"), ("count", "4"), ("limit", "9")])));
    assert_eq!(t.a, "hello");
    assert_eq!(t.count, 4);
    assert_eq!(t.max, 9);

    let mut t = Tagged::default();
    assert!(!t.bind(&form(&[("a,omitempty", "nope"), ("max", "1")])));
    assert!(t.a.is_empty());
    assert_eq!(t.max, 0);
}

#[test]
fn test_embedded_record_reset_when_bound_to_zero() {
    let mut f = Filter::default();
    assert!(f.bind(&form(&[("q", "x"), ("page", "0")])));
    assert!(f.page.is_none());

    let mut f = Filter::default();
    f.bind(&form(&[("size", "0")]));
    assert_eq!(f.page.as_ref().and_then(|p| p.size), Some(0));
}

#[test]
fn test_derived_zero_check() {
    assert!(Page::default().is_zero());
    assert!(!Page { number: 1, size: None }.is_zero());
    assert!(Filter {
        cache_key: "ignored".into(),
        ..Filter::default()
    }
    .is_zero());
}
