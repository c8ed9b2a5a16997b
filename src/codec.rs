//! # Codec Module
//!
//! Ordered multi-valued parameter sets used for query strings, URL-encoded
//! bodies and request signing.
//!
//! [`Values`] keeps keys in lexicographic order and preserves the insertion
//! order of repeated values for one key, so two sets built from the same
//! contents always encode to the same string.
//!
//! ```rust
//! use nfweb::codec::Values;
//!
//! let mut v = Values::new();
//! v.add("b", "2");
//! v.add("a", "x y");
//! assert_eq!(v.encode(), "a=x+y&b=2");
//! assert_eq!(v.raw_encode(), "a=x y&b=2");
//! ```

use std::collections::btree_map;
use std::collections::BTreeMap;

use crate::crypto::md5_hex;

/// Ordered multimap of string parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Values {
    inner: BTreeMap<String, Vec<String>>,
}

impl Values {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an `application/x-www-form-urlencoded` string (a query string
    /// without the leading `?`, or a form body).
    #[must_use]
    pub fn parse(input: &str) -> Self {
        Self::parse_bytes(input.as_bytes())
    }

    #[must_use]
    pub fn parse_bytes(input: &[u8]) -> Self {
        url::form_urlencoded::parse(input)
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    /// First value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.inner
            .get(key)
            .and_then(|vs| vs.first())
            .map(String::as_str)
    }

    /// All values for `key` in insertion order.
    #[must_use]
    pub fn get_all(&self, key: &str) -> &[String] {
        self.inner.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }

    /// Append a value to `key`.
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.inner.entry(key.into()).or_default().push(value.into());
    }

    /// Replace all values of `key` with a single value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.inner.insert(key.into(), vec![value.into()]);
    }

    pub fn remove(&mut self, key: &str) -> Option<Vec<String>> {
        self.inner.remove(key)
    }

    /// Append every value of `other`, keeping `self`'s values first.
    pub fn merge(&mut self, other: Values) {
        for (k, vs) in other.inner {
            self.inner.entry(k).or_default().extend(vs);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Vec<String>> {
        self.inner.iter()
    }

    /// Percent-encode as `k=v&k=v`, keys sorted.
    #[must_use]
    pub fn encode(&self) -> String {
        let mut ser = url::form_urlencoded::Serializer::new(String::new());
        for (k, vs) in &self.inner {
            for v in vs {
                ser.append_pair(k, v);
            }
        }
        ser.finish()
    }

    /// Join as `k=v&k=v` without escaping, keys sorted.
    #[must_use]
    pub fn raw_encode(&self) -> String {
        let mut out = String::new();
        for (k, vs) in &self.inner {
            for v in vs {
                if !out.is_empty() {
                    out.push('&');
                }
                out.push_str(k);
                out.push('=');
                out.push_str(v);
            }
        }
        out
    }

    /// Lower-case hex MD5 of `raw_encode() + "&key=" + key`.
    #[must_use]
    pub fn md5_sign(&self, key: &str) -> String {
        let mut payload = self.raw_encode();
        payload.push_str("&key=");
        payload.push_str(key);
        md5_hex(payload.as_bytes())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Values {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut values = Values::new();
        for (k, v) in iter {
            values.add(k, v);
        }
        values
    }
}

impl<'a> IntoIterator for &'a Values {
    type Item = (&'a String, &'a Vec<String>);
    type IntoIter = btree_map::Iter<'a, String, Vec<String>>;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signing_sample() -> Values {
        let mut v = Values::new();
        v.add("dd", 800.to_string());
        v.add("c", "&3847384^dfdfnjdfnj");
        v.add("a", "bb");
        v
    }

    #[test]
    fn test_raw_encode_sorts_keys() {
        assert_eq!(
            signing_sample().raw_encode(),
            "a=bb&c=&3847384^dfdfnjdfnj&dd=800"
        );
    }

    #[test]
    fn test_md5_sign() {
        assert_eq!(
            signing_sample().md5_sign("3423742374823748327"),
            "a2fecac6295bdbd82989380ecd3166ea"
        );
    }

    #[test]
    fn test_repeated_values_keep_insertion_order() {
        let mut v = Values::new();
        v.add("k", "2");
        v.add("a", "z");
        v.add("k", "1");
        assert_eq!(v.raw_encode(), "a=z&k=2&k=1");
        assert_eq!(v.get("k"), Some("2"));
        assert_eq!(v.get_all("k"), ["2".to_string(), "1".to_string()]);
    }

    #[test]
    fn test_independent_sets_encode_identically() {
        let a: Values = vec![("x", "1"), ("y", "a b"), ("x", "2")].into_iter().collect();
        let mut b = Values::new();
        b.add("y", "a b");
        b.add("x", "1");
        b.add("x", "2");
        assert_eq!(a.encode(), b.encode());
        assert_eq!(a.encode(), "x=1&x=2&y=a+b");
    }

    #[test]
    fn test_parse_and_merge() {
        let mut q = Values::parse("a=bb&dd=800");
        q.merge(Values::parse("dd=900&e=%26"));
        assert_eq!(q.get_all("dd"), ["800".to_string(), "900".to_string()]);
        assert_eq!(q.get("e"), Some("&"));
    }
}
