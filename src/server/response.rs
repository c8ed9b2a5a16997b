/// An outgoing HTTP response.
///
/// Header names keep the case they were set with; lookups are
/// case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Default for Response {
    fn default() -> Self {
        Self::new(200)
    }
}

impl Response {
    #[must_use]
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Plain-text response.
    #[must_use]
    pub fn text(status: u16, body: impl Into<String>) -> Self {
        let mut res = Self::new(status);
        res.set_header("Content-Type", "text/plain; charset=UTF-8");
        res.body = body.into().into_bytes();
        res
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Replace every header named `name` with a single value.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.into()));
    }

    pub fn add_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.push((name.to_string(), value.into()));
    }

    pub fn remove_header(&mut self, name: &str) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
    }

    /// Body as UTF-8 text, lossily.
    #[must_use]
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Set `Content-Length` from the body. Called once the response is final.
    pub fn finish(&mut self) {
        let len = self.body.len().to_string();
        self.set_header("Content-Length", len);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_header_replaces_case_insensitively() {
        let mut res = Response::new(200);
        res.add_header("x-a", "1");
        res.add_header("X-A", "2");
        res.set_header("X-a", "3");
        assert_eq!(res.headers.len(), 1);
        assert_eq!(res.header("x-A"), Some("3"));
    }

    #[test]
    fn test_finish_sets_content_length() {
        let mut res = Response::text(500, "boom");
        res.finish();
        assert_eq!(res.header("content-length"), Some("4"));
        assert_eq!(res.body_text(), "boom");
    }
}
