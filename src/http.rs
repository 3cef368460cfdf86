use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebRequest {
    method: String,
    url: String,
    headers: Vec<(String, String)>,
    body: Option<Vec<u8>>,
}

impl WebRequest {
    pub(crate) fn new(method: &str, url: &str) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            url: url.to_string(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub(crate) fn add_header(&mut self, name: &str, value: &str) {
        for (existing, existing_value) in &mut self.headers {
            if existing.eq_ignore_ascii_case(name) {
                // Repeated request headers combine into one comma-joined value.
                existing_value.push_str(", ");
                existing_value.push_str(value);
                return;
            }
        }
        self.headers.push((name.to_string(), value.to_string()));
    }

    pub(crate) fn set_body(&mut self, body: Vec<u8>) {
        self.body = Some(body);
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    pub fn body_as_text(&self) -> Option<String> {
        self.body
            .as_ref()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebResponse {
    status: u16,
    status_text: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl WebResponse {
    pub fn new(status: u16, headers: Vec<(String, String)>, body: Vec<u8>) -> Self {
        Self {
            status,
            status_text: default_status_text(status).to_string(),
            headers,
            body,
        }
    }

    pub fn ok_with_content_type(body: &[u8], content_type: &str) -> Self {
        Self::new(
            200,
            vec![("Content-Type".to_string(), content_type.to_string())],
            body.to_vec(),
        )
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn status_text(&self) -> &str {
        &self.status_text
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("Content-Type")
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

fn default_status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockWebConnection {
    responses: Vec<(String, WebResponse)>,
    default_response: Option<WebResponse>,
    failures: Vec<String>,
    requests: Vec<WebRequest>,
}

impl MockWebConnection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_response(&mut self, url: &str, body: &str, content_type: &str) {
        self.set_raw_response(url, WebResponse::ok_with_content_type(body.as_bytes(), content_type));
    }

    pub fn set_response_bytes(&mut self, url: &str, body: &[u8], content_type: &str) {
        self.set_raw_response(url, WebResponse::ok_with_content_type(body, content_type));
    }

    pub fn set_response_with_status(
        &mut self,
        url: &str,
        status: u16,
        headers: Vec<(String, String)>,
        body: &[u8],
    ) {
        self.set_raw_response(url, WebResponse::new(status, headers, body.to_vec()));
    }

    pub fn set_raw_response(&mut self, url: &str, response: WebResponse) {
        if let Some(slot) = self
            .responses
            .iter_mut()
            .find(|(existing, _)| existing == url)
        {
            slot.1 = response;
        } else {
            self.responses.push((url.to_string(), response));
        }
    }

    pub fn set_default_response(&mut self, body: &str, content_type: &str) {
        self.default_response = Some(WebResponse::ok_with_content_type(
            body.as_bytes(),
            content_type,
        ));
    }

    // Requests to this URL fail at the connection level instead of
    // producing a response.
    pub fn set_failure(&mut self, url: &str) {
        self.failures.push(url.to_string());
    }

    pub(crate) fn fetch(&mut self, request: WebRequest) -> Result<WebResponse> {
        let url = request.url.clone();
        self.requests.push(request);
        if self.failures.iter().any(|failing| *failing == url) {
            return Err(Error::Http(format!("connection failed for {url}")));
        }
        if let Some((_, response)) = self.responses.iter().find(|(existing, _)| *existing == url) {
            return Ok(response.clone());
        }
        if let Some(response) = &self.default_response {
            return Ok(response.clone());
        }
        Ok(WebResponse::new(404, Vec::new(), Vec::new()))
    }

    pub fn requests(&self) -> &[WebRequest] {
        &self.requests
    }

    pub fn request_count(&self) -> usize {
        self.requests.len()
    }

    pub fn last_request(&self) -> Option<&WebRequest> {
        self.requests.last()
    }

    pub fn expect_last_request_url(&self, expected: &str) -> Result<()> {
        let actual = self
            .last_request()
            .map(WebRequest::url)
            .unwrap_or_default();
        if actual == expected {
            Ok(())
        } else {
            Err(Error::AssertionFailed {
                subject: "last request url".into(),
                expected: expected.to_string(),
                actual: actual.to_string(),
            })
        }
    }
}

// Enough RFC 3986 reference resolution for fixture-relative fetches.
// Fragments never reach the wire.
pub(crate) fn resolve_url(base: &str, target: &str) -> String {
    let target = target.split('#').next().unwrap_or("");
    let base = base.split('#').next().unwrap_or("");
    if target.is_empty() {
        return base.to_string();
    }
    if has_scheme(target) {
        return target.to_string();
    }
    let Some((scheme, rest)) = base.split_once("://") else {
        return target.to_string();
    };
    let (authority, base_path_query) = match rest.find('/') {
        Some(at) => (&rest[..at], &rest[at..]),
        None => (rest, "/"),
    };
    let origin = format!("{scheme}://{authority}");
    if let Some(schemeless) = target.strip_prefix("//") {
        return format!("{scheme}://{schemeless}");
    }
    let base_path = base_path_query.split('?').next().unwrap_or("/");
    if target.starts_with('?') {
        return format!("{origin}{base_path}{target}");
    }
    let (raw_path, query) = match target.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (target, None),
    };
    let merged = if raw_path.starts_with('/') {
        raw_path.to_string()
    } else {
        let dir_end = base_path.rfind('/').map_or(0, |i| i + 1);
        format!("{}{raw_path}", &base_path[..dir_end])
    };
    let normalized = normalize_path(&merged);
    match query {
        Some(query) => format!("{origin}{normalized}?{query}"),
        None => format!("{origin}{normalized}"),
    }
}

fn has_scheme(target: &str) -> bool {
    let Some(colon) = target.find(':') else {
        return false;
    };
    if target.find('/').is_some_and(|slash| slash < colon) {
        return false;
    }
    let scheme = &target[..colon];
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && scheme[1..]
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.')
}

fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/').skip(1) {
        match segment {
            "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    let mut out = String::new();
    for segment in &segments {
        out.push('/');
        out.push_str(segment);
    }
    if out.is_empty() || (path.ends_with("/.") || path.ends_with("/..")) {
        out.push('/');
        if let Some(stripped) = out.strip_suffix("//") {
            return stripped.to_string();
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_response_is_served_and_request_recorded() {
        let mut connection = MockWebConnection::new();
        connection.set_response("http://mock.local/foo.xml", "<a/>", "text/xml");

        let response = connection
            .fetch(WebRequest::new("get", "http://mock.local/foo.xml"))
            .unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.status_text(), "OK");
        assert_eq!(response.content_type(), Some("text/xml"));
        assert_eq!(response.body(), b"<a/>");

        assert_eq!(connection.request_count(), 1);
        let request = connection.last_request().unwrap();
        assert_eq!(request.method(), "GET");
        assert_eq!(request.url(), "http://mock.local/foo.xml");
    }

    #[test]
    fn missing_url_falls_back_to_default_then_404() {
        let mut connection = MockWebConnection::new();
        let miss = connection
            .fetch(WebRequest::new("GET", "http://mock.local/nope"))
            .unwrap();
        assert_eq!(miss.status(), 404);
        assert_eq!(miss.status_text(), "Not Found");

        connection.set_default_response("fallback", "text/plain");
        let fallback = connection
            .fetch(WebRequest::new("GET", "http://mock.local/other"))
            .unwrap();
        assert_eq!(fallback.status(), 200);
        assert_eq!(fallback.body(), b"fallback");
        assert_eq!(connection.request_count(), 2);
    }

    #[test]
    fn re_registering_a_url_replaces_the_response() {
        let mut connection = MockWebConnection::new();
        connection.set_response("http://mock.local/a", "one", "text/plain");
        connection.set_response("http://mock.local/a", "two", "text/plain");
        let response = connection
            .fetch(WebRequest::new("GET", "http://mock.local/a"))
            .unwrap();
        assert_eq!(response.body(), b"two");
    }

    #[test]
    fn injected_failures_error_but_still_record_the_request() {
        let mut connection = MockWebConnection::new();
        connection.set_failure("http://mock.local/down");
        let result = connection.fetch(WebRequest::new("GET", "http://mock.local/down"));
        assert!(matches!(result, Err(Error::Http(_))));
        assert_eq!(connection.request_count(), 1);
    }

    #[test]
    fn duplicate_request_headers_merge_comma_joined() {
        let mut request = WebRequest::new("POST", "http://mock.local/a");
        request.add_header("X-Tag", "one");
        request.add_header("x-tag", "two");
        assert_eq!(request.header("X-TAG"), Some("one, two"));
        assert_eq!(request.headers().len(), 1);
    }

    #[test]
    fn relative_references_resolve_against_the_base() {
        let base = "http://mock.local/dir/page.html";
        assert_eq!(resolve_url(base, "data.xml"), "http://mock.local/dir/data.xml");
        assert_eq!(resolve_url(base, "./data.xml"), "http://mock.local/dir/data.xml");
        assert_eq!(resolve_url(base, "../up.xml"), "http://mock.local/up.xml");
        assert_eq!(resolve_url(base, "/root.xml"), "http://mock.local/root.xml");
        assert_eq!(resolve_url(base, "?q=1"), "http://mock.local/dir/page.html?q=1");
        assert_eq!(resolve_url(base, "a/b.xml?x=2"), "http://mock.local/dir/a/b.xml?x=2");
        assert_eq!(
            resolve_url(base, "https://other.example/x"),
            "https://other.example/x"
        );
        assert_eq!(resolve_url(base, "//cdn.local/y"), "http://cdn.local/y");
        assert_eq!(resolve_url(base, "frag.xml#sec"), "http://mock.local/dir/frag.xml");
        assert_eq!(resolve_url(base, ""), base);
        assert_eq!(resolve_url(base, "../../../deep.xml"), "http://mock.local/deep.xml");
    }
}
