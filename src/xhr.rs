use crate::charset;
use crate::http::{WebRequest, WebResponse, resolve_url};
use crate::xml::{self, XmlDocument};
use crate::{Error, Result};

pub(crate) const UNSENT: u32 = 0;
pub(crate) const OPENED: u32 = 1;
pub(crate) const HEADERS_RECEIVED: u32 = 2;
pub(crate) const LOADING: u32 = 3;
pub(crate) const DONE: u32 = 4;

const FORBIDDEN_METHODS: &[&str] = &["CONNECT", "TRACE", "TRACK"];
const NORMALIZED_METHODS: &[&str] = &["DELETE", "GET", "HEAD", "OPTIONS", "POST", "PUT"];

#[derive(Clone, Debug)]
pub(crate) enum XhrBody {
    Text(String),
    Bytes(Vec<u8>),
    Blob {
        bytes: Vec<u8>,
        content_type: Option<String>,
    },
}

// One XMLHttpRequest instance. The harness drives the state walk and
// fires script callbacks between transitions; this struct only tracks
// protocol state.
#[derive(Debug, Default)]
pub(crate) struct XhrInstance {
    ready_state: u32,
    method: String,
    url: String,
    is_async: bool,
    request_headers: Vec<(String, String)>,
    override_mime: Option<String>,
    response: Option<WebResponse>,
    send_flag: bool,
}

impl XhrInstance {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ready_state(&self) -> u32 {
        self.ready_state
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_async(&self) -> bool {
        self.is_async
    }

    pub fn open(&mut self, method: &str, url: &str, is_async: bool, base_url: &str) -> Result<()> {
        let normalized = normalize_method(method)?;
        self.method = normalized;
        self.url = resolve_url(base_url, url);
        self.is_async = is_async;
        self.request_headers.clear();
        self.response = None;
        self.send_flag = false;
        self.ready_state = OPENED;
        Ok(())
    }

    pub fn set_request_header(&mut self, name: &str, value: &str) -> Result<()> {
        if self.ready_state != OPENED || self.send_flag {
            return Err(Error::ScriptRuntime(
                "InvalidStateError: setRequestHeader requires an opened, unsent request"
                    .to_string(),
            ));
        }
        let value = value.trim();
        for (existing, slot) in &mut self.request_headers {
            if existing.eq_ignore_ascii_case(name) {
                slot.push_str(", ");
                slot.push_str(value);
                return Ok(());
            }
        }
        self.request_headers.push((name.to_string(), value.to_string()));
        Ok(())
    }

    pub fn override_mime_type(&mut self, mime: &str) -> Result<()> {
        if self.ready_state >= LOADING {
            return Err(Error::ScriptRuntime(
                "InvalidStateError: overrideMimeType after loading started".to_string(),
            ));
        }
        self.override_mime = Some(mime.trim().to_string());
        Ok(())
    }

    pub fn prepare_send(&mut self, body: Option<XhrBody>) -> Result<WebRequest> {
        if self.ready_state != OPENED || self.send_flag {
            return Err(Error::ScriptRuntime(
                "InvalidStateError: send requires an opened, unsent request".to_string(),
            ));
        }
        self.send_flag = true;

        let mut request = WebRequest::new(&self.method, &self.url);
        for (name, value) in &self.request_headers {
            request.add_header(name, value);
        }

        let body = if self.method == "GET" || self.method == "HEAD" {
            None
        } else {
            body
        };
        if let Some(body) = body {
            let has_content_type = request.header("Content-Type").is_some();
            match body {
                XhrBody::Text(text) => {
                    if !has_content_type {
                        request.add_header("Content-Type", "text/plain;charset=UTF-8");
                    }
                    request.set_body(text.into_bytes());
                }
                XhrBody::Bytes(bytes) => {
                    request.set_body(bytes);
                }
                XhrBody::Blob { bytes, content_type } => {
                    if !has_content_type {
                        if let Some(content_type) = content_type {
                            if !content_type.is_empty() {
                                request.add_header("Content-Type", &content_type);
                            }
                        }
                    }
                    request.set_body(bytes);
                }
            }
        }
        Ok(request)
    }

    pub fn receive_headers(&mut self, response: WebResponse) {
        self.response = Some(response);
        self.ready_state = HEADERS_RECEIVED;
    }

    pub fn mark_loading(&mut self) {
        self.ready_state = LOADING;
    }

    pub fn mark_done(&mut self) {
        self.ready_state = DONE;
    }

    pub fn abort(&mut self) {
        self.response = None;
        self.send_flag = false;
        self.ready_state = UNSENT;
    }

    pub fn status(&self) -> u32 {
        if self.ready_state < HEADERS_RECEIVED {
            return 0;
        }
        self.response.as_ref().map_or(0, |r| u32::from(r.status()))
    }

    pub fn status_text(&self) -> String {
        if self.ready_state < HEADERS_RECEIVED {
            return String::new();
        }
        self.response
            .as_ref()
            .map(|r| r.status_text().to_string())
            .unwrap_or_default()
    }

    pub fn get_response_header(&self, name: &str) -> Option<String> {
        let response = self.response.as_ref()?;
        let matching: Vec<&str> = response
            .headers()
            .iter()
            .filter(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
            .collect();
        if matching.is_empty() {
            None
        } else {
            Some(matching.join(", "))
        }
    }

    pub fn get_all_response_headers(&self) -> String {
        let Some(response) = self.response.as_ref() else {
            return String::new();
        };
        let mut out = String::new();
        for (name, value) in response.headers() {
            // Cookie headers stay off the script-visible listing.
            if name.eq_ignore_ascii_case("set-cookie") || name.eq_ignore_ascii_case("set-cookie2")
            {
                continue;
            }
            out.push_str(name);
            out.push_str(": ");
            out.push_str(value);
            out.push_str("\r\n");
        }
        out
    }

    fn effective_mime(&self) -> Option<String> {
        if let Some(mime) = &self.override_mime {
            return Some(mime.clone());
        }
        self.response
            .as_ref()
            .and_then(|r| r.content_type())
            .map(str::to_string)
    }

    pub fn response_text(&self) -> String {
        let Some(response) = self.response.as_ref() else {
            return String::new();
        };
        let charset = self
            .effective_mime()
            .and_then(|mime| charset::charset_from_content_type(&mime));
        let (text, _) = charset::decode_body(response.body(), charset.as_deref());
        text
    }

    pub fn response_xml(&self) -> Option<XmlDocument> {
        if self.ready_state != DONE {
            return None;
        }
        let response = self.response.as_ref()?;
        let mime = self.effective_mime().unwrap_or_default();
        if !mime.is_empty() && !is_xml_mime(&mime) {
            return None;
        }
        let charset = charset::charset_from_content_type(&mime);
        let (text, _) = charset::decode_xml_bytes(response.body(), charset.as_deref());
        xml::parse_document(&text).ok()
    }
}

fn normalize_method(method: &str) -> Result<String> {
    if method.is_empty()
        || !method
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b))
    {
        return Err(Error::ScriptRuntime(format!(
            "SyntaxError: invalid request method '{method}'"
        )));
    }
    let upper = method.to_ascii_uppercase();
    if FORBIDDEN_METHODS.contains(&upper.as_str()) {
        return Err(Error::ScriptRuntime(format!(
            "SecurityError: request method '{method}' is forbidden"
        )));
    }
    if NORMALIZED_METHODS.contains(&upper.as_str()) {
        Ok(upper)
    } else {
        Ok(method.to_string())
    }
}

pub(crate) fn is_xml_mime(mime: &str) -> bool {
    let essence = mime.split(';').next().unwrap_or("").trim();
    essence.eq_ignore_ascii_case("text/xml")
        || essence.eq_ignore_ascii_case("application/xml")
        || essence
            .rsplit_once('+')
            .is_some_and(|(_, suffix)| suffix.eq_ignore_ascii_case("xml"))
}
