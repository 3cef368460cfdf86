use std::error::Error as StdError;
use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    HtmlParse(String),
    XmlParse(String),
    ScriptParse(String),
    ScriptRuntime(String),
    ScriptThrow(String),
    Http(String),
    Xslt(String),
    Decode(String),
    AlertMismatch {
        expected: Vec<String>,
        actual: Vec<String>,
    },
    AssertionFailed {
        subject: String,
        expected: String,
        actual: String,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HtmlParse(msg) => write!(f, "html parse error: {msg}"),
            Self::XmlParse(msg) => write!(f, "xml parse error: {msg}"),
            Self::ScriptParse(msg) => write!(f, "script parse error: {msg}"),
            Self::ScriptRuntime(msg) => write!(f, "script runtime error: {msg}"),
            Self::ScriptThrow(msg) => write!(f, "uncaught script exception: {msg}"),
            Self::Http(msg) => write!(f, "http error: {msg}"),
            Self::Xslt(msg) => write!(f, "xslt error: {msg}"),
            Self::Decode(msg) => write!(f, "decode error: {msg}"),
            Self::AlertMismatch { expected, actual } => write!(
                f,
                "alert mismatch: expected [{}], actual [{}]",
                expected.join(", "),
                actual.join(", ")
            ),
            Self::AssertionFailed {
                subject,
                expected,
                actual,
            } => write!(
                f,
                "assertion failed for {subject}: expected {expected}, actual {actual}"
            ),
        }
    }
}

impl StdError for Error {}

impl Error {
    // Failures raised while a fixture script runs are observable inside the
    // page with try/catch; parse-phase failures are not.
    pub(crate) fn is_catchable(&self) -> bool {
        !matches!(
            self,
            Self::HtmlParse(_) | Self::XmlParse(_) | Self::ScriptParse(_)
        )
    }

    pub(crate) fn script_message(&self) -> String {
        match self {
            Self::ScriptRuntime(msg)
            | Self::ScriptThrow(msg)
            | Self::Http(msg)
            | Self::Xslt(msg)
            | Self::Decode(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

pub mod charset;
mod harness;
mod html;
pub mod http;
mod runtime;
mod script;
mod xhr;
pub mod xml;
mod xslt;

pub use harness::{Harness, LOAD_XML_DOCUMENT_FUNCTION, MockBrowser, SERIALIZE_DOCUMENT_FUNCTION};
pub use http::{MockWebConnection, WebRequest, WebResponse};
