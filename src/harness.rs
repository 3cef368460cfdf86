use crate::html::{self, ParsedPage};
use crate::http::MockWebConnection;
use crate::runtime::{self, Page};
use crate::{Error, Result};

// Script helpers the fixture suites splice into their pages, mirroring the
// synchronous loading idiom the emulated engine's tests rely on.
pub const LOAD_XML_DOCUMENT_FUNCTION: &str = "\
function loadXMLDocument(url) {\n\
  var request = new XMLHttpRequest();\n\
  request.open('GET', url, false);\n\
  request.send('');\n\
  return request.responseXML;\n\
}\n";

pub const SERIALIZE_DOCUMENT_FUNCTION: &str = "\
function serializeXMLDocumentToString(doc) {\n\
  var serializer = new XMLSerializer();\n\
  return serializer.serializeToString(doc);\n\
}\n";

const DEFAULT_URL: &str = "http://first/";

pub struct Harness {
    page: Page,
}

impl Harness {
    pub fn from_html(html: &str) -> Result<Self> {
        Self::from_html_with_connection(DEFAULT_URL, html, MockWebConnection::new())
    }

    pub fn from_html_with_url(url: &str, html: &str) -> Result<Self> {
        Self::from_html_with_connection(url, html, MockWebConnection::new())
    }

    pub fn from_html_with_connection(
        url: &str,
        html: &str,
        connection: MockWebConnection,
    ) -> Result<Self> {
        let ParsedPage { dom, scripts } = html::parse_page(html)?;
        let mut harness = Self {
            page: Page::new(url, dom, connection),
        };
        for script in &scripts {
            runtime::run_script(&mut harness.page, script)?;
        }
        if let Some(onload) = harness.page.dom.body_onload() {
            runtime::run_script(&mut harness.page, &onload)?;
        }
        runtime::drain_tasks(&mut harness.page)?;
        Ok(harness)
    }

    pub fn alerts(&self) -> &[String] {
        &self.page.alerts
    }

    pub fn assert_alerts(&self, expected: &[&str]) -> Result<()> {
        if self.page.alerts.len() == expected.len()
            && self
                .page
                .alerts
                .iter()
                .zip(expected)
                .all(|(actual, wanted)| actual == wanted)
        {
            return Ok(());
        }
        Err(Error::AlertMismatch {
            expected: expected.iter().map(|s| s.to_string()).collect(),
            actual: self.page.alerts.clone(),
        })
    }

    pub fn run_script(&mut self, source: &str) -> Result<()> {
        self.page.trace_line(format!("[script] eval {} bytes", source.len()));
        runtime::run_script(&mut self.page, source)
    }

    pub fn drain_tasks(&mut self) -> Result<()> {
        runtime::drain_tasks(&mut self.page)
    }

    pub fn connection(&self) -> &MockWebConnection {
        &self.page.connection
    }

    pub fn connection_mut(&mut self) -> &mut MockWebConnection {
        &mut self.page.connection
    }

    pub fn into_connection(self) -> MockWebConnection {
        self.page.connection
    }

    pub fn enable_trace(&mut self, enabled: bool) {
        self.page.trace = enabled;
    }

    pub fn take_trace_logs(&mut self) -> Vec<String> {
        std::mem::take(&mut self.page.trace_logs)
    }

    pub fn set_trace_stderr(&mut self, enabled: bool) {
        self.page.trace_to_stderr = enabled;
    }

    pub fn set_trace_log_limit(&mut self, max_entries: usize) -> Result<()> {
        if max_entries == 0 {
            return Err(Error::ScriptRuntime(
                "set_trace_log_limit requires at least 1 entry".into(),
            ));
        }
        self.page.trace_log_limit = max_entries;
        while self.page.trace_logs.len() > self.page.trace_log_limit {
            self.page.trace_logs.remove(0);
        }
        Ok(())
    }

    pub fn set_task_step_limit(&mut self, max_steps: usize) -> Result<()> {
        if max_steps == 0 {
            return Err(Error::ScriptRuntime(
                "set_task_step_limit requires at least 1 step".into(),
            ));
        }
        self.page.task_step_limit = max_steps;
        Ok(())
    }
}

// Several pages sharing one response table and request log, the way a suite
// drives a second page against the server state the first one left behind.
#[derive(Default)]
pub struct MockBrowser {
    connection: MockWebConnection,
    page: Option<Harness>,
}

impl MockBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_mut(&mut self) -> &mut MockWebConnection {
        match &mut self.page {
            Some(page) => page.connection_mut(),
            None => &mut self.connection,
        }
    }

    pub fn open_page(&mut self, url: &str, html: &str) -> Result<&mut Harness> {
        let connection = match self.page.take() {
            Some(page) => page.into_connection(),
            None => std::mem::take(&mut self.connection),
        };
        let harness = Harness::from_html_with_connection(url, html, connection)?;
        Ok(self.page.insert(harness))
    }

    pub fn page(&self) -> Option<&Harness> {
        self.page.as_ref()
    }

    pub fn page_mut(&mut self) -> Option<&mut Harness> {
        self.page.as_mut()
    }
}
