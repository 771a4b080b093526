//! QBXML requests: payload types, structured-to-XML rendering, and the
//! `<QBXML>` envelope sent to the Web Connector.

use core::fmt;
use core::str::FromStr;

use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use qbsync_core::DomainError;

/// Key of a structured object holding the attributes of its enclosing element.
pub const XML_ATTRIBUTES_KEY: &str = "xml_attributes";

/// Default `<?qbxml version?>` advertised in the envelope.
pub const DEFAULT_QBXML_VERSION: &str = "13.0";

/// One outbound request.
///
/// Serialized untagged so the run log stores exactly what the job asked for:
/// structured requests as their JSON tree, raw QBXML as a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Request {
    /// Pre-rendered QBXML (either a bare message body or a full document).
    Qbxml(String),
    /// JSON tree rendered to QBXML elements at send time.
    Structured(Value),
}

impl Request {
    pub fn structured(value: Value) -> Self {
        Self::Structured(value)
    }

    pub fn qbxml(body: impl Into<String>) -> Self {
        Self::Qbxml(body.into())
    }

    /// Render the message body (without the envelope).
    ///
    /// `request_id` is attached as a `requestID` attribute to every top-level
    /// element of a structured request that does not carry one already, so the
    /// response can be correlated with the job that issued it. Raw QBXML is
    /// left untouched.
    pub fn render_body(&self, request_id: Option<&str>) -> String {
        match self {
            Request::Qbxml(body) => body.clone(),
            Request::Structured(value) => {
                let mut out = String::new();
                write_root(&mut out, value, request_id);
                out
            }
        }
    }

    /// Render the full document sent to the desktop client.
    pub fn render(&self, envelope: &QbxmlEnvelope, request_id: Option<&str>) -> String {
        match self {
            Request::Qbxml(body) if has_qbxml_root(body) => body.clone(),
            _ => envelope.wrap(&self.render_body(request_id)),
        }
    }
}

impl From<Value> for Request {
    fn from(value: Value) -> Self {
        Self::Structured(value)
    }
}

impl From<String> for Request {
    fn from(value: String) -> Self {
        Self::Qbxml(value)
    }
}

impl From<&str> for Request {
    fn from(value: &str) -> Self {
        Self::Qbxml(value.to_string())
    }
}

/// What a job hands to the session: a single request or an ordered batch.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestSet {
    One(Request),
    Many(Vec<Request>),
}

impl RequestSet {
    /// Normalize to an ordered sequence (a single request becomes a
    /// one-element sequence).
    pub fn into_vec(self) -> Vec<Request> {
        match self {
            RequestSet::One(request) => vec![request],
            RequestSet::Many(requests) => requests,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            RequestSet::One(_) => 1,
            RequestSet::Many(requests) => requests.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Request> for RequestSet {
    fn from(value: Request) -> Self {
        Self::One(value)
    }
}

impl From<Vec<Request>> for RequestSet {
    fn from(value: Vec<Request>) -> Self {
        Self::Many(value)
    }
}

/// A JSON array becomes a batch of structured requests; anything else a
/// single one.
impl From<Value> for RequestSet {
    fn from(value: Value) -> Self {
        match value {
            Value::Array(items) => Self::Many(items.into_iter().map(Request::Structured).collect()),
            other => Self::One(Request::Structured(other)),
        }
    }
}

impl From<&str> for RequestSet {
    fn from(value: &str) -> Self {
        Self::One(Request::from(value))
    }
}

/// `onError` attribute of `<QBXMLMsgsRq>`: whether QuickBooks keeps processing
/// the remaining messages of a document after one of them fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OnError {
    #[default]
    StopOnError,
    ContinueOnError,
}

impl OnError {
    pub fn as_str(&self) -> &'static str {
        match self {
            OnError::StopOnError => "stopOnError",
            OnError::ContinueOnError => "continueOnError",
        }
    }
}

impl fmt::Display for OnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OnError {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['_', '-'], "").as_str() {
            "stoponerror" | "stop" => Ok(OnError::StopOnError),
            "continueonerror" | "continue" => Ok(OnError::ContinueOnError),
            other => Err(DomainError::validation(format!("unknown onError policy: {other}"))),
        }
    }
}

/// QBXML document envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QbxmlEnvelope {
    pub version: String,
    pub on_error: OnError,
}

impl Default for QbxmlEnvelope {
    fn default() -> Self {
        Self {
            version: DEFAULT_QBXML_VERSION.to_string(),
            on_error: OnError::default(),
        }
    }
}

impl QbxmlEnvelope {
    pub fn new(version: impl Into<String>, on_error: OnError) -> Self {
        Self {
            version: version.into(),
            on_error,
        }
    }

    pub fn wrap(&self, body: &str) -> String {
        format!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?><?qbxml version=\"{}\"?><QBXML><QBXMLMsgsRq onError=\"{}\">{}</QBXMLMsgsRq></QBXML>",
            escape(self.version.as_str()),
            self.on_error,
            body
        )
    }
}

/// `customer_query_rq` → `CustomerQueryRq`, `list_id` → `ListID`.
/// Names that already start upper-case are kept as written.
pub fn element_name(key: &str) -> String {
    if key.chars().next().is_some_and(|c| c.is_ascii_uppercase()) {
        return key.to_string();
    }

    key.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| match part {
            "id" => "ID".to_string(),
            "qbxml" => "QBXML".to_string(),
            _ => {
                let mut chars = part.chars();
                match chars.next() {
                    Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                    None => String::new(),
                }
            }
        })
        .collect()
}

fn write_root(out: &mut String, value: &Value, request_id: Option<&str>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                if key == XML_ATTRIBUTES_KEY {
                    continue;
                }
                let extra = match (child, request_id) {
                    (Value::Object(fields), Some(id)) if !has_attribute(fields, "requestID") => {
                        Some(("requestID", id))
                    }
                    _ => None,
                };
                write_element(out, &element_name(key), child, extra);
            }
        }
        Value::Array(items) => {
            for item in items {
                write_root(out, item, request_id);
            }
        }
        scalar => write_text(out, scalar),
    }
}

fn write_element(out: &mut String, name: &str, value: &Value, extra: Option<(&str, &str)>) {
    match value {
        Value::Array(items) => {
            for item in items {
                write_element(out, name, item, extra);
            }
        }
        Value::Object(map) => {
            out.push('<');
            out.push_str(name);
            if let Some(Value::Object(attrs)) = map.get(XML_ATTRIBUTES_KEY) {
                for (attr, attr_value) in attrs {
                    write_attribute(out, attr, &scalar_text(attr_value));
                }
            }
            if let Some((attr, attr_value)) = extra {
                write_attribute(out, attr, attr_value);
            }
            out.push('>');
            for (key, child) in map {
                if key == XML_ATTRIBUTES_KEY {
                    continue;
                }
                write_element(out, &element_name(key), child, None);
            }
            close_tag(out, name);
        }
        Value::Null => {
            out.push('<');
            out.push_str(name);
            out.push_str("/>");
        }
        scalar => {
            out.push('<');
            out.push_str(name);
            out.push('>');
            write_text(out, scalar);
            close_tag(out, name);
        }
    }
}

fn write_attribute(out: &mut String, name: &str, value: &str) {
    out.push(' ');
    out.push_str(name);
    out.push_str("=\"");
    out.push_str(&escape(value));
    out.push('"');
}

fn write_text(out: &mut String, value: &Value) {
    out.push_str(&escape(scalar_text(value).as_str()));
}

fn close_tag(out: &mut String, name: &str) {
    out.push_str("</");
    out.push_str(name);
    out.push('>');
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Whether the document's first element is the `<QBXML>` root itself.
fn has_qbxml_root(body: &str) -> bool {
    let mut reader = Reader::from_str(body);
    loop {
        match reader.read_event() {
            Ok(Event::Start(element)) | Ok(Event::Empty(element)) => {
                return element.name().as_ref() == b"QBXML";
            }
            Ok(Event::Eof) | Err(_) => return false,
            Ok(_) => {}
        }
    }
}

fn has_attribute(fields: &Map<String, Value>, name: &str) -> bool {
    matches!(fields.get(XML_ATTRIBUTES_KEY), Some(Value::Object(attrs)) if attrs.contains_key(name))
}
