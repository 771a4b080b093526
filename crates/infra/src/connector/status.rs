//! Status attributes of QBXML response documents.
//!
//! Every `*Rs` element carries `statusCode`, `statusSeverity` and
//! `statusMessage`. The connector only looks at them to honour
//! `stopOnError`; the document body is the worker's business.

use quick_xml::events::Event;
use quick_xml::reader::Reader;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResponseStatus {
    /// Element carrying the status, e.g. `CustomerQueryRs`.
    pub element: String,
    pub code: Option<i32>,
    pub severity: String,
    pub message: Option<String>,
}

impl ResponseStatus {
    pub fn is_error(&self) -> bool {
        self.severity.eq_ignore_ascii_case("error")
    }
}

impl std::fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} returned {}", self.element, self.severity)?;
        if let Some(code) = self.code {
            write!(f, " {code}")?;
        }
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        Ok(())
    }
}

/// Every element in `xml` carrying a `statusSeverity`, in document order.
pub fn parse_statuses(xml: &str) -> Result<Vec<ResponseStatus>, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    let mut statuses = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(element) | Event::Empty(element) => {
                let mut code = None;
                let mut severity = None;
                let mut message = None;

                for attr in element.attributes().flatten() {
                    let value = attr.unescape_value()?.into_owned();
                    match attr.key.as_ref() {
                        b"statusCode" => code = value.trim().parse().ok(),
                        b"statusSeverity" => severity = Some(value),
                        b"statusMessage" => message = Some(value),
                        _ => {}
                    }
                }

                if let Some(severity) = severity {
                    statuses.push(ResponseStatus {
                        element: String::from_utf8_lossy(element.name().as_ref()).into_owned(),
                        code,
                        severity,
                        message,
                    });
                }
            }
            Event::Eof => return Ok(statuses),
            _ => {}
        }
    }
}

/// First error-severity status, if any. Unparseable documents yield `None`
/// and are left for the worker to deal with.
pub fn first_error(xml: &str) -> Option<ResponseStatus> {
    parse_statuses(xml)
        .ok()?
        .into_iter()
        .find(ResponseStatus::is_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    const OK_RESPONSE: &str = r#"<?xml version="1.0" ?>
<QBXML>
  <QBXMLMsgsRs>
    <CustomerQueryRs requestID="customers:1" statusCode="0" statusSeverity="Info" statusMessage="Status OK">
      <CustomerRet><Name>Alice</Name></CustomerRet>
    </CustomerQueryRs>
  </QBXMLMsgsRs>
</QBXML>"#;

    const ERROR_RESPONSE: &str = r#"<QBXML><QBXMLMsgsRs>
<InvoiceAddRs statusCode="3140" statusSeverity="Error" statusMessage="There is an invalid reference to &quot;Acme&quot;"/>
</QBXMLMsgsRs></QBXML>"#;

    #[test]
    fn reads_info_status() {
        let statuses = parse_statuses(OK_RESPONSE).unwrap();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].element, "CustomerQueryRs");
        assert_eq!(statuses[0].code, Some(0));
        assert!(!statuses[0].is_error());
        assert!(first_error(OK_RESPONSE).is_none());
    }

    #[test]
    fn finds_error_status_and_unescapes_message() {
        let status = first_error(ERROR_RESPONSE).unwrap();
        assert_eq!(status.code, Some(3140));
        assert_eq!(status.message.as_deref(), Some("There is an invalid reference to \"Acme\""));
        assert!(status.to_string().starts_with("InvoiceAddRs returned Error 3140"));
    }

    #[test]
    fn garbage_is_not_an_error_status() {
        assert!(first_error("not xml at all <<<").is_none());
        assert!(first_error("").is_none());
    }
}
