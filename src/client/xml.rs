//! XML bodies exchanged with the Blob service.

use quick_xml::events::Event;
use quick_xml::Reader;

/// Code and message of a service error response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorBody {
    pub code: Option<String>,
    pub message: Option<String>,
}

/// Parses an `<Error><Code/><Message/></Error>` document. Unknown elements
/// are skipped; malformed XML yields whatever was read before the fault.
pub fn parse_error_body(xml: &str) -> ErrorBody {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut result = ErrorBody::default();
    let mut buf = Vec::new();
    let mut current_element: Option<String> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                current_element = Some(String::from_utf8_lossy(e.name().as_ref()).to_string());
            }
            Ok(Event::End(_)) => {
                current_element = None;
            }
            Ok(Event::Text(e)) => {
                let Ok(text) = e.unescape() else { break };
                match current_element.as_deref() {
                    Some("Code") => result.code = Some(text.trim().to_string()),
                    // The service appends RequestId and Time on further lines.
                    Some("Message") => {
                        result.message = text.lines().next().map(|l| l.trim().to_string())
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    result
}

/// Escapes special XML characters.
fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Serializes a Put Block List body committing `block_ids` in order.
pub fn serialize_block_list(block_ids: &[String]) -> String {
    let mut xml = String::from(r#"<?xml version="1.0" encoding="utf-8"?>"#);
    xml.push_str("<BlockList>");
    for id in block_ids {
        xml.push_str(&format!("<Latest>{}</Latest>", xml_escape(id)));
    }
    xml.push_str("</BlockList>");
    xml
}
