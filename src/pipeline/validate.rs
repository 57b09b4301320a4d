//! Structural (well-formedness) validation.
//!
//! A single strict pass with `quick-xml`: no recovery, no lenient mode. On
//! top of what the reader enforces itself (matching end tags, attribute
//! syntax, entity references) the pass also requires exactly one root
//! element and no stray text outside it, which the XML grammar demands but
//! an event reader does not check. Whether the document is meaningful SVG is
//! deliberately not examined here.

use crate::error::ValidationError;
use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::debug;

/// Strict XML well-formedness check.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuralValidator;

impl StructuralValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate `content`, returning it unchanged on success.
    pub fn validate(&self, content: &[u8]) -> Result<String, ValidationError> {
        if content.iter().all(u8::is_ascii_whitespace) {
            return Err(ValidationError::EmptyContent);
        }
        let text = std::str::from_utf8(content).map_err(|e| malformed(format!("invalid UTF-8: {e}")))?;
        check_well_formed(text)?;
        debug!("Structural validation passed ({} bytes)", content.len());
        Ok(text.to_string())
    }
}

fn malformed(detail: impl Into<String>) -> ValidationError {
    ValidationError::MalformedStructure {
        detail: detail.into(),
    }
}

fn check_well_formed(text: &str) -> Result<(), ValidationError> {
    let mut reader = Reader::from_str(text);
    let mut open: Vec<String> = Vec::new();
    let mut roots = 0usize;

    loop {
        let event = reader.read_event().map_err(|e| {
            malformed(format!("{e} at position {}", reader.buffer_position()))
        })?;

        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                if open.is_empty() {
                    roots += 1;
                    if roots > 1 {
                        return Err(malformed(format!(
                            "second root element <{name}> at position {}",
                            reader.buffer_position()
                        )));
                    }
                }
                for attr in e.attributes() {
                    let attr = attr.map_err(|err| malformed(format!("bad attribute in <{name}>: {err}")))?;
                    attr.unescape_value()
                        .map_err(|err| malformed(format!("bad attribute value in <{name}>: {err}")))?;
                }
                if matches!(event, Event::Start(_)) {
                    open.push(name);
                }
            }
            Event::End(ref e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                match open.pop() {
                    Some(expected) if expected == name => {}
                    Some(expected) => {
                        return Err(malformed(format!(
                            "expected </{expected}>, found </{name}>"
                        )))
                    }
                    None => return Err(malformed(format!("unmatched end tag </{name}>"))),
                }
            }
            Event::Text(ref t) => {
                let value = t
                    .unescape()
                    .map_err(|err| malformed(format!("bad character data: {err}")))?;
                if open.is_empty() && !value.trim().is_empty() {
                    return Err(malformed("text outside the root element"));
                }
            }
            Event::CData(_) if open.is_empty() => {
                return Err(malformed("CDATA outside the root element"));
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(unclosed) = open.last() {
        return Err(malformed(format!("unexpected end of document: <{unclosed}> is not closed")));
    }
    if roots == 0 {
        return Err(malformed("no root element"));
    }
    Ok(())
}
