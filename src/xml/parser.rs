use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::{XmlDocument, XmlElement, XmlMisc, XmlNode};
use crate::error::{Error, Result};

const BOM: char = '\u{feff}';

/// Parses raw entry bytes, tolerating a leading UTF-8 byte order mark.
pub fn parse_bytes(bytes: &[u8]) -> Result<XmlDocument> {
    let text = std::str::from_utf8(bytes).map_err(|err| Error::Parse(err.to_string()))?;
    parse_str(text)
}

pub fn parse_str(xml: &str) -> Result<XmlDocument> {
    let xml = xml.strip_prefix(BOM).unwrap_or(xml);
    let mut reader = Reader::from_str(xml);

    let mut declaration = false;
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;
    let mut prolog = Vec::new();
    let mut epilog = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Decl(_) => declaration = true,
            Event::Start(ref e) => stack.push(parse_element(e)?),
            Event::Empty(ref e) => {
                let element = parse_element(e)?;
                close_element(&mut stack, &mut root, element)?;
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| Error::Parse("unexpected closing tag".to_string()))?;
                close_element(&mut stack, &mut root, element)?;
            }
            Event::Text(e) => {
                let text = e.unescape().map_err(|err| Error::Parse(err.to_string()))?;
                push_text(&mut stack, &text);
            }
            Event::CData(e) => {
                let text = String::from_utf8_lossy(&e);
                push_text(&mut stack, &text);
            }
            Event::Comment(e) => {
                let text = String::from_utf8_lossy(&e).trim().to_string();
                match stack.last_mut() {
                    Some(parent) => parent.children.push(XmlNode::Comment(text)),
                    None if root.is_none() => prolog.push(XmlMisc::Comment(text)),
                    None => epilog.push(XmlMisc::Comment(text)),
                }
            }
            Event::PI(e) => {
                let text = String::from_utf8_lossy(&e).to_string();
                match stack.last() {
                    Some(parent) => {
                        return Err(Error::Parse(format!(
                            "processing instruction <?{text}?> inside <{}>",
                            parent.name
                        )))
                    }
                    None if root.is_none() => prolog.push(XmlMisc::Instruction(text)),
                    None => epilog.push(XmlMisc::Instruction(text)),
                }
            }
            Event::DocType(e) => {
                if !stack.is_empty() || root.is_some() {
                    return Err(Error::Parse("DOCTYPE after the root element".to_string()));
                }
                prolog.push(XmlMisc::Doctype(String::from_utf8_lossy(&e).trim().to_string()));
            }
            Event::Eof => break,
        }
    }

    if !stack.is_empty() {
        return Err(Error::Parse(format!(
            "unclosed element <{}>",
            stack.last().map(|e| e.name.as_str()).unwrap_or_default()
        )));
    }
    let root = root.ok_or_else(|| Error::Parse("document has no root element".to_string()))?;
    Ok(XmlDocument {
        declaration,
        prolog,
        root,
        epilog,
    })
}

fn parse_element(e: &BytesStart<'_>) -> Result<XmlElement> {
    let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
    let mut element = XmlElement::new(name);
    for attr in e.attributes() {
        let attr = attr.map_err(|err| Error::Parse(format!("attribute error: {err}")))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        let value = attr
            .unescape_value()
            .map_err(|err| Error::Parse(err.to_string()))?
            .to_string();
        element.attributes.push((key, value));
    }
    Ok(element)
}

fn close_element(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(XmlNode::Element(element));
            Ok(())
        }
        None if root.is_none() => {
            *root = Some(element);
            Ok(())
        }
        None => Err(Error::Parse(format!(
            "second root element <{}>",
            element.name
        ))),
    }
}

/// Whitespace-only runs are layout and are dropped; any other text is kept
/// exactly, surrounding whitespace included.
fn push_text(stack: &mut [XmlElement], text: &str) {
    let Some(parent) = stack.last_mut() else {
        return;
    };
    if text.trim().is_empty() {
        return;
    }
    if let Some(XmlNode::Text(existing)) = parent.children.last_mut() {
        existing.push_str(text);
        return;
    }
    parent.children.push(XmlNode::Text(text.to_string()));
}
