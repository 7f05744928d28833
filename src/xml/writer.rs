use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use super::{XmlDocument, XmlElement, XmlMisc, XmlNode};
use crate::error::{Error, Result};

/// Serializes a document with tab indentation, the layout the game ships.
pub fn to_string(doc: &XmlDocument) -> Result<String> {
    let bytes = to_bytes(doc)?;
    String::from_utf8(bytes).map_err(|err| Error::Write(err.to_string()))
}

pub fn to_bytes(doc: &XmlDocument) -> Result<Vec<u8>> {
    let mut writer = Writer::new_with_indent(Vec::new(), b'\t', 1);
    if doc.declaration {
        write(
            &mut writer,
            Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)),
        )?;
    }
    for misc in &doc.prolog {
        write_misc(&mut writer, misc)?;
    }
    write_element(&mut writer, &doc.root)?;
    for misc in &doc.epilog {
        write_misc(&mut writer, misc)?;
    }
    let mut bytes = writer.into_inner();
    bytes.push(b'\n');
    Ok(bytes)
}

fn write_element(writer: &mut Writer<Vec<u8>>, element: &XmlElement) -> Result<()> {
    let mut start = BytesStart::new(element.name.as_str());
    for (key, value) in &element.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }
    if element.children.is_empty() {
        return write(writer, Event::Empty(start));
    }

    write(writer, Event::Start(start))?;
    for child in &element.children {
        match child {
            XmlNode::Element(child) => write_element(writer, child)?,
            XmlNode::Text(text) => write(writer, Event::Text(BytesText::new(text)))?,
            XmlNode::Comment(text) => write(
                writer,
                Event::Comment(BytesText::from_escaped(format!(" {text} "))),
            )?,
        }
    }
    write(writer, Event::End(BytesEnd::new(element.name.as_str())))
}

fn write_misc(writer: &mut Writer<Vec<u8>>, misc: &XmlMisc) -> Result<()> {
    let event = match misc {
        XmlMisc::Comment(text) => Event::Comment(BytesText::from_escaped(format!(" {text} "))),
        XmlMisc::Instruction(text) => Event::PI(BytesText::from_escaped(text.as_str())),
        XmlMisc::Doctype(text) => Event::DocType(BytesText::from_escaped(text.as_str())),
    };
    write(writer, event)
}

fn write(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<()> {
    writer
        .write_event(event)
        .map_err(|err| Error::Write(err.to_string()))
}
