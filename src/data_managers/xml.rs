//! XML store.
//!
//! Layout: `<library><books><book><title>...</title>...</book></books></library>`,
//! one child element per field holding the flat text form of its value.
//! Written with 2-space indentation. The reader picks up record elements at
//! any depth, so a flat `<books><book>` document loads as well.

use std::borrow::Cow;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use super::file_store::DocumentCodec;
use crate::error::{StorageError, StorageResult};
use crate::models::{EntitySchema, Record};

const ROOT_ELEMENT: &str = "library";

#[derive(Debug, Clone, Copy, Default)]
pub struct XmlCodec;

impl DocumentCodec for XmlCodec {
    const EXTENSION: &'static str = "xml";

    fn decode(&self, schema: &'static EntitySchema, content: &str) -> StorageResult<Vec<Record>> {
        let mut reader = Reader::from_str(content);
        reader.trim_text(false);

        let record_tag = schema.name.as_bytes();
        let mut records = Vec::new();
        let mut buf = Vec::new();

        let mut current: Option<Record> = None;
        let mut field: Option<String> = None;
        let mut text = String::new();
        let mut problem: Option<String> = None;

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) => {
                    if current.is_none() {
                        if e.name().as_ref() == record_tag {
                            current = Some(Record::new());
                            problem = None;
                        }
                    } else if field.is_none() {
                        field = Some(element_name(e.name().as_ref()).into_owned());
                        text.clear();
                    }
                }
                Event::Empty(e) => {
                    if let (Some(record), None) = (current.as_mut(), field.as_ref()) {
                        let name = element_name(e.name().as_ref()).into_owned();
                        insert_field(schema, record, &name, "", &mut problem);
                    }
                }
                Event::Text(e) => {
                    if field.is_some() {
                        text.push_str(&e.unescape()?);
                    }
                }
                Event::CData(e) => {
                    if field.is_some() {
                        text.push_str(&String::from_utf8_lossy(&e.into_inner()));
                    }
                }
                Event::End(e) => {
                    let closes_field = field
                        .as_deref()
                        .is_some_and(|open| open.as_bytes() == e.name().as_ref());

                    if closes_field {
                        if let (Some(record), Some(name)) = (current.as_mut(), field.take()) {
                            insert_field(schema, record, &name, &text, &mut problem);
                        }
                    } else if field.is_none() && e.name().as_ref() == record_tag {
                        if let Some(record) = current.take() {
                            match problem.take() {
                                Some(message) => tracing::warn!(
                                    "Skipping {} element {}: {}",
                                    schema.name,
                                    records.len() + 1,
                                    message
                                ),
                                None => records.push(record),
                            }
                        }
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        Ok(records)
    }

    fn encode(&self, schema: &'static EntitySchema, records: &[Record]) -> StorageResult<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        writer.write_event(Event::Start(BytesStart::new(ROOT_ELEMENT)))?;
        writer.write_event(Event::Start(BytesStart::new(schema.plural)))?;

        for record in records {
            writer.write_event(Event::Start(BytesStart::new(schema.name)))?;
            for field in schema.fields {
                let text = field.kind.to_text(record.get(field.name));
                let element = writer.create_element(field.name);
                if text.is_empty() {
                    element.write_empty()?;
                } else {
                    element.write_text_content(BytesText::new(&text))?;
                }
            }
            writer.write_event(Event::End(BytesEnd::new(schema.name)))?;
        }

        writer.write_event(Event::End(BytesEnd::new(schema.plural)))?;
        writer.write_event(Event::End(BytesEnd::new(ROOT_ELEMENT)))?;

        String::from_utf8(writer.into_inner())
            .map_err(|e| StorageError::malformed(schema.name, e.to_string()))
    }
}

fn element_name(raw: &[u8]) -> Cow<'_, str> {
    String::from_utf8_lossy(raw)
}

/// Unknown elements are ignored; a bad value marks the whole record.
fn insert_field(
    schema: &'static EntitySchema,
    record: &mut Record,
    name: &str,
    text: &str,
    problem: &mut Option<String>,
) {
    let Some(field) = schema.field(name) else {
        return;
    };
    match field.kind.from_text(text) {
        Ok(value) => {
            record.insert(name.to_string(), value);
        }
        Err(e) => {
            problem.get_or_insert_with(|| format!("element '{}': {}", name, e));
        }
    }
}
