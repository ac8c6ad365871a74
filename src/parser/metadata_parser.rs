//! Parser for the embedded metadata document.
//!
//! The document is a flat list of record elements under one root. Each record's
//! leaf children are its fields; nested leaves get dotted names. Element names are
//! matched by local name so prefixed and unprefixed dialects parse the same.

use std::borrow::Cow;

use encoding_rs::{UTF_8, UTF_16LE};
use indexmap::map::Entry;
use log::debug;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::config::TextEncoding;
use crate::error::MetadataParseError;
use crate::types::entities::FieldTable;
use crate::types::graph::{GraphBuilder, MetadataGraph};

/// Decode located document bytes to text. Stray NUL code units are removed.
pub fn decode_document(
    bytes: &[u8],
    encoding: TextEncoding,
) -> Result<String, MetadataParseError> {
    let decoded = match encoding {
        TextEncoding::Utf16Le => {
            UTF_16LE.decode_without_bom_handling_and_without_replacement(bytes)
        }
        TextEncoding::Utf8 => {
            let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
            UTF_8.decode_without_bom_handling_and_without_replacement(bytes)
        }
    }
    .ok_or(MetadataParseError::Encoding {
        encoding: encoding.name(),
    })?;

    Ok(match decoded {
        Cow::Borrowed(text) if !text.contains('\0') => text.to_string(),
        text => text.replace('\0', ""),
    })
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn root_namespace(e: &BytesStart<'_>) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|attr| {
            let key = attr.key.as_ref();
            key == b"xmlns" || key.starts_with(b"xmlns:")
        })
        .and_then(|attr| attr.unescape_value().ok().map(Cow::into_owned))
}

/// An open element below a record.
struct OpenField {
    name: String,
    text: String,
    has_children: bool,
}

fn second_root<R>(reader: &Reader<R>) -> MetadataParseError {
    MetadataParseError::Xml {
        position: reader.buffer_position() as u64,
        message: "document has more than one root element".to_string(),
    }
}

fn insert_field(fields: &mut FieldTable, key: String, value: String) {
    if let Entry::Vacant(slot) = fields.entry(key) {
        slot.insert(value);
    }
}

fn field_key(path: &[OpenField], leaf: &str) -> String {
    path.iter()
        .map(|f| f.name.as_str())
        .chain(std::iter::once(leaf))
        .collect::<Vec<_>>()
        .join(".")
}

/// Parse the metadata document into a graph.
pub fn parse_metadata(xml: &str) -> Result<MetadataGraph, MetadataParseError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut builder = GraphBuilder::default();
    let mut root_seen = false;
    let mut depth = 0usize;
    let mut record: Option<(String, FieldTable)> = None;
    let mut path: Vec<OpenField> = Vec::new();
    let mut records = 0usize;

    loop {
        let event = reader.read_event().map_err(|e| MetadataParseError::Xml {
            position: reader.error_position() as u64,
            message: e.to_string(),
        })?;
        match event {
            Event::Start(e) => {
                let name = local_name(&e);
                depth += 1;
                match depth {
                    1 => {
                        if root_seen {
                            return Err(second_root(&reader));
                        }
                        root_seen = true;
                        builder.set_namespace(root_namespace(&e));
                    }
                    2 => record = Some((name, FieldTable::new())),
                    _ => {
                        if let Some(parent) = path.last_mut() {
                            parent.has_children = true;
                        }
                        path.push(OpenField {
                            name,
                            text: String::new(),
                            has_children: false,
                        });
                    }
                }
            }
            Event::Empty(e) => {
                let name = local_name(&e);
                match depth {
                    0 => {
                        if root_seen {
                            return Err(second_root(&reader));
                        }
                        root_seen = true;
                        builder.set_namespace(root_namespace(&e));
                    }
                    1 => {
                        records += 1;
                        builder.push_record(&name, FieldTable::new());
                    }
                    _ => {
                        if let Some(parent) = path.last_mut() {
                            parent.has_children = true;
                        }
                        if let Some((_, fields)) = record.as_mut() {
                            insert_field(fields, field_key(&path, &name), String::new());
                        }
                    }
                }
            }
            Event::Text(t) if depth >= 3 => {
                let text = t.unescape().map_err(|e| MetadataParseError::Xml {
                    position: reader.buffer_position() as u64,
                    message: e.to_string(),
                })?;
                if let Some(open) = path.last_mut() {
                    open.text.push_str(&text);
                }
            }
            Event::CData(c) if depth >= 3 => {
                if let Some(open) = path.last_mut() {
                    open.text.push_str(&String::from_utf8_lossy(&c));
                }
            }
            Event::End(_) => {
                match depth {
                    0 | 1 => {}
                    2 => {
                        if let Some((name, fields)) = record.take() {
                            records += 1;
                            builder.push_record(&name, fields);
                        }
                    }
                    _ => {
                        if let Some(open) = path.pop() {
                            if !open.has_children || !open.text.is_empty() {
                                if let Some((_, fields)) = record.as_mut() {
                                    insert_field(fields, field_key(&path, &open.name), open.text);
                                }
                            }
                        }
                    }
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if depth > 0 {
        return Err(MetadataParseError::UnexpectedEof { open: depth });
    }
    if !root_seen {
        return Err(MetadataParseError::NoRoot);
    }
    debug!("Parsed {records} metadata records");
    Ok(builder.finish(xml.to_string()))
}
