//! XML text to [`Document`] via `quick-xml`.
//!
//! Whitespace-only text is dropped; surrounding whitespace of real text is
//! trimmed. Declarations, processing instructions and doctypes are skipped,
//! as are comments outside the root element.

use crate::tree::document::{Document, Element, NodeId, NodeKind};
use crate::tree::errors::TreeError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

pub fn parse(input: &str) -> Result<Document, TreeError> {
    let mut reader = Reader::from_str(input);
    reader.trim_text(true);

    let mut builder = Builder::default();

    loop {
        let position = reader.buffer_position();
        let event = reader
            .read_event()
            .map_err(|source| TreeError::Xml { position, source })?;
        let xml_error = |source: quick_xml::Error| TreeError::Xml { position, source };

        match event {
            Event::Start(start) => {
                let element = read_element(&reader, &start).map_err(xml_error)?;
                builder.open(element, true)?;
            }
            Event::Empty(start) => {
                let element = read_element(&reader, &start).map_err(xml_error)?;
                builder.open(element, false)?;
            }
            Event::End(_) => builder.close(),
            Event::Text(text) => {
                let value = text.unescape().map_err(xml_error)?;
                builder.leaf(NodeKind::Text(value.into_owned()));
            }
            Event::CData(data) => {
                let value = reader.decoder().decode(&data).map_err(xml_error)?;
                builder.leaf(NodeKind::Text(value.into_owned()));
            }
            Event::Comment(comment) => {
                let value = reader.decoder().decode(&comment).map_err(xml_error)?;
                builder.leaf(NodeKind::Comment(value.into_owned()));
            }
            Event::Eof => break,
            Event::Decl(_) | Event::PI(_) | Event::DocType(_) => {}
        }
    }

    builder.finish()
}

fn read_element(reader: &Reader<&[u8]>, start: &BytesStart<'_>) -> quick_xml::Result<Element> {
    let decoder = reader.decoder();
    let mut element = Element::new(decoder.decode(start.name().as_ref())?.into_owned());
    for attribute in start.attributes() {
        let attribute = attribute?;
        let key = decoder.decode(attribute.key.as_ref())?.into_owned();
        let value = attribute.unescape_value()?.into_owned();
        element.attributes.insert(key, value);
    }
    Ok(element)
}

#[derive(Default)]
struct Builder {
    document: Option<Document>,
    open: Vec<NodeId>,
    closed_root: bool,
}

impl Builder {
    fn open(&mut self, element: Element, has_content: bool) -> Result<(), TreeError> {
        let id = match (&mut self.document, self.open.last()) {
            (None, _) => {
                let document = Document::new(element);
                let root = document.root();
                self.document = Some(document);
                root
            }
            (Some(document), Some(parent)) => {
                let parent = *parent;
                let id = document.create(NodeKind::Element(element));
                document.append_child(parent, id);
                id
            }
            (Some(_), None) => {
                return Err(TreeError::MultipleRoots { name: element.name });
            }
        };

        if has_content {
            self.open.push(id);
        } else if self.open.is_empty() {
            self.closed_root = true;
        }
        Ok(())
    }

    fn close(&mut self) {
        self.open.pop();
        if self.open.is_empty() {
            self.closed_root = true;
        }
    }

    fn leaf(&mut self, kind: NodeKind) {
        if let (Some(document), Some(parent)) = (&mut self.document, self.open.last()) {
            let id = document.create(kind);
            document.append_child(*parent, id);
        }
    }

    fn finish(self) -> Result<Document, TreeError> {
        let document = self.document.ok_or(TreeError::MissingRoot)?;
        if let Some(unclosed) = self.open.last() {
            return Err(TreeError::Unclosed {
                name: document.name(*unclosed).unwrap_or_default().to_string(),
            });
        }
        debug_assert!(self.closed_root);
        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_elements_and_attributes() {
        let doc = parse(r#"<?xml version="1.0"?><Defs><ThingDef Name="Base" Abstract="True"><label>thing</label></ThingDef></Defs>"#).unwrap();
        let root = doc.root();
        assert_eq!(doc.name(root), Some("Defs"));

        let thing = doc.children(root)[0];
        let element = doc.element(thing).unwrap();
        assert_eq!(element.attribute("Name"), Some("Base"));
        assert_eq!(element.attribute("Abstract"), Some("True"));
        assert_eq!(doc.text_content(thing), "thing");
    }

    #[test]
    fn keeps_comments_inside_root_only() {
        let doc = parse("<!-- header --><Root><!-- inner --><A/></Root>").unwrap();
        let root = doc.root();
        assert_eq!(doc.children(root).len(), 2);
        assert_eq!(
            doc.kind(doc.children(root)[0]),
            &NodeKind::Comment(" inner ".to_string())
        );
    }

    #[test]
    fn unescapes_text_and_attributes() {
        let doc = parse(r#"<Root a="&lt;x&gt;">1 &amp; 2</Root>"#).unwrap();
        let root = doc.root();
        assert_eq!(doc.element(root).unwrap().attribute("a"), Some("<x>"));
        assert_eq!(doc.text_content(root), "1 & 2");
    }

    #[test]
    fn rejects_second_root() {
        let err = parse("<A/><B/>").unwrap_err();
        assert!(matches!(err, TreeError::MultipleRoots { ref name } if name == "B"));
    }

    #[test]
    fn rejects_empty_input() {
        assert!(matches!(parse("   ").unwrap_err(), TreeError::MissingRoot));
    }

    #[test]
    fn rejects_unclosed_root() {
        assert!(parse("<Root><A>").is_err());
    }

    #[test]
    fn rejects_mismatched_end_tag() {
        assert!(matches!(
            parse("<Root><A></B></Root>").unwrap_err(),
            TreeError::Xml { .. }
        ));
    }
}
