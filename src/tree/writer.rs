use crate::tree::document::{Document, NodeId, NodeKind};
use crate::tree::errors::TreeError;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    /// Spaces per nesting level; `None` writes everything on one line.
    pub indent: Option<usize>,
    /// Emit an `<?xml ...?>` declaration first.
    pub declaration: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            indent: Some(2),
            declaration: true,
        }
    }
}

impl WriteOptions {
    pub fn compact() -> Self {
        Self {
            indent: None,
            declaration: false,
        }
    }
}

pub fn to_string(document: &Document, options: &WriteOptions) -> Result<String, TreeError> {
    let mut writer = match options.indent {
        Some(width) => Writer::new_with_indent(Vec::new(), b' ', width),
        None => Writer::new(Vec::new()),
    };

    if options.declaration {
        write(
            &mut writer,
            Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)),
        )?;
    }
    write_node(&mut writer, document, document.root())?;

    let mut output = String::from_utf8(writer.into_inner())?;
    if options.indent.is_some() {
        output.push('\n');
    }
    Ok(output)
}

fn write_node(writer: &mut Writer<Vec<u8>>, document: &Document, id: NodeId) -> Result<(), TreeError> {
    match document.kind(id) {
        NodeKind::Element(element) => {
            let mut start = BytesStart::new(element.name.as_str());
            for (name, value) in &element.attributes {
                start.push_attribute((name.as_str(), value.as_str()));
            }

            let children = document.children(id);
            if children.is_empty() {
                return write(writer, Event::Empty(start));
            }

            write(writer, Event::Start(start))?;
            for child in children {
                write_node(writer, document, *child)?;
            }
            write(writer, Event::End(BytesEnd::new(element.name.as_str())))
        }
        NodeKind::Text(text) => write(writer, Event::Text(BytesText::new(text))),
        NodeKind::Comment(text) => write(writer, Event::Comment(BytesText::from_escaped(text.as_str()))),
    }
}

fn write(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<(), TreeError> {
    writer
        .write_event(event)
        .map_err(|source| TreeError::Xml { position: 0, source })
}
