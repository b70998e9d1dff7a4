use thiserror::Error;

#[derive(Error, Debug)]
pub enum TreeError {
    #[error("malformed XML at byte {position}: {source}")]
    Xml {
        position: usize,
        #[source]
        source: quick_xml::Error,
    },

    #[error("document has no root element")]
    MissingRoot,

    #[error("document has more than one root element (found '{name}' after the root closed)")]
    MultipleRoots { name: String },

    #[error("unclosed element '{name}' at end of input")]
    Unclosed { name: String },

    #[error("node has no parent")]
    NoParent,

    #[error("serializer produced invalid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}
