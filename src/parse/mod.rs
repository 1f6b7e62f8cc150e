//! Parsing documents to text and splitting text into chunks.
//!
//! Parsing is pluggable: a [`DocumentParser`] is registered per declared
//! type, and produces an ordered list of [`DocumentSegment`]s. Text segments
//! pass through unchanged; inline non-text segments (images in a rich
//! document) are turned into textual descriptions by the [`VisionDescriber`]
//! collaborator, preserving document order, before the chunker ever sees
//! the text.
//!
//! Chunking itself lives in [`chunker`] and is a pure function of
//! `(text, chunk_size, overlap)`, the property that makes resume offsets
//! meaningful across process restarts.

mod chunker;

pub use chunker::{ChunkError, ChunkIter, chunk, estimate_chunk_count};

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum ParseError {
    #[error("unsupported document type '{declared}'")]
    #[diagnostic(
        code(vectorloom::parse::unsupported_type),
        help("register a DocumentParser for this type on the ParserRegistry")
    )]
    UnsupportedType { declared: String },

    #[error("document is empty after extraction")]
    #[diagnostic(code(vectorloom::parse::empty))]
    EmptyDocument,

    #[error("{path} is not valid utf-8")]
    #[diagnostic(code(vectorloom::parse::encoding))]
    Encoding { path: String },

    #[error("failed to read {path}: {source}")]
    #[diagnostic(code(vectorloom::parse::io))]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("inline image present but no vision describer is registered")]
    #[diagnostic(code(vectorloom::parse::missing_vision))]
    MissingVisionDescriber,

    #[error("vision description failed: {message}")]
    #[diagnostic(code(vectorloom::parse::vision))]
    Vision { message: String },
}

/// One extracted piece of a document, in document order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DocumentSegment {
    Text(String),
    /// Inline non-text content, referenced by whatever handle the parser
    /// produced (a data URI, an extracted-asset path, …).
    Image { reference: String },
}

/// Extracts an ordered segment list from a local file.
#[async_trait]
pub trait DocumentParser: Send + Sync {
    async fn parse(&self, path: &Path) -> Result<Vec<DocumentSegment>, ParseError>;
}

/// Describes inline non-text content as text, so it can be folded into the
/// chunk stream in place.
#[async_trait]
pub trait VisionDescriber: Send + Sync {
    async fn describe(&self, reference: &str) -> Result<String, ParseError>;
}

/// Reads the file as UTF-8 text. Registered for `txt`, `md`, and `markdown`.
pub struct PlainTextParser;

#[async_trait]
impl DocumentParser for PlainTextParser {
    async fn parse(&self, path: &Path) -> Result<Vec<DocumentSegment>, ParseError> {
        let bytes = tokio::fs::read(path).await.map_err(|source| ParseError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let text = String::from_utf8(bytes).map_err(|_| ParseError::Encoding {
            path: path.display().to_string(),
        })?;
        Ok(vec![DocumentSegment::Text(text)])
    }
}

/// Basic statistics about extracted text, logged after parsing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextStats {
    pub chars: usize,
    pub lines: usize,
    pub words: usize,
}

/// Per-type parser dispatch plus segment-to-text folding.
pub struct ParserRegistry {
    parsers: FxHashMap<String, Arc<dyn DocumentParser>>,
    vision: Option<Arc<dyn VisionDescriber>>,
}

impl ParserRegistry {
    /// Registry with the built-in plain-text parsers.
    pub fn new() -> Self {
        let mut registry = Self {
            parsers: FxHashMap::default(),
            vision: None,
        };
        let plain = Arc::new(PlainTextParser);
        registry.register("txt", plain.clone());
        registry.register("md", plain.clone());
        registry.register("markdown", plain);
        registry
    }

    /// Register (or replace) the parser for a declared type.
    pub fn register(&mut self, declared_type: impl Into<String>, parser: Arc<dyn DocumentParser>) {
        self.parsers
            .insert(declared_type.into().to_lowercase(), parser);
    }

    #[must_use]
    pub fn with_vision(mut self, describer: Arc<dyn VisionDescriber>) -> Self {
        self.vision = Some(describer);
        self
    }

    #[must_use]
    pub fn supports(&self, declared_type: &str) -> bool {
        self.parsers.contains_key(&normalize_type(declared_type))
    }

    #[must_use]
    pub fn supported_types(&self) -> Vec<&str> {
        self.parsers.keys().map(String::as_str).collect()
    }

    /// Parse a file to a single text, folding inline images through the
    /// vision describer in document order.
    ///
    /// Fails with [`ParseError::EmptyDocument`] if nothing remains after
    /// extraction, surfaced before any chunk is scheduled.
    pub async fn parse_to_text(
        &self,
        path: &Path,
        declared_type: &str,
    ) -> Result<String, ParseError> {
        let declared = normalize_type(declared_type);
        let parser = self
            .parsers
            .get(&declared)
            .ok_or_else(|| ParseError::UnsupportedType {
                declared: declared.clone(),
            })?;

        let segments = parser.parse(path).await?;
        let mut text = String::new();
        for segment in segments {
            match segment {
                DocumentSegment::Text(part) => text.push_str(&part),
                DocumentSegment::Image { reference } => {
                    let describer = self
                        .vision
                        .as_ref()
                        .ok_or(ParseError::MissingVisionDescriber)?;
                    let description = describer.describe(&reference).await?;
                    text.push_str(&description);
                }
            }
        }

        if text.trim().is_empty() {
            return Err(ParseError::EmptyDocument);
        }
        Ok(text)
    }

    #[must_use]
    pub fn text_stats(text: &str) -> TextStats {
        TextStats {
            chars: text.chars().count(),
            lines: text.lines().count(),
            words: text.split_whitespace().count(),
        }
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize_type(declared_type: &str) -> String {
    declared_type.trim().to_lowercase()
}
