
use std::borrow::Cow;
use std::fmt;
use std::ops::Range;
use std::path::Path;
use std::str::FromStr;

use pulldown_cmark::{Event, Parser, Tag, TagEnd};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::fingerprint::hash_text;

pub const DEFAULT_MAX_CHUNK_SIZE: usize = 1024;
pub const DEFAULT_OVERLAP_SIZE: usize = 100;
/// Hard ceiling on chunk length, enforced by the write path before embedding
pub const DEFAULT_MAX_EMBED_CHARS: usize = 4000;

const CHARS_PER_TOKEN: usize = 4;

/// A contiguous slice of a file ready for embedding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Position of this chunk within its file, starting at 0
    pub index: usize,
    /// The chunk text
    pub content: String,
    /// Heading the chunk was found under, for structured text
    pub section: Option<String>,
    /// Estimated token count
    pub token_count: usize,
    /// Fingerprint of the embedding text, heading included
    pub hash: String,
}

impl Chunk {
    /// Text sent to the embedding model: the section heading, if any, above the body
    #[inline]
    pub fn embedding_text(&self) -> Cow<'_, str> {
        embedding_text(&self.content, self.section.as_deref())
    }
}

/// Configuration for content chunking. Sizes are in characters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk size before a split is forced
    pub max_chunk_size: usize,
    /// Characters repeated from the end of one chunk at the start of the next
    pub overlap_size: usize,
    /// Chunks longer than this are never embedded or stored
    pub max_embed_chars: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            overlap_size: DEFAULT_OVERLAP_SIZE,
            max_embed_chars: DEFAULT_MAX_EMBED_CHARS,
        }
    }
}

/// Category of an indexed file, which selects the chunking strategy
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum FileType {
    Markdown,
    Code,
    Text,
}

impl FileType {
    /// Classify a path by extension, returning the file type and a language tag for code
    #[inline]
    pub fn detect(path: &Path) -> (Self, Option<&'static str>) {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        if matches!(extension.as_str(), "md" | "markdown" | "mdx") {
            return (Self::Markdown, None);
        }

        let language = match extension.as_str() {
            "rs" => "rust",
            "py" | "pyi" => "python",
            "js" | "jsx" | "mjs" | "cjs" => "javascript",
            "ts" | "tsx" => "typescript",
            "go" => "go",
            "java" => "java",
            "kt" | "kts" => "kotlin",
            "c" | "h" => "c",
            "cc" | "cpp" | "cxx" | "hpp" | "hh" => "cpp",
            "cs" => "csharp",
            "rb" => "ruby",
            "php" => "php",
            "swift" => "swift",
            "scala" => "scala",
            "sh" | "bash" | "zsh" => "shell",
            "sql" => "sql",
            "lua" => "lua",
            "toml" => "toml",
            "yaml" | "yml" => "yaml",
            "json" => "json",
            "html" | "htm" => "html",
            "css" | "scss" => "css",
            _ => return (Self::Text, None),
        };

        (Self::Code, Some(language))
    }

    #[inline]
    pub fn as_str(&self) -> &'static str {
        match *self {
            FileType::Markdown => "markdown",
            FileType::Code => "code",
            FileType::Text => "text",
        }
    }
}

impl fmt::Display for FileType {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileType {
    type Err = String;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "markdown" | "md" => Ok(Self::Markdown),
            "code" => Ok(Self::Code),
            "text" | "txt" => Ok(Self::Text),
            other => Err(format!(
                "unknown file type '{}' (expected markdown, code or text)",
                other
            )),
        }
    }
}

/// Split a file's content into ordered chunks using the strategy for its file type.
///
/// Pure function of its inputs: the same content and configuration always produce the same
/// chunks and hashes, which is what makes hash-based change detection sound.
#[inline]
pub fn chunk_file(
    path: &Path,
    content: &str,
    file_type: FileType,
    config: &ChunkingConfig,
) -> Vec<Chunk> {
    let pieces = match file_type {
        FileType::Markdown => split_markdown(content, config),
        FileType::Code | FileType::Text => split_windows(content, config)
            .into_iter()
            .map(|text| (text, None))
            .collect(),
    };

    let chunks: Vec<Chunk> = pieces
        .into_iter()
        .filter(|(text, _)| !text.trim().is_empty())
        .enumerate()
        .map(|(index, (text, section))| make_chunk(index, text, section))
        .collect();

    debug!(
        "Chunked {} ({}) into {} chunks",
        path.display(),
        file_type,
        chunks.len()
    );

    chunks
}

/// Estimate token count as a quarter of the character count.
/// This is a coarse proxy, not a tokenizer.
#[inline]
pub fn estimate_token_count(text: &str) -> usize {
    text.chars().count() / CHARS_PER_TOKEN
}

fn make_chunk(index: usize, content: String, section: Option<String>) -> Chunk {
    Chunk {
        index,
        token_count: estimate_token_count(&content),
        hash: hash_text(&embedding_text(&content, section.as_deref())),
        section,
        content,
    }
}

fn embedding_text<'a>(content: &'a str, section: Option<&str>) -> Cow<'a, str> {
    match section {
        Some(heading) => Cow::Owned(format!("{}\n\n{}", heading, content)),
        None => Cow::Borrowed(content),
    }
}

/// Character ranges of fixed-size windows over `len` characters, each starting `overlap`
/// characters before the previous one ended.
fn window_ranges(len: usize, max_size: usize, overlap: usize) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    if len == 0 || max_size == 0 {
        return ranges;
    }

    let mut start = 0;
    loop {
        let end = (start + max_size).min(len);
        ranges.push(start..end);

        if end == len {
            break;
        }

        let next_start = end.saturating_sub(overlap);
        if next_start <= start {
            // overlap >= max_size would never advance
            break;
        }
        start = next_start;
    }

    ranges
}

fn split_windows(text: &str, config: &ChunkingConfig) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();

    window_ranges(chars.len(), config.max_chunk_size, config.overlap_size)
        .into_iter()
        .filter_map(|range| chars.get(range).map(|window| window.iter().collect()))
        .collect()
}

fn split_markdown(content: &str, config: &ChunkingConfig) -> Vec<(String, Option<String>)> {
    let mut pieces = Vec::new();

    for (section, body) in markdown_sections(content) {
        let body = body.trim();
        if body.is_empty() {
            continue;
        }

        pieces.extend(
            split_windows(body, config)
                .into_iter()
                .map(|text| (text, section.clone())),
        );
    }

    pieces
}

struct Heading {
    title: String,
    span: Range<usize>,
}

/// Break markdown into (heading, body) pairs. Text before the first heading has no heading.
fn markdown_sections(content: &str) -> Vec<(Option<String>, &str)> {
    let headings = atx_headings(content);

    let mut sections = Vec::with_capacity(headings.len() + 1);
    let first_start = headings.first().map_or(content.len(), |h| h.span.start);
    sections.push((None, content.get(..first_start).unwrap_or_default()));

    for (i, heading) in headings.iter().enumerate() {
        let body_end = headings
            .get(i + 1)
            .map_or(content.len(), |next| next.span.start);
        let body = content.get(heading.span.end..body_end).unwrap_or_default();
        sections.push((Some(heading.title.clone()), body));
    }

    sections
}

/// Locate `#`-style headings. Setext headings and `#` lines inside code blocks are body text.
fn atx_headings(content: &str) -> Vec<Heading> {
    let mut headings = Vec::new();
    let mut current: Option<Heading> = None;

    for (event, range) in Parser::new(content).into_offset_iter() {
        match event {
            Event::Start(Tag::Heading { .. }) => {
                let is_atx = content
                    .get(range.clone())
                    .is_some_and(|source| source.trim_start().starts_with('#'));
                if is_atx {
                    current = Some(Heading {
                        title: String::new(),
                        span: range,
                    });
                }
            }
            Event::Text(text) | Event::Code(text) => {
                if let Some(heading) = current.as_mut() {
                    heading.title.push_str(&text);
                }
            }
            Event::End(TagEnd::Heading(_)) => {
                if let Some(mut heading) = current.take() {
                    heading.title = heading.title.trim().to_string();
                    headings.push(heading);
                }
            }
            _ => {}
        }
    }

    headings
}
