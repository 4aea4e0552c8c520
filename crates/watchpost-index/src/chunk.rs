//! Splitting corpus documents into retrievable chunks

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

static PARAGRAPH_RE: OnceLock<Regex> = OnceLock::new();
static SENTENCE_RE: OnceLock<Regex> = OnceLock::new();

const UNTITLED: &str = "untitled";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// File name of the source document
    pub source: String,
    /// Heading of the section the chunk came from
    pub title: String,
    pub text: String,
}

/// Split `text` by `## ` sections, then blank-line paragraphs, then
/// sentences, packing pieces into chunks of at most `max_chars` characters.
pub fn chunk_text(text: &str, source: &str, max_chars: usize) -> Vec<Chunk> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();

    for section in sections(text.trim()) {
        if section.trim().is_empty() {
            continue;
        }
        let title = section_title(section);
        let mut packer = Packer::new(source, &title, max_chars);

        let paragraphs = PARAGRAPH_RE.get_or_init(|| Regex::new(r"\n\s*\n").unwrap());
        for paragraph in paragraphs.split(section) {
            let paragraph = paragraph.trim();
            if paragraph.is_empty() {
                continue;
            }
            if char_len(paragraph) <= max_chars {
                packer.push(paragraph, "\n\n");
                continue;
            }
            for sentence in sentences(paragraph) {
                if char_len(sentence) <= max_chars {
                    packer.push(sentence, "");
                } else {
                    for piece in split_chars(sentence, max_chars) {
                        packer.push(&piece, "");
                    }
                }
            }
        }
        chunks.extend(packer.finish());
    }
    chunks
}

struct Packer<'a> {
    source: &'a str,
    title: &'a str,
    max_chars: usize,
    current: String,
    current_len: usize,
    done: Vec<Chunk>,
}

impl<'a> Packer<'a> {
    fn new(source: &'a str, title: &'a str, max_chars: usize) -> Self {
        Self {
            source,
            title,
            max_chars,
            current: String::new(),
            current_len: 0,
            done: Vec::new(),
        }
    }

    fn push(&mut self, piece: &str, separator: &str) {
        let piece_len = char_len(piece);
        let separator = if self.current.is_empty() { "" } else { separator };
        let extra = char_len(separator) + piece_len;
        if self.current_len + extra > self.max_chars {
            self.flush();
            self.current.push_str(piece);
            self.current_len = piece_len;
        } else {
            self.current.push_str(separator);
            self.current.push_str(piece);
            self.current_len += extra;
        }
    }

    fn flush(&mut self) {
        let text = std::mem::take(&mut self.current);
        self.current_len = 0;
        if !text.trim().is_empty() {
            self.done.push(Chunk {
                source: self.source.to_string(),
                title: self.title.to_string(),
                text: text.trim().to_string(),
            });
        }
    }

    fn finish(mut self) -> Vec<Chunk> {
        self.flush();
        self.done
    }
}

/// Cut before every `\n## ` so each level-two heading starts a section
fn sections(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    for (at, _) in text.match_indices("\n## ") {
        out.push(&text[start..at]);
        start = at + 1;
    }
    out.push(&text[start..]);
    out
}

fn section_title(section: &str) -> String {
    let first = section.trim_start().lines().next().unwrap_or_default();
    let hashes = first.chars().take_while(|c| *c == '#').count();
    if hashes > 0 && first[hashes..].starts_with(' ') {
        first.trim().to_string()
    } else {
        UNTITLED.to_string()
    }
}

/// Sentences keep their terminator
fn sentences(paragraph: &str) -> Vec<&str> {
    let re = SENTENCE_RE.get_or_init(|| Regex::new(r"[^。！？.!?]+[。！？.!?]*|[。！？.!?]+").unwrap());
    re.find_iter(paragraph)
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
        .collect()
}

fn split_chars(text: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(max_chars).map(|c| c.iter().collect()).collect()
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}
