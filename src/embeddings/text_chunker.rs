//! Fixed-size sliding-window chunker.
//!
//! Splits extracted text into segments of at most `chunk_size` characters,
//! where each segment starts `chunk_size - overlap` characters after the
//! previous one. Units are chars, so a multi-byte sequence is never split.
//! Windows that are entirely whitespace are dropped. No sentence or
//! paragraph awareness.

use crate::config::RetrievalConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextChunker {
    chunk_size: usize,
    overlap: usize,
}

impl TextChunker {
    /// `overlap` must be smaller than `chunk_size`, otherwise the window
    /// would never advance.
    pub fn new(chunk_size: usize, overlap: usize) -> Option<Self> {
        if chunk_size == 0 || overlap >= chunk_size {
            return None;
        }
        Some(Self {
            chunk_size,
            overlap,
        })
    }

    pub fn from_config(config: &RetrievalConfig) -> Option<Self> {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Lazily yields chunks of `text`. Calling again restarts from the beginning.
    pub fn chunks<'a>(&self, text: &'a str) -> Chunks<'a> {
        Chunks {
            text,
            start: 0,
            done: text.trim().is_empty(),
            chunk_size: self.chunk_size,
            step: self.chunk_size - self.overlap,
        }
    }
}

impl Default for TextChunker {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            overlap: 200,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    text: &'a str,
    start: usize,
    done: bool,
    chunk_size: usize,
    step: usize,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let rest = &self.text[self.start..];
            let end = self.start + byte_offset(rest, self.chunk_size);
            let chunk = &self.text[self.start..end];

            if end >= self.text.len() {
                self.done = true;
            } else {
                self.start += byte_offset(rest, self.step);
            }

            // windows inside long blank runs carry nothing worth embedding
            if !chunk.trim().is_empty() {
                return Some(chunk);
            }
        }
        None
    }
}

impl std::iter::FusedIterator for Chunks<'_> {}

/// Byte offset of the `chars`-th char in `s`, or `s.len()` if it is shorter.
fn byte_offset(s: &str, chars: usize) -> usize {
    s.char_indices()
        .nth(chars)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}
