//! Deterministic segmentation of document text into overlapping windows.
//!
//! # Boundary policy
//!
//! Windows are measured in `char`s (Unicode scalar values), never bytes. The
//! window starting at `i * stride` (with `stride = chunk_size - chunk_overlap`)
//! covers `chunk_size` characters or whatever remains of the text. Production
//! stops after the first window that reaches the end of the text, so the last
//! window may be shorter and is never contained in its predecessor.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default window length in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// Default overlap between consecutive windows in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 100;

/// Rejected split parameters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChunkingError {
    #[error("chunk size must be greater than zero")]
    ZeroChunkSize,

    #[error("chunk overlap {chunk_overlap} must be smaller than chunk size {chunk_size}")]
    OverlapTooLarge {
        chunk_size: usize,
        chunk_overlap: usize,
    },
}

/// Chunking parameters as they arrive from configuration or a request.
///
/// Unset fields fall back to [`DEFAULT_CHUNK_SIZE`] and
/// [`DEFAULT_CHUNK_OVERLAP`]. An explicit zero is kept and rejected by the
/// splitter rather than silently replaced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChunkingOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_overlap: Option<usize>,
}

impl ChunkingOptions {
    #[must_use]
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size: Some(chunk_size),
            chunk_overlap: Some(chunk_overlap),
        }
    }

    /// Fill unset fields from `fallback`.
    ///
    /// An inherited overlap is clamped below an explicitly set chunk size; an
    /// explicit overlap is kept as given.
    #[must_use]
    pub fn or(self, fallback: ChunkingOptions) -> Self {
        let chunk_overlap = match (self.chunk_size, self.chunk_overlap) {
            (_, Some(overlap)) => Some(overlap),
            (Some(size), None) => fallback
                .chunk_overlap
                .map(|overlap| overlap.min(size.saturating_sub(1))),
            (None, None) => fallback.chunk_overlap,
        };
        Self {
            chunk_size: self.chunk_size.or(fallback.chunk_size),
            chunk_overlap,
        }
    }

    /// Build a validated splitter, applying defaults to unset fields.
    pub fn splitter(&self) -> Result<ChunkSplitter, ChunkingError> {
        let chunk_size = self.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE);
        let chunk_overlap = self
            .chunk_overlap
            .unwrap_or(DEFAULT_CHUNK_OVERLAP.min(chunk_size.saturating_sub(1)));
        ChunkSplitter::new(chunk_size, chunk_overlap)
    }
}

/// Splits text into overlapping fixed-length windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl ChunkSplitter {
    /// Create a splitter.
    ///
    /// # Errors
    /// Fails when `chunk_size` is zero or `chunk_overlap >= chunk_size`, since
    /// either would produce windows that never advance.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, ChunkingError> {
        if chunk_size == 0 {
            return Err(ChunkingError::ZeroChunkSize);
        }
        if chunk_overlap >= chunk_size {
            return Err(ChunkingError::OverlapTooLarge {
                chunk_size,
                chunk_overlap,
            });
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    #[must_use]
    pub const fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    #[must_use]
    pub const fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Distance between the starts of consecutive windows.
    #[must_use]
    pub const fn stride(&self) -> usize {
        self.chunk_size - self.chunk_overlap
    }

    /// Split `text` into ordered windows. Empty text yields no windows.
    #[must_use]
    pub fn split(&self, text: &str) -> Vec<String> {
        // Byte offset of every char boundary, plus the end of the text
        let boundaries: Vec<usize> = text
            .char_indices()
            .map(|(offset, _)| offset)
            .chain(std::iter::once(text.len()))
            .collect();
        let char_count = boundaries.len() - 1;

        let mut windows = Vec::new();
        let mut start = 0;
        while start < char_count {
            let end = (start + self.chunk_size).min(char_count);
            windows.push(text[boundaries[start]..boundaries[end]].to_string());
            if end == char_count {
                break;
            }
            start += self.stride();
        }
        windows
    }

    /// Rebuild the original text from windows produced by [`ChunkSplitter::split`].
    ///
    /// Every window after the first contributes only the characters past the
    /// declared overlap.
    #[must_use]
    pub fn reconstruct(&self, windows: &[String]) -> String {
        let mut text = String::new();
        for (i, window) in windows.iter().enumerate() {
            if i == 0 {
                text.push_str(window);
            } else {
                text.extend(window.chars().skip(self.chunk_overlap));
            }
        }
        text
    }
}
