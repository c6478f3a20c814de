use crate::error::TornadoError;

/// Splits text into chunks of at most `chunk_size` characters without
/// breaking lines.
///
/// A line longer than `chunk_size` is hard-split on character boundaries.
/// With `overlap_lines > 0`, each chunk after the first starts with up to
/// that many trailing lines of the previous chunk, as long as they fit
/// together with the next new line.
///
/// ```
/// use tornado_llm::vector::TextChunker;
///
/// let chunker = TextChunker::new(12, 0).unwrap();
/// assert_eq!(chunker.chunk("alpha\nbeta\ngamma"), vec!["alpha\nbeta", "gamma"]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextChunker {
    chunk_size: usize,
    overlap_lines: usize,
}

impl TextChunker {
    pub fn new(chunk_size: usize, overlap_lines: usize) -> Result<Self, TornadoError> {
        if chunk_size == 0 {
            return Err(TornadoError::InvalidConfig {
                field: "chunk_size".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(Self {
            chunk_size,
            overlap_lines,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap_lines(&self) -> usize {
        self.overlap_lines
    }

    pub fn chunk(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let mut chunks = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        let mut current_len = 0usize;

        for piece in text.lines().flat_map(|line| split_long_line(line, self.chunk_size)) {
            let piece_len = piece.chars().count();
            let joined_len = |len: usize, count: usize| if count == 0 { piece_len } else { len + 1 + piece_len };

            if !current.is_empty() && joined_len(current_len, current.len()) > self.chunk_size {
                push_chunk(&mut chunks, &current);
                let keep = current.len().saturating_sub(self.overlap_lines);
                current.drain(..keep);
                current_len = joined_chars(&current);
                while !current.is_empty() && joined_len(current_len, current.len()) > self.chunk_size {
                    current.remove(0);
                    current_len = joined_chars(&current);
                }
            }

            current_len = joined_len(current_len, current.len());
            current.push(piece);
        }
        push_chunk(&mut chunks, &current);

        tracing::debug!(
            chunks = chunks.len(),
            chunk_size = self.chunk_size,
            overlap_lines = self.overlap_lines,
            "chunked text"
        );
        chunks
    }
}

fn split_long_line(line: &str, chunk_size: usize) -> Vec<&str> {
    if line.chars().count() <= chunk_size {
        return vec![line];
    }
    let mut pieces = Vec::new();
    let mut start = 0;
    for (count, (offset, _)) in line.char_indices().enumerate() {
        if count > 0 && count % chunk_size == 0 {
            pieces.push(&line[start..offset]);
            start = offset;
        }
    }
    pieces.push(&line[start..]);
    pieces
}

fn joined_chars(lines: &[&str]) -> usize {
    let chars: usize = lines.iter().map(|line| line.chars().count()).sum();
    chars + lines.len().saturating_sub(1)
}

/// Whitespace-only chunks carry nothing worth embedding.
fn push_chunk(chunks: &mut Vec<String>, lines: &[&str]) {
    let chunk = lines.join("\n");
    if !chunk.trim().is_empty() {
        chunks.push(chunk);
    }
}
