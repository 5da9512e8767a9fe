use crate::document::Document;
use serde::{Deserialize, Serialize};

/// Approximate characters per token, used to size the overlap window
const CHARS_PER_TOKEN: usize = 4;

/// Represents a text chunk with metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextChunk {
    /// The actual text content of this chunk
    pub text: String,
    /// Estimated token count for this chunk
    pub token_count: usize,
    /// URL or file name of the document this chunk came from
    pub source: String,
}

/// Splits documents into chunks of roughly `chunk_size` tokens.
///
/// Paragraphs (blank-line separated) are packed together until the limit is
/// reached. Paragraphs that are too large on their own are split into
/// sentences, and sentences that are still too large are split on words.
#[derive(Debug, Clone, Copy)]
pub struct TextSplitter {
    pub chunk_size: usize,
    /// Tokens carried over from the end of one chunk into the next
    pub chunk_overlap: usize,
}

impl Default for TextSplitter {
    fn default() -> Self {
        TextSplitter {
            chunk_size: 500,
            chunk_overlap: 0,
        }
    }
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        TextSplitter {
            chunk_size: chunk_size.max(1),
            chunk_overlap,
        }
    }

    /// Split every document, keeping document order
    pub fn split_documents(&self, documents: &[Document]) -> Vec<TextChunk> {
        documents
            .iter()
            .flat_map(|doc| self.split_text(&doc.content, &doc.source))
            .collect()
    }

    /// Split text into chunks of approximately `chunk_size` tokens
    pub fn split_text(&self, text: &str, source: &str) -> Vec<TextChunk> {
        let mut chunks = Vec::new();
        let mut paragraphs = ChunkBuffer::new("\n\n");

        for paragraph in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
            let paragraph_tokens = estimate_token_count(paragraph);

            if paragraph_tokens > self.chunk_size {
                // Keep chunk order: emit what we have before the big paragraph
                if let Some(chunk) = paragraphs.take(0) {
                    chunks.push(chunk.into_chunk(source));
                }
                self.split_paragraph(paragraph, source, &mut chunks);
                continue;
            }

            if let Some(chunk) =
                paragraphs.make_room(paragraph_tokens, self.chunk_size, self.overlap_chars())
            {
                chunks.push(chunk.into_chunk(source));
            }
            paragraphs.push(paragraph, paragraph_tokens);
        }

        if let Some(chunk) = paragraphs.take(0) {
            chunks.push(chunk.into_chunk(source));
        }

        chunks
    }

    fn overlap_chars(&self) -> usize {
        self.chunk_overlap * CHARS_PER_TOKEN
    }

    fn split_paragraph(&self, paragraph: &str, source: &str, chunks: &mut Vec<TextChunk>) {
        let mut sentences = ChunkBuffer::new(" ");

        // Naive sentence split on punctuation
        for sentence in paragraph.split(|c| ".!?\n".contains(c)) {
            let sentence = sentence.trim();
            if sentence.is_empty() {
                continue;
            }

            let sentence = format!("{}.", sentence);
            let sentence_tokens = estimate_token_count(&sentence);

            if sentence_tokens > self.chunk_size {
                if let Some(chunk) = sentences.take(0) {
                    chunks.push(chunk.into_chunk(source));
                }
                for piece in split_words(&sentence, self.chunk_size) {
                    let token_count = estimate_token_count(&piece);
                    chunks.push(TextChunk {
                        text: piece,
                        token_count,
                        source: source.to_string(),
                    });
                }
                continue;
            }

            if let Some(chunk) =
                sentences.make_room(sentence_tokens, self.chunk_size, self.overlap_chars())
            {
                chunks.push(chunk.into_chunk(source));
            }
            sentences.push(&sentence, sentence_tokens);
        }

        if let Some(chunk) = sentences.take(0) {
            chunks.push(chunk.into_chunk(source));
        }
    }
}

/// Text being accumulated into a chunk
struct ChunkBuffer {
    text: String,
    token_count: usize,
    separator: &'static str,
}

/// A finished chunk before its source is attached
struct Taken {
    text: String,
    token_count: usize,
}

impl Taken {
    fn into_chunk(self, source: &str) -> TextChunk {
        TextChunk {
            text: self.text,
            token_count: self.token_count,
            source: source.to_string(),
        }
    }
}

impl ChunkBuffer {
    fn new(separator: &'static str) -> Self {
        ChunkBuffer {
            text: String::new(),
            token_count: 0,
            separator,
        }
    }

    fn would_overflow(&self, tokens: usize, limit: usize) -> bool {
        !self.text.is_empty() && self.token_count + tokens > limit
    }

    fn push(&mut self, piece: &str, tokens: usize) {
        if !self.text.is_empty() {
            self.text.push_str(self.separator);
        }
        self.text.push_str(piece);
        self.token_count += tokens;
    }

    /// Emit the buffer when `tokens` more would exceed `limit`. The overlap is
    /// dropped if the next piece would not fit next to it.
    fn make_room(&mut self, tokens: usize, limit: usize, overlap_chars: usize) -> Option<Taken> {
        if !self.would_overflow(tokens, limit) {
            return None;
        }

        let taken = self.take(overlap_chars);
        if self.would_overflow(tokens, limit) {
            self.text.clear();
            self.token_count = 0;
        }
        taken
    }

    /// Take the buffered text, leaving at most `overlap_chars` of its tail behind
    fn take(&mut self, overlap_chars: usize) -> Option<Taken> {
        if self.text.trim().is_empty() {
            self.text.clear();
            self.token_count = 0;
            return None;
        }

        let text = std::mem::take(&mut self.text);
        let token_count = self.token_count;

        self.text = overlap_tail(&text, overlap_chars).to_string();
        self.token_count = estimate_token_count(&self.text);

        Some(Taken { text, token_count })
    }
}

/// Last `max_chars` characters of `text`, not starting in the middle of a word.
/// Always a strict suffix: text no longer than `max_chars` has no tail.
fn overlap_tail(text: &str, max_chars: usize) -> &str {
    let total = text.chars().count();
    if max_chars == 0 || total <= max_chars {
        return "";
    }

    let start = text
        .char_indices()
        .nth(total - max_chars)
        .map(|(i, _)| i)
        .unwrap_or(0);
    let tail = &text[start..];

    let starts_mid_word = text[..start]
        .chars()
        .next_back()
        .is_some_and(|c| !c.is_whitespace());

    if starts_mid_word {
        tail.find(char::is_whitespace)
            .map(|i| tail[i..].trim())
            .unwrap_or("")
    } else {
        tail.trim()
    }
}

/// Group words so each group stays within `limit` tokens. A single word over
/// the limit becomes its own group.
fn split_words(text: &str, limit: usize) -> Vec<String> {
    let mut groups = Vec::new();
    let mut current = ChunkBuffer::new(" ");

    for word in text.split_whitespace() {
        let tokens = estimate_token_count(word);
        if current.would_overflow(tokens, limit) {
            if let Some(group) = current.take(0) {
                groups.push(group.text);
            }
        }
        current.push(word, tokens);
    }

    if let Some(group) = current.take(0) {
        groups.push(group.text);
    }

    groups
}

/// Calculate approximate token count for a text
/// This is a very simple estimation - words plus punctuation
pub fn estimate_token_count(text: &str) -> usize {
    let words = text.split_whitespace().count();
    let punctuation = text.chars().filter(|c| c.is_ascii_punctuation()).count();
    words + punctuation
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_token_count() {
        assert_eq!(estimate_token_count("one two three."), 4);
        assert_eq!(estimate_token_count(""), 0);
        assert_eq!(estimate_token_count("a, b!"), 4);
    }

    #[test]
    fn test_small_text_is_one_chunk() {
        let chunks = TextSplitter::default().split_text("Hello world.\n\nSecond paragraph.", "doc");

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Hello world.\n\nSecond paragraph.");
        assert_eq!(chunks[0].source, "doc");
        assert_eq!(chunks[0].token_count, 6);
    }

    #[test]
    fn test_empty_text_has_no_chunks() {
        assert!(TextSplitter::default().split_text("\n\n  \n\n", "doc").is_empty());
    }

    #[test]
    fn test_paragraphs_are_packed_without_overlap() {
        let splitter = TextSplitter::new(5, 0);

        let chunks = splitter.split_text("aa bb\n\ncc dd\n\nee ff", "doc");

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["aa bb\n\ncc dd", "ee ff"]);
        assert!(chunks.iter().all(|c| c.token_count <= 5));
    }

    #[test]
    fn test_overlap_carries_whole_words() {
        let splitter = TextSplitter::new(5, 1);

        let chunks = splitter.split_text("aa bb\n\ncc dd\n\nee ff", "doc");

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].text, "dd\n\nee ff");
    }

    #[test]
    fn test_short_chunk_is_not_repeated_as_overlap() {
        let splitter = TextSplitter::new(5, 2);

        let chunks = splitter.split_text("aa bb cc\n\ndd ee ff gg\n\nhh", "doc");

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["aa bb cc", "dd ee ff gg\n\nhh"]);
        assert!(chunks.iter().all(|c| c.token_count <= 5));
    }

    #[test]
    fn test_overlap_never_pushes_chunk_over_limit() {
        let splitter = TextSplitter::new(6, 3);
        let text = "one two three four five\n\nsix seven eight nine\n\nten\n\n\
                    eleven twelve thirteen fourteen fifteen. Sixteen seventeen eighteen.";

        let chunks = splitter.split_text(text, "doc");

        assert!(chunks.len() > 2);
        for chunk in &chunks {
            assert!(chunk.token_count <= 6, "{:?}", chunk);
            assert_eq!(chunk.token_count, estimate_token_count(&chunk.text));
        }
    }

    #[test]
    fn test_large_paragraph_is_split_into_sentences() {
        let splitter = TextSplitter::new(6, 0);
        let text = "intro\n\nOne two three. Four five six. Seven eight\n\noutro";

        let chunks = splitter.split_text(text, "doc");

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                "intro",
                "One two three.",
                "Four five six.",
                "Seven eight.",
                "outro"
            ]
        );
    }

    #[test]
    fn test_long_sentence_is_split_on_words() {
        let splitter = TextSplitter::new(3, 0);

        let chunks = splitter.split_text("a b c d e f g", "doc");

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["a b c", "d e f", "g."]);
    }

    #[test]
    fn test_split_documents_keeps_sources() {
        let docs = vec![
            Document::new("first page", "https://example.com/a"),
            Document::new("second page", "https://example.com/b"),
        ];

        let chunks = TextSplitter::default().split_documents(&docs);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].source, "https://example.com/a");
        assert_eq!(chunks[1].text, "second page");
    }

    #[test]
    fn test_overlap_tail() {
        assert_eq!(overlap_tail("hello world", 0), "");
        assert_eq!(overlap_tail("hello world", 100), "");
        assert_eq!(overlap_tail("hello world", 11), "");
        assert_eq!(overlap_tail("hello world", 5), "world");
        assert_eq!(overlap_tail("hello world", 3), "");
    }
}
