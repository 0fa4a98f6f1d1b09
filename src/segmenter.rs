//! Document segmentation.
//!
//! Chunks are produced lazily from the remaining unsent suffix of the
//! document; the total-chunk estimate is not fixed and may grow when the
//! chunk size shrinks mid-delivery.

/// One bounded-size slice of the document, submitted as a single message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// 1-based position in the delivery sequence
    pub index: u32,

    /// Current estimate of the total chunk count (`>= index`, may grow)
    pub total_estimate: u32,

    /// The slice content
    pub text: String,
}

impl Chunk {
    /// Whether this chunk exhausts the remaining document at the size it was
    /// produced under.
    pub fn is_last(&self) -> bool {
        self.index == self.total_estimate
    }
}

/// Pure chunk producer. No state beyond its inputs: the caller owns the
/// remaining suffix and the current size.
pub struct Segmenter;

impl Segmenter {
    /// Produce the next chunk: the first `size` characters of `remaining`
    /// (all of it if fewer). Returns `None` when nothing remains, which the
    /// state machine treats as the terminal transition trigger.
    ///
    /// `index` is the 1-based position this chunk will occupy;
    /// `prior_estimate` is the estimate announced so far, never lowered.
    pub fn next_chunk(
        remaining: &str,
        size: usize,
        index: u32,
        prior_estimate: u32,
    ) -> Option<Chunk> {
        if remaining.is_empty() {
            return None;
        }

        let text = take_chars(remaining, size).to_string();
        let total_estimate = prior_estimate.max(index - 1 + plan_estimate(remaining, size));

        Some(Chunk {
            index,
            total_estimate,
            text,
        })
    }

    /// How many chunks of `size` characters the remaining text needs.
    pub fn plan_estimate(remaining: &str, size: usize) -> u32 {
        plan_estimate(remaining, size)
    }
}

fn plan_estimate(remaining: &str, size: usize) -> u32 {
    if remaining.is_empty() || size == 0 {
        return 0;
    }
    let chars = remaining.chars().count();
    chars.div_ceil(size) as u32
}

/// First `n` characters of `s` as a prefix slice, UTF-8 boundary safe.
pub fn take_chars(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((byte_idx, _)) => &s[..byte_idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_chunks_cover_document() {
        let doc = "a".repeat(25_000);
        let mut remaining = doc.as_str();
        let mut index = 1;
        let mut estimate = 0;
        let mut reassembled = String::new();
        let mut sizes = Vec::new();

        while let Some(chunk) = Segmenter::next_chunk(remaining, 10_000, index, estimate) {
            sizes.push(chunk.text.chars().count());
            estimate = chunk.total_estimate;
            remaining = &remaining[chunk.text.len()..];
            reassembled.push_str(&chunk.text);
            index += 1;
        }

        assert_eq!(sizes, vec![10_000, 10_000, 5_000]);
        assert_eq!(reassembled, doc);
    }

    #[test]
    fn test_estimate_never_decreases() {
        let doc = "x".repeat(9_000);
        // First chunk planned at size 5000: estimate 2
        let first = Segmenter::next_chunk(&doc, 5_000, 1, 0).unwrap();
        assert_eq!(first.total_estimate, 2);

        // Size shrinks; estimate recomputed from the remaining suffix grows
        let remaining = &doc[first.text.len()..];
        let second = Segmenter::next_chunk(remaining, 2_000, 2, first.total_estimate).unwrap();
        assert_eq!(second.total_estimate, 3);
        assert!(second.total_estimate >= second.index);

        // A prior larger estimate is never lowered
        let third = Segmenter::next_chunk(remaining, 100_000, 2, 5).unwrap();
        assert_eq!(third.total_estimate, 5);
    }

    #[test]
    fn test_empty_remaining_is_terminal() {
        assert_eq!(Segmenter::next_chunk("", 1_000, 1, 0), None);
    }

    #[test]
    fn test_single_chunk_document() {
        let chunk = Segmenter::next_chunk("short note", 1_000, 1, 0).unwrap();
        assert_eq!(chunk.text, "short note");
        assert_eq!(chunk.total_estimate, 1);
        assert!(chunk.is_last());
    }

    #[test]
    fn test_multibyte_boundary() {
        // 4 characters, 12 bytes; slicing by chars must not split a codepoint
        let doc = "日本語文";
        let chunk = Segmenter::next_chunk(doc, 3, 1, 0).unwrap();
        assert_eq!(chunk.text, "日本語");
        assert_eq!(chunk.total_estimate, 2);
    }

    #[test]
    fn test_take_chars() {
        assert_eq!(take_chars("hello", 2), "he");
        assert_eq!(take_chars("hello", 99), "hello");
        assert_eq!(take_chars("", 3), "");
    }
}
