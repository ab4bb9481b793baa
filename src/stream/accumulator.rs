use super::Frame;

/// Folds the frames of one answer into a single growing text.
///
/// Append-only: no frame truncates or reorders what came before. There is no
/// notion of completion here; the end of the body ends the answer.
#[derive(Debug, Default)]
pub struct FragmentAccumulator {
    text: String,
    frames: usize,
}

impl FragmentAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a frame's fragment and return the accumulated text
    pub fn push(&mut self, frame: &Frame) -> &str {
        self.text.push_str(frame.fragment());
        self.frames += 1;
        &self.text
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Frames folded in so far, including empty ones
    pub fn frames(&self) -> usize {
        self.frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::FrameDecoder;

    fn frame(text: Option<&str>) -> Frame {
        Frame {
            text: text.map(str::to_string),
        }
    }

    #[test]
    fn test_concatenates_in_order() {
        let mut acc = FragmentAccumulator::new();
        assert_eq!(acc.push(&frame(Some("Hel"))), "Hel");
        assert_eq!(acc.push(&frame(Some("lo"))), "Hello");
        assert_eq!(acc.frames(), 2);
    }

    #[test]
    fn test_empty_fragments_count_but_add_nothing() {
        let mut acc = FragmentAccumulator::new();
        acc.push(&frame(None));
        acc.push(&frame(Some("")));
        acc.push(&frame(Some("x")));
        assert_eq!(acc.text(), "x");
        assert_eq!(acc.frames(), 3);
    }

    #[test]
    fn test_result_independent_of_chunking() {
        let body = b"{\"text\":\"The \"}\n{\"text\":\"quick \"}\n{}\nbroken\n{\"text\":\"fox\"}\n";
        let expected = "The quick fox";

        for chunk_size in 1..=body.len() {
            let mut decoder = FrameDecoder::new();
            let mut acc = FragmentAccumulator::new();
            for chunk in body.chunks(chunk_size) {
                for f in decoder.push(chunk) {
                    acc.push(&f);
                }
            }
            if let Some(f) = decoder.finish() {
                acc.push(&f);
            }
            assert_eq!(acc.text(), expected, "chunk size {chunk_size}");
            assert_eq!(acc.frames(), 4, "chunk size {chunk_size}");
        }
    }
}
