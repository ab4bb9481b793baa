//! Streaming protocol consumer
//!
//! The answer arrives as newline-delimited JSON records, each carrying the
//! next fragment of answer text. The decoder turns raw body chunks into
//! frames; the accumulator folds frames into the growing answer.

mod accumulator;
mod decoder;

pub use accumulator::FragmentAccumulator;
pub use decoder::{Frame, FrameDecoder};
