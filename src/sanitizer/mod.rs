//! Text sanitization for voice output: incremental stream-to-sentence
//! splitting and whole-response cleanup (spec.md §4.1, §4.2).

mod response;
mod stream;

pub use response::{
    convert_symbols, extract_code_blocks, is_code_heavy, normalize_whitespace, remove_code_blocks,
    remove_emoji, remove_markdown, sanitize_for_sentence,
};
pub use stream::StreamSanitizer;
