//! Text splitting for ragwatch.
//!
//! [`WindowChunker`] cuts text into chunks of at most `chunk_size`
//! characters, with consecutive chunks sharing `chunk_overlap` characters.
//! Cut points prefer paragraph breaks, then line breaks, then sentence ends,
//! then any whitespace, and only ever shorten a window.

pub mod window;

pub use window::{split_text, WindowChunker};
