//! Terminal output and prompt helpers.

mod output;
pub mod prompts;

pub use output::*;
