//! Text utilities for sanitizing feed content.
//!
//! - **HTML stripping**: [`clean_description`] turns markup into a short summary
//! - **Truncation**: character-safe truncation with an ellipsis
//! - **Sanitizing**: removal of terminal control sequences from feed text
//!
//! # Examples
//!
//! ```
//! use feedpulse::util::{clean_description, truncate_chars};
//!
//! assert_eq!(clean_description("<p>Hello <b>World</b></p>"), "Hello World");
//! assert_eq!(truncate_chars("Hello World", 8), "Hello...");
//! ```

mod text;

pub use text::{clean_description, strip_control_chars, truncate_chars, MAX_SUMMARY_CHARS};
