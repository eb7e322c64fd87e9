//! Bookmark import: Netscape HTML parsing, input discovery and title cleanup.
//!
//! Every major browser exports bookmarks in the Netscape bookmark file
//! format. This crate turns those files into [`Bookmark`] values, dropping
//! entries that do not point at a web page.
//!
//! [`Bookmark`]: cleanbook_shared::Bookmark

mod inputs;
mod parser;
mod title;

pub use inputs::{collect_inputs, load_file};
pub use parser::{is_valid_url, parse_bookmarks_html};
pub use title::{clean_title, strip_indicators};
