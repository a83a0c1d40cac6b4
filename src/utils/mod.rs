//! Shared utility functions.
//!
//! - `urls`: URL canonicalization and domain extraction
//! - `mime`: MIME type checks for downloaded bodies
//! - `process`: running external tools

mod mime;
pub mod process;
pub mod urls;

pub use mime::is_text_like;
pub use process::{run_tool, ToolError};
pub use urls::{canonicalize, extract_domain};
