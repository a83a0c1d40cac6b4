//! Data models for aggre.

mod content;
mod discussion;
mod source;
mod status;

pub use content::Content;
pub use discussion::{Discussion, DiscussionDraft, DiscussionField, UpsertOutcome};
pub use source::{Source, SourceType};
pub use status::{CommentsStatus, FetchStatus, TranscriptionStatus};
