pub mod hashing;
pub mod models;
pub mod normalize;
pub mod occurrences;
pub mod resolver;

pub use models::{ContentBlob, ContentProvenance, ImageOccurrenceSet, Post, PostVersion};
pub use occurrences::ImageOccurrence;
pub use resolver::{resolve_content_identity, RawSubmission, ResolvedIdentity};
