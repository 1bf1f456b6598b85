pub mod content_blob;
pub mod image_occurrence_set;
pub mod post;
pub mod post_version;

pub use content_blob::ContentBlob;
pub use image_occurrence_set::ImageOccurrenceSet;
pub use post::Post;
pub use post_version::{ContentProvenance, PostVersion};
