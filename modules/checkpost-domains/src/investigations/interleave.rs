//! Splice validated image occurrences into the normalized text.
//!
//! Each occurrence becomes either an inline image part or a text marker:
//! repeats of an already-embedded image, occurrences past the per-request
//! image budget, and images unavailable at inference time all degrade to
//! markers rather than failing the investigation.

use std::collections::HashMap;

use tracing::warn;

use checkpost_core::{ContentPart, ImageLoader};

use crate::content::hashing::sha256_hex;
use crate::content::occurrences::ImageOccurrence;

#[derive(Debug, Default)]
pub struct InterleaveOutcome {
    pub parts: Vec<ContentPart>,
    pub resolved: usize,
    pub reused: usize,
    pub omitted: usize,
    pub missing: usize,
}

/// Build the ordered multimodal parts for an investigation request.
///
/// `occurrences` must already be validated and sorted; offsets are character
/// offsets into `normalized_text`.
pub async fn interleave_content(
    normalized_text: &str,
    occurrences: &[ImageOccurrence],
    loader: &dyn ImageLoader,
    max_images: usize,
) -> InterleaveOutcome {
    let chars: Vec<char> = normalized_text.chars().collect();
    let mut outcome = InterleaveOutcome::default();
    let mut cursor = 0usize;
    let mut seen: HashMap<String, i32> = HashMap::new();

    for occurrence in occurrences {
        let offset = (occurrence.normalized_text_offset as usize).min(chars.len());
        if offset > cursor {
            outcome
                .parts
                .push(ContentPart::Text(chars[cursor..offset].iter().collect()));
            cursor = offset;
        }

        let index = occurrence.original_index;
        if outcome.resolved >= max_images {
            outcome.omitted += 1;
            outcome.parts.push(ContentPart::Text(format!(
                "[image {index} omitted: image budget reached]"
            )));
        } else {
            match loader.load(&occurrence.source_url).await {
                Ok(Some(blob)) => {
                    let hash = sha256_hex(&blob.bytes);
                    if let Some(&earlier) = seen.get(&hash) {
                        outcome.reused += 1;
                        outcome.parts.push(ContentPart::Text(format!(
                            "[image {index}: same image as image {earlier}]"
                        )));
                    } else {
                        seen.insert(hash, index);
                        outcome.resolved += 1;
                        outcome.parts.push(ContentPart::Image {
                            media_type: blob.media_type,
                            bytes: blob.bytes,
                        });
                    }
                }
                Ok(None) => {
                    outcome.missing += 1;
                    outcome
                        .parts
                        .push(ContentPart::Text(format!("[image {index} unavailable]")));
                }
                Err(error) => {
                    warn!(url = %occurrence.source_url, %error, "image load errored");
                    outcome.missing += 1;
                    outcome
                        .parts
                        .push(ContentPart::Text(format!("[image {index} unavailable]")));
                }
            }
        }

        if let Some(caption) = &occurrence.caption_text {
            outcome
                .parts
                .push(ContentPart::Text(format!("[image {index} caption: {caption}]")));
        }
    }

    if cursor < chars.len() {
        outcome
            .parts
            .push(ContentPart::Text(chars[cursor..].iter().collect()));
    }

    outcome
}
