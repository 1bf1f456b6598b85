//! Image occurrence validation and content-addressing.

use serde::{Deserialize, Serialize};

use crate::content::hashing::sha256_hex;
use crate::error::OccurrenceError;

/// One observed image reference, anchored into the normalized text.
///
/// `normalized_text_offset` is a character offset into the normalized content
/// text; `original_index` is the image's position in the source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageOccurrence {
    pub original_index: i32,
    pub normalized_text_offset: i64,
    pub source_url: String,
    pub caption_text: Option<String>,
}

/// Validate observed occurrences against the resolved content length and
/// return them sorted by `original_index`.
///
/// Rules, each with its own error: indices exactly contiguous `0..n-1`,
/// offsets within the content, offsets non-decreasing in index order.
pub fn validate_occurrences(
    mut occurrences: Vec<ImageOccurrence>,
    content_len: usize,
) -> Result<Vec<ImageOccurrence>, OccurrenceError> {
    occurrences.sort_by_key(|o| o.original_index);

    let mut previous_offset: Option<i64> = None;
    for (position, occurrence) in occurrences.iter().enumerate() {
        if occurrence.original_index != position as i32 {
            return Err(OccurrenceError::NonContiguousOriginalIndex {
                expected: position as i32,
                found: occurrence.original_index,
            });
        }
        if occurrence.normalized_text_offset > content_len as i64 {
            return Err(OccurrenceError::OffsetExceedsContentLength {
                offset: occurrence.normalized_text_offset,
                content_len: content_len as i64,
            });
        }
        if let Some(previous) = previous_offset {
            if occurrence.normalized_text_offset < previous {
                return Err(OccurrenceError::DecreasingNormalizedTextOffset {
                    offset: occurrence.normalized_text_offset,
                    previous,
                });
            }
        }
        previous_offset = Some(occurrence.normalized_text_offset);
    }

    Ok(occurrences)
}

/// Content address of a validated, sorted occurrence list.
pub fn occurrences_hash(occurrences: &[ImageOccurrence]) -> String {
    let serialized =
        serde_json::to_vec(occurrences).expect("occurrence list serialization is infallible");
    sha256_hex(&serialized)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn occurrence(index: i32, offset: i64) -> ImageOccurrence {
        ImageOccurrence {
            original_index: index,
            normalized_text_offset: offset,
            source_url: format!("https://img.example.com/{index}.jpg"),
            caption_text: None,
        }
    }

    #[test]
    fn accepts_valid_occurrences_and_sorts_them() {
        let validated = validate_occurrences(
            vec![occurrence(1, 9), occurrence(0, 5)],
            20,
        )
        .unwrap();
        assert_eq!(validated[0].original_index, 0);
        assert_eq!(validated[1].original_index, 1);
    }

    #[test]
    fn accepts_the_empty_list() {
        assert!(validate_occurrences(vec![], 0).unwrap().is_empty());
    }

    #[test]
    fn rejects_a_gap_in_indices() {
        let err =
            validate_occurrences(vec![occurrence(0, 5), occurrence(2, 9)], 20).unwrap_err();
        assert_eq!(
            err,
            OccurrenceError::NonContiguousOriginalIndex {
                expected: 1,
                found: 2
            }
        );
    }

    #[test]
    fn rejects_duplicate_indices() {
        let err =
            validate_occurrences(vec![occurrence(0, 5), occurrence(0, 9)], 20).unwrap_err();
        assert!(matches!(
            err,
            OccurrenceError::NonContiguousOriginalIndex { .. }
        ));
    }

    #[test]
    fn rejects_decreasing_offsets() {
        let err =
            validate_occurrences(vec![occurrence(0, 10), occurrence(1, 4)], 20).unwrap_err();
        assert_eq!(
            err,
            OccurrenceError::DecreasingNormalizedTextOffset {
                offset: 4,
                previous: 10
            }
        );
    }

    #[test]
    fn allows_equal_offsets() {
        assert!(validate_occurrences(vec![occurrence(0, 4), occurrence(1, 4)], 20).is_ok());
    }

    #[test]
    fn rejects_offset_past_content_end() {
        let err = validate_occurrences(vec![occurrence(0, 9)], 8).unwrap_err();
        assert_eq!(
            err,
            OccurrenceError::OffsetExceedsContentLength {
                offset: 9,
                content_len: 8
            }
        );
    }

    #[test]
    fn offset_at_content_end_is_allowed() {
        assert!(validate_occurrences(vec![occurrence(0, 8)], 8).is_ok());
    }

    #[test]
    fn hash_is_order_and_content_sensitive() {
        let a = vec![occurrence(0, 1), occurrence(1, 2)];
        let b = vec![occurrence(0, 1), occurrence(1, 3)];
        assert_eq!(occurrences_hash(&a), occurrences_hash(&a));
        assert_ne!(occurrences_hash(&a), occurrences_hash(&b));
        assert_ne!(occurrences_hash(&a), occurrences_hash(&[]));
    }
}
