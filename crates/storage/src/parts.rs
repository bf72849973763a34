//! Part layout planning for uploads.
//!
//! This module contains pure logic for single-vs-multipart decisions and
//! part sizing. No I/O operations - just decision making.

use blob_artifacts_common::{
    DEFAULT_MULTIPART_THRESHOLD, DEFAULT_PART_SIZE, MAX_PARTS, MAX_SINGLE_PART_SIZE,
};

use crate::error::ServiceError;

/// Thresholds used to choose between single and multipart uploads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartPolicy {
    /// Preferred part size for multipart uploads.
    pub part_size: u64,
    /// Uploads larger than this go multipart unless forced otherwise.
    pub multipart_threshold: u64,
    /// Maximum number of parts; the part size grows to stay under it.
    pub max_parts: usize,
    /// Largest upload allowed in a single request.
    pub max_single_part_size: u64,
}

impl Default for PartPolicy {
    fn default() -> Self {
        Self {
            part_size: DEFAULT_PART_SIZE,
            multipart_threshold: DEFAULT_MULTIPART_THRESHOLD,
            max_parts: MAX_PARTS,
            max_single_part_size: MAX_SINGLE_PART_SIZE,
        }
    }
}

impl PartPolicy {
    /// Set the preferred part size.
    pub fn with_part_size(mut self, part_size: u64) -> Self {
        self.part_size = part_size;
        self
    }

    /// Set the size above which uploads go multipart.
    pub fn with_multipart_threshold(mut self, threshold: u64) -> Self {
        self.multipart_threshold = threshold;
        self
    }

    /// Set the maximum number of parts.
    pub fn with_max_parts(mut self, max_parts: usize) -> Self {
        self.max_parts = max_parts;
        self
    }
}

/// How an upload is split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadLayout {
    /// One signed request carries every byte.
    SinglePart,
    /// One signed request per `part_size` slice.
    Multipart { part_size: u64 },
}

/// Choose the layout for `size` transfer bytes.
///
/// Forcing both single and multipart is rejected. Without hints, uploads
/// above the policy threshold go multipart.
pub fn choose_layout(
    size: u64,
    policy: &PartPolicy,
    force_singlepart: bool,
    force_multipart: bool,
) -> Result<UploadLayout, ServiceError> {
    if force_singlepart && force_multipart {
        return Err(ServiceError::InvalidRequest {
            message: "cannot force both single-part and multipart upload".to_string(),
        });
    }

    let multipart: bool = force_multipart || (!force_singlepart && size > policy.multipart_threshold);

    if !multipart {
        if size > policy.max_single_part_size {
            return Err(ServiceError::InvalidRequest {
                message: format!(
                    "{} bytes exceed the single-part limit of {} bytes",
                    size, policy.max_single_part_size
                ),
            });
        }
        return Ok(UploadLayout::SinglePart);
    }

    if policy.part_size == 0 || policy.max_parts == 0 {
        return Err(ServiceError::InvalidRequest {
            message: "part size and part count limit must be non-zero".to_string(),
        });
    }

    // Smallest whole multiple of the preferred size that fits under max_parts
    let min_part: u64 = size.div_ceil(policy.max_parts as u64);
    let multiple: u64 = min_part.div_ceil(policy.part_size).max(1);

    Ok(UploadLayout::Multipart {
        part_size: multiple * policy.part_size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MB: u64 = 1024 * 1024;

    #[test]
    fn test_choose_layout_defaults() {
        let policy = PartPolicy::default();
        assert_eq!(
            choose_layout(10 * MB, &policy, false, false).unwrap(),
            UploadLayout::SinglePart
        );
        assert_eq!(
            choose_layout(200 * MB, &policy, false, false).unwrap(),
            UploadLayout::Multipart { part_size: DEFAULT_PART_SIZE }
        );
    }

    #[test]
    fn test_choose_layout_forced() {
        let policy = PartPolicy::default();
        assert_eq!(
            choose_layout(10 * MB + 1, &policy, false, true).unwrap(),
            UploadLayout::Multipart { part_size: DEFAULT_PART_SIZE }
        );
        assert_eq!(
            choose_layout(200 * MB, &policy, true, false).unwrap(),
            UploadLayout::SinglePart
        );
        assert!(choose_layout(10, &policy, true, true).is_err());
    }

    #[test]
    fn test_choose_layout_single_part_limit() {
        let policy = PartPolicy::default();
        assert!(choose_layout(MAX_SINGLE_PART_SIZE + 1, &policy, true, false).is_err());
    }

    #[test]
    fn test_choose_layout_grows_part_size() {
        let policy = PartPolicy::default().with_part_size(100).with_max_parts(4);
        // 1000 bytes at 100-byte parts would need 10 parts; 300 fits in 4
        let layout = choose_layout(1000, &policy, false, true).unwrap();
        assert_eq!(layout, UploadLayout::Multipart { part_size: 300 });
        assert_eq!(1000u64.div_ceil(300), 4);
    }
}
