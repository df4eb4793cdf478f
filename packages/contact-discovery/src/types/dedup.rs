//! Duplicate contact groups.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::contact::VerificationStatus;

/// Which matching rule formed a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateType {
    Email,
    NameOutlet,
    NameTitle,
    OutletTitle,
    SimilarBio,
    SocialMedia,
}

/// A cluster of contacts judged to be the same person.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub id: Uuid,

    pub duplicate_type: DuplicateType,

    /// 1.0 for exact-key matches, a fractional score for fuzzy ones.
    pub similarity_score: f32,

    /// Members, in deterministic (extraction-time) order.
    pub contact_ids: Vec<Uuid>,

    /// The chosen representative (always one of `contact_ids`).
    pub selected_contact: Uuid,

    pub verification_status: VerificationStatus,
}

impl DuplicateGroup {
    /// Create a group over the given members.
    pub fn new(
        duplicate_type: DuplicateType,
        similarity_score: f32,
        contact_ids: Vec<Uuid>,
        selected_contact: Uuid,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            duplicate_type,
            similarity_score,
            contact_ids,
            selected_contact,
            verification_status: VerificationStatus::Pending,
        }
    }

    /// Number of redundant members (everyone but the representative).
    pub fn duplicate_count(&self) -> usize {
        self.contact_ids.len().saturating_sub(1)
    }
}
