//! Extracted contact records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Human review state of a contact.
///
/// New contacts always start `Pending`; the extractor never confirms or
/// rejects on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    #[default]
    Pending,
    Confirmed,
    Rejected,
    ManualReview,
}

/// How a contact was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    AiBased,
    RuleBased,
    Hybrid,
    Manual,
}

/// A media contact candidate parsed from one source page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedContact {
    pub id: Uuid,

    /// Full name as it appeared on the page.
    pub name: String,

    /// Job title (e.g., "Senior Climate Correspondent").
    pub title: Option<String>,

    /// Outlet the contact writes for.
    pub outlet: Option<String>,

    /// Short biography or byline blurb.
    pub bio: Option<String>,

    pub email: Option<String>,
    pub phone: Option<String>,

    /// Social profile URLs.
    #[serde(default)]
    pub social_profiles: Vec<String>,

    /// Certainty that this is a genuine media contact.
    pub confidence_score: f32,

    /// Fit to the search criteria.
    pub relevance_score: f32,

    /// Completeness of the record's fields.
    pub quality_score: f32,

    #[serde(default)]
    pub verification_status: VerificationStatus,

    pub extraction_method: ExtractionMethod,

    pub extracted_at: DateTime<Utc>,
}

impl ExtractedContact {
    /// Create a minimally-populated contact for a name.
    pub fn new(name: impl Into<String>, method: ExtractionMethod) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            title: None,
            outlet: None,
            bio: None,
            email: None,
            phone: None,
            social_profiles: Vec::new(),
            confidence_score: 0.0,
            relevance_score: 0.0,
            quality_score: 0.0,
            verification_status: VerificationStatus::Pending,
            extraction_method: method,
            extracted_at: Utc::now(),
        }
    }

    /// Set the email address.
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Set the job title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set the outlet.
    pub fn with_outlet(mut self, outlet: impl Into<String>) -> Self {
        self.outlet = Some(outlet.into());
        self
    }

    /// Set the bio.
    pub fn with_bio(mut self, bio: impl Into<String>) -> Self {
        self.bio = Some(bio.into());
        self
    }

    /// Set the confidence score.
    pub fn with_confidence(mut self, score: f32) -> Self {
        self.confidence_score = score;
        self
    }

    /// Completeness measure over the record's fields.
    ///
    /// Email dominates because it is the actionable field; name is assumed
    /// present (a contact without a name is not a candidate).
    pub fn completeness(&self) -> f32 {
        let mut score: f32 = 0.2; // name
        if self.email.is_some() {
            score += 0.35;
        }
        if self.title.is_some() {
            score += 0.15;
        }
        if self.outlet.is_some() {
            score += 0.1;
        }
        if self.bio.is_some() {
            score += 0.1;
        }
        if self.phone.is_some() {
            score += 0.05;
        }
        if !self.social_profiles.is_empty() {
            score += 0.05;
        }
        score.min(1.0)
    }
}
