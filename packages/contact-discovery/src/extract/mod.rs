//! Contact extraction from fetched pages.
//!
//! Extraction never aborts a job: malformed content and AI failures
//! produce an empty or partial candidate list plus a recorded failure
//! note, not an error.

pub mod rules;

use std::collections::BTreeMap;

use crate::querygen::scoring;
use crate::traits::provider::{ContactParser, FetchedPage, ParsedContact};
use crate::types::config::{ExtractionConfig, ExtractionStrategy, SearchCriteria};
use crate::types::contact::{ExtractedContact, ExtractionMethod, VerificationStatus};

/// What one page yielded.
#[derive(Debug, Default)]
pub struct ExtractionOutcome {
    /// Contacts at or above the confidence threshold.
    pub contacts: Vec<ExtractedContact>,

    /// Candidates dropped for falling under the threshold.
    pub below_threshold: usize,

    /// Failure note for the result metadata/job error list, if anything
    /// went wrong along the way.
    pub failure: Option<String>,
}

/// Turns page content into scored contact candidates.
pub struct ContactExtractor {
    config: ExtractionConfig,
}

impl Default for ContactExtractor {
    fn default() -> Self {
        Self::new(ExtractionConfig::default())
    }
}

impl ContactExtractor {
    /// Create an extractor with the given tuning.
    pub fn new(config: ExtractionConfig) -> Self {
        Self { config }
    }

    /// Extract contacts from a page.
    ///
    /// `parser` is the optional AI collaborator; without it the Hybrid
    /// strategy degrades to rule-based output.
    pub async fn extract(
        &self,
        page: &FetchedPage,
        criteria: &SearchCriteria,
        confidence_threshold: f32,
        parser: Option<&dyn ContactParser>,
    ) -> ExtractionOutcome {
        let mut outcome = ExtractionOutcome::default();

        if page.content.trim().is_empty() {
            outcome.failure = Some("empty page content".to_string());
            return outcome;
        }

        let run_rules = matches!(
            self.config.strategy,
            ExtractionStrategy::RuleBased | ExtractionStrategy::Hybrid
        );
        let run_ai = matches!(
            self.config.strategy,
            ExtractionStrategy::AiBased | ExtractionStrategy::Hybrid
        );

        let rule_candidates = if run_rules {
            rules::extract_candidates(&page.content, self.config.max_contacts_per_page)
        } else {
            Vec::new()
        };

        let ai_candidates = if run_ai {
            match parser {
                Some(parser) => match parser.parse_contacts(&page.content, &page.url).await {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        tracing::warn!(
                            url = %page.url,
                            error = %e,
                            "AI contact parsing failed, degrading to rules"
                        );
                        outcome.failure = Some(format!("AI parsing failed: {e}"));
                        Vec::new()
                    }
                },
                None => Vec::new(),
            }
        } else {
            Vec::new()
        };

        let merged = merge_candidates(rule_candidates, ai_candidates);

        for mut contact in merged {
            contact.relevance_score = relevance_for(&contact, page, criteria);
            contact.quality_score = contact.completeness();
            contact.verification_status = VerificationStatus::Pending;

            if contact.confidence_score < confidence_threshold {
                outcome.below_threshold += 1;
                continue;
            }
            outcome.contacts.push(contact);
        }

        outcome.contacts.sort_by(|a, b| {
            b.confidence_score
                .partial_cmp(&a.confidence_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.name.cmp(&b.name))
        });
        outcome.contacts.truncate(self.config.max_contacts_per_page);

        tracing::debug!(
            url = %page.url,
            kept = outcome.contacts.len(),
            dropped = outcome.below_threshold,
            "extraction finished"
        );
        outcome
    }
}

/// Merge rule and AI candidates keyed by email (preferred) or normalized
/// name. Overlapping candidates merge field-by-field, the higher-confidence
/// source winning per field; their method becomes Hybrid.
fn merge_candidates(
    rule_candidates: Vec<rules::RuleCandidate>,
    ai_candidates: Vec<ParsedContact>,
) -> Vec<ExtractedContact> {
    fn key(email: Option<&str>, name: &str) -> String {
        match email {
            Some(e) => format!("email:{}", e.to_lowercase()),
            None => format!("name:{}", normalize(name)),
        }
    }

    // BTreeMap keeps merge order independent of discovery order.
    let mut by_key: BTreeMap<String, ExtractedContact> = BTreeMap::new();

    for candidate in rule_candidates {
        let mut contact = ExtractedContact::new(candidate.name, ExtractionMethod::RuleBased);
        contact.title = candidate.title;
        contact.bio = candidate.bio;
        contact.email = candidate.email;
        contact.phone = candidate.phone;
        contact.social_profiles = candidate.social_profiles;
        contact.confidence_score = candidate.confidence;
        by_key.insert(key(contact.email.as_deref(), &contact.name), contact);
    }

    for parsed in ai_candidates {
        if parsed.name.trim().is_empty() {
            continue;
        }
        let k = key(parsed.email.as_deref(), &parsed.name);
        // A name-keyed rule candidate may gain an email from the AI side.
        let name_key = format!("name:{}", normalize(&parsed.name));
        let existing = by_key.remove(&k).or_else(|| by_key.remove(&name_key));

        let merged = match existing {
            Some(mut contact) => {
                let ai_wins = parsed.confidence > contact.confidence_score;
                merge_field(&mut contact.title, parsed.title, ai_wins);
                merge_field(&mut contact.outlet, parsed.outlet, ai_wins);
                merge_field(&mut contact.bio, parsed.bio, ai_wins);
                merge_field(&mut contact.email, parsed.email, ai_wins);
                merge_field(&mut contact.phone, parsed.phone, ai_wins);
                for social in parsed.social_profiles {
                    if !contact.social_profiles.contains(&social) {
                        contact.social_profiles.push(social);
                    }
                }
                contact.confidence_score = contact.confidence_score.max(parsed.confidence);
                contact.extraction_method = ExtractionMethod::Hybrid;
                contact
            }
            None => {
                let mut contact = ExtractedContact::new(parsed.name, ExtractionMethod::AiBased);
                contact.title = parsed.title;
                contact.outlet = parsed.outlet;
                contact.bio = parsed.bio;
                contact.email = parsed.email;
                contact.phone = parsed.phone;
                contact.social_profiles = parsed.social_profiles;
                contact.confidence_score = parsed.confidence;
                contact
            }
        };
        by_key.insert(key(merged.email.as_deref(), &merged.name), merged);
    }

    by_key.into_values().collect()
}

/// Fill an empty field from the other source; on conflict the
/// higher-confidence source wins.
fn merge_field(target: &mut Option<String>, incoming: Option<String>, incoming_wins: bool) {
    if let Some(value) = incoming {
        if target.is_none() || incoming_wins {
            *target = Some(value);
        }
    }
}

fn normalize(text: &str) -> String {
    text.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Fit of a contact to the search criteria: fraction of criteria terms
/// present in the contact's own text plus the page title. Neutral 0.5
/// when no criteria terms exist.
fn relevance_for(contact: &ExtractedContact, page: &FetchedPage, criteria: &SearchCriteria) -> f32 {
    let terms = criteria.terms();
    if terms.is_empty() {
        return 0.5;
    }

    let mut haystack = contact.name.clone();
    for part in [&contact.title, &contact.outlet, &contact.bio, &page.title] {
        if let Some(text) = part {
            haystack.push(' ');
            haystack.push_str(text);
        }
    }
    let haystack_tokens = scoring::tokens(&haystack);

    let matched = terms
        .iter()
        .filter(|term| {
            scoring::tokens(term)
                .iter()
                .any(|t| haystack_tokens.contains(t))
        })
        .count();
    matched as f32 / terms.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use url::Url;

    use crate::error::{DiscoveryError, Result};

    struct StaticParser {
        contacts: Vec<ParsedContact>,
    }

    #[async_trait]
    impl ContactParser for StaticParser {
        async fn parse_contacts(&self, _content: &str, _url: &Url) -> Result<Vec<ParsedContact>> {
            Ok(self.contacts.clone())
        }
    }

    struct FailingParser;

    #[async_trait]
    impl ContactParser for FailingParser {
        async fn parse_contacts(&self, _content: &str, _url: &Url) -> Result<Vec<ParsedContact>> {
            Err(DiscoveryError::Ai("model overloaded".into()))
        }
    }

    fn page(content: &str) -> FetchedPage {
        FetchedPage::new(Url::parse("https://news.example.com/staff").unwrap(), content)
            .with_title("Staff directory")
    }

    #[tokio::test]
    async fn test_below_threshold_filtered() {
        let extractor = ContactExtractor::default();
        let parser = StaticParser {
            contacts: vec![ParsedContact {
                name: "Low Confidence".into(),
                confidence: 0.3,
                ..Default::default()
            }],
        };

        let outcome = extractor
            .extract(&page("some text"), &SearchCriteria::new(), 0.5, Some(&parser))
            .await;
        assert!(outcome.contacts.is_empty());
        assert_eq!(outcome.below_threshold, 1);
    }

    #[tokio::test]
    async fn test_parser_failure_degrades_to_rules() {
        let extractor = ContactExtractor::default();
        let content = "By Jane Doe\nmailto:jane.doe@example.com";

        let outcome = extractor
            .extract(&page(content), &SearchCriteria::new(), 0.5, Some(&FailingParser))
            .await;

        assert_eq!(outcome.contacts.len(), 1);
        assert_eq!(outcome.contacts[0].name, "Jane Doe");
        assert!(outcome.failure.as_deref().unwrap().contains("AI parsing failed"));
    }

    #[tokio::test]
    async fn test_empty_content_records_failure() {
        let extractor = ContactExtractor::default();
        let outcome = extractor
            .extract(&page("   "), &SearchCriteria::new(), 0.5, None)
            .await;
        assert!(outcome.contacts.is_empty());
        assert!(outcome.failure.is_some());
    }

    #[tokio::test]
    async fn test_hybrid_merges_by_email() {
        let extractor = ContactExtractor::default();
        let content = "By Jane Doe\njane.doe@example.com";
        let parser = StaticParser {
            contacts: vec![ParsedContact {
                name: "Jane Doe".into(),
                email: Some("jane.doe@example.com".into()),
                title: Some("Climate Editor".into()),
                outlet: Some("Example News".into()),
                confidence: 0.95,
                ..Default::default()
            }],
        };

        let outcome = extractor
            .extract(&page(content), &SearchCriteria::new(), 0.5, Some(&parser))
            .await;

        assert_eq!(outcome.contacts.len(), 1);
        let contact = &outcome.contacts[0];
        assert_eq!(contact.extraction_method, ExtractionMethod::Hybrid);
        assert_eq!(contact.title.as_deref(), Some("Climate Editor"));
        assert_eq!(contact.outlet.as_deref(), Some("Example News"));
        assert_eq!(contact.confidence_score, 0.95);
    }

    #[tokio::test]
    async fn test_contacts_start_pending_with_quality() {
        let extractor = ContactExtractor::default();
        let content = "Maria Schmidt — Senior Climate Correspondent\nmaria.schmidt@paper.de";

        let outcome = extractor
            .extract(&page(content), &SearchCriteria::new(), 0.5, None)
            .await;
        let contact = &outcome.contacts[0];
        assert_eq!(contact.verification_status, VerificationStatus::Pending);
        assert!(contact.quality_score > 0.5);
    }

    #[tokio::test]
    async fn test_relevance_tracks_criteria() {
        let extractor = ContactExtractor::default();
        let content = "Maria Schmidt — Senior Climate Correspondent\nmaria.schmidt@paper.de";
        let criteria = SearchCriteria::new().with_beats(["climate"]);

        let outcome = extractor.extract(&page(content), &criteria, 0.5, None).await;
        assert_eq!(outcome.contacts[0].relevance_score, 1.0);

        let off_topic = SearchCriteria::new().with_beats(["fintech"]);
        let outcome = extractor.extract(&page(content), &off_topic, 0.5, None).await;
        assert_eq!(outcome.contacts[0].relevance_score, 0.0);
    }

    #[tokio::test]
    async fn test_rule_based_strategy_skips_parser() {
        let extractor =
            ContactExtractor::new(ExtractionConfig::new().with_strategy(ExtractionStrategy::RuleBased));
        let parser = StaticParser {
            contacts: vec![ParsedContact {
                name: "Ai Only".into(),
                confidence: 0.99,
                ..Default::default()
            }],
        };

        let outcome = extractor
            .extract(
                &page("By Jane Doe\njane.doe@example.com"),
                &SearchCriteria::new(),
                0.5,
                Some(&parser),
            )
            .await;
        assert!(outcome.contacts.iter().all(|c| c.name != "Ai Only"));
    }
}
