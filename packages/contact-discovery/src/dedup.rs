//! Contact deduplication across all results of a job.
//!
//! Matching rules run in priority order and a contact joins at most one
//! group. The whole pass is deterministic: candidates are visited in
//! extraction-time order, so reprocessing the same set reproduces the
//! same groups and representatives.

use std::collections::BTreeMap;

use crate::querygen::scoring;
use crate::types::config::DedupConfig;
use crate::types::contact::ExtractedContact;
use crate::types::dedup::{DuplicateGroup, DuplicateType};
use uuid::Uuid;

/// Result of a deduplication pass.
#[derive(Debug, Default)]
pub struct DedupOutcome {
    pub groups: Vec<DuplicateGroup>,

    /// One contact per real-world person: group representatives plus
    /// contacts that matched no group, in input order.
    pub unique_contacts: Vec<ExtractedContact>,

    /// Redundant members across all groups.
    pub duplicate_count: usize,
}

/// Clusters contacts into duplicate groups and picks representatives.
pub struct Deduplicator {
    config: DedupConfig,
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self::new(DedupConfig::default())
    }
}

impl Deduplicator {
    /// Create a deduplicator with the given tuning.
    pub fn new(config: DedupConfig) -> Self {
        Self { config }
    }

    /// Cluster `contacts` into duplicate groups.
    pub fn deduplicate(&self, contacts: &[ExtractedContact]) -> DedupOutcome {
        // Deterministic visiting order regardless of how the caller
        // assembled the slice.
        let mut order: Vec<usize> = (0..contacts.len()).collect();
        order.sort_by(|&a, &b| {
            contacts[a]
                .extracted_at
                .cmp(&contacts[b].extracted_at)
                .then(contacts[a].id.cmp(&contacts[b].id))
        });

        let mut consumed = vec![false; contacts.len()];
        let mut groups: Vec<DuplicateGroup> = Vec::new();

        for rule in [
            DuplicateType::Email,
            DuplicateType::NameOutlet,
            DuplicateType::NameTitle,
            DuplicateType::OutletTitle,
        ] {
            self.apply_exact_rule(rule, contacts, &order, &mut consumed, &mut groups);
        }
        self.apply_bio_rule(contacts, &order, &mut consumed, &mut groups);
        self.apply_social_rule(contacts, &order, &mut consumed, &mut groups);

        let duplicate_count = groups.iter().map(DuplicateGroup::duplicate_count).sum();

        let mut unique_contacts = Vec::new();
        for &index in &order {
            let contact = &contacts[index];
            if !consumed[index] {
                unique_contacts.push(contact.clone());
            } else if groups.iter().any(|g| g.selected_contact == contact.id) {
                unique_contacts.push(contact.clone());
            }
        }

        tracing::debug!(
            input = contacts.len(),
            groups = groups.len(),
            duplicates = duplicate_count,
            "deduplication finished"
        );

        DedupOutcome {
            groups,
            unique_contacts,
            duplicate_count,
        }
    }

    fn apply_exact_rule(
        &self,
        rule: DuplicateType,
        contacts: &[ExtractedContact],
        order: &[usize],
        consumed: &mut [bool],
        groups: &mut Vec<DuplicateGroup>,
    ) {
        let mut buckets: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for &index in order {
            if consumed[index] {
                continue;
            }
            if let Some(key) = exact_key(rule, &contacts[index]) {
                buckets.entry(key).or_default().push(index);
            }
        }

        for (_, members) in buckets {
            if members.len() < 2 {
                continue;
            }
            for &index in &members {
                consumed[index] = true;
            }
            groups.push(build_group(rule, 1.0, &members, contacts));
        }
    }

    fn apply_bio_rule(
        &self,
        contacts: &[ExtractedContact],
        order: &[usize],
        consumed: &mut [bool],
        groups: &mut Vec<DuplicateGroup>,
    ) {
        for (position, &seed) in order.iter().enumerate() {
            if consumed[seed] {
                continue;
            }
            let Some(seed_bio) = contacts[seed].bio.as_deref() else {
                continue;
            };
            let seed_tokens = scoring::tokens(seed_bio);
            if seed_tokens.is_empty() {
                continue;
            }

            let mut members = vec![seed];
            let mut similarity_sum = 0.0f32;
            for &other in &order[position + 1..] {
                if consumed[other] {
                    continue;
                }
                let Some(other_bio) = contacts[other].bio.as_deref() else {
                    continue;
                };
                let sim = scoring::similarity(&seed_tokens, &scoring::tokens(other_bio));
                if sim >= self.config.bio_similarity_threshold {
                    members.push(other);
                    similarity_sum += sim;
                }
            }

            if members.len() < 2 {
                continue;
            }
            for &index in &members {
                consumed[index] = true;
            }
            let similarity = similarity_sum / (members.len() - 1) as f32;
            groups.push(build_group(DuplicateType::SimilarBio, similarity, &members, contacts));
        }
    }

    fn apply_social_rule(
        &self,
        contacts: &[ExtractedContact],
        order: &[usize],
        consumed: &mut [bool],
        groups: &mut Vec<DuplicateGroup>,
    ) {
        let mut buckets: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for &index in order {
            if consumed[index] {
                continue;
            }
            for social in &contacts[index].social_profiles {
                let key = social.to_lowercase().trim_end_matches('/').to_string();
                let bucket = buckets.entry(key).or_default();
                if !bucket.contains(&index) {
                    bucket.push(index);
                }
            }
        }

        for (_, members) in buckets {
            let members: Vec<usize> = members.into_iter().filter(|&i| !consumed[i]).collect();
            if members.len() < 2 {
                continue;
            }
            for &index in &members {
                consumed[index] = true;
            }
            groups.push(build_group(DuplicateType::SocialMedia, 1.0, &members, contacts));
        }
    }
}

/// Grouping key for an exact-match rule, when the contact has both fields.
fn exact_key(rule: DuplicateType, contact: &ExtractedContact) -> Option<String> {
    match rule {
        DuplicateType::Email => contact.email.as_deref().map(|e| e.to_lowercase()),
        DuplicateType::NameOutlet => match (&contact.name, &contact.outlet) {
            (name, Some(outlet)) => Some(format!("{}|{}", normalize(name), normalize(outlet))),
            _ => None,
        },
        DuplicateType::NameTitle => contact
            .title
            .as_deref()
            .map(|title| format!("{}|{}", normalize(&contact.name), normalize(title))),
        DuplicateType::OutletTitle => match (&contact.outlet, &contact.title) {
            (Some(outlet), Some(title)) => {
                Some(format!("{}|{}", normalize(outlet), normalize(title)))
            }
            _ => None,
        },
        DuplicateType::SimilarBio | DuplicateType::SocialMedia => None,
    }
}

fn normalize(text: &str) -> String {
    text.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Pick the representative: highest quality, then highest confidence,
/// then earliest extraction, then smallest id for full stability.
fn select_representative(members: &[usize], contacts: &[ExtractedContact]) -> Uuid {
    let best = members
        .iter()
        .copied()
        .max_by(|&a, &b| {
            let ca = &contacts[a];
            let cb = &contacts[b];
            ca.quality_score
                .partial_cmp(&cb.quality_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    ca.confidence_score
                        .partial_cmp(&cb.confidence_score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                // Earlier extraction wins ties, so reverse the ordering.
                .then_with(|| cb.extracted_at.cmp(&ca.extracted_at))
                .then_with(|| cb.id.cmp(&ca.id))
        })
        .expect("groups are never empty");
    contacts[best].id
}

fn build_group(
    rule: DuplicateType,
    similarity: f32,
    members: &[usize],
    contacts: &[ExtractedContact],
) -> DuplicateGroup {
    let selected = select_representative(members, contacts);
    let ids = members.iter().map(|&i| contacts[i].id).collect();
    DuplicateGroup::new(rule, similarity, ids, selected)
}
