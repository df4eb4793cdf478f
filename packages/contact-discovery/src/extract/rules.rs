//! Rule-based contact extraction: bylines, mailto links, staff listings.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;

/// A candidate found by pattern matching, before scoring.
#[derive(Debug, Clone, Default)]
pub struct RuleCandidate {
    pub name: String,
    pub title: Option<String>,
    pub bio: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub social_profiles: Vec<String>,
    pub confidence: f32,
}

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap()
    })
}

fn mailto_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"mailto:([^"'\s>?]+)"#).unwrap())
}

fn byline_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:By|BY|by)\s+([A-Z][\w'’-]+(?:\s+[A-Z][\w'’-]+){1,2})").unwrap()
    })
}

fn name_title_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"([A-Z][\w'’-]+(?:\s+[A-Z][\w'’-]+){1,2})\s*[,:—–-]\s*((?:[A-Z][\w'’-]+\s+){0,3}(?:Editor|Reporter|Correspondent|Journalist|Writer|Columnist|Producer|Anchor|Critic|Chief)[^.\n,<]{0,40})",
        )
        .unwrap()
    })
}

fn phone_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\+?\d[\d\s().-]{7,14}\d").unwrap())
}

fn social_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"https?://(?:www\.)?(?:twitter\.com|x\.com|linkedin\.com|facebook\.com|instagram\.com|bsky\.app)/[A-Za-z0-9_./-]+",
        )
        .unwrap()
    })
}

// Title-cased page furniture that the byline pattern would otherwise
// mistake for names.
const NAME_STOPWORDS: &[&str] = &[
    "the", "about", "contact", "us", "our", "all", "more", "news", "staff", "team", "privacy",
    "terms", "home", "page",
];

fn plausible_name(name: &str) -> bool {
    let words: Vec<&str> = name.split_whitespace().collect();
    if !(2..=3).contains(&words.len()) {
        return false;
    }
    words
        .iter()
        .all(|w| !NAME_STOPWORDS.contains(&w.to_lowercase().as_str()) && w.len() >= 2)
}

fn name_tokens(name: &str) -> BTreeSet<String> {
    name.to_lowercase()
        .split_whitespace()
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Whether an email's local part looks like it belongs to `name`.
fn email_matches_name(email: &str, name: &str) -> bool {
    let local = email.split('@').next().unwrap_or_default().to_lowercase();
    name_tokens(name)
        .iter()
        .any(|token| token.len() >= 3 && local.contains(token.as_str()))
}

/// Derive a display name from an email local part ("jane.doe" -> "Jane Doe").
fn name_from_email(email: &str) -> Option<String> {
    let local = email.split('@').next()?;
    let parts: Vec<String> = local
        .split(|c: char| c == '.' || c == '_' || c == '-')
        .filter(|p| p.len() >= 2 && p.chars().all(|c| c.is_alphabetic()))
        .map(|p| {
            let mut chars = p.chars();
            let first = chars.next().unwrap().to_uppercase().to_string();
            format!("{first}{}", chars.as_str())
        })
        .collect();
    if (2..=3).contains(&parts.len()) {
        Some(parts.join(" "))
    } else {
        None
    }
}

/// Run the pattern matchers over page content.
///
/// Never fails: garbage input just yields no candidates.
pub fn extract_candidates(content: &str, max: usize) -> Vec<RuleCandidate> {
    let mut emails: Vec<String> = Vec::new();
    for cap in mailto_re().captures_iter(content) {
        emails.push(cap[1].to_lowercase());
    }
    for m in email_re().find_iter(content) {
        emails.push(m.as_str().to_lowercase());
    }
    emails.dedup();
    emails.sort();
    emails.dedup();

    let socials: Vec<String> = social_re()
        .find_iter(content)
        .map(|m| m.as_str().to_string())
        .collect();
    let phone = phone_re().find_iter(content).next().map(|m| m.as_str().trim().to_string());

    let mut candidates: Vec<RuleCandidate> = Vec::new();
    let mut seen_names: BTreeSet<String> = BTreeSet::new();
    let mut claimed_emails: BTreeSet<String> = BTreeSet::new();

    // Staff-listing style "Name — Title" lines carry the most signal.
    for cap in name_title_re().captures_iter(content) {
        let name = cap[1].trim().to_string();
        if !plausible_name(&name) || !seen_names.insert(name.to_lowercase()) {
            continue;
        }
        let title = cap[2].trim().to_string();
        let email = emails
            .iter()
            .find(|e| email_matches_name(e, &name))
            .cloned();
        if let Some(ref e) = email {
            claimed_emails.insert(e.clone());
        }
        let confidence = if email.is_some() { 0.9 } else { 0.65 };
        candidates.push(RuleCandidate {
            name,
            title: Some(title),
            bio: Some(cap[0].trim().to_string()),
            email,
            phone: None,
            social_profiles: vec![],
            confidence,
        });
    }

    // Article bylines.
    for cap in byline_re().captures_iter(content) {
        let name = cap[1].trim().to_string();
        if !plausible_name(&name) || !seen_names.insert(name.to_lowercase()) {
            continue;
        }
        let email = emails
            .iter()
            .find(|e| !claimed_emails.contains(*e) && email_matches_name(e, &name))
            .cloned();
        if let Some(ref e) = email {
            claimed_emails.insert(e.clone());
        }
        let confidence = if email.is_some() { 0.85 } else { 0.55 };
        candidates.push(RuleCandidate {
            name,
            title: None,
            bio: None,
            email,
            phone: None,
            social_profiles: vec![],
            confidence,
        });
    }

    // Leftover addresses become low-confidence candidates when the local
    // part looks like a person.
    for email in &emails {
        if claimed_emails.contains(email) {
            continue;
        }
        if let Some(name) = name_from_email(email) {
            if !seen_names.insert(name.to_lowercase()) {
                continue;
            }
            candidates.push(RuleCandidate {
                name,
                title: None,
                bio: None,
                email: Some(email.clone()),
                phone: None,
                social_profiles: vec![],
                confidence: 0.5,
            });
        }
    }

    // Page-level phone/socials are only safe to attach when unambiguous.
    if candidates.len() == 1 {
        candidates[0].phone = phone;
        candidates[0].social_profiles = socials;
    } else {
        for candidate in &mut candidates {
            let tokens = name_tokens(&candidate.name);
            candidate.social_profiles = socials
                .iter()
                .filter(|s| {
                    let lower = s.to_lowercase();
                    tokens.iter().any(|t| t.len() >= 3 && lower.contains(t.as_str()))
                })
                .cloned()
                .collect();
        }
    }

    candidates.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.name.cmp(&b.name))
    });
    candidates.truncate(max);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byline_with_matching_email() {
        let content = r#"
            <article>By Jane Doe</article>
            <a href="mailto:jane.doe@example.com">email me</a>
        "#;
        let candidates = extract_candidates(content, 10);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].name, "Jane Doe");
        assert_eq!(candidates[0].email.as_deref(), Some("jane.doe@example.com"));
        assert!(candidates[0].confidence >= 0.8);
    }

    #[test]
    fn test_staff_listing_line() {
        let content = "Maria Schmidt — Senior Climate Correspondent\nmaria.schmidt@paper.de";
        let candidates = extract_candidates(content, 10);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].name, "Maria Schmidt");
        assert!(candidates[0]
            .title
            .as_deref()
            .unwrap()
            .contains("Correspondent"));
        assert_eq!(
            candidates[0].email.as_deref(),
            Some("maria.schmidt@paper.de")
        );
    }

    #[test]
    fn test_orphan_email_becomes_candidate() {
        let content = "Reach our newsroom at john.smith@daily.com for tips.";
        let candidates = extract_candidates(content, 10);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].name, "John Smith");
        assert_eq!(candidates[0].confidence, 0.5);
    }

    #[test]
    fn test_generic_inbox_not_a_candidate() {
        let content = "Contact info@daily.com or newsdesk@daily.com.";
        let candidates = extract_candidates(content, 10);
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_page_furniture_filtered() {
        let content = "by The Editors | About Us | Contact Us";
        let candidates = extract_candidates(content, 10);
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_garbage_input_yields_nothing() {
        let candidates = extract_candidates("\u{0000}\u{fffd}<<<>>>{{{", 10);
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_socials_matched_by_name() {
        let content = r#"
            By Jane Doe
            By Tom Fields
            https://twitter.com/janedoe
        "#;
        let candidates = extract_candidates(content, 10);
        let jane = candidates.iter().find(|c| c.name == "Jane Doe").unwrap();
        let tom = candidates.iter().find(|c| c.name == "Tom Fields").unwrap();
        assert_eq!(jane.social_profiles.len(), 1);
        assert!(tom.social_profiles.is_empty());
    }
}
