//! robots.txt parsing and crawl-delay lookup.
//!
//! The scraping stage feeds the parsed crawl-delay into the throttler so
//! polite sites get the slower cadence they ask for. A missing or broken
//! robots.txt means no extra constraints.

use std::collections::HashMap;
use std::time::Duration;

use url::Url;

use crate::traits::provider::ContentFetcher;

/// Parsed robots.txt rules.
#[derive(Debug, Clone, Default)]
pub struct RobotsRules {
    /// Per-agent rules, keyed by lowercase user-agent.
    agents: HashMap<String, AgentRules>,

    /// Rules for `*`.
    default_agent: AgentRules,
}

#[derive(Debug, Clone, Default)]
struct AgentRules {
    disallow: Vec<String>,
    allow: Vec<String>,
    crawl_delay: Option<f64>,
}

impl RobotsRules {
    /// Parse robots.txt content. Unknown directives are ignored.
    pub fn parse(content: &str) -> Self {
        let mut rules = Self::default();
        let mut current_agents: Vec<String> = Vec::new();
        let mut current = AgentRules::default();

        let mut flush =
            |agents: &mut Vec<String>, current: &mut AgentRules, rules: &mut RobotsRules| {
                for agent in agents.drain(..) {
                    if agent == "*" {
                        rules.default_agent = current.clone();
                    } else {
                        rules.agents.insert(agent, current.clone());
                    }
                }
                *current = AgentRules::default();
            };

        for line in content.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let Some((directive, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();

            match directive.trim().to_lowercase().as_str() {
                "user-agent" => {
                    // A user-agent line after rules starts a new record.
                    if !current_agents.is_empty()
                        && (!current.disallow.is_empty()
                            || !current.allow.is_empty()
                            || current.crawl_delay.is_some())
                    {
                        flush(&mut current_agents, &mut current, &mut rules);
                    }
                    current_agents.push(value.to_lowercase());
                }
                "disallow" if !value.is_empty() => current.disallow.push(value.to_string()),
                "allow" if !value.is_empty() => current.allow.push(value.to_string()),
                "crawl-delay" => {
                    if let Ok(delay) = value.parse::<f64>() {
                        current.crawl_delay = Some(delay);
                    }
                }
                _ => {}
            }
        }
        flush(&mut current_agents, &mut current, &mut rules);

        rules
    }

    fn rules_for(&self, user_agent: &str) -> &AgentRules {
        let agent = user_agent.to_lowercase();
        self.agents
            .get(&agent)
            .or_else(|| {
                self.agents
                    .iter()
                    .find(|(k, _)| agent.contains(k.as_str()))
                    .map(|(_, v)| v)
            })
            .unwrap_or(&self.default_agent)
    }

    /// Whether a path may be fetched. Allow rules override disallow.
    pub fn is_allowed(&self, user_agent: &str, path: &str) -> bool {
        let rules = self.rules_for(user_agent);
        if rules.allow.iter().any(|a| path.starts_with(a)) {
            return true;
        }
        !rules
            .disallow
            .iter()
            .any(|d| d == "/" || path.starts_with(d))
    }

    /// Crawl delay for a user-agent, falling back to the `*` record.
    pub fn crawl_delay(&self, user_agent: &str) -> Option<Duration> {
        self.rules_for(user_agent)
            .crawl_delay
            .or(self.default_agent.crawl_delay)
            .map(Duration::from_secs_f64)
    }
}

/// Fetch and parse robots.txt for the domain of `url`.
///
/// Any failure (no robots.txt, HTTP error, unreachable host) yields the
/// permissive default.
pub async fn fetch_robots(fetcher: &dyn ContentFetcher, url: &Url) -> RobotsRules {
    let Ok(robots_url) = url.join("/robots.txt") else {
        return RobotsRules::default();
    };
    match fetcher.fetch(&robots_url).await {
        Ok(page) => RobotsRules::parse(&page.content),
        Err(e) => {
            tracing::debug!(url = %robots_url, error = %e, "no usable robots.txt");
            RobotsRules::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic() {
        let content = r#"
User-agent: *
Disallow: /private/
Allow: /private/press/
Crawl-delay: 2
        "#;
        let rules = RobotsRules::parse(content);

        assert!(rules.is_allowed("DiscoveryBot", "/staff"));
        assert!(!rules.is_allowed("DiscoveryBot", "/private/archive"));
        assert!(rules.is_allowed("DiscoveryBot", "/private/press/kit"));
        assert_eq!(
            rules.crawl_delay("DiscoveryBot"),
            Some(Duration::from_secs(2))
        );
    }

    #[test]
    fn test_specific_agent_overrides_default() {
        let content = r#"
User-agent: *
Disallow: /

User-agent: goodbot
Allow: /
Crawl-delay: 5
        "#;
        let rules = RobotsRules::parse(content);

        assert!(!rules.is_allowed("SomeBot", "/page"));
        assert!(rules.is_allowed("GoodBot", "/page"));
        assert_eq!(rules.crawl_delay("GoodBot"), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_empty_is_permissive() {
        let rules = RobotsRules::parse("");
        assert!(rules.is_allowed("AnyBot", "/anything"));
        assert!(rules.crawl_delay("AnyBot").is_none());
    }

    #[test]
    fn test_comments_ignored() {
        let content = "User-agent: *\nDisallow: /tmp/ # scratch space";
        let rules = RobotsRules::parse(content);
        assert!(!rules.is_allowed("Bot", "/tmp/file"));
    }
}
