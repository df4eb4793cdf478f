//! Query templates, one per criterion dimension plus combinations.

use crate::types::config::{SearchConfiguration, SearchCriteria};
use crate::types::query::QueryType;

/// A criterion dimension a query can cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Dimension {
    Country,
    Beat,
    Category,
    Language,
    Domain,
}

/// An instantiated template, not yet scored.
#[derive(Debug, Clone)]
pub struct TemplateQuery {
    pub text: String,

    /// Template name, kept on the final query for traceability.
    pub template: &'static str,

    /// Lower dispatches first on score ties.
    pub priority: usize,

    pub query_type: QueryType,

    /// Criterion dimensions this query represents.
    pub dimensions: Vec<Dimension>,
}

/// Dimensions the criteria actually request.
pub fn requested_dimensions(criteria: &SearchCriteria) -> Vec<Dimension> {
    let mut dims = Vec::new();
    if !criteria.countries.is_empty() {
        dims.push(Dimension::Country);
    }
    if !criteria.beats.is_empty() {
        dims.push(Dimension::Beat);
    }
    if !criteria.categories.is_empty() {
        dims.push(Dimension::Category);
    }
    if !criteria.languages.is_empty() {
        dims.push(Dimension::Language);
    }
    if !criteria.domains.is_empty() {
        dims.push(Dimension::Domain);
    }
    dims
}

/// Instantiate every applicable template against the configuration.
pub fn instantiate(config: &SearchConfiguration) -> Vec<TemplateQuery> {
    let topic = config.query.trim();
    let criteria = &config.criteria;
    let mut queries = Vec::new();

    queries.push(TemplateQuery {
        text: format!("{topic} journalist email contact"),
        template: "base_contact",
        priority: 0,
        query_type: QueryType::Base,
        dimensions: vec![],
    });

    for country in &criteria.countries {
        queries.push(TemplateQuery {
            text: format!("{topic} journalist {country}"),
            template: "country",
            priority: 1,
            query_type: QueryType::Base,
            dimensions: vec![Dimension::Country],
        });
    }

    for beat in &criteria.beats {
        queries.push(TemplateQuery {
            text: format!("{beat} reporter {topic} contact"),
            template: "beat",
            priority: 2,
            query_type: QueryType::Base,
            dimensions: vec![Dimension::Beat],
        });
    }

    for category in &criteria.categories {
        queries.push(TemplateQuery {
            text: format!("{topic} {category} media contacts"),
            template: "category",
            priority: 3,
            query_type: QueryType::Base,
            dimensions: vec![Dimension::Category],
        });
    }

    for language in &criteria.languages {
        queries.push(TemplateQuery {
            text: format!("{topic} journalist {language} media"),
            template: "language",
            priority: 4,
            query_type: QueryType::Base,
            dimensions: vec![Dimension::Language],
        });
    }

    // Combination templates cross the two highest-signal dimensions.
    for beat in &criteria.beats {
        for country in &criteria.countries {
            queries.push(TemplateQuery {
                text: format!("{beat} journalist {country} email"),
                template: "beat_country",
                priority: 5,
                query_type: QueryType::Variant,
                dimensions: vec![Dimension::Beat, Dimension::Country],
            });
        }
    }

    for domain in &criteria.domains {
        queries.push(TemplateQuery {
            text: format!("site:{domain} {topic} contact"),
            template: "domain",
            priority: 6,
            query_type: QueryType::Variant,
            dimensions: vec![Dimension::Domain],
        });
    }

    queries
}
