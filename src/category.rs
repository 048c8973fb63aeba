// Category classification for free-text fleet labels

use crate::ride::STANDARD_CATEGORY;
use serde::{Deserialize, Serialize};

// Filter-UI sentinel; never matched against a label
pub const ALL_CATEGORY: &str = "All";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRule {
    pub name: String,
    #[serde(default)]
    pub match_tokens: Vec<String>,
}

impl CategoryRule {
    pub fn new(name: &str, tokens: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            match_tokens: tokens.iter().map(|t| t.to_string()).collect(),
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.name == ALL_CATEGORY
    }
}

pub fn default_category_rules() -> Vec<CategoryRule> {
    vec![
        CategoryRule::new(ALL_CATEGORY, &[]),
        CategoryRule::new("Bike", &["bike", "moto"]),
        CategoryRule::new("Auto", &["auto", "rickshaw"]),
        CategoryRule::new("Extra Large", &["xl", "suv", "innova"]),
        CategoryRule::new("Comfort", &["premier", "premium", "prime", "sedan", "comfort"]),
        CategoryRule::new("Economy", &["go", "mini", "saver", "non ac", "economy"]),
    ]
}

/// Maps fleet labels onto the configured category table.
///
/// Rules are scanned in declaration order and the first rule owning a token
/// that occurs in the lower-cased label wins. Tokens are lower-cased once at
/// construction.
#[derive(Debug, Clone)]
pub struct CategoryClassifier {
    rules: Vec<(String, Vec<String>)>,
}

impl CategoryClassifier {
    pub fn new(rules: &[CategoryRule]) -> Self {
        let rules = rules
            .iter()
            .filter(|rule| !rule.is_sentinel())
            .map(|rule| {
                let tokens = rule
                    .match_tokens
                    .iter()
                    .map(|t| t.trim().to_lowercase())
                    .filter(|t| !t.is_empty())
                    .collect();
                (rule.name.clone(), tokens)
            })
            .collect();

        Self { rules }
    }

    pub fn classify(&self, fleet_label: &str) -> &str {
        let label = fleet_label.to_lowercase();

        self.rules
            .iter()
            .find(|(_, tokens)| tokens.iter().any(|token| label.contains(token.as_str())))
            .map(|(name, _)| name.as_str())
            .unwrap_or(STANDARD_CATEGORY)
    }

    // Category names in table order, sentinel excluded
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|(name, _)| name.as_str())
    }
}

impl Default for CategoryClassifier {
    fn default() -> Self {
        Self::new(&default_category_rules())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("UberXL", "Extra Large"; "xl suffix")]
    #[test_case("XL+ (Innova)", "Extra Large"; "xl plus")]
    #[test_case("zzz-unknown", "Standard"; "unknown label")]
    #[test_case("Moto Saver", "Bike"; "bike declared before economy")]
    #[test_case("Go Sedan", "Comfort"; "comfort declared before economy")]
    #[test_case("Uber Go", "Economy"; "economy")]
    #[test_case("Cab Non AC", "Economy"; "multi word token")]
    #[test_case("Cab Premium", "Comfort"; "premium")]
    #[test_case("Auto", "Auto"; "auto")]
    #[test_case("", "Standard"; "empty label")]
    fn test_classify_default_table(label: &str, expected: &str) {
        let classifier = CategoryClassifier::default();
        assert_eq!(classifier.classify(label), expected);
    }

    #[test]
    fn test_sentinel_is_never_matched() {
        let rules = vec![
            CategoryRule::new("All", &["a"]),
            CategoryRule::new("Bike", &["bike"]),
        ];
        let classifier = CategoryClassifier::new(&rules);

        assert_eq!(classifier.classify("car"), "Standard");
        assert_eq!(classifier.categories().collect::<Vec<_>>(), vec!["Bike"]);
    }

    #[test]
    fn test_tokens_are_case_insensitive() {
        let rules = vec![CategoryRule::new("Extra Large", &["XL"])];
        let classifier = CategoryClassifier::new(&rules);

        assert_eq!(classifier.classify("uberxl"), "Extra Large");
    }

    #[test]
    fn test_blank_tokens_match_nothing() {
        let rules = vec![CategoryRule::new("Everything", &["", "  "])];
        let classifier = CategoryClassifier::new(&rules);

        assert_eq!(classifier.classify("anything"), "Standard");
    }
}
