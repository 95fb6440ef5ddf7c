/// Phrases that mark a listing as spam or a scam, grouped loosely by kind.
pub const BLACKLISTED_PHRASES: &[&str] = &[
    // Scam indicators
    "wire transfer",
    "western union",
    "money order",
    "payment upfront",
    "easy money",
    "work from home opportunity",
    "get rich quick",
    "earn $$",
    "earn $$$",
    "earn money fast",
    // Adult content
    "escort",
    "adult service",
    "massage therapy",
    "special service",
    // Spam
    "no experience needed",
    "urgent opportunity",
    "act now",
    "limited time offer",
    "exclusive offer",
    "guaranteed income",
    "investment opportunity",
    // Suspicious pricing
    "free iphone",
    "free macbook",
    "free laptop",
    "below market",
    "way below market",
    // Crypto
    "crypto opportunity",
    "bitcoin investment",
    "crypto mining",
    "nft opportunity",
    // MLM
    "be your own boss",
    "multilevel",
    "multi level",
    "pyramid",
    "downline",
    "upline",
    // Job scams
    "secret shopper",
    "mystery shopper",
    "data entry job",
    "typing job",
    "work at home mom",
];

/// Case-insensitive phrase matcher over a listing's title and description.
#[derive(Debug, Clone)]
pub struct Blacklist {
    phrases: Vec<String>,
}

impl Default for Blacklist {
    fn default() -> Self {
        Self::new(BLACKLISTED_PHRASES.iter().copied())
    }
}

impl Blacklist {
    pub fn new<'a>(phrases: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            phrases: phrases
                .into_iter()
                .map(|p| p.trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// Every phrase found in `title` or `description`, in list order.
    pub fn matches(&self, title: &str, description: Option<&str>) -> Vec<String> {
        let text = match description {
            Some(desc) => format!("{title} {desc}"),
            None => title.to_string(),
        }
        .to_lowercase();

        self.phrases
            .iter()
            .filter(|phrase| text.contains(phrase.as_str()))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_is_case_insensitive() {
        let blacklist = Blacklist::default();
        let hits = blacklist.matches("Pay by WESTERN UNION only", None);
        assert_eq!(hits, vec!["western union"]);
    }

    #[test]
    fn description_is_searched_too() {
        let blacklist = Blacklist::default();
        let hits = blacklist.matches("Couch", Some("Great couch. Act now, be your own boss!"));
        assert_eq!(hits, vec!["act now", "be your own boss"]);
    }

    #[test]
    fn clean_listing_has_no_hits() {
        let blacklist = Blacklist::default();
        assert!(blacklist
            .matches("MacBook Pro 2019", Some("Lightly used, charger included"))
            .is_empty());
    }

    #[test]
    fn custom_phrases_are_normalized() {
        let blacklist = Blacklist::new(["  Cashier's Check ", ""]);
        assert_eq!(
            blacklist.matches("cashier's check accepted", None),
            vec!["cashier's check"]
        );
    }
}
