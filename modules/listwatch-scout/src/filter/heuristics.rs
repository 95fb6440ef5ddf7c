use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

const MAX_TITLE_WORDS: usize = 20;

/// Title-level spam signals applied to alerts with the advanced filter enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpamSignal {
    KeywordStuffing,
    ShoutingTitle,
    PriceInTitle,
    PhoneNumber,
    LinkShortener,
}

impl fmt::Display for SpamSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SpamSignal::KeywordStuffing => "keyword stuffing",
            SpamSignal::ShoutingTitle => "excessive capitalization",
            SpamSignal::PriceInTitle => "price in title",
            SpamSignal::PhoneNumber => "phone number in title",
            SpamSignal::LinkShortener => "link shortener in title",
        };
        f.write_str(label)
    }
}

fn phone_number() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d{10}").expect("valid regex"))
}

fn link_shortener() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)bit\.ly|goo\.gl").expect("valid regex"))
}

pub fn check_title(title: &str) -> Vec<SpamSignal> {
    let mut signals = Vec::new();

    if title.split(' ').count() > MAX_TITLE_WORDS {
        signals.push(SpamSignal::KeywordStuffing);
    }

    let uppercase = title.chars().filter(|c| c.is_ascii_uppercase()).count();
    if uppercase * 2 > title.chars().count() {
        signals.push(SpamSignal::ShoutingTitle);
    }

    if title.contains('$') {
        signals.push(SpamSignal::PriceInTitle);
    }
    if phone_number().is_match(title) {
        signals.push(SpamSignal::PhoneNumber);
    }
    if link_shortener().is_match(title) {
        signals.push(SpamSignal::LinkShortener);
    }

    signals
}
