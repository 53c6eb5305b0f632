//! Disqualifying signals
//!
//! A phrase that rules a segment out regardless of how many positive keywords
//! matched, e.g. "I live there" cannot come from a remote landlord.

use call_assist_core::Segment;
use once_cell::sync::Lazy;
use regex::Regex;

use super::pattern::{normalize, phrase_regex};

fn disqualifiers(segment: Segment) -> &'static [&'static str] {
    match segment {
        Segment::Emergency => &["no rush", "not urgent", "whenever suits", "no hurry"],
        Segment::RemoteLandlord => &[
            "i live there",
            "i live here",
            "i live in it",
            "we live there",
            "i'm the tenant",
            "my landlord",
        ],
        Segment::Homeowner => &["my tenant", "my tenants", "my landlord", "i rent", "i'm renting"],
        Segment::Tenant => &["my tenant", "my tenants", "i'm the landlord", "i own the property"],
        Segment::PropertyManager => &["my own home", "i live there"],
        Segment::PriceShopper => &["whatever it costs", "price doesn't matter", "book it in"],
    }
}

static DISQUALIFIER_PATTERNS: Lazy<Vec<(Segment, Vec<(&'static str, Regex)>)>> = Lazy::new(|| {
    Segment::ALL
        .iter()
        .map(|segment| {
            let patterns = disqualifiers(*segment)
                .iter()
                .map(|p| (*p, phrase_regex(p)))
                .collect();
            (*segment, patterns)
        })
        .collect()
});

/// First disqualifying phrase for `segment` found in `text`
pub fn is_disqualified(segment: Segment, text: &str) -> Option<&'static str> {
    let text = normalize(text);
    DISQUALIFIER_PATTERNS
        .iter()
        .find(|(s, _)| *s == segment)
        .and_then(|(_, patterns)| {
            patterns
                .iter()
                .find(|(_, re)| re.is_match(&text))
                .map(|(phrase, _)| *phrase)
        })
}

/// Every segment ruled out by `text`, with the phrase that did it
pub fn disqualified_segments(text: &str) -> Vec<(Segment, &'static str)> {
    Segment::ALL
        .iter()
        .filter_map(|segment| is_disqualified(*segment, text).map(|p| (*segment, p)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_living_there_rules_out_remote_landlord() {
        assert_eq!(
            is_disqualified(Segment::RemoteLandlord, "Actually I live there myself"),
            Some("i live there")
        );
        assert_eq!(is_disqualified(Segment::RemoteLandlord, "I don't live there"), None);
    }

    #[test]
    fn test_multiple_disqualifications() {
        let ruled_out = disqualified_segments("my tenant rang, no rush though");
        let segments: Vec<_> = ruled_out.iter().map(|(s, _)| *s).collect();
        assert_eq!(
            segments,
            vec![Segment::Emergency, Segment::Homeowner, Segment::Tenant]
        );
    }

    #[test]
    fn test_clean_text() {
        assert!(disqualified_segments("the boiler is leaking").is_empty());
    }
}
