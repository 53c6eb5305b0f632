//! Tier 1 keyword matcher
//!
//! Pure and synchronous: the same text always yields the same ranked list.
//! Keywords are matched case-insensitively on word boundaries; each distinct
//! keyword found counts once.

use call_assist_core::Segment;
use once_cell::sync::Lazy;
use regex::Regex;

use super::SegmentMatch;

/// Confidence added per matched keyword
const CONFIDENCE_PER_MATCH: usize = 25;
/// Tier 1 never claims certainty
const MAX_PATTERN_CONFIDENCE: usize = 95;

const EMERGENCY: &[&str] = &[
    "emergency",
    "urgent",
    "urgently",
    "flood",
    "flooding",
    "flooded",
    "burst pipe",
    "burst",
    "gas leak",
    "smell gas",
    "smell of gas",
    "no heating",
    "no hot water",
    "water everywhere",
    "pouring through",
    "sparking",
    "right now",
    "asap",
];

const REMOTE_LANDLORD: &[&str] = &[
    "rental property",
    "rental",
    "my tenant",
    "my tenants",
    "tenant",
    "tenants",
    "buy to let",
    "let property",
    "rent it out",
    "i'm the landlord",
    "i'm a landlord",
    "as a landlord",
    "don't live there",
    "not living there",
];

const HOMEOWNER: &[&str] = &[
    "my house",
    "my home",
    "our house",
    "our home",
    "i own",
    "we own",
    "homeowner",
    "my kitchen",
    "my bathroom",
    "we've just moved in",
    "bought the house",
];

const TENANT: &[&str] = &[
    "my landlord",
    "our landlord",
    "the landlord",
    "i rent",
    "we rent",
    "renting",
    "letting agent",
    "rented flat",
    "tenancy",
    "my lease",
    "my deposit",
];

const PROPERTY_MANAGER: &[&str] = &[
    "property manager",
    "managing agent",
    "letting agency",
    "portfolio",
    "properties",
    "block of flats",
    "on behalf of",
    "our client",
    "work order",
    "purchase order",
    "po number",
    "managed properties",
];

const PRICE_SHOPPER: &[&str] = &[
    "how much",
    "price",
    "prices",
    "quote",
    "quotes",
    "cost",
    "cheapest",
    "cheaper",
    "call-out charge",
    "call out charge",
    "call out fee",
    "hourly rate",
    "ballpark",
    "rough idea",
    "comparing",
];

/// Keyword list for a segment
pub fn keywords(segment: Segment) -> &'static [&'static str] {
    match segment {
        Segment::Emergency => EMERGENCY,
        Segment::RemoteLandlord => REMOTE_LANDLORD,
        Segment::Homeowner => HOMEOWNER,
        Segment::Tenant => TENANT,
        Segment::PropertyManager => PROPERTY_MANAGER,
        Segment::PriceShopper => PRICE_SHOPPER,
    }
}

/// Compile a phrase into a case-insensitive, word-bounded pattern
pub(crate) fn phrase_regex(phrase: &str) -> Regex {
    Regex::new(&format!(r"(?i)\b{}\b", regex::escape(phrase))).unwrap()
}

static KEYWORD_PATTERNS: Lazy<Vec<(Segment, Vec<(&'static str, Regex)>)>> = Lazy::new(|| {
    Segment::ALL
        .iter()
        .map(|segment| {
            let patterns = keywords(*segment)
                .iter()
                .map(|kw| (*kw, phrase_regex(kw)))
                .collect();
            (*segment, patterns)
        })
        .collect()
});

/// Confidence for a number of matched keywords
pub fn confidence_for(match_count: usize) -> u8 {
    (match_count * CONFIDENCE_PER_MATCH).min(MAX_PATTERN_CONFIDENCE) as u8
}

/// Score `text` against every segment's keywords
///
/// Segments without a match are omitted. Ranking: confidence, then match
/// count, then segment priority.
pub fn match_segments(text: &str) -> Vec<SegmentMatch> {
    let text = normalize(text);
    let mut matches: Vec<SegmentMatch> = KEYWORD_PATTERNS
        .iter()
        .filter_map(|(segment, patterns)| {
            let signals: Vec<String> = patterns
                .iter()
                .filter(|(_, re)| re.is_match(&text))
                .map(|(kw, _)| kw.to_string())
                .collect();
            if signals.is_empty() {
                return None;
            }
            Some(SegmentMatch {
                segment: *segment,
                confidence: confidence_for(signals.len()),
                match_count: signals.len(),
                signals,
            })
        })
        .collect();

    matches.sort_by(|a, b| {
        b.confidence
            .cmp(&a.confidence)
            .then(b.match_count.cmp(&a.match_count))
            .then(a.segment.priority().cmp(&b.segment.priority()))
    });
    matches
}

/// Fold typographic apostrophes so "don’t" matches "don't"
pub(crate) fn normalize(text: &str) -> String {
    text.replace(['\u{2019}', '\u{2018}'], "'")
}
