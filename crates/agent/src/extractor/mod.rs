//! Info extraction from free transcript text
//!
//! Stateless, rule-based extraction of the captured-info fields. Patterns are
//! compiled once using `once_cell::sync::Lazy`.

pub mod streaming;

pub use streaming::{InfoCallback, InfoUpdate, StreamingInfoExtractor};

use call_assist_core::CapturedInfo;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::classifier::pattern::{normalize, phrase_regex};

// =============================================================================
// STATIC REGEX PATTERNS
// =============================================================================

const OBJECTS: &str = "boiler|radiators?|taps?|toilet|sink|shower|bath|drains?|pipes?|\
washing machine|dishwasher|oven|cooker|fridge|freezer|fuse box|lights?|sockets?|\
front door|back door|door|locks?|windows?|roof|gutters?|ceiling|heating|hot water|\
extractor fan|fence|immersion|gas|kitchen|bathroom|loft|cellar|basement|garage";

const VERBS: &str = "fix|repair|replace|install|service|unblock|check|look at|sort out";

const PROBLEMS: &str = "leaking|dripping|not working|broken|blocked|making a noise|\
making noises|not heating|not draining|overflowing|tripping|losing pressure|cracked|\
stuck|flickering|frozen|jammed|burst|flooding|flooded|leaks|leak";

// Adjectives that can come before the object, as in "burst pipe"
const PROBLEM_ADJECTIVES: &str = "burst|leaking|dripping|broken|blocked|cracked|frozen|flooded|jammed";

// "fix my boiler", "replace the taps"
static VERB_OBJECT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)\b({})\s+(?:(?:the|my|a|an|our|their|his|her)\s+)?({})\b",
        VERBS, OBJECTS
    ))
    .unwrap()
});

// "boiler is leaking", "toilet keeps overflowing"
static OBJECT_PROBLEM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)\b({})\s+(?:is\s+|are\s+|has\s+been\s+|have\s+been\s+|keeps\s+|is\s+still\s+|has\s+)?({})\b",
        OBJECTS, PROBLEMS
    ))
    .unwrap()
});

// "burst pipe", "blocked drain"
static PROBLEM_OBJECT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)\b({})\s+({})\b", PROBLEM_ADJECTIVES, OBJECTS)).unwrap()
});

static GAS_SMELL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bsmell(?:s|ing)?\s+(?:of\s+)?gas\b").unwrap());

// "no hot water"
static NO_SUPPLY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bno\s+(hot water|heating|power|electricity|water)\b").unwrap());

// UK postcode, outward and inward parts
static POSTCODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b([A-Z]{1,2}\d[A-Z\d]?)\s*(\d[A-Z]{2})\b").unwrap());

static NAME_SPEAKING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bit'?s\s+([a-z][a-z'-]*(?:\s+[a-z][a-z'-]*)?)\s+speaking\b").unwrap()
});

static NAME_STATED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:my\s+name\s+is|my\s+name's|name's)\s+([a-z][a-z'-]*(?:\s+[a-z][a-z'-]*)?)")
        .unwrap()
});

// "this is X" only opening the chunk or a sentence, after an optional greeting
static NAME_OPENING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:^|[.!?]\s+)(?:(?:hi|hello|hiya|hey|yes|yeah|morning|good\s+morning|good\s+afternoon)[,\s]+)?this\s+is\s+([a-z][a-z'-]*(?:\s+[a-z][a-z'-]*)?)",
    )
    .unwrap()
});

// "... this is X calling"
static NAME_SIGNED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bthis\s+is\s+([a-z][a-z'-]*(?:\s+[a-z][a-z'-]*)?)\s+(?:speaking|calling|here|from)\b")
        .unwrap()
});

static PHONE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:\+44|\b0)[\s-]?\d{2,4}[\s-]?\d{3,4}[\s-]?\d{3,4}\b").unwrap());

static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b[a-z0-9._%+-]+@[a-z0-9-]+(?:\.[a-z0-9-]+)*\.[a-z]{2,}\b").unwrap()
});

/// Words that can follow "this is" without being a name
const NAME_STOP_WORDS: &[&str] = &[
    "a", "about", "an", "and", "at", "calling", "from", "going", "here", "in", "is", "it",
    "just", "my", "not", "of", "on", "really", "regarding", "ringing", "so", "speaking",
    "the", "to", "urgent", "very", "with", "your", "me", "because", "quite", "our",
];

const DECISION_MAKER_NO: &[&str] = &[
    "need to check with",
    "need to ask",
    "have to ask",
    "not my decision",
    "need to speak to my",
    "can't authorise",
    "cannot authorise",
    "can't approve",
    "need approval",
    "need to get approval",
];

const DECISION_MAKER_YES: &[&str] = &[
    "i can authorise",
    "i can approve",
    "i can sign off",
    "it's my decision",
    "i make the decisions",
    "i'm the owner",
    "i own the property",
    "i own the house",
    "happy to go ahead",
];

const REMOTE_OWNER_NO: &[&str] = &[
    "i live there",
    "i live here",
    "i live in it",
    "we live there",
    "it's my home",
    "i'm the tenant",
];

const REMOTE_OWNER_YES: &[&str] = &[
    "i don't live there",
    "we don't live there",
    "i rent it out",
    "rental property",
    "my tenant",
    "buy to let",
    "let it out",
    "i'm the landlord",
];

const TENANT_PRESENT_NO: &[&str] = &[
    "tenant is away",
    "tenant's away",
    "tenants are away",
    "tenant is on holiday",
    "property is empty",
    "property's empty",
    "nobody is living",
    "no one is living",
    "nobody there",
    "no one there",
    "vacant",
    "between tenants",
];

const TENANT_PRESENT_YES: &[&str] = &[
    "tenant is home",
    "tenant is in",
    "tenant will be in",
    "tenant will be home",
    "tenant can let you in",
    "tenant is there",
    "tenants are in",
    "tenants are home",
    "someone is living there",
];

type PhraseSet = Lazy<Vec<Regex>>;

fn phrases(list: &[&str]) -> Vec<Regex> {
    list.iter().map(|p| phrase_regex(p)).collect()
}

static DECISION_MAKER_NO_RE: PhraseSet = Lazy::new(|| phrases(DECISION_MAKER_NO));
static DECISION_MAKER_YES_RE: PhraseSet = Lazy::new(|| phrases(DECISION_MAKER_YES));
static REMOTE_OWNER_NO_RE: PhraseSet = Lazy::new(|| phrases(REMOTE_OWNER_NO));
static REMOTE_OWNER_YES_RE: PhraseSet = Lazy::new(|| phrases(REMOTE_OWNER_YES));
static TENANT_PRESENT_NO_RE: PhraseSet = Lazy::new(|| phrases(TENANT_PRESENT_NO));
static TENANT_PRESENT_YES_RE: PhraseSet = Lazy::new(|| phrases(TENANT_PRESENT_YES));

/// How the caller gave their name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameCue {
    /// "my name is X", "it's X speaking"
    Stated,
    /// "this is X"; weaker, easily confused with ordinary speech
    Introduced,
}

/// Extract every field from `text`
pub fn extract(text: &str) -> CapturedInfo {
    extract_with_name_cue(text).0
}

/// Extract every field, plus how the name (if any) was given
pub fn extract_with_name_cue(text: &str) -> (CapturedInfo, Option<NameCue>) {
    let text = normalize(text);
    let (name, cue) = match extract_name_cue(&text) {
        Some((name, cue)) => (Some(name), Some(cue)),
        None => (None, None),
    };
    let info = CapturedInfo {
        job: extract_job(&text),
        location_code: extract_location_code(&text),
        name,
        contact: extract_contact(&text),
        decision_maker: flag(&text, &DECISION_MAKER_NO_RE, &DECISION_MAKER_YES_RE),
        remote_owner: flag(&text, &REMOTE_OWNER_NO_RE, &REMOTE_OWNER_YES_RE),
        tenant_present: flag(&text, &TENANT_PRESENT_NO_RE, &TENANT_PRESENT_YES_RE),
    };
    (info, cue)
}

/// Job description, e.g. "fix boiler", "toilet blocked" or "pipe burst"
pub fn extract_job(text: &str) -> Option<String> {
    if let Some(caps) = VERB_OBJECT.captures(text) {
        return Some(format!(
            "{} {}",
            caps[1].to_lowercase(),
            caps[2].to_lowercase()
        ));
    }
    if let Some(caps) = OBJECT_PROBLEM.captures(text) {
        return Some(format!(
            "{} {}",
            caps[1].to_lowercase(),
            caps[2].to_lowercase()
        ));
    }
    // Object first, so "burst pipe" and "pipe has burst" read the same
    if let Some(caps) = PROBLEM_OBJECT.captures(text) {
        return Some(format!(
            "{} {}",
            caps[2].to_lowercase(),
            caps[1].to_lowercase()
        ));
    }
    if GAS_SMELL.is_match(text) {
        return Some("gas leak".to_string());
    }
    NO_SUPPLY
        .captures(text)
        .map(|caps| format!("no {}", caps[1].to_lowercase()))
}

/// Normalized UK postcode, e.g. "SW1A 1AA"
pub fn extract_location_code(text: &str) -> Option<String> {
    POSTCODE.captures(text).map(|caps| {
        format!(
            "{} {}",
            caps[1].to_uppercase(),
            caps[2].to_uppercase()
        )
    })
}

/// Caller's self-introduced name, title-cased
pub fn extract_name(text: &str) -> Option<String> {
    extract_name_cue(text).map(|(name, _)| name)
}

/// Name with its cue; stated forms win over "this is X"
pub fn extract_name_cue(text: &str) -> Option<(String, NameCue)> {
    [
        (&*NAME_SPEAKING, NameCue::Stated),
        (&*NAME_STATED, NameCue::Stated),
        (&*NAME_SIGNED, NameCue::Introduced),
        (&*NAME_OPENING, NameCue::Introduced),
    ]
    .into_iter()
    .filter_map(|(re, cue)| re.captures(text).map(|caps| (caps, cue)))
    .find_map(|(caps, cue)| clean_name(&caps[1]).map(|name| (name, cue)))
}

fn clean_name(raw: &str) -> Option<String> {
    let words: Vec<String> = raw
        .split_whitespace()
        .take_while(|w| !NAME_STOP_WORDS.contains(&w.to_lowercase().as_str()))
        .map(title_case)
        .collect();
    if words.is_empty() {
        None
    } else {
        Some(words.join(" "))
    }
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(|c| c.to_lowercase())).collect(),
        None => String::new(),
    }
}

/// Phone number (spaces removed) or e-mail address
pub fn extract_contact(text: &str) -> Option<String> {
    PHONE
        .find_iter(text)
        .find_map(|m| normalize_phone(m.as_str()))
        .or_else(|| EMAIL.find(text).map(|m| m.as_str().to_lowercase()))
}

fn normalize_phone(raw: &str) -> Option<String> {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace() && *c != '-').collect();
    let valid = if let Some(rest) = compact.strip_prefix("+44") {
        rest.len() == 10 && rest.chars().all(|c| c.is_ascii_digit())
    } else {
        compact.len() == 11
            && compact.chars().all(|c| c.is_ascii_digit())
            && ["01", "02", "03", "07", "08"].iter().any(|p| compact.starts_with(p))
    };
    valid.then_some(compact)
}

/// Yes/no from phrase lists; negatives are checked first
fn flag(text: &str, negative: &[Regex], positive: &[Regex]) -> Option<bool> {
    if negative.iter().any(|re| re.is_match(text)) {
        Some(false)
    } else if positive.iter().any(|re| re.is_match(text)) {
        Some(true)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_verb_object() {
        assert_eq!(extract_job("Can you fix my boiler please"), Some("fix boiler".into()));
        assert_eq!(
            extract_job("I want someone to Replace the taps"),
            Some("replace taps".into())
        );
    }

    #[test]
    fn test_job_object_problem() {
        assert_eq!(extract_job("the toilet keeps overflowing"), Some("toilet overflowing".into()));
        assert_eq!(extract_job("radiator is not working"), Some("radiator not working".into()));
        assert_eq!(extract_job("we've got no hot water"), Some("no hot water".into()));
        assert_eq!(extract_job("good morning"), None);
    }

    #[test]
    fn test_job_emergency_phrasings() {
        assert_eq!(
            extract_job("there's a burst pipe and water everywhere"),
            Some("pipe burst".into())
        );
        assert_eq!(extract_job("a pipe has burst"), Some("pipe burst".into()));
        assert_eq!(
            extract_job("I can smell gas, I think it's a gas leak"),
            Some("gas leak".into())
        );
        assert_eq!(extract_job("I can smell gas in the hall"), Some("gas leak".into()));
        assert_eq!(extract_job("the kitchen is flooding"), Some("kitchen flooding".into()));
    }

    #[test]
    fn test_postcode() {
        assert_eq!(extract_location_code("it's at sw1a1aa"), Some("SW1A 1AA".into()));
        assert_eq!(extract_location_code("postcode M1 2AB thanks"), Some("M1 2AB".into()));
        assert_eq!(extract_location_code("number 42"), None);
    }

    #[test]
    fn test_name() {
        assert_eq!(extract_name("Hi, my name is sarah jones"), Some("Sarah Jones".into()));
        assert_eq!(extract_name("this is Dave calling about"), Some("Dave".into()));
        assert_eq!(extract_name("hello it's priya speaking"), Some("Priya".into()));
        assert_eq!(extract_name("this is about my boiler"), None);
        assert_eq!(extract_name("this is urgent"), None);
        assert_eq!(extract_name("honestly this is ridiculous"), None);
        assert_eq!(extract_name("Yes. This is Mark here"), Some("Mark".into()));
    }

    #[test]
    fn test_name_cue() {
        assert_eq!(
            extract_name_cue("my name's Ali"),
            Some(("Ali".into(), NameCue::Stated))
        );
        assert_eq!(
            extract_name_cue("hello, this is Ali"),
            Some(("Ali".into(), NameCue::Introduced))
        );
    }

    #[test]
    fn test_contact() {
        assert_eq!(
            extract_contact("call me on 07700 900 123"),
            Some("07700900123".into())
        );
        assert_eq!(
            extract_contact("it's +44 7700 900123"),
            Some("+447700900123".into())
        );
        assert_eq!(
            extract_contact("email Jo.Smith@Example.co.uk"),
            Some("jo.smith@example.co.uk".into())
        );
        assert_eq!(extract_contact("flat 12"), None);
    }

    #[test]
    fn test_flags_negative_first() {
        let info = extract("I don't live there, my tenant is away this week");
        assert_eq!(info.remote_owner, Some(true));
        assert_eq!(info.tenant_present, Some(false));

        let info = extract("I live there, it's my home");
        assert_eq!(info.remote_owner, Some(false));

        let info = extract("I can approve it but I need to check with my wife");
        assert_eq!(info.decision_maker, Some(false));
    }

    #[test]
    fn test_flags_match_whole_words() {
        assert_eq!(extract("the tenant is insisting on today").tenant_present, None);
        assert_eq!(extract("the tenant is in all day").tenant_present, Some(true));
        assert_eq!(extract("the flat is unvacant").tenant_present, None);
        assert_eq!(extract("it's vacant at the moment").tenant_present, Some(false));
    }

    #[test]
    fn test_extract_all() {
        let info = extract(
            "Hi this is Tom, my boiler is leaking at BS1 4DJ, call me on 0117 496 0000",
        );
        assert_eq!(info.name.as_deref(), Some("Tom"));
        assert_eq!(info.job.as_deref(), Some("boiler leaking"));
        assert_eq!(info.location_code.as_deref(), Some("BS1 4DJ"));
        assert_eq!(info.contact.as_deref(), Some("01174960000"));
        assert_eq!(info.decision_maker, None);
    }
}
