//! Location comparison and deceased-location normalization.

use lighthouse_core::types::DeceasedLocationKind;

/// Decides whether two free-form locations name the same place.
pub trait LocationClassifier: Send + Sync {
    fn same_place(&self, a: &str, b: &str) -> bool;
}

/// Lexical comparison: lowercase, expand US state abbreviations, keep only
/// letters, then compare. One normalized string containing the other counts
/// as the same place.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicLocationClassifier;

impl LocationClassifier for HeuristicLocationClassifier {
    fn same_place(&self, a: &str, b: &str) -> bool {
        let a = normalize(a);
        let b = normalize(b);
        if a.is_empty() || b.is_empty() {
            return false;
        }
        a == b || a.contains(&b) || b.contains(&a)
    }
}

const STATES: [(&str, &str); 51] = [
    ("al", "alabama"),
    ("ak", "alaska"),
    ("az", "arizona"),
    ("ar", "arkansas"),
    ("ca", "california"),
    ("co", "colorado"),
    ("ct", "connecticut"),
    ("de", "delaware"),
    ("dc", "districtofcolumbia"),
    ("fl", "florida"),
    ("ga", "georgia"),
    ("hi", "hawaii"),
    ("id", "idaho"),
    ("il", "illinois"),
    ("in", "indiana"),
    ("ia", "iowa"),
    ("ks", "kansas"),
    ("ky", "kentucky"),
    ("la", "louisiana"),
    ("me", "maine"),
    ("md", "maryland"),
    ("ma", "massachusetts"),
    ("mi", "michigan"),
    ("mn", "minnesota"),
    ("ms", "mississippi"),
    ("mo", "missouri"),
    ("mt", "montana"),
    ("ne", "nebraska"),
    ("nv", "nevada"),
    ("nh", "newhampshire"),
    ("nj", "newjersey"),
    ("nm", "newmexico"),
    ("ny", "newyork"),
    ("nc", "northcarolina"),
    ("nd", "northdakota"),
    ("oh", "ohio"),
    ("ok", "oklahoma"),
    ("or", "oregon"),
    ("pa", "pennsylvania"),
    ("ri", "rhodeisland"),
    ("sc", "southcarolina"),
    ("sd", "southdakota"),
    ("tn", "tennessee"),
    ("tx", "texas"),
    ("ut", "utah"),
    ("vt", "vermont"),
    ("va", "virginia"),
    ("wa", "washington"),
    ("wv", "westvirginia"),
    ("wi", "wisconsin"),
    ("wy", "wyoming"),
];

fn expand_state(token: &str) -> &str {
    STATES
        .iter()
        .find(|(abbr, _)| *abbr == token)
        .map(|(_, name)| *name)
        .unwrap_or(token)
}

/// Lowercased letters only, with two-letter state codes expanded.
pub fn normalize(location: &str) -> String {
    location
        .to_lowercase()
        .split(|c: char| !c.is_alphabetic())
        .filter(|token| !token.is_empty())
        .map(expand_state)
        .collect()
}

const HOSPITAL_KEYWORDS: [&str; 7] = [
    "hospital",
    "hospice",
    "medical center",
    "icu",
    "emergency room",
    "nursing home",
    "care facility",
];

const HOME_KEYWORDS: [&str; 4] = ["home", "house", "apartment", "residence"];

/// Normalize where the deceased is for the final record.
///
/// Facility keywords win over place comparison, so "a hospital in Reno"
/// is `Hospital` even when the user lives elsewhere.
pub fn classify_deceased_location(
    deceased_location: Option<&str>,
    user_location: Option<&str>,
    classifier: &dyn LocationClassifier,
) -> DeceasedLocationKind {
    let Some(location) = deceased_location.map(str::trim).filter(|l| !l.is_empty()) else {
        return DeceasedLocationKind::Unknown;
    };
    let lower = location.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    if HOSPITAL_KEYWORDS.iter().any(|k| contains_phrase(&words, k)) {
        return DeceasedLocationKind::Hospital;
    }
    if HOME_KEYWORDS.iter().any(|k| contains_phrase(&words, k)) {
        return DeceasedLocationKind::Home;
    }
    match user_location.map(str::trim).filter(|l| !l.is_empty()) {
        Some(user) if !classifier.same_place(user, location) => DeceasedLocationKind::OutOfState,
        _ => DeceasedLocationKind::Unknown,
    }
}

fn contains_phrase(words: &[&str], phrase: &str) -> bool {
    let needle: Vec<&str> = phrase.split(' ').collect();
    words.windows(needle.len()).any(|window| window == needle.as_slice())
}
