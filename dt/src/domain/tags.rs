//! Local canonical tag vocabulary
//!
//! Used when the planning service cannot be reached for `/tags` or
//! `/normalize_tags`.

use std::collections::HashSet;

/// Synonym → canonical tag
const VOCAB: &[(&str, &str)] = &[
    ("museum", "museum"),
    ("museums", "museum"),
    ("exhibition", "museum"),
    ("музей", "museum"),
    ("art", "art"),
    ("gallery", "art"),
    ("theatre", "art"),
    ("theater", "art"),
    ("галерея", "art"),
    ("history", "history"),
    ("historic", "history"),
    ("monument", "history"),
    ("история", "history"),
    ("architecture", "architecture"),
    ("mansion", "architecture"),
    ("архитектура", "architecture"),
    ("park", "park"),
    ("parks", "park"),
    ("garden", "park"),
    ("nature", "park"),
    ("парк", "park"),
    ("walk", "walk"),
    ("promenade", "walk"),
    ("pedestrian", "walk"),
    ("viewpoint", "viewpoint"),
    ("view", "viewpoint"),
    ("waterfront", "waterfront"),
    ("embankment", "waterfront"),
    ("набережная", "waterfront"),
    ("food", "food"),
    ("restaurant", "food"),
    ("restaurants", "food"),
    ("еда", "food"),
    ("coffee", "coffee"),
    ("cafe", "coffee"),
    ("кофе", "coffee"),
    ("family", "family"),
    ("kids", "family"),
    ("sport", "sport"),
    ("sports", "sport"),
    ("poi", "poi"),
    ("attraction", "poi"),
];

/// Map free-form tags onto the canonical vocabulary
///
/// Lowercases and trims, drops empties, maps known synonyms, keeps unknown
/// tags as-is, and removes duplicates while preserving first-seen order.
pub fn normalize_tags<S: AsRef<str>>(raw: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.iter()
        .map(|t| t.as_ref().trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .map(|t| {
            VOCAB
                .iter()
                .find(|(synonym, _)| *synonym == t)
                .map(|(_, canonical)| canonical.to_string())
                .unwrap_or(t)
        })
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// Sorted list of canonical tags
pub fn allowed_tags() -> Vec<String> {
    let mut tags: Vec<String> = VOCAB.iter().map(|(_, c)| c.to_string()).collect();
    tags.sort();
    tags.dedup();
    tags
}
