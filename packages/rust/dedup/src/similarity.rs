//! String, title and URL similarity measures, all in `[0, 1]`.

use std::collections::HashSet;

use url::Url;

use crate::normalize::{bare_host, normalize_url};

/// Title separators after which sites append their own name.
const TITLE_SEPARATORS: &[&str] = &[" - ", " | ", " · ", " — ", " – "];

/// Character-level Levenshtein edit distance.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// `1 - distance / max_len`; two empty strings are identical.
pub fn normalized_levenshtein(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / max_len as f64
}

/// Jaccard index of two word sets. Empty input on either side scores 0.
pub fn jaccard<'a>(
    a: impl IntoIterator<Item = &'a str>,
    b: impl IntoIterator<Item = &'a str>,
) -> f64 {
    let a: HashSet<&str> = a.into_iter().collect();
    let b: HashSet<&str> = b.into_iter().collect();
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(&b).count();
    let union = a.union(&b).count();
    intersection as f64 / union as f64
}

/// Lower-cased title with any trailing " - Site Name" style suffix removed.
pub fn comparable_title(title: &str) -> String {
    let mut head = title.trim();
    for sep in TITLE_SEPARATORS {
        if let Some((before, _)) = head.split_once(sep) {
            if !before.trim().is_empty() {
                head = before;
            }
        }
    }
    head.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// `0.6 × sequence similarity + 0.4 × word Jaccard` over comparable titles.
pub fn title_similarity(a: &str, b: &str) -> f64 {
    let a = comparable_title(a);
    let b = comparable_title(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    let sequence = normalized_levenshtein(&a, &b);
    let words = jaccard(a.split_whitespace(), b.split_whitespace());
    0.6 * sequence + 0.4 * words
}

/// Path similarity of two URLs after normalization.
pub fn path_similarity(a: &str, b: &str) -> f64 {
    match (Url::parse(&normalize_url(a)), Url::parse(&normalize_url(b))) {
        (Ok(ua), Ok(ub)) => normalized_levenshtein(ua.path(), ub.path()),
        _ => 0.0,
    }
}

/// `0.5 × same host + 0.3 × path similarity + 0.2 × query similarity`.
pub fn url_similarity(a: &str, b: &str) -> f64 {
    let na = normalize_url(a);
    let nb = normalize_url(b);
    if na == nb {
        return 1.0;
    }
    let (Ok(ua), Ok(ub)) = (Url::parse(&na), Url::parse(&nb)) else {
        return normalized_levenshtein(&na, &nb);
    };

    let same_host = match (ua.host_str(), ub.host_str()) {
        (Some(ha), Some(hb)) if bare_host(ha) == bare_host(hb) => 1.0,
        _ => 0.0,
    };
    let path = normalized_levenshtein(ua.path(), ub.path());
    let query = normalized_levenshtein(ua.query().unwrap_or(""), ub.query().unwrap_or(""));

    0.5 * same_host + 0.3 * path + 0.2 * query
}
