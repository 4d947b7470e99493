//! Exact and fuzzy text matching shared by fusion queries and edge retrieval
//!
//! Exact mode is a case-insensitive substring test. Fuzzy mode additionally
//! slides a window of the query's token count over the text and accepts the
//! closest window when its normalized Levenshtein distance is below the
//! threshold. The scan is linear in the number of records.

/// Relevance of `text` for `query`, or `None` when it does not match.
///
/// Exact substring hits score 1.0; fuzzy hits score `1 - distance / max_len`.
/// An empty query matches everything.
pub fn match_score(text: &str, query: &str, fuzzy: bool, threshold: f64) -> Option<f64> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return Some(1.0);
    }

    let text = text.to_lowercase();
    if text.contains(&query) {
        return Some(1.0);
    }
    if !fuzzy {
        return None;
    }

    let distance = best_window_distance(&text, &query)?;
    if distance < threshold {
        Some(1.0 - distance)
    } else {
        None
    }
}

/// Smallest normalized edit distance between `query` and any run of the
/// same number of tokens in `text`.
fn best_window_distance(text: &str, query: &str) -> Option<f64> {
    let tokens: Vec<&str> = tokenize(text).collect();
    let width = tokenize(query).count().max(1);
    if tokens.is_empty() {
        return None;
    }

    let query_chars: Vec<char> = query.chars().collect();
    let mut best: Option<f64> = None;
    let window_count = tokens.len().saturating_sub(width) + 1;
    for start in 0..window_count {
        let end = (start + width).min(tokens.len());
        let window = tokens[start..end].join(" ");
        let window_chars: Vec<char> = window.chars().collect();
        let max_len = query_chars.len().max(window_chars.len());
        if max_len == 0 {
            continue;
        }
        // Length difference is a lower bound on the distance.
        let floor = query_chars.len().abs_diff(window_chars.len()) as f64 / max_len as f64;
        if best.is_some_and(|b| floor >= b) {
            continue;
        }
        let d = levenshtein(&query_chars, &window_chars) as f64 / max_len as f64;
        if best.map_or(true, |b| d < b) {
            best = Some(d);
        }
    }
    best
}

fn tokenize(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
}

/// Levenshtein distance over chars, two-row dynamic programming.
pub fn levenshtein(a: &[char], b: &[char]) -> usize {
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
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}
