//! Fuzzy scoring for schema lookups.
//!
//! Scores a query against a candidate string on a 0–1000 scale. Zero means
//! "discard". Used by `schema_info` to match model `api_key`s, names, and
//! ids against loose user input.
//!
//! Scoring tiers, highest first:
//!
//! 1. Exact case-insensitive match → 1000.
//! 2. Substring (either direction) → 500 plus a bonus for earlier positions.
//! 3. Levenshtein with normalized distance below 0.5 → 450 − 150·d.
//! 4. In-order character subsequence → 10 per match + 5 per consecutive pair.
//!
//! Ties between equal scores are broken by insertion order at the call site
//! (a stable sort preserves it).

/// Scores `query` against `target`. Higher is better; 0 means no match.
///
/// # Examples
///
/// ```
/// use dato_mcp_core::fuzzy_score;
///
/// assert_eq!(fuzzy_score("blog", "blog"), 1000);
/// assert!(fuzzy_score("usr", "user_profile") > 0);
/// assert_eq!(fuzzy_score("xyz", "blog_post"), 0);
/// ```
#[must_use]
pub fn fuzzy_score(query: &str, target: &str) -> u32 {
    if query.is_empty() || target.is_empty() {
        return 0;
    }

    let query = query.to_lowercase();
    let target = target.to_lowercase();

    if query == target {
        return 1000;
    }

    // Substring match, bidirectional. Earlier positions score higher.
    let substring_pos = target
        .find(&query)
        .or_else(|| query.find(&target));
    if let Some(pos) = substring_pos {
        let bonus = u32::try_from(100usize.saturating_sub(pos.saturating_mul(10))).unwrap_or(0);
        return 500 + bonus;
    }

    // Near-miss by edit distance.
    let query_chars: Vec<char> = query.chars().collect();
    let target_chars: Vec<char> = target.chars().collect();
    let max_len = query_chars.len().max(target_chars.len());
    let distance = levenshtein(&query_chars, &target_chars);
    #[allow(clippy::cast_precision_loss)]
    let normalized = distance as f64 / max_len as f64;
    if normalized < 0.5 {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        return (450.0 - 150.0 * normalized).round() as u32;
    }

    // In-order character subsequence.
    if let Some((matches, consecutive)) = subsequence_stats(&query_chars, &target_chars) {
        return 10 * matches + 5 * consecutive;
    }

    0
}

/// Greedy subsequence scan. Returns `(matches, consecutive)` when every
/// query character appears in order in the target, `None` otherwise.
fn subsequence_stats(query: &[char], target: &[char]) -> Option<(u32, u32)> {
    let mut matches = 0u32;
    let mut consecutive = 0u32;
    let mut last_hit: Option<usize> = None;
    let mut cursor = 0usize;

    for &qc in query {
        let hit = target[cursor..].iter().position(|&tc| tc == qc)?;
        let index = cursor + hit;
        if let Some(prev) = last_hit {
            if index == prev + 1 {
                consecutive += 1;
            }
        }
        last_hit = Some(index);
        cursor = index + 1;
        matches += 1;
    }

    Some((matches, consecutive))
}

/// Classic two-row Levenshtein over chars.
fn levenshtein(a: &[char], b: &[char]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, &ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}
