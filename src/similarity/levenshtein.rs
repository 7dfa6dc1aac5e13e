/// Classic edit distance between two strings
///
/// Insertions, deletions and substitutions each cost 1. Distances are counted
/// in `char`s, not bytes, so multi-byte text is not over-penalized.
///
/// # Examples
///
/// ```
/// use comic_updater::similarity::distance;
///
/// assert_eq!(distance("kitten", "sitting"), 3);
/// assert_eq!(distance("", "abc"), 3);
/// ```
pub fn distance(a: &str, b: &str) -> usize {
    if a == b {
        return 0;
    }

    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    // Two rows of the DP matrix are enough
    let mut previous: Vec<usize> = (0..=a.len()).collect();
    let mut current = vec![0; a.len() + 1];

    for (i, cb) in b.iter().enumerate() {
        current[0] = i + 1;

        for (j, ca) in a.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            let deletion = current[j] + 1;
            let insertion = previous[j + 1] + 1;

            current[j + 1] = substitution.min(deletion).min(insertion);
        }

        std::mem::swap(&mut previous, &mut current);
    }

    previous[a.len()]
}

/// Similarity of a candidate to a query, in `(-inf, 1]`
///
/// `1 - distance(query, candidate) / max(1, len(candidate))`. The denominator
/// is the candidate's length, so the measure is asymmetric.
///
/// # Examples
///
/// ```
/// use comic_updater::similarity::similarity;
///
/// assert_eq!(similarity("a", "ab"), 0.5);
/// assert_eq!(similarity("ab", "a"), 0.0);
/// ```
pub fn similarity(query: &str, candidate: &str) -> f64 {
    let length = candidate.chars().count().max(1);
    1.0 - distance(query, candidate) as f64 / length as f64
}
