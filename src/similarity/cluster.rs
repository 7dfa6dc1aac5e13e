use crate::similarity::levenshtein::{distance, similarity};

/// A candidate that passed a similarity filter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityMatch {
    /// Index of the candidate in the original list
    pub index: usize,

    /// Similarity of the candidate to the query
    pub similarity: f64,
}

/// Returns every candidate whose similarity to `query` is at least `threshold`
///
/// Matches keep their original indices and order.
pub fn filter_by_similarity<S: AsRef<str>>(
    query: &str,
    candidates: &[S],
    threshold: f64,
) -> Vec<SimilarityMatch> {
    candidates
        .iter()
        .enumerate()
        .map(|(index, candidate)| SimilarityMatch {
            index,
            similarity: similarity(query, candidate.as_ref()),
        })
        .filter(|m| m.similarity >= threshold)
        .collect()
}

/// Index of the candidate with the smallest edit distance to `query`
///
/// Ties resolve to the first occurrence. `None` for an empty list.
pub fn best_match_index<S: AsRef<str>>(query: &str, candidates: &[S]) -> Option<usize> {
    let mut best: Option<(usize, usize)> = None;

    for (index, candidate) in candidates.iter().enumerate() {
        let d = distance(query, candidate.as_ref());
        if best.map_or(true, |(_, lowest)| d < lowest) {
            best = Some((index, d));
        }
    }

    best.map(|(index, _)| index)
}

/// Greedy single-pass clustering (Hobohm algorithm 1)
///
/// Each item joins the first existing cluster whose representative (its first
/// member) has similarity >= `threshold` to the item, measured with the item as
/// the candidate. Otherwise the item starts a new cluster. Clusters come back in
/// first-seen order and partition the input exactly.
///
/// # Examples
///
/// ```
/// use comic_updater::similarity::cluster;
///
/// let clusters = cluster(&["/comic/1", "/comic/2", "/about"], 0.62);
/// assert_eq!(clusters, vec![vec!["/comic/1", "/comic/2"], vec!["/about"]]);
/// ```
pub fn cluster<S: AsRef<str> + Clone>(items: &[S], threshold: f64) -> Vec<Vec<S>> {
    let mut clusters: Vec<Vec<S>> = Vec::new();

    for item in items {
        let home = clusters.iter_mut().find(|members| {
            similarity(members[0].as_ref(), item.as_ref()) >= threshold
        });

        match home {
            Some(members) => members.push(item.clone()),
            None => clusters.push(vec![item.clone()]),
        }
    }

    clusters
}

/// Sorts items ascending by edit distance to `query`
///
/// The sort is stable: equally distant items keep their input order.
pub fn sort_by_similarity_score<S: AsRef<str> + Clone>(query: &str, items: &[S]) -> Vec<S> {
    let mut scored: Vec<(usize, &S)> = items
        .iter()
        .map(|item| (distance(query, item.as_ref()), item))
        .collect();

    scored.sort_by_key(|(score, _)| *score);

    scored.into_iter().map(|(_, item)| item.clone()).collect()
}

/// Items clustered together with `query`, closest first
///
/// Clusters `[query, items...]`, keeps the cluster that `query` represents,
/// drops `query` itself from it, and sorts what is left by distance. Copies of
/// `query` among `items` stay in the result.
pub fn sorted_cluster<S: AsRef<str>>(query: &str, items: &[S], threshold: f64) -> Vec<String> {
    let mut all: Vec<&str> = Vec::with_capacity(items.len() + 1);
    all.push(query);
    all.extend(items.iter().map(AsRef::as_ref));

    let mut clusters = cluster(&all, threshold);
    if clusters.is_empty() {
        return Vec::new();
    }

    let mut members = clusters.swap_remove(0);
    members.remove(0);

    tracing::trace!(
        "Cluster around {} kept {} of {} items",
        query,
        members.len(),
        items.len()
    );

    sort_by_similarity_score(query, &members)
        .into_iter()
        .map(str::to_string)
        .collect()
}
