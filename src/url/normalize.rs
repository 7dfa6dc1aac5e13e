use crate::UrlError;
use url::Url;

/// Normalizes a URL into the form used for comparison and storage
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed
/// 2. Accept only HTTP(S) (scheme is kept as-is)
/// 3. Lowercase the host and remove the www. prefix
/// 4. Normalize path:
///    - Remove dot segments (. and ..) and duplicate slashes
///    - Remove trailing slash (except for root /)
///    - Empty path becomes /
/// 5. Remove fragment (everything after #)
/// 6. Remove utm_* query parameters
/// 7. Sort remaining query parameters by key (stable)
/// 8. Remove empty query string (trailing ?)
///
/// # Examples
///
/// ```
/// use comic_updater::url::normalize_url;
///
/// let url = normalize_url("http://WWW.EXAMPLE.COM/comic/42/#top").unwrap();
/// assert_eq!(url.as_str(), "http://example.com/comic/42");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    let host = url.host_str().ok_or(UrlError::MissingDomain)?;
    let host = canonical_host(host);
    url.set_host(Some(&host))
        .map_err(|e| UrlError::Malformed(format!("Invalid host {}: {}", host, e)))?;

    let path = collapse_path(url.path());
    url.set_path(&path);
    url.set_fragment(None);

    let query = canonical_query(&url);
    match query {
        Some(pairs) if !pairs.is_empty() => {
            url.query_pairs_mut().clear().extend_pairs(pairs);
        }
        _ => url.set_query(None),
    }

    Ok(url)
}

/// Lowercased host without a leading `www.`
fn canonical_host(host: &str) -> String {
    let host = host.to_ascii_lowercase();
    match host.strip_prefix("www.") {
        Some(bare) => bare.to_string(),
        None => host,
    }
}

/// Resolves `.`/`..` segments, collapses repeated slashes and drops the
/// trailing slash; the root stays `/`
fn collapse_path(path: &str) -> String {
    let segments = path.split('/').fold(Vec::new(), |mut kept, segment| {
        match segment {
            "" | "." => {}
            ".." => {
                kept.pop();
            }
            _ => kept.push(segment),
        }
        kept
    });

    format!("/{}", segments.join("/"))
}

/// Query pairs without `utm_*` tracking keys, sorted by key
///
/// `None` when the URL has no query at all.
fn canonical_query(url: &Url) -> Option<Vec<(String, String)>> {
    url.query()?;

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !key.to_ascii_lowercase().starts_with("utm_"))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    pairs.sort_by(|a, b| a.0.cmp(&b.0));

    Some(pairs)
}
