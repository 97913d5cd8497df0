use url::Url;

use super::forms::is_security_param;

/// Common names appended when synthetic parameters are enabled.
pub const SYNTHETIC_PARAMS: &[&str] = &["q", "query", "search", "id", "name", "title"];

/// Query parameter names, left to right, without duplicates or security
/// tokens, optionally extended with synthetic names, capped at `max_params`.
pub fn extract_params(url: &Url, max_params: usize, synthetic: bool) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for (k, _) in url.query_pairs() {
        if k.is_empty() || is_security_param(&k) || names.iter().any(|n| n == &k) {
            continue;
        }
        names.push(k.to_string());
    }
    if synthetic {
        for s in SYNTHETIC_PARAMS {
            if !names.iter().any(|n| n == s) {
                names.push(s.to_string());
            }
        }
    }
    names.truncate(max_params);
    names
}

/// Replace (or append) `name` with `value`, preserving every other pair and
/// its position.
pub fn with_param(url: &Url, name: &str, value: &str) -> Url {
    let mut out = url.clone();
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            if k == name {
                (k.to_string(), value.to_string())
            } else {
                (k.to_string(), v.to_string())
            }
        })
        .collect();
    if !pairs.iter().any(|(k, _)| k == name) {
        pairs.push((name.to_string(), value.to_string()));
    }
    out.query_pairs_mut().clear().extend_pairs(pairs.iter());
    out
}

/// `url` with its fragment set to `payload`.
pub fn with_fragment(url: &Url, payload: &str) -> Url {
    let mut out = url.clone();
    out.set_fragment(Some(payload));
    out
}
