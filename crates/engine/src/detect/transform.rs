// ABOUTME: Field value transforms: trim, lowercase and url-clean (tracking parameter removal).
// ABOUTME: url-clean leaves relative or unparseable URLs untouched apart from trimming.

use url::Url;

use crate::rules::Transform;

/// Query parameters removed by `url-clean`. Entries ending in `_` are prefixes.
const TRACKING_PARAMS: &[&str] = &[
    "utm_", "fbclid", "gclid", "dclid", "msclkid", "mc_cid", "mc_eid", "igshid", "twclid",
    "ref_src", "ref_url", "si",
];

fn is_tracking_param(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    TRACKING_PARAMS.iter().any(|p| {
        if p.ends_with('_') {
            name.starts_with(p)
        } else {
            name == *p
        }
    })
}

/// Removes tracking query parameters from an absolute URL.
pub fn clean_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let mut url = match Url::parse(trimmed) {
        Ok(u) => u,
        Err(_) => return trimmed.to_string(),
    };
    if url.query().is_none() {
        return url.to_string();
    }

    let total = url.query_pairs().count();
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if kept.len() == total {
        return url.to_string();
    }
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }
    url.to_string()
}

/// Applies an optional transform to an extracted value.
pub fn apply(transform: Option<Transform>, value: &str) -> String {
    match transform {
        None => value.to_string(),
        Some(Transform::Trim) => value.trim().to_string(),
        Some(Transform::Lowercase) => value.to_lowercase(),
        Some(Transform::UrlClean) => clean_url(value),
    }
}
