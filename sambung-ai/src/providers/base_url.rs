//! Normalize user-supplied endpoint URLs.
//!
//! Users paste full endpoint URLs (`.../v1/chat/completions`) where a base
//! URL is expected; the HTTP clients append the path themselves, so the
//! suffix has to go or every request 404s.

use url::Url;

/// Checked in order. `/chat/completions` comes before the `/v1/...`
/// forms so the API version segment survives.
const ENDPOINT_SUFFIXES: [&str; 4] = [
    "/chat/completions",
    "/completions",
    "/v1/chat/completions",
    "/v1/completions",
];

fn strip_path(path: &str) -> String {
    let mut path = path.to_string();
    loop {
        if path.len() > 1 && path.ends_with('/') {
            path.pop();
            continue;
        }
        match ENDPOINT_SUFFIXES.iter().find(|s| path.ends_with(*s)) {
            Some(suffix) => path.truncate(path.len() - suffix.len()),
            None => break,
        }
    }
    if path.is_empty() {
        path.push('/');
    }
    path
}

/// Returns `None` for absent or empty input.
///
/// Input that does not parse as an absolute URL is returned unchanged; it
/// fails later with a transport error that names it. Parsed URLs lose
/// endpoint suffixes and trailing slashes (a root path stays `/`); query
/// and fragment are kept. `sanitize_base_url(sanitize_base_url(u)) ==
/// sanitize_base_url(u)` for every input.
pub fn sanitize_base_url(raw: Option<&str>) -> Option<String> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }

    let Ok(mut url) = Url::parse(raw) else {
        return Some(raw.to_string());
    };
    if url.cannot_be_a_base() {
        return Some(raw.to_string());
    }

    let path = strip_path(url.path());
    url.set_path(&path);
    Some(url.to_string())
}

/// Append `segments` to the path of `base`, keeping any query string after
/// the new path. Extra `query` pairs are appended to the existing ones.
pub(crate) fn join_endpoint(base: &str, segments: &[&str], query: &[(&str, &str)]) -> String {
    let Ok(mut url) = Url::parse(base) else {
        return join_raw(base, segments, query);
    };
    match url.path_segments_mut() {
        Ok(mut path) => {
            path.pop_if_empty().extend(segments);
        }
        Err(()) => return join_raw(base, segments, query),
    }
    if !query.is_empty() {
        url.query_pairs_mut().extend_pairs(query);
    }
    url.to_string()
}

fn join_raw(base: &str, segments: &[&str], query: &[(&str, &str)]) -> String {
    let mut out = format!("{}/{}", base.trim_end_matches('/'), segments.join("/"));
    for (i, (k, v)) in query.iter().enumerate() {
        out.push(if i == 0 { '?' } else { '&' });
        out.push_str(k);
        out.push('=');
        out.push_str(v);
    }
    out
}
