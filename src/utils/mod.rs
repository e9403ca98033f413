use std::collections::HashSet;
use std::path::Path;

/// Static-asset extensions skipped when harvesting, they never reflect parameters.
pub const IGNORED_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "pdf", "svg", "json", "css", "js", "webp", "woff", "woff2",
    "eot", "ttf", "otf", "mp4", "txt",
];

pub fn default_extensions() -> Vec<String> {
    IGNORED_EXTENSIONS.iter().map(|e| e.to_string()).collect()
}

pub fn parse_extensions_csv(value: &str) -> Result<Vec<String>, String> {
    let raw = value.trim();
    if raw.is_empty() {
        return Err("extensions list is empty".to_string());
    }
    let mut out: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for part in raw.split(',') {
        let item = part.trim();
        if item.is_empty() {
            continue;
        }
        let cleaned = item.trim_start_matches('.');
        if cleaned.is_empty() {
            continue;
        }
        let key = cleaned.to_ascii_lowercase();
        if seen.insert(key.clone()) {
            out.push(key);
        }
    }
    if out.is_empty() {
        return Err("extensions list is empty".to_string());
    }
    Ok(out)
}

/// Trims, lowercases and dedupes a domain list, keeping first-seen order.
pub fn parse_domain_list(contents: &str) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    contents
        .lines()
        .map(|l| l.trim().to_lowercase())
        .filter(|l| !l.is_empty())
        .filter(|l| seen.insert(l.clone()))
        .collect()
}

pub fn has_extension(url: &reqwest::Url, extensions: &[String]) -> bool {
    let ext = match Path::new(url.path()).extension().and_then(|e| e.to_str()) {
        Some(ext) => ext.to_ascii_lowercase(),
        None => return false,
    };
    extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext))
}

/// Rewrites every query parameter of `raw` to `placeholder`.
///
/// Default ports are dropped by the url parser. Parameters without a value are
/// removed and repeated keys collapse into one. Returns `None` when `raw` does
/// not parse as an absolute url.
pub fn clean_url(raw: &str, placeholder: &str) -> Option<String> {
    let mut url = reqwest::Url::parse(raw.trim()).ok()?;
    let mut keys: Vec<String> = Vec::new();
    for (key, value) in url.query_pairs() {
        if value.is_empty() || keys.iter().any(|k| *k == key) {
            continue;
        }
        keys.push(key.into_owned());
    }
    if keys.is_empty() {
        url.set_query(None);
    } else {
        let mut pairs = url.query_pairs_mut();
        pairs.clear();
        for key in keys.iter() {
            pairs.append_pair(key, placeholder);
        }
    }
    Some(url.to_string())
}

/// Filters out static assets, cleans the rest and dedupes in first-seen order.
pub fn clean_urls(urls: &[String], extensions: &[String], placeholder: &str) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out: Vec<String> = Vec::new();
    for raw in urls {
        let parsed = match reqwest::Url::parse(raw.trim()) {
            Ok(parsed) => parsed,
            Err(_) => continue,
        };
        if has_extension(&parsed, extensions) {
            continue;
        }
        let cleaned = match clean_url(parsed.as_str(), placeholder) {
            Some(cleaned) => cleaned,
            None => continue,
        };
        if seen.insert(cleaned.clone()) {
            out.push(cleaned);
        }
    }
    out
}
