//! Profile-image URL size rewriting.
//!
//! Profile images on the X/Twitter CDN come in two shapes:
//!
//! - suffix style: `https://pbs.twimg.com/profile_images/1/abc_normal.jpg`
//! - query style: `https://pbs.twimg.com/media/abc?format=jpg&name=small`
//!
//! [`rewrite_size`] asks the same provider for another resolution. Anything
//! else is returned unchanged.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use super::size::SizeToken;

/// Last path segment of a suffix-style image: optional `_<size>` before an
/// image extension. Other dotted segments (`john.doe`) are not files.
static SUFFIX_STYLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<stem>.+?)(?:_(?:mini|normal|bigger|400x400))?(?P<ext>\.(?i:jpe?g|png|gif|webp|bmp|svg))$",
    )
    .unwrap()
});

/// Rewrite `url` so that it requests `size`. Best-effort, never fails.
pub fn rewrite_size(url: &str, size: SizeToken) -> String {
    if let Some(rewritten) = rewrite_name_param(url, size) {
        return rewritten;
    }
    if let Some(rewritten) = rewrite_suffix(url, size) {
        return rewritten;
    }
    url.to_string()
}

/// Value of the `name` query parameter for a size.
fn name_param(size: SizeToken) -> &'static str {
    match size {
        SizeToken::Original => "orig",
        other => other.as_str(),
    }
}

fn rewrite_name_param(url: &str, size: SizeToken) -> Option<String> {
    let mut parsed = Url::parse(url).ok()?;
    if !parsed.query_pairs().any(|(k, _)| k == "name") {
        return None;
    }

    let pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .map(|(k, v)| {
            let value = if k == "name" {
                name_param(size).to_string()
            } else {
                v.into_owned()
            };
            (k.into_owned(), value)
        })
        .collect();
    parsed.query_pairs_mut().clear().extend_pairs(pairs);
    Some(parsed.to_string())
}

fn rewrite_suffix(url: &str, size: SizeToken) -> Option<String> {
    let split = url.find(['?', '#']).unwrap_or(url.len());
    let (path_part, tail) = url.split_at(split);

    // The file name must live in the path, not in the authority.
    let authority_start = path_part.find("://").map(|i| i + 3).unwrap_or(0);
    let slash = authority_start + path_part[authority_start..].rfind('/')?;
    let (dir, segment) = path_part.split_at(slash + 1);

    let caps = SUFFIX_STYLE.captures(segment)?;
    let stem = &caps["stem"];
    let ext = &caps["ext"];
    let file = match size {
        SizeToken::Original => format!("{stem}{ext}"),
        other => format!("{stem}_{other}{ext}"),
    };
    Some(format!("{dir}{file}{tail}"))
}
