use std::collections::BTreeMap;

use regex::{Captures, Regex};

/// Replaces every occurrence of each old URL with its new URL.
///
/// Plain substring matching, no HTML awareness. All URLs are replaced in a
/// single left-to-right pass with longer URLs tried first, so a URL that is
/// a prefix of another, or a replacement that contains another old URL,
/// cannot corrupt the result.
pub fn rewrite_urls(content: &str, replacements: &BTreeMap<String, String>) -> String {
    let mut old_urls: Vec<&str> = replacements
        .keys()
        .map(String::as_str)
        .filter(|url| !url.is_empty())
        .collect();
    if old_urls.is_empty() {
        return content.to_string();
    }
    old_urls.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

    let alternation = old_urls
        .iter()
        .map(|url| regex::escape(url))
        .collect::<Vec<_>>()
        .join("|");
    let Ok(pattern) = Regex::new(&alternation) else {
        return old_urls.iter().fold(content.to_string(), |acc, old| {
            acc.replace(old, &replacements[*old])
        });
    };

    pattern
        .replace_all(content, |caps: &Captures| {
            replacements
                .get(&caps[0])
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}
