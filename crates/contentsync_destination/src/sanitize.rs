//! Host-style input sanitizers for incoming records.

use std::sync::OnceLock;

use regex::{Captures, Regex};

const STRIPPED_ELEMENTS: [&str; 7] = [
    "script", "style", "iframe", "object", "embed", "form", "noscript",
];

struct Patterns {
    script_or_style: Regex,
    tag: Regex,
    whitespace: Regex,
    octet: Regex,
    spaces: Regex,
    elements: Vec<(Regex, Regex)>,
    attribute: Regex,
    script_protocol: Regex,
    entity: Regex,
    dashes: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let compile = |pattern: &str| Regex::new(pattern).expect("static sanitizer pattern");
        Patterns {
            script_or_style: compile(r"(?is)<(?:script|style)\b[^>]*>.*?</(?:script|style)\s*>"),
            tag: compile(r"(?s)<[^>]*>"),
            whitespace: compile(r"[\r\n\t ]+"),
            octet: compile(r"%[a-fA-F0-9]{2}"),
            spaces: compile(r" +"),
            elements: STRIPPED_ELEMENTS
                .iter()
                .map(|name| {
                    (
                        compile(&format!(r"(?is)<{name}\b[^>]*>.*?</{name}\s*>")),
                        compile(&format!(r"(?is)</?{name}\b[^>]*>")),
                    )
                })
                .collect(),
            attribute: compile(
                r#"\s+([A-Za-z_:][-A-Za-z0-9_:.]*)(?:\s*=\s*(?:"[^"]*"|'[^']*'|[^\s"'>]+))?"#,
            ),
            script_protocol: compile(r"(?i)(?:java|vb)\s*script\s*:"),
            entity: compile(r"&[a-zA-Z0-9#]+;"),
            dashes: compile(r"-{2,}"),
        }
    })
}

/// Plain-text sanitizer: strips markup, collapses whitespace and line
/// breaks, drops percent-encoded octets, trims.
pub fn sanitize_text_field(raw: &str) -> String {
    let p = patterns();
    let mut text = raw.to_string();
    if text.contains('<') {
        text = p.script_or_style.replace_all(&text, "").into_owned();
        text = p.tag.replace_all(&text, "").into_owned();
        text = text.replace('<', "&lt;");
    }
    text = p.whitespace.replace_all(&text, " ").trim().to_string();

    if p.octet.is_match(&text) {
        while p.octet.is_match(&text) {
            text = p.octet.replace_all(&text, "").into_owned();
        }
        text = p.spaces.replace_all(&text, " ").trim().to_string();
    }
    text
}

/// Markup sanitizer for post bodies. Keeps ordinary markup and attribute
/// values intact; removes active content.
pub fn sanitize_post_content(raw: &str) -> String {
    let p = patterns();
    let mut html = raw.to_string();
    for (with_body, bare) in &p.elements {
        html = with_body.replace_all(&html, "").into_owned();
        html = bare.replace_all(&html, "").into_owned();
    }

    p.tag
        .replace_all(&html, |caps: &Captures| {
            // Whole attributes are matched so quoted values are never scanned.
            let tag = p.attribute.replace_all(&caps[0], |attr: &Captures| {
                if attr[1].to_ascii_lowercase().starts_with("on") {
                    String::new()
                } else {
                    attr[0].to_string()
                }
            });
            p.script_protocol.replace_all(&tag, "").into_owned()
        })
        .into_owned()
}

/// Lowercase key made of `[a-z0-9_-]`, used for post types.
pub fn sanitize_key(raw: &str) -> String {
    raw.chars()
        .filter_map(|ch| {
            let ch = ch.to_ascii_lowercase();
            (ch.is_ascii_alphanumeric() || ch == '_' || ch == '-').then_some(ch)
        })
        .collect()
}

/// URL slug for a term name: `"Local News"` becomes `"local-news"`.
pub fn slugify(name: &str) -> String {
    let p = patterns();
    let stripped = p.tag.replace_all(name, "");
    let stripped = p.entity.replace_all(&stripped, "");

    let mut slug = String::with_capacity(stripped.len());
    for ch in stripped.chars().flat_map(char::to_lowercase) {
        if ch.is_alphanumeric() || ch == '_' {
            slug.push(ch);
        } else if ch.is_whitespace() || ch == '-' || ch == '.' || ch == '/' {
            slug.push('-');
        }
    }

    p.dashes
        .replace_all(&slug, "-")
        .trim_matches('-')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_field_strips_markup_and_breaks() {
        assert_eq!(
            sanitize_text_field("  <b>Hello</b>\n\tworld <script>alert(1)</script> "),
            "Hello world"
        );
        assert_eq!(sanitize_text_field("a < b"), "a &lt; b");
    }

    #[test]
    fn text_field_drops_percent_octets() {
        assert_eq!(sanitize_text_field("50%25 off %41"), "50 off");
    }

    #[test]
    fn content_keeps_images_and_links() {
        let html = r#"<p>Hi <a href="https://x.example/">x</a></p><img src="https://src.example/a.png" alt="A">"#;
        assert_eq!(sanitize_post_content(html), html);
    }

    #[test]
    fn content_removes_active_markup() {
        let html = r#"<p onclick="steal()">Hi</p><script>alert(1)</script><a href="javascript:alert(1)">x</a><iframe src="https://evil.example"></iframe>"#;
        assert_eq!(
            sanitize_post_content(html),
            r#"<p>Hi</p><a href="alert(1)">x</a>"#
        );
    }

    #[test]
    fn content_text_mentioning_events_is_untouched() {
        let html = "<p>Call us online = today</p>";
        assert_eq!(sanitize_post_content(html), html);
    }

    #[test]
    fn content_event_text_inside_attribute_value_is_kept() {
        let html = r#"<img alt="x online=1" title='a onload=b' src="a.png">"#;
        assert_eq!(sanitize_post_content(html), html);

        assert_eq!(
            sanitize_post_content(r#"<img alt="x online=1" ONERROR=steal() src="a.png" />"#),
            r#"<img alt="x online=1" src="a.png" />"#
        );
    }

    #[test]
    fn slugs_are_lowercase_and_dashed() {
        assert_eq!(slugify("Local News"), "local-news");
        assert_eq!(slugify("  News & Events!  "), "news-events");
        assert_eq!(slugify("Café"), "café");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn keys_are_restricted() {
        assert_eq!(sanitize_key("Post"), "post");
        assert_eq!(sanitize_key("my custom type!"), "mycustomtype");
    }
}
