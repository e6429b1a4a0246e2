use std::collections::BTreeMap;
use std::fmt;

use percent_encoding::percent_decode_str;
use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Serialize};

/// Metadata keys are not unique-valued: every key carries an ordered list of values.
pub type PostMeta = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum PostStatus {
    Publish,
    Future,
    Draft,
    Pending,
    Private,
    Trash,
    AutoDraft,
    Inherit,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Publish => "publish",
            PostStatus::Future => "future",
            PostStatus::Draft => "draft",
            PostStatus::Pending => "pending",
            PostStatus::Private => "private",
            PostStatus::Trash => "trash",
            PostStatus::AutoDraft => "auto-draft",
            PostStatus::Inherit => "inherit",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        serde_json::from_value(serde_json::Value::String(raw.to_string())).ok()
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to a binary asset, identified before sync by its absolute source URL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttachmentRef {
    /// Source-side attachment id. Informational only, never used for identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub caption: String,
    #[serde(default)]
    pub alt: String,
}

impl AttachmentRef {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            id: None,
            url: url.into(),
            title: String::new(),
            description: String::new(),
            caption: String::new(),
            alt: String::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Last path segment of the URL, percent-decoded, ignoring query string
    /// and fragment. Segments that decode to invalid UTF-8 or to a path
    /// separator yield `None`.
    pub fn file_name(&self) -> Option<String> {
        let rest = self
            .url
            .split_once("://")
            .map_or(self.url.as_str(), |(_, rest)| rest);
        let path = rest.split(['?', '#']).next().unwrap_or_default();
        let (_, path) = path.split_once('/')?;
        let segment = path.rsplit('/').next()?;
        let name = percent_decode_str(segment).decode_utf8().ok()?;
        if name.is_empty() || name.contains(['/', '\\']) {
            return None;
        }
        Some(name.into_owned())
    }
}

/// One content item in transit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TransferRecord {
    pub post_type: String,
    pub post_title: String,
    pub post_content: String,
    pub post_date: String,
    pub post_modified: String,
    pub post_status: PostStatus,
    pub post_excerpt: String,
    pub post_categories: Vec<String>,
    pub post_tags: Vec<String>,
    #[serde(deserialize_with = "deserialize_meta")]
    pub post_meta: PostMeta,
    pub featured_image: Option<AttachmentRef>,
    pub attachments: Vec<AttachmentRef>,
}

/// Accepts a JSON object or an empty JSON array; PHP-style encoders emit `[]` for an empty map.
fn deserialize_meta<'de, D>(deserializer: D) -> Result<PostMeta, D::Error>
where
    D: Deserializer<'de>,
{
    struct MetaVisitor;

    impl<'de> Visitor<'de> for MetaVisitor {
        type Value = PostMeta;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a map of meta keys to string lists, or an empty list")
        }

        fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut meta = PostMeta::new();
            while let Some((key, values)) = access.next_entry::<String, Vec<String>>()? {
                meta.entry(key).or_default().extend(values);
            }
            Ok(meta)
        }

        fn visit_seq<A>(self, mut access: A) -> Result<Self::Value, A::Error>
        where
            A: SeqAccess<'de>,
        {
            if access.next_element::<de::IgnoredAny>()?.is_some() {
                return Err(de::Error::invalid_length(1, &"an empty list"));
            }
            Ok(PostMeta::new())
        }
    }

    deserializer.deserialize_any(MetaVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn file_name_is_last_path_segment() {
        let attachment = AttachmentRef::new("https://src.example/wp-content/uploads/2024/05/a.png?ver=2");
        assert_eq!(attachment.file_name().as_deref(), Some("a.png"));

        let bare_host = AttachmentRef::new("https://src.example/");
        assert_eq!(bare_host.file_name(), None);
    }

    #[test]
    fn file_name_is_percent_decoded() {
        let spaced = AttachmentRef::new("https://src.example/uploads/my%20photo%C3%A9.png");
        assert_eq!(spaced.file_name().as_deref(), Some("my photo\u{e9}.png"));

        let smuggled = AttachmentRef::new("https://src.example/uploads/..%2Fetc%2Fpasswd");
        assert_eq!(smuggled.file_name(), None);

        let broken = AttachmentRef::new("https://src.example/uploads/%FF.png");
        assert_eq!(broken.file_name(), None);
    }

    #[test]
    fn status_uses_host_spelling() {
        assert_eq!(PostStatus::parse("auto-draft"), Some(PostStatus::AutoDraft));
        assert_eq!(PostStatus::parse("published"), None);
        assert_eq!(PostStatus::Publish.to_string(), "publish");
    }

    #[test]
    fn meta_accepts_empty_list() {
        let record: TransferRecord = serde_json::from_value(json!({
            "postType": "post",
            "postTitle": "Hello",
            "postContent": "",
            "postDate": "2024-05-01 10:00:00",
            "postModified": "2024-05-01 10:00:00",
            "postStatus": "publish",
            "postExcerpt": "",
            "postCategories": [],
            "postTags": [],
            "postMeta": [],
            "featuredImage": null,
            "attachments": []
        }))
        .expect("record");

        assert!(record.post_meta.is_empty());
        assert!(record.featured_image.is_none());
    }

    #[test]
    fn meta_keeps_every_value() {
        let meta: TransferRecord = serde_json::from_value(json!({
            "postType": "post",
            "postTitle": "Hello",
            "postContent": "",
            "postDate": "2024-05-01 10:00:00",
            "postModified": "2024-05-01 10:00:00",
            "postStatus": "draft",
            "postExcerpt": "",
            "postCategories": [],
            "postTags": [],
            "postMeta": { "color": ["red", "blue"] },
            "featuredImage": null,
            "attachments": []
        }))
        .expect("record");

        assert_eq!(meta.post_meta["color"], vec!["red", "blue"]);
    }
}
