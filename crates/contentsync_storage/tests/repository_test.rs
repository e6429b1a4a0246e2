use chrono::NaiveDate;
use contentsync_storage::{
    ContentRepository, ContentSyncStorage, NewAttachment, NewPost, Taxonomy,
    ATTACHMENT_ALT_META_KEY,
};

fn new_post(title: &str) -> NewPost {
    let date = NaiveDate::from_ymd_opt(2024, 5, 1)
        .and_then(|d| d.and_hms_opt(10, 0, 0))
        .expect("date");
    NewPost {
        post_type: "post".to_string(),
        title: title.to_string(),
        content: "<p>body</p>".to_string(),
        excerpt: String::new(),
        status: "publish".to_string(),
        date,
        modified: date,
        parent: None,
    }
}

fn new_attachment(parent: Option<i64>, file_path: &str) -> NewAttachment {
    NewAttachment {
        parent,
        title: "A".to_string(),
        description: String::new(),
        caption: String::new(),
        file_path: file_path.to_string(),
        url: format!("https://dest.example/uploads/{file_path}"),
        mime_type: "image/png".to_string(),
    }
}

#[tokio::test]
async fn meta_appends_repeated_keys() {
    let storage = ContentSyncStorage::in_memory().await.expect("storage");
    let post_id = storage.insert_post(&new_post("Hello")).await.expect("post");

    storage.add_post_meta(post_id, "color", "red").await.expect("meta");
    storage.add_post_meta(post_id, "color", "blue").await.expect("meta");

    let meta = storage.post_meta(post_id).await.expect("meta");
    let colors: Vec<&str> = meta
        .iter()
        .filter(|entry| entry.meta_key == "color")
        .map(|entry| entry.meta_value.as_str())
        .collect();
    assert_eq!(colors, vec!["red", "blue"]);
}

#[tokio::test]
async fn update_meta_keeps_single_value() {
    let storage = ContentSyncStorage::in_memory().await.expect("storage");
    let post_id = storage.insert_post(&new_post("Hello")).await.expect("post");
    let first = storage
        .insert_attachment(&new_attachment(Some(post_id), "2024/05/a.png"))
        .await
        .expect("attachment");
    let second = storage
        .insert_attachment(&new_attachment(Some(post_id), "2024/05/b.png"))
        .await
        .expect("attachment");

    storage.set_thumbnail(post_id, first).await.expect("thumb");
    storage.set_thumbnail(post_id, second).await.expect("thumb");

    assert_eq!(storage.thumbnail_id(post_id).await.expect("thumb"), Some(second));
    let thumbs = storage
        .post_meta(post_id)
        .await
        .expect("meta")
        .into_iter()
        .filter(|entry| entry.meta_key == "_thumbnail_id")
        .count();
    assert_eq!(thumbs, 1);
}

#[tokio::test]
async fn attachment_lookup_matches_file_name_inside_path() {
    let storage = ContentSyncStorage::in_memory().await.expect("storage");
    let first = storage
        .insert_attachment(&new_attachment(None, "2024/05/a.png"))
        .await
        .expect("attachment");
    storage
        .insert_attachment(&new_attachment(None, "2024/06/a.png"))
        .await
        .expect("attachment");
    storage
        .add_post_meta(first, ATTACHMENT_ALT_META_KEY, "alt text")
        .await
        .expect("alt");

    let found = storage
        .find_attachment_by_file_name("a.png")
        .await
        .expect("query")
        .expect("found");
    assert_eq!(found.attachment_id, first);
    assert_eq!(found.alt.as_deref(), Some("alt text"));

    assert!(storage
        .find_attachment_by_file_name("missing.png")
        .await
        .expect("query")
        .is_none());
}

#[tokio::test]
async fn like_wildcards_in_file_names_match_literally() {
    let storage = ContentSyncStorage::in_memory().await.expect("storage");
    storage
        .insert_attachment(&new_attachment(None, "2024/05/myXphoto.png"))
        .await
        .expect("attachment");

    assert!(storage
        .find_attachment_by_file_name("my_photo.png")
        .await
        .expect("query")
        .is_none());
}

#[tokio::test]
async fn terms_are_unique_per_taxonomy_slug() {
    let storage = ContentSyncStorage::in_memory().await.expect("storage");
    let news = storage
        .insert_term(Taxonomy::Category, "News", "news")
        .await
        .expect("term");

    assert_eq!(
        storage
            .find_term_by_slug(Taxonomy::Category, "news")
            .await
            .expect("query"),
        Some(news)
    );
    assert!(storage
        .insert_term(Taxonomy::Category, "NEWS", "news")
        .await
        .is_err());
    storage
        .insert_term(Taxonomy::PostTag, "news", "news")
        .await
        .expect("same slug in another taxonomy");
}

#[tokio::test]
async fn set_post_terms_replaces_one_taxonomy() {
    let storage = ContentSyncStorage::in_memory().await.expect("storage");
    let post_id = storage.insert_post(&new_post("Hello")).await.expect("post");
    let news = storage.insert_term(Taxonomy::Category, "News", "news").await.expect("term");
    let sport = storage.insert_term(Taxonomy::Category, "Sport", "sport").await.expect("term");
    let intro = storage.insert_term(Taxonomy::PostTag, "intro", "intro").await.expect("term");

    storage.set_post_terms(post_id, Taxonomy::Category, &[news]).await.expect("assign");
    storage.set_post_terms(post_id, Taxonomy::PostTag, &[intro]).await.expect("assign");
    storage.set_post_terms(post_id, Taxonomy::Category, &[sport]).await.expect("assign");

    assert_eq!(
        storage.post_term_names(post_id, Taxonomy::Category).await.expect("names"),
        vec!["Sport"]
    );
    assert_eq!(
        storage.post_term_names(post_id, Taxonomy::PostTag).await.expect("names"),
        vec!["intro"]
    );
}

#[tokio::test]
async fn attached_media_filters_by_parent_and_mime() {
    let storage = ContentSyncStorage::in_memory().await.expect("storage");
    let post_id = storage.insert_post(&new_post("Hello")).await.expect("post");
    let other_id = storage.insert_post(&new_post("Other")).await.expect("post");

    let image = storage
        .insert_attachment(&new_attachment(Some(post_id), "2024/05/a.png"))
        .await
        .expect("attachment");
    let mut pdf = new_attachment(Some(post_id), "2024/05/doc.pdf");
    pdf.mime_type = "application/pdf".to_string();
    storage.insert_attachment(&pdf).await.expect("attachment");
    storage
        .insert_attachment(&new_attachment(Some(other_id), "2024/05/c.png"))
        .await
        .expect("attachment");

    let media = storage.attached_media(post_id, "image/").await.expect("media");
    assert_eq!(media.len(), 1);
    assert_eq!(media[0].attachment_id, image);
    assert_eq!(media[0].file_path, "2024/05/a.png");
}

#[tokio::test]
async fn list_posts_skips_attachments() {
    let storage = ContentSyncStorage::in_memory().await.expect("storage");
    let post_id = storage.insert_post(&new_post("Hello")).await.expect("post");
    storage
        .insert_attachment(&new_attachment(Some(post_id), "2024/05/a.png"))
        .await
        .expect("attachment");

    let posts = storage.list_posts(&["post", "page"]).await.expect("list");
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].post_title, "Hello");
    assert!(storage.get_post(post_id + 1).await.expect("query").is_none());
}

#[tokio::test]
async fn content_update_keeps_stored_dates() {
    let storage = ContentSyncStorage::in_memory().await.expect("storage");
    let post_id = storage.insert_post(&new_post("Hello")).await.expect("post");

    storage
        .update_post_content(post_id, "<p>rewritten</p>")
        .await
        .expect("update");

    let post = storage.get_post(post_id).await.expect("query").expect("post");
    assert_eq!(post.post_content, "<p>rewritten</p>");
    assert_eq!(post.post_date, "2024-05-01 10:00:00");
    assert_eq!(post.post_modified, "2024-05-01 10:00:00");
}
