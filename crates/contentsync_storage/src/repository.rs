use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};
use std::str::FromStr;
use tracing::info;

use crate::traits::{ContentRepository, ATTACHED_FILE_META_KEY};

const SCHEMA_SQL: &str = include_str!("sql/schema.sql");

pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub type PostId = i64;
pub type TermId = i64;

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub sqlite_path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Taxonomy {
    Category,
    PostTag,
}

impl Taxonomy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Taxonomy::Category => "category",
            Taxonomy::PostTag => "post_tag",
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub post_type: String,
    pub title: String,
    pub content: String,
    pub excerpt: String,
    pub status: String,
    pub date: NaiveDateTime,
    pub modified: NaiveDateTime,
    pub parent: Option<PostId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PostRecord {
    pub post_id: PostId,
    pub post_type: String,
    pub post_title: String,
    pub post_content: String,
    pub post_excerpt: String,
    pub post_status: String,
    pub post_date: String,
    pub post_modified: String,
    pub post_parent: Option<PostId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct MetaEntry {
    pub meta_key: String,
    pub meta_value: String,
}

#[derive(Debug, Clone)]
pub struct NewAttachment {
    pub parent: Option<PostId>,
    pub title: String,
    pub description: String,
    pub caption: String,
    /// Path relative to the upload root, e.g. `2024/05/a.png`.
    pub file_path: String,
    pub url: String,
    pub mime_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AttachmentRecord {
    pub attachment_id: PostId,
    pub post_parent: Option<PostId>,
    pub title: String,
    pub description: String,
    pub caption: String,
    pub mime_type: String,
    pub url: String,
    pub file_path: String,
    pub alt: Option<String>,
}

const POST_COLUMNS: &str = "post_id, post_type, post_title, post_content, post_excerpt, post_status, post_date, post_modified, post_parent";

const ATTACHMENT_SELECT: &str = "SELECT p.post_id AS attachment_id, p.post_parent, p.post_title AS title, \
     p.post_content AS description, p.post_excerpt AS caption, p.post_mime_type AS mime_type, \
     p.guid AS url, f.meta_value AS file_path, \
     (SELECT a.meta_value FROM post_meta a WHERE a.post_id = p.post_id AND a.meta_key = '_wp_attachment_image_alt' ORDER BY a.meta_id LIMIT 1) AS alt \
     FROM posts p JOIN post_meta f ON f.post_id = p.post_id AND f.meta_key = '_wp_attached_file' \
     WHERE p.post_type = 'attachment'";

#[derive(Debug, Clone)]
pub struct ContentSyncStorage {
    pool: SqlitePool,
}

impl ContentSyncStorage {
    pub async fn connect(config: &StorageConfig) -> Result<Self> {
        let uri = normalize_sqlite_uri(&config.sqlite_path);
        let options = SqliteConnectOptions::from_str(&uri)
            .with_context(|| format!("invalid sqlite URI: {}", uri))?
            .create_if_missing(true);

        // Every connection to `:memory:` opens its own database.
        let in_memory = uri.contains(":memory:");
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .context("failed to connect sqlite pool")?;

        let storage = Self { pool };
        storage.migrate().await?;
        Ok(storage)
    }

    pub async fn in_memory() -> Result<Self> {
        Self::connect(&StorageConfig {
            sqlite_path: "sqlite::memory:".to_string(),
        })
        .await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA_SQL.split(';') {
            let sql = statement.trim();
            if sql.is_empty() {
                continue;
            }
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .with_context(|| format!("migration failed for statement: {sql}"))?;
        }
        info!("contentsync sqlite schema ready");
        Ok(())
    }
}

#[async_trait]
impl ContentRepository for ContentSyncStorage {
    async fn insert_post(&self, post: &NewPost) -> Result<PostId> {
        if post.post_type.trim().is_empty() {
            bail!("post type cannot be empty");
        }

        let result = sqlx::query(
            "INSERT INTO posts(post_type, post_title, post_content, post_excerpt, post_status, post_date, post_modified, post_parent) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&post.post_type)
        .bind(&post.title)
        .bind(&post.content)
        .bind(&post.excerpt)
        .bind(&post.status)
        .bind(post.date.format(DATE_FORMAT).to_string())
        .bind(post.modified.format(DATE_FORMAT).to_string())
        .bind(post.parent)
        .execute(&self.pool)
        .await
        .context("insert post")?;

        Ok(result.last_insert_rowid())
    }

    async fn get_post(&self, post_id: PostId) -> Result<Option<PostRecord>> {
        sqlx::query_as::<_, PostRecord>(&format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE post_id = ? AND post_type != 'attachment'"
        ))
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("query post {post_id}"))
    }

    async fn list_posts(&self, post_types: &[&str]) -> Result<Vec<PostRecord>> {
        if post_types.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; post_types.len()].join(", ");
        let sql = format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE post_type IN ({placeholders}) ORDER BY post_id ASC"
        );
        let mut query = sqlx::query_as::<_, PostRecord>(&sql);
        for post_type in post_types {
            query = query.bind(*post_type);
        }
        query.fetch_all(&self.pool).await.context("list posts")
    }

    async fn update_post_content(&self, post_id: PostId, content: &str) -> Result<()> {
        let result = sqlx::query("UPDATE posts SET post_content = ? WHERE post_id = ?")
            .bind(content)
            .bind(post_id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("update content of post {post_id}"))?;

        if result.rows_affected() == 0 {
            bail!("post {post_id} not found");
        }
        Ok(())
    }

    async fn add_post_meta(&self, post_id: PostId, key: &str, value: &str) -> Result<()> {
        sqlx::query("INSERT INTO post_meta(post_id, meta_key, meta_value) VALUES (?, ?, ?)")
            .bind(post_id)
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await
            .with_context(|| format!("insert meta {key} for post {post_id}"))?;
        Ok(())
    }

    async fn update_post_meta(&self, post_id: PostId, key: &str, value: &str) -> Result<()> {
        let mut tx = self.pool.begin().await.context("begin meta update")?;
        sqlx::query("DELETE FROM post_meta WHERE post_id = ? AND meta_key = ?")
            .bind(post_id)
            .bind(key)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("clear meta {key} for post {post_id}"))?;
        sqlx::query("INSERT INTO post_meta(post_id, meta_key, meta_value) VALUES (?, ?, ?)")
            .bind(post_id)
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("insert meta {key} for post {post_id}"))?;
        tx.commit().await.context("commit meta update")?;
        Ok(())
    }

    async fn post_meta(&self, post_id: PostId) -> Result<Vec<MetaEntry>> {
        sqlx::query_as::<_, MetaEntry>(
            "SELECT meta_key, meta_value FROM post_meta WHERE post_id = ? ORDER BY meta_id ASC",
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("query meta of post {post_id}"))
    }

    async fn meta_value(&self, post_id: PostId, key: &str) -> Result<Option<String>> {
        sqlx::query_scalar::<_, String>(
            "SELECT meta_value FROM post_meta WHERE post_id = ? AND meta_key = ? ORDER BY meta_id ASC LIMIT 1",
        )
        .bind(post_id)
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("query meta {key} of post {post_id}"))
    }

    async fn find_term_by_slug(&self, taxonomy: Taxonomy, slug: &str) -> Result<Option<TermId>> {
        sqlx::query_scalar::<_, TermId>("SELECT term_id FROM terms WHERE taxonomy = ? AND slug = ?")
            .bind(taxonomy.as_str())
            .bind(slug)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("query {} by slug {slug}", taxonomy.as_str()))
    }

    async fn find_term_by_name(&self, taxonomy: Taxonomy, name: &str) -> Result<Option<TermId>> {
        sqlx::query_scalar::<_, TermId>(
            "SELECT term_id FROM terms WHERE taxonomy = ? AND name = ? ORDER BY term_id ASC LIMIT 1",
        )
        .bind(taxonomy.as_str())
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("query {} by name {name}", taxonomy.as_str()))
    }

    async fn insert_term(&self, taxonomy: Taxonomy, name: &str, slug: &str) -> Result<TermId> {
        if name.trim().is_empty() || slug.is_empty() {
            bail!("{} name cannot be empty", taxonomy.as_str());
        }

        let result = sqlx::query("INSERT INTO terms(taxonomy, name, slug) VALUES (?, ?, ?)")
            .bind(taxonomy.as_str())
            .bind(name)
            .bind(slug)
            .execute(&self.pool)
            .await
            .with_context(|| format!("insert {} {name}", taxonomy.as_str()))?;
        Ok(result.last_insert_rowid())
    }

    async fn set_post_terms(
        &self,
        post_id: PostId,
        taxonomy: Taxonomy,
        term_ids: &[TermId],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.context("begin term assignment")?;
        sqlx::query(
            "DELETE FROM term_relationships WHERE post_id = ? AND term_id IN (SELECT term_id FROM terms WHERE taxonomy = ?)",
        )
        .bind(post_id)
        .bind(taxonomy.as_str())
        .execute(&mut *tx)
        .await
        .with_context(|| format!("clear {} of post {post_id}", taxonomy.as_str()))?;

        for (order, term_id) in term_ids.iter().enumerate() {
            sqlx::query(
                "INSERT OR IGNORE INTO term_relationships(post_id, term_id, term_order) VALUES (?, ?, ?)",
            )
            .bind(post_id)
            .bind(term_id)
            .bind(order as i64)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("assign term {term_id} to post {post_id}"))?;
        }

        tx.commit().await.context("commit term assignment")?;
        Ok(())
    }

    async fn post_term_names(&self, post_id: PostId, taxonomy: Taxonomy) -> Result<Vec<String>> {
        sqlx::query_scalar::<_, String>(
            "SELECT t.name FROM term_relationships r JOIN terms t ON t.term_id = r.term_id WHERE r.post_id = ? AND t.taxonomy = ? ORDER BY r.term_order ASC",
        )
        .bind(post_id)
        .bind(taxonomy.as_str())
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("query {} of post {post_id}", taxonomy.as_str()))
    }

    async fn insert_attachment(&self, attachment: &NewAttachment) -> Result<PostId> {
        let now = Utc::now().naive_utc().format(DATE_FORMAT).to_string();
        let mut tx = self.pool.begin().await.context("begin attachment insert")?;

        let result = sqlx::query(
            "INSERT INTO posts(post_type, post_title, post_content, post_excerpt, post_status, post_date, post_modified, post_parent, post_mime_type, guid) VALUES ('attachment', ?, ?, ?, 'inherit', ?, ?, ?, ?, ?)",
        )
        .bind(&attachment.title)
        .bind(&attachment.description)
        .bind(&attachment.caption)
        .bind(&now)
        .bind(&now)
        .bind(attachment.parent)
        .bind(&attachment.mime_type)
        .bind(&attachment.url)
        .execute(&mut *tx)
        .await
        .context("insert attachment")?;
        let attachment_id = result.last_insert_rowid();

        sqlx::query("INSERT INTO post_meta(post_id, meta_key, meta_value) VALUES (?, ?, ?)")
            .bind(attachment_id)
            .bind(ATTACHED_FILE_META_KEY)
            .bind(&attachment.file_path)
            .execute(&mut *tx)
            .await
            .context("insert attached file path")?;

        tx.commit().await.context("commit attachment insert")?;
        Ok(attachment_id)
    }

    async fn get_attachment(&self, attachment_id: PostId) -> Result<Option<AttachmentRecord>> {
        sqlx::query_as::<_, AttachmentRecord>(&format!("{ATTACHMENT_SELECT} AND p.post_id = ?"))
            .bind(attachment_id)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("query attachment {attachment_id}"))
    }

    async fn find_attachment_by_file_name(
        &self,
        file_name: &str,
    ) -> Result<Option<AttachmentRecord>> {
        sqlx::query_as::<_, AttachmentRecord>(&format!(
            "{ATTACHMENT_SELECT} AND f.meta_value LIKE '%' || ? || '%' ESCAPE '\\' ORDER BY p.post_id ASC LIMIT 1"
        ))
        .bind(escape_like(file_name))
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("query attachment by file name {file_name}"))
    }

    async fn attached_media(
        &self,
        post_id: PostId,
        mime_prefix: &str,
    ) -> Result<Vec<AttachmentRecord>> {
        sqlx::query_as::<_, AttachmentRecord>(&format!(
            "{ATTACHMENT_SELECT} AND p.post_parent = ? AND p.post_mime_type LIKE ? || '%' ESCAPE '\\' ORDER BY p.post_id ASC"
        ))
        .bind(post_id)
        .bind(escape_like(mime_prefix))
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("query media attached to post {post_id}"))
    }
}

fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn normalize_sqlite_uri(raw: &str) -> String {
    if raw.starts_with("sqlite:") {
        raw.to_string()
    } else {
        format!("sqlite://{raw}")
    }
}

#[cfg(test)]
mod tests {
    use super::{escape_like, normalize_sqlite_uri};

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("my_photo%.png"), "my\\_photo\\%.png");
    }

    #[test]
    fn bare_paths_get_sqlite_scheme() {
        assert_eq!(normalize_sqlite_uri("data/cs.db"), "sqlite://data/cs.db");
        assert_eq!(normalize_sqlite_uri("sqlite::memory:"), "sqlite::memory:");
    }
}
