use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use contentsync_contract::{decode_batch, AttachmentRef, CodecError, TransferRecord};
use contentsync_media::{AttachmentMode, AttachmentSyncer};
use contentsync_storage::{ContentRepository, NewPost, PostId, Taxonomy, TermId, DATE_FORMAT};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::rewrite::rewrite_urls;
use crate::sanitize::{sanitize_key, sanitize_post_content, sanitize_text_field, slugify};

const ZERO_DATE: &str = "0000-00-00 00:00:00";

#[derive(Debug, Error)]
pub enum ImportError {
    /// The batch failed structural validation; nothing was written.
    #[error("invalid data structure: {0}")]
    InvalidData(#[from] CodecError),
}

/// Outcome of one record. Failures here never fail the batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ItemReport {
    pub index: usize,
    pub title: String,
    pub post_id: Option<PostId>,
    pub featured_image_id: Option<PostId>,
    pub attachments_stored: usize,
    pub attachments_reused: usize,
    pub attachments_skipped: Vec<String>,
    pub categories_skipped: Vec<String>,
    pub tags_skipped: Vec<String>,
    pub meta_skipped: usize,
    pub error: Option<String>,
}

impl ItemReport {
    pub fn is_clean(&self) -> bool {
        self.post_id.is_some()
            && self.error.is_none()
            && self.attachments_skipped.is_empty()
            && self.categories_skipped.is_empty()
            && self.tags_skipped.is_empty()
            && self.meta_skipped == 0
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub batch_id: String,
    pub items: Vec<ItemReport>,
}

impl ImportReport {
    pub fn posts_created(&self) -> usize {
        self.items.iter().filter(|item| item.post_id.is_some()).count()
    }

    pub fn is_clean(&self) -> bool {
        self.items.iter().all(ItemReport::is_clean)
    }
}

/// Destination-side ingestion engine. Items are processed strictly in batch
/// order, attachments one at a time.
pub struct Importer {
    repository: Arc<dyn ContentRepository>,
    attachments: AttachmentSyncer,
}

impl Importer {
    pub fn new(repository: Arc<dyn ContentRepository>, attachments: AttachmentSyncer) -> Self {
        Self {
            repository,
            attachments,
        }
    }

    /// Validates the whole batch before touching the repository, then imports it.
    pub async fn import_batch(&self, raw: &[u8]) -> Result<ImportReport, ImportError> {
        let records = decode_batch(raw)?;
        Ok(self.import_records(&records).await)
    }

    pub async fn import_records(&self, records: &[TransferRecord]) -> ImportReport {
        let batch_id = Uuid::now_v7().to_string();
        info!(batch_id = %batch_id, items = records.len(), "importing batch");

        let mut items = Vec::with_capacity(records.len());
        for (index, record) in records.iter().enumerate() {
            items.push(self.import_item(index, record).await);
        }

        let report = ImportReport { batch_id, items };
        info!(
            batch_id = %report.batch_id,
            posts_created = report.posts_created(),
            clean = report.is_clean(),
            "batch imported"
        );
        report
    }

    async fn import_item(&self, index: usize, record: &TransferRecord) -> ItemReport {
        let mut report = ItemReport {
            index,
            title: record.post_title.clone(),
            ..ItemReport::default()
        };

        let content = sanitize_post_content(&record.post_content);
        let post_id = match self.create_post(record, &content).await {
            Ok(post_id) => post_id,
            Err(err) => {
                warn!(index, title = %record.post_title, error = %format!("{err:#}"), "post creation failed, skipping item");
                report.error = Some(format!("{err:#}"));
                return report;
            }
        };
        report.post_id = Some(post_id);
        info!(index, post_id, post_type = %record.post_type, "post created");

        report.categories_skipped = self
            .assign_terms(post_id, Taxonomy::Category, &record.post_categories)
            .await;
        report.tags_skipped = self
            .assign_terms(post_id, Taxonomy::PostTag, &record.post_tags)
            .await;
        report.meta_skipped = self.write_meta(post_id, record).await;

        let mut replacements = BTreeMap::new();

        if let Some(featured) = &record.featured_image {
            match self
                .attachments
                .sync(post_id, &clean_attachment(featured), AttachmentMode::Featured)
                .await
            {
                Ok(synced) => {
                    report.featured_image_id = Some(synced.attachment_id);
                    tally(&mut report, synced.reused);
                    replacements.insert(featured.url.clone(), synced.url);
                }
                Err(err) => {
                    warn!(post_id, url = %featured.url, error = %err, "featured image skipped");
                    report.attachments_skipped.push(featured.url.clone());
                }
            }
        }

        for attachment in &record.attachments {
            match self
                .attachments
                .sync(post_id, &clean_attachment(attachment), AttachmentMode::Normal)
                .await
            {
                Ok(synced) => {
                    tally(&mut report, synced.reused);
                    replacements.insert(attachment.url.clone(), synced.url);
                }
                Err(err) => {
                    warn!(post_id, url = %attachment.url, error = %err, "attachment skipped");
                    report.attachments_skipped.push(attachment.url.clone());
                }
            }
        }

        if !replacements.is_empty() {
            let rewritten = rewrite_urls(&content, &replacements);
            if rewritten != content {
                if let Err(err) = self.repository.update_post_content(post_id, &rewritten).await {
                    warn!(post_id, error = %format!("{err:#}"), "content rewrite could not be saved");
                    report.error = Some(format!("{err:#}"));
                }
            }
        }

        report
    }

    async fn create_post(&self, record: &TransferRecord, content: &str) -> Result<PostId> {
        let post = NewPost {
            post_type: sanitize_key(&record.post_type),
            title: sanitize_text_field(&record.post_title),
            content: content.to_string(),
            excerpt: sanitize_post_content(&record.post_excerpt),
            status: record.post_status.as_str().to_string(),
            date: parse_post_date(&record.post_date).context("invalid postDate")?,
            modified: parse_post_date(&record.post_modified).context("invalid postModified")?,
            parent: None,
        };
        self.repository.insert_post(&post).await
    }

    /// Categories are matched by slug, tags by exact name. Returns names that were skipped.
    async fn assign_terms(
        &self,
        post_id: PostId,
        taxonomy: Taxonomy,
        names: &[String],
    ) -> Vec<String> {
        if names.is_empty() {
            return Vec::new();
        }

        let mut term_ids: Vec<TermId> = Vec::with_capacity(names.len());
        let mut skipped = Vec::new();
        for raw in names {
            match self.resolve_term(taxonomy, &sanitize_text_field(raw)).await {
                Ok(term_id) => {
                    if !term_ids.contains(&term_id) {
                        term_ids.push(term_id);
                    }
                }
                Err(err) => {
                    warn!(post_id, taxonomy = taxonomy.as_str(), name = %raw, error = %format!("{err:#}"), "term skipped");
                    skipped.push(raw.clone());
                }
            }
        }

        if !term_ids.is_empty() {
            if let Err(err) = self
                .repository
                .set_post_terms(post_id, taxonomy, &term_ids)
                .await
            {
                warn!(post_id, taxonomy = taxonomy.as_str(), error = %format!("{err:#}"), "term assignment failed");
                return names.to_vec();
            }
        }
        skipped
    }

    async fn resolve_term(&self, taxonomy: Taxonomy, name: &str) -> Result<TermId> {
        let slug = slugify(name);
        let existing = match taxonomy {
            Taxonomy::Category => self.repository.find_term_by_slug(taxonomy, &slug).await?,
            Taxonomy::PostTag => self.repository.find_term_by_name(taxonomy, name).await?,
        };
        match existing {
            Some(term_id) => Ok(term_id),
            None => self.repository.insert_term(taxonomy, name, &slug).await,
        }
    }

    /// Appends every value of every key. Returns the number of failed writes.
    async fn write_meta(&self, post_id: PostId, record: &TransferRecord) -> usize {
        let mut failed = 0;
        for (raw_key, values) in &record.post_meta {
            let key = sanitize_text_field(raw_key);
            if key.is_empty() {
                failed += values.len();
                continue;
            }
            for value in values {
                if let Err(err) = self
                    .repository
                    .add_post_meta(post_id, &key, &sanitize_text_field(value))
                    .await
                {
                    warn!(post_id, key = %key, error = %format!("{err:#}"), "meta entry skipped");
                    failed += 1;
                }
            }
        }
        failed
    }
}

fn tally(report: &mut ItemReport, reused: bool) {
    if reused {
        report.attachments_reused += 1;
    } else {
        report.attachments_stored += 1;
    }
}

fn clean_attachment(attachment: &AttachmentRef) -> AttachmentRef {
    AttachmentRef {
        id: attachment.id,
        url: attachment.url.trim().to_string(),
        title: sanitize_text_field(&attachment.title),
        description: sanitize_post_content(&attachment.description),
        caption: sanitize_post_content(&attachment.caption),
        alt: sanitize_text_field(&attachment.alt),
    }
}

/// Accepts `YYYY-MM-DD HH:MM:SS` or RFC 3339. Empty and all-zero dates mean now.
pub fn parse_post_date(raw: &str) -> Result<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() || raw == ZERO_DATE {
        return Ok(Utc::now().naive_utc());
    }
    if let Ok(date) = NaiveDateTime::parse_from_str(raw, DATE_FORMAT) {
        return Ok(date);
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|date| date.naive_local())
        .with_context(|| format!("unrecognised date `{raw}`"))
}

#[cfg(test)]
mod tests {
    use super::parse_post_date;

    #[test]
    fn host_and_rfc3339_dates_parse() {
        let host = parse_post_date("2024-05-01 10:00:00").expect("host format");
        let rfc = parse_post_date("2024-05-01T10:00:00+02:00").expect("rfc3339");
        assert_eq!(host, rfc);
    }

    #[test]
    fn garbage_dates_fail() {
        assert!(parse_post_date("yesterday").is_err());
    }

    #[test]
    fn zero_dates_mean_now() {
        assert!(parse_post_date("0000-00-00 00:00:00").is_ok());
        assert!(parse_post_date("").is_ok());
    }
}
