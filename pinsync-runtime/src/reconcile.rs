//! One reconciliation run: fetch pinned items, drop stale store records,
//! then upsert every item once per locale.
//!
//! Runs are strictly sequential against the store. Document fetch and
//! extraction for the locales of a single item run concurrently since they
//! only read upstream.

use std::collections::{HashMap, HashSet};

use common::types::{Item, Locale, LocalizedRecord, StoredRecord, SUPPORTED_LOCALES};
use futures_util::future::join_all;

use crate::error::{ExtractionError, SourceError, StoreError, SyncError};
use crate::extract::PatternExtractor;
use crate::job::{JobContext, Severity};
use crate::source_client::SourceClient;
use crate::store_client::StoreClient;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub items: usize,
    pub deleted: usize,
    pub created: usize,
    pub updated: usize,
    pub failed: usize,
    pub skipped: usize,
    pub cancelled: bool,
}

/// Where the README behind a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocumentOrigin {
    Exact,
    Fallback,
    Missing,
}

struct PreparedRecord {
    record: LocalizedRecord,
    origin: DocumentOrigin,
    extraction: Option<ExtractionError>,
}

/// Per-locale snapshot of the store taken before any upsert.
/// Locales whose listing failed have no entry.
struct ListingCache {
    ids: HashMap<&'static str, HashMap<String, u64>>,
}

impl ListingCache {
    fn new() -> Self {
        Self {
            ids: HashMap::new(),
        }
    }

    fn insert(&mut self, locale: &Locale, records: &[StoredRecord]) {
        let by_title = self.ids.entry(locale.code).or_default();
        for record in records {
            // First record in listing order wins for duplicated titles.
            by_title.entry(record.title.clone()).or_insert(record.id);
        }
    }

    fn has_locale(&self, locale: &Locale) -> bool {
        self.ids.contains_key(locale.code)
    }

    fn existing_id(&self, locale: &Locale, title: &str) -> Option<u64> {
        self.ids.get(locale.code)?.get(title).copied()
    }
}

/// Progress after `processed` of `total` items, floored, 100 on the last.
pub fn progress_percent(processed: usize, total: usize) -> u8 {
    if total == 0 || processed >= total {
        return 100;
    }
    (processed * 100 / total) as u8
}

/// Records whose identity key is not among `items`, in listing order.
pub fn stale_records<'r>(items: &[Item], stored: &'r [StoredRecord]) -> Vec<&'r StoredRecord> {
    let keys: HashSet<&str> = items.iter().map(|i| i.title.as_str()).collect();
    stored
        .iter()
        .filter(|record| !keys.contains(record.title.as_str()))
        .collect()
}

pub struct Reconciler<'a> {
    source: &'a dyn SourceClient,
    store: &'a dyn StoreClient,
    extractor: PatternExtractor,
    locales: Vec<Locale>,
}

impl<'a> Reconciler<'a> {
    pub fn new(source: &'a dyn SourceClient, store: &'a dyn StoreClient) -> Self {
        Self {
            source,
            store,
            extractor: PatternExtractor::new(),
            locales: SUPPORTED_LOCALES.to_vec(),
        }
    }

    pub fn with_locales(mut self, locales: &[Locale]) -> Self {
        self.locales = locales.to_vec();
        self
    }

    pub async fn run(&self, ctx: &dyn JobContext) -> Result<RunSummary, SyncError> {
        let mut summary = RunSummary::default();

        ctx.write_line("Requesting pinned repositories from GitHub");
        let items = match self.source.list_pinned_items().await {
            Ok(items) => items,
            Err(e) => {
                tracing::error!(op = "list_pinned_items", error = %e, "Source fetch failed");
                with_severity(
                    ctx,
                    Severity::Error,
                    &format!("Fetching pinned items failed: {}", e),
                );
                return Err(SyncError::Fetch(e));
            }
        };
        summary.items = items.len();

        let cache = self.delete_stale(ctx, &items, &mut summary).await;

        ctx.write_line(&format!("Processing {} repositories in total", items.len()));

        for (index, item) in items.iter().enumerate() {
            if ctx.is_cancelled() {
                summary.cancelled = true;
                with_severity(
                    ctx,
                    Severity::Warning,
                    &format!("Cancelled before processing {}", item.title),
                );
                break;
            }

            ctx.write_line(&format!("Processing {}", item.title));
            self.sync_item(ctx, item, &cache, &mut summary).await;
            ctx.report_progress(progress_percent(index + 1, items.len()));
        }

        if items.is_empty() {
            ctx.report_progress(100);
        }

        ctx.write_line(&format!(
            "Finished: {} created, {} updated, {} deleted, {} failed, {} skipped",
            summary.created, summary.updated, summary.deleted, summary.failed, summary.skipped
        ));

        Ok(summary)
    }

    /// Lists every locale once, deletes records whose key is no longer
    /// pinned and returns the listing for the upsert phase.
    async fn delete_stale(
        &self,
        ctx: &dyn JobContext,
        items: &[Item],
        summary: &mut RunSummary,
    ) -> ListingCache {
        let mut cache = ListingCache::new();
        let mut stale: Vec<StoredRecord> = Vec::new();

        for locale in &self.locales {
            match self.store.list_records(locale).await {
                Ok(records) => {
                    stale.extend(stale_records(items, &records).into_iter().cloned());
                    cache.insert(locale, &records);
                }
                Err(e) => {
                    summary.failed += 1;
                    report_store_failure(ctx, "list", None, Some(locale.code), &e);
                    with_severity(
                        ctx,
                        Severity::Warning,
                        &format!("Skipping {} locale for this run", locale),
                    );
                }
            }
        }

        if stale.is_empty() {
            return cache;
        }

        ctx.write_line(&format!(
            "Deleting {} entries from CMS that are no longer pinned",
            stale.len()
        ));

        for record in &stale {
            with_severity(
                ctx,
                Severity::Warning,
                &format!(
                    "    Deleting {} ({}) with id {}",
                    record.title, record.locale, record.id
                ),
            );

            match self.store.delete(record.id).await {
                Ok(()) => summary.deleted += 1,
                Err(e) => {
                    summary.failed += 1;
                    report_store_failure(
                        ctx,
                        "delete",
                        Some(&record.title),
                        Some(&record.locale),
                        &e,
                    );
                }
            }
        }

        cache
    }

    async fn sync_item(
        &self,
        ctx: &dyn JobContext,
        item: &Item,
        cache: &ListingCache,
        summary: &mut RunSummary,
    ) {
        let locales: Vec<Locale> = self
            .locales
            .iter()
            .copied()
            .filter(|locale| cache.has_locale(locale))
            .collect();
        summary.skipped += self.locales.len() - locales.len();

        let prepared = join_all(locales.iter().map(|locale| self.prepare(item, locale))).await;

        for (locale, outcome) in locales.iter().zip(prepared) {
            let prepared = match outcome {
                Ok(prepared) => prepared,
                Err(e) => {
                    summary.failed += 1;
                    tracing::warn!(
                        title = %item.title,
                        locale = %locale,
                        op = "fetch_document",
                        error = %e,
                        "README fetch failed"
                    );
                    with_severity(
                        ctx,
                        Severity::Error,
                        &format!("    Fetching README for {} locale failed: {}", locale, e),
                    );
                    continue;
                }
            };

            self.report_document(ctx, item, locale, &prepared);

            let existing_id = cache.existing_id(locale, &item.title);
            with_severity(
                ctx,
                Severity::Notice,
                &format!(
                    "    {} CMS entry with {} locale",
                    if existing_id.is_some() { "Updating" } else { "Inserting" },
                    locale
                ),
            );

            match self.store.upsert(&prepared.record, existing_id).await {
                Ok(stored) => {
                    tracing::debug!(
                        title = %item.title,
                        locale = %locale,
                        id = stored.id,
                        "Upserted"
                    );
                    if existing_id.is_some() {
                        summary.updated += 1;
                    } else {
                        summary.created += 1;
                    }
                }
                Err(e) => {
                    summary.failed += 1;
                    report_store_failure(ctx, "upsert", Some(&item.title), Some(locale.code), &e);
                }
            }
        }
    }

    async fn prepare(&self, item: &Item, locale: &Locale) -> Result<PreparedRecord, SourceError> {
        let mut record = LocalizedRecord::new(item, locale);

        let exact = self.source.fetch_document(&item.title, locale).await?;
        let (content, origin) = if exact.found {
            record.readme_body = Some(exact.content.clone());
            (exact.content, DocumentOrigin::Exact)
        } else if locale.is_default() {
            (String::new(), DocumentOrigin::Missing)
        } else {
            let fallback = self
                .source
                .fetch_document(&item.title, &Locale::DEFAULT)
                .await?;
            if fallback.found {
                (fallback.content, DocumentOrigin::Fallback)
            } else {
                (String::new(), DocumentOrigin::Missing)
            }
        };

        let extraction = if origin == DocumentOrigin::Missing {
            None
        } else {
            match self.extractor.extract(&content) {
                Ok(extracted) => {
                    record.image_url = Some(extracted.image_url);
                    record.description = Some(extracted.description);
                    None
                }
                Err(e) => Some(e),
            }
        };

        Ok(PreparedRecord {
            record,
            origin,
            extraction,
        })
    }

    fn report_document(
        &self,
        ctx: &dyn JobContext,
        item: &Item,
        locale: &Locale,
        prepared: &PreparedRecord,
    ) {
        match prepared.origin {
            DocumentOrigin::Exact => {}
            DocumentOrigin::Fallback => ctx.write_line(&format!(
                "    No {} for {} locale, using {}",
                locale.document_name(),
                locale,
                Locale::DEFAULT.document_name()
            )),
            DocumentOrigin::Missing => with_severity(
                ctx,
                Severity::Warning,
                &format!("    No README found for {} locale", locale),
            ),
        }

        if let Some(e) = &prepared.extraction {
            tracing::warn!(
                title = %item.title,
                locale = %locale,
                op = "extract",
                error = %e,
                "README has no description block"
            );
            with_severity(
                ctx,
                Severity::Warning,
                &format!("    Could not extract image and description: {}", e),
            );
        }
    }
}

fn with_severity(ctx: &dyn JobContext, severity: Severity, text: &str) {
    ctx.set_severity(severity);
    ctx.write_line(text);
    ctx.set_severity(Severity::Info);
}

fn report_store_failure(
    ctx: &dyn JobContext,
    op: &str,
    title: Option<&str>,
    locale: Option<&str>,
    error: &StoreError,
) {
    let title = title.unwrap_or("-");
    let locale = locale.unwrap_or("-");

    let line = match error {
        StoreError::Unavailable(_) => {
            tracing::warn!(title, locale, op, error = %error, "Store unavailable");
            format!("    Request failed ({} {} [{}]): {}", op, title, locale, error)
        }
        StoreError::Rejected { status, .. } => {
            tracing::error!(title, locale, op, status, error = %error, "Store rejected request");
            format!(
                "    Request rejected with {} ({} {} [{}]): {}",
                status, op, title, locale, error
            )
        }
    };

    with_severity(ctx, Severity::Error, &line);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(title: &str) -> Item {
        Item {
            title: title.into(),
            star_count: 0,
            homepage_url: None,
            repo_url: format!("https://github.com/octo/{}", title),
            license: None,
            download_count: None,
            languages: vec![],
        }
    }

    fn stored(id: u64, title: &str, locale: &str) -> StoredRecord {
        StoredRecord {
            id,
            title: title.into(),
            locale: locale.into(),
        }
    }

    #[test]
    fn progress_is_floored_and_ends_at_hundred() {
        let values: Vec<_> = (1..=3).map(|n| progress_percent(n, 3)).collect();
        assert_eq!(values, [33, 66, 100]);
        assert_eq!(progress_percent(6, 7), 85);
        assert_eq!(progress_percent(0, 0), 100);
    }

    #[test]
    fn stale_records_are_those_missing_upstream() {
        let items = [item("A"), item("B")];
        let records = [stored(1, "A", "en"), stored(2, "C", "en"), stored(3, "C", "cs")];
        let stale: Vec<_> = stale_records(&items, &records).iter().map(|r| r.id).collect();
        assert_eq!(stale, [2, 3]);
    }

    #[test]
    fn cache_keeps_first_duplicate() {
        let mut cache = ListingCache::new();
        cache.insert(&Locale::EN, &[stored(5, "A", "en"), stored(8, "A", "en")]);
        assert_eq!(cache.existing_id(&Locale::EN, "A"), Some(5));
        assert_eq!(cache.existing_id(&Locale::EN, "B"), None);
        assert!(!cache.has_locale(&Locale::CS));
        assert_eq!(cache.existing_id(&Locale::CS, "A"), None);
    }
}
