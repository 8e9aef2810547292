use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::types::{Locale, LocalizedRecord, StoredRecord};
use reqwest::{Client, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::StoreError;

#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Every record the store holds for `locale`.
    async fn list_records(&self, locale: &Locale) -> Result<Vec<StoredRecord>, StoreError>;

    /// Creates the record when `existing_id` is `None`, otherwise updates it.
    async fn upsert(
        &self,
        record: &LocalizedRecord,
        existing_id: Option<u64>,
    ) -> Result<StoredRecord, StoreError>;

    /// Deleting an id the store no longer has is not an error.
    async fn delete(&self, id: u64) -> Result<(), StoreError>;
}

#[derive(Serialize, Debug)]
struct DataBody<'a> {
    data: &'a LocalizedRecord,
}

#[derive(Deserialize, Debug)]
struct Envelope<T> {
    data: T,
    #[serde(default)]
    meta: Option<ListMeta>,
}

#[derive(Deserialize, Debug)]
struct ListMeta {
    pagination: Option<Pagination>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Pagination {
    page_count: u32,
}

#[derive(Deserialize, Debug)]
struct Entry {
    id: u64,
    attributes: EntryAttributes,
}

#[derive(Deserialize, Debug)]
struct EntryAttributes {
    title: String,
    #[serde(default)]
    locale: Option<String>,
}

impl Entry {
    fn into_stored(self, fallback_locale: &str) -> StoredRecord {
        StoredRecord {
            id: self.id,
            title: self.attributes.title,
            locale: self
                .attributes
                .locale
                .unwrap_or_else(|| fallback_locale.to_string()),
        }
    }
}

/// Maps a non-success status to the store error taxonomy.
pub fn classify_status(status: StatusCode, body: String) -> StoreError {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        StoreError::Unavailable(format!("status {}: {}", status.as_u16(), body))
    } else {
        StoreError::Rejected {
            status: status.as_u16(),
            body,
        }
    }
}

fn unavailable(e: reqwest::Error) -> StoreError {
    if e.is_timeout() {
        StoreError::Unavailable(format!("timed out: {}", e))
    } else {
        StoreError::Unavailable(e.to_string())
    }
}

async fn check(res: Response) -> Result<Response, StoreError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.text().await.unwrap_or_default();
    Err(classify_status(status, body))
}

/// Strapi v4 REST client for the `projects` collection.
#[derive(Clone, Debug)]
pub struct StrapiClient {
    base_url: Url,
    token: Arc<SecretString>,
    client: Client,
    page_size: u32,
}

impl StrapiClient {
    pub fn new(base_url: Url, token: SecretString, timeout: Duration) -> reqwest::Result<Self> {
        Ok(Self {
            base_url,
            token: Arc::new(token),
            client: Client::builder().timeout(timeout).build()?,
            page_size: 100,
        })
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn projects_url(&self) -> String {
        format!("{}/projects", self.base_url.as_str().trim_end_matches('/'))
    }
}

#[async_trait]
impl StoreClient for StrapiClient {
    async fn list_records(&self, locale: &Locale) -> Result<Vec<StoredRecord>, StoreError> {
        let url = self.projects_url();
        let mut records = Vec::new();
        let mut page: u32 = 1;

        loop {
            tracing::debug!(locale = %locale, page, "Listing store records");

            let res = self
                .client
                .get(&url)
                .bearer_auth(self.token.expose_secret())
                .query(&[
                    ("locale", locale.code.to_string()),
                    ("pagination[page]", page.to_string()),
                    ("pagination[pageSize]", self.page_size.to_string()),
                ])
                .send()
                .await
                .map_err(unavailable)?;

            let envelope = check(res)
                .await?
                .json::<Envelope<Vec<Entry>>>()
                .await
                .map_err(|e| StoreError::Unavailable(format!("undecodable listing: {}", e)))?;

            records.extend(
                envelope
                    .data
                    .into_iter()
                    .map(|entry| entry.into_stored(locale.code)),
            );

            let page_count = envelope
                .meta
                .and_then(|m| m.pagination)
                .map_or(page, |p| p.page_count);
            if page >= page_count {
                break;
            }
            page += 1;
        }

        Ok(records)
    }

    async fn upsert(
        &self,
        record: &LocalizedRecord,
        existing_id: Option<u64>,
    ) -> Result<StoredRecord, StoreError> {
        let body = DataBody { data: record };

        let req = match existing_id {
            Some(id) => self.client.put(format!("{}/{}", self.projects_url(), id)),
            None => self.client.post(self.projects_url()),
        };

        tracing::debug!(
            title = %record.title,
            locale = %record.locale,
            existing_id,
            "Writing store record"
        );
        tracing::trace!(
            "Store payload:\n{}",
            serde_json::to_string_pretty(&body).unwrap_or_default()
        );

        let res = req
            .bearer_auth(self.token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(unavailable)?;

        let envelope = check(res)
            .await?
            .json::<Envelope<Entry>>()
            .await
            .map_err(|e| StoreError::Unavailable(format!("undecodable write response: {}", e)))?;

        Ok(envelope.data.into_stored(&record.locale))
    }

    async fn delete(&self, id: u64) -> Result<(), StoreError> {
        let res = self
            .client
            .delete(format!("{}/{}", self.projects_url(), id))
            .bearer_auth(self.token.expose_secret())
            .send()
            .await
            .map_err(unavailable)?;

        if res.status() == StatusCode::NOT_FOUND {
            tracing::debug!(id, "Store record already gone");
            return Ok(());
        }

        check(res).await?;
        Ok(())
    }
}
