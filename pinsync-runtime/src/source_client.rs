use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::types::{Item, Language, Locale};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::SourceError;

/// A README as served upstream. `found == false` means the file does not
/// exist for the requested locale; `content` is then empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub content: String,
    pub found: bool,
}

impl Document {
    pub fn found(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            found: true,
        }
    }

    pub fn missing() -> Self {
        Self {
            content: String::new(),
            found: false,
        }
    }
}

#[async_trait]
pub trait SourceClient: Send + Sync {
    /// All pinned items, in pin order.
    async fn list_pinned_items(&self) -> Result<Vec<Item>, SourceError>;

    async fn fetch_document(&self, item_key: &str, locale: &Locale)
        -> Result<Document, SourceError>;
}

const PINNED_ITEMS_QUERY: &str = r#"
query PinnedItems($login: String!) {
  user(login: $login) {
    pinnedItems(first: 6, types: REPOSITORY) {
      totalCount
      nodes {
        ... on Repository {
          name
          stargazerCount
          homepageUrl
          url
          licenseInfo { name }
          releases(first: 100) {
            nodes {
              releaseAssets(first: 100) {
                nodes { downloadCount }
              }
            }
          }
          languages(first: 10, orderBy: { field: SIZE, direction: DESC }) {
            totalSize
            edges {
              size
              node { name color }
            }
          }
        }
      }
    }
  }
}
"#;

#[derive(Serialize, Debug)]
struct GraphqlRequest<'a> {
    query: &'a str,
    variables: PinnedVariables<'a>,
}

#[derive(Serialize, Debug)]
struct PinnedVariables<'a> {
    login: &'a str,
}

#[derive(Deserialize, Debug)]
struct GraphqlResponse {
    data: Option<PinnedData>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Deserialize, Debug)]
struct GraphqlError {
    message: String,
}

#[derive(Deserialize, Debug)]
struct PinnedData {
    user: Option<UserNode>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct UserNode {
    pinned_items: PinnedItems,
}

#[derive(Deserialize, Debug)]
struct PinnedItems {
    #[serde(default)]
    nodes: Vec<RepositoryNode>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct RepositoryNode {
    name: String,
    stargazer_count: u32,
    homepage_url: Option<String>,
    url: String,
    license_info: Option<LicenseInfo>,
    releases: Connection<ReleaseNode>,
    languages: LanguageConnection,
}

#[derive(Deserialize, Debug)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct Connection<T> {
    #[serde(default)]
    nodes: Vec<T>,
}

#[derive(Deserialize, Debug)]
struct LicenseInfo {
    name: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ReleaseNode {
    release_assets: Connection<AssetNode>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct AssetNode {
    download_count: u64,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct LanguageConnection {
    total_size: u64,
    #[serde(default)]
    edges: Vec<LanguageEdge>,
}

#[derive(Deserialize, Debug)]
struct LanguageEdge {
    size: u64,
    node: LanguageNode,
}

#[derive(Deserialize, Debug)]
struct LanguageNode {
    name: String,
    color: Option<String>,
}

impl GraphqlResponse {
    fn into_items(self) -> Result<Vec<Item>, SourceError> {
        if !self.errors.is_empty() {
            let messages: Vec<_> = self.errors.into_iter().map(|e| e.message).collect();
            return Err(SourceError::Upstream(messages.join("; ")));
        }

        let user = self
            .data
            .and_then(|d| d.user)
            .ok_or_else(|| SourceError::Upstream("response carries no user".into()))?;

        Ok(user
            .pinned_items
            .nodes
            .into_iter()
            .map(RepositoryNode::into_item)
            .collect())
    }
}

impl RepositoryNode {
    fn into_item(self) -> Item {
        let downloads: u64 = self
            .releases
            .nodes
            .iter()
            .flat_map(|release| release.release_assets.nodes.iter())
            .map(|asset| asset.download_count)
            .sum();

        let total_size = self.languages.total_size;
        let languages = self
            .languages
            .edges
            .into_iter()
            .map(|edge| Language {
                name: edge.node.name,
                color: edge.node.color,
                ratio: if total_size == 0 {
                    0.0
                } else {
                    edge.size as f32 / total_size as f32
                },
            })
            .collect();

        Item {
            title: self.name,
            star_count: self.stargazer_count,
            homepage_url: self.homepage_url.filter(|u| !u.trim().is_empty()),
            repo_url: self.url,
            license: self.license_info.map(|l| l.name),
            download_count: (downloads > 0).then_some(downloads),
            languages,
        }
    }
}

/// GitHub GraphQL for the pinned list, raw.githubusercontent for READMEs.
#[derive(Clone, Debug)]
pub struct GithubClient {
    api_url: Url,
    raw_url: Url,
    login: String,
    branch: String,
    token: Arc<SecretString>,
    client: Client,
}

impl GithubClient {
    pub fn new(
        api_url: Url,
        raw_url: Url,
        login: impl Into<String>,
        token: SecretString,
        timeout: Duration,
    ) -> reqwest::Result<Self> {
        Ok(Self {
            api_url,
            raw_url,
            login: login.into(),
            branch: "master".to_string(),
            token: Arc::new(token),
            client: Client::builder()
                .timeout(timeout)
                .user_agent(concat!("pinsync/", env!("CARGO_PKG_VERSION")))
                .build()?,
        })
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    pub fn document_url(&self, item_key: &str, locale: &Locale) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            self.raw_url.as_str().trim_end_matches('/'),
            self.login,
            item_key,
            self.branch,
            locale.document_name()
        )
    }

    fn graphql_url(&self) -> String {
        format!("{}/graphql", self.api_url.as_str().trim_end_matches('/'))
    }
}

#[async_trait]
impl SourceClient for GithubClient {
    async fn list_pinned_items(&self) -> Result<Vec<Item>, SourceError> {
        let url = self.graphql_url();
        let req = GraphqlRequest {
            query: PINNED_ITEMS_QUERY,
            variables: PinnedVariables { login: &self.login },
        };

        tracing::debug!(login = %self.login, "Requesting pinned items from {}", url);

        let res = self
            .client
            .post(&url)
            .bearer_auth(self.token.expose_secret())
            .json(&req)
            .send()
            .await
            .map_err(|source| SourceError::Transport {
                url: url.clone(),
                source,
            })?;

        if !res.status().is_success() {
            return Err(SourceError::Status {
                url,
                status: res.status().as_u16(),
            });
        }

        let body = res
            .json::<GraphqlResponse>()
            .await
            .map_err(|e| SourceError::Decode {
                url: url.clone(),
                message: e.to_string(),
            })?;

        body.into_items()
    }

    async fn fetch_document(
        &self,
        item_key: &str,
        locale: &Locale,
    ) -> Result<Document, SourceError> {
        let url = self.document_url(item_key, locale);
        tracing::debug!(title = item_key, locale = %locale, "Fetching {}", url);

        let res = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| SourceError::Transport {
                url: url.clone(),
                source,
            })?;

        match res.status() {
            StatusCode::NOT_FOUND => Ok(Document::missing()),
            status if status.is_success() => {
                let content = res.text().await.map_err(|e| SourceError::Decode {
                    url: url.clone(),
                    message: e.to_string(),
                })?;
                Ok(Document::found(content))
            }
            status => Err(SourceError::Status {
                url,
                status: status.as_u16(),
            }),
        }
    }
}
