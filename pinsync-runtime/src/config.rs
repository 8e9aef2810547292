use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use url::Url;

use crate::source_client::GithubClient;
use crate::store_client::StrapiClient;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug)]
pub struct Config {
    pub github_token: SecretString,
    pub github_login: String,
    pub github_api_url: Url,
    pub github_raw_url: Url,
    pub readme_branch: String,
    pub strapi_token: SecretString,
    pub strapi_api_url: Url,
    pub sync_interval: Duration,
    pub http_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &'static str| lookup(name).filter(|v| !v.trim().is_empty());
        let required = |name: &'static str| get(name).ok_or(ConfigError::Missing(name));

        Ok(Self {
            github_token: SecretString::from(required("GITHUB_TOKEN")?),
            github_login: required("GITHUB_LOGIN")?,
            github_api_url: parse_url(
                "GITHUB_API_URL",
                get("GITHUB_API_URL").unwrap_or_else(|| "https://api.github.com".into()),
            )?,
            github_raw_url: parse_url(
                "GITHUB_RAW_URL",
                get("GITHUB_RAW_URL")
                    .unwrap_or_else(|| "https://raw.githubusercontent.com".into()),
            )?,
            readme_branch: get("README_BRANCH").unwrap_or_else(|| "master".into()),
            strapi_token: SecretString::from(required("STRAPI_TOKEN")?),
            strapi_api_url: parse_url("STRAPI_API_URL", required("STRAPI_API_URL")?)?,
            sync_interval: parse_secs("SYNC_INTERVAL", get("SYNC_INTERVAL"), 600)?,
            http_timeout: parse_secs("HTTP_TIMEOUT_SECS", get("HTTP_TIMEOUT_SECS"), 20)?,
        })
    }

    pub fn github_client(&self) -> reqwest::Result<GithubClient> {
        Ok(GithubClient::new(
            self.github_api_url.clone(),
            self.github_raw_url.clone(),
            self.github_login.clone(),
            SecretString::from(self.github_token.expose_secret().to_string()),
            self.http_timeout,
        )?
        .with_branch(self.readme_branch.clone()))
    }

    pub fn strapi_client(&self) -> reqwest::Result<StrapiClient> {
        StrapiClient::new(
            self.strapi_api_url.clone(),
            SecretString::from(self.strapi_token.expose_secret().to_string()),
            self.http_timeout,
        )
    }
}

fn parse_url(name: &'static str, value: String) -> Result<Url, ConfigError> {
    let url = Url::parse(&value).map_err(|e| ConfigError::Invalid {
        name,
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::Invalid {
            name,
            reason: format!("unsupported scheme '{}', expected http or https", other),
        }),
    }
}

fn parse_secs(
    name: &'static str,
    value: Option<String>,
    default: u64,
) -> Result<Duration, ConfigError> {
    let secs = match value {
        Some(v) => v.trim().parse::<u64>().map_err(|e| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        })?,
        None => default,
    };
    if secs == 0 {
        return Err(ConfigError::Invalid {
            name,
            reason: "must be greater than zero".into(),
        });
    }
    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn minimal() -> HashMap<String, String> {
        vars(&[
            ("GITHUB_TOKEN", "gh"),
            ("GITHUB_LOGIN", "octo"),
            ("STRAPI_TOKEN", "st"),
            ("STRAPI_API_URL", "https://cms.example.org/api"),
        ])
    }

    #[test]
    fn applies_defaults() {
        let env = minimal();
        let config = Config::from_lookup(|k| env.get(k).cloned()).unwrap();

        assert_eq!(config.github_login, "octo");
        assert_eq!(config.github_api_url.as_str(), "https://api.github.com/");
        assert_eq!(config.readme_branch, "master");
        assert_eq!(config.sync_interval, Duration::from_secs(600));
        assert_eq!(config.http_timeout, Duration::from_secs(20));
        assert_eq!(config.strapi_token.expose_secret(), "st");
    }

    #[test]
    fn missing_token_is_reported_by_name() {
        let mut env = minimal();
        env.remove("STRAPI_TOKEN");
        let err = Config::from_lookup(|k| env.get(k).cloned()).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("STRAPI_TOKEN")));
    }

    #[test]
    fn rejects_non_http_urls_and_bad_numbers() {
        let mut env = minimal();
        env.insert("STRAPI_API_URL".into(), "ftp://cms.example.org".into());
        assert!(matches!(
            Config::from_lookup(|k| env.get(k).cloned()),
            Err(ConfigError::Invalid { name: "STRAPI_API_URL", .. })
        ));

        let mut env = minimal();
        env.insert("SYNC_INTERVAL".into(), "ten".into());
        assert!(matches!(
            Config::from_lookup(|k| env.get(k).cloned()),
            Err(ConfigError::Invalid { name: "SYNC_INTERVAL", .. })
        ));

        let mut env = minimal();
        env.insert("HTTP_TIMEOUT_SECS".into(), "0".into());
        assert!(Config::from_lookup(|k| env.get(k).cloned()).is_err());
    }
}
