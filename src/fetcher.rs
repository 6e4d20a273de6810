// src/fetcher.rs
//
// Module fetcher: retrieves the raw bytes of a named binary module from a
// byte-source endpoint. One network round trip per call.
//
// Any non-success response or transport-level error is a *soft* failure:
// it is reported to the caller as a FetchError, and under the default fetch
// policy the pipeline simply proceeds without that module. Some modules
// legitimately do not exist at the expected location (for example modules
// merged into the host's own binary), and the backend will raise a genuine
// unresolved-symbol diagnostic only if the omission actually matters.

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::error::FetchError;
use crate::resolver::ModuleName;

/// Default relative path template, matching the reference deployment where
/// modules sit next to the application under `_framework/`.
pub const DEFAULT_PATH_TEMPLATE: &str = "_framework/{module}.dll";

/// Byte-source transport. One call is one round trip.
#[async_trait]
pub trait ModuleFetcher: Send + Sync {
    async fn fetch(&self, name: &ModuleName) -> Result<Vec<u8>, FetchError>;
}

/// Fetches module bytes with HTTP GET from a fixed base URL.
pub struct HttpModuleFetcher {
    client: Client,
    base_url: String,
    path_template: String,
}

impl HttpModuleFetcher {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_template(base_url, DEFAULT_PATH_TEMPLATE)
    }

    pub fn with_template(base_url: impl Into<String>, path_template: impl Into<String>) -> Self {
        HttpModuleFetcher {
            client: Client::new(),
            base_url: base_url.into(),
            path_template: path_template.into(),
        }
    }

    /// Expand the path template for a module and join it onto the base URL.
    fn url_for(&self, name: &ModuleName) -> String {
        let path = self.path_template.replace("{module}", name.as_str());
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl ModuleFetcher for HttpModuleFetcher {
    async fn fetch(&self, name: &ModuleName) -> Result<Vec<u8>, FetchError> {
        let url = self.url_for(name);
        debug!(module = %name, %url, "fetching module bytes");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| FetchError::Http {
                module: name.to_string(),
                source,
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::Missing {
                module: name.to_string(),
            });
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                module: name.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await.map_err(|source| FetchError::Http {
            module: name.to_string(),
            source,
        })?;

        Ok(bytes.to_vec())
    }
}

/// Fetcher for deployments with no byte-source endpoint configured. Every
/// module is reported missing; under the soft policy compilation still runs
/// with whatever references the caller supplied inline.
pub struct OfflineFetcher;

#[async_trait]
impl ModuleFetcher for OfflineFetcher {
    async fn fetch(&self, name: &ModuleName) -> Result<Vec<u8>, FetchError> {
        Err(FetchError::Missing {
            module: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_template_substitutes_module_name() {
        let fetcher = HttpModuleFetcher::new("http://localhost:5000/");
        let url = fetcher.url_for(&ModuleName::new("calc.core"));
        assert_eq!(url, "http://localhost:5000/_framework/calc.core.dll");
    }

    #[test]
    fn custom_template_is_respected() {
        let fetcher = HttpModuleFetcher::with_template("http://host", "modules/{module}.bin");
        let url = fetcher.url_for(&ModuleName::new("util"));
        assert_eq!(url, "http://host/modules/util.bin");
    }

    #[tokio::test]
    async fn offline_fetcher_reports_every_module_missing() {
        let err = OfflineFetcher
            .fetch(&ModuleName::new("anything"))
            .await
            .unwrap_err();
        assert_eq!(err.module(), "anything");
    }
}
