//! HTTP registry client with retry logic

use crate::models::{PackagePayload, RecipeRevisionPayload};
use crate::Registry;
use async_trait::async_trait;
use dop_errors::{Error, RegistryError};
use dop_types::Version;
use futures::StreamExt;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::time::Duration;

/// Network client configuration
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub base_url: String,
    pub connect_timeout: Duration,
    pub timeout: Duration,
    pub retry_delay: Duration,
    pub user_agent: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            base_url: crate::registry_url(),
            connect_timeout: Duration::from_secs(30),
            // archives can be large; allow a long body transfer
            timeout: Duration::from_secs(600),
            retry_delay: Duration::from_secs(1),
            user_agent: format!("dop/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// What a 404 on an endpoint means
#[derive(Clone)]
enum NotFound {
    Package { name: String },
    Version { name: String, version: String },
    Revision {
        name: String,
        version: String,
        revision: String,
    },
    Archive { name: String },
}

impl NotFound {
    fn into_error(self) -> RegistryError {
        match self {
            Self::Package { name } => RegistryError::NoSuchPackage { name },
            Self::Version { name, version } => RegistryError::NoSuchVersion { name, version },
            Self::Revision {
                name,
                version,
                revision,
            } => RegistryError::NoSuchRevision {
                name,
                version,
                revision,
            },
            Self::Archive { name } => RegistryError::NoSuchPackage { name },
        }
    }
}

/// Registry client over HTTP
#[derive(Debug, Clone)]
pub struct HttpRegistry {
    client: Client,
    config: RegistryConfig,
}

impl HttpRegistry {
    /// Create a client
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be initialized.
    pub fn new(config: RegistryConfig) -> Result<Self, Error> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| RegistryError::ServerDown {
                host: config.base_url.clone(),
                reason: e.to_string(),
            })?;
        Ok(Self { client, config })
    }

    /// Create with default configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be initialized.
    pub fn with_defaults() -> Result<Self, Error> {
        Self::new(RegistryConfig::default())
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// GET `url`, retrying once after a delay on transient transport errors
    async fn get(&self, url: &str, not_found: NotFound) -> Result<Response, Error> {
        let mut last_error = None;
        for attempt in 0..2 {
            if attempt > 0 {
                tracing::debug!(url, "retrying request after transport error");
                tokio::time::sleep(self.config.retry_delay).await;
            }
            match self.client.get(url).send().await {
                Ok(response) => return self.check_status(response, not_found.clone()).await,
                Err(e) => {
                    let transient = e.is_timeout() || e.is_connect();
                    last_error = Some(e);
                    if !transient {
                        break;
                    }
                }
            }
        }
        let reason = last_error.map(|e| e.to_string()).unwrap_or_default();
        Err(RegistryError::ServerDown {
            host: self.config.base_url.clone(),
            reason,
        }
        .into())
    }

    async fn check_status(
        &self,
        response: Response,
        not_found: NotFound,
    ) -> Result<Response, Error> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(not_found.into_error().into());
        }
        let message = response.text().await.unwrap_or_default();
        Err(RegistryError::Http {
            status: status.as_u16(),
            message,
        }
        .into())
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        not_found: NotFound,
    ) -> Result<T, Error> {
        let response = self.get(url, not_found).await?;
        response
            .json()
            .await
            .map_err(|e| {
                RegistryError::InvalidResponse {
                    message: e.to_string(),
                }
                .into()
            })
    }
}

#[async_trait]
impl Registry for HttpRegistry {
    async fn get_package(&self, name: &str) -> Result<PackagePayload, Error> {
        let url = format!("{}/api/v1/packages/{name}", self.config.base_url);
        self.get_json(
            &url,
            NotFound::Package {
                name: name.to_string(),
            },
        )
        .await
    }

    async fn get_latest_recipe_revision(
        &self,
        name: &str,
        version: &Version,
    ) -> Result<RecipeRevisionPayload, Error> {
        let url = format!(
            "{}/api/v1/packages/{name}/{version}/latest",
            self.config.base_url
        );
        self.get_json(
            &url,
            NotFound::Version {
                name: name.to_string(),
                version: version.to_string(),
            },
        )
        .await
    }

    async fn get_recipe_revision(
        &self,
        name: &str,
        version: &Version,
        revision: &str,
    ) -> Result<RecipeRevisionPayload, Error> {
        let url = format!(
            "{}/api/v1/packages/{name}/{version}/{revision}",
            self.config.base_url
        );
        self.get_json(
            &url,
            NotFound::Revision {
                name: name.to_string(),
                version: version.to_string(),
                revision: revision.to_string(),
            },
        )
        .await
    }

    async fn download_archive(&self, archive_name: &str, out: &Path) -> Result<(), Error> {
        let url = format!("{}/api/v1/archives/{archive_name}", self.config.base_url);
        let response = self
            .get(
                &url,
                NotFound::Archive {
                    name: archive_name.to_string(),
                },
            )
            .await?;

        let mut file = tokio::fs::File::create(out)
            .await
            .map_err(|e| Error::io_with_path(&e, out))?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| RegistryError::ServerDown {
                host: self.config.base_url.clone(),
                reason: e.to_string(),
            })?;
            tokio::io::AsyncWriteExt::write_all(&mut file, &chunk).await?;
        }
        tokio::io::AsyncWriteExt::flush(&mut file).await?;
        Ok(())
    }
}
