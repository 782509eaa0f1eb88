//! Catalog client implementations (boundary only).

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::{Value, json};
use tracing::debug;

use crate::application::ports::CatalogClient;

/// Budget for one catalog request.
pub const CATALOG_TIMEOUT: Duration = Duration::from_secs(20);

/// Longest response body excerpt quoted in an error.
const BODY_EXCERPT_LEN: usize = 300;

/// `POST <hub>/catalog/install` with `{"id", "target"}`.
pub struct HttpCatalogClient {
    base_url: String,
    token: Option<String>,
}

impl HttpCatalogClient {
    #[must_use]
    pub fn new(base_url: &str, token: Option<String>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.trim().is_empty()),
        }
    }
}

impl CatalogClient for HttpCatalogClient {
    async fn install(&self, id: &str, target: &Path) -> Result<Value> {
        let url = format!("{}/catalog/install", self.base_url);
        let body = json!({ "id": id, "target": target.to_string_lossy() });
        let token = self.token.clone();
        debug!(%url, id, "catalog: POST install");

        tokio::task::spawn_blocking(move || {
            let agent = ureq::AgentBuilder::new().timeout(CATALOG_TIMEOUT).build();
            let req = agent
                .post(&url)
                .set("Accept", "application/json")
                .set("User-Agent", concat!("matrix-cli/", env!("CARGO_PKG_VERSION")));
            let req = match &token {
                Some(token) => req.set("Authorization", &format!("Bearer {token}")),
                None => req,
            };
            match req.send_json(body) {
                Ok(resp) => {
                    let text = resp.into_string().context("reading catalog response")?;
                    serde_json::from_str(&text).context("parsing catalog response")
                }
                Err(ureq::Error::Status(code, resp)) => {
                    let text = resp.into_string().unwrap_or_default();
                    let excerpt: String = text.trim().chars().take(BODY_EXCERPT_LEN).collect();
                    anyhow::bail!("catalog install failed: HTTP {code} from {url}: {excerpt}")
                }
                Err(ureq::Error::Transport(t)) => {
                    anyhow::bail!("catalog install failed: cannot reach {url}: {t}")
                }
            }
        })
        .await
        .context("catalog task panicked")?
    }
}

/// Reads a plan from a local JSON file; used for offline installs.
pub struct FileCatalogClient {
    path: PathBuf,
}

impl FileCatalogClient {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl CatalogClient for FileCatalogClient {
    async fn install(&self, id: &str, _target: &Path) -> Result<Value> {
        debug!(path = %self.path.display(), id, "catalog: reading plan file");
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("reading plan file {}", self.path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("parsing plan file {}", self.path.display()))
    }
}

/// Either catalog source, chosen at startup.
pub enum AnyCatalog {
    Http(HttpCatalogClient),
    File(FileCatalogClient),
}

impl CatalogClient for AnyCatalog {
    async fn install(&self, id: &str, target: &Path) -> Result<Value> {
        match self {
            Self::Http(c) => c.install(id, target).await,
            Self::File(c) => c.install(id, target).await,
        }
    }
}
