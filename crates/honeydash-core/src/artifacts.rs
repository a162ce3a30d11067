// Copyright 2025-Present HoneyDash contributors
// SPDX-License-Identifier: Apache-2.0

//! Paginated listing of binaries captured by a honeypot.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::http::{ApiRequest, Transport};
use crate::logs::{QueryError, SourceKind};

/// One captured file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    /// Content hash; dionaea reports `md5`, cowrie `sha256`.
    #[serde(alias = "sha256", alias = "md5")]
    pub hash: String,
    pub size: u64,
    pub timestamp: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One page of the listing. Pages are 1-based.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactPage {
    pub page: u32,
    pub total_pages: u32,
    pub artifacts: Vec<Artifact>,
}

impl ArtifactPage {
    pub fn has_previous(&self) -> bool {
        self.page > 1
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }
}

#[derive(Deserialize)]
struct ListingResponse {
    binaries: Vec<Artifact>,
    total_pages: u32,
}

/// Fetches `GET /{kind}/binaries?page=N`.
pub async fn fetch_artifacts(
    transport: &dyn Transport,
    kind: SourceKind,
    page: u32,
) -> Result<ArtifactPage, QueryError> {
    if page == 0 {
        return Err(QueryError::Validation("pages are numbered from 1".to_string()));
    }
    let endpoint = format!("/{kind}/binaries");
    let body = transport
        .call(ApiRequest::get(&endpoint).query("page", page))
        .await?;

    if let Some(false) = body.get("success").and_then(Value::as_bool) {
        return Err(QueryError::Remote {
            message: crate::error::remote_reason(&body),
        });
    }
    let listing: ListingResponse =
        serde_json::from_value(body).map_err(|e| QueryError::malformed(&endpoint, e.to_string()))?;
    debug!(
        source = %kind,
        page,
        total_pages = listing.total_pages,
        artifacts = listing.binaries.len(),
        "artifact page fetched"
    );

    Ok(ArtifactPage {
        page,
        total_pages: listing.total_pages,
        artifacts: listing.binaries,
    })
}

/// Walks the artifact listing of one source, one page at a time.
pub struct ArtifactPager {
    kind: SourceKind,
    transport: Arc<dyn Transport>,
    current: Option<ArtifactPage>,
}

impl fmt::Debug for ArtifactPager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArtifactPager")
            .field("kind", &self.kind)
            .field("current", &self.current)
            .finish_non_exhaustive()
    }
}

impl ArtifactPager {
    pub fn new(kind: SourceKind, transport: Arc<dyn Transport>) -> Self {
        Self {
            kind,
            transport,
            current: None,
        }
    }

    pub fn current(&self) -> Option<&ArtifactPage> {
        self.current.as_ref()
    }

    pub fn current_page(&self) -> Option<u32> {
        self.current.as_ref().map(|p| p.page)
    }

    pub fn has_previous(&self) -> bool {
        self.current.as_ref().is_some_and(ArtifactPage::has_previous)
    }

    pub fn has_next(&self) -> bool {
        self.current.as_ref().is_some_and(ArtifactPage::has_next)
    }

    /// Loads `page`. On failure the previously loaded page is kept.
    pub async fn load(&mut self, page: u32) -> Result<&ArtifactPage, QueryError> {
        let loaded = fetch_artifacts(self.transport.as_ref(), self.kind, page).await?;
        Ok(self.current.insert(loaded))
    }

    pub async fn first(&mut self) -> Result<&ArtifactPage, QueryError> {
        self.load(1).await
    }

    pub async fn next(&mut self) -> Result<&ArtifactPage, QueryError> {
        let page = match &self.current {
            Some(current) if current.has_next() => current.page + 1,
            Some(_) => return Err(QueryError::Precondition("already on the last page".to_string())),
            None => return Err(QueryError::Precondition("no page loaded yet".to_string())),
        };
        self.load(page).await
    }

    pub async fn previous(&mut self) -> Result<&ArtifactPage, QueryError> {
        let page = match &self.current {
            Some(current) if current.has_previous() => current.page - 1,
            Some(_) => {
                return Err(QueryError::Precondition("already on the first page".to_string()))
            }
            None => return Err(QueryError::Precondition("no page loaded yet".to_string())),
        };
        self.load(page).await
    }
}
