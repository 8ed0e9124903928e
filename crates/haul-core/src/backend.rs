//! Typed request/response clients for the source and target backends.
//!
//! Both speak JSON:API over blocking HTTP with bearer-token auth. A
//! non-success status becomes a [`MigrateError::BackendRequest`] carrying
//! the first structured error message from the response body; callers
//! decide whether that is run-fatal or a single-workspace failure.
//!
//! Pagination differs per backend: the source pages by
//! `meta.pagination.next-page` numbers, the target by `links.next` URLs.

use std::io::Read;

use serde_json::Value;
use tracing::debug;

use crate::error::{MigrateError, Result};
use crate::jsonapi::{Filters, ItemDocument, ListDocument, encode_query};

/// A plain hostname becomes `https://{host}`; an explicit scheme is kept.
fn base_url(hostname: &str) -> String {
    if hostname.contains("://") {
        hostname.trim_end_matches('/').to_string()
    } else {
        format!("https://{hostname}")
    }
}

fn request_failed(url: &str, err: ureq::Error) -> MigrateError {
    let message = match err {
        ureq::Error::Status(code, response) => response
            .into_json::<Value>()
            .ok()
            .as_ref()
            .and_then(first_error_message)
            .unwrap_or_else(|| format!("HTTP {code}")),
        ureq::Error::Transport(transport) => transport.to_string(),
    };
    MigrateError::BackendRequest {
        url: url.to_string(),
        message,
    }
}

/// First `errors[0].detail` (falling back to `title`) of an error body.
fn first_error_message(body: &Value) -> Option<String> {
    let first = body.get("errors")?.get(0)?;
    first
        .get("detail")
        .or_else(|| first.get("title"))
        .and_then(Value::as_str)
        .map(ToOwned::to_owned)
}

/// Shared HTTP plumbing for one backend.
struct ApiClient {
    base: String,
    token: String,
    preview: bool,
}

impl ApiClient {
    fn new(hostname: &str, api_prefix: &str, token: String, preview: bool) -> Self {
        Self {
            base: format!("{}/{api_prefix}", base_url(hostname)),
            token,
            preview,
        }
    }

    fn apply_headers(&self, request: ureq::Request) -> ureq::Request {
        let request = request
            .set("Authorization", &format!("Bearer {}", self.token))
            .set("Content-Type", "application/vnd.api+json");
        if self.preview {
            request.set("Prefer", "profile=preview")
        } else {
            request
        }
    }

    fn get(&self, route_and_query: &str) -> Result<ListDocument> {
        let url = format!("{}/{route_and_query}", self.base);
        debug!(%url, "GET");
        let response = self
            .apply_headers(ureq::get(&url))
            .call()
            .map_err(|err| request_failed(&url, err))?;
        response
            .into_json()
            .map_err(|err| MigrateError::BackendRequest {
                url,
                message: format!("invalid JSON response: {err}"),
            })
    }

    fn post(&self, route: &str, body: &Value) -> Result<ItemDocument> {
        let url = format!("{}/{route}", self.base);
        debug!(%url, "POST");
        let response = self
            .apply_headers(ureq::post(&url))
            .send_json(body)
            .map_err(|err| request_failed(&url, err))?;
        response
            .into_json()
            .map_err(|err| MigrateError::BackendRequest {
                url,
                message: format!("invalid JSON response: {err}"),
            })
    }

    /// Authorized GET of an absolute URL, returning the raw bytes.
    fn download(&self, url: &str) -> Result<Vec<u8>> {
        debug!(%url, "GET (raw)");
        let response = self
            .apply_headers(ureq::get(url))
            .call()
            .map_err(|err| request_failed(url, err))?;
        let mut raw = Vec::new();
        response.into_reader().read_to_end(&mut raw)?;
        Ok(raw)
    }
}

/// Client for the source backend (`api/v2`).
pub struct SourceBackend {
    client: ApiClient,
}

impl SourceBackend {
    #[must_use]
    pub fn new(hostname: &str, token: String) -> Self {
        Self {
            client: ApiClient::new(hostname, "api/v2", token, false),
        }
    }

    pub fn fetch_page(&self, route: &str, filters: &Filters) -> Result<ListDocument> {
        self.client.get(&format!("{route}{}", encode_query(filters)))
    }

    /// Accumulate every page of a listing, following
    /// `meta.pagination.next-page` until it is absent.
    pub fn fetch_all(&self, route: &str, filters: &Filters) -> Result<Vec<crate::jsonapi::Resource>> {
        let mut all = Vec::new();
        let mut page: u64 = 1;
        loop {
            let mut page_filters = filters.clone();
            page_filters.insert("page[number]".to_string(), page.to_string());
            let doc = self.fetch_page(route, &page_filters)?;
            all.extend(doc.data);
            match doc.meta.pagination.and_then(|p| p.next_page) {
                Some(next) => page = next,
                None => break,
            }
        }
        Ok(all)
    }

    pub fn create(&self, route: &str, body: &Value) -> Result<ItemDocument> {
        self.client.post(route, body)
    }

    /// Lock a source workspace with a human-readable reason.
    pub fn lock_workspace(&self, workspace_id: &str, reason: &str) -> Result<()> {
        let route = format!("workspaces/{workspace_id}/actions/lock");
        self.client
            .post(&route, &serde_json::json!({ "reason": reason }))?;
        Ok(())
    }

    /// Download a hosted state payload from its absolute URL.
    pub fn download(&self, url: &str) -> Result<Vec<u8>> {
        self.client.download(url)
    }
}

/// Client for the target backend (`api/iacp/v3`, preview profile).
pub struct TargetBackend {
    client: ApiClient,
}

impl TargetBackend {
    #[must_use]
    pub fn new(hostname: &str, token: String) -> Self {
        Self {
            client: ApiClient::new(hostname, "api/iacp/v3", token, true),
        }
    }

    pub fn fetch_page(&self, route: &str, filters: &Filters) -> Result<ListDocument> {
        self.client.get(&format!("{route}{}", encode_query(filters)))
    }

    /// Accumulate every page of a listing, following `links.next` until
    /// it is absent. Only the trailing route segment of the link is
    /// reused, so the client's own base URL always wins.
    pub fn fetch_all(&self, route: &str, filters: &Filters) -> Result<Vec<crate::jsonapi::Resource>> {
        let mut next = format!("{route}{}", encode_query(filters));
        let mut all = Vec::new();
        loop {
            let doc = self.client.get(&next)?;
            all.extend(doc.data);
            match doc.links.next {
                Some(link) => {
                    next = link.rsplit('/').next().unwrap_or(link.as_str()).to_string();
                }
                None => break,
            }
        }
        Ok(all)
    }

    pub fn create(&self, route: &str, body: &Value) -> Result<ItemDocument> {
        self.client.post(route, body)
    }
}
