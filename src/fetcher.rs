//! Retrieval of change payloads from the control plane.
use std::sync::atomic::{AtomicBool, Ordering};

use reqwest::{header, StatusCode, Url};

use crate::{
    models::{FlagChanges, SegmentChanges},
    Error, Result,
};

/// Default base URL for the SDK API.
pub const DEFAULT_SDK_URL: &str = "https://sdk.split.io/api";

const FLAG_CHANGES_ENDPOINT: &str = "/splitChanges";
const SEGMENT_CHANGES_ENDPOINT: &str = "/segmentChanges";

/// Per-request options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Change number the caller knows to exist. When set, caches in front of the control plane are
    /// bypassed, so a notification is never answered with an older cached payload.
    pub till: Option<i64>,
    /// Only return flags tagged with one of these sets. Kept sorted so that requests are cacheable.
    pub flag_sets: Vec<String>,
}

impl FetchOptions {
    /// Options for a regular, cacheable request.
    pub fn new() -> FetchOptions {
        FetchOptions::default()
    }

    /// Set the change number known to exist, see [`FetchOptions::till`].
    pub fn with_till(mut self, till: Option<i64>) -> FetchOptions {
        self.till = till;
        self
    }

    /// Restrict flags to `flag_sets`.
    pub fn with_flag_sets(mut self, flag_sets: impl IntoIterator<Item = String>) -> FetchOptions {
        let mut flag_sets: Vec<String> = flag_sets.into_iter().collect();
        flag_sets.sort();
        flag_sets.dedup();
        self.flag_sets = flag_sets;
        self
    }
}

/// Source of flag and segment changes.
///
/// Both calls return one page of changes starting at `since`. Callers page through results until
/// the returned `till` equals `since`.
pub trait ChangeFetcher: Send + Sync {
    /// Fetch one page of flag changes after `since`.
    fn fetch_flags(&self, since: i64, options: &FetchOptions) -> Result<FlagChanges>;

    /// Fetch one page of membership changes of segment `name` after `since`.
    fn fetch_segment(
        &self,
        name: &str,
        since: i64,
        options: &FetchOptions,
    ) -> Result<SegmentChanges>;
}

/// A [`ChangeFetcher`] talking to the SDK API over HTTP.
pub struct HttpChangeFetcher {
    // Client holds a connection pool internally, so we're reusing the client between requests.
    client: reqwest::blocking::Client,
    sdk_url: String,
    api_key: String,
    /// If we receive a 401 or 403 during a request, the api key is not valid. We cache this error
    /// so we don't issue additional requests to the server.
    unauthorized: AtomicBool,
}

impl HttpChangeFetcher {
    /// Create a fetcher for the API at `sdk_url`, authenticating with `api_key`.
    pub fn new(sdk_url: impl Into<String>, api_key: impl Into<String>) -> HttpChangeFetcher {
        HttpChangeFetcher {
            client: reqwest::blocking::Client::new(),
            sdk_url: sdk_url.into(),
            api_key: api_key.into(),
            unauthorized: AtomicBool::new(false),
        }
    }

    fn url(&self, path: &str, since: i64, options: &FetchOptions) -> Result<Url> {
        let mut params = vec![("since", since.to_string())];
        if let Some(till) = options.till {
            params.push(("till", till.to_string()));
        }
        if !options.flag_sets.is_empty() {
            params.push(("sets", options.flag_sets.join(",")));
        }
        Url::parse_with_params(&format!("{}{}", self.sdk_url, path), &params)
            .map_err(Error::InvalidSdkUrl)
    }

    fn get<T: serde::de::DeserializeOwned>(&self, url: Url, options: &FetchOptions) -> Result<T> {
        if self.unauthorized.load(Ordering::Relaxed) {
            return Err(Error::Unauthorized);
        }

        let mut request = self.client.get(url).bearer_auth(&self.api_key);
        if options.till.is_some() {
            request = request.header(header::CACHE_CONTROL, "no-cache");
        }
        let response = request.send()?;

        match response.status() {
            status if status.is_success() => Ok(response.json()?),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                log::warn!(target: "splitio", "client is not authorized. Check your API key");
                self.unauthorized.store(true, Ordering::Relaxed);
                Err(Error::Unauthorized)
            }
            StatusCode::URI_TOO_LONG => {
                log::error!(target: "splitio",
                            flag_sets:display = options.flag_sets.join(",");
                            "request uri is too long, consider reducing the flag sets filter");
                Err(Error::UriTooLong)
            }
            status => {
                log::warn!(target: "splitio",
                           status = status.as_u16();
                           "received non-success response while fetching changes");
                Err(Error::HttpStatus(status.as_u16()))
            }
        }
    }
}

impl ChangeFetcher for HttpChangeFetcher {
    fn fetch_flags(&self, since: i64, options: &FetchOptions) -> Result<FlagChanges> {
        let url = self.url(FLAG_CHANGES_ENDPOINT, since, options)?;
        log::debug!(target: "splitio", since; "fetching flag changes");
        self.get(url, options)
    }

    fn fetch_segment(
        &self,
        name: &str,
        since: i64,
        options: &FetchOptions,
    ) -> Result<SegmentChanges> {
        // Segment names are plain identifiers, but escape them anyway to keep the path intact.
        let path = format!(
            "{}/{}",
            SEGMENT_CHANGES_ENDPOINT,
            url::form_urlencoded::byte_serialize(name.as_bytes()).collect::<String>()
        );
        // Segment requests are never filtered by flag sets.
        let options = FetchOptions {
            flag_sets: Vec::new(),
            ..options.clone()
        };
        let url = self.url(&path, since, &options)?;
        log::debug!(target: "splitio", segment_name = name, since; "fetching segment changes");
        self.get(url, &options)
    }
}
