//! Endpoint URL construction.
//!
//! The socket is configured with one base URL (e.g. `https://example.com/live`).
//! Each transport derives its own URL from it:
//!
//! | Transport | URL |
//! |-----------|-----|
//! | WebSocket | `wss://example.com/live/websocket?vsn=2.0.0&<params>` |
//! | Long-poll | `https://example.com/live/longpoll?vsn=2.0.0&<params>` |
//!
//! A query string on the base URL is carried over ahead of the connect params.

// ============================================================================
// Imports
// ============================================================================

use url::Url;

use crate::error::{Error, Result};
use crate::protocol::events::VSN;

// ============================================================================
// Endpoint
// ============================================================================

/// Socket endpoint with its connect params.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Base URL without transport suffix.
    base: Url,
    /// Query params appended to every transport URL.
    params: Vec<(String, String)>,
}

impl Endpoint {
    /// Parses an endpoint URL.
    ///
    /// Accepts `http`, `https`, `ws` and `wss` schemes.
    ///
    /// # Errors
    ///
    /// - [`Error::Url`] if the URL cannot be parsed
    /// - [`Error::InvalidEndpoint`] for other schemes
    pub fn parse(url: &str, params: Vec<(String, String)>) -> Result<Self> {
        let base = Url::parse(url)?;

        match base.scheme() {
            "http" | "https" | "ws" | "wss" => {}
            other => {
                return Err(Error::invalid_endpoint(
                    url,
                    format!("unsupported scheme '{other}'"),
                ));
            }
        }

        if base.cannot_be_a_base() {
            return Err(Error::invalid_endpoint(url, "URL cannot have a path"));
        }

        Ok(Self { base, params })
    }

    /// Returns the base URL.
    #[inline]
    #[must_use]
    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Returns the connect params.
    #[inline]
    #[must_use]
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    /// Returns the WebSocket URL.
    #[must_use]
    pub fn websocket_url(&self) -> Url {
        let secure = matches!(self.base.scheme(), "https" | "wss");
        self.transport_url(if secure { "wss" } else { "ws" }, "websocket")
    }

    /// Returns the long-poll URL.
    #[must_use]
    pub fn long_poll_url(&self) -> Url {
        let secure = matches!(self.base.scheme(), "https" | "wss");
        self.transport_url(if secure { "https" } else { "http" }, "longpoll")
    }

    fn transport_url(&self, scheme: &str, suffix: &str) -> Url {
        let mut url = self.base.clone();

        // Only fails when switching between special and non-special schemes,
        // and all four schemes involved here are special.
        let _ = url.set_scheme(scheme);

        let path = format!("{}/{suffix}", url.path().trim_end_matches('/'));
        url.set_path(&path);

        // Params already in the base URL are kept; `vsn` is always ours
        let existing: Vec<(String, String)> = self
            .base
            .query_pairs()
            .filter(|(key, _)| key != "vsn")
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        url.set_query(None);

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("vsn", VSN);
            for (key, value) in existing.iter().chain(&self.params) {
                query.append_pair(key, value);
            }
        }

        url
    }
}

// ============================================================================
// Tests
// ============================================================================
