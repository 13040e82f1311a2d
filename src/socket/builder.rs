//! Builder pattern for socket configuration.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use live_socket::{LiveSocket, SocketConfig};
//!
//! # async fn example() -> live_socket::Result<()> {
//! let socket = LiveSocket::builder("https://example.com/live")
//!     .config(SocketConfig::new().with_heartbeat(Some(Duration::from_secs(15))))
//!     .param("_csrf_token", "token")
//!     .param("_request_id", "F1a2b3")
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use crate::config::SocketConfig;
use crate::error::Result;
use crate::identifiers::RefCounter;
use crate::session::controller::Controller;
use crate::session::{ErrorInterceptor, InterceptorChain, Selector};
use crate::transport::{DefaultTransports, Endpoint, TransportFactory};

use super::core::LiveSocket;

// ============================================================================
// LiveSocketBuilder
// ============================================================================

/// Builder for configuring a [`LiveSocket`].
///
/// Use [`LiveSocket::builder()`] to create one.
pub struct LiveSocketBuilder {
    /// Socket base URL.
    url: String,
    /// Session configuration.
    config: SocketConfig,
    /// Transport factory, built-in transports if unset.
    factory: Option<Arc<dyn TransportFactory>>,
    /// Interceptors placed in front of the standard chain, in order.
    interceptors: Vec<Box<dyn ErrorInterceptor>>,
}

impl fmt::Debug for LiveSocketBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveSocketBuilder")
            .field("url", &self.url)
            .field("config", &self.config)
            .field("custom_factory", &self.factory.is_some())
            .field(
                "interceptors",
                &self.interceptors.iter().map(|i| i.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

// ============================================================================
// LiveSocketBuilder Implementation
// ============================================================================

impl LiveSocketBuilder {
    /// Creates a builder for `url` with default configuration.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            config: SocketConfig::new(),
            factory: None,
            interceptors: Vec::new(),
        }
    }

    /// Replaces the configuration, including params added so far.
    #[inline]
    #[must_use]
    pub fn config(mut self, config: SocketConfig) -> Self {
        self.config = config;
        self
    }

    /// Adds a connect param (e.g. `_csrf_token`).
    #[inline]
    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.params.push((key.into(), value.into()));
        self
    }

    /// Sets a custom transport factory.
    #[inline]
    #[must_use]
    pub fn transport_factory(mut self, factory: impl TransportFactory) -> Self {
        self.factory = Some(Arc::new(factory));
        self
    }

    /// Adds a failure interceptor.
    ///
    /// Interceptors run before the standard chain, in the order added.
    #[inline]
    #[must_use]
    pub fn interceptor(mut self, interceptor: impl ErrorInterceptor + 'static) -> Self {
        self.interceptors.push(Box::new(interceptor));
        self
    }

    /// Builds the socket and spawns its controller task.
    ///
    /// The socket starts idle; call [`LiveSocket::connect`].
    ///
    /// # Errors
    ///
    /// - [`Error::Config`](crate::Error::Config) if the configuration is invalid
    /// - [`Error::Url`](crate::Error::Url) or
    ///   [`Error::InvalidEndpoint`](crate::Error::InvalidEndpoint) if the URL is unusable
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn build(self) -> Result<LiveSocket> {
        self.config.validate()?;
        let endpoint = Endpoint::parse(&self.url, self.config.params.clone())?;

        let mut chain = InterceptorChain::standard();
        for interceptor in self.interceptors.into_iter().rev() {
            chain.prepend(interceptor);
        }

        let factory = self.factory.unwrap_or_else(|| {
            Arc::new(DefaultTransports::new(self.config.long_poll_timeout))
        });

        let refs = Arc::new(RefCounter::new());
        let handle = Controller::spawn(
            Selector::with_chain(self.config.clone(), chain),
            factory,
            endpoint.clone(),
            Arc::clone(&refs),
        );

        Ok(LiveSocket::from_parts(endpoint, self.config, refs, handle))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use crate::error::Error;
    use crate::session::{ErrorContext, Flow};
    use crate::transport::mock::MockTransports;

    struct Passthrough(&'static str);

    impl ErrorInterceptor for Passthrough {
        fn name(&self) -> &'static str {
            self.0
        }

        fn intercept(&self, _ctx: &mut ErrorContext<'_>) -> Flow {
            Flow::Continue
        }
    }

    #[test]
    fn test_params_accumulate() {
        let builder = LiveSocketBuilder::new("https://example.com/live")
            .param("_csrf_token", "a")
            .param("_request_id", "b");

        assert_eq!(builder.config.params.len(), 2);
        assert_eq!(builder.config.params[1].0, "_request_id");
    }

    #[test]
    fn test_config_replaces_params() {
        let builder = LiveSocketBuilder::new("https://example.com/live")
            .param("_csrf_token", "a")
            .config(SocketConfig::new());

        assert!(builder.config.params.is_empty());
    }

    #[test]
    fn test_interceptors_keep_order() {
        let builder = LiveSocketBuilder::new("https://example.com/live")
            .interceptor(Passthrough("first"))
            .interceptor(Passthrough("second"));

        let debug = format!("{builder:?}");
        assert!(debug.contains(r#"["first", "second"]"#), "{debug}");
    }

    #[test]
    fn test_invalid_config_rejected() {
        let err = LiveSocketBuilder::new("https://example.com/live")
            .config(SocketConfig::new().with_jitter(2.0))
            .build()
            .unwrap_err();

        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_invalid_url_rejected() {
        let err = LiveSocketBuilder::new("ftp://example.com/live")
            .build()
            .unwrap_err();

        assert!(matches!(err, Error::InvalidEndpoint { .. }));
    }

    #[tokio::test]
    async fn test_build_keeps_endpoint_and_config() {
        let socket = LiveSocketBuilder::new("https://example.com/live")
            .config(SocketConfig::new().with_push_timeout(Duration::from_secs(3)))
            .param("_csrf_token", "abc")
            .transport_factory(MockTransports::default())
            .build()
            .expect("build");

        assert_eq!(
            socket.endpoint().websocket_url().as_str(),
            "wss://example.com/live/websocket?vsn=2.0.0&_csrf_token=abc"
        );
        assert_eq!(socket.config().push_timeout, Duration::from_secs(3));
    }
}
