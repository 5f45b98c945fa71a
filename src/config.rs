//! Cache configuration and its chainable options

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use aliri_clock::DurationSecs;
use tracing::Dispatch;

use crate::claims::ParseOption;
use crate::error::TokenError;

/// The future produced by a [`TokenFunction`]
pub type TokenFuture = Pin<Box<dyn Future<Output = Result<String, TokenError>> + Send>>;

/// An asynchronous function that produces a fresh bearer token
///
/// Cancellation is cooperative: dropping the returned future abandons the
/// request.
pub type TokenFunction = Arc<dyn Fn() -> TokenFuture + Send + Sync>;

pub(crate) fn not_implemented() -> TokenFunction {
    Arc::new(|| Box::pin(async { Err(TokenError::NotImplemented) }))
}

/// Configuration for a token cache
///
/// Built by chaining `with_*` options onto [`CacheConfig::default`]. Every
/// option overwrites exactly the field it names and leaves the rest alone, so
/// options may be applied in any order.
#[derive(Clone)]
pub struct CacheConfig {
    pub(crate) name: String,
    pub(crate) logger: Option<Dispatch>,
    pub(crate) headroom: DurationSecs,
    pub(crate) token_fn: TokenFunction,
    pub(crate) parse_options: Vec<ParseOption>,
    pub(crate) reject_unparsable: bool,
}

impl Default for CacheConfig {
    /// The default configuration
    ///
    /// Unnamed, no headroom, no claim checks, logging to the global default
    /// dispatcher. The default token function always fails with
    /// [`TokenError::NotImplemented`].
    fn default() -> Self {
        Self {
            name: String::new(),
            logger: None,
            headroom: DurationSecs(0),
            token_fn: not_implemented(),
            parse_options: Vec::new(),
            reject_unparsable: false,
        }
    }
}

impl CacheConfig {
    /// Sets the display name used in the cache's log output
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Routes all log output of the owning cache through `logger`
    ///
    /// The replacement is wholesale: a previously configured dispatcher
    /// observes no further events. When no logger is configured, events go to
    /// the global default dispatcher.
    pub fn with_logger(mut self, logger: Dispatch) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Sets the margin subtracted from a token's expiry when deciding how
    /// long to keep it
    ///
    /// With a headroom of `n` seconds, a cached token stops being served `n`
    /// seconds before its `exp` claim says it expires.
    pub fn with_headroom(mut self, headroom: DurationSecs) -> Self {
        self.headroom = headroom;
        self
    }

    /// Replaces the function invoked to obtain a fresh token
    pub fn with_token_function<F, Fut>(mut self, token_fn: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, TokenError>> + Send + 'static,
    {
        self.token_fn = Arc::new(move || Box::pin(token_fn()));
        self
    }

    /// Replaces the claim checks applied when a fetched token is parsed
    ///
    /// The previous sequence is discarded, never extended.
    pub fn with_parse_options(mut self, options: impl IntoIterator<Item = ParseOption>) -> Self {
        self.parse_options = options.into_iter().collect();
        self
    }

    /// Sets whether a token that cannot be parsed is an error
    ///
    /// When unset (the default), an unparsable token is returned to the
    /// caller as-is; it is merely never cached.
    pub fn with_reject_unparsable(mut self, reject: bool) -> Self {
        self.reject_unparsable = reject;
        self
    }

    /// The cache's display name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The margin subtracted from token expiries
    pub fn headroom(&self) -> DurationSecs {
        self.headroom
    }

    /// The configured token function
    pub fn token_function(&self) -> &TokenFunction {
        &self.token_fn
    }

    /// The claim checks applied to fetched tokens, in application order
    pub fn parse_options(&self) -> &[ParseOption] {
        &self.parse_options
    }

    /// Whether unparsable tokens are rejected
    pub fn reject_unparsable(&self) -> bool {
        self.reject_unparsable
    }

    /// Runs `f` with this configuration's logger installed as the default
    /// dispatcher
    pub(crate) fn scoped_log<T>(&self, f: impl FnOnce() -> T) -> T {
        match &self.logger {
            Some(dispatch) => tracing::dispatcher::with_default(dispatch, f),
            None => f(),
        }
    }
}

impl fmt::Debug for CacheConfig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CacheConfig")
            .field("name", &self.name)
            .field(
                "logger",
                &self.logger.as_ref().map_or("default", |_| "custom"),
            )
            .field("headroom", &self.headroom)
            .field("parse_options", &self.parse_options)
            .field("reject_unparsable", &self.reject_unparsable)
            .finish_non_exhaustive()
    }
}
