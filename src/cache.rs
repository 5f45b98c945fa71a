//! A lazily refreshed cache for a single token

use std::fmt;

use aliri_clock::{Clock, System, UnixTime};
use tokio::sync::Mutex;

use crate::claims;
use crate::config::CacheConfig;
use crate::error::TokenError;

#[derive(Clone)]
struct CachedToken {
    token: String,
    valid_until: UnixTime,
}

/// A lazily populated cache for a single bearer token
///
/// [`ensure_token`][TokenCache::ensure_token] returns the cached token while
/// it remains valid and invokes the configured token function otherwise. A
/// fresh token is cached until its `exp` claim minus the configured headroom;
/// tokens without an `exp` claim are returned but never cached.
pub struct TokenCache<C = System> {
    config: CacheConfig,
    clock: C,
    current: Mutex<Option<CachedToken>>,
}

impl TokenCache {
    /// Constructs a cache around the given configuration
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            clock: System,
            current: Mutex::new(None),
        }
    }
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl<C> TokenCache<C> {
    /// Sets a custom clock to be used
    ///
    /// Useful for testing purposes
    pub fn with_clock<D>(self, clock: D) -> TokenCache<D> {
        TokenCache {
            config: self.config,
            clock,
            current: self.current,
        }
    }

    /// The cache's configuration
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
}

impl<C: Clock> TokenCache<C> {
    /// Returns a valid token, invoking the token function if required
    ///
    /// A token function error is propagated to the caller unchanged. A fresh
    /// token that cannot be parsed is returned uncached, unless the
    /// configuration rejects unparsable tokens, in which case
    /// [`TokenError::Unparsable`] is returned.
    pub async fn ensure_token(&self) -> Result<String, TokenError> {
        // The lock is held across the fetch so that concurrent callers wait
        // for the in-flight request instead of stampeding the token source.
        let mut current = self.current.lock().await;
        let now = self.clock.now();

        if let Some(cached) = current.as_ref() {
            if now < cached.valid_until {
                self.config.scoped_log(|| {
                    tracing::debug!(
                        cache = %self.config.name,
                        valid_until = cached.valid_until.0,
                        "using cached token"
                    )
                });
                return Ok(cached.token.clone());
            }
        }
        *current = None;

        let token = (self.config.token_fn)().await?;

        match claims::parse(&token, &self.config.parse_options, &self.clock) {
            Ok(parsed) => match parsed.exp() {
                Some(expiry) => {
                    let valid_until = UnixTime(expiry.0.saturating_sub(self.config.headroom.0));
                    self.config.scoped_log(|| {
                        tracing::debug!(
                            cache = %self.config.name,
                            expiry = expiry.0,
                            valid_until = valid_until.0,
                            "caching token"
                        )
                    });
                    *current = Some(CachedToken {
                        token: token.clone(),
                        valid_until,
                    });
                }
                None => {
                    self.config.scoped_log(|| {
                        tracing::info!(
                            cache = %self.config.name,
                            "token has no exp claim, not caching"
                        )
                    });
                }
            },
            Err(error) if self.config.reject_unparsable => {
                return Err(TokenError::Unparsable(error));
            }
            Err(error) => {
                self.config.scoped_log(|| {
                    tracing::warn!(
                        cache = %self.config.name,
                        error = &error as &dyn std::error::Error,
                        "unable to parse token, not caching"
                    )
                });
            }
        }

        Ok(token)
    }
}

impl<C: fmt::Debug> fmt::Debug for TokenCache<C> {
    // Skips the cached token itself so that token material never ends up in
    // debug output.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("TokenCache")
            .field("config", &self.config)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::{ClaimsRejected, ParseError, ParseOption};
    use crate::test_support::{jwt, LogCapture, SharedClock};
    use aliri_clock::DurationSecs;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tracing::Level;

    fn counted(config: CacheConfig, token: String) -> (CacheConfig, Arc<AtomicUsize>) {
        let fetches = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fetches);
        let config = config.with_token_function(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            let token = token.clone();
            async move { Ok(token) }
        });
        (config, fetches)
    }

    #[tokio::test]
    async fn reuses_cached_token_until_headroom() {
        let clock = SharedClock::default();
        let (config, fetches) = counted(
            CacheConfig::default().with_headroom(DurationSecs(100)),
            jwt(json!({ "exp": 1000 })),
        );
        let cache = TokenCache::new(config).with_clock(clock.clone());

        let first = cache.ensure_token().await.unwrap();
        assert_eq!(fetches.load(Ordering::SeqCst), 1);

        clock.set(UnixTime(899));
        let second = cache.ensure_token().await.unwrap();
        assert_eq!(second, first);
        assert_eq!(fetches.load(Ordering::SeqCst), 1);

        clock.set(UnixTime(900));
        cache.ensure_token().await.unwrap();
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn headroom_longer_than_lifetime_disables_caching() {
        let clock = SharedClock::default();
        let (config, fetches) = counted(
            CacheConfig::default().with_headroom(DurationSecs(100)),
            jwt(json!({ "exp": 50 })),
        );
        let cache = TokenCache::new(config).with_clock(clock.clone());

        cache.ensure_token().await.unwrap();
        cache.ensure_token().await.unwrap();

        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn token_without_exp_is_returned_but_not_cached() {
        let (config, fetches) = counted(CacheConfig::default(), jwt(json!({ "iss": "me" })));
        let cache = TokenCache::new(config);

        let token = cache.ensure_token().await.unwrap();
        assert_eq!(token, jwt(json!({ "iss": "me" })));
        cache.ensure_token().await.unwrap();

        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unparsable_token_passes_through_by_default() {
        let logger = LogCapture::default();
        let (config, fetches) = counted(
            CacheConfig::default()
                .with_name("unparsable")
                .with_logger(logger.dispatch()),
            String::from("garbage"),
        );
        let cache = TokenCache::new(config);

        assert_eq!(cache.ensure_token().await.unwrap(), "garbage");
        assert_eq!(cache.ensure_token().await.unwrap(), "garbage");
        assert_eq!(fetches.load(Ordering::SeqCst), 2);

        let warnings: Vec<_> = logger
            .events()
            .into_iter()
            .filter(|(level, _)| *level == Level::WARN)
            .collect();
        assert_eq!(warnings.len(), 2);
        assert_eq!(warnings[0].1, "unable to parse token, not caching");
    }

    #[tokio::test]
    async fn unparsable_token_is_rejected_when_configured() {
        let (config, _) = counted(
            CacheConfig::default().with_reject_unparsable(true),
            String::from("garbage"),
        );
        let cache = TokenCache::new(config);

        let error = cache.ensure_token().await.unwrap_err();

        assert!(matches!(error, TokenError::Unparsable(_)));
    }

    #[tokio::test]
    async fn parse_options_are_enforced() {
        let (config, _) = counted(
            CacheConfig::default()
                .with_parse_options([ParseOption::Issuer(String::from("expected"))])
                .with_reject_unparsable(true),
            jwt(json!({ "exp": 1000, "iss": "other" })),
        );
        let cache = TokenCache::new(config);

        let error = cache.ensure_token().await.unwrap_err();

        assert!(matches!(
            error,
            TokenError::Unparsable(ParseError::ClaimsRejected(ClaimsRejected::InvalidIssuer))
        ));
    }

    #[tokio::test]
    async fn default_cache_fails_with_not_implemented() {
        let cache = TokenCache::default();

        let error = cache.ensure_token().await.unwrap_err();

        assert!(matches!(error, TokenError::NotImplemented));
    }

    #[tokio::test]
    async fn token_function_error_propagates_unchanged() {
        let cache = TokenCache::new(
            CacheConfig::default().with_token_function(|| async { Err(TokenError::Fetch("boom".into())) }),
        );

        let error = cache.ensure_token().await.unwrap_err();

        assert!(matches!(error, TokenError::Fetch(_)));
        assert_eq!(error.to_string(), "boom");
    }
}
