//! Keyed token caching for callers with multiple token authorities

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use aliri_clock::{Clock, System};
use tokio::sync::Mutex;

use crate::cache::TokenCache;
use crate::config::{CacheConfig, TokenFuture};
use crate::error::TokenError;

/// An asynchronous function that produces a fresh bearer token for a key
pub type KeyedTokenFunction = Arc<dyn Fn(String) -> TokenFuture + Send + Sync>;

/// A collection of independently cached tokens, one per string key
///
/// Each key is backed by its own [`TokenCache`] sharing the keyed cache's
/// configuration; its token function is the keyed token function applied to
/// that key, and its log output carries the key in the cache name.
pub struct KeyedTokenCache<C = System> {
    config: CacheConfig,
    token_fn: KeyedTokenFunction,
    clock: C,
    caches: Mutex<HashMap<String, Arc<TokenCache<C>>>>,
}

impl KeyedTokenCache {
    /// Constructs a keyed cache
    ///
    /// `token_fn` receives the key being ensured. The configuration's own
    /// token function is never invoked by a keyed cache.
    pub fn new<F, Fut>(config: CacheConfig, token_fn: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, TokenError>> + Send + 'static,
    {
        Self {
            config,
            token_fn: Arc::new(move |key| Box::pin(token_fn(key))),
            clock: System,
            caches: Mutex::new(HashMap::new()),
        }
    }
}

impl<C> KeyedTokenCache<C> {
    /// Sets a custom clock to be used
    ///
    /// Useful for testing purposes
    pub fn with_clock<D>(self, clock: D) -> KeyedTokenCache<D> {
        KeyedTokenCache {
            config: self.config,
            token_fn: self.token_fn,
            clock,
            caches: Mutex::new(HashMap::new()),
        }
    }
}

impl<C: Clock + Clone> KeyedTokenCache<C> {
    /// Returns a valid token for `key`, invoking the keyed token function if
    /// required
    ///
    /// Semantics per key are exactly those of
    /// [`TokenCache::ensure_token`].
    pub async fn ensure_token(&self, key: &str) -> Result<String, TokenError> {
        let cache = {
            let mut caches = self.caches.lock().await;
            match caches.get(key) {
                Some(cache) => Arc::clone(cache),
                None => {
                    let cache = Arc::new(self.cache_for(key));
                    caches.insert(key.to_string(), Arc::clone(&cache));
                    cache
                }
            }
        };

        // The map lock is released first, so fetches for distinct keys
        // proceed independently.
        cache.ensure_token().await
    }

    fn cache_for(&self, key: &str) -> TokenCache<C> {
        let token_fn = Arc::clone(&self.token_fn);
        let owned_key = key.to_string();
        let name = if self.config.name().is_empty() {
            key.to_string()
        } else {
            format!("{}/{}", self.config.name(), key)
        };

        let config = self
            .config
            .clone()
            .with_name(name)
            .with_token_function(move || token_fn(owned_key.clone()));

        TokenCache::new(config).with_clock(self.clock.clone())
    }
}

impl<C: fmt::Debug> fmt::Debug for KeyedTokenCache<C> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("KeyedTokenCache")
            .field("config", &self.config)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}
