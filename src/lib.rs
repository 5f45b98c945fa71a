//! Lazy caching of JWT bearer tokens with configurable expiry headroom
//!
//! A [`TokenCache`] wraps an asynchronous, caller-supplied token function and
//! hands out the same token until shortly before it expires. The token's
//! lifetime is read from its `exp` claim, and a configurable *headroom* is
//! subtracted from it so that consumers stop presenting a token a safe margin
//! before the authority stops accepting it.
//!
//! Configuration is assembled by chaining options onto a [`CacheConfig`],
//! each of which sets exactly one knob:
//!
//! ```
//! use aliri_clock::DurationSecs;
//! use jwt_cache::{CacheConfig, TokenCache};
//!
//! # async fn demo() -> Result<(), jwt_cache::TokenError> {
//! let cache = TokenCache::new(
//!     CacheConfig::default()
//!         .with_name("identity")
//!         .with_headroom(DurationSecs(30))
//!         .with_token_function(|| async {
//!             // exchange credentials with the token authority here
//!             Ok(String::from("<header>.<claims>.<signature>"))
//!         }),
//! );
//!
//! let token = cache.ensure_token().await?;
//! # drop(token);
//! # Ok(())
//! # }
//! ```
//!
//! Fetched tokens are parsed without signature verification, solely to learn
//! their lifetime and to apply any configured [claim checks][ParseOption].
//! A token that cannot be parsed is handed through uncached by default;
//! configure [`CacheConfig::with_reject_unparsable`] to treat it as an error
//! instead.
//!
//! Callers that deal with more than one token authority can use a
//! [`KeyedTokenCache`], which maintains an independently cached token per
//! string key.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]

mod cache;
pub mod claims;
mod config;
mod error;
mod keyed;
#[cfg(test)]
pub(crate) mod test_support;

pub use cache::TokenCache;
pub use claims::ParseOption;
pub use config::{CacheConfig, TokenFunction, TokenFuture};
pub use error::TokenError;
pub use keyed::{KeyedTokenCache, KeyedTokenFunction};
