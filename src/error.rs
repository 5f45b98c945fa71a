//! Errors produced when obtaining tokens

use thiserror::Error;

use crate::claims::ParseError;

/// An error while obtaining a token from a cache
#[derive(Debug, Error)]
pub enum TokenError {
    /// No token function has been configured
    ///
    /// This is the failure mode of the default token function; it is returned
    /// until [`CacheConfig::with_token_function`][crate::CacheConfig::with_token_function]
    /// supplies a real implementation.
    #[error("token function not implemented")]
    NotImplemented,

    /// A fetched token could not be parsed
    ///
    /// Only produced when
    /// [`CacheConfig::with_reject_unparsable`][crate::CacheConfig::with_reject_unparsable]
    /// is set; otherwise unparsable tokens are handed through uncached.
    #[error("unable to parse token")]
    Unparsable(#[source] ParseError),

    /// The token function failed
    ///
    /// Token functions use this variant to surface their own error types,
    /// which are propagated to the caller unchanged.
    #[error(transparent)]
    Fetch(#[from] Box<dyn std::error::Error + Send + Sync + 'static>),
}
