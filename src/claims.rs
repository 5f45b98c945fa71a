//! Inspection and validation of token claims
//!
//! Tokens handed back by a token function are peeked at, without signature
//! verification, to learn their expiry and to apply any configured claim
//! checks. The cache trusts the token function it was given; parsing exists
//! only to decide how long a token may be served from the cache.

use aliri_base64::Base64Url;
use aliri_clock::{Clock, DurationSecs, UnixTime};
use serde::{Deserialize, Deserializer};
use thiserror::Error;

/// A single claim check applied when a fetched token is parsed
///
/// Options are applied in order. Scalar settings take their last occurrence;
/// `Issuer` and `Audience` extend the respective allowed sets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParseOption {
    /// Requires the `iss` claim to equal the given issuer
    Issuer(String),
    /// Adds an audience the `aud` claim must intersect
    Audience(String),
    /// Grace period applied on either side of the `exp` and `nbf` checks
    Leeway(DurationSecs),
    /// Toggles rejection of expired tokens (off by default)
    ValidateExpiry(bool),
    /// Toggles rejection of not-yet-valid tokens (off by default)
    ValidateNotBefore(bool),
}

/// The subset of token claims inspected by the cache
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Claims {
    #[serde(default)]
    exp: Option<UnixTime>,
    #[serde(default)]
    nbf: Option<UnixTime>,
    #[serde(default)]
    iss: Option<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    aud: Vec<String>,
}

impl Claims {
    /// The token's expiry (`exp`), if present
    pub fn exp(&self) -> Option<UnixTime> {
        self.exp
    }

    /// The time before which the token is not valid (`nbf`), if present
    pub fn nbf(&self) -> Option<UnixTime> {
        self.nbf
    }

    /// The token's issuer (`iss`), if present
    pub fn iss(&self) -> Option<&str> {
        self.iss.as_deref()
    }

    /// The token's audiences (`aud`)
    ///
    /// Both the single-string and array JSON forms are accepted; an absent
    /// claim yields an empty slice.
    pub fn aud(&self) -> &[String] {
        &self.aud
    }
}

fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Aud {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<Aud>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(Aud::One(aud)) => vec![aud],
        Some(Aud::Many(auds)) => auds,
    })
}

/// An error while parsing a token
#[derive(Debug, Error)]
pub enum ParseError {
    /// The token is not a three-segment compact JWT
    #[error("malformed JWT")]
    Malformed,

    /// The payload segment is not base64 or does not hold valid claims JSON
    #[error("malformed JWT payload")]
    MalformedPayload(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),

    /// The claims were rejected by the configured checks
    #[error("token rejected by claims validation")]
    ClaimsRejected(#[from] ClaimsRejected),
}

/// An error occurring when validating the claims of a token
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum ClaimsRejected {
    /// The token issuer is not acceptable
    #[error("invalid issuer")]
    InvalidIssuer,

    /// The token audience is not acceptable
    #[error("invalid audience")]
    InvalidAudience,

    /// The token is expired according to the `exp` claim
    #[error("token expired")]
    TokenExpired,

    /// The token is not yet valid according to the `nbf` claim
    #[error("token not yet valid")]
    TokenNotYetValid,

    /// A required claim is missing
    #[error("required {_0} claim missing")]
    MissingRequiredClaim(&'static str),
}

#[derive(Debug)]
struct ValidationPlan {
    issuer: Option<String>,
    audiences: Vec<String>,
    leeway: DurationSecs,
    validate_exp: bool,
    validate_nbf: bool,
}

impl ValidationPlan {
    fn from_options(options: &[ParseOption]) -> Self {
        let mut plan = Self {
            issuer: None,
            audiences: Vec::new(),
            leeway: DurationSecs(0),
            validate_exp: false,
            validate_nbf: false,
        };

        for option in options {
            match option {
                ParseOption::Issuer(issuer) => plan.issuer = Some(issuer.clone()),
                ParseOption::Audience(audience) => plan.audiences.push(audience.clone()),
                ParseOption::Leeway(leeway) => plan.leeway = *leeway,
                ParseOption::ValidateExpiry(validate) => plan.validate_exp = *validate,
                ParseOption::ValidateNotBefore(validate) => plan.validate_nbf = *validate,
            }
        }

        plan
    }

    fn validate(&self, claims: &Claims, now: UnixTime) -> Result<(), ClaimsRejected> {
        if self.validate_exp {
            match claims.exp() {
                Some(exp) if exp.0 < now.0.saturating_sub(self.leeway.0) => {
                    return Err(ClaimsRejected::TokenExpired)
                }
                None => return Err(ClaimsRejected::MissingRequiredClaim("exp")),
                _ => {}
            }
        }

        if self.validate_nbf {
            match claims.nbf() {
                Some(nbf) if nbf.0 > now.0.saturating_add(self.leeway.0) => {
                    return Err(ClaimsRejected::TokenNotYetValid)
                }
                None => return Err(ClaimsRejected::MissingRequiredClaim("nbf")),
                _ => {}
            }
        }

        if let Some(expected) = &self.issuer {
            match claims.iss() {
                Some(iss) if iss == expected => {}
                Some(_) => return Err(ClaimsRejected::InvalidIssuer),
                None => return Err(ClaimsRejected::MissingRequiredClaim("iss")),
            }
        }

        if !self.audiences.is_empty() {
            if claims.aud().is_empty() {
                return Err(ClaimsRejected::MissingRequiredClaim("aud"));
            }

            let found = claims
                .aud()
                .iter()
                .any(|aud| self.audiences.iter().any(|allowed| aud == allowed));
            if !found {
                return Err(ClaimsRejected::InvalidAudience);
            }
        }

        Ok(())
    }
}

/// Decomposes a compact JWT and validates its claims against `options`
pub(crate) fn parse<C: Clock>(
    token: &str,
    options: &[ParseOption],
    clock: &C,
) -> Result<Claims, ParseError> {
    let mut segments = token.split('.');
    let payload = match (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) {
        (Some(_header), Some(payload), Some(_signature), None) => payload,
        _ => return Err(ParseError::Malformed),
    };

    let raw =
        Base64Url::from_encoded(payload).map_err(|err| ParseError::MalformedPayload(err.into()))?;
    let claims =
        serde_json::from_slice(raw.as_slice()).map_err(|err| ParseError::MalformedPayload(err.into()))?;

    ValidationPlan::from_options(options).validate(&claims, clock.now())?;

    Ok(claims)
}
