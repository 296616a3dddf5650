use serde::{Deserialize, Serialize};
use serde_json::Value;
use slicknode_clock::DurationMillis;

use crate::{AccessToken, RefreshToken};

/// A token set as returned by the API when logging in or refreshing
///
/// Lifetimes are expressed in seconds relative to the moment the set is
/// stored.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthTokenSet {
    /// The new access token
    pub access_token: AccessToken,
    /// Seconds until the access token expires
    pub access_token_lifetime: f64,
    /// The new refresh token
    pub refresh_token: RefreshToken,
    /// Seconds until the refresh token expires
    pub refresh_token_lifetime: f64,
}

/// The outcome of decoding an untrusted token set payload
#[derive(Clone, Debug)]
pub enum TokenSetDecode {
    /// Every member was present with the expected type
    Valid(AuthTokenSet),
    /// The payload was missing, not an object, or had a mistyped member
    Invalid,
}

impl AuthTokenSet {
    /// Constructs a token set
    pub fn new(
        access_token: impl Into<String>,
        access_token_lifetime: f64,
        refresh_token: impl Into<String>,
        refresh_token_lifetime: f64,
    ) -> Self {
        Self {
            access_token: AccessToken::new(access_token.into()),
            access_token_lifetime,
            refresh_token: RefreshToken::new(refresh_token.into()),
            refresh_token_lifetime,
        }
    }

    /// Decodes a token set from a response payload
    ///
    /// `accessToken` and `refreshToken` must be strings, the lifetimes must be
    /// numbers. Anything else rejects the whole set.
    pub fn decode(value: &Value) -> TokenSetDecode {
        if !value.is_object() {
            return TokenSetDecode::Invalid;
        }

        match Self::deserialize(value) {
            Ok(set) => TokenSetDecode::Valid(set),
            Err(error) => {
                tracing::trace!(%error, "rejected token set payload");
                TokenSetDecode::Invalid
            }
        }
    }

    /// The access token lifetime in milliseconds
    pub fn access_token_lifetime_millis(&self) -> DurationMillis {
        DurationMillis::from_secs_f64(self.access_token_lifetime)
    }

    /// The refresh token lifetime in milliseconds
    pub fn refresh_token_lifetime_millis(&self) -> DurationMillis {
        DurationMillis::from_secs_f64(self.refresh_token_lifetime)
    }
}

impl TokenSetDecode {
    /// Returns the decoded set, if valid
    pub fn into_valid(self) -> Option<AuthTokenSet> {
        match self {
            Self::Valid(set) => Some(set),
            Self::Invalid => None,
        }
    }
}
