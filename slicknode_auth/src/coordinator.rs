//! Single-flight resolution of authorization headers

use std::{fmt, sync::Arc};

use bytes::{BufMut, BytesMut};
use futures::StreamExt;
use http::{header, HeaderMap, HeaderValue};
use parking_lot::Mutex;
use slicknode_clock::{Clock, System};
use tokio::sync::watch;

use crate::{
    document::{Document, Field, OperationDefinition, OperationKind},
    error::StorageError,
    operation::{Forward, Operation},
    state::TokenState,
    AccessToken, AccessTokenRef, AuthTokenSet, RefreshToken, RefreshTokenRef, TokenSetDecode,
};

/// Name of the mutation field that exchanges a refresh token for a new token set
pub const REFRESH_FIELD: &str = "refreshAuthToken";

/// Headers to merge into an outgoing request
///
/// Either carries a single `Authorization: Bearer …` value or nothing at all.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AuthHeaders {
    authorization: Option<HeaderValue>,
}

impl AuthHeaders {
    /// No headers; the request proceeds unauthenticated
    pub fn none() -> Self {
        Self::default()
    }

    /// A bearer authorization header for `token`
    ///
    /// A token that cannot be represented as a header value yields no headers.
    pub fn bearer(token: &AccessTokenRef) -> Self {
        let mut header_value = BytesMut::with_capacity(token.as_str().len() + 7);
        header_value.put_slice(b"Bearer ");
        header_value.put_slice(token.as_str().as_bytes());

        match HeaderValue::from_maybe_shared(header_value.freeze()) {
            Ok(mut value) => {
                value.set_sensitive(true);
                Self {
                    authorization: Some(value),
                }
            }
            Err(_) => {
                tracing::warn!("access token is not a valid header value, sending no authorization");
                Self::none()
            }
        }
    }

    /// The authorization header value, if any
    pub fn authorization(&self) -> Option<&HeaderValue> {
        self.authorization.as_ref()
    }

    /// Whether there are no headers to merge
    pub fn is_empty(&self) -> bool {
        self.authorization.is_none()
    }

    /// Merges these headers into `headers`, replacing any existing value
    pub fn apply_to(&self, headers: &mut HeaderMap) {
        if let Some(value) = &self.authorization {
            headers.insert(header::AUTHORIZATION, value.clone());
        }
    }
}

/// Builds the operation that exchanges `token` for a new token set
///
/// The operation carries an empty context so that no stale authorization is
/// sent along with it.
pub fn refresh_operation(token: &RefreshTokenRef) -> Operation {
    let field = Field::new(REFRESH_FIELD)
        .with_arguments("input: {refreshToken: $token}")
        .with_selection(Field::new("accessToken"))
        .with_selection(Field::new("refreshToken"))
        .with_selection(Field::new("accessTokenLifetime"))
        .with_selection(Field::new("refreshTokenLifetime"));

    let document: Document = OperationDefinition::new(OperationKind::Mutation)
        .with_name("refreshToken")
        .with_variable_definitions("$token: String!")
        .with_selection(field)
        .into();

    Operation::new(document)
        .with_operation_name("refreshToken")
        .with_variable("token", token.as_str())
}

type RefreshOutcome = Result<AuthHeaders, StorageError>;

enum RefreshState {
    Idle,
    Refreshing(watch::Receiver<Option<RefreshOutcome>>),
}

/// Resolves the authorization headers for outgoing requests
///
/// When no usable access token is stored, at most one refresh is in flight at
/// any time; every caller arriving while it runs waits for the same outcome.
/// Refresh failures log out and resolve to empty headers. Only credential
/// store failures are reported as errors.
pub struct RefreshCoordinator<C = System> {
    state: Arc<TokenState<C>>,
    static_token: Option<AccessToken>,
    refresh: Arc<Mutex<RefreshState>>,
    debug: bool,
}

impl<C> RefreshCoordinator<C> {
    /// Constructs a coordinator over the given token state
    pub fn new(state: Arc<TokenState<C>>) -> Self {
        Self {
            state,
            static_token: None,
            refresh: Arc::new(Mutex::new(RefreshState::Idle)),
            debug: false,
        }
    }

    /// Always authorizes with `token`, bypassing stored and refreshed tokens
    pub fn with_static_token(mut self, token: AccessToken) -> Self {
        self.static_token = Some(token);
        self
    }

    /// Enables diagnostic logging
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Whether a refresh is currently in flight
    pub fn is_refreshing(&self) -> bool {
        matches!(*self.refresh.lock(), RefreshState::Refreshing(_))
    }
}

impl<C> RefreshCoordinator<C>
where
    C: Clock + Send + Sync + 'static,
{
    /// Resolves the headers to attach to the next request
    ///
    /// May send a refresh operation through `forward`. The refresh runs on its
    /// own task and completes even if every caller stops waiting for it.
    pub async fn auth_headers(
        &self,
        forward: &Arc<dyn Forward>,
    ) -> Result<AuthHeaders, StorageError> {
        let receiver = {
            let mut slot = self.refresh.lock();
            let in_flight = match &*slot {
                RefreshState::Refreshing(receiver) => Some(receiver.clone()),
                RefreshState::Idle => None,
            };

            match in_flight {
                Some(receiver) => {
                    if self.debug {
                        tracing::debug!("joining in-flight token refresh");
                    }
                    receiver
                }
                None => {
                    let token = match &self.static_token {
                        Some(token) => Some(token.clone()),
                        None => self.state.access_token()?,
                    };

                    if let Some(token) = token {
                        return Ok(AuthHeaders::bearer(&token));
                    }

                    let refresh_token = self.state.refresh_token()?;

                    let (tx, rx) = watch::channel(None);
                    *slot = RefreshState::Refreshing(rx.clone());

                    if self.debug {
                        tracing::debug!(
                            has_refresh_token = refresh_token.is_some(),
                            "no valid access token, starting token refresh"
                        );
                    }

                    tokio::spawn(publish_refresh(
                        self.state.clone(),
                        forward.clone(),
                        refresh_token,
                        ResetOnDrop::new(self.refresh.clone()),
                        tx,
                        self.debug,
                    ));

                    rx
                }
            }
        };

        wait_for_outcome(receiver).await
    }
}

impl<C: fmt::Debug> fmt::Debug for RefreshCoordinator<C> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("state", &self.state)
            .field("static_token", &self.static_token)
            .field("refreshing", &self.is_refreshing())
            .field("debug", &self.debug)
            .finish()
    }
}

/// Returns the coordinator to idle if the refresh task ends without doing so
struct ResetOnDrop {
    slot: Arc<Mutex<RefreshState>>,
    armed: bool,
}

impl ResetOnDrop {
    fn new(slot: Arc<Mutex<RefreshState>>) -> Self {
        Self { slot, armed: true }
    }

    fn reset(mut self) {
        self.armed = false;
        *self.slot.lock() = RefreshState::Idle;
    }
}

impl Drop for ResetOnDrop {
    fn drop(&mut self) {
        if self.armed {
            tracing::warn!("token refresh ended abnormally");
            *self.slot.lock() = RefreshState::Idle;
        }
    }
}

async fn publish_refresh<C: Clock>(
    state: Arc<TokenState<C>>,
    forward: Arc<dyn Forward>,
    refresh_token: Option<RefreshToken>,
    reset: ResetOnDrop,
    tx: watch::Sender<Option<RefreshOutcome>>,
    debug: bool,
) {
    let outcome = refresh(&state, forward, refresh_token, debug).await;

    reset.reset();

    // No receivers left is fine; the refreshed tokens are already stored.
    let _ = tx.send(Some(outcome));
}

#[tracing::instrument(
    level = "debug",
    skip_all,
    fields(namespace = %state.namespace()),
)]
async fn refresh<C: Clock>(
    state: &TokenState<C>,
    forward: Arc<dyn Forward>,
    refresh_token: Option<RefreshToken>,
    debug: bool,
) -> RefreshOutcome {
    let refresh_token = match refresh_token {
        Some(token) => token,
        None => {
            tokio::task::yield_now().await;
            if debug {
                tracing::debug!("no valid refresh token, continuing unauthenticated");
            }
            return Ok(AuthHeaders::none());
        }
    };

    let mut responses = forward.forward(refresh_operation(&refresh_token));
    let first = responses.next().await;
    drop(responses);

    let decoded = match first {
        Some(Ok(response)) => match response.data_field(REFRESH_FIELD) {
            Some(payload) => AuthTokenSet::decode(payload),
            None => {
                tracing::warn!(
                    errors = response.errors.len(),
                    "refresh response carried no token set, logging out"
                );
                TokenSetDecode::Invalid
            }
        },
        Some(Err(error)) => {
            tracing::warn!(
                error = (&error as &dyn std::error::Error),
                "error refreshing auth token, logging out"
            );
            TokenSetDecode::Invalid
        }
        None => {
            tracing::warn!("refresh completed without a response, logging out");
            TokenSetDecode::Invalid
        }
    };

    match decoded {
        TokenSetDecode::Valid(set) => {
            state.set_token_set(&set)?;
            if debug {
                tracing::debug!(
                    access_token_lifetime = set.access_token_lifetime,
                    refresh_token_lifetime = set.refresh_token_lifetime,
                    "refreshed auth token"
                );
            }
            Ok(state
                .access_token()?
                .map(|token| AuthHeaders::bearer(&token))
                .unwrap_or_default())
        }
        TokenSetDecode::Invalid => {
            state.clear()?;
            Ok(AuthHeaders::none())
        }
    }
}

async fn wait_for_outcome(
    mut receiver: watch::Receiver<Option<RefreshOutcome>>,
) -> Result<AuthHeaders, StorageError> {
    loop {
        let current: Option<RefreshOutcome> = (*receiver.borrow_and_update()).clone();
        if let Some(outcome) = current {
            return outcome;
        }

        if receiver.changed().await.is_err() {
            let last: Option<RefreshOutcome> = (*receiver.borrow()).clone();
            return last.unwrap_or_else(|| Ok(AuthHeaders::none()));
        }
    }
}
