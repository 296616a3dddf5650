//! Reading and writing the stored token state

use std::{fmt, sync::Arc};

use slicknode_clock::{Clock, System, UnixTime};

use crate::{
    error::StorageError, storage::CredentialStore, AccessToken, AuthTokenSet, RefreshToken,
};

/// The namespace used when none is configured
pub const DEFAULT_NAMESPACE: &str = "slicknode";

#[derive(Clone, Debug)]
struct StorageKeys {
    access_token: String,
    access_token_expires: String,
    refresh_token: String,
    refresh_token_expires: String,
}

impl StorageKeys {
    fn new(namespace: &str) -> Self {
        Self {
            access_token: format!("{namespace}:auth:accessToken"),
            access_token_expires: format!("{namespace}:auth:accessTokenExpires"),
            refresh_token: format!("{namespace}:auth:refreshToken"),
            refresh_token_expires: format!("{namespace}:auth:refreshTokenExpires"),
        }
    }
}

/// Accessor for the four stored credential fields
///
/// Every call goes straight to the underlying [`CredentialStore`]; nothing is
/// cached here. A token is only handed out while its expiry lies strictly in
/// the future according to the configured clock.
pub struct TokenState<C = System> {
    store: Arc<dyn CredentialStore>,
    namespace: String,
    keys: StorageKeys,
    clock: C,
}

impl TokenState<System> {
    /// Constructs an accessor over `store` using keys prefixed by `namespace`
    pub fn new(store: Arc<dyn CredentialStore>, namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        Self {
            store,
            keys: StorageKeys::new(&namespace),
            namespace,
            clock: System,
        }
    }
}

impl<C> TokenState<C> {
    /// Sets a custom clock to be used
    ///
    /// Useful for testing purposes
    pub fn with_clock<D>(self, clock: D) -> TokenState<D> {
        TokenState {
            store: self.store,
            namespace: self.namespace,
            keys: self.keys,
            clock,
        }
    }

    /// The namespace prefixed to every key
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Stores a new access token without touching its expiry
    pub fn set_access_token(&self, token: &AccessToken) -> Result<(), StorageError> {
        self.store.write(&self.keys.access_token, token.as_str())
    }

    /// Stores the access token expiry
    ///
    /// `None` removes the stored expiry, which invalidates the access token
    /// immediately.
    pub fn set_access_token_expiry(&self, expiry: Option<UnixTime>) -> Result<(), StorageError> {
        match expiry {
            Some(time) => self
                .store
                .write(&self.keys.access_token_expires, &time.0.to_string()),
            None => self.store.remove(&self.keys.access_token_expires),
        }
    }

    /// Stores a new refresh token without touching its expiry
    pub fn set_refresh_token(&self, token: &RefreshToken) -> Result<(), StorageError> {
        self.store.write(&self.keys.refresh_token, token.as_str())
    }

    /// Stores the refresh token expiry
    ///
    /// Unlike the access token expiry, the key is never removed: `None` is
    /// written as `0`, which reads back as already expired.
    pub fn set_refresh_token_expiry(&self, expiry: Option<UnixTime>) -> Result<(), StorageError> {
        let value = expiry.unwrap_or(UnixTime::EPOCH);
        self.store
            .write(&self.keys.refresh_token_expires, &value.0.to_string())
    }

    /// Gets the stored access token expiry, if any
    pub fn access_token_expiry(&self) -> Result<Option<UnixTime>, StorageError> {
        self.read_time(&self.keys.access_token_expires)
    }

    /// Gets the stored refresh token expiry, if any
    pub fn refresh_token_expiry(&self) -> Result<Option<UnixTime>, StorageError> {
        self.read_time(&self.keys.refresh_token_expires)
    }

    /// Removes all four credential fields
    ///
    /// Each key is removed independently. If any removal fails, the remaining
    /// keys are still attempted and the first failure is returned.
    pub fn clear(&self) -> Result<(), StorageError> {
        let keys = [
            &self.keys.access_token,
            &self.keys.access_token_expires,
            &self.keys.refresh_token,
            &self.keys.refresh_token_expires,
        ];

        let mut first_error = None;
        for key in keys {
            if let Err(error) = self.store.remove(key) {
                tracing::warn!(
                    key = %key,
                    error = (&error as &dyn std::error::Error),
                    "unable to remove stored credential"
                );
                first_error.get_or_insert(error);
            }
        }

        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn read_time(&self, key: &str) -> Result<Option<UnixTime>, StorageError> {
        let raw = match self.store.read(key)? {
            Some(raw) => raw,
            None => return Ok(None),
        };

        match raw.trim().parse::<u64>() {
            Ok(millis) => Ok(Some(UnixTime(millis))),
            Err(_) => {
                tracing::debug!(key = %key, "ignoring unparseable expiry");
                Ok(None)
            }
        }
    }
}

impl<C: Clock> TokenState<C> {
    /// Gets the access token if it is present and not yet expired
    pub fn access_token(&self) -> Result<Option<AccessToken>, StorageError> {
        let token = self.read_valid(&self.keys.access_token, &self.keys.access_token_expires)?;
        Ok(token.map(AccessToken::new))
    }

    /// Gets the refresh token if it is present and not yet expired
    pub fn refresh_token(&self) -> Result<Option<RefreshToken>, StorageError> {
        let token = self.read_valid(&self.keys.refresh_token, &self.keys.refresh_token_expires)?;
        Ok(token.map(RefreshToken::new))
    }

    /// Whether a valid access token is stored
    pub fn has_access_token(&self) -> Result<bool, StorageError> {
        Ok(self.access_token()?.is_some())
    }

    /// Whether a valid refresh token is stored
    pub fn has_refresh_token(&self) -> Result<bool, StorageError> {
        Ok(self.refresh_token()?.is_some())
    }

    /// Stores a complete token set
    ///
    /// Both expiries are computed from a single reading of the clock.
    pub fn set_token_set(&self, set: &AuthTokenSet) -> Result<(), StorageError> {
        let now = self.clock.now();

        self.set_access_token(&set.access_token)?;
        self.set_access_token_expiry(Some(now + set.access_token_lifetime_millis()))?;
        self.set_refresh_token(&set.refresh_token)?;
        self.set_refresh_token_expiry(Some(now + set.refresh_token_lifetime_millis()))?;

        tracing::trace!(
            namespace = %self.namespace,
            access_token = ?set.access_token,
            access_token_lifetime = set.access_token_lifetime,
            refresh_token_lifetime = set.refresh_token_lifetime,
            "stored new token set"
        );

        Ok(())
    }

    fn read_valid(&self, key: &str, expiry_key: &str) -> Result<Option<String>, StorageError> {
        let expiry = self.read_time(expiry_key)?.unwrap_or(UnixTime::EPOCH);
        if expiry <= self.clock.now() {
            return Ok(None);
        }

        self.store.read(key)
    }
}

impl<C: fmt::Debug> fmt::Debug for TokenState<C> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("TokenState")
            .field("namespace", &self.namespace)
            .field("clock", &self.clock)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use slicknode_clock::TestClock;

    use super::*;
    use crate::storage::InMemoryStore;

    const NOW: UnixTime = UnixTime(1_600_000_000_000);

    fn prepare_state() -> (Arc<InMemoryStore>, TestClock, TokenState<TestClock>) {
        let store = Arc::new(InMemoryStore::new());
        let clock = TestClock::new(NOW);
        let state = TokenState::new(store.clone(), "test").with_clock(clock.clone());
        (store, clock, state)
    }

    #[test]
    fn keys_are_namespaced() {
        let (store, _, state) = prepare_state();
        state
            .set_token_set(&AuthTokenSet::new("a", 20.0, "r", 100.0))
            .unwrap();

        assert_eq!(store.read("test:auth:accessToken").unwrap().as_deref(), Some("a"));
        assert_eq!(store.read("test:auth:refreshToken").unwrap().as_deref(), Some("r"));
        assert_eq!(
            store.read("test:auth:accessTokenExpires").unwrap().as_deref(),
            Some("1600000020000")
        );
        assert_eq!(
            store.read("test:auth:refreshTokenExpires").unwrap().as_deref(),
            Some("1600000100000")
        );
    }

    #[test]
    fn token_set_round_trips() {
        let (_, _, state) = prepare_state();
        state
            .set_token_set(&AuthTokenSet::new("a", 20.0, "r", 100.0))
            .unwrap();

        assert_eq!(state.access_token().unwrap().unwrap().as_str(), "a");
        assert_eq!(state.refresh_token().unwrap().unwrap().as_str(), "r");
        assert_eq!(
            state.access_token_expiry().unwrap(),
            Some(UnixTime(NOW.0 + 20_000))
        );
        assert_eq!(
            state.refresh_token_expiry().unwrap(),
            Some(UnixTime(NOW.0 + 100_000))
        );
    }

    mod expiry_boundary {
        use super::*;

        #[test]
        fn token_expiring_now_is_invalid() {
            let (_, _, state) = prepare_state();
            state.set_access_token(&AccessToken::from_static("a")).unwrap();
            state.set_access_token_expiry(Some(NOW)).unwrap();

            assert!(state.access_token().unwrap().is_none());
            assert!(!state.has_access_token().unwrap());
        }

        #[test]
        fn token_expiring_next_millisecond_is_valid() {
            let (_, _, state) = prepare_state();
            state.set_access_token(&AccessToken::from_static("a")).unwrap();
            state.set_access_token_expiry(Some(UnixTime(NOW.0 + 1))).unwrap();

            assert!(state.has_access_token().unwrap());
        }

        #[test]
        fn advancing_the_clock_expires_the_token() {
            let (_, clock, state) = prepare_state();
            state
                .set_token_set(&AuthTokenSet::new("a", 20.0, "r", 100.0))
                .unwrap();

            clock.inc(19_999);
            assert!(state.has_access_token().unwrap());
            clock.inc(1);
            assert!(!state.has_access_token().unwrap());
            assert!(state.has_refresh_token().unwrap());
        }

        #[test]
        fn token_without_expiry_is_invalid() {
            let (_, _, state) = prepare_state();
            state.set_refresh_token(&RefreshToken::from_static("r")).unwrap();

            assert!(!state.has_refresh_token().unwrap());
        }

        #[test]
        fn unparseable_expiry_is_invalid() {
            let (store, _, state) = prepare_state();
            store.write("test:auth:accessToken", "a").unwrap();
            store.write("test:auth:accessTokenExpires", "soon").unwrap();

            assert_eq!(state.access_token_expiry().unwrap(), None);
            assert!(!state.has_access_token().unwrap());
        }
    }

    mod when_clearing_expiry {
        use super::*;

        #[test]
        fn access_expiry_key_is_removed() {
            let (store, _, state) = prepare_state();
            state
                .set_token_set(&AuthTokenSet::new("a", 20.0, "r", 100.0))
                .unwrap();

            state.set_access_token_expiry(None).unwrap();

            assert_eq!(store.read("test:auth:accessTokenExpires").unwrap(), None);
            assert_eq!(state.access_token_expiry().unwrap(), None);
            assert!(!state.has_access_token().unwrap());
        }

        #[test]
        fn refresh_expiry_is_written_as_zero() {
            let (store, _, state) = prepare_state();
            state
                .set_token_set(&AuthTokenSet::new("a", 20.0, "r", 100.0))
                .unwrap();

            state.set_refresh_token_expiry(None).unwrap();

            assert_eq!(
                store.read("test:auth:refreshTokenExpires").unwrap().as_deref(),
                Some("0")
            );
            assert!(!state.has_refresh_token().unwrap());
        }
    }

    #[test]
    fn clear_is_idempotent() {
        let (store, _, state) = prepare_state();
        state
            .set_token_set(&AuthTokenSet::new("a", 20.0, "r", 100.0))
            .unwrap();

        for _ in 0..2 {
            state.clear().unwrap();
            assert!(!state.has_access_token().unwrap());
            assert!(!state.has_refresh_token().unwrap());
        }
        assert!(store.is_empty());
    }

    #[test]
    fn clear_leaves_other_namespaces_alone() {
        let (store, _, state) = prepare_state();
        store.write("other:auth:accessToken", "keep").unwrap();
        state
            .set_token_set(&AuthTokenSet::new("a", 20.0, "r", 100.0))
            .unwrap();

        state.clear().unwrap();

        assert_eq!(store.len(), 1);
    }
}
