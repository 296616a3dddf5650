//! The link entry point

use std::{fmt, sync::Arc};

#[cfg(feature = "file")]
use std::path::PathBuf;

use futures::{stream, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use slicknode_clock::{Clock, System, UnixTime};

use crate::{
    coordinator::{AuthHeaders, RefreshCoordinator},
    error::{Error, StorageError},
    interceptor::MutationInterceptor,
    operation::{Forward, Operation, Response, ResponseStream},
    state::{TokenState, DEFAULT_NAMESPACE},
    storage::{CredentialStore, InMemoryStore},
    AccessToken, AuthTokenSet, RefreshToken,
};

/// Link that authenticates requests and keeps stored credentials current
///
/// Cloning is cheap; clones share the same coordinator, so concurrent
/// requests through any clone still share a single refresh.
///
/// Requests must be issued from within a tokio runtime, as refreshes run on
/// their own task.
pub struct AuthLink<C = System> {
    inner: Arc<LinkInner<C>>,
}

struct LinkInner<C> {
    state: Arc<TokenState<C>>,
    coordinator: RefreshCoordinator<C>,
    interceptor: MutationInterceptor,
}

impl<C> Clone for AuthLink<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl AuthLink<System> {
    /// Constructs a link over `store` with default settings
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self::builder(store).build()
    }

    /// Starts configuring a link over `store`
    pub fn builder(store: Arc<dyn CredentialStore>) -> AuthLinkBuilder<System> {
        AuthLinkBuilder {
            store,
            namespace: DEFAULT_NAMESPACE.to_owned(),
            access_token: None,
            debug: false,
            clock: System,
        }
    }

    /// Constructs a link with credentials held in process memory
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryStore::new()))
    }

    /// Constructs a link from deserialized options
    pub fn from_options(options: LinkOptions) -> Self {
        let store: Arc<dyn CredentialStore> = match options.storage {
            StorageOptions::Memory => Arc::new(InMemoryStore::new()),
            #[cfg(feature = "file")]
            StorageOptions::File { path } => Arc::new(crate::storage::FileStore::new(path)),
        };

        let mut builder = Self::builder(store).with_debug(options.debug);
        if let Some(namespace) = options.namespace {
            builder = builder.with_namespace(namespace);
        }
        if let Some(token) = options.access_token {
            builder = builder.with_access_token(token);
        }
        builder.build()
    }
}

impl Default for AuthLink<System> {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl<C> AuthLink<C> {
    /// The token state accessor backing this link
    pub fn token_state(&self) -> &TokenState<C> {
        &self.inner.state
    }

    /// Stores the access token expiry; `None` invalidates the access token
    pub fn set_access_token_expiry(&self, expiry: Option<UnixTime>) -> Result<(), StorageError> {
        self.inner.state.set_access_token_expiry(expiry)
    }

    /// Stores the refresh token expiry; `None` is stored as already expired
    pub fn set_refresh_token_expiry(&self, expiry: Option<UnixTime>) -> Result<(), StorageError> {
        self.inner.state.set_refresh_token_expiry(expiry)
    }

    /// Gets the stored access token expiry
    pub fn access_token_expiry(&self) -> Result<Option<UnixTime>, StorageError> {
        self.inner.state.access_token_expiry()
    }

    /// Gets the stored refresh token expiry
    pub fn refresh_token_expiry(&self) -> Result<Option<UnixTime>, StorageError> {
        self.inner.state.refresh_token_expiry()
    }

    /// Removes all stored credentials
    pub fn logout(&self) -> Result<(), StorageError> {
        self.inner.state.clear()
    }
}

impl<C: Clock> AuthLink<C> {
    /// Whether a valid access token is stored
    pub fn has_access_token(&self) -> Result<bool, StorageError> {
        self.inner.state.has_access_token()
    }

    /// Whether a valid refresh token is stored
    pub fn has_refresh_token(&self) -> Result<bool, StorageError> {
        self.inner.state.has_refresh_token()
    }

    /// Gets the stored access token, if still valid
    pub fn access_token(&self) -> Result<Option<AccessToken>, StorageError> {
        self.inner.state.access_token()
    }

    /// Gets the stored refresh token, if still valid
    pub fn refresh_token(&self) -> Result<Option<RefreshToken>, StorageError> {
        self.inner.state.refresh_token()
    }

    /// Stores a token set obtained outside of the link
    pub fn set_auth_token_set(&self, set: &AuthTokenSet) -> Result<(), StorageError> {
        self.inner.state.set_token_set(set)
    }
}

impl<C> AuthLink<C>
where
    C: Clock + Send + Sync + 'static,
{
    /// Resolves the headers the next request would carry
    ///
    /// May refresh the access token through `forward`.
    pub async fn auth_headers(&self, forward: &Arc<dyn Forward>) -> Result<AuthHeaders, Error> {
        Ok(self.inner.coordinator.auth_headers(forward).await?)
    }

    /// Handles a request
    ///
    /// Without a downstream handler the link cannot do anything useful and
    /// fails immediately. Otherwise the returned stream resolves headers,
    /// forwards the request with the `@authenticate` marker removed, and
    /// applies any login/logout results to the stored credentials before
    /// relaying each response.
    pub fn request(
        &self,
        mut operation: Operation,
        forward: Option<Arc<dyn Forward>>,
    ) -> Result<ResponseStream, Error> {
        let forward = forward.ok_or(Error::MissingForward)?;
        let inner = self.inner.clone();
        let listeners = inner.interceptor.listeners(&operation);

        let forwarded = async move {
            let headers = inner.coordinator.auth_headers(&forward).await?;
            headers.apply_to(&mut operation.context.headers);
            inner.interceptor.strip_authenticate(&mut operation.query);

            let state = inner.state.clone();
            let interceptor = inner.interceptor;
            let responses = forward.forward(operation).map(
                move |item: Result<Response, Error>| -> Result<Response, Error> {
                    let response = item?;
                    interceptor.apply(&listeners, &response, &state)?;
                    Ok(response)
                },
            );

            Ok::<_, Error>(responses)
        };

        Ok(stream::once(forwarded).try_flatten().boxed())
    }
}

impl<C: fmt::Debug> fmt::Debug for AuthLink<C> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("AuthLink")
            .field("coordinator", &self.inner.coordinator)
            .field("interceptor", &self.inner.interceptor)
            .finish()
    }
}

/// Configures an [`AuthLink`]
pub struct AuthLinkBuilder<C> {
    store: Arc<dyn CredentialStore>,
    namespace: String,
    access_token: Option<AccessToken>,
    debug: bool,
    clock: C,
}

impl<C> AuthLinkBuilder<C> {
    /// Sets the prefix for every storage key
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Always authorizes with `token`, ignoring stored credentials entirely
    pub fn with_access_token(mut self, token: AccessToken) -> Self {
        self.access_token = Some(token);
        self
    }

    /// Enables diagnostic logging
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Sets a custom clock to be used
    ///
    /// Useful for testing purposes
    pub fn with_clock<D>(self, clock: D) -> AuthLinkBuilder<D> {
        AuthLinkBuilder {
            store: self.store,
            namespace: self.namespace,
            access_token: self.access_token,
            debug: self.debug,
            clock,
        }
    }

    /// Builds the link
    pub fn build(self) -> AuthLink<C> {
        let state = Arc::new(TokenState::new(self.store, self.namespace).with_clock(self.clock));

        let mut coordinator = RefreshCoordinator::new(state.clone()).with_debug(self.debug);
        if let Some(token) = self.access_token {
            coordinator = coordinator.with_static_token(token);
        }

        AuthLink {
            inner: Arc::new(LinkInner {
                state,
                coordinator,
                interceptor: MutationInterceptor::new().with_debug(self.debug),
            }),
        }
    }
}

impl<C: fmt::Debug> fmt::Debug for AuthLinkBuilder<C> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("AuthLinkBuilder")
            .field("namespace", &self.namespace)
            .field("access_token", &self.access_token)
            .field("debug", &self.debug)
            .field("clock", &self.clock)
            .finish()
    }
}

/// Serializable link configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LinkOptions {
    /// Where credentials are kept
    pub storage: StorageOptions,
    /// Prefix for every storage key; `slicknode` when absent
    pub namespace: Option<String>,
    /// A fixed access token that bypasses stored credentials
    pub access_token: Option<AccessToken>,
    /// Enables diagnostic logging
    pub debug: bool,
}

/// Storage backend selection
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageOptions {
    /// Keep credentials in process memory
    #[default]
    Memory,
    /// Persist credentials to a JSON file
    #[cfg(feature = "file")]
    File {
        /// The file path
        path: PathBuf,
    },
}
