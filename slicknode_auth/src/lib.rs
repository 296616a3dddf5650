//! Authentication middleware for Slicknode API clients
//!
//! This library sits in a client's request chain and takes care of the
//! Slicknode authentication flow, so that the code issuing requests need not
//! be aware of tokens at all.
//!
//! For every request, the link attaches an `Authorization: Bearer` header when
//! a valid access token is known. When the access token has expired but a
//! refresh token is still valid, the link first exchanges the refresh token
//! for a new token set. Concurrent requests that find the access token expired
//! share a single refresh. If the refresh fails, the stored credentials are
//! cleared and the request proceeds anonymously.
//!
//! The link also watches mutation results. A root mutation field annotated
//! with `@authenticate` is expected to return a token set, which is stored
//! once the response arrives. The directive is removed before the document is
//! sent to the API. A root `logoutUser` field clears the stored credentials.
//!
//! Credentials are kept in a [`CredentialStore`](storage::CredentialStore)
//! under keys prefixed with a namespace, so that several links can share a
//! single backend.
//!
//! ```
//! use std::sync::Arc;
//!
//! use futures::{stream, StreamExt};
//! use slicknode_auth::{
//!     document::{Directive, Field, OperationDefinition, OperationKind},
//!     operation::{Forward, Operation, Response, ResponseStream},
//!     AuthLink,
//! };
//!
//! # #[tokio::main(flavor = "current_thread")] async fn main() {
//! let link = AuthLink::in_memory();
//!
//! let api: Arc<dyn Forward> = Arc::new(|_: Operation| -> ResponseStream {
//!     stream::once(async {
//!         Ok(Response::from_data(serde_json::json!({
//!             "loginEmailPassword": {
//!                 "accessToken": "access",
//!                 "accessTokenLifetime": 3600,
//!                 "refreshToken": "refresh",
//!                 "refreshTokenLifetime": 86400,
//!             }
//!         })))
//!     })
//!     .boxed()
//! });
//!
//! let login = Operation::new(
//!     OperationDefinition::new(OperationKind::Mutation).with_selection(
//!         Field::new("loginEmailPassword")
//!             .with_directive(Directive::new("authenticate"))
//!             .with_selection(Field::new("accessToken")),
//!     ),
//! );
//!
//! let responses: Vec<_> = link.request(login, Some(api)).unwrap().collect().await;
//!
//! assert!(responses[0].is_ok());
//! assert!(link.has_access_token().unwrap());
//! # }
//! ```

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

mod braids;
pub mod coordinator;
pub mod document;
pub mod error;
pub mod interceptor;
pub mod link;
pub mod operation;
pub mod state;
pub mod storage;
mod tokens;

pub use braids::*;
pub use error::{Error, StorageError};
pub use link::{AuthLink, AuthLinkBuilder, LinkOptions, StorageOptions};
pub use tokens::{AuthTokenSet, TokenSetDecode};
