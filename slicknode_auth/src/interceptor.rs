//! Updating stored credentials from mutation results
//!
//! Mutations that log a user in are marked with an `@authenticate` directive
//! on the root field returning the token set. The directive is a client-side
//! marker only and is removed before the document is sent downstream. A root
//! `logoutUser` field clears the stored credentials once its result arrives.

use slicknode_clock::Clock;

use crate::{
    document::{Document, OperationKind, Selection},
    error::StorageError,
    operation::{Operation, Response},
    state::TokenState,
    AuthTokenSet, TokenSetDecode,
};

/// Directive marking a mutation field whose result is a new token set
pub const AUTHENTICATE_DIRECTIVE: &str = "authenticate";

/// Root mutation field that logs the current user out
pub const LOGOUT_FIELD: &str = "logoutUser";

/// An action to take once the response to a mutation arrives
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResultListener {
    /// Clear stored credentials, regardless of the response contents
    Logout,
    /// Store the token set found at `data[response_key]`, if it is valid
    Authenticate {
        /// The alias or name of the annotated field
        response_key: String,
    },
}

impl ResultListener {
    /// Applies this listener to a response
    ///
    /// `debug` enables diagnostic logging.
    pub fn on_response<C: Clock>(
        &self,
        response: &Response,
        state: &TokenState<C>,
        debug: bool,
    ) -> Result<(), StorageError> {
        match self {
            Self::Logout => {
                if debug {
                    tracing::debug!(namespace = %state.namespace(), "logout mutation completed, clearing credentials");
                }
                state.clear()
            }
            Self::Authenticate { response_key } => {
                let decoded = response
                    .data_field(response_key)
                    .map(AuthTokenSet::decode)
                    .unwrap_or(TokenSetDecode::Invalid);

                match decoded {
                    TokenSetDecode::Valid(set) => {
                        if debug {
                            tracing::debug!(field = %response_key, "storing token set from mutation result");
                        }
                        state.set_token_set(&set)
                    }
                    TokenSetDecode::Invalid => {
                        if debug {
                            tracing::debug!(field = %response_key, "mutation result carried no valid token set");
                        }
                        Ok(())
                    }
                }
            }
        }
    }
}

/// Derives result listeners from outgoing operations
#[derive(Clone, Copy, Debug, Default)]
pub struct MutationInterceptor {
    debug: bool,
}

impl MutationInterceptor {
    /// Constructs a new interceptor
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables diagnostic logging
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Lists the listeners to run for `operation`, in field order
    ///
    /// Only the immediate fields of the executed mutation are considered.
    /// Fragments at the mutation root are not resolved and are skipped with
    /// a warning.
    pub fn listeners(&self, operation: &Operation) -> Vec<ResultListener> {
        let definition = match operation.query.operation(operation.operation_name.as_deref()) {
            Some(def) if def.kind == OperationKind::Mutation => def,
            _ => return Vec::new(),
        };

        let mut listeners = Vec::new();
        for selection in &definition.selection_set {
            let field = match selection {
                Selection::Field(field) => field,
                Selection::FragmentSpread(_) | Selection::InlineFragment(_) => {
                    tracing::warn!(
                        operation = ?definition.name,
                        "fragments on the mutation root are not supported for authentication, skipping"
                    );
                    continue;
                }
            };

            if field.name == LOGOUT_FIELD {
                if self.debug {
                    tracing::debug!(field = %field.response_key(), "registering logout listener");
                }
                listeners.push(ResultListener::Logout);
            } else if field.has_directive(AUTHENTICATE_DIRECTIVE) {
                if self.debug {
                    tracing::debug!(field = %field.response_key(), "registering authenticate listener");
                }
                listeners.push(ResultListener::Authenticate {
                    response_key: field.response_key().to_owned(),
                });
            }
        }

        listeners
    }

    /// Runs each listener against `response`, in order
    ///
    /// Stops at the first credential store failure.
    pub fn apply<C: Clock>(
        &self,
        listeners: &[ResultListener],
        response: &Response,
        state: &TokenState<C>,
    ) -> Result<(), StorageError> {
        for listener in listeners {
            listener.on_response(response, state, self.debug)?;
        }
        Ok(())
    }

    /// Removes every `@authenticate` directive from `document`
    pub fn strip_authenticate(&self, document: &mut Document) {
        let removed = document.strip_directive(AUTHENTICATE_DIRECTIVE);
        if self.debug && removed > 0 {
            tracing::debug!(removed, "stripped authenticate directives");
        }
    }
}
