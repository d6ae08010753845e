//! Error types, one enum per concern
//!
//! Validation errors surface synchronously to the order submitter (the REST
//! adapter maps them to 4xx); store and quote errors stay inside the engines
//! and are logged where they cannot be propagated.

use thiserror::Error;

/// Pre-trade and order-intake validation failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("insufficient account funds")]
    InsufficientFunds,

    #[error("no positions available")]
    NoPositionsAvailable,

    #[error("not enough available positions")]
    NotEnoughAvailablePositions,

    #[error("invalid order exchange: {0}")]
    InvalidExchange(String),

    #[error("account is terminated")]
    AccountTerminated,
}

/// Durable-store and fast-store access failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("entity does not exist")]
    EntityDoesNotExist,

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Quote-feed failures. `EntityNotFound` is terminal for the lookup;
/// the rest are transient.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QuotesError {
    #[error("security `{0}` not found")]
    EntityNotFound(String),

    #[error("quote request timed out")]
    Timeout,

    #[error("quote transport failed: {0}")]
    Transport(String),

    #[error("malformed tick payload for `{0}`")]
    Malformed(String),
}

/// Bearer-token authentication failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("authorization header not found")]
    AuthHeaderNotFound,

    #[error("wrong token format")]
    WrongTokenFormat,

    #[error("invalid authorization token prefix")]
    InvalidAuthTokenPrefix,

    #[error("invalid authorization token")]
    InvalidAuthToken,

    #[error("invalid user id")]
    InvalidUserID,
}

/// Order submission failures as seen by the caller of the main engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrderError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
