//! Request errors.

use hyper::StatusCode;
use thiserror::Error;

use crate::database;
use crate::database::timerange;

/// Everything a request can fail with. Each variant has a stable
/// string code and status; the message is the human-readable half of
/// the JSON error body.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("We encountered an internal error. Please try again.")]
    Internal,

    #[error("Queried database doesn't exist.")]
    InvalidDatabaseName,

    #[error("Invalid JSON in request body. Please check and retry.")]
    InvalidJson,

    #[error("Property to group by is not allowed. Please check the documentation and retry.")]
    InvalidProperty,

    #[error("Wrong time format in query. Please check the documentation and retry.")]
    InvalidTimeFormat,

    #[error("Wrong interval in query. Please check the documentation and retry.")]
    InvalidInterval,

    #[error("Failed to insert analytics.")]
    InsertFailed,

    #[error("Invalid authorization header.")]
    InvalidAuthentication,

    #[error("User is not authorized to use the service.")]
    InvalidCredentials,
}

impl RequestError {
    pub fn code(&self) -> &'static str {
        match self {
            RequestError::Internal => "InternalError",
            RequestError::InvalidDatabaseName => "InvalidDatabaseName",
            RequestError::InvalidJson => "InvalidJSON",
            RequestError::InvalidProperty => "InvalidProperty",
            RequestError::InvalidTimeFormat => "InvalidTimeFormat",
            RequestError::InvalidInterval => "InvalidInterval",
            RequestError::InsertFailed => "InsertFailed",
            RequestError::InvalidAuthentication => "InvalidAuthentication",
            RequestError::InvalidCredentials => "InvalidCredentials",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            RequestError::Internal | RequestError::InsertFailed => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            RequestError::InvalidDatabaseName
            | RequestError::InvalidJson
            | RequestError::InvalidAuthentication => StatusCode::BAD_REQUEST,
            RequestError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            RequestError::InvalidProperty
            | RequestError::InvalidTimeFormat
            | RequestError::InvalidInterval => StatusCode::METHOD_NOT_ALLOWED,
        }
    }
}

impl From<database::Error> for RequestError {
    fn from(err: database::Error) -> Self {
        match err {
            database::Error::Internal => RequestError::Internal,
            database::Error::InvalidDatabaseName => RequestError::InvalidDatabaseName,
            database::Error::InsertFailed => RequestError::InsertFailed,
        }
    }
}

impl From<timerange::Error> for RequestError {
    fn from(_: timerange::Error) -> Self {
        RequestError::InvalidTimeFormat
    }
}
