use jsonrpsee::types::{ErrorObject, ErrorObjectOwned};
use thiserror::Error;

/// Failure taxonomy for the verification/dispatch pipeline. Every variant
/// maps to a distinct JSON-RPC error code on the wire.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("volunteer {volunteer_id} holds no active assignment for report {report_id}")]
    NotAssigned { report_id: i64, volunteer_id: i64 },

    #[error("volunteer {volunteer_id} already voted on report {report_id}")]
    DuplicateVote { report_id: i64, volunteer_id: i64 },

    #[error("report {} is no longer pending", _0)]
    AlreadyFinalized(i64),

    #[error("{}", _0)]
    Validation(String),

    #[error("{} {} not found", _0, _1)]
    NotFound(&'static str, i64),

    #[error("external service failure: {}", _0)]
    ExternalService(String),

    #[error(transparent)]
    Store(#[from] sqlx::Error),
}

impl DispatchError {
    pub fn code(&self) -> i32 {
        match self {
            DispatchError::NotAssigned { .. } => -32001,
            DispatchError::DuplicateVote { .. } => -32002,
            DispatchError::AlreadyFinalized(_) => -32003,
            DispatchError::Validation(_) => -32004,
            DispatchError::NotFound(..) => -32005,
            DispatchError::ExternalService(_) => -32006,
            DispatchError::Store(_) => -32010,
        }
    }
}

impl From<routing::geo::GeoError> for DispatchError {
    fn from(err: routing::geo::GeoError) -> Self {
        DispatchError::Validation(err.to_string())
    }
}

impl From<DispatchError> for ErrorObjectOwned {
    fn from(err: DispatchError) -> Self {
        ErrorObject::owned(err.code(), err.to_string(), None::<()>)
    }
}
