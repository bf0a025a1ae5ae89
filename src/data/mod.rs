use crate::error::CoreError;
use crate::store::StoreError;

pub mod assignment;
pub mod group;
pub mod user;

/// Converts a store error at an operation boundary, logging upstream failures.
pub(crate) fn store_failure(operation: &'static str) -> impl Fn(StoreError) -> CoreError {
    move |e| {
        let e = CoreError::from(e);
        if let CoreError::RemoteFailure(message) = &e {
            tracing::error!("{} failed: {}", operation, message);
        }
        e
    }
}
