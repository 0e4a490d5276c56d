use std::sync::Arc;

use thiserror::Error;

use crate::class_instance::ClassInstance;

/// Failures the running program can never catch. Malformed input stops a
/// load before anything is registered; internal inconsistencies unwind
/// straight to the host, bypassing every exception table.
#[derive(Debug, Error)]
pub enum VmError {
    #[error("class not found: {0}")]
    ClassNotFound(String),
    #[error("malformed class {name}: {message}")]
    MalformedClass { name: String, message: String },
    #[error("circular super chain through {0}")]
    CircularClass(String),
    #[error("[internal] {0}")]
    Internal(String),
}

/// Non-normal completion of a VM operation. `Thrown` travels frame to
/// frame until an exception-table entry matches or the host is reached;
/// `Fault` is never matched against exception tables.
#[derive(Debug)]
pub enum Flow {
    Thrown(Arc<ClassInstance>),
    Fault(VmError),
}

impl From<VmError> for Flow {
    fn from(error: VmError) -> Flow {
        Flow::Fault(error)
    }
}

pub type VmResult<T> = Result<T, Flow>;

pub(crate) fn internal(msg: impl Into<String>) -> Flow {
    Flow::Fault(VmError::Internal(msg.into()))
}
