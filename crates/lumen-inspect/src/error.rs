use lumen_vm::VmError;
use thiserror::Error;

use crate::tree::NodeId;

pub type InspectResult<T> = Result<T, InspectError>;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InspectError {
    #[error("inspection service: {0}")]
    Vm(#[from] VmError),
    #[error("Cannot evaluate while the application is running.")]
    NotPaused,
    #[error("no stack frame {0} in the current pause")]
    UnknownFrame(usize),
    #[error("unknown tree node {0:?}")]
    UnknownNode(NodeId),
}

impl InspectError {
    /// Text suitable for showing to the user in a console or toast.
    pub fn user_message(&self) -> String {
        match self {
            Self::Vm(VmError::Timeout) => "The application did not respond in time.".to_string(),
            other => other.to_string(),
        }
    }
}
