//! Inspection service façade for Lumen.
//!
//! `lumen-inspect` consumes this crate to talk to the inspected VM: it pages
//! through collection contents, evaluates expressions in paused frames and
//! reads class/library metadata for autocomplete.
//!
//! The transport is not part of this crate. Anything that can answer the
//! [`VmService`] requests (a JSON-RPC connection, a recorded session, the
//! [`MockVmService`] test double) can back an inspection session.

mod types;

#[cfg(any(test, feature = "test-support"))]
mod mock;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use types::{
    BoundField, BoundVariable, Class, ClassRef, ErrorRef, FieldName, FieldRef, Frame, FuncOwner,
    FuncRef, Instance, InstanceKind, InstanceRef, IsolateId, Library, LibraryDependency,
    LibraryRef, MapAssociation, Obj, ObjectId, ScriptRef, Sentinel, SentinelKind, SourceLocation,
    Stack, Value,
};

#[cfg(any(test, feature = "test-support"))]
pub use mock::{MockVmService, ServiceCall};

pub type Result<T, E = VmError> = std::result::Result<T, E>;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum VmError {
    #[error("inspection service is not connected")]
    NotConnected,
    #[error("inspection service request timed out")]
    Timeout,
    #[error("inspection service returned error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("object {0} is no longer available")]
    Collected(ObjectId),
    #[error("expected {expected} but the service returned {found}")]
    UnexpectedObject {
        expected: &'static str,
        found: &'static str,
    },
    #[error("{0}")]
    Other(String),
}

/// Asynchronous request/response boundary to the inspected VM.
///
/// Implementations must be cheap to share (`Arc<dyn VmService>`); the core
/// never owns the connection lifecycle.
#[async_trait]
pub trait VmService: Send + Sync {
    /// Fetch an object. For indexed and map instances `offset`/`count` select
    /// the window of elements/associations returned.
    async fn get_object(
        &self,
        isolate: &IsolateId,
        object_id: &ObjectId,
        offset: Option<usize>,
        count: Option<usize>,
    ) -> Result<Obj>;

    /// Evaluate `expression` in the scope of the given frame of a paused isolate.
    async fn evaluate_in_frame(
        &self,
        isolate: &IsolateId,
        frame_index: usize,
        expression: &str,
    ) -> Result<Value>;

    async fn get_stack(&self, isolate: &IsolateId) -> Result<Stack>;

    async fn get_instance(
        &self,
        isolate: &IsolateId,
        object_id: &ObjectId,
        offset: Option<usize>,
        count: Option<usize>,
    ) -> Result<Instance> {
        match self.get_object(isolate, object_id, offset, count).await? {
            Obj::Instance(instance) => Ok(instance),
            Obj::Sentinel(_) => Err(VmError::Collected(object_id.clone())),
            other => Err(VmError::UnexpectedObject {
                expected: "Instance",
                found: other.type_name(),
            }),
        }
    }

    async fn get_class(&self, isolate: &IsolateId, class: &ClassRef) -> Result<Class> {
        match self.get_object(isolate, &class.id, None, None).await? {
            Obj::Class(class) => Ok(class),
            Obj::Sentinel(_) => Err(VmError::Collected(class.id.clone())),
            other => Err(VmError::UnexpectedObject {
                expected: "Class",
                found: other.type_name(),
            }),
        }
    }

    async fn get_library(&self, isolate: &IsolateId, library: &LibraryRef) -> Result<Library> {
        match self.get_object(isolate, &library.id, None, None).await? {
            Obj::Library(library) => Ok(library),
            Obj::Sentinel(_) => Err(VmError::Collected(library.id.clone())),
            other => Err(VmError::UnexpectedObject {
                expected: "Library",
                found: other.type_name(),
            }),
        }
    }
}

/// Bound a service request by `timeout`, mapping expiry to [`VmError::Timeout`].
pub async fn with_timeout<T>(
    timeout: Duration,
    request: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(timeout, request).await {
        Ok(result) => result,
        Err(_elapsed) => {
            tracing::debug!(target: "lumen.vm", ?timeout, "inspection request timed out");
            Err(VmError::Timeout)
        }
    }
}
