use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::{
    Instance, IsolateId, Obj, ObjectId, Result, Sentinel, Stack, Value, VmError, VmService,
};

/// One request observed by [`MockVmService`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ServiceCall {
    GetObject {
        object_id: ObjectId,
        offset: Option<usize>,
        count: Option<usize>,
    },
    Evaluate {
        frame_index: usize,
        expression: String,
    },
    GetStack,
}

#[derive(Default)]
struct State {
    objects: HashMap<ObjectId, Obj>,
    failures: HashMap<ObjectId, VmError>,
    evaluations: HashMap<(usize, String), Result<Value>>,
    gates: HashMap<String, Arc<Notify>>,
    stack: Option<Stack>,
    calls: Vec<ServiceCall>,
}

/// Deterministic, in-memory inspection service test double.
///
/// Every request yields to the scheduler once before answering so concurrent
/// callers interleave the way they would against a real connection.
#[derive(Default)]
pub struct MockVmService {
    state: Mutex<State>,
}

impl MockVmService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_object(&self, obj: Obj) {
        let id = match &obj {
            Obj::Instance(instance) => instance.reference.id.clone(),
            Obj::Class(class) => class.reference.id.clone(),
            Obj::Library(library) => library.reference.id.clone(),
            Obj::Sentinel(_) => {
                panic!("use `insert_sentinel` to register sentinel replies")
            }
        };
        self.state.lock().objects.insert(id, obj);
    }

    pub fn insert_sentinel(&self, object_id: ObjectId, sentinel: Sentinel) {
        self.state
            .lock()
            .objects
            .insert(object_id, Obj::Sentinel(sentinel));
    }

    /// Make every `get_object` for `object_id` fail with `error`.
    pub fn fail_object(&self, object_id: ObjectId, error: VmError) {
        self.state.lock().failures.insert(object_id, error);
    }

    pub fn set_evaluation(
        &self,
        frame_index: usize,
        expression: impl Into<String>,
        result: Result<Value>,
    ) {
        self.state
            .lock()
            .evaluations
            .insert((frame_index, expression.into()), result);
    }

    /// Hold evaluations of `expression` until the returned gate is notified.
    pub fn gate_evaluation(&self, expression: impl Into<String>) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.state
            .lock()
            .gates
            .insert(expression.into(), Arc::clone(&gate));
        gate
    }

    pub fn set_stack(&self, stack: Stack) {
        self.state.lock().stack = Some(stack);
    }

    pub fn calls(&self) -> Vec<ServiceCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Number of `get_object` requests issued for `object_id`.
    pub fn fetch_count(&self, object_id: &ObjectId) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| matches!(call, ServiceCall::GetObject { object_id: id, .. } if id == object_id))
            .count()
    }

    pub fn evaluation_count(&self, expression: &str) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| matches!(call, ServiceCall::Evaluate { expression: e, .. } if e == expression))
            .count()
    }
}

fn window<T: Clone>(items: &[T], offset: Option<usize>, count: Option<usize>) -> Vec<T> {
    let start = offset.unwrap_or(0).min(items.len());
    let end = match count {
        Some(count) => start.saturating_add(count).min(items.len()),
        None => items.len(),
    };
    items[start..end].to_vec()
}

fn windowed_instance(instance: &Instance, offset: Option<usize>, count: Option<usize>) -> Instance {
    if offset.is_none() && count.is_none() {
        return instance.clone();
    }
    let mut out = instance.clone();
    out.offset = offset;
    out.count = count;
    out.elements = instance
        .elements
        .as_deref()
        .map(|elements| window(elements, offset, count));
    out.associations = instance
        .associations
        .as_deref()
        .map(|associations| window(associations, offset, count));
    out
}

#[async_trait]
impl VmService for MockVmService {
    async fn get_object(
        &self,
        _isolate: &IsolateId,
        object_id: &ObjectId,
        offset: Option<usize>,
        count: Option<usize>,
    ) -> Result<Obj> {
        self.state.lock().calls.push(ServiceCall::GetObject {
            object_id: object_id.clone(),
            offset,
            count,
        });
        tokio::task::yield_now().await;

        let state = self.state.lock();
        if let Some(error) = state.failures.get(object_id) {
            return Err(error.clone());
        }
        match state.objects.get(object_id) {
            Some(Obj::Instance(instance)) => {
                Ok(Obj::Instance(windowed_instance(instance, offset, count)))
            }
            Some(other) => Ok(other.clone()),
            None => Err(VmError::Rpc {
                code: 113,
                message: format!("no mock object registered for `{object_id}`"),
            }),
        }
    }

    async fn evaluate_in_frame(
        &self,
        _isolate: &IsolateId,
        frame_index: usize,
        expression: &str,
    ) -> Result<Value> {
        let gate = {
            let mut state = self.state.lock();
            state.calls.push(ServiceCall::Evaluate {
                frame_index,
                expression: expression.to_string(),
            });
            state.gates.get(expression).cloned()
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }
        tokio::task::yield_now().await;

        let key = (frame_index, expression.to_string());
        match self.state.lock().evaluations.get(&key) {
            Some(result) => result.clone(),
            None => Err(VmError::Other(format!(
                "no mock evaluation result registered for `{expression}`"
            ))),
        }
    }

    async fn get_stack(&self, _isolate: &IsolateId) -> Result<Stack> {
        self.state.lock().calls.push(ServiceCall::GetStack);
        tokio::task::yield_now().await;
        self.state.lock().stack.clone().ok_or(VmError::NotConnected)
    }
}
