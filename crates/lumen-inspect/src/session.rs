use std::sync::Arc;

use lumen_config::InspectorConfig;
use lumen_core::Observable;
use lumen_vm::{with_timeout, Frame, IsolateId, Stack, Value, VmService};

use crate::autocomplete::{AutocompleteController, AutocompleteResolver};
use crate::error::{InspectError, InspectResult};
use crate::tree::{NodeId, VariableTree};

/// Snapshot of a paused isolate.
#[derive(Clone, Debug, PartialEq)]
pub struct PauseState {
    pub isolate: IsolateId,
    pub frames: Vec<Frame>,
    pub selected_frame: usize,
}

impl PauseState {
    pub fn frame(&self) -> Option<&Frame> {
        self.frames.get(self.selected_frame)
    }
}

/// One inspected isolate: its pause state plus the session-scoped caches.
///
/// Evaluation is only possible while paused; everything that needs a frame
/// fails fast with [`InspectError::NotPaused`] otherwise.
pub struct InspectionSession {
    service: Arc<dyn VmService>,
    isolate: IsolateId,
    config: InspectorConfig,
    pause: Observable<Option<PauseState>>,
    resolver: Arc<AutocompleteResolver>,
}

impl InspectionSession {
    pub fn new(service: Arc<dyn VmService>, isolate: IsolateId, config: InspectorConfig) -> Self {
        let resolver = Arc::new(AutocompleteResolver::new(
            Arc::clone(&service),
            config.request_timeout(),
        ));
        Self {
            service,
            isolate,
            config,
            pause: Observable::new(None),
            resolver,
        }
    }

    pub fn isolate(&self) -> &IsolateId {
        &self.isolate
    }

    pub fn config(&self) -> &InspectorConfig {
        &self.config
    }

    /// Observable pause state; `None` while running.
    pub fn pause(&self) -> Observable<Option<PauseState>> {
        self.pause.clone()
    }

    pub fn pause_state(&self) -> Option<PauseState> {
        self.pause.get()
    }

    pub fn is_paused(&self) -> bool {
        self.pause.with(Option::is_some)
    }

    /// Fetch the stack of the isolate that just paused and select the top frame.
    pub async fn on_paused(&self) -> InspectResult<()> {
        let stack = with_timeout(
            self.config.request_timeout(),
            self.service.get_stack(&self.isolate),
        )
        .await?;
        self.set_paused(stack);
        Ok(())
    }

    pub fn set_paused(&self, stack: Stack) {
        tracing::debug!(
            target: "lumen.inspect",
            isolate = %self.isolate,
            frames = stack.frames.len(),
            "isolate paused"
        );
        self.pause.set(Some(PauseState {
            isolate: self.isolate.clone(),
            frames: stack.frames,
            selected_frame: 0,
        }));
    }

    pub fn on_resumed(&self) {
        self.pause.set(None);
    }

    pub fn select_frame(&self, index: usize) -> InspectResult<()> {
        let mut pause = self.pause_state().ok_or(InspectError::NotPaused)?;
        if index >= pause.frames.len() {
            return Err(InspectError::UnknownFrame(index));
        }
        pause.selected_frame = index;
        self.pause.set(Some(pause));
        Ok(())
    }

    /// Evaluate `expression` in the selected frame.
    pub async fn evaluate(&self, expression: &str) -> InspectResult<Value> {
        let pause = self.pause_state().ok_or(InspectError::NotPaused)?;
        let value = with_timeout(
            self.config.request_timeout(),
            self.service
                .evaluate_in_frame(&pause.isolate, pause.selected_frame, expression),
        )
        .await?;
        Ok(value)
    }

    /// An empty variable tree bound to this session's service and settings.
    pub fn new_tree(&self) -> VariableTree {
        VariableTree::new(Arc::clone(&self.service), &self.config)
    }

    /// Replace the roots of `tree` with the variables of the selected frame.
    pub fn frame_variables(&self, tree: &mut VariableTree) -> InspectResult<Vec<NodeId>> {
        let pause = self.pause_state().ok_or(InspectError::NotPaused)?;
        let frame = pause
            .frame()
            .ok_or(InspectError::UnknownFrame(pause.selected_frame))?;

        tree.clear();
        Ok(frame
            .vars
            .iter()
            .map(|var| tree.insert_root(var.name.clone(), var.value.clone(), pause.isolate.clone()))
            .collect())
    }

    pub fn resolver(&self) -> Arc<AutocompleteResolver> {
        Arc::clone(&self.resolver)
    }

    pub fn autocomplete_controller(&self) -> AutocompleteController {
        AutocompleteController::new(self.resolver())
    }

    /// Drop the pause state and every session-scoped cache.
    pub fn disconnect(&self) {
        tracing::debug!(target: "lumen.inspect", isolate = %self.isolate, "session disconnected");
        self.pause.set(None);
        self.resolver.invalidate();
    }
}
