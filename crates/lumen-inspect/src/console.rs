use std::sync::Arc;

use lumen_core::Observable;

use crate::error::{InspectError, InspectResult};
use crate::history::EvalHistory;
use crate::session::InspectionSession;
use crate::tree::{NodeId, VariableTree};

/// One line of console output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConsoleEntry {
    /// An echoed submission.
    Input(String),
    /// An evaluation result, expandable through [`EvalConsole::tree_mut`].
    Result(NodeId),
    /// A failed evaluation.
    Error(String),
    /// An informational message that did not come from an evaluation.
    Message(String),
}

/// Expression console: evaluates submissions in the paused frame, keeps the
/// results as lazily expandable tree roots and remembers what was typed.
pub struct EvalConsole {
    session: Arc<InspectionSession>,
    history: EvalHistory,
    tree: VariableTree,
    output: Observable<Vec<ConsoleEntry>>,
}

impl EvalConsole {
    pub fn new(session: Arc<InspectionSession>) -> Self {
        let history = EvalHistory::new(session.config().history_capacity);
        let tree = session.new_tree();
        Self {
            session,
            history,
            tree,
            output: Observable::new(Vec::new()),
        }
    }

    pub fn output(&self) -> Observable<Vec<ConsoleEntry>> {
        self.output.clone()
    }

    pub fn history(&self) -> &EvalHistory {
        &self.history
    }

    pub fn tree(&self) -> &VariableTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut VariableTree {
        &mut self.tree
    }

    /// Evaluate `expression` and append the outcome to the output.
    ///
    /// While the application is running the submission is rejected with
    /// [`InspectError::NotPaused`]: only an explanatory message is appended
    /// and the history is left untouched. Blank submissions are ignored.
    pub async fn submit(&mut self, expression: &str) -> InspectResult<Option<NodeId>> {
        let expression = expression.trim();
        if expression.is_empty() {
            return Ok(None);
        }
        if !self.session.is_paused() {
            let err = InspectError::NotPaused;
            self.append(ConsoleEntry::Message(err.user_message()));
            return Err(err);
        }

        self.history.push(expression);
        self.append(ConsoleEntry::Input(expression.to_string()));

        match self.session.evaluate(expression).await {
            Ok(value) => {
                let id = self
                    .tree
                    .insert_root(expression, value, self.session.isolate().clone());
                self.append(ConsoleEntry::Result(id));
                Ok(Some(id))
            }
            Err(err) => {
                tracing::debug!(
                    target: "lumen.inspect",
                    expression,
                    error = %err,
                    "console evaluation failed"
                );
                self.append(ConsoleEntry::Error(err.user_message()));
                Err(err)
            }
        }
    }

    pub fn history_up(&mut self) -> Option<String> {
        self.history.navigate_up().map(str::to_string)
    }

    pub fn history_down(&mut self) -> Option<String> {
        self.history.navigate_down().map(str::to_string)
    }

    /// Drop all output and the result trees. History is kept.
    pub fn clear(&mut self) {
        self.tree.clear();
        self.output.set(Vec::new());
    }

    fn append(&self, entry: ConsoleEntry) {
        self.output.update(|entries| entries.push(entry));
    }
}
