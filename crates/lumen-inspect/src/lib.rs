//! Inspection core for the Lumen debugger front-end.
//!
//! [`InspectionSession`] tracks the pause state of one isolate and owns the
//! session-scoped metadata caches. On top of it sit the lazily expanded
//! [`VariableTree`], the [`EvalConsole`] and console autocomplete
//! ([`AutocompleteController`]). All remote access goes through
//! [`lumen_vm::VmService`].

pub mod autocomplete;
mod cache;
mod console;
mod error;
mod history;
mod session;
pub mod tree;

pub use autocomplete::{AutocompleteController, AutocompleteResolver, EditingParts};
pub use cache::CoalescingCache;
pub use console::{ConsoleEntry, EvalConsole};
pub use error::{InspectError, InspectResult};
pub use history::EvalHistory;
pub use session::{InspectionSession, PauseState};
pub use tree::{NodeId, TreeNode, VariableTree, Window};
