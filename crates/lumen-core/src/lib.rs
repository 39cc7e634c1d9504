//! Core shared types for Lumen.
//!
//! This crate is intentionally small: it provides the observable containers
//! that the inspector, router and preferences crates expose to presentation
//! code, plus the [`Subscription`] disposer returned by every `subscribe` call.

mod observable;

pub use observable::{Notifier, Observable, Subscription};
