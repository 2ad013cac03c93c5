//! Application-level orchestration.
//!
//! `flow` is the synchronous capture → era → processing → result state machine,
//! `session` runs it against an [`crate::engine::ImageService`], and the
//! controller/post-processing halves serve the UI and CLI layers.

mod controller;
pub mod flow;
mod post_process;
pub mod session;
#[cfg(test)]
pub(crate) mod testing;

#[cfg_attr(not(feature = "tui"), allow(unused_imports))]
pub(crate) use controller::{run_controller, UiCommand};
pub(crate) use post_process::{build_report, save_result};
