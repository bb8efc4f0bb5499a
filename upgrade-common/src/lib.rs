//! Shared wire types for the HTTPS upgrade layer.
//!
//! These are the shapes exchanged between the interception layer and the
//! application hosting it: the control-plane messages and the lifecycle
//! state the layer reports.

pub mod control;
pub mod lifecycle;

pub use control::{StatusKind, StatusResponse, WireMessage};
pub use lifecycle::LifecycleState;
