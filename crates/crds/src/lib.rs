//! Dummy CRD Definitions
//!
//! Kubernetes Custom Resource Definitions for the Dummy controller.

pub mod condition;
pub mod dummy;

pub use condition::*;
pub use dummy::*;
