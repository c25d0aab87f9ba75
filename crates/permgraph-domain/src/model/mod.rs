//! Permission model types.
//!
//! This module contains:
//! - Capability masks and the fixed action vocabulary
//! - Edges, permission sets, principals and targets

mod mask;
mod types;
#[cfg(test)]
mod types_proptest;

pub use mask::{Action, CapabilityMask, CAN_MANAGE, CAN_READ, CAN_WRITE};
pub use types::*;
