//! Access control: policy evaluation, context gating and batch resolution.

pub mod batch;
pub mod gate;
pub mod mode;
pub mod oracle;
pub mod secure;

pub use batch::{Batch, Mutation, Operation};
pub use gate::{ContextGate, GateResult};
pub use mode::{AccessMode, ModeSet, WriteDecision};
pub use oracle::{PolicyOracle, StorePolicyOracle};
pub use secure::SecureGraph;
