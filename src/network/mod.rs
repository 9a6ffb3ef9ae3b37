//! Networks and the active execution context
//!
//! - [`NetworkDescriptor`] - one configured network: persona, frozen chain
//!   id, session cache and ledger handle
//! - [`NetworkRegistry`] - all known networks
//! - [`ExecutionContext`] - which one is active
//! - [`Confirmation`] - the live-network prompt

pub mod context;
pub mod descriptor;
pub mod prompt;
pub mod registry;

pub use context::{ExecutionContext, NetworkTarget, SwitchRequest};
pub use descriptor::{NetworkDescriptor, Persona};
pub use prompt::{AutoConfirm, Confirmation, StdinConfirmation};
pub use registry::NetworkRegistry;
