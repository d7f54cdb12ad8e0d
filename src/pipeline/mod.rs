//! Relay Pipeline Module
//!
//! Everything between a raw notification and an outbound message:
//!
//! 1. **Listener**: one LISTEN session, reconnecting on failure
//! 2. **Dispatcher**: decode, classify, route by channel
//! 3. **Orchestrator**: snapshot bookkeeping and schema alerts
//! 4. **Rows**: alerts for inserts into monitored tables
//!
//! The reconciler runs beside the listener and keeps the snapshot store honest.

pub mod listener;
pub mod orchestrator;
pub mod reconcile;
pub mod rows;

pub use listener::{ChangeListener, EventDispatcher};
pub use orchestrator::SchemaOrchestrator;
pub use reconcile::Reconciler;
pub use rows::RowNotifier;
