//! EVC baseline resolution and application.
//!
//! Three components, used strictly in order:
//!
//! ```text
//! InventoryResolver      names ─► datacenter / VM / cluster references
//! BaselineMaskResolver   cluster + baseline name ─► ordered feature masks
//! EvcApplier             VM + masks ─► ApplyEvcModeVM_Task ─► terminal state
//! ```
//!
//! None of them retries; the first failure ends the run.

pub mod apply;
pub mod baseline;
pub mod inventory;

pub use apply::{ApplyRequest, EvcApplier};
pub use baseline::{BaselineMaskResolver, select_baseline};
pub use inventory::{DatacenterScope, InventoryResolver};
