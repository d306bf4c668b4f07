//! Synchronization and notification pipeline.
//!
//! - `ChangeDetector`: admits newly listed releases against stored history
//! - `NotificationDispatcher`: fans a release out to its subscribers
//! - `Scheduler`: bootstrap and the polling loop over every section
//! - `notify_new_item`: sends a stored release on request

pub mod diff;
pub mod dispatch;
pub mod notify;
pub mod scheduler;

#[cfg(test)]
pub(crate) mod testing;

pub use diff::{Admission, ChangeDetector};
pub use dispatch::{DeliveryReport, NotificationDispatcher, render_message, sample_actions};
pub use notify::{NotifyOutcome, notify_new_item};
pub use scheduler::{BootstrapStats, CycleStats, Scheduler};
