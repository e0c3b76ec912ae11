pub mod pending;

pub use pending::{attach, detach, pending_task_ids, reconcile};
