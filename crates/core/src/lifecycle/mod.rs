pub mod operations;
pub mod service;
pub mod states;

pub use operations::{LifecycleOperation, START_GRACE};
pub use service::LifecycleService;
pub use states::{allowed_targets, can_modify, is_terminal, transition, TransitionError};
