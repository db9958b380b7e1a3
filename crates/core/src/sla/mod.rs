pub mod clock;
pub mod reconciler;

pub use clock::{classify, reclassify, SlaClock, SlaPolicyError};
pub use reconciler::{SlaCycleReport, SlaReconciler};
