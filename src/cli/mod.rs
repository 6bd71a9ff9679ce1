mod classify;
mod reconcile;

pub use classify::{run_classify, ClassifyStats};
pub use reconcile::{run_reconcile, ReconcileOptions, ReconcileOutcome};
