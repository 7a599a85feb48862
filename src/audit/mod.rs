pub mod classifier;
pub mod decision;
pub mod extract;

pub use classifier::{Classifier, HttpClassifier, Verdict};
pub use decision::{AuditOutcome, BlockReason, DegradeCause, decide};
pub use extract::{extract_audit_text, is_greeting, should_audit};
