pub mod conversation;
pub mod reconciliation;

pub use conversation::ConversationEngine;
pub use reconciliation::ReconciliationEngine;
