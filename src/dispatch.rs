mod engine;
mod notifier;

pub use engine::{DispatchEngine, ReconcileOutcome};
pub use notifier::{DispatchRequest, GitHubNotifier, Notifier, Target, EVENT_TYPE};
