mod filesystem;
mod format;
mod state;
mod traits;

pub use filesystem::FileStore;
pub use state::{BranchState, PersistedStore};
pub use traits::StateStore;
