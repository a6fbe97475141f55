pub mod discover;
pub mod period;
pub mod reconcile;
pub mod settings;
