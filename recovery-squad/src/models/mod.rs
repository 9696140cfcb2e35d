pub mod recovery;

pub use recovery::{PersonaSummary, RecoveryResponse};
