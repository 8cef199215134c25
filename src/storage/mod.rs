pub mod sqlite;

pub use sqlite::{DistinctField, LeadStore, StoreError};
