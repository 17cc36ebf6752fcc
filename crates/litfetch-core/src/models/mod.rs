pub mod record;

pub use record::{DedupKey, Record};
