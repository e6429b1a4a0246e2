pub mod exporter;
pub mod outcome;

pub use exporter::{DeliveryTarget, Exporter, Selection, DEFAULT_DELIVERY_TIMEOUT, EXPORTED_POST_TYPES};
pub use outcome::SyncOutcome;
