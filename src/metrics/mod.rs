pub mod aggregate;
pub mod request;
pub mod running;
pub mod stream;

pub use aggregate::{AggregateMetrics, AggregateSnapshot};
pub use request::RequestObservation;
pub use running::RunningStat;
