pub mod config;
pub mod delivery;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod model;
pub mod offsets;
pub mod pipeline;
pub mod rate_limiter;
pub mod server;
pub mod source;
pub mod transform;

pub use crate::config::BridgeConfig;
pub use crate::delivery::{DeliveryError, EventSink, HttpSink};
pub use crate::model::{ObjectReference, RawAuditEvent, TargetAuditEvent};
pub use crate::pipeline::{DeliveryPipeline, Intake, IntakeClosed, Outcome, RetryPolicy};
pub use crate::rate_limiter::{RateLimiterEngine, WindowRateLimiter};
pub use crate::source::{Ack, NoopAck, QueueMessage};
pub use crate::transform::{decode, transform, TransformError};
pub use common_observability::BridgeMetrics;
