//! Admission control: the limiter algorithms and their per-resource owner.

mod backend;
mod clock;
mod fixed_window;
mod leaky_bucket;
mod policy;
mod registry;
mod rules;
mod token_bucket;

pub use backend::AdmissionBackend;
pub use clock::{Clock, ManualClock, SystemClock};
pub use fixed_window::FixedWindowCounter;
pub use leaky_bucket::LeakyBucket;
pub use policy::{AdmissionPolicy, InitialFill, PolicyKind, PolicySpec};
pub use registry::{AdmissionRegistry, Decision, LimiterKey, DEFAULT_SWEEP_INTERVAL};
pub use rules::{AdmissionRules, ResourceRule};
pub use token_bucket::TokenBucket;
