pub mod backoff;
pub mod client;
pub mod config;
pub mod credential;
pub mod error;
pub mod payload;
pub mod sink;
pub mod singer;
pub mod streams;
pub mod target;
pub mod token_cache;
pub mod types;

pub use client::OptiplyClient;
pub use config::{ApiCredentials, TargetConfig};
pub use error::{ApiError, ConfigError};
pub use sink::{RecordOutcome, Sink};
pub use singer::Message;
pub use streams::StreamKind;
pub use target::{RunSummary, StreamStats, Target};
pub use token_cache::TokenCache;
