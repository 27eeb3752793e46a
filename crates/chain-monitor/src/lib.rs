//! # `chain-monitor`
//!
//! `chain-monitor` polls a [`ChainSource`](source::ChainSource) for new blocks and fans every new
//! best-height block out to the [`BlockConsumer`](consumer::BlockConsumer)s attached to it.
//!
//! Consumers can go to sleep without detaching. While asleep they are skipped by the fan-out, so
//! a consumer with nothing to do costs nothing per block.

pub mod config;
pub mod constants;
pub mod consumer;
pub mod event;
pub mod monitor;
pub mod source;
pub mod subscription;

#[cfg(any(test, feature = "test_utils"))]
pub mod mock;

pub use config::ChainMonitorConfig;
pub use consumer::{BlockConsumer, ConsumerHandle, ConsumerId};
pub use event::BlockEvent;
pub use monitor::ChainMonitor;
pub use source::{ChainSource, ChainSourceError};
pub use subscription::Subscription;
