//! Broker clients and their shared connection lifecycle.
//!
//! Two distinct client types instead of a mode flag:
//! - `ConsumerClient`: poll, commit, assign, position, partition metadata
//! - `ProducerClient`: send, send_many, flush
//!
//! Both share the [`ConnectionLifecycle`] contract and the `ClientCore`
//! middleware (operation timing, slow-operation warnings, timeout guard,
//! bounded connect-with-retry).

mod consumer;
mod core;
mod producer;

pub use consumer::ConsumerClient;
pub use producer::{ProducerClient, SendBatch, SendOptions};
pub use self::core::{init_tracing, ConnectionLifecycle};
