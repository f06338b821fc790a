//! Message types crossing the client boundary.
//!
//! `Payload` covers values handed to producers; `ConsumedMessage` is what
//! consumers hand back after flattening broker batches.

mod consumed;
mod payload;

pub use consumed::ConsumedMessage;
pub use payload::Payload;
