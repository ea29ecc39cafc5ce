//! Streamed response consumption: frame decoding, event model, subscription.

pub mod client;
pub mod events;
pub mod frame;

pub use client::{StreamingClient, Subscription};
pub use events::StreamEvent;
pub use frame::FrameDecoder;
