//! # chatdrop-store
//!
//! Persistence for the chat history: a bounded, ordered log of
//! [`MessageRecord`](chatdrop_shared::MessageRecord)s kept in a single JSON
//! file. Every mutation is a whole-file read-modify-write.

pub mod messages;

mod error;

pub use error::{Result, StoreError};
pub use messages::MessageStore;
