//! # chatdrop-shared
//!
//! Types shared by the chatdrop store and server: the persisted message
//! record, the upload classification table, the realtime event envelopes
//! and the inline image preview helper.

pub mod constants;
pub mod error;
pub mod preview;
pub mod protocol;
pub mod types;

pub use error::{PreviewError, ProtocolError};
pub use protocol::{ClientEvent, ServerEvent};
pub use types::{FileAttachment, FileKind, MessageRecord, RecordBody};
