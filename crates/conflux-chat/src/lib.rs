//! Chat Core: chats, participants, messages, threads,
//! reactions, read status, forwarding. Owner of the chat-file-group
//! bindings. Emits domain events through an injected `conflux_bus::Publisher`.

pub mod db;
pub mod error;
pub mod store;
pub mod types;

pub use error::{ChatError, Result};
pub use store::ChatStore;
pub use types::{Chat, ChatParticipant, Message, NewMessage, Reaction, ReadStatus, SyncResult, Thread};
