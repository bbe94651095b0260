//! Voice Core: ad-hoc and scheduled conferences, participants,
//! RSVPs, recurrence, moderator actions, reminders, and the media-engine
//! driver. Shares Chat Core's connection so a call started from a chat and
//! its main-chat system notice land in one transaction scope.

pub mod db;
pub mod error;
pub mod media_engine;
pub mod recurrence;
pub mod store;
pub mod types;

pub use error::{Result, VoiceError};
pub use media_engine::{EngineError, EngineEvent, MediaEngine, NoopMediaEngine, TcpMediaEngine};
pub use store::{RecurrenceInput, VoiceStore};
pub use types::{
    Conference, ConferenceEvent, ConferenceParticipant, ConferenceReminder, MediaCredentials,
    ProjectedOccurrence, RecurrenceRule, REMINDER_MINUTES_BEFORE,
};
