// Well-known WS method names — the post-handshake dispatch table keys on
// these; they mirror the HTTP routes one-for-one so either transport can
// reach the same Chat/Files/Voice Core operation.

// chat
pub const CHAT_LIST: &str = "chat.list";
pub const CHAT_CREATE: &str = "chat.create";
pub const CHAT_MESSAGES_LIST: &str = "chat.messages.list";
pub const CHAT_MESSAGES_SYNC: &str = "chat.messages.sync";
pub const CHAT_MESSAGE_SEND: &str = "chat.message.send";
pub const CHAT_MESSAGE_EDIT: &str = "chat.message.edit";
pub const CHAT_MESSAGE_DELETE: &str = "chat.message.delete";
pub const CHAT_MESSAGE_REACT: &str = "chat.message.react";
pub const CHAT_MESSAGE_FORWARD: &str = "chat.message.forward";
pub const CHAT_THREAD_CREATE: &str = "chat.thread.create";
pub const CHAT_THREAD_MESSAGES_LIST: &str = "chat.thread.messages.list";
pub const CHAT_THREAD_ARCHIVE: &str = "chat.thread.archive";
pub const CHAT_TYPING: &str = "chat.typing";
pub const CHAT_PARTICIPANT_ADD: &str = "chat.participant.add";
pub const CHAT_PARTICIPANT_REMOVE: &str = "chat.participant.remove";
pub const CHAT_MESSAGE_READ: &str = "chat.message.read";

// files
pub const FILES_UPLOAD: &str = "files.upload";
pub const FILES_DOWNLOAD: &str = "files.download";
pub const FILES_DELETE: &str = "files.delete";
pub const FILES_SHARE_LINK_CREATE: &str = "files.share_link.create";
pub const FILES_GROUP_CREATE: &str = "files.group.create";
pub const FILES_GROUP_DELETE: &str = "files.group.delete";

// voice
pub const VOICE_CALL_START: &str = "voice.call.start";
pub const VOICE_CONFERENCE_SCHEDULE: &str = "voice.conference.schedule";
pub const VOICE_CONFERENCE_RSVP: &str = "voice.conference.rsvp";
pub const VOICE_CONFERENCE_ROLE_SET: &str = "voice.conference.role.set";
pub const VOICE_CONFERENCE_MUTE: &str = "voice.conference.mute";
pub const VOICE_CONFERENCE_KICK: &str = "voice.conference.kick";
pub const VOICE_CONFERENCE_CANCEL: &str = "voice.conference.cancel";
pub const VOICE_CONFERENCE_END: &str = "voice.conference.end";
pub const VOICE_CONFERENCE_LEAVE: &str = "voice.conference.leave";
pub const VOICE_CONFERENCE_PARTICIPANTS_LIST: &str = "voice.conference.participants.list";
pub const VOICE_CONFERENCE_SCHEDULED_LIST: &str = "voice.conference.scheduled.list";
pub const VOICE_CONFERENCE_OCCURRENCE_RSVP: &str = "voice.conference.occurrence.rsvp";
pub const VOICE_CONFERENCE_EVENTS_LIST: &str = "voice.conference.events.list";

// handshake
pub const CONNECT: &str = "connect";
