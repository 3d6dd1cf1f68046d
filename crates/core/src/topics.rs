//! Canonical event topic names shared across panels and services.
//!
//! Producers and consumers agree on these strings out of band; keeping them
//! in one place stops the two panels and the live channel from drifting.

// Navigation
pub const CHAT_SELECTED: &str = "chat-selected";
pub const USER_PROFILE_REQUESTED: &str = "user-profile-requested";
pub const PROFILE_REQUESTED: &str = "profile-requested";
pub const OPEN_CHAT_WITH_USER: &str = "open-chat-with-user";
pub const NAVIGATE_BACK: &str = "navigate-back";

// Chat and message lifecycle
pub const CHAT_CREATED: &str = "chat-created";
pub const CHAT_DELETED: &str = "chat-deleted";
pub const MESSAGE_SENT: &str = "message-sent";
pub const MESSAGE_RECEIVED: &str = "message-received";

// Profile / contacts
pub const PROFILE_UPDATED: &str = "profile-updated";
pub const CONTACTS_UPDATED: &str = "contacts-updated";

// Live channel
pub const WEBSOCKET_CONNECTED: &str = "websocket-connected";
pub const WEBSOCKET_DISCONNECTED: &str = "websocket-disconnected";
pub const WEBSOCKET_NEW_MESSAGE: &str = "websocket-new-message";
pub const WEBSOCKET_MESSAGE_EDITED: &str = "websocket-message-edited";
pub const WEBSOCKET_MESSAGE_DELETED: &str = "websocket-message-deleted";
pub const WEBSOCKET_USER_STATUS: &str = "websocket-user-status";

// User directory
pub const USER_STATUS_CHANGED: &str = "user-status-changed";

// UI intents, emitted by the frontend toward the active components
pub const ROUTE_REQUESTED: &str = "route-requested";
pub const SEND_MESSAGE_REQUESTED: &str = "send-message-requested";
pub const SEARCH_QUERY_CHANGED: &str = "search-query-changed";
pub const PROFILE_SAVE_REQUESTED: &str = "profile-save-requested";
pub const CONTACT_ADD_REQUESTED: &str = "contact-add-requested";
pub const CONTACT_REMOVE_REQUESTED: &str = "contact-remove-requested";
pub const CHAT_PIN_REQUESTED: &str = "chat-pin-requested";
pub const CHAT_MUTE_REQUESTED: &str = "chat-mute-requested";
pub const CHAT_DELETE_REQUESTED: &str = "chat-delete-requested";
