//! Outbound messaging
//!
//! Message composition (Block Kit) and the Slack Web API client that delivers it.

pub mod message;
pub mod slack;

pub use message::{
    truncate, Affordance, DetailView, OutboundMessage, MAX_TEXT_CHARS, TRUNCATION_MARKER,
    VIEW_ROW_ACTION, VIEW_SCHEMA_ACTION,
};
pub use slack::{DetailOpener, MessageSink, SlackClient};
