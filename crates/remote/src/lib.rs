//! Hosted platform adapter for the Chatify session core.
//!
//! Rows are read and written through the platform's REST interface, objects
//! through its storage endpoints and inserts are pushed over its realtime
//! websocket. Every loosely typed row passes the validating decode in
//! `chatify_chats::utils::decode` before it reaches the session.

mod backend;
mod error;
mod realtime;
mod rest;
mod storage;

pub use backend::RemoteBackend;
pub use error::RemoteError;
pub use realtime::RealtimeClient;
pub use rest::RestClient;
