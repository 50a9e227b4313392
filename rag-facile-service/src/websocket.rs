//! WebSocket chat.
//!
//! Clients send chat messages and receive the turn's tokens, tool status
//! and completion as they happen.

mod handlers;
mod manager;
pub mod messages;

pub use handlers::handle_ws_connection;
pub use manager::WebSocketManager;
pub use messages::{ClientMessage, ServerMessage};
