//! Text rendering of chat messages for a line-oriented terminal.

use chat_core::ChatMessage;
use chrono::{DateTime, Utc};

/// Column width own messages are right-aligned to.
pub const LINE_WIDTH: usize = 72;

/// Coarse relative time, e.g. `"5 minutes ago"`.
///
/// Timestamps come from the sender's clock, so a message "from the future"
/// is shown as `"just now"`.
pub fn time_ago(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (now - timestamp).num_seconds();
    if seconds < 60 {
        return "just now".to_string();
    }
    let (count, unit) = match seconds {
        s if s < 3_600 => (s / 60, "minute"),
        s if s < 86_400 => (s / 3_600, "hour"),
        s => (s / 86_400, "day"),
    };
    let plural = if count == 1 { "" } else { "s" };
    format!("{count} {unit}{plural} ago")
}

/// Renders one message as a single line.
///
/// The local user's own messages are marked and right-aligned; everyone
/// else's start at the left margin.  `index` is the 1-based position used by
/// the `/pin` command.
pub fn render_message(
    index: usize,
    message: &ChatMessage,
    own_user: &str,
    now: DateTime<Utc>,
) -> String {
    let when = time_ago(message.timestamp(), now);
    if message.sender() == own_user {
        let body = format!("{}  ({when}) [{index}]", message.content());
        format!("{body:>LINE_WIDTH$}")
    } else {
        format!("[{index}] {}: {}  ({when})", message.sender(), message.content())
    }
}

/// Banner line for the pinned message.
pub fn render_pinned(message: &ChatMessage) -> String {
    format!("Pinned: {}", message.content())
}
