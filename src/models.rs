//! Core data models for the chat digest

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::DigestError;

//
// ================= Time window =================
//

/// Inclusive `[from, to]` range of instants bounding a report.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct TimeWindow {
    from: DateTime<Utc>,
    to: DateTime<Utc>,
}

/// Where an instant falls relative to a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// After `to`: the reverse-chronological feed has not reached the window yet.
    Newer,
    InRange,
    /// Before `from`: everything further back is older too.
    Older,
}

impl TimeWindow {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> crate::Result<Self> {
        if from > to {
            return Err(DigestError::InvalidWindow(format!(
                "from ({}) is after to ({})",
                from.to_rfc3339(),
                to.to_rfc3339()
            )));
        }
        Ok(Self { from, to })
    }

    pub fn from(&self) -> DateTime<Utc> {
        self.from
    }

    pub fn to(&self) -> DateTime<Utc> {
        self.to
    }

    pub fn classify(&self, instant: DateTime<Utc>) -> Placement {
        if instant < self.from {
            Placement::Older
        } else if instant > self.to {
            Placement::Newer
        } else {
            Placement::InRange
        }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.classify(instant) == Placement::InRange
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.from.to_rfc3339(), self.to.to_rfc3339())
    }
}

//
// ================= Messages =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: String,
    pub author_id: String,
    pub created_at: DateTime<Utc>,
    /// Absent for non-text events (joins, attachments, ...)
    pub text: Option<String>,
}

/// One page of the upstream feed, newest record first.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub records: Vec<Message>,
    /// `None` marks the end of history.
    pub next_cursor: Option<String>,
}

//
// ================= Routing =================
//

/// The two URL templates that can serve a conversation's history.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RouteVariant {
    /// Probed first.
    Chat,
    /// Used when the chat route answers 404.
    Channel,
}

impl RouteVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteVariant::Chat => "chat",
            RouteVariant::Channel => "channel",
        }
    }

    /// Path of the message collection, relative to the API base URL.
    pub fn messages_path(&self, conversation_id: &str) -> String {
        let id = urlencoding::encode(conversation_id);
        match self {
            RouteVariant::Chat => format!("chats/{}/messages", id),
            RouteVariant::Channel => format!("channels/{}/messages", id),
        }
    }
}

impl fmt::Display for RouteVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A conversation bound to the route variant that serves it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Route {
    pub conversation_id: String,
    pub variant: RouteVariant,
}

impl Route {
    pub fn new(conversation_id: impl Into<String>, variant: RouteVariant) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            variant,
        }
    }

    pub fn path(&self) -> String {
        self.variant.messages_path(&self.conversation_id)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.variant, self.conversation_id)
    }
}

//
// ================= Fetch results =================
//

/// Messages collected for one conversation, ascending by `created_at`.
#[derive(Debug, Clone, Serialize)]
pub struct FetchOutcome {
    pub route: Route,
    pub messages: Vec<Message>,
    pub pages_fetched: u32,
    /// Set when the page cap was hit before the window closed.
    pub range_incomplete: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, h, 0, 0).unwrap()
    }

    #[test]
    fn test_window_rejects_inverted_bounds() {
        assert!(TimeWindow::new(at(5), at(4)).is_err());
        assert!(TimeWindow::new(at(4), at(4)).is_ok());
    }

    #[test]
    fn test_classify_is_inclusive_on_both_ends() {
        let window = TimeWindow::new(at(2), at(4)).unwrap();

        assert_eq!(window.classify(at(1)), Placement::Older);
        assert_eq!(window.classify(at(2)), Placement::InRange);
        assert_eq!(window.classify(at(3)), Placement::InRange);
        assert_eq!(window.classify(at(4)), Placement::InRange);
        assert_eq!(window.classify(at(5)), Placement::Newer);
    }

    #[test]
    fn test_route_paths_encode_conversation_id() {
        assert_eq!(
            RouteVariant::Chat.messages_path("abc"),
            "chats/abc/messages"
        );
        assert_eq!(
            RouteVariant::Channel.messages_path("a/b c"),
            "channels/a%2Fb%20c/messages"
        );
    }
}
