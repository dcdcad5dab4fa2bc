//! Slack records as they travel through the export.
//!
//! Messages and conversations are kept as the raw JSON objects the Web API
//! returned so the files on disk carry every field untouched. Accessors read
//! the handful of fields the pipeline cares about.

use std::cmp::Ordering;
use std::fmt;

use chrono::{NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, Result};

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(|v| v.as_str())
}

/// A single message, top-level or thread reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Message(Value);

impl Message {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn ts(&self) -> Option<&str> {
        str_field(&self.0, "ts")
    }

    pub fn thread_ts(&self) -> Option<&str> {
        str_field(&self.0, "thread_ts")
    }

    pub fn subtype(&self) -> Option<&str> {
        str_field(&self.0, "subtype")
    }

    /// New conversation name carried by a rename event.
    pub fn name(&self) -> Option<&str> {
        str_field(&self.0, "name")
    }

    pub fn old_name(&self) -> Option<&str> {
        str_field(&self.0, "old_name")
    }

    pub fn timestamp(&self) -> Result<Timestamp> {
        let ts = self
            .ts()
            .ok_or_else(|| AppError::MalformedTimestamp(String::new()))?;
        Timestamp::parse(ts)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn as_value_mut(&mut self) -> &mut Value {
        &mut self.0
    }
}

/// A channel, private group, group DM or 1:1 DM as listed by `conversations.list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conversation(Value);

impl Conversation {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn id(&self) -> &str {
        str_field(&self.0, "id").unwrap_or_default()
    }

    pub fn name(&self) -> &str {
        str_field(&self.0, "name").unwrap_or_default()
    }

    /// The other party of a 1:1 DM.
    pub fn user(&self) -> &str {
        str_field(&self.0, "user").unwrap_or_default()
    }

    fn flag(&self, key: &str) -> bool {
        self.0.get(key).and_then(|v| v.as_bool()).unwrap_or(false)
    }

    pub fn is_archived(&self) -> bool {
        self.flag("is_archived")
    }

    pub fn is_member(&self) -> bool {
        self.flag("is_member")
    }

    pub fn is_mpim(&self) -> bool {
        self.flag("is_mpim")
    }

    /// Replace (or add) a field on the underlying record.
    pub fn set_field(&mut self, key: &str, value: Value) {
        if let Value::Object(map) = &mut self.0 {
            map.insert(key.to_string(), value);
        }
    }
}

/// A parsed Slack `ts`: whole seconds plus the fractional disambiguator.
///
/// Ordering compares seconds first, then the fraction as a decimal digit
/// string of any length, so `"5.1"` and `"5.100000"` compare equal. Only the
/// seconds are used to pick the calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Timestamp {
    seconds: i64,
    /// Fraction with trailing zeros removed.
    fraction: String,
}

impl Timestamp {
    /// Malformed only when the whole-seconds part is not an integer or there
    /// is more than one `.`.
    pub fn parse(ts: &str) -> Result<Self> {
        let malformed = || AppError::MalformedTimestamp(ts.to_string());

        let mut parts = ts.split('.');
        let whole = parts.next().ok_or_else(malformed)?;
        let fraction = parts.next().unwrap_or("");
        if parts.next().is_some() {
            return Err(malformed());
        }

        let seconds: i64 = whole.parse().map_err(|_| malformed())?;

        Ok(Self {
            seconds,
            fraction: fraction.trim_end_matches('0').to_string(),
        })
    }

    pub fn seconds(&self) -> i64 {
        self.seconds
    }

    /// UTC calendar day of this timestamp.
    pub fn date(&self) -> Result<NaiveDate> {
        Utc.timestamp_opt(self.seconds, 0)
            .single()
            .map(|dt| dt.date_naive())
            .ok_or_else(|| AppError::MalformedTimestamp(self.to_string()))
    }
}

// With trailing zeros gone, comparing digit strings byte-wise orders them
// as decimal fractions.
impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.seconds
            .cmp(&other.seconds)
            .then_with(|| self.fraction.cmp(&other.fraction))
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.fraction.is_empty() {
            write!(f, "{}", self.seconds)
        } else {
            write!(f, "{}.{}", self.seconds, self.fraction)
        }
    }
}

/// The three families of conversation the exporter handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationKind {
    PublicChannel,
    PrivateGroup,
    DirectMessage,
}

impl ConversationKind {
    /// Message subtype announcing a rename of this kind of conversation.
    /// 1:1 DMs cannot be renamed.
    pub fn rename_subtype(&self) -> Option<&'static str> {
        match self {
            ConversationKind::PublicChannel => Some("channel_name"),
            ConversationKind::PrivateGroup => Some("group_name"),
            ConversationKind::DirectMessage => None,
        }
    }

    /// `types` argument for `conversations.list`.
    pub fn list_types(&self) -> &'static str {
        match self {
            ConversationKind::PublicChannel => "public_channel",
            ConversationKind::PrivateGroup => "private_channel,mpim",
            ConversationKind::DirectMessage => "im",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ConversationKind::PublicChannel => "Public Channels",
            ConversationKind::PrivateGroup => "Private Channels and Group DMs",
            ConversationKind::DirectMessage => "1:1 DMs",
        }
    }
}
