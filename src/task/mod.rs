//! Todo records and their wire representation.
//!
//! A [`TaskRecord`] is the stored form of a todo item. Clients never build one
//! directly: they send a [`TaskDraft`] and the [`TaskStore`](crate::store::TaskStore)
//! assigns the identifier and the internal flags.
//!
//! Timestamps are rendered with [`format_rfc3339_nano`], which is both the wire
//! format of the `date` field and the key used by due-date lookups.

use chrono::{DateTime, FixedOffset, NaiveDate, Timelike};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A single todo item as held by the store.
///
/// `notification_sent` is internal state owned by the notification scanner.
/// It is skipped entirely when serializing.
///
/// # Examples
///
/// ```
/// use duetodo::task::{TaskDraft, TaskRecord};
///
/// let record = TaskRecord::from_draft("a1".to_owned(), TaskDraft::titled("pay bills"));
/// let json = serde_json::to_value(&record).unwrap();
/// assert_eq!(json["title"], "pay bills");
/// assert_eq!(json["date"], "0001-01-01T00:00:00Z");
/// assert!(json.get("notification_sent").is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: String,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    #[serde(rename = "date", serialize_with = "serialize_rfc3339_nano")]
    pub due_date: DateTime<FixedOffset>,
    pub completed: bool,
    #[serde(skip)]
    pub notification_sent: bool,
}

impl TaskRecord {
    /// Builds a fresh record from a draft.
    ///
    /// `completed` and `notification_sent` always start out `false`, whatever
    /// the draft says.
    pub fn from_draft(id: String, draft: TaskDraft) -> Self {
        Self {
            id,
            title: draft.title,
            description: draft.description,
            tags: draft.tags,
            due_date: draft.due_date,
            completed: false,
            notification_sent: false,
        }
    }

    /// The zero-valued record: empty strings, no tags, the zero timestamp.
    pub fn empty() -> Self {
        Self::from_draft(String::new(), TaskDraft::default())
    }

    /// Overwrites every client-editable field with the draft's values.
    ///
    /// `id` and `notification_sent` are left alone.
    pub fn apply(&mut self, draft: TaskDraft) {
        self.title = draft.title;
        self.description = draft.description;
        self.tags = draft.tags;
        self.due_date = draft.due_date;
        self.completed = draft.completed;
    }

    /// Returns `true` if any of the record's tags equals `tag`.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Client-supplied fields for creating or replacing a todo.
///
/// Every field is optional on the wire; missing fields take their zero value.
/// Unknown keys (including `id`) are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TaskDraft {
    pub title: String,
    pub description: String,
    #[serde(deserialize_with = "nullable_tags")]
    pub tags: Vec<String>,
    #[serde(rename = "date")]
    pub due_date: DateTime<FixedOffset>,
    pub completed: bool,
}

impl TaskDraft {
    /// A draft with only the title set.
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Sets the due date.
    #[must_use]
    pub fn due(mut self, due_date: DateTime<FixedOffset>) -> Self {
        self.due_date = due_date;
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Appends a tag.
    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Sets the completion flag. Ignored by `create`.
    #[must_use]
    pub fn completed(mut self, completed: bool) -> Self {
        self.completed = completed;
        self
    }
}

impl Default for TaskDraft {
    fn default() -> Self {
        Self {
            title: String::new(),
            description: String::new(),
            tags: Vec::new(),
            due_date: zero_time(),
            completed: false,
        }
    }
}

/// The zero timestamp, `0001-01-01T00:00:00Z`.
pub fn zero_time() -> DateTime<FixedOffset> {
    let naive = NaiveDate::from_ymd_opt(1, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default();
    naive.and_utc().fixed_offset()
}

/// Renders a timestamp as RFC 3339 with up to nanosecond precision.
///
/// Trailing zeros of the fractional second are trimmed (the fraction is
/// dropped entirely when zero) and a zero UTC offset is written as `Z`.
/// Two instants that are equal but carry different offsets render
/// differently.
///
/// # Examples
///
/// ```
/// use chrono::DateTime;
/// use duetodo::task::format_rfc3339_nano;
///
/// let ts = DateTime::parse_from_rfc3339("2024-01-01T10:30:00.250+02:00").unwrap();
/// assert_eq!(format_rfc3339_nano(&ts), "2024-01-01T10:30:00.25+02:00");
///
/// let utc = DateTime::parse_from_rfc3339("2024-01-01T00:00:00+00:00").unwrap();
/// assert_eq!(format_rfc3339_nano(&utc), "2024-01-01T00:00:00Z");
/// ```
pub fn format_rfc3339_nano(ts: &DateTime<FixedOffset>) -> String {
    let mut out = ts.format("%Y-%m-%dT%H:%M:%S").to_string();

    // chrono encodes a leap second as nanos >= 1e9.
    let nanos = ts.nanosecond() % 1_000_000_000;
    if nanos != 0 {
        let fraction = format!("{nanos:09}");
        out.push('.');
        out.push_str(fraction.trim_end_matches('0'));
    }

    let offset = ts.offset().local_minus_utc();
    if offset == 0 {
        out.push('Z');
    } else {
        let sign = if offset < 0 { '-' } else { '+' };
        let abs = offset.unsigned_abs();
        out.push_str(&format!("{sign}{:02}:{:02}", abs / 3600, (abs % 3600) / 60));
    }

    out
}

fn serialize_rfc3339_nano<S>(ts: &DateTime<FixedOffset>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format_rfc3339_nano(ts))
}

// `"tags": null` is accepted as an empty list.
fn nullable_tags<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<Vec<String>>::deserialize(deserializer).map(Option::unwrap_or_default)
}
