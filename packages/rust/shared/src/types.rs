//! Core domain types: collections, recorded items, groups, and manifests.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current schema version for the persisted group manifest format.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Delimiter between the segments of an [`ItemId`].
pub const ID_DELIMITER: char = '-';

/// Prefix of the collection segment of an [`ItemId`] (e.g. `IETF121`).
pub const COLLECTION_PREFIX: &str = "IETF";

// ---------------------------------------------------------------------------
// CollectionId
// ---------------------------------------------------------------------------

/// A numbered batch of items processed together (one meeting).
///
/// Ordering is numeric, so `3 < 12 < 101`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectionId(pub u32);

impl std::fmt::Display for CollectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for CollectionId {
    type Err = std::num::ParseIntError;

    /// Accepts `121` as well as `IETF121` (case-insensitive prefix).
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = match trimmed.get(..COLLECTION_PREFIX.len()) {
            Some(prefix) if prefix.eq_ignore_ascii_case(COLLECTION_PREFIX) => {
                &trimmed[COLLECTION_PREFIX.len()..]
            }
            _ => trimmed,
        };
        Ok(Self(digits.parse()?))
    }
}

// ---------------------------------------------------------------------------
// ItemId
// ---------------------------------------------------------------------------

/// Stable identifier of one raw recording.
///
/// Format: `IETF{collection}-{NAME}-{YYYYMMDD}-{HHMM}`. The name may itself
/// contain the delimiter (`IETF121-IAB-OPEN-20241105-0930`), so the first
/// segment is the collection token, the last two are the timestamp, and
/// everything in between is the name. All accessors are lenient and return
/// `None` for identifiers that do not follow the format.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    /// Wrap a raw identifier string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn segments(&self) -> Vec<&str> {
        self.0.split(ID_DELIMITER).collect()
    }

    /// Display name encoded between the collection and timestamp segments.
    pub fn display_name(&self) -> Option<&str> {
        let segments = self.segments();
        if segments.len() < 4 {
            return None;
        }
        let start = segments[0].len() + 1;
        let tail = segments[segments.len() - 2].len() + segments[segments.len() - 1].len() + 2;
        let end = self.0.len().checked_sub(tail)?;
        let name = self.0.get(start..end)?;
        (!name.is_empty()).then_some(name)
    }

    /// Session start time encoded in the last two segments (`YYYYMMDD`, `HHMM`).
    pub fn timestamp(&self) -> Option<NaiveDateTime> {
        let segments = self.segments();
        if segments.len() < 3 {
            return None;
        }
        let date = segments[segments.len() - 2];
        let time = segments[segments.len() - 1];
        parse_compact_timestamp(date, time)
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Parse `YYYYMMDD` + `HHMM` into a timestamp, rejecting anything else.
fn parse_compact_timestamp(date: &str, time: &str) -> Option<NaiveDateTime> {
    let all_digits = |s: &str, len: usize| s.len() == len && s.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(date, 8) || !all_digits(time, 4) {
        return None;
    }

    let year: i32 = date[..4].parse().ok()?;
    let month: u32 = date[4..6].parse().ok()?;
    let day: u32 = date[6..].parse().ok()?;
    let hour: u32 = time[..2].parse().ok()?;
    let minute: u32 = time[2..].parse().ok()?;

    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, 0)
}

// ---------------------------------------------------------------------------
// Item
// ---------------------------------------------------------------------------

/// One raw recording as reported by an item source. Never persisted directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub id: ItemId,
    /// Not unique: items sharing a display name form one group.
    pub display_name: String,
    /// Link to the original recording, if known.
    pub external_ref: Option<String>,
}

impl Item {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: ItemId::new(id),
            display_name: display_name.into(),
            external_ref: None,
        }
    }

    pub fn with_external_ref(mut self, external_ref: impl Into<String>) -> Self {
        self.external_ref = Some(external_ref.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Group / GroupManifest
// ---------------------------------------------------------------------------

/// A processed item as recorded in a group manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMember {
    pub item_id: ItemId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_ref: Option<String>,
}

impl From<&Item> for GroupMember {
    fn from(item: &Item) -> Self {
        Self {
            item_id: item.id.clone(),
            external_ref: item.external_ref.clone(),
        }
    }
}

/// All successfully processed items sharing one display name, in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub display_name: String,
    pub members: Vec<GroupMember>,
}

/// The durable record of one collection's groups, rewritten as a whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupManifest {
    /// Schema version for forward compatibility.
    pub schema_version: u32,
    pub collection: CollectionId,
    /// When the collect run that produced this manifest finished.
    pub generated_at: DateTime<Utc>,
    /// Groups in the order they were supplied.
    pub groups: Vec<Group>,
}

impl GroupManifest {
    /// Stamp a new manifest with the current time and schema version.
    pub fn new(collection: CollectionId, groups: Vec<Group>) -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            collection,
            generated_at: Utc::now(),
            groups,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_id_parses_with_or_without_prefix() {
        assert_eq!("121".parse::<CollectionId>().unwrap(), CollectionId(121));
        assert_eq!("IETF121".parse::<CollectionId>().unwrap(), CollectionId(121));
        assert_eq!("ietf99".parse::<CollectionId>().unwrap(), CollectionId(99));
        assert!("IETF".parse::<CollectionId>().is_err());
        assert!("abc".parse::<CollectionId>().is_err());
    }

    #[test]
    fn collection_ids_order_numerically() {
        let mut ids = vec![CollectionId(12), CollectionId(3), CollectionId(101)];
        ids.sort();
        assert_eq!(ids, vec![CollectionId(3), CollectionId(12), CollectionId(101)]);
    }

    #[test]
    fn item_id_parts() {
        let id = ItemId::new("IETF121-DNSOP-20241105-1300");
        assert_eq!(id.display_name(), Some("DNSOP"));
        let ts = id.timestamp().expect("timestamp");
        assert_eq!(ts.format("%Y-%m-%d %H:%M").to_string(), "2024-11-05 13:00");
    }

    #[test]
    fn item_id_name_may_contain_delimiter() {
        let id = ItemId::new("IETF121-IAB-OPEN-20241105-0930");
        assert_eq!(id.display_name(), Some("IAB-OPEN"));
        assert!(id.timestamp().is_some());
    }

    #[test]
    fn item_id_malformed_timestamp_is_none() {
        assert!(ItemId::new("IETF121-DNSOP-2024115-1300").timestamp().is_none());
        assert!(ItemId::new("IETF121-DNSOP-20241305-1300").timestamp().is_none());
        assert!(ItemId::new("IETF121-DNSOP-20241105-13h0").timestamp().is_none());
        assert!(ItemId::new("A1").timestamp().is_none());
        assert!(ItemId::new("A1").display_name().is_none());
    }

    #[test]
    fn manifest_serialization_preserves_order() {
        let manifest = GroupManifest::new(
            CollectionId(121),
            vec![
                Group {
                    display_name: "X".into(),
                    members: vec![
                        GroupMember {
                            item_id: "A1".into(),
                            external_ref: Some("https://example.com/a1".into()),
                        },
                        GroupMember {
                            item_id: "A2".into(),
                            external_ref: None,
                        },
                    ],
                },
                Group {
                    display_name: "Y".into(),
                    members: vec![GroupMember {
                        item_id: "B1".into(),
                        external_ref: None,
                    }],
                },
            ],
        );

        let json = serde_json::to_string_pretty(&manifest).expect("serialize");
        assert!(!json.contains("\"external_ref\": null"));
        let parsed: GroupManifest = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, manifest);
        assert_eq!(parsed.groups[0].members[1].item_id.as_str(), "A2");
        assert_eq!(
            parsed.groups[0].members[0].external_ref.as_deref(),
            Some("https://example.com/a1")
        );
    }
}
