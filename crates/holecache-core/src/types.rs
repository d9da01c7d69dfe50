//! Core data types: forum entities, listing order and session documents.
//!
//! Field names follow the forum API's JSON so the same document shape is used on the
//! wire and on disk. Every field except the identifier tolerates absence, and unknown
//! fields are ignored, so documents written by older or newer versions still load.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Server-assigned entity identifier, unique per kind and user namespace.
pub type EntityId = u64;

/// A discussion thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hole {
    /// Hole identifier.
    #[serde(rename = "hole_id")]
    pub id: EntityId,
    /// Division (board) the hole belongs to.
    #[serde(default)]
    pub division_id: EntityId,
    /// Creation time.
    pub time_created: Option<DateTime<Utc>>,
    /// Last update time, bumped whenever a floor is added.
    pub time_updated: Option<DateTime<Utc>>,
    /// Deletion time; `None` means the hole is not deleted.
    pub time_deleted: Option<DateTime<Utc>>,
    /// View counter.
    #[serde(default)]
    pub view: u64,
    /// Reply counter.
    #[serde(default)]
    pub reply: u64,
    /// Hidden by moderators.
    #[serde(default)]
    pub hidden: bool,
    /// Locked against new replies.
    #[serde(default)]
    pub locked: bool,
    /// First floor of the hole, when known.
    pub first_floor_id: Option<EntityId>,
    /// Most recent floor of the hole, when known.
    pub last_floor_id: Option<EntityId>,
    /// Tags attached to the hole.
    #[serde(default)]
    pub tag_ids: Vec<EntityId>,
}

impl Hole {
    /// Create a hole with only its identifier set.
    #[must_use]
    pub fn new(id: EntityId) -> Self {
        Self {
            id,
            division_id: 0,
            time_created: None,
            time_updated: None,
            time_deleted: None,
            view: 0,
            reply: 0,
            hidden: false,
            locked: false,
            first_floor_id: None,
            last_floor_id: None,
            tag_ids: Vec::new(),
        }
    }

    /// Whether the hole carries a deletion timestamp.
    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.time_deleted.is_some()
    }
}

/// A single post within a hole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Floor {
    /// Floor identifier.
    #[serde(rename = "floor_id")]
    pub id: EntityId,
    /// Owning hole. Authoritative for membership when enumerating a hole's floors.
    #[serde(default)]
    pub hole_id: EntityId,
    /// Post body.
    #[serde(default)]
    pub content: String,
    /// Author pseudonym.
    #[serde(default)]
    pub anonyname: String,
    /// When the floor was posted.
    pub time_created: Option<DateTime<Utc>>,
    /// When the floor was last edited.
    pub time_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub like: i64,
    #[serde(default)]
    pub dislike: i64,
    /// Whether the current user liked this floor.
    #[serde(default)]
    pub liked: bool,
    /// Whether the current user disliked this floor.
    #[serde(default)]
    pub disliked: bool,
    /// Soft-delete flag.
    #[serde(default)]
    pub deleted: bool,
    /// Modification counter.
    #[serde(default)]
    pub modified: i64,
    /// Fold reasons; a non-empty list means the floor is folded by default.
    #[serde(default)]
    pub fold: Vec<String>,
    #[serde(default)]
    pub special_tag: String,
    /// Whether the floor was posted by the current user.
    #[serde(default)]
    pub is_me: bool,
}

impl Floor {
    /// Create a floor with only its identifier and owning hole set.
    #[must_use]
    pub fn new(id: EntityId, hole_id: EntityId) -> Self {
        Self {
            id,
            hole_id,
            content: String::new(),
            anonyname: String::new(),
            time_created: None,
            time_updated: None,
            like: 0,
            dislike: 0,
            liked: false,
            disliked: false,
            deleted: false,
            modified: 0,
            fold: Vec::new(),
            special_tag: String::new(),
            is_me: false,
        }
    }
}

/// A label attached to holes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    #[serde(rename = "tag_id")]
    pub id: EntityId,
    #[serde(default)]
    pub name: String,
    /// Popularity counter.
    #[serde(default)]
    pub temperature: i64,
}

/// A hole together with the entities a listing shows next to it.
///
/// Remote listings embed tags and boundary floors; the retained path rebuilds the same
/// shape from whatever was captured, omitting pieces that were never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HoleBundle {
    /// The hole itself.
    pub hole: Hole,
    /// Tags attached to the hole.
    pub tags: Vec<Tag>,
    /// Opening floor, when known.
    pub first_floor: Option<Floor>,
    /// Most recent floor, when known.
    pub last_floor: Option<Floor>,
}

impl HoleBundle {
    /// Wrap a bare hole with no related entities.
    #[must_use]
    pub const fn bare(hole: Hole) -> Self {
        Self {
            hole,
            tags: Vec::new(),
            first_floor: None,
            last_floor: None,
        }
    }
}

/// Ordering of hole listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    /// Most recently replied first, keyed on `time_updated`.
    #[default]
    LastReplied,
    /// Most recently created first, keyed on `time_created`.
    LastCreated,
}

impl SortOrder {
    /// The timestamp a hole is ordered by under this sort order.
    #[must_use]
    pub const fn key_of(self, hole: &Hole) -> Option<DateTime<Utc>> {
        match self {
            Self::LastReplied => hole.time_updated,
            Self::LastCreated => hole.time_created,
        }
    }

    /// Query parameter value understood by the forum API.
    #[must_use]
    pub const fn as_query(self) -> &'static str {
        match self {
            Self::LastReplied => "time_updated",
            Self::LastCreated => "time_created",
        }
    }
}

/// Per-user navigation document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionState {
    /// Show listings oldest-first.
    pub reversed: bool,
    /// Last hole the user scrolled to.
    pub last_position: Option<EntityId>,
    /// When the hole listing was last refreshed from the remote source.
    pub last_refresh: Option<DateTime<Utc>>,
    /// Sort order used by the last listing.
    pub sort_order: Option<SortOrder>,
    /// Ordering timestamp of the last hole emitted by a remote listing.
    pub listing_cursor: Option<DateTime<Utc>>,
}

/// Per-(user, hole) navigation document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HoleSessionState {
    /// Show floors newest-first.
    pub reversed: bool,
    /// Last floor the user scrolled to.
    pub last_position: Option<EntityId>,
    /// When the floors were last refreshed from the remote source.
    pub last_refresh: Option<DateTime<Utc>>,
    /// Number of floors already read from the remote source in `reversed` order.
    pub floor_offset: Option<u64>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_hole_tolerates_missing_and_extra_fields() {
        let json = r#"{"hole_id": 42, "reply": 3, "unexpected": {"nested": true}}"#;
        let hole: Hole = serde_json::from_str(json).unwrap();
        assert_eq!(hole.id, 42);
        assert_eq!(hole.reply, 3);
        assert!(hole.tag_ids.is_empty());
        assert!(!hole.is_deleted());
    }

    #[test]
    fn test_hole_requires_identifier() {
        assert!(serde_json::from_str::<Hole>(r#"{"reply": 3}"#).is_err());
    }

    #[test]
    fn test_floor_wire_names() {
        let json = r#"{
            "floor_id": 7,
            "hole_id": 2,
            "content": "hello",
            "anonyname": "Alice",
            "time_created": "2023-03-01T10:00:00+08:00",
            "fold": ["spoiler"],
            "is_me": true
        }"#;
        let floor: Floor = serde_json::from_str(json).unwrap();
        assert_eq!(floor.id, 7);
        assert_eq!(floor.hole_id, 2);
        assert_eq!(floor.fold, vec!["spoiler".to_string()]);
        assert!(floor.is_me);
        assert_eq!(
            floor.time_created.unwrap().to_rfc3339(),
            "2023-03-01T02:00:00+00:00"
        );
    }

    #[test]
    fn test_sort_order_keys() {
        let mut hole = Hole::new(1);
        hole.time_created = Some("2023-01-01T00:00:00Z".parse().unwrap());
        hole.time_updated = Some("2023-02-01T00:00:00Z".parse().unwrap());

        assert_eq!(SortOrder::LastReplied.key_of(&hole), hole.time_updated);
        assert_eq!(SortOrder::LastCreated.key_of(&hole), hole.time_created);
        assert_eq!(SortOrder::LastCreated.as_query(), "time_created");
    }

    #[test]
    fn test_session_state_defaults_from_empty_document() {
        let state: SessionState = serde_json::from_str("{}").unwrap();
        assert_eq!(state, SessionState::default());
        let hole_state: HoleSessionState = serde_json::from_str(r#"{"reversed": true}"#).unwrap();
        assert!(hole_state.reversed);
        assert_eq!(hole_state.floor_offset, None);
    }
}
