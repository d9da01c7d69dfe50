//! Per-user durable store for holes, floors and tags.
//!
//! ## Storage Layout
//!
//! ```text
//! users/<user_id>/
//!   holes/
//!     <id>.json             # one document per hole
//!     indices.bin           # range index of captured hole ids
//!   floors/
//!     <id>.json
//!     indices.bin
//!   tags/
//!     <id>.json             # not indexed, loaded by id from holes
//!   session_state/
//!     current.json
//!     <hole_id>/session_state.json
//! ```
//!
//! A store writes the document first and the index second. The two writes are not
//! coupled, so an id can be indexed without a readable document after a crash; every
//! enumeration skips such ids exactly like ids that were never captured.
//!
//! ## Thread Safety
//!
//! The store holds no mutable state besides the filesystem. Concurrent stores of the same
//! kind must be serialized by the caller, because the index update is read-modify-write.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::document;
use crate::range_index::{Direction, RangeIndex};
use crate::types::{EntityId, Floor, Hole, HoleBundle, Tag};
use crate::{Error, Result};

const INDEX_FILE: &str = "indices.bin";

/// Entity collections kept by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Hole,
    Floor,
    Tag,
}

impl EntityKind {
    /// Directory name of the collection.
    #[must_use]
    pub const fn dir_name(self) -> &'static str {
        match self {
            Self::Hole => "holes",
            Self::Floor => "floors",
            Self::Tag => "tags",
        }
    }

    /// Whether captured ids of this kind are tracked in a range index.
    #[must_use]
    pub const fn is_indexed(self) -> bool {
        !matches!(self, Self::Tag)
    }
}

/// An entity the store can persist.
pub trait Retained: Serialize + DeserializeOwned {
    /// Collection the entity lives in.
    const KIND: EntityKind;

    /// Identifier the entity is filed under.
    fn entity_id(&self) -> EntityId;
}

impl Retained for Hole {
    const KIND: EntityKind = EntityKind::Hole;

    fn entity_id(&self) -> EntityId {
        self.id
    }
}

impl Retained for Floor {
    const KIND: EntityKind = EntityKind::Floor;

    fn entity_id(&self) -> EntityId {
        self.id
    }
}

impl Retained for Tag {
    const KIND: EntityKind = EntityKind::Tag;

    fn entity_id(&self) -> EntityId {
        self.id
    }
}

/// Retained entities of one user namespace.
#[derive(Debug, Clone)]
pub struct RetainedStore {
    root: PathBuf,
}

impl RetainedStore {
    /// Open the store rooted at a user namespace directory.
    #[must_use]
    pub fn at(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Namespace directory of this store.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn kind_dir(&self, kind: EntityKind) -> PathBuf {
        self.root.join(kind.dir_name())
    }

    /// Path of the document for `id` of `kind`.
    #[must_use]
    pub fn document_path(&self, kind: EntityKind, id: EntityId) -> PathBuf {
        self.kind_dir(kind).join(format!("{id}.json"))
    }

    /// Path of the range index for `kind`.
    #[must_use]
    pub fn index_path(&self, kind: EntityKind) -> PathBuf {
        self.kind_dir(kind).join(INDEX_FILE)
    }

    /// Path of the per-user session document.
    #[must_use]
    pub fn session_path(&self) -> PathBuf {
        self.root.join("session_state").join("current.json")
    }

    /// Path of the per-(user, hole) session document.
    #[must_use]
    pub fn hole_session_path(&self, hole_id: EntityId) -> PathBuf {
        self.root
            .join("session_state")
            .join(hole_id.to_string())
            .join("session_state.json")
    }

    // === Entity Operations ===

    /// Store an entity: document first, then its id in the kind's range index.
    ///
    /// Re-storing an entity overwrites the whole document. The index file is only
    /// rewritten when the id was not yet present.
    ///
    /// # Errors
    ///
    /// Returns an error if the document or index cannot be written, or if the existing
    /// index is corrupt.
    pub fn store<T: Retained>(&self, entity: &T) -> Result<()> {
        let id = entity.entity_id();
        document::write(&self.document_path(T::KIND, id), entity)?;

        if T::KIND.is_indexed() {
            let path = self.index_path(T::KIND);
            let mut index = RangeIndex::load(&path)?;
            if index.insert(id) {
                index.persist(&path)?;
            }
        }

        debug!("Stored {} {}", T::KIND.dir_name(), id);
        Ok(())
    }

    /// Load an entity, or `None` when absent, undecodable, or filed under the wrong id.
    #[must_use]
    pub fn load<T: Retained>(&self, id: EntityId) -> Option<T> {
        let entity: T = document::read(&self.document_path(T::KIND, id))?;
        if entity.entity_id() != id {
            warn!(
                "Ignoring {} document {} that describes id {}",
                T::KIND.dir_name(),
                id,
                entity.entity_id()
            );
            return None;
        }
        Some(entity)
    }

    /// Store a hole.
    pub fn store_hole(&self, hole: &Hole) -> Result<()> {
        self.store(hole)
    }

    /// Store a floor.
    pub fn store_floor(&self, floor: &Floor) -> Result<()> {
        self.store(floor)
    }

    /// Store a tag.
    pub fn store_tag(&self, tag: &Tag) -> Result<()> {
        self.store(tag)
    }

    /// Load a hole by id.
    #[must_use]
    pub fn load_hole(&self, id: EntityId) -> Option<Hole> {
        self.load(id)
    }

    /// Load a floor by id.
    #[must_use]
    pub fn load_floor(&self, id: EntityId) -> Option<Floor> {
        self.load(id)
    }

    /// Load a tag by id.
    #[must_use]
    pub fn load_tag(&self, id: EntityId) -> Option<Tag> {
        self.load(id)
    }

    /// Store a hole together with its tags and boundary floors.
    ///
    /// Every entity is attempted even after an earlier one fails; each failure is logged.
    ///
    /// # Errors
    ///
    /// Returns the first failure once all entities have been attempted.
    pub fn store_bundle(&self, bundle: &HoleBundle) -> Result<()> {
        let mut first_error = None;
        let mut attempt = |result: Result<()>, kind: EntityKind, id: EntityId| {
            if let Err(e) = result {
                warn!("Failed to store {} {id}: {e}", kind.dir_name());
                first_error.get_or_insert(e);
            }
        };

        attempt(self.store(&bundle.hole), EntityKind::Hole, bundle.hole.id);
        for tag in &bundle.tags {
            attempt(self.store(tag), EntityKind::Tag, tag.id);
        }
        for floor in bundle.first_floor.iter().chain(bundle.last_floor.iter()) {
            attempt(self.store(floor), EntityKind::Floor, floor.id);
        }

        first_error.map_or(Ok(()), Err)
    }

    /// Rebuild a hole bundle from whatever related entities were captured.
    #[must_use]
    pub fn load_bundle(&self, hole: Hole) -> HoleBundle {
        let tags = hole
            .tag_ids
            .iter()
            .filter_map(|&id| self.load_tag(id))
            .collect();
        let first_floor = hole.first_floor_id.and_then(|id| self.load_floor(id));
        let last_floor = hole.last_floor_id.and_then(|id| self.load_floor(id));
        HoleBundle {
            hole,
            tags,
            first_floor,
            last_floor,
        }
    }

    // === Index Operations ===

    /// Load the range index of an indexed kind.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Index`] if the index file is corrupt.
    pub fn index(&self, kind: EntityKind) -> Result<RangeIndex> {
        if !kind.is_indexed() {
            return Err(Error::Storage(format!("{} are not indexed", kind.dir_name())));
        }
        RangeIndex::load(&self.index_path(kind))
    }

    /// Rebuild a kind's range index from the documents present on disk.
    ///
    /// Recovers from a corrupt index: only documents that decode under their file name
    /// are re-admitted.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection cannot be listed or the index cannot be written.
    pub fn rebuild_index(&self, kind: EntityKind) -> Result<RangeIndex> {
        let index = match kind {
            EntityKind::Hole => self.scan_documents::<Hole>()?,
            EntityKind::Floor => self.scan_documents::<Floor>()?,
            EntityKind::Tag => {
                return Err(Error::Storage("tags are not indexed".into()));
            },
        };
        index.persist(&self.index_path(kind))?;
        info!(
            "Rebuilt {} index: {} ids in {} spans",
            kind.dir_name(),
            index.len(),
            index.span_count()
        );
        Ok(index)
    }

    fn scan_documents<T: Retained>(&self) -> Result<RangeIndex> {
        let dir = self.kind_dir(T::KIND);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(RangeIndex::new()),
            Err(e) => {
                return Err(Error::Storage(format!(
                    "Failed to list {}: {e}",
                    dir.display()
                )));
            },
        };

        let index = entries
            .flatten()
            .filter_map(|entry| {
                let path = entry.path();
                let is_json = path.extension().is_some_and(|ext| ext == "json");
                if !is_json {
                    return None;
                }
                path.file_stem()?.to_str()?.parse::<EntityId>().ok()
            })
            .filter(|&id| self.load::<T>(id).is_some())
            .collect();
        Ok(index)
    }

    // === Enumeration ===

    /// Captured holes in id order, which is creation order for server-assigned ids.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Index`] if the hole index is corrupt.
    pub fn holes_by_creation(
        &self,
        direction: Direction,
    ) -> Result<impl Iterator<Item = Hole> + Send + use<>> {
        let ids = self.index(EntityKind::Hole)?.into_ids(direction);
        let store = self.clone();
        Ok(ids.filter_map(move |id| store.load_hole(id)))
    }

    /// Captured holes, most recently replied first.
    ///
    /// Walks the floor index from the newest floor down and maps each floor to its owning
    /// hole, so a hole surfaces at the position of its newest captured floor. Holes with
    /// no captured floor follow, newest id first. Each hole is yielded once.
    ///
    /// This reads every captured floor document in the worst case.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Index`] if either index is corrupt.
    pub fn holes_by_update(&self) -> Result<impl Iterator<Item = Hole> + Send + use<>> {
        let floor_ids = self.index(EntityKind::Floor)?.into_ids(Direction::Descending);
        let hole_ids = self.index(EntityKind::Hole)?.into_ids(Direction::Descending);

        let floors = self.clone();
        let holes = self.clone();
        let mut seen = HashSet::new();

        let owners = floor_ids.filter_map(move |id| floors.load_floor(id).map(|f| f.hole_id));
        Ok(owners
            .chain(hole_ids)
            .filter(move |&id| seen.insert(id))
            .filter_map(move |id| holes.load_hole(id)))
    }

    /// Captured floors of one hole, in id order or reversed.
    ///
    /// The floor index is not partitioned by hole, so this walks every captured floor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Index`] if the floor index is corrupt.
    pub fn floors_of(
        &self,
        hole_id: EntityId,
        reversed: bool,
    ) -> Result<impl Iterator<Item = Floor> + Send + use<>> {
        let ids = self
            .index(EntityKind::Floor)?
            .into_ids(Direction::from_reversed(reversed));
        let store = self.clone();
        Ok(ids
            .filter_map(move |id| store.load_floor(id))
            .filter(move |floor| floor.hole_id == hole_id))
    }
}
