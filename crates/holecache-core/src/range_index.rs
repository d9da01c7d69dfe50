//! Run-length index of captured entity identifiers.
//!
//! Captured ids are a sparse subset of the remote id space and arrive in no particular
//! order, so presence is recorded as disjoint half-open spans `[lower, upper)` rather
//! than one flag per id. Spans are kept normalized: overlapping or touching spans are
//! always coalesced, which makes the span list canonical for a given id set.
//!
//! ## On-disk format
//!
//! ```text
//! magic   "DXR\x01RangeSet\x01i32be"   raw UTF-8 bytes
//! count   u32 big-endian
//! spans   count x (lower: i32 BE, upper: i32 BE)
//! ```
//!
//! A missing file loads as an empty index. A file that does not start with the magic, or
//! whose length disagrees with its count, is an [`Error::Index`]: it is foreign or
//! truncated, not legitimately empty.

use std::collections::BTreeMap;
use std::collections::btree_map;
use std::fs;
use std::io::ErrorKind;
use std::iter::FlatMap;
use std::ops::Range;
use std::path::Path;

use tracing::debug;

use crate::document::write_atomic;
use crate::types::EntityId;
use crate::{Error, Result};

/// File magic identifying a range index.
pub const MAGIC: &[u8] = "DXR\u{1}RangeSet\u{1}i32be".as_bytes();

const COUNT_LEN: usize = 4;
const SPAN_LEN: usize = 8;

/// Enumeration direction over an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Lowest id first.
    Ascending,
    /// Highest id first.
    Descending,
}

impl Direction {
    /// Descending when `reversed`, ascending otherwise.
    #[must_use]
    pub const fn from_reversed(reversed: bool) -> Self {
        if reversed {
            Self::Descending
        } else {
            Self::Ascending
        }
    }
}

/// Normalized set of half-open id spans.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeIndex {
    /// `lower -> upper`, disjoint and non-adjacent.
    spans: BTreeMap<EntityId, EntityId>,
}

impl RangeIndex {
    /// Create an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a single id. Returns `false` if it was already present.
    pub fn insert(&mut self, id: EntityId) -> bool {
        if self.contains(id) {
            return false;
        }
        let Some(upper) = id.checked_add(1) else {
            return false;
        };
        self.insert_span(id, upper);
        true
    }

    /// Whether `id` is recorded as captured.
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.spans
            .range(..=id)
            .next_back()
            .is_some_and(|(_, &upper)| id < upper)
    }

    /// Whether no id is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Number of ids recorded.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.spans.iter().map(|(lower, upper)| upper - lower).sum()
    }

    /// Number of normalized spans.
    #[must_use]
    pub fn span_count(&self) -> usize {
        self.spans.len()
    }

    /// Normalized spans in increasing order.
    pub fn spans(&self) -> impl Iterator<Item = Range<EntityId>> + '_ {
        self.spans.iter().map(|(&lower, &upper)| lower..upper)
    }

    /// Every recorded id in increasing order.
    #[must_use]
    pub fn ascending(&self) -> Ids {
        self.clone().into_ids(Direction::Ascending)
    }

    /// Every recorded id in decreasing order.
    #[must_use]
    pub fn descending(&self) -> Ids {
        self.clone().into_ids(Direction::Descending)
    }

    /// Consume the index into an owned id sequence.
    #[must_use]
    pub fn into_ids(self, direction: Direction) -> Ids {
        let expand: fn((EntityId, EntityId)) -> Range<EntityId> = span_ids;
        Ids {
            inner: self.spans.into_iter().flat_map(expand),
            direction,
        }
    }

    /// Insert `[lower, upper)`, coalescing with every overlapping or touching span.
    fn insert_span(&mut self, mut lower: EntityId, mut upper: EntityId) {
        if lower >= upper {
            return;
        }
        if let Some((&prev_lower, &prev_upper)) = self.spans.range(..=lower).next_back() {
            if prev_upper >= lower {
                lower = prev_lower;
                upper = upper.max(prev_upper);
            }
        }
        let absorbed: Vec<EntityId> = self.spans.range(lower..=upper).map(|(&l, _)| l).collect();
        for key in absorbed {
            if let Some(end) = self.spans.remove(&key) {
                upper = upper.max(end);
            }
        }
        self.spans.insert(lower, upper);
    }

    /// Encode to the binary on-disk format.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Index`] if a span bound does not fit the 32-bit format.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let count = u32::try_from(self.spans.len())
            .map_err(|_| Error::Index(format!("Too many spans: {}", self.spans.len())))?;
        let mut out = Vec::with_capacity(MAGIC.len() + COUNT_LEN + self.spans.len() * SPAN_LEN);
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&count.to_be_bytes());
        for (&lower, &upper) in &self.spans {
            out.extend_from_slice(&narrow(lower)?.to_be_bytes());
            out.extend_from_slice(&narrow(upper)?.to_be_bytes());
        }
        Ok(out)
    }

    /// Decode from the binary on-disk format.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Index`] on a bad magic, a length that disagrees with the span
    /// count, or a negative or empty span.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let body = bytes
            .strip_prefix(MAGIC)
            .ok_or_else(|| Error::Index("Bad range index magic".into()))?;
        let (count, spans) = body
            .split_first_chunk::<COUNT_LEN>()
            .ok_or_else(|| Error::Index("Range index truncated before span count".into()))?;
        let count = u32::from_be_bytes(*count) as usize;
        if spans.len() != count.saturating_mul(SPAN_LEN) {
            return Err(Error::Index(format!(
                "Range index declares {count} spans but holds {} bytes of span data",
                spans.len()
            )));
        }

        let mut index = Self::new();
        for chunk in spans.chunks_exact(SPAN_LEN) {
            let (lower, upper) = chunk.split_at(SPAN_LEN / 2);
            let lower = widen(lower)?;
            let upper = widen(upper)?;
            if lower >= upper {
                return Err(Error::Index(format!("Empty span [{lower}, {upper})")));
            }
            index.insert_span(lower, upper);
        }
        Ok(index)
    }

    /// Load the index stored at `path`; a missing file is an empty index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file exists but cannot be read, or
    /// [`Error::Index`] if it cannot be decoded.
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read(path) {
            Ok(bytes) => Self::decode(&bytes)
                .map_err(|e| Error::Index(format!("{}: {e}", path.display()))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Self::new()),
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Persist the index at `path`, replacing any previous file atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be encoded or written.
    pub fn persist(&self, path: &Path) -> Result<()> {
        let bytes = self.encode()?;
        write_atomic(path, &bytes)?;
        debug!(
            "Persisted range index {} ({} spans)",
            path.display(),
            self.spans.len()
        );
        Ok(())
    }
}

impl FromIterator<EntityId> for RangeIndex {
    fn from_iter<I: IntoIterator<Item = EntityId>>(iter: I) -> Self {
        let mut index = Self::new();
        for id in iter {
            index.insert(id);
        }
        index
    }
}

fn span_ids((lower, upper): (EntityId, EntityId)) -> Range<EntityId> {
    lower..upper
}

fn narrow(bound: EntityId) -> Result<i32> {
    i32::try_from(bound)
        .map_err(|_| Error::Index(format!("Id bound {bound} exceeds the 32-bit index format")))
}

fn widen(bytes: &[u8]) -> Result<EntityId> {
    let raw: [u8; 4] = bytes
        .try_into()
        .map_err(|_| Error::Index("Malformed span bound".into()))?;
    let value = i32::from_be_bytes(raw);
    EntityId::try_from(value).map_err(|_| Error::Index(format!("Negative span bound {value}")))
}

/// Owned, lazy id sequence produced by [`RangeIndex::into_ids`].
pub struct Ids {
    inner: FlatMap<
        btree_map::IntoIter<EntityId, EntityId>,
        Range<EntityId>,
        fn((EntityId, EntityId)) -> Range<EntityId>,
    >,
    direction: Direction,
}

impl Iterator for Ids {
    type Item = EntityId;

    fn next(&mut self) -> Option<EntityId> {
        match self.direction {
            Direction::Ascending => self.inner.next(),
            Direction::Descending => self.inner.next_back(),
        }
    }
}
