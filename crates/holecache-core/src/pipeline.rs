//! Source-agnostic streaming of holes and floors.
//!
//! A [`ContentPipeline`] turns a listing request into one lazy, single-pass stream,
//! whichever source backs it:
//!
//! - **Remote**: pages are requested from a [`RemoteSource`] with an advancing cursor.
//!   Every item is handed to the consumer first. It is then captured into the
//!   [`RetainedStore`] and the resume point past it is recorded, even when the consumer
//!   stops right there. Capture failures are logged and dropped; they never alter what
//!   the consumer sees. A remote failure is yielded as the stream's last item.
//! - **Retained**: the retained store's enumeration is replayed. No network access.
//!
//! Streams are pull-driven. Nothing is fetched or captured until the consumer polls, and
//! dropping the stream abandons any in-flight request and stops further ones.
//!
//! ```text
//! Start -> Fetching(cursor) -> Emitting(page, i) -> Fetching(next) -> ... -> Ended
//!                  \__ short page / empty page / stalled cursor ________/
//! ```

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{Error, Result};
use crate::range_index::Direction;
use crate::retained::RetainedStore;
use crate::session::SessionStateManager;
use crate::types::{EntityId, Floor, Hole, HoleBundle, HoleSessionState, SortOrder};

/// Which source a pipeline reads from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentSource {
    /// The remote forum API, with write-through capture.
    #[default]
    Remote,
    /// Previously captured content only.
    Retained,
}

/// One page request for a hole listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HolePageRequest {
    /// Only holes ordered strictly before this timestamp.
    pub before: DateTime<Utc>,
    /// Maximum number of holes to return.
    pub size: usize,
    /// Which timestamp orders the listing.
    pub order: SortOrder,
    /// Restrict to one division.
    pub division: Option<EntityId>,
}

/// One page request for the floors of a hole.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FloorPageRequest {
    /// The hole whose floors are listed.
    pub hole_id: EntityId,
    /// Number of floors to skip in the requested direction.
    pub offset: u64,
    /// Maximum number of floors to return.
    pub size: usize,
    /// Newest floor first.
    pub reversed: bool,
}

/// The remote forum API as seen by the pipeline.
///
/// Implementations return one ordered page per call or fail. Retrying belongs to the
/// implementation; the pipeline ends the stream on the first error.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Load one page of holes.
    async fn load_holes(&self, request: HolePageRequest) -> Result<Vec<HoleBundle>>;

    /// Load one page of floors.
    async fn load_floors(&self, request: FloorPageRequest) -> Result<Vec<Floor>>;
}

/// Where a hole listing starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HoleStart {
    /// From the newest hole, recording a fresh refresh time.
    #[default]
    Latest,
    /// From the cursor left behind by the previous remote listing.
    Resume,
    /// Strictly before an explicit timestamp.
    Before(DateTime<Utc>),
}

/// A hole listing request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HoleQuery {
    /// Which timestamp orders the listing.
    pub order: SortOrder,
    /// Restrict to one division.
    pub division: Option<EntityId>,
    /// Where the listing starts.
    pub start: HoleStart,
}

impl HoleQuery {
    /// Continue the previous remote listing in `order`.
    #[must_use]
    pub fn resume(order: SortOrder) -> Self {
        Self {
            order,
            division: None,
            start: HoleStart::Resume,
        }
    }
}

/// Where a floor listing starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FloorStart {
    /// From the first floor in the listing direction, recording a fresh refresh time.
    #[default]
    Beginning,
    /// From the offset recorded for the hole by the previous remote listing, when it was
    /// counted in the same direction.
    Resume,
    /// After skipping this many floors.
    Offset(u64),
}

/// A floor listing request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FloorQuery {
    /// The hole whose floors are listed.
    pub hole_id: EntityId,
    /// Newest first; `None` uses the hole's session state.
    pub reversed: Option<bool>,
    /// Where the listing starts.
    pub start: FloorStart,
}

impl FloorQuery {
    /// All floors of a hole from the first, in the hole's remembered direction.
    #[must_use]
    pub fn of(hole_id: EntityId) -> Self {
        Self {
            hole_id,
            ..Self::default()
        }
    }
}

enum Mode {
    Remote {
        source: Arc<dyn RemoteSource>,
        page_size: usize,
    },
    Retained,
}

/// Unified listing pipeline over one user namespace.
pub struct ContentPipeline {
    mode: Mode,
    store: RetainedStore,
    sessions: SessionStateManager,
}

impl ContentPipeline {
    /// Pipeline reading from `source` and capturing into `store`.
    #[must_use]
    pub fn remote(
        source: Arc<dyn RemoteSource>,
        store: RetainedStore,
        sessions: SessionStateManager,
        page_size: usize,
    ) -> Self {
        Self {
            mode: Mode::Remote {
                source,
                page_size: page_size.max(1),
            },
            store,
            sessions,
        }
    }

    /// Pipeline replaying `store` only.
    #[must_use]
    pub const fn retained(store: RetainedStore, sessions: SessionStateManager) -> Self {
        Self {
            mode: Mode::Retained,
            store,
            sessions,
        }
    }

    /// The source this pipeline reads from.
    #[must_use]
    pub const fn source(&self) -> ContentSource {
        match self.mode {
            Mode::Remote { .. } => ContentSource::Remote,
            Mode::Retained => ContentSource::Retained,
        }
    }

    /// Stream holes for `query`.
    #[must_use]
    pub fn holes(&self, query: HoleQuery) -> BoxStream<'static, Result<HoleBundle>> {
        match &self.mode {
            Mode::Remote { source, page_size } => {
                let pager = HolePager {
                    source: Arc::clone(source),
                    sessions: self.sessions.clone(),
                    query,
                    cursor: None,
                };
                paged_stream(pager, self.store.clone(), *page_size)
            },
            Mode::Retained => self.retained_holes(query),
        }
    }

    /// Stream the floors of one hole for `query`.
    #[must_use]
    pub fn floors(&self, query: FloorQuery) -> BoxStream<'static, Result<Floor>> {
        match &self.mode {
            Mode::Remote { source, page_size } => {
                let pager = FloorPager {
                    source: Arc::clone(source),
                    sessions: self.sessions.clone(),
                    query,
                    position: None,
                    delivered: 0,
                };
                paged_stream(pager, self.store.clone(), *page_size)
            },
            Mode::Retained => self.retained_floors(query),
        }
    }

    fn retained_holes(&self, query: HoleQuery) -> BoxStream<'static, Result<HoleBundle>> {
        let store = self.store.clone();
        let sessions = self.sessions.clone();
        blocking_stream(move || {
            let cursor = match query.start {
                HoleStart::Latest => None,
                HoleStart::Resume => sessions.get().listing_cursor,
                HoleStart::Before(at) => Some(at),
            };
            let holes: Box<dyn Iterator<Item = Hole> + Send> = match query.order {
                SortOrder::LastCreated => Box::new(store.holes_by_creation(Direction::Descending)?),
                SortOrder::LastReplied => Box::new(store.holes_by_update()?),
            };

            let order = query.order;
            let division = query.division;
            let bundles = holes
                .filter(move |hole| division.is_none_or(|d| hole.division_id == d))
                .filter(move |hole| {
                    cursor.is_none_or(|c| order.key_of(hole).is_none_or(|key| key < c))
                })
                .map(move |hole| store.load_bundle(hole));
            Ok(bundles)
        })
    }

    fn retained_floors(&self, query: FloorQuery) -> BoxStream<'static, Result<Floor>> {
        let store = self.store.clone();
        let sessions = self.sessions.clone();
        blocking_stream(move || {
            let remembered = sessions.get_hole(query.hole_id);
            let reversed = query.reversed.unwrap_or(remembered.reversed);
            let skip = match query.start {
                FloorStart::Beginning => 0,
                FloorStart::Resume => resume_offset(&remembered, reversed),
                FloorStart::Offset(offset) => offset,
            };
            let skip = usize::try_from(skip).unwrap_or(usize::MAX);
            Ok(store.floors_of(query.hole_id, reversed)?.skip(skip))
        })
    }
}

/// Blocking work owed for one emitted item.
type Settle = Box<dyn FnOnce() + Send + 'static>;

/// One remote listing's cursor logic.
#[async_trait]
trait Pager: Send + 'static {
    type Item: Send + 'static;

    /// Fetch the page at the current cursor and advance the cursor past it.
    ///
    /// Returns the page and whether a further page can be requested.
    async fn next_page(&mut self, size: usize) -> Result<(Vec<Self::Item>, bool)>;

    /// Called as `item` is handed to the consumer. The returned job captures it and
    /// records the resume point just past it; failures are logged, never returned.
    fn settle(&mut self, store: &RetainedStore, item: &Self::Item) -> Settle;
}

struct HolePager {
    source: Arc<dyn RemoteSource>,
    sessions: SessionStateManager,
    query: HoleQuery,
    cursor: Option<DateTime<Utc>>,
}

#[async_trait]
impl Pager for HolePager {
    type Item = HoleBundle;

    async fn next_page(&mut self, size: usize) -> Result<(Vec<HoleBundle>, bool)> {
        let before = match self.cursor {
            Some(cursor) => cursor,
            None => {
                let start = self.query.start;
                let order = self.query.order;
                let sessions = self.sessions.clone();
                tokio::task::spawn_blocking(move || resolve_hole_cursor(&sessions, start, order))
                    .await?
            },
        };

        let request = HolePageRequest {
            before,
            size,
            order: self.query.order,
            division: self.query.division,
        };
        debug!("Requesting holes before {before} ({size} per page)");
        let page = self.source.load_holes(request).await?;

        let next = page.last().and_then(|b| self.query.order.key_of(&b.hole));
        let advanced = match next {
            Some(next) if next < before => {
                self.cursor = Some(next);
                true
            },
            Some(_) => {
                warn!("Hole cursor did not advance past {before}; ending listing");
                false
            },
            None => {
                if !page.is_empty() {
                    warn!("Last hole on page has no ordering timestamp; ending listing");
                }
                false
            },
        };
        Ok((page, advanced))
    }

    fn settle(&mut self, store: &RetainedStore, bundle: &HoleBundle) -> Settle {
        let store = store.clone();
        let sessions = self.sessions.clone();
        let key = self.query.order.key_of(&bundle.hole);
        let bundle = bundle.clone();
        Box::new(move || {
            if let Err(e) = store.store_bundle(&bundle) {
                warn!("Failed to capture hole {}: {e}", bundle.hole.id);
            }
            let Some(key) = key else { return };
            let recorded = sessions.update(|mut state| {
                state.listing_cursor = Some(key);
                state
            });
            if let Err(e) = recorded {
                warn!("Failed to record hole listing cursor: {e}");
            }
        })
    }
}

/// Starting cursor for a remote hole listing, recording a refresh when starting fresh.
fn resolve_hole_cursor(
    sessions: &SessionStateManager,
    start: HoleStart,
    order: SortOrder,
) -> DateTime<Utc> {
    match start {
        HoleStart::Before(at) => at,
        HoleStart::Resume => sessions.get().listing_cursor.unwrap_or_else(Utc::now),
        HoleStart::Latest => {
            let now = Utc::now();
            let refreshed = sessions.update(|mut state| {
                state.last_refresh = Some(now);
                state.sort_order = Some(order);
                state.listing_cursor = None;
                state
            });
            if let Err(e) = refreshed {
                warn!("Failed to record listing refresh: {e}");
            }
            now
        },
    }
}

struct FloorPager {
    source: Arc<dyn RemoteSource>,
    sessions: SessionStateManager,
    query: FloorQuery,
    /// Next request's `(offset, reversed)`.
    position: Option<(u64, bool)>,
    /// Offset just past the last emitted floor.
    delivered: u64,
}

#[async_trait]
impl Pager for FloorPager {
    type Item = Floor;

    async fn next_page(&mut self, size: usize) -> Result<(Vec<Floor>, bool)> {
        let (offset, reversed) = match self.position {
            Some(position) => position,
            None => {
                let query = self.query.clone();
                let sessions = self.sessions.clone();
                let (offset, reversed) =
                    tokio::task::spawn_blocking(move || resolve_floor_position(&sessions, &query))
                        .await?;
                self.delivered = offset;
                (offset, reversed)
            },
        };

        let request = FloorPageRequest {
            hole_id: self.query.hole_id,
            offset,
            size,
            reversed,
        };
        debug!(
            "Requesting floors of hole {} from offset {offset}",
            self.query.hole_id
        );
        let page = self.source.load_floors(request).await?;

        self.position = Some((offset + page.len() as u64, reversed));
        Ok((page, true))
    }

    fn settle(&mut self, store: &RetainedStore, floor: &Floor) -> Settle {
        self.delivered += 1;
        let delivered = self.delivered;
        let reversed = self.position.is_some_and(|(_, reversed)| reversed);
        let hole_id = self.query.hole_id;
        let store = store.clone();
        let sessions = self.sessions.clone();
        let floor = floor.clone();
        Box::new(move || {
            if let Err(e) = store.store_floor(&floor) {
                warn!("Failed to capture floor {}: {e}", floor.id);
            }
            let recorded = sessions.update_hole(hole_id, |mut state| {
                state.reversed = reversed;
                state.floor_offset = Some(delivered);
                state
            });
            if let Err(e) = recorded {
                warn!("Failed to record floor offset of hole {hole_id}: {e}");
            }
        })
    }
}

/// Starting `(offset, reversed)` for a remote floor listing.
fn resolve_floor_position(sessions: &SessionStateManager, query: &FloorQuery) -> (u64, bool) {
    let remembered = sessions.get_hole(query.hole_id);
    let reversed = query.reversed.unwrap_or(remembered.reversed);
    let offset = match query.start {
        FloorStart::Beginning => 0,
        FloorStart::Offset(offset) => offset,
        FloorStart::Resume => resume_offset(&remembered, reversed),
    };
    if matches!(query.start, FloorStart::Beginning) {
        let refreshed = sessions.update_hole(query.hole_id, |mut state| {
            state.last_refresh = Some(Utc::now());
            state
        });
        if let Err(e) = refreshed {
            warn!("Failed to record floor refresh: {e}");
        }
    }
    (offset, reversed)
}

/// Remembered floor offset, if it was counted in the `reversed` direction.
fn resume_offset(remembered: &HoleSessionState, reversed: bool) -> u64 {
    if remembered.reversed == reversed {
        remembered.floor_offset.unwrap_or(0)
    } else {
        0
    }
}

struct Paging<P: Pager> {
    pager: P,
    store: RetainedStore,
    page_size: usize,
    buffer: VecDeque<P::Item>,
    /// Owed for the last emitted item.
    pending: Option<Settle>,
    exhausted: bool,
    pages: usize,
    emitted: usize,
}

/// Remote listing as a stream: emit each item, settle it once the consumer asks for the
/// next one or drops the stream, fetch the next page when the buffer runs dry.
fn paged_stream<P: Pager>(
    pager: P,
    store: RetainedStore,
    page_size: usize,
) -> BoxStream<'static, Result<P::Item>> {
    let paging = Paging {
        pager,
        store,
        page_size,
        buffer: VecDeque::new(),
        pending: None,
        exhausted: false,
        pages: 0,
        emitted: 0,
    };

    stream::try_unfold(paging, next_item).boxed()
}

async fn next_item<P: Pager>(mut paging: Paging<P>) -> Result<Option<(P::Item, Paging<P>)>> {
    loop {
        if let Some(job) = paging.pending.take() {
            if let Err(e) = tokio::task::spawn_blocking(job).await {
                warn!("Failed to settle listed item: {e}");
            }
        }

        if let Some(item) = paging.buffer.pop_front() {
            paging.pending = Some(paging.pager.settle(&paging.store, &item));
            paging.emitted += 1;
            return Ok(Some((item, paging)));
        }

        if paging.exhausted {
            info!(
                "Remote listing ended after {} pages, {} items",
                paging.pages, paging.emitted
            );
            return Ok(None);
        }

        let (page, advanced) = paging.pager.next_page(paging.page_size).await?;
        paging.pages += 1;
        paging.exhausted = page.len() < paging.page_size || !advanced;
        paging.buffer.extend(page);
    }
}

impl<P: Pager> Drop for Paging<P> {
    fn drop(&mut self) {
        let Some(job) = self.pending.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => drop(handle.spawn_blocking(job)),
            Err(_) => job(),
        }
    }
}

/// Replay a blocking iterator as a stream, pulling each item on the blocking pool.
fn blocking_stream<T, I, F>(open: F) -> BoxStream<'static, Result<T>>
where
    F: FnOnce() -> Result<I> + Send + 'static,
    I: Iterator<Item = T> + Send + 'static,
    T: Send + 'static,
{
    enum State<F, I> {
        Unopened(F),
        Open(I),
    }

    stream::try_unfold(State::Unopened(open), |state| async move {
        let step = tokio::task::spawn_blocking(move || -> Result<Option<(T, State<F, I>)>> {
            let mut iter = match state {
                State::Unopened(open) => open()?,
                State::Open(iter) => iter,
            };
            Ok(iter.next().map(|item| (item, State::Open(iter))))
        })
        .await??;

        if step.is_none() {
            debug!("Retained listing drained");
        }
        Ok::<_, Error>(step)
    })
    .boxed()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::retained::EntityKind;
    use chrono::Duration;
    use futures::TryStreamExt;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn at(minutes: i64) -> DateTime<Utc> {
        "2024-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap() + Duration::minutes(minutes)
    }

    fn bundle(id: EntityId, updated: i64) -> HoleBundle {
        let mut hole = Hole::new(id);
        hole.time_created = Some(at(0) + Duration::seconds(id as i64));
        hole.time_updated = Some(at(updated));
        HoleBundle::bare(hole)
    }

    /// Remote source answering from scripted pages and recording every request.
    #[derive(Default)]
    struct ScriptedSource {
        hole_pages: Mutex<VecDeque<Result<Vec<HoleBundle>>>>,
        floor_pages: Mutex<VecDeque<Result<Vec<Floor>>>>,
        hole_requests: Mutex<Vec<HolePageRequest>>,
        floor_requests: Mutex<Vec<FloorPageRequest>>,
    }

    impl ScriptedSource {
        fn with_hole_pages(pages: Vec<Result<Vec<HoleBundle>>>) -> Arc<Self> {
            Arc::new(Self {
                hole_pages: Mutex::new(pages.into()),
                ..Self::default()
            })
        }

        fn with_floor_pages(pages: Vec<Result<Vec<Floor>>>) -> Arc<Self> {
            Arc::new(Self {
                floor_pages: Mutex::new(pages.into()),
                ..Self::default()
            })
        }
    }

    #[async_trait]
    impl RemoteSource for ScriptedSource {
        async fn load_holes(&self, request: HolePageRequest) -> Result<Vec<HoleBundle>> {
            self.hole_requests.lock().unwrap().push(request);
            self.hole_pages
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }

        async fn load_floors(&self, request: FloorPageRequest) -> Result<Vec<Floor>> {
            self.floor_requests.lock().unwrap().push(request);
            self.floor_pages
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    fn fixture(remote: Arc<ScriptedSource>, page_size: usize) -> (ContentPipeline, RetainedStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RetainedStore::at(dir.path().join("users").join("1"));
        let sessions = SessionStateManager::new(store.clone());
        let pipeline = ContentPipeline::remote(remote, store.clone(), sessions, page_size);
        (pipeline, store, dir)
    }

    /// Wait for work handed to the blocking pool when a stream was dropped.
    async fn eventually(check: impl Fn() -> bool) {
        for _ in 0..500 {
            if check() {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("condition not reached within 5s");
    }

    fn sessions_of(dir: &TempDir) -> SessionStateManager {
        SessionStateManager::new(RetainedStore::at(dir.path().join("users").join("1")))
    }

    /// Pages of holes with strictly decreasing update times.
    fn hole_pages(sizes: &[usize]) -> Vec<Result<Vec<HoleBundle>>> {
        let mut next_id = 1000;
        sizes
            .iter()
            .map(|&size| {
                let page = (0..size)
                    .map(|_| {
                        next_id -= 1;
                        bundle(next_id, next_id as i64)
                    })
                    .collect();
                Ok(page)
            })
            .collect()
    }

    #[tokio::test]
    async fn test_short_page_ends_stream() {
        let remote = ScriptedSource::with_hole_pages(hole_pages(&[10, 10, 4, 10]));
        let (pipeline, _store, _dir) = fixture(Arc::clone(&remote), 10);

        let holes: Vec<_> = pipeline.holes(HoleQuery::default()).try_collect().await.unwrap();

        assert_eq!(holes.len(), 24);
        assert_eq!(remote.hole_requests.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_cursor_advances_to_last_ordering_key() {
        let remote = ScriptedSource::with_hole_pages(vec![
            Ok(vec![bundle(5, 50), bundle(4, 40)]),
            Ok(vec![bundle(3, 30)]),
        ]);
        let (pipeline, _store, _dir) = fixture(Arc::clone(&remote), 2);

        let query = HoleQuery {
            start: HoleStart::Before(at(100)),
            division: Some(2),
            ..HoleQuery::default()
        };
        let ids: Vec<_> = pipeline
            .holes(query)
            .map_ok(|b| b.hole.id)
            .try_collect()
            .await
            .unwrap();

        assert_eq!(ids, vec![5, 4, 3]);
        let requests = remote.hole_requests.lock().unwrap();
        assert_eq!(requests[0].before, at(100));
        assert_eq!(requests[1].before, at(40));
        assert_eq!(requests[1].division, Some(2));
        assert_eq!(requests[1].order, SortOrder::LastReplied);
    }

    #[tokio::test]
    async fn test_stalled_cursor_ends_stream() {
        let remote = ScriptedSource::with_hole_pages(vec![
            Ok(vec![bundle(5, 50), bundle(4, 50)]),
            Ok(vec![bundle(3, 50), bundle(2, 50)]),
        ]);
        let (pipeline, _store, _dir) = fixture(Arc::clone(&remote), 2);

        let query = HoleQuery {
            start: HoleStart::Before(at(50)),
            ..HoleQuery::default()
        };
        let holes: Vec<_> = pipeline.holes(query).try_collect().await.unwrap();

        assert_eq!(holes.len(), 2);
        assert_eq!(remote.hole_requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_remote_listing_is_captured() {
        let remote = ScriptedSource::with_hole_pages(hole_pages(&[3]));
        let (pipeline, store, _dir) = fixture(remote, 10);

        let emitted: Vec<_> = pipeline.holes(HoleQuery::default()).try_collect().await.unwrap();

        for bundle in &emitted {
            assert_eq!(store.load_hole(bundle.hole.id).as_ref(), Some(&bundle.hole));
        }
        assert_eq!(store.index(EntityKind::Hole).unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_capture_failure_does_not_disturb_stream() {
        let remote = ScriptedSource::with_hole_pages(hole_pages(&[5]));
        let (pipeline, store, _dir) = fixture(remote, 10);
        // a directory where hole 997's document belongs makes exactly that capture fail
        fs::create_dir_all(store.document_path(EntityKind::Hole, 997)).unwrap();

        let ids: Vec<_> = pipeline
            .holes(HoleQuery::default())
            .map_ok(|b| b.hole.id)
            .try_collect()
            .await
            .unwrap();

        assert_eq!(ids, vec![999, 998, 997, 996, 995]);
        assert_eq!(store.load_hole(997), None);
        let captured: Vec<_> = store
            .index(EntityKind::Hole)
            .unwrap()
            .ascending()
            .collect();
        assert_eq!(captured, vec![995, 996, 998, 999]);
    }

    #[tokio::test]
    async fn test_remote_error_terminates_stream() {
        let remote = ScriptedSource::with_hole_pages(vec![
            Ok(hole_pages(&[2]).remove(0).unwrap()),
            Err(Error::Remote {
                status: 502,
                message: "bad gateway".into(),
            }),
            Ok(hole_pages(&[2]).remove(0).unwrap()),
        ]);
        let (pipeline, _store, _dir) = fixture(Arc::clone(&remote), 2);

        let items: Vec<_> = pipeline.holes(HoleQuery::default()).collect().await;

        assert_eq!(items.len(), 3);
        assert!(items[0].is_ok());
        assert!(items[1].is_ok());
        assert!(matches!(items[2], Err(Error::Remote { status: 502, .. })));
        assert_eq!(remote.hole_requests.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_dropping_stream_stops_fetching() {
        let remote = ScriptedSource::with_hole_pages(hole_pages(&[2, 2, 2]));
        let (pipeline, _store, _dir) = fixture(Arc::clone(&remote), 2);

        let first: Vec<_> = pipeline
            .holes(HoleQuery::default())
            .take(1)
            .try_collect()
            .await
            .unwrap();

        assert_eq!(first.len(), 1);
        assert_eq!(remote.hole_requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_resume_continues_from_recorded_cursor() {
        let remote = ScriptedSource::with_hole_pages(vec![
            Ok(vec![bundle(9, 90), bundle(8, 80)]),
            Ok(vec![bundle(7, 70)]),
        ]);
        let (pipeline, _store, dir) = fixture(Arc::clone(&remote), 2);

        let first: Vec<_> = pipeline
            .holes(HoleQuery::default())
            .take(2)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(first.len(), 2);

        let sessions = sessions_of(&dir);
        eventually(|| sessions.get().listing_cursor == Some(at(80))).await;
        let state = sessions.get();
        assert_eq!(state.listing_cursor, Some(at(80)));
        assert!(state.last_refresh.is_some());
        assert_eq!(state.sort_order, Some(SortOrder::LastReplied));

        let query = HoleQuery::resume(SortOrder::LastReplied);
        let rest: Vec<_> = pipeline.holes(query).try_collect().await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(remote.hole_requests.lock().unwrap()[1].before, at(80));
    }

    #[tokio::test]
    async fn test_remote_floors_page_by_offset() {
        let floors: Vec<Floor> = (1..=5).map(|id| Floor::new(id, 7)).collect();
        let remote = ScriptedSource::with_floor_pages(vec![
            Ok(floors[..2].to_vec()),
            Ok(floors[2..4].to_vec()),
            Ok(floors[4..].to_vec()),
        ]);
        let (pipeline, store, _dir) = fixture(Arc::clone(&remote), 2);

        let emitted: Vec<_> = pipeline.floors(FloorQuery::of(7)).try_collect().await.unwrap();

        assert_eq!(emitted, floors);
        let offsets: Vec<_> = remote
            .floor_requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.offset)
            .collect();
        assert_eq!(offsets, vec![0, 2, 4]);

        let replay: Vec<_> = store.floors_of(7, false).unwrap().collect();
        assert_eq!(replay, floors);
        assert_eq!(SessionStateManager::new(store.clone()).get_hole(7).floor_offset, Some(5));
    }

    #[tokio::test]
    async fn test_last_item_before_early_stop_is_captured() {
        let remote = ScriptedSource::with_hole_pages(vec![Ok(vec![
            bundle(9, 90),
            bundle(8, 80),
            bundle(7, 70),
        ])]);
        let (pipeline, store, _dir) = fixture(remote, 3);

        let ids: Vec<_> = pipeline
            .holes(HoleQuery::default())
            .map_ok(|b| b.hole.id)
            .take(2)
            .try_collect()
            .await
            .unwrap();

        assert_eq!(ids, vec![9, 8]);
        eventually(|| store.load_hole(8).is_some()).await;
        assert!(store.load_hole(9).is_some());
        assert_eq!(store.load_hole(7), None);
    }

    #[tokio::test]
    async fn test_hole_resume_after_partial_page_starts_past_last_emitted() {
        let remote = ScriptedSource::with_hole_pages(vec![
            Ok(vec![bundle(9, 90), bundle(8, 80), bundle(7, 70)]),
            Ok(vec![bundle(8, 80), bundle(7, 70)]),
        ]);
        let (pipeline, _store, dir) = fixture(Arc::clone(&remote), 3);

        let first: Vec<_> = pipeline
            .holes(HoleQuery::default())
            .take(1)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(first[0].hole.id, 9);

        let sessions = sessions_of(&dir);
        eventually(|| sessions.get().listing_cursor == Some(at(90))).await;

        let rest: Vec<_> = pipeline
            .holes(HoleQuery::resume(SortOrder::LastReplied))
            .map_ok(|b| b.hole.id)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(rest, vec![8, 7]);
        assert_eq!(remote.hole_requests.lock().unwrap()[1].before, at(90));
    }

    #[tokio::test]
    async fn test_floor_resume_after_partial_page_counts_emitted_floors() {
        let floors: Vec<Floor> = (1..=3).map(|id| Floor::new(id, 7)).collect();
        let remote = ScriptedSource::with_floor_pages(vec![
            Ok(floors.clone()),
            Ok(floors[1..].to_vec()),
        ]);
        let (pipeline, store, _dir) = fixture(Arc::clone(&remote), 3);

        let first: Vec<_> = pipeline
            .floors(FloorQuery::of(7))
            .take(1)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(first, floors[..1]);

        let sessions = SessionStateManager::new(store.clone());
        eventually(|| sessions.get_hole(7).floor_offset == Some(1)).await;

        let query = FloorQuery {
            start: FloorStart::Resume,
            ..FloorQuery::of(7)
        };
        let rest: Vec<_> = pipeline.floors(query).try_collect().await.unwrap();
        assert_eq!(rest, floors[1..]);
        assert_eq!(remote.floor_requests.lock().unwrap()[1].offset, 1);
    }

    #[tokio::test]
    async fn test_floor_direction_defaults_to_session_state() {
        let remote = ScriptedSource::with_floor_pages(vec![Ok(vec![Floor::new(3, 1)])]);
        let (pipeline, store, _dir) = fixture(Arc::clone(&remote), 10);
        SessionStateManager::new(store)
            .update_hole(1, |mut s| {
                s.reversed = true;
                s
            })
            .unwrap();

        let _: Vec<_> = pipeline.floors(FloorQuery::of(1)).try_collect().await.unwrap();

        assert!(remote.floor_requests.lock().unwrap()[0].reversed);
    }

    #[tokio::test]
    async fn test_retained_mode_replays_without_network() {
        let remote = ScriptedSource::with_hole_pages(hole_pages(&[4]));
        let (pipeline, store, _dir) = fixture(Arc::clone(&remote), 10);
        let live: Vec<_> = pipeline
            .holes(HoleQuery {
                order: SortOrder::LastCreated,
                ..HoleQuery::default()
            })
            .map_ok(|b| b.hole.id)
            .try_collect()
            .await
            .unwrap();

        let offline = ContentPipeline::retained(store.clone(), SessionStateManager::new(store));
        assert_eq!(offline.source(), ContentSource::Retained);
        let replayed: Vec<_> = offline
            .holes(HoleQuery {
                order: SortOrder::LastCreated,
                ..HoleQuery::default()
            })
            .map_ok(|b| b.hole.id)
            .try_collect()
            .await
            .unwrap();

        assert_eq!(replayed, live);
        assert_eq!(remote.hole_requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_retained_holes_filter_division_and_cursor() {
        let dir = TempDir::new().unwrap();
        let store = RetainedStore::at(dir.path());
        for (id, division, updated) in [(1, 1, 10), (2, 2, 20), (3, 1, 30), (4, 1, 40)] {
            let mut b = bundle(id, updated);
            b.hole.division_id = division;
            store.store_hole(&b.hole).unwrap();
        }
        let pipeline = ContentPipeline::retained(store.clone(), SessionStateManager::new(store));

        let query = HoleQuery {
            order: SortOrder::LastCreated,
            division: Some(1),
            start: HoleStart::Before(at(0) + Duration::seconds(4)),
        };
        let ids: Vec<_> = pipeline
            .holes(query)
            .map_ok(|b| b.hole.id)
            .try_collect()
            .await
            .unwrap();

        assert_eq!(ids, vec![3, 1]);
    }

    #[tokio::test]
    async fn test_retained_floors_honor_offset() {
        let dir = TempDir::new().unwrap();
        let store = RetainedStore::at(dir.path());
        for id in [10, 11, 12, 13] {
            store.store_floor(&Floor::new(id, 5)).unwrap();
        }
        store.store_floor(&Floor::new(14, 6)).unwrap();
        let pipeline = ContentPipeline::retained(store.clone(), SessionStateManager::new(store));

        let query = FloorQuery {
            hole_id: 5,
            reversed: Some(true),
            start: FloorStart::Offset(1),
        };
        let ids: Vec<_> = pipeline
            .floors(query)
            .map_ok(|f| f.id)
            .try_collect()
            .await
            .unwrap();

        assert_eq!(ids, vec![12, 11, 10]);
    }

    #[tokio::test]
    async fn test_retained_resume_ignores_offset_from_other_direction() {
        let dir = TempDir::new().unwrap();
        let store = RetainedStore::at(dir.path());
        for id in [10, 11, 12, 13] {
            store.store_floor(&Floor::new(id, 5)).unwrap();
        }
        let sessions = SessionStateManager::new(store.clone());
        sessions
            .update_hole(5, |mut s| {
                s.reversed = false;
                s.floor_offset = Some(3);
                s
            })
            .unwrap();
        let pipeline = ContentPipeline::retained(store, sessions);

        let resume = |reversed| FloorQuery {
            hole_id: 5,
            reversed: Some(reversed),
            start: FloorStart::Resume,
        };
        let newest_first: Vec<_> = pipeline
            .floors(resume(true))
            .map_ok(|f| f.id)
            .try_collect()
            .await
            .unwrap();
        let oldest_first: Vec<_> = pipeline
            .floors(resume(false))
            .map_ok(|f| f.id)
            .try_collect()
            .await
            .unwrap();

        assert_eq!(newest_first, vec![13, 12, 11, 10]);
        assert_eq!(oldest_first, vec![13]);
    }

    #[tokio::test]
    async fn test_retained_corrupt_index_surfaces_error() {
        let dir = TempDir::new().unwrap();
        let store = RetainedStore::at(dir.path());
        store.store_hole(&Hole::new(1)).unwrap();
        fs::write(store.index_path(EntityKind::Hole), b"junk").unwrap();
        let pipeline = ContentPipeline::retained(store.clone(), SessionStateManager::new(store));

        let items: Vec<_> = pipeline
            .holes(HoleQuery {
                order: SortOrder::LastCreated,
                ..HoleQuery::default()
            })
            .collect()
            .await;

        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(Error::Index(_))));
    }
}
