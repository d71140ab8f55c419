use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;

use crate::asset_source::AssetSource;
use crate::config::{BlendStrategy, FetchOptions};
use crate::model::{AssetRef, DisplayMode, Profile};
use crate::shuffle::{SmartShuffle, DEFAULT_RECENT_RATIO};

/// Hard stop for sequential pagination in case the server keeps reporting
/// more pages.
pub const MAX_SEQUENTIAL_PAGES: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaylistPhase {
    Empty,
    Ready,
    ExhaustedPendingRefetch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchReason {
    Load,
    Exhausted,
}

impl FetchReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchReason::Load => "reload",
            FetchReason::Exhausted => "end of playlist",
        }
    }
}

/// Everything a fetch needs, detached from the store so it can run on
/// another task.
#[derive(Debug, Clone)]
pub struct FetchPlan {
    pub generation: u64,
    pub profile: Profile,
    pub mode: DisplayMode,
    pub page: u32,
    pub options: FetchOptions,
    pub reason: FetchReason,
}

#[derive(Debug, Clone)]
pub struct FetchedBatch {
    pub generation: u64,
    pub page: u32,
    pub items: Vec<AssetRef>,
    pub has_more: bool,
    pub reason: FetchReason,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Moved within the loaded items.
    Ready(AssetRef),
    /// Ran off the end; the plan must be executed and applied.
    Refetch(FetchPlan),
    /// A fetch is already in flight.
    Pending,
    /// Nothing loaded; wait for the next load.
    Stalled,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    Ready(AssetRef),
    Empty,
    /// Superseded by a newer plan or cancelled; nothing changed.
    Stale,
}

impl PartialEq for FetchPlan {
    fn eq(&self, other: &Self) -> bool {
        self.generation == other.generation
    }
}

fn unique_by_id(items: impl IntoIterator<Item = AssetRef>) -> Vec<AssetRef> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|asset| seen.insert(asset.id.clone()))
        .collect()
}

/// A1, B1, A2, B2, ... with the longer tail appended, duplicates dropped.
fn interleave(a: Vec<AssetRef>, b: Vec<AssetRef>) -> Vec<AssetRef> {
    let mut a = a.into_iter();
    let mut b = b.into_iter();
    let mut merged = Vec::with_capacity(a.len() + b.len());
    loop {
        match (a.next(), b.next()) {
            (None, None) => break,
            (x, y) => merged.extend(x.into_iter().chain(y)),
        }
    }
    unique_by_id(merged)
}

impl FetchPlan {
    pub async fn execute(self, source: &dyn AssetSource) -> FetchedBatch {
        let filter = &self.profile.filter;
        let size = self.options.batch_size;

        let (items, has_more) = match self.mode {
            DisplayMode::Sequential => {
                let page = source.fetch_page(filter, self.mode, self.page, size).await;
                let mut items = page.items;
                items.sort_by_key(|asset| (asset.created_at.is_none(), asset.created_at));
                (items, page.has_more)
            }
            DisplayMode::Random => {
                let page = source.fetch_page(filter, self.mode, 1, size).await;
                (page.items, false)
            }
            DisplayMode::SmartShuffle => {
                let now = Utc::now();
                let half = (size / 2).max(1);
                let recent_filter = filter.taken_within(self.options.recency_window, now);
                let (any, recent) = tokio::join!(
                    source.fetch_page(filter, self.mode, 1, half),
                    source.fetch_page(&recent_filter, self.mode, 1, half)
                );

                let blended = match self.options.blend {
                    BlendStrategy::Interleave => interleave(any.items, recent.items),
                    BlendStrategy::Partition => {
                        let pool = unique_by_id(any.items.into_iter().chain(recent.items));
                        SmartShuffle::new(self.options.recency_window, DEFAULT_RECENT_RATIO).shuffle(
                            &pool,
                            now,
                            &mut fastrand::Rng::new(),
                        )
                    }
                };
                (blended, false)
            }
        };

        let fetched = items.len();
        let items: Vec<AssetRef> = items
            .into_iter()
            .filter(|asset| !self.profile.is_excluded(asset))
            .collect();
        if items.len() != fetched {
            tracing::debug!("Excluded {} of {} assets by path", fetched - items.len(), fetched);
        }

        FetchedBatch {
            generation: self.generation,
            page: self.page,
            items,
            has_more,
            reason: self.reason,
        }
    }
}

/// Current working set of the slideshow.
///
/// Items are only ever replaced as a whole. While a fetch is in flight the
/// previous items stay visible through [`PlaylistStore::current`].
pub struct PlaylistStore {
    source: Arc<dyn AssetSource>,
    options: FetchOptions,
    profile: Option<Profile>,
    mode: DisplayMode,
    items: Vec<AssetRef>,
    position: usize,
    page: u32,
    has_more_pages: bool,
    generation: u64,
    pending: Option<u64>,
    exhausted: bool,
    last_refresh: Option<DateTime<Utc>>,
}

impl PlaylistStore {
    pub fn new(source: Arc<dyn AssetSource>, options: FetchOptions) -> Self {
        Self {
            source,
            options,
            profile: None,
            mode: DisplayMode::default(),
            items: Vec::new(),
            position: 0,
            page: 1,
            has_more_pages: false,
            generation: 0,
            pending: None,
            exhausted: false,
            last_refresh: None,
        }
    }

    pub fn source(&self) -> Arc<dyn AssetSource> {
        Arc::clone(&self.source)
    }

    pub fn set_options(&mut self, options: FetchOptions) {
        self.options = options;
    }

    pub fn phase(&self) -> PlaylistPhase {
        if self.exhausted && self.pending.is_some() {
            PlaylistPhase::ExhaustedPendingRefetch
        } else if self.items.is_empty() {
            PlaylistPhase::Empty
        } else {
            PlaylistPhase::Ready
        }
    }

    pub fn current(&self) -> Option<&AssetRef> {
        self.items.get(self.position)
    }

    pub fn position(&self) -> Option<usize> {
        (!self.items.is_empty()).then_some(self.position)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn profile(&self) -> Option<&Profile> {
        self.profile.as_ref()
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn has_more_pages(&self) -> bool {
        self.has_more_pages
    }

    pub fn last_refresh(&self) -> Option<DateTime<Utc>> {
        self.last_refresh
    }

    fn issue_plan(&mut self, page: u32, reason: FetchReason) -> FetchPlan {
        self.generation += 1;
        self.pending = Some(self.generation);
        FetchPlan {
            generation: self.generation,
            profile: self.profile.clone().unwrap_or_default(),
            mode: self.mode,
            page,
            options: self.options,
            reason,
        }
    }

    /// Starts a full reload. The page restarts at 1 unless
    /// `continue_pagination` is set and the same sequential content is being
    /// reloaded.
    pub fn plan_load(&mut self, profile: Profile, mode: DisplayMode, continue_pagination: bool) -> FetchPlan {
        let page = if continue_pagination && mode == DisplayMode::Sequential && !self.changes_content(&profile, mode) {
            self.page
        } else {
            1
        };
        self.profile = Some(profile);
        self.mode = mode;
        self.exhausted = false;
        self.issue_plan(page, FetchReason::Load)
    }

    /// True when switching to `profile`/`mode` would select different
    /// content. Profiles are compared by identity and criteria, never by
    /// display name.
    pub fn changes_content(&self, profile: &Profile, mode: DisplayMode) -> bool {
        match &self.profile {
            Some(current) => !current.same_content(profile) || self.mode != mode,
            None => true,
        }
    }

    /// Plans a reload when the content changes. Otherwise only the display
    /// name is picked up and `None` is returned.
    pub fn plan_filter_change(&mut self, profile: Profile, mode: DisplayMode) -> Option<FetchPlan> {
        if self.changes_content(&profile, mode) {
            return Some(self.plan_load(profile, mode, false));
        }
        if let Some(current) = self.profile.as_mut() {
            current.name = profile.name;
        }
        None
    }

    fn next_sequential_page(&self) -> u32 {
        if !self.has_more_pages {
            return 1;
        }
        if self.page >= MAX_SEQUENTIAL_PAGES {
            tracing::warn!(
                "Reached the {} page limit, restarting from page 1",
                MAX_SEQUENTIAL_PAGES
            );
            return 1;
        }
        self.page + 1
    }

    /// Moves to the next item, or plans the refetch that replaces the items
    /// once the end is reached.
    pub fn step_forward(&mut self) -> Step {
        if self.pending.is_some() {
            return Step::Pending;
        }
        if self.items.is_empty() {
            return Step::Stalled;
        }
        if self.position + 1 < self.items.len() {
            self.position += 1;
            return Step::Ready(self.items[self.position].clone());
        }

        self.exhausted = true;
        let page = match self.mode {
            DisplayMode::Sequential => self.next_sequential_page(),
            DisplayMode::Random | DisplayMode::SmartShuffle => 1,
        };
        tracing::debug!("Playlist exhausted, refetching ({} mode, page {})", self.mode.as_str(), page);
        Step::Refetch(self.issue_plan(page, FetchReason::Exhausted))
    }

    /// Moves back one item, wrapping to the last. Never fetches.
    pub fn retreat(&mut self) -> Option<AssetRef> {
        if self.items.is_empty() {
            return None;
        }
        self.position = if self.position == 0 {
            self.items.len() - 1
        } else {
            self.position - 1
        };
        self.current().cloned()
    }

    pub fn apply(&mut self, batch: FetchedBatch) -> ApplyOutcome {
        if self.pending != Some(batch.generation) {
            tracing::debug!(
                "Discarding stale fetch result (generation {}, pending {:?})",
                batch.generation,
                self.pending
            );
            return ApplyOutcome::Stale;
        }

        self.pending = None;
        self.exhausted = false;
        self.items = batch.items;
        self.position = 0;
        self.page = batch.page;
        self.has_more_pages = batch.has_more;
        self.last_refresh = Some(Utc::now());

        tracing::info!(
            "Playlist replaced after {}: {} items ({} mode, page {}, more pages: {})",
            batch.reason.as_str(),
            self.items.len(),
            self.mode.as_str(),
            self.page,
            self.has_more_pages
        );

        match self.items.first() {
            Some(asset) => ApplyOutcome::Ready(asset.clone()),
            None => ApplyOutcome::Empty,
        }
    }

    /// Forgets any in-flight fetch; its result will be discarded.
    pub fn cancel_pending(&mut self) {
        self.pending = None;
        self.exhausted = false;
    }

    async fn run(&mut self, plan: FetchPlan) -> Option<AssetRef> {
        let source = self.source();
        let batch = plan.execute(source.as_ref()).await;
        match self.apply(batch) {
            ApplyOutcome::Ready(asset) => Some(asset),
            ApplyOutcome::Empty | ApplyOutcome::Stale => None,
        }
    }

    pub async fn load(&mut self, profile: Profile, mode: DisplayMode) -> Option<AssetRef> {
        let plan = self.plan_load(profile, mode, false);
        self.run(plan).await
    }

    pub async fn load_continuing(&mut self, profile: Profile, mode: DisplayMode) -> Option<AssetRef> {
        let plan = self.plan_load(profile, mode, true);
        self.run(plan).await
    }

    pub async fn advance(&mut self) -> Option<AssetRef> {
        match self.step_forward() {
            Step::Ready(asset) => Some(asset),
            Step::Refetch(plan) => self.run(plan).await,
            Step::Pending | Step::Stalled => None,
        }
    }

    /// Returns whether the content changed (and was reloaded).
    pub async fn set_filter(&mut self, profile: Profile, mode: DisplayMode) -> bool {
        match self.plan_filter_change(profile, mode) {
            Some(plan) => {
                self.run(plan).await;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset_source::Page;
    use crate::test_support::{asset, assets, dated_asset, ScriptedSource};
    use chrono::Duration;

    fn options(batch_size: usize) -> FetchOptions {
        FetchOptions {
            batch_size,
            ..FetchOptions::default()
        }
    }

    fn store_with(source: Arc<ScriptedSource>, batch_size: usize) -> PlaylistStore {
        PlaylistStore::new(source, options(batch_size))
    }

    fn profile(id: &str, name: &str) -> Profile {
        Profile {
            id: id.to_string(),
            name: name.to_string(),
            ..Profile::default()
        }
    }

    #[tokio::test]
    async fn random_batch_is_walked_then_refetched_once() {
        let source = Arc::new(ScriptedSource::fixed(assets("r", 10)));
        let mut store = store_with(source.clone(), 10);

        let first = store.load(Profile::default(), DisplayMode::Random).await;
        assert_eq!(first.map(|a| a.id), Some("r0".to_string()));
        assert_eq!(store.len(), 10);
        assert_eq!(store.position(), Some(0));
        assert_eq!(source.call_count(), 1);

        for expected in 1..10 {
            store.advance().await;
            assert_eq!(store.position(), Some(expected));
        }
        assert_eq!(source.call_count(), 1, "no refetch inside the batch");

        store.advance().await;
        assert_eq!(source.call_count(), 2, "overflow refetches exactly once");
        assert_eq!(store.position(), Some(0));
        assert_eq!(source.calls()[1].page_size, 10);
    }

    #[tokio::test]
    async fn sequential_pages_cycle_back_to_first() {
        let source = Arc::new(ScriptedSource::new(|call| match call.page {
            1 => Page {
                items: vec![
                    dated_asset("p1-b", Utc::now() - Duration::days(1)),
                    dated_asset("p1-a", Utc::now() - Duration::days(2)),
                ],
                has_more: true,
            },
            2 => Page {
                items: vec![asset("p2-a")],
                has_more: false,
            },
            _ => Page::empty(),
        }));
        let mut store = store_with(source.clone(), 2);

        let first = store.load(Profile::default(), DisplayMode::Sequential).await;
        assert_eq!(first.map(|a| a.id), Some("p1-a".to_string()), "page sorted oldest first");
        assert!(store.has_more_pages());

        assert_eq!(store.advance().await.map(|a| a.id), Some("p1-b".to_string()));
        assert_eq!(store.advance().await.map(|a| a.id), Some("p2-a".to_string()));
        assert_eq!(store.page(), 2);
        assert!(!store.has_more_pages());

        assert_eq!(store.advance().await.map(|a| a.id), Some("p1-a".to_string()));
        assert_eq!(store.page(), 1);

        let pages: Vec<u32> = source.calls().iter().map(|c| c.page).collect();
        assert_eq!(pages, vec![1, 2, 1]);
    }

    #[tokio::test]
    async fn sequential_pagination_stops_at_page_limit() {
        let source = Arc::new(ScriptedSource::new(|call| Page {
            items: vec![asset(&format!("page{}", call.page))],
            has_more: true,
        }));
        let mut store = store_with(source.clone(), 1);
        store.load(Profile::default(), DisplayMode::Sequential).await;

        for _ in 0..MAX_SEQUENTIAL_PAGES {
            store.advance().await;
        }

        let pages: Vec<u32> = source.calls().iter().map(|c| c.page).collect();
        assert_eq!(pages.len() as u32, MAX_SEQUENTIAL_PAGES + 1);
        assert_eq!(pages.iter().max(), Some(&MAX_SEQUENTIAL_PAGES));
        assert_eq!(pages.last(), Some(&1));
    }

    #[tokio::test]
    async fn load_continuing_keeps_sequential_page() {
        let source = Arc::new(ScriptedSource::new(|call| Page {
            items: vec![asset(&format!("page{}", call.page))],
            has_more: true,
        }));
        let mut store = store_with(source.clone(), 1);
        store.load(Profile::default(), DisplayMode::Sequential).await;
        store.advance().await;
        assert_eq!(store.page(), 2);

        store.load_continuing(Profile::default(), DisplayMode::Sequential).await;
        assert_eq!(store.page(), 2);
        store.load(Profile::default(), DisplayMode::Sequential).await;
        assert_eq!(store.page(), 1);
    }

    #[tokio::test]
    async fn retreat_wraps_without_fetching() {
        let source = Arc::new(ScriptedSource::fixed(assets("x", 3)));
        let mut store = store_with(source.clone(), 3);
        store.load(Profile::default(), DisplayMode::Random).await;

        let back = store.retreat();
        assert_eq!(store.position(), Some(2));
        assert_eq!(back.map(|a| a.id), Some("x2".to_string()));
        assert_eq!(source.call_count(), 1);
    }

    #[tokio::test]
    async fn retreat_on_empty_store_is_none() {
        let source = Arc::new(ScriptedSource::fixed(Vec::new()));
        let mut store = store_with(source, 3);
        assert_eq!(store.retreat(), None);
        assert_eq!(store.phase(), PlaylistPhase::Empty);
    }

    #[tokio::test]
    async fn excluded_paths_are_dropped() {
        let source = Arc::new(ScriptedSource::fixed(vec![
            AssetRef {
                original_path: "/a/b/x.jpg".into(),
                ..asset("x")
            },
            AssetRef {
                original_path: "/a/skip/y.jpg".into(),
                ..asset("y")
            },
        ]));
        let mut store = store_with(source, 10);
        let profile = Profile {
            exclude_paths: vec!["*skip*".into()],
            ..Profile::default()
        };
        store.load(profile, DisplayMode::Random).await;

        assert_eq!(store.len(), 1);
        assert_eq!(store.current().map(|a| a.id.as_str()), Some("x"));
    }

    #[tokio::test]
    async fn same_name_different_id_is_a_change() {
        let source = Arc::new(ScriptedSource::fixed(assets("a", 2)));
        let mut store = store_with(source.clone(), 10);
        store.load(profile("id-1", "Family"), DisplayMode::Random).await;

        assert!(store.set_filter(profile("id-2", "Family"), DisplayMode::Random).await);
        assert_eq!(store.profile().map(|p| p.id.as_str()), Some("id-2"));
        assert_eq!(source.call_count(), 2);
    }

    #[tokio::test]
    async fn renamed_profile_is_not_a_change() {
        let source = Arc::new(ScriptedSource::fixed(assets("a", 2)));
        let mut store = store_with(source.clone(), 10);
        store.load(profile("id-1", "Family"), DisplayMode::Random).await;

        assert!(!store.set_filter(profile("id-1", "Family 2024"), DisplayMode::Random).await);
        assert_eq!(store.profile().map(|p| p.name.as_str()), Some("Family 2024"));
        assert_eq!(source.call_count(), 1);

        assert!(store.set_filter(profile("id-1", "Family 2024"), DisplayMode::Sequential).await);
        assert_eq!(source.call_count(), 2);
    }

    #[tokio::test]
    async fn stale_batch_is_discarded() {
        let source = Arc::new(ScriptedSource::fixed(assets("s", 2)));
        let mut store = store_with(source.clone(), 10);

        let old_plan = store.plan_load(profile("old", "Old"), DisplayMode::Random, false);
        let new_plan = store.plan_load(profile("new", "New"), DisplayMode::Random, false);

        let old_batch = old_plan.execute(source.as_ref()).await;
        let new_batch = new_plan.execute(source.as_ref()).await;

        assert_eq!(store.apply(old_batch), ApplyOutcome::Stale);
        assert!(store.is_empty());
        assert!(matches!(store.apply(new_batch), ApplyOutcome::Ready(_)));
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn cancelled_fetch_result_is_discarded() {
        let source = Arc::new(ScriptedSource::fixed(assets("c", 2)));
        let mut store = store_with(source.clone(), 10);
        let plan = store.plan_load(Profile::default(), DisplayMode::Random, false);
        store.cancel_pending();

        let batch = plan.execute(source.as_ref()).await;
        assert_eq!(store.apply(batch), ApplyOutcome::Stale);
        assert_eq!(store.phase(), PlaylistPhase::Empty);
    }

    #[tokio::test]
    async fn current_item_survives_while_refetch_is_pending() {
        let source = Arc::new(ScriptedSource::fixed(assets("k", 2)));
        let mut store = store_with(source.clone(), 2);
        store.load(Profile::default(), DisplayMode::Random).await;
        store.advance().await;

        let plan = match store.step_forward() {
            Step::Refetch(plan) => plan,
            other => panic!("expected a refetch, got {:?}", other),
        };
        assert_eq!(plan.reason, FetchReason::Exhausted);
        assert_eq!(store.phase(), PlaylistPhase::ExhaustedPendingRefetch);
        assert_eq!(store.current().map(|a| a.id.as_str()), Some("k1"));
        assert_eq!(store.step_forward(), Step::Pending);

        let batch = plan.execute(source.as_ref()).await;
        assert_eq!(batch.reason, FetchReason::Exhausted);
        assert!(matches!(store.apply(batch), ApplyOutcome::Ready(_)));
        assert_eq!(store.plan_load(Profile::default(), DisplayMode::Random, false).reason, FetchReason::Load);
    }

    #[tokio::test]
    async fn empty_refetch_stalls_until_next_load() {
        let source = Arc::new(ScriptedSource::new(|call| {
            if call.filter.is_favorite == Some(true) {
                Page {
                    items: assets("f", 1),
                    has_more: false,
                }
            } else {
                Page::empty()
            }
        }));
        let mut store = store_with(source.clone(), 5);
        let favourites = Profile {
            filter: crate::model::SearchFilter {
                is_favorite: Some(true),
                ..Default::default()
            },
            ..profile("fav", "Favourites")
        };
        store.load(favourites, DisplayMode::Random).await;
        assert_eq!(store.phase(), PlaylistPhase::Ready);

        assert!(store.set_filter(profile("none", "Nothing"), DisplayMode::Random).await);
        assert_eq!(store.phase(), PlaylistPhase::Empty);

        let calls = source.call_count();
        assert_eq!(store.advance().await, None);
        assert_eq!(store.step_forward(), Step::Stalled);
        assert_eq!(source.call_count(), calls, "empty store never fetches on its own");
    }

    #[tokio::test]
    async fn smart_shuffle_interleaves_and_dedupes() {
        let source = Arc::new(ScriptedSource::new(|call| {
            let items = if call.filter.taken_after.is_some() {
                vec![asset("b1"), asset("shared"), asset("b3")]
            } else {
                vec![asset("a1"), asset("shared")]
            };
            Page {
                items,
                has_more: false,
            }
        }));
        let mut store = store_with(source.clone(), 8);
        store.load(Profile::default(), DisplayMode::SmartShuffle).await;

        let ids: Vec<String> = (0..store.len())
            .map(|_| {
                let id = store.current().unwrap().id.clone();
                store.step_forward();
                id
            })
            .collect();
        assert_eq!(ids, vec!["a1", "b1", "shared", "b3"]);

        let calls = source.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().all(|c| c.page_size == 4));
        assert_eq!(calls.iter().filter(|c| c.filter.taken_after.is_some()).count(), 1);
    }

    #[tokio::test]
    async fn partition_blend_only_reorders_fetched_assets() {
        let now = Utc::now();
        let source = Arc::new(ScriptedSource::new(move |call| {
            let items = if call.filter.taken_after.is_some() {
                vec![dated_asset("new1", now), dated_asset("new2", now)]
            } else {
                vec![
                    dated_asset("old1", now - Duration::days(900)),
                    dated_asset("old2", now - Duration::days(900)),
                    dated_asset("new1", now),
                ]
            };
            Page {
                items,
                has_more: false,
            }
        }));
        let mut store = PlaylistStore::new(
            source,
            FetchOptions {
                batch_size: 6,
                blend: BlendStrategy::Partition,
                ..FetchOptions::default()
            },
        );
        store.load(Profile::default(), DisplayMode::SmartShuffle).await;

        // pool of 4 unique assets, 2 recent and 2 older, ratio one half
        assert_eq!(store.len(), 4);
    }

    #[test]
    fn interleave_appends_longer_tail() {
        let merged = interleave(vec![asset("a1")], vec![asset("b1"), asset("b2"), asset("b3")]);
        let ids: Vec<&str> = merged.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a1", "b1", "b2", "b3"]);
    }
}
