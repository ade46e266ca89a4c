//! Search-as-you-type controller for the customer search box.
//!
//! Keystrokes are debounced by a quiet period; every input bumps a generation
//! counter and a lookup only publishes its outcome while its generation is
//! still the newest one, so a slow response can never overwrite a newer view.

use std::{
    future::Future,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::{sync::watch, task::JoinHandle, time::sleep};
use tracing::debug;

use crm_core::search::{searchable, CustomerHit};

use crate::api::{ClientError, CrmClient};

pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(300);

/// Source of customer matches for a query.
pub trait CustomerLookup: Send + Sync + 'static {
    fn search(
        &self,
        query: &str,
    ) -> impl Future<Output = Result<Vec<CustomerHit>, ClientError>> + Send;
}

impl CustomerLookup for CrmClient {
    fn search(
        &self,
        query: &str,
    ) -> impl Future<Output = Result<Vec<CustomerHit>, ClientError>> + Send {
        let client = self.clone();
        let query = query.to_string();
        async move { client.search_customers(&query, None).await }
    }
}

/// What the search dropdown currently shows.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SearchView {
    /// Nothing (or too little) typed.
    #[default]
    Idle,
    Loading,
    NoResults {
        query: String,
    },
    Results {
        query: String,
        hits: Vec<CustomerHit>,
    },
    Failed {
        query: String,
        message: String,
    },
}

pub struct Autocomplete<L> {
    lookup: Arc<L>,
    quiet_period: Duration,
    generation: Arc<AtomicU64>,
    view: watch::Sender<SearchView>,
}

impl<L: CustomerLookup> Autocomplete<L> {
    pub fn new(lookup: L) -> Self {
        let (view, _) = watch::channel(SearchView::Idle);
        Self {
            lookup: Arc::new(lookup),
            quiet_period: DEFAULT_QUIET_PERIOD,
            generation: Arc::new(AtomicU64::new(0)),
            view,
        }
    }

    pub fn with_quiet_period(mut self, quiet_period: Duration) -> Self {
        self.quiet_period = quiet_period;
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<SearchView> {
        self.view.subscribe()
    }

    pub fn view(&self) -> SearchView {
        self.view.borrow().clone()
    }

    /// Handles the current contents of the search box.
    ///
    /// Returns the handle of the scheduled lookup, or `None` when the text is
    /// too short to search and the view was reset to [`SearchView::Idle`].
    pub fn input(&self, text: &str) -> Option<JoinHandle<()>> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let Some(query) = searchable(text) else {
            self.view.send_replace(SearchView::Idle);
            return None;
        };
        let query = query.to_string();

        let lookup = Arc::clone(&self.lookup);
        let latest = Arc::clone(&self.generation);
        let view = self.view.clone();
        let quiet_period = self.quiet_period;

        Some(tokio::spawn(async move {
            sleep(quiet_period).await;
            if !publish(&view, &latest, generation, SearchView::Loading) {
                return;
            }

            let outcome = lookup.search(&query).await;
            let next = match outcome {
                Ok(hits) if hits.is_empty() => SearchView::NoResults { query },
                Ok(hits) => SearchView::Results { query, hits },
                Err(err) => SearchView::Failed {
                    query,
                    message: err.to_string(),
                },
            };
            if !publish(&view, &latest, generation, next) {
                debug!(stage = "autocomplete", generation, "dropping stale search response");
            }
        }))
    }
}

/// Writes `next` only if `generation` is still current. The check runs under the
/// channel's write lock so it cannot interleave with a newer input's reset.
fn publish(
    view: &watch::Sender<SearchView>,
    latest: &AtomicU64,
    generation: u64,
    next: SearchView,
) -> bool {
    view.send_if_modified(|current| {
        if latest.load(Ordering::SeqCst) != generation {
            return false;
        }
        *current = next;
        true
    })
}
