use std::{future::Future, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};
use tracing::{debug, warn};

use crm_core::pipeline::{PipelineSummary, Stage};

use crate::api::{ClientError, CrmClient};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Source of pipeline aggregates.
pub trait PipelineSource: Send + Sync + 'static {
    fn pipeline(&self) -> impl Future<Output = Result<PipelineSummary, ClientError>> + Send;
}

impl PipelineSource for CrmClient {
    fn pipeline(&self) -> impl Future<Output = Result<PipelineSummary, ClientError>> + Send {
        let client = self.clone();
        async move { CrmClient::pipeline(&client).await }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardColumn {
    pub stage: Stage,
    pub count: u64,
    pub total_value: Decimal,
}

/// Visible pipeline board: one column per stage plus totals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineBoard {
    pub columns: Vec<BoardColumn>,
    pub total_count: u64,
    pub total_value: Decimal,
    pub refreshed_at: Option<DateTime<Utc>>,
}

impl Default for PipelineBoard {
    fn default() -> Self {
        Self {
            columns: Stage::ALL
                .into_iter()
                .map(|stage| BoardColumn {
                    stage,
                    count: 0,
                    total_value: Decimal::ZERO,
                })
                .collect(),
            total_count: 0,
            total_value: Decimal::ZERO,
            refreshed_at: None,
        }
    }
}

impl PipelineBoard {
    /// Overwrites counts and values in place. Returns whether any figure changed.
    pub fn apply(&mut self, summary: &PipelineSummary) -> bool {
        let mut changed = false;
        for column in &mut self.columns {
            let Some(fresh) = summary.stages.iter().find(|s| s.stage == column.stage) else {
                continue;
            };
            if column.count != fresh.count {
                column.count = fresh.count;
                changed = true;
            }
            if column.total_value != fresh.total_value {
                column.total_value = fresh.total_value;
                changed = true;
            }
        }
        if self.total_count != summary.total_count {
            self.total_count = summary.total_count;
            changed = true;
        }
        if self.total_value != summary.total_value {
            self.total_value = summary.total_value;
            changed = true;
        }
        changed
    }

    pub fn column(&self, stage: Stage) -> Option<&BoardColumn> {
        self.columns.iter().find(|column| column.stage == stage)
    }
}

/// Periodically re-fetches the pipeline and publishes the board.
pub struct PipelinePoller<S> {
    source: Arc<S>,
    every: Duration,
    board: watch::Sender<PipelineBoard>,
}

impl<S: PipelineSource> PipelinePoller<S> {
    pub fn new(source: S) -> Self {
        let (board, _) = watch::channel(PipelineBoard::default());
        Self {
            source: Arc::new(source),
            every: DEFAULT_POLL_INTERVAL,
            board,
        }
    }

    pub fn with_interval(mut self, every: Duration) -> Self {
        self.every = every;
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<PipelineBoard> {
        self.board.subscribe()
    }

    pub fn board(&self) -> PipelineBoard {
        self.board.borrow().clone()
    }

    /// Runs a single refresh. Failures are logged and leave the board untouched.
    pub async fn poll_once(&self) -> Result<(), ClientError> {
        let summary = match self.source.pipeline().await {
            Ok(summary) => summary,
            Err(err) => {
                warn!(stage = "poller", error = %err, "pipeline refresh failed; keeping previous board");
                return Err(err);
            }
        };

        let now = Utc::now();
        self.board.send_modify(|board| {
            if board.apply(&summary) {
                debug!(stage = "poller", total = summary.total_count, "pipeline board updated");
            }
            board.refreshed_at = Some(now);
        });
        Ok(())
    }

    /// Polls on a fixed interval until the returned task is aborted.
    ///
    /// The first refresh happens immediately. There is no backoff.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let _ = self.poll_once().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crm_core::types::Deal;
    use reqwest::StatusCode;
    use std::{collections::VecDeque, sync::Mutex};

    struct ScriptedSource {
        responses: Mutex<VecDeque<Result<PipelineSummary, ClientError>>>,
        calls: Mutex<u32>,
    }

    impl ScriptedSource {
        fn new(responses: Vec<Result<PipelineSummary, ClientError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(0),
            }
        }
    }

    impl PipelineSource for ScriptedSource {
        fn pipeline(&self) -> impl Future<Output = Result<PipelineSummary, ClientError>> + Send {
            *self.calls.lock().expect("calls") += 1;
            let next = self
                .responses
                .lock()
                .expect("responses")
                .pop_front()
                .unwrap_or_else(|| Err(unavailable()));
            async move { next }
        }
    }

    fn unavailable() -> ClientError {
        ClientError::Status {
            status: StatusCode::SERVICE_UNAVAILABLE,
            body: "down".to_string(),
        }
    }

    fn summary(stages: &[(Stage, i64)]) -> PipelineSummary {
        let deals: Vec<Deal> = stages
            .iter()
            .enumerate()
            .map(|(idx, (stage, value))| Deal {
                id: format!("d-{idx}"),
                title: format!("Deal {idx}"),
                customer_id: String::new(),
                value: Decimal::from(*value),
                stage: *stage,
                probability: 50,
                expected_close: None,
                notes: String::new(),
            })
            .collect();
        PipelineSummary::from_deals(&deals)
    }

    #[test]
    fn apply_overwrites_fields_in_place() {
        let mut board = PipelineBoard::default();
        assert!(board.apply(&summary(&[(Stage::Proposal, 100), (Stage::Lead, 5)])));
        assert_eq!(board.column(Stage::Proposal).expect("column").count, 1);
        assert_eq!(board.total_value, Decimal::from(105));
        assert!(!board.apply(&summary(&[(Stage::Lead, 5), (Stage::Proposal, 100)])));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_poll_keeps_board_and_next_tick_still_runs() {
        let first = summary(&[(Stage::Proposal, 50_000)]);
        let second = summary(&[(Stage::Negotiation, 50_000), (Stage::Lead, 1_000)]);
        let source = ScriptedSource::new(vec![Ok(first), Err(unavailable()), Ok(second)]);
        let poller = PipelinePoller::new(source).with_interval(Duration::from_secs(30));
        let source = Arc::clone(&poller.source);
        let board = poller.subscribe();
        let task = poller.spawn();

        tokio::time::sleep(Duration::from_secs(1)).await;
        let after_first = board.borrow().clone();
        assert_eq!(after_first.column(Stage::Proposal).expect("column").count, 1);
        assert!(after_first.refreshed_at.is_some());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(*source.calls.lock().expect("calls"), 2);
        assert_eq!(*board.borrow(), after_first);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(*source.calls.lock().expect("calls"), 3);
        let after_third = board.borrow().clone();
        assert_eq!(after_third.column(Stage::Proposal).expect("column").count, 0);
        assert_eq!(after_third.column(Stage::Negotiation).expect("column").count, 1);
        assert_eq!(after_third.total_count, 2);

        task.abort();
    }

    #[tokio::test]
    async fn poll_once_reports_errors() {
        let poller = PipelinePoller::new(ScriptedSource::new(vec![Err(unavailable())]));
        assert!(poller.poll_once().await.is_err());
        assert_eq!(poller.board(), PipelineBoard::default());
    }
}
