use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::pipeline::Stage;
use crate::types::{Deal, Stored};

/// Days without a write after which an open deal counts as stalled.
pub const STALLED_AFTER_DAYS: i64 = 14;
/// Horizon, in days, for the closing-soon nudge.
pub const CLOSING_SOON_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationKind {
    Warning,
    Urgent,
    Info,
    Success,
}

/// A suggested next step for a single deal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    #[serde(rename = "type")]
    pub kind: RecommendationKind,
    pub message: String,
    pub action: String,
}

impl Recommendation {
    fn new(kind: RecommendationKind, message: String, action: &str) -> Self {
        Self {
            kind,
            message,
            action: action.to_string(),
        }
    }
}

/// Usual probability band, inclusive, for each open stage.
fn probability_band(stage: Stage) -> Option<(u8, u8)> {
    match stage {
        Stage::Lead => Some((5, 20)),
        Stage::Qualified => Some((20, 40)),
        Stage::Proposal => Some((40, 60)),
        Stage::Negotiation => Some((60, 90)),
        Stage::ClosedWon | Stage::ClosedLost => None,
    }
}

/// Next-step hints for an open deal as of `today`. Closed deals get none.
///
/// Time in stage is measured from the last write to the deal.
pub fn recommendations(stored: &Stored<Deal>, today: NaiveDate) -> Vec<Recommendation> {
    let deal = &stored.record;
    let mut hints = Vec::new();
    if deal.stage.is_closed() {
        return hints;
    }

    let idle_days = (today - stored.updated_at.date_naive()).num_days();
    if idle_days > STALLED_AFTER_DAYS {
        hints.push(Recommendation::new(
            RecommendationKind::Warning,
            format!("Deal has been in {} stage for {idle_days} days", deal.stage),
            "Schedule a follow-up activity",
        ));
    }

    if let Some(close) = deal.expected_close {
        let days_to_close = (close - today).num_days();
        if (1..=CLOSING_SOON_DAYS).contains(&days_to_close) {
            hints.push(Recommendation::new(
                RecommendationKind::Urgent,
                format!("Deal expected to close in {days_to_close} days"),
                "Intensify engagement and finalize terms",
            ));
        }
    }

    if let Some((low, high)) = probability_band(deal.stage) {
        if deal.probability < low {
            hints.push(Recommendation::new(
                RecommendationKind::Info,
                format!("Probability seems low for {} stage", deal.stage),
                "Review deal qualification and update probability",
            ));
        } else if deal.probability > high {
            hints.push(Recommendation::new(
                RecommendationKind::Success,
                format!("High probability for {} stage", deal.stage),
                "Consider moving to next stage",
            ));
        }
    }

    hints
}
