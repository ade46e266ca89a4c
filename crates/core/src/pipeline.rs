use std::{fmt, str::FromStr};

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::types::Deal;

/// Fixed, ordered sales stages. Any stage may follow any other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Stage {
    #[default]
    Lead,
    Qualified,
    Proposal,
    Negotiation,
    ClosedWon,
    ClosedLost,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Lead,
        Stage::Qualified,
        Stage::Proposal,
        Stage::Negotiation,
        Stage::ClosedWon,
        Stage::ClosedLost,
    ];

    /// Display name used on the wire and in storage.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lead => "Lead",
            Self::Qualified => "Qualified",
            Self::Proposal => "Proposal",
            Self::Negotiation => "Negotiation",
            Self::ClosedWon => "Closed-Won",
            Self::ClosedLost => "Closed-Lost",
        }
    }

    pub fn is_closed(self) -> bool {
        matches!(self, Self::ClosedWon | Self::ClosedLost)
    }

    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown stage '{0}'")]
pub struct UnknownStage(pub String);

impl FromStr for Stage {
    type Err = UnknownStage;

    /// Only exact display names are accepted.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|stage| stage.as_str() == value)
            .ok_or_else(|| UnknownStage(value.to_string()))
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Stage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Stage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Deal fields shown on a pipeline board card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageDeal {
    pub id: String,
    pub title: String,
    pub customer_id: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub value: Decimal,
    pub probability: u8,
}

impl From<&Deal> for StageDeal {
    fn from(deal: &Deal) -> Self {
        Self {
            id: deal.id.clone(),
            title: deal.title.clone(),
            customer_id: deal.customer_id.clone(),
            value: deal.value,
            probability: deal.probability,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSummary {
    pub stage: Stage,
    pub count: u64,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_value: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub weighted_value: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deals: Option<Vec<StageDeal>>,
}

impl StageSummary {
    fn empty(stage: Stage) -> Self {
        Self {
            stage,
            count: 0,
            total_value: Decimal::ZERO,
            weighted_value: Decimal::ZERO,
            deals: None,
        }
    }
}

/// Per-stage counts and sums, always listed in [`Stage::ALL`] order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub stages: Vec<StageSummary>,
    pub total_count: u64,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_value: Decimal,
}

impl PipelineSummary {
    /// Recomputes the aggregates from the full set of deals.
    pub fn from_deals<'a, I>(deals: I) -> Self
    where
        I: IntoIterator<Item = &'a Deal>,
    {
        let mut stages = Stage::ALL.map(StageSummary::empty);
        let mut total_count = 0;
        let mut total_value = Decimal::ZERO;

        for deal in deals {
            let summary = &mut stages[deal.stage.index()];
            summary.count += 1;
            summary.total_value = summary.total_value.saturating_add(deal.value);
            summary.weighted_value = summary.weighted_value.saturating_add(deal.weighted_value());
            total_count += 1;
            total_value = total_value.saturating_add(deal.value);
        }

        Self {
            stages: stages.into(),
            total_count,
            total_value,
        }
    }

    /// Same as [`PipelineSummary::from_deals`] with each stage's board cards attached.
    pub fn with_deals<'a, I>(deals: I) -> Self
    where
        I: IntoIterator<Item = &'a Deal> + Clone,
    {
        let mut summary = Self::from_deals(deals.clone());
        let mut boards: [Vec<StageDeal>; 6] = Default::default();
        for deal in deals {
            boards[deal.stage.index()].push(StageDeal::from(deal));
        }
        for (stage, mut cards) in summary.stages.iter_mut().zip(boards) {
            cards.sort_by(|a, b| a.id.cmp(&b.id));
            stage.deals = Some(cards);
        }
        summary
    }

    pub fn stage(&self, stage: Stage) -> &StageSummary {
        &self.stages[stage.index()]
    }
}

/// Result of moving a deal to another stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageMove {
    pub deal_id: String,
    pub previous_stage: Stage,
    pub stage: Stage,
    pub pipeline: PipelineSummary,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deal(id: &str, stage: Stage, value: &str, probability: u8) -> Deal {
        Deal {
            id: id.to_string(),
            title: format!("Deal {id}"),
            customer_id: "c-1".to_string(),
            value: value.parse().expect("decimal"),
            stage,
            probability,
            expected_close: None,
            notes: String::new(),
        }
    }

    #[test]
    fn stage_parsing_is_exact() {
        assert_eq!("Closed-Won".parse::<Stage>(), Ok(Stage::ClosedWon));
        assert_eq!("Negotiation".parse::<Stage>(), Ok(Stage::Negotiation));
        assert!("closed-won".parse::<Stage>().is_err());
        assert!("Closed Won".parse::<Stage>().is_err());
        assert!(" Lead".parse::<Stage>().is_err());
    }

    #[test]
    fn summary_lists_every_stage_in_order() {
        let none: Vec<Deal> = Vec::new();
        let summary = PipelineSummary::from_deals(&none);
        let order: Vec<Stage> = summary.stages.iter().map(|s| s.stage).collect();
        assert_eq!(order, Stage::ALL.to_vec());
        assert_eq!(summary.total_count, 0);
        assert_eq!(summary.total_value, Decimal::ZERO);
    }

    #[test]
    fn summary_is_independent_of_input_order() {
        let mut deals = vec![
            deal("a", Stage::Lead, "0.1", 10),
            deal("b", Stage::Lead, "0.2", 20),
            deal("c", Stage::Proposal, "1000000000.3", 55),
            deal("d", Stage::Lead, "0.3", 33),
            deal("e", Stage::ClosedWon, "12.75", 100),
        ];
        let forward = PipelineSummary::from_deals(&deals);
        deals.reverse();
        let backward = PipelineSummary::from_deals(&deals);
        deals.swap(0, 2);
        let shuffled = PipelineSummary::from_deals(&deals);

        assert_eq!(forward, backward);
        assert_eq!(forward, shuffled);
        assert_eq!(forward.stage(Stage::Lead).total_value, "0.6".parse().unwrap());
        assert_eq!(forward.total_count, 5);
    }

    #[test]
    fn moving_a_deal_shifts_one_count_between_stages() {
        let mut deals = vec![
            deal("deal123", Stage::Proposal, "50000", 60),
            deal("deal124", Stage::Proposal, "10000", 40),
            deal("deal125", Stage::Negotiation, "75000", 80),
        ];
        let before = PipelineSummary::from_deals(&deals);
        deals[0].stage = Stage::Negotiation;
        let after = PipelineSummary::from_deals(&deals);

        assert_eq!(before.stage(Stage::Proposal).count, 2);
        assert_eq!(after.stage(Stage::Proposal).count, 1);
        assert_eq!(before.stage(Stage::Negotiation).count, 1);
        assert_eq!(after.stage(Stage::Negotiation).count, 2);
        assert_eq!(before.total_count, after.total_count);
        assert_eq!(before.total_value, after.total_value);
    }

    #[test]
    fn weighted_value_scales_by_probability() {
        let deals = [
            deal("a", Stage::Qualified, "1000", 25),
            deal("b", Stage::Qualified, "200", 50),
        ];
        let summary = PipelineSummary::from_deals(&deals);
        assert_eq!(
            summary.stage(Stage::Qualified).weighted_value,
            Decimal::from(350)
        );
    }

    #[test]
    fn sums_saturate_instead_of_overflowing() {
        let mut huge = deal("a", Stage::Proposal, "1", 100);
        huge.value = Decimal::MAX;
        let deals = [huge.clone(), huge, deal("b", Stage::Proposal, "10", 50)];
        let summary = PipelineSummary::from_deals(&deals);
        assert_eq!(summary.stage(Stage::Proposal).count, 3);
        assert_eq!(summary.total_value, Decimal::MAX);
        assert_eq!(summary.stage(Stage::Proposal).weighted_value, Decimal::MAX);
    }

    #[test]
    fn with_deals_attaches_board_cards() {
        let deals = [
            deal("b", Stage::Lead, "10", 10),
            deal("a", Stage::Lead, "20", 10),
            deal("c", Stage::ClosedLost, "5", 0),
        ];
        let summary = PipelineSummary::with_deals(&deals);
        let lead = summary.stage(Stage::Lead);
        let ids: Vec<&str> = lead
            .deals
            .as_ref()
            .expect("cards")
            .iter()
            .map(|card| card.id.as_str())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(summary.stage(Stage::Proposal).deals, Some(Vec::new()));

        let json = serde_json::to_value(PipelineSummary::from_deals(&deals)).expect("encode");
        assert!(json["stages"][0].get("deals").is_none());
        assert_eq!(json["stages"][5]["stage"], "Closed-Lost");
    }
}
