use std::{collections::BTreeMap, str::FromStr};

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pipeline::{PipelineSummary, Stage};
use crate::types::{CrmSnapshot, CustomerStatus, TaskPriority, TaskStatus};

pub const DEFAULT_TREND_MONTHS: u32 = 6;
pub const MAX_TREND_MONTHS: u32 = 24;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalyticsError {
    #[error("unknown period '{0}'")]
    UnknownPeriod(String),
    #[error("months must be between 1 and 24 (got {0})")]
    MonthsOutOfRange(u32),
}

/// Rolling look-back window used by the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Week,
    #[default]
    Month,
    Quarter,
    Year,
}

impl Period {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Week => "week",
            Self::Month => "month",
            Self::Quarter => "quarter",
            Self::Year => "year",
        }
    }

    pub fn length(self) -> Duration {
        match self {
            Self::Week => Duration::weeks(1),
            Self::Month => Duration::days(30),
            Self::Quarter => Duration::days(90),
            Self::Year => Duration::days(365),
        }
    }
}

impl FromStr for Period {
    type Err = AnalyticsError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "week" => Ok(Self::Week),
            "month" => Ok(Self::Month),
            "quarter" => Ok(Self::Quarter),
            "year" => Ok(Self::Year),
            other => Err(AnalyticsError::UnknownPeriod(other.to_string())),
        }
    }
}

fn percentage(part: u64, whole: u64) -> Decimal {
    if whole == 0 {
        return Decimal::ZERO;
    }
    (Decimal::from(part) * Decimal::ONE_HUNDRED / Decimal::from(whole)).round_dp(2)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardMetrics {
    pub period: Period,
    pub generated_at: DateTime<Utc>,
    pub total_customers: u64,
    pub new_customers: u64,
    pub active_customers: u64,
    #[serde(with = "rust_decimal::serde::float")]
    pub customer_growth_rate: Decimal,
    pub total_deals: u64,
    pub open_deals: u64,
    pub won_deals: u64,
    pub lost_deals: u64,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_revenue: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub pipeline_value: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub weighted_pipeline: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub average_deal_size: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub win_rate: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub conversion_rate: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub average_sales_cycle_days: Decimal,
    pub total_employees: u64,
    pub open_tasks: u64,
    pub pipeline: PipelineSummary,
}

impl DashboardMetrics {
    /// Derives the dashboard figures for the window ending at `now`.
    ///
    /// Deal closure is dated by the envelope `updated_at`; creation by `created_at`.
    pub fn compute(snapshot: &CrmSnapshot, period: Period, now: DateTime<Utc>) -> Self {
        let start = now - period.length();
        let previous_start = start - period.length();

        let customers = &snapshot.customers;
        let new_customers = customers
            .iter()
            .filter(|c| c.record.created_at >= start)
            .count() as u64;
        let previous_customers = customers
            .iter()
            .filter(|c| c.record.created_at >= previous_start && c.record.created_at < start)
            .count() as u64;
        let customer_growth_rate = if previous_customers == 0 {
            Decimal::ZERO
        } else {
            let delta = Decimal::from(new_customers) - Decimal::from(previous_customers);
            (delta * Decimal::ONE_HUNDRED / Decimal::from(previous_customers)).round_dp(2)
        };

        let mut open_deals = 0;
        let mut pipeline_value = Decimal::ZERO;
        let mut weighted_pipeline = Decimal::ZERO;
        let mut won_deals = 0;
        let mut lost_deals = 0;
        let mut total_revenue = Decimal::ZERO;
        let mut cycle_days = 0i64;
        for stored in &snapshot.deals {
            let deal = &stored.record;
            let closed_in_window = stored.updated_at >= start;
            match deal.stage {
                Stage::ClosedWon if closed_in_window => {
                    won_deals += 1;
                    total_revenue = total_revenue.saturating_add(deal.value);
                    cycle_days += (stored.updated_at - stored.created_at).num_days();
                }
                Stage::ClosedLost if closed_in_window => lost_deals += 1,
                stage if !stage.is_closed() => {
                    open_deals += 1;
                    pipeline_value = pipeline_value.saturating_add(deal.value);
                    weighted_pipeline = weighted_pipeline.saturating_add(deal.weighted_value());
                }
                _ => {}
            }
        }
        let total_deals = snapshot
            .deals
            .iter()
            .filter(|d| d.created_at >= start)
            .count() as u64;

        let average_deal_size = if won_deals == 0 {
            Decimal::ZERO
        } else {
            (total_revenue / Decimal::from(won_deals)).round_dp(2)
        };
        let average_sales_cycle_days = if won_deals == 0 {
            Decimal::ZERO
        } else {
            (Decimal::from(cycle_days) / Decimal::from(won_deals)).round_dp(1)
        };

        Self {
            period,
            generated_at: now,
            total_customers: customers.len() as u64,
            new_customers,
            active_customers: customers
                .iter()
                .filter(|c| c.record.status == CustomerStatus::Active)
                .count() as u64,
            customer_growth_rate,
            total_deals,
            open_deals,
            won_deals,
            lost_deals,
            total_revenue,
            pipeline_value,
            weighted_pipeline,
            average_deal_size,
            win_rate: percentage(won_deals, won_deals + lost_deals),
            conversion_rate: percentage(total_deals, new_customers),
            average_sales_cycle_days,
            total_employees: snapshot.employees.len() as u64,
            open_tasks: snapshot
                .tasks
                .iter()
                .filter(|t| t.record.status != TaskStatus::Completed)
                .count() as u64,
            pipeline: PipelineSummary::from_deals(snapshot.deals.iter().map(|d| &d.record)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthTrend {
    /// Calendar month as `YYYY-MM`.
    pub month: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub won_revenue: Decimal,
    pub won_count: u64,
    pub lost_count: u64,
    #[serde(with = "rust_decimal::serde::float")]
    pub win_rate: Decimal,
}

pub fn validate_months(months: Option<u32>) -> Result<u32, AnalyticsError> {
    match months.unwrap_or(DEFAULT_TREND_MONTHS) {
        n @ 1..=MAX_TREND_MONTHS => Ok(n),
        n => Err(AnalyticsError::MonthsOutOfRange(n)),
    }
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.day0()))
}

/// Per-month closed-deal figures for the last `months` calendar months, oldest first.
pub fn sales_trends(snapshot: &CrmSnapshot, months: u32, now: DateTime<Utc>) -> Vec<MonthTrend> {
    let current = first_of_month(now.date_naive());
    let mut buckets: BTreeMap<NaiveDate, MonthTrend> = (0..months)
        .filter_map(|back| current.checked_sub_months(Months::new(back)))
        .map(|start| {
            let trend = MonthTrend {
                month: start.format("%Y-%m").to_string(),
                won_revenue: Decimal::ZERO,
                won_count: 0,
                lost_count: 0,
                win_rate: Decimal::ZERO,
            };
            (start, trend)
        })
        .collect();

    for stored in &snapshot.deals {
        let key = first_of_month(stored.updated_at.date_naive());
        let Some(bucket) = buckets.get_mut(&key) else {
            continue;
        };
        match stored.record.stage {
            Stage::ClosedWon => {
                bucket.won_count += 1;
                bucket.won_revenue = bucket.won_revenue.saturating_add(stored.record.value);
            }
            Stage::ClosedLost => bucket.lost_count += 1,
            _ => {}
        }
    }

    buckets
        .into_values()
        .map(|mut trend| {
            trend.win_rate = percentage(trend.won_count, trend.won_count + trend.lost_count);
            trend
        })
        .collect()
}

/// Calendar window for revenue forecasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForecastPeriod {
    #[default]
    Month,
    Quarter,
}

impl FromStr for ForecastPeriod {
    type Err = AnalyticsError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "month" => Ok(Self::Month),
            "quarter" => Ok(Self::Quarter),
            other => Err(AnalyticsError::UnknownPeriod(other.to_string())),
        }
    }
}

impl ForecastPeriod {
    /// Inclusive first and last day of the period containing `today`.
    pub fn window(self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        let month_start = first_of_month(today);
        let (start, span) = match self {
            Self::Month => (month_start, 1),
            Self::Quarter => {
                let into_quarter = today.month0() % 3;
                let start = month_start
                    .checked_sub_months(Months::new(into_quarter))
                    .unwrap_or(month_start);
                (start, 3)
            }
        };
        let end = start
            .checked_add_months(Months::new(span))
            .and_then(|next| next.pred_opt())
            .unwrap_or(start);
        (start, end)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ForecastBucket {
    pub count: u64,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_value: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub weighted_value: Decimal,
}

impl ForecastBucket {
    fn add(&mut self, value: Decimal, weighted: Decimal) {
        self.count += 1;
        self.total_value = self.total_value.saturating_add(value);
        self.weighted_value = self.weighted_value.saturating_add(weighted);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub period: ForecastPeriod,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub high: ForecastBucket,
    pub medium: ForecastBucket,
    pub low: ForecastBucket,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_value: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub weighted_value: Decimal,
}

/// Open deals expected to close within the current period, bucketed by probability.
pub fn forecast(snapshot: &CrmSnapshot, period: ForecastPeriod, today: NaiveDate) -> Forecast {
    let (start, end) = period.window(today);
    let mut result = Forecast {
        period,
        start,
        end,
        high: ForecastBucket::default(),
        medium: ForecastBucket::default(),
        low: ForecastBucket::default(),
        total_value: Decimal::ZERO,
        weighted_value: Decimal::ZERO,
    };

    for deal in snapshot.deals.iter().map(|stored| &stored.record) {
        if deal.stage.is_closed() {
            continue;
        }
        let Some(close) = deal.expected_close else {
            continue;
        };
        if close < start || close > end {
            continue;
        }
        let weighted = deal.weighted_value();
        let bucket = match deal.probability {
            70.. => &mut result.high,
            40..=69 => &mut result.medium,
            _ => &mut result.low,
        };
        bucket.add(deal.value, weighted);
        result.total_value = result.total_value.saturating_add(deal.value);
        result.weighted_value = result.weighted_value.saturating_add(weighted);
    }

    result
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelCount {
    pub label: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepartmentStats {
    pub department: String,
    pub headcount: u64,
    #[serde(with = "rust_decimal::serde::float")]
    pub average_salary: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Breakdown {
    pub customer_status: Vec<LabelCount>,
    pub task_status: Vec<LabelCount>,
    pub task_priority: Vec<LabelCount>,
    pub departments: Vec<DepartmentStats>,
}

fn count_labels<I>(labels: &[&'static str], values: I) -> Vec<LabelCount>
where
    I: IntoIterator<Item = &'static str>,
{
    let mut counts: Vec<LabelCount> = labels
        .iter()
        .map(|label| LabelCount {
            label: (*label).to_string(),
            count: 0,
        })
        .collect();
    for value in values {
        if let Some(entry) = counts.iter_mut().find(|entry| entry.label == value) {
            entry.count += 1;
        }
    }
    counts
}

/// Status and department distributions across the collections.
pub fn breakdown(snapshot: &CrmSnapshot) -> Breakdown {
    let customer_status = count_labels(
        &CustomerStatus::ALL.map(CustomerStatus::as_str),
        snapshot.customers.iter().map(|c| c.record.status.as_str()),
    );
    let task_status = count_labels(
        &TaskStatus::ALL.map(TaskStatus::as_str),
        snapshot.tasks.iter().map(|t| t.record.status.as_str()),
    );
    let task_priority = count_labels(
        &TaskPriority::ALL.map(TaskPriority::as_str),
        snapshot.tasks.iter().map(|t| t.record.priority.as_str()),
    );

    let mut by_department: BTreeMap<&str, (u64, Decimal)> = BTreeMap::new();
    for employee in snapshot.employees.iter().map(|stored| &stored.record) {
        let entry = by_department
            .entry(employee.department.as_str())
            .or_insert((0, Decimal::ZERO));
        entry.0 += 1;
        entry.1 = entry.1.saturating_add(employee.salary);
    }
    let departments = by_department
        .into_iter()
        .map(|(department, (headcount, payroll))| DepartmentStats {
            department: department.to_string(),
            headcount,
            average_salary: (payroll / Decimal::from(headcount)).round_dp(2),
        })
        .collect();

    Breakdown {
        customer_status,
        task_status,
        task_priority,
        departments,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Customer, Deal, Employee, Stored, Task};
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).single().expect("timestamp")
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("date")
    }

    fn stored<T>(record: T, created_at: DateTime<Utc>, updated_at: DateTime<Utc>) -> Stored<T> {
        Stored {
            record,
            created_at,
            updated_at,
        }
    }

    fn customer(id: &str, status: CustomerStatus, created_at: DateTime<Utc>) -> Stored<Customer> {
        let record = Customer {
            id: id.to_string(),
            name: format!("Customer {id}"),
            email: format!("{id}@example.com"),
            phone: String::new(),
            company: String::new(),
            status,
            value: Decimal::ZERO,
            tags: Default::default(),
            notes: String::new(),
            created_at,
        };
        stored(record, created_at, created_at)
    }

    fn deal(
        id: &str,
        stage: Stage,
        value: i64,
        probability: u8,
        expected_close: Option<NaiveDate>,
    ) -> Deal {
        Deal {
            id: id.to_string(),
            title: format!("Deal {id}"),
            customer_id: "c-1".to_string(),
            value: Decimal::from(value),
            stage,
            probability,
            expected_close,
            notes: String::new(),
        }
    }

    fn employee(id: &str, department: &str, salary: i64) -> Stored<Employee> {
        let now = at(2024, 1, 1);
        stored(
            Employee {
                id: id.to_string(),
                name: format!("Employee {id}"),
                department: department.to_string(),
                role: "Engineer".to_string(),
                skills: Default::default(),
                salary: Decimal::from(salary),
                hire_date: None,
            },
            now,
            now,
        )
    }

    fn task(id: &str, status: TaskStatus, priority: TaskPriority) -> Stored<Task> {
        let now = at(2024, 1, 1);
        stored(
            Task {
                id: id.to_string(),
                title: format!("Task {id}"),
                description: String::new(),
                assignee: None,
                priority,
                due_date: None,
                status,
            },
            now,
            now,
        )
    }

    #[test]
    fn period_parsing() {
        assert_eq!("quarter".parse::<Period>(), Ok(Period::Quarter));
        assert!(matches!(
            "decade".parse::<Period>(),
            Err(AnalyticsError::UnknownPeriod(_))
        ));
        assert_eq!(Period::default(), Period::Month);
    }

    #[test]
    fn dashboard_counts_window_and_pipeline() {
        let now = at(2025, 3, 31);
        let snapshot = CrmSnapshot {
            customers: vec![
                customer("c-1", CustomerStatus::Active, at(2025, 3, 20)),
                customer("c-2", CustomerStatus::Lead, at(2025, 3, 25)),
                customer("c-3", CustomerStatus::Active, at(2025, 2, 10)),
                customer("c-4", CustomerStatus::Inactive, at(2024, 6, 1)),
            ],
            deals: vec![
                stored(
                    deal("d-1", Stage::ClosedWon, 1000, 100, None),
                    at(2025, 3, 1),
                    at(2025, 3, 11),
                ),
                stored(
                    deal("d-2", Stage::ClosedLost, 500, 0, None),
                    at(2025, 3, 2),
                    at(2025, 3, 15),
                ),
                stored(
                    deal("d-3", Stage::Proposal, 2000, 50, None),
                    at(2025, 1, 5),
                    at(2025, 1, 5),
                ),
                stored(
                    deal("d-4", Stage::ClosedWon, 9000, 100, None),
                    at(2024, 1, 1),
                    at(2024, 2, 1),
                ),
            ],
            employees: vec![employee("e-1", "Sales", 50_000)],
            tasks: vec![
                task("t-1", TaskStatus::Pending, TaskPriority::High),
                task("t-2", TaskStatus::Completed, TaskPriority::Low),
            ],
        };

        let metrics = DashboardMetrics::compute(&snapshot, Period::Month, now);
        assert_eq!(metrics.total_customers, 4);
        assert_eq!(metrics.new_customers, 2);
        assert_eq!(metrics.active_customers, 2);
        assert_eq!(metrics.customer_growth_rate, Decimal::from(100));
        assert_eq!(metrics.total_deals, 2);
        assert_eq!(metrics.open_deals, 1);
        assert_eq!(metrics.won_deals, 1);
        assert_eq!(metrics.lost_deals, 1);
        assert_eq!(metrics.total_revenue, Decimal::from(1000));
        assert_eq!(metrics.pipeline_value, Decimal::from(2000));
        assert_eq!(metrics.weighted_pipeline, Decimal::from(1000));
        assert_eq!(metrics.win_rate, Decimal::from(50));
        assert_eq!(metrics.conversion_rate, Decimal::from(100));
        assert_eq!(metrics.average_sales_cycle_days, Decimal::from(10));
        assert_eq!(metrics.open_tasks, 1);
        assert_eq!(metrics.pipeline.total_count, 4);
    }

    #[test]
    fn dashboard_survives_values_beyond_the_decimal_range() {
        let now = at(2025, 3, 31);
        let mut open = deal("d-1", Stage::Proposal, 1, 90, Some(date(2025, 3, 31)));
        open.value = Decimal::MAX;
        let mut won = deal("d-2", Stage::ClosedWon, 1, 100, None);
        won.value = Decimal::MAX;
        let snapshot = CrmSnapshot {
            deals: vec![
                stored(open.clone(), now, now),
                stored(open, now, now),
                stored(won.clone(), now, now),
                stored(won, now, now),
            ],
            ..CrmSnapshot::default()
        };

        let metrics = DashboardMetrics::compute(&snapshot, Period::Month, now);
        assert_eq!(metrics.pipeline_value, Decimal::MAX);
        assert_eq!(metrics.total_revenue, Decimal::MAX);
        assert_eq!(sales_trends(&snapshot, 1, now)[0].won_revenue, Decimal::MAX);
        let outlook = forecast(&snapshot, ForecastPeriod::Month, now.date_naive());
        assert_eq!(outlook.total_value, Decimal::MAX);
    }

    #[test]
    fn dashboard_on_empty_snapshot_is_zeroed() {
        let metrics = DashboardMetrics::compute(&CrmSnapshot::default(), Period::Year, at(2025, 1, 1));
        assert_eq!(metrics.win_rate, Decimal::ZERO);
        assert_eq!(metrics.average_deal_size, Decimal::ZERO);
        assert_eq!(metrics.pipeline.stages.len(), Stage::ALL.len());
    }

    #[test]
    fn trends_bucket_closed_deals_by_month() {
        let snapshot = CrmSnapshot {
            deals: vec![
                stored(
                    deal("d-1", Stage::ClosedWon, 100, 100, None),
                    at(2025, 1, 1),
                    at(2025, 3, 2),
                ),
                stored(
                    deal("d-2", Stage::ClosedLost, 100, 0, None),
                    at(2025, 1, 1),
                    at(2025, 3, 9),
                ),
                stored(
                    deal("d-3", Stage::ClosedWon, 250, 100, None),
                    at(2025, 1, 1),
                    at(2025, 1, 31),
                ),
                stored(
                    deal("d-4", Stage::ClosedWon, 999, 100, None),
                    at(2024, 1, 1),
                    at(2024, 6, 30),
                ),
            ],
            ..CrmSnapshot::default()
        };

        let trends = sales_trends(&snapshot, 3, at(2025, 3, 15));
        let months: Vec<&str> = trends.iter().map(|t| t.month.as_str()).collect();
        assert_eq!(months, vec!["2025-01", "2025-02", "2025-03"]);
        assert_eq!(trends[0].won_revenue, Decimal::from(250));
        assert_eq!(trends[1].won_count, 0);
        assert_eq!(trends[2].won_count, 1);
        assert_eq!(trends[2].lost_count, 1);
        assert_eq!(trends[2].win_rate, Decimal::from(50));
    }

    #[test]
    fn months_are_bounded() {
        assert_eq!(validate_months(None), Ok(DEFAULT_TREND_MONTHS));
        assert_eq!(validate_months(Some(24)), Ok(24));
        assert!(validate_months(Some(0)).is_err());
        assert!(validate_months(Some(25)).is_err());
    }

    #[test]
    fn forecast_windows_follow_the_calendar() {
        let today = date(2025, 5, 14);
        assert_eq!(
            ForecastPeriod::Month.window(today),
            (date(2025, 5, 1), date(2025, 5, 31))
        );
        assert_eq!(
            ForecastPeriod::Quarter.window(today),
            (date(2025, 4, 1), date(2025, 6, 30))
        );
        assert_eq!(
            ForecastPeriod::Quarter.window(date(2025, 12, 31)),
            (date(2025, 10, 1), date(2025, 12, 31))
        );
    }

    #[test]
    fn forecast_buckets_by_probability() {
        let now = at(2025, 5, 1);
        let snapshot = CrmSnapshot {
            deals: vec![
                stored(deal("d-1", Stage::Negotiation, 1000, 70, Some(date(2025, 5, 20))), now, now),
                stored(deal("d-2", Stage::Proposal, 400, 69, Some(date(2025, 5, 2))), now, now),
                stored(deal("d-3", Stage::Lead, 100, 10, Some(date(2025, 5, 31))), now, now),
                stored(deal("d-4", Stage::Lead, 100, 90, Some(date(2025, 6, 1))), now, now),
                stored(deal("d-5", Stage::ClosedWon, 100, 90, Some(date(2025, 5, 3))), now, now),
                stored(deal("d-6", Stage::Lead, 100, 90, None), now, now),
            ],
            ..CrmSnapshot::default()
        };

        let result = forecast(&snapshot, ForecastPeriod::Month, date(2025, 5, 14));
        assert_eq!(result.high.count, 1);
        assert_eq!(result.medium.count, 1);
        assert_eq!(result.low.count, 1);
        assert_eq!(result.total_value, Decimal::from(1500));
        assert_eq!(result.weighted_value, Decimal::new(98600, 2));
    }

    #[test]
    fn breakdown_counts_labels_and_departments() {
        let now = at(2025, 1, 1);
        let snapshot = CrmSnapshot {
            customers: vec![
                customer("c-1", CustomerStatus::Active, now),
                customer("c-2", CustomerStatus::Active, now),
            ],
            tasks: vec![
                task("t-1", TaskStatus::InProgress, TaskPriority::High),
                task("t-2", TaskStatus::Pending, TaskPriority::High),
            ],
            employees: vec![
                employee("e-1", "Sales", 60_000),
                employee("e-2", "Sales", 50_000),
                employee("e-3", "Engineering", 90_000),
            ],
            ..CrmSnapshot::default()
        };

        let result = breakdown(&snapshot);
        assert_eq!(result.customer_status[1].label, "Active");
        assert_eq!(result.customer_status[1].count, 2);
        assert_eq!(result.customer_status[0].count, 0);
        assert_eq!(result.task_status[1].label, "In Progress");
        assert_eq!(result.task_status[1].count, 1);
        assert_eq!(result.task_priority[0].count, 2);
        assert_eq!(result.departments[0].department, "Engineering");
        assert_eq!(result.departments[1].headcount, 2);
        assert_eq!(result.departments[1].average_salary, Decimal::from(55_000));
    }
}
