use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{CrmSnapshot, CustomerStatus};

/// Leads left without a deal for longer than this are flagged.
pub const STALE_LEAD_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    OverdueDeal,
    TaskDue,
    StaleLead,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub message: String,
    pub link: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationFeed {
    pub count: usize,
    pub notifications: Vec<Notification>,
}

impl NotificationFeed {
    /// Collects reminders in a fixed order: overdue deals, due tasks, stale leads.
    pub fn derive(snapshot: &CrmSnapshot, now: DateTime<Utc>) -> Self {
        let today = now.date_naive();
        let tomorrow = today + Duration::days(1);
        let mut notifications = Vec::new();

        for deal in snapshot.deals.iter().map(|stored| &stored.record) {
            if deal.is_overdue(today) {
                notifications.push(Notification {
                    kind: NotificationKind::OverdueDeal,
                    message: format!("Deal '{}' is past its expected close date", deal.title),
                    link: format!("/api/deals/{}/", deal.id),
                });
            }
        }

        for task in snapshot.tasks.iter().map(|stored| &stored.record) {
            if task.is_due_by(tomorrow) {
                notifications.push(Notification {
                    kind: NotificationKind::TaskDue,
                    message: format!("Task '{}' is due soon", task.title),
                    link: format!("/api/tasks/{}/", task.id),
                });
            }
        }

        let with_deals: HashSet<&str> = snapshot
            .deals
            .iter()
            .map(|stored| stored.record.customer_id.as_str())
            .collect();
        let cutoff = now - Duration::days(STALE_LEAD_DAYS);
        for customer in snapshot.customers.iter().map(|stored| &stored.record) {
            if customer.status == CustomerStatus::Lead
                && customer.created_at < cutoff
                && !with_deals.contains(customer.id.as_str())
            {
                notifications.push(Notification {
                    kind: NotificationKind::StaleLead,
                    message: format!(
                        "Lead '{}' has no deal after {STALE_LEAD_DAYS} days",
                        customer.name
                    ),
                    link: format!("/api/customers/{}/", customer.id),
                });
            }
        }

        Self {
            count: notifications.len(),
            notifications,
        }
    }
}
