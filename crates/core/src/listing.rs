use serde::{Deserialize, Serialize};

use crate::pipeline::Stage;
use crate::types::{Record, Stored};

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 100;

/// Optional narrowing applied to a collection listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    pub search: Option<String>,
    pub status: Option<String>,
    pub stage: Option<Stage>,
}

impl ListFilter {
    pub fn matches<T: Record>(&self, record: &T) -> bool {
        if let Some(search) = self.search.as_deref().map(str::trim) {
            if !search.is_empty() {
                let needle = search.to_lowercase();
                let hit = record
                    .search_fields()
                    .into_iter()
                    .any(|field| field.to_lowercase().contains(&needle));
                if !hit {
                    return false;
                }
            }
        }
        if let Some(status) = self.status.as_deref() {
            // Collections without a status field ignore the filter.
            if let Some(label) = record.status_label() {
                if !label.eq_ignore_ascii_case(status) {
                    return false;
                }
            }
        }
        if let (Some(wanted), Some(stage)) = (self.stage, record.stage()) {
            if wanted != stage {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: usize,
    pub page_size: usize,
    pub total_items: usize,
    pub total_pages: usize,
    pub has_next: bool,
    pub has_previous: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub results: Vec<T>,
    pub pagination: Pagination,
}

/// Slices `items` into the requested 1-based page.
///
/// Out-of-range pages yield an empty result with accurate totals.
pub fn paginate<T>(items: Vec<T>, page: Option<usize>, page_size: Option<usize>) -> Page<T> {
    let page = page.unwrap_or(1).max(1);
    let page_size = page_size
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    let total_items = items.len();
    let total_pages = total_items.div_ceil(page_size);

    let results = items
        .into_iter()
        .skip((page - 1).saturating_mul(page_size))
        .take(page_size)
        .collect();

    Page {
        results,
        pagination: Pagination {
            page,
            page_size,
            total_items,
            total_pages,
            has_next: page < total_pages,
            has_previous: page > 1,
        },
    }
}

/// Filters stored records and returns the requested page, newest first.
pub fn list_page<T: Record>(
    mut records: Vec<Stored<T>>,
    filter: &ListFilter,
    page: Option<usize>,
    page_size: Option<usize>,
) -> Page<Stored<T>> {
    records.retain(|stored| filter.matches(&stored.record));
    records.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.record.id().cmp(b.record.id()))
    });
    paginate(records, page, page_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Task, TaskPriority, TaskStatus};
    use chrono::{Duration, Utc};

    fn task(id: &str, title: &str, status: TaskStatus, age_days: i64) -> Stored<Task> {
        let created_at = Utc::now() - Duration::days(age_days);
        Stored {
            record: Task {
                id: id.to_string(),
                title: title.to_string(),
                description: String::new(),
                assignee: Some("emp-1".to_string()),
                priority: TaskPriority::Medium,
                due_date: None,
                status,
            },
            created_at,
            updated_at: created_at,
        }
    }

    #[test]
    fn paginate_reports_totals() {
        let page = paginate((1..=45).collect::<Vec<_>>(), Some(3), Some(20));
        assert_eq!(page.results, (41..=45).collect::<Vec<_>>());
        assert_eq!(page.pagination.total_pages, 3);
        assert!(!page.pagination.has_next);
        assert!(page.pagination.has_previous);
    }

    #[test]
    fn paginate_clamps_inputs() {
        let page = paginate(vec![1, 2, 3], Some(0), Some(1000));
        assert_eq!(page.pagination.page, 1);
        assert_eq!(page.pagination.page_size, MAX_PAGE_SIZE);
        assert_eq!(page.results, vec![1, 2, 3]);

        let past_end = paginate(vec![1, 2, 3], Some(9), Some(2));
        assert!(past_end.results.is_empty());
        assert_eq!(past_end.pagination.total_items, 3);
    }

    #[test]
    fn empty_listing_has_zero_pages() {
        let page = paginate(Vec::<u8>::new(), None, None);
        assert_eq!(page.pagination.total_pages, 0);
        assert!(!page.pagination.has_next);
        assert!(!page.pagination.has_previous);
    }

    #[test]
    fn list_page_filters_and_orders_newest_first() {
        let tasks = vec![
            task("t-1", "Call Jane", TaskStatus::Pending, 3),
            task("t-2", "Send proposal", TaskStatus::Completed, 2),
            task("t-3", "Call John", TaskStatus::Pending, 1),
        ];
        let filter = ListFilter {
            search: Some("call".to_string()),
            status: Some("pending".to_string()),
            stage: None,
        };
        let page = list_page(tasks, &filter, None, None);
        let ids: Vec<&str> = page.results.iter().map(|t| t.record.id.as_str()).collect();
        assert_eq!(ids, vec!["t-3", "t-1"]);
    }

    #[test]
    fn status_filter_uses_display_names() {
        let tasks = vec![
            task("t-1", "Draft", TaskStatus::InProgress, 1),
            task("t-2", "Review", TaskStatus::Pending, 1),
        ];
        let filter = ListFilter {
            status: Some("In Progress".to_string()),
            ..ListFilter::default()
        };
        let page = list_page(tasks, &filter, None, None);
        assert_eq!(page.results.len(), 1);
        assert_eq!(page.results[0].record.id, "t-1");
    }
}
