use serde::{Deserialize, Serialize};

use crate::types::{Customer, CustomerStatus};

/// Queries shorter than this never reach the store.
pub const MIN_QUERY_LEN: usize = 2;
pub const DEFAULT_LIMIT: usize = 10;
pub const MAX_LIMIT: usize = 50;

/// Returns the trimmed query when it is long enough to look up.
pub fn searchable(query: &str) -> Option<&str> {
    let trimmed = query.trim();
    (trimmed.chars().count() >= MIN_QUERY_LEN).then_some(trimmed)
}

/// Clamps a requested result limit to `1..=MAX_LIMIT`.
pub fn clamp_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

/// Autocomplete entry returned for a matching customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerHit {
    pub id: String,
    pub name: String,
    pub email: String,
    pub company: String,
    pub status: CustomerStatus,
}

impl From<&Customer> for CustomerHit {
    fn from(customer: &Customer) -> Self {
        Self {
            id: customer.id.clone(),
            name: customer.name.clone(),
            email: customer.email.clone(),
            company: customer.company.clone(),
            status: customer.status,
        }
    }
}

/// Case-insensitive substring match over name, email and company.
pub fn customer_matches(customer: &Customer, needle_lower: &str) -> bool {
    [&customer.name, &customer.email, &customer.company]
        .into_iter()
        .any(|field| field.to_lowercase().contains(needle_lower))
}

/// Finds customers matching `query`, ordered by name, at most `limit` of them.
pub fn search_customers<'a, I>(customers: I, query: &str, limit: usize) -> Vec<CustomerHit>
where
    I: IntoIterator<Item = &'a Customer>,
{
    let Some(query) = searchable(query) else {
        return Vec::new();
    };
    let needle = query.to_lowercase();

    let mut hits: Vec<CustomerHit> = customers
        .into_iter()
        .filter(|customer| customer_matches(customer, &needle))
        .map(CustomerHit::from)
        .collect();
    hits.sort_by(|a, b| {
        a.name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.id.cmp(&b.id))
    });
    hits.truncate(limit);
    hits
}
