use std::{collections::BTreeSet, fmt};

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, ser::Error as _, Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::pipeline::Stage;
use crate::validation::{is_valid_email, is_valid_phone, ValidationError, Validator};

/// The four document collections held by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Customers,
    Deals,
    Employees,
    Tasks,
}

impl Collection {
    pub const ALL: [Collection; 4] = [
        Collection::Customers,
        Collection::Deals,
        Collection::Employees,
        Collection::Tasks,
    ];

    /// Returns the collection name used in storage and URLs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Customers => "customers",
            Self::Deals => "deals",
            Self::Employees => "employees",
            Self::Tasks => "tasks",
        }
    }

    /// Returns the singular record kind (`customer`, `deal`, ...).
    pub fn kind(self) -> &'static str {
        match self {
            Self::Customers => "customer",
            Self::Deals => "deal",
            Self::Employees => "employee",
            Self::Tasks => "task",
        }
    }

    /// Resolves the plural collection segment of a URL.
    pub fn from_name(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == value)
    }

    /// Resolves the singular kind segment of a URL.
    pub fn from_kind(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.kind() == value)
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Schema implemented by every document type kept in a collection.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const COLLECTION: Collection;

    fn id(&self) -> &str;

    fn set_id(&mut self, id: String);

    /// Stamps creation-time fields kept inside the record itself.
    fn on_create(&mut self, _at: DateTime<Utc>) {}

    /// Canonicalises free-form fields before validation (trimming, set ordering).
    fn normalize(&mut self) {}

    fn validate(&self) -> Result<(), ValidationError>;

    /// Free-text fields consulted by the list `search` filter.
    fn search_fields(&self) -> Vec<&str>;

    fn status_label(&self) -> Option<&'static str> {
        None
    }

    fn stage(&self) -> Option<Stage> {
        None
    }

    /// Field whose value must be unique (case-insensitively) within the collection.
    fn unique_key(&self) -> Option<(&'static str, &str)> {
        None
    }
}

/// A record together with the metadata maintained by the store.
///
/// Serializes as the record's fields plus `created_at` and `updated_at`. A
/// record that keeps its own `created_at` wins over the envelope value.
#[derive(Debug, Clone, PartialEq)]
pub struct Stored<T> {
    pub record: T,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<T: Serialize> Serialize for Stored<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut document = serde_json::to_value(&self.record).map_err(S::Error::custom)?;
        let Value::Object(fields) = &mut document else {
            return Err(S::Error::custom("stored records must serialize as objects"));
        };
        fields
            .entry("created_at")
            .or_insert_with(|| Value::from(self.created_at.to_rfc3339()));
        fields.insert(
            "updated_at".to_string(),
            Value::from(self.updated_at.to_rfc3339()),
        );
        document.serialize(serializer)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CustomerStatus {
    #[default]
    Lead,
    Active,
    Inactive,
}

impl CustomerStatus {
    pub const ALL: [CustomerStatus; 3] = [Self::Lead, Self::Active, Self::Inactive];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lead => "Lead",
            Self::Active => "Active",
            Self::Inactive => "Inactive",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub status: CustomerStatus,
    #[serde(default, with = "rust_decimal::serde::float")]
    pub value: Decimal,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub notes: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Record for Customer {
    const COLLECTION: Collection = Collection::Customers;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn on_create(&mut self, at: DateTime<Utc>) {
        self.created_at = at;
    }

    fn normalize(&mut self) {
        self.name = self.name.trim().to_string();
        self.email = self.email.trim().to_string();
        self.phone = self.phone.trim().to_string();
        self.company = self.company.trim().to_string();
        self.tags = self
            .tags
            .iter()
            .map(|tag| tag.trim().to_string())
            .filter(|tag| !tag.is_empty())
            .collect();
    }

    fn validate(&self) -> Result<(), ValidationError> {
        let mut v = Validator::new();
        v.require("name", &self.name);
        if self.email.trim().is_empty() {
            v.reject("email", "is required");
        } else {
            v.check(
                "email",
                is_valid_email(&self.email),
                "must be a valid email address",
            );
        }
        if !self.phone.is_empty() {
            v.check(
                "phone",
                is_valid_phone(&self.phone),
                "must contain 10 to 15 digits",
            );
        }
        v.amount("value", self.value, Decimal::ZERO, true);
        v.finish()
    }

    fn search_fields(&self) -> Vec<&str> {
        vec![
            self.name.as_str(),
            self.email.as_str(),
            self.company.as_str(),
            self.phone.as_str(),
        ]
    }

    fn status_label(&self) -> Option<&'static str> {
        Some(self.status.as_str())
    }

    fn unique_key(&self) -> Option<(&'static str, &str)> {
        Some(("email", &self.email))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deal {
    #[serde(default)]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub customer_id: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub value: Decimal,
    #[serde(default)]
    pub stage: Stage,
    #[serde(default)]
    pub probability: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_close: Option<NaiveDate>,
    #[serde(default)]
    pub notes: String,
}

impl Deal {
    /// Value scaled by the win probability. Saturates instead of overflowing.
    pub fn weighted_value(&self) -> Decimal {
        let share = Decimal::from(self.probability) / Decimal::ONE_HUNDRED;
        self.value.checked_mul(share).unwrap_or(Decimal::MAX)
    }

    /// Open deals whose expected close date has passed.
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        !self.stage.is_closed() && self.expected_close.is_some_and(|close| close < today)
    }
}

impl Record for Deal {
    const COLLECTION: Collection = Collection::Deals;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn normalize(&mut self) {
        self.title = self.title.trim().to_string();
        self.customer_id = self.customer_id.trim().to_string();
    }

    fn validate(&self) -> Result<(), ValidationError> {
        let mut v = Validator::new();
        v.require("title", &self.title);
        v.amount("value", self.value, Decimal::ZERO, false);
        v.check(
            "probability",
            self.probability <= 100,
            "must be between 0 and 100",
        );
        v.finish()
    }

    fn search_fields(&self) -> Vec<&str> {
        vec![self.title.as_str(), self.customer_id.as_str(), self.notes.as_str()]
    }

    fn stage(&self) -> Option<Stage> {
        Some(self.stage)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Employee {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub department: String,
    pub role: String,
    #[serde(default)]
    pub skills: BTreeSet<String>,
    #[serde(default, with = "rust_decimal::serde::float")]
    pub salary: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hire_date: Option<NaiveDate>,
}

impl Record for Employee {
    const COLLECTION: Collection = Collection::Employees;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn normalize(&mut self) {
        self.name = self.name.trim().to_string();
        self.department = self.department.trim().to_string();
        self.role = self.role.trim().to_string();
        self.skills = self
            .skills
            .iter()
            .map(|skill| skill.trim().to_string())
            .filter(|skill| !skill.is_empty())
            .collect();
    }

    fn validate(&self) -> Result<(), ValidationError> {
        let mut v = Validator::new();
        v.require("name", &self.name);
        v.require("department", &self.department);
        v.require("role", &self.role);
        v.amount("salary", self.salary, Decimal::ZERO, true);
        v.finish()
    }

    fn search_fields(&self) -> Vec<&str> {
        vec![self.name.as_str(), self.department.as_str(), self.role.as_str()]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TaskPriority {
    High,
    #[default]
    Medium,
    Low,
}

impl TaskPriority {
    pub const ALL: [TaskPriority; 3] = [Self::High, Self::Medium, Self::Low];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TaskStatus {
    #[default]
    Pending,
    #[serde(rename = "In Progress")]
    InProgress,
    Completed,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 3] = [Self::Pending, Self::InProgress, Self::Completed];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::InProgress => "In Progress",
            Self::Completed => "Completed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(default)]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub status: TaskStatus,
}

impl Task {
    /// Open tasks due on or before `horizon`.
    pub fn is_due_by(&self, horizon: NaiveDate) -> bool {
        self.status != TaskStatus::Completed && self.due_date.is_some_and(|due| due <= horizon)
    }
}

impl Record for Task {
    const COLLECTION: Collection = Collection::Tasks;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn normalize(&mut self) {
        self.title = self.title.trim().to_string();
        self.assignee = self
            .assignee
            .take()
            .map(|assignee| assignee.trim().to_string())
            .filter(|assignee| !assignee.is_empty());
    }

    fn validate(&self) -> Result<(), ValidationError> {
        let mut v = Validator::new();
        v.require("title", &self.title);
        v.finish()
    }

    fn search_fields(&self) -> Vec<&str> {
        let mut fields = vec![self.title.as_str(), self.description.as_str()];
        fields.extend(self.assignee.as_deref());
        fields
    }

    fn status_label(&self) -> Option<&'static str> {
        Some(self.status.as_str())
    }
}

/// Point-in-time copy of every collection, used by the derived views.
#[derive(Debug, Clone, Default)]
pub struct CrmSnapshot {
    pub customers: Vec<Stored<Customer>>,
    pub deals: Vec<Stored<Deal>>,
    pub employees: Vec<Stored<Employee>>,
    pub tasks: Vec<Stored<Task>>,
}
