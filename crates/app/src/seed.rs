use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use tracing::info;

use crm_core::pipeline::Stage;
use crm_core::types::{Customer, CustomerStatus, Deal, Employee, Task, TaskPriority, TaskStatus};
use crm_storage::{Database, RepositoryError};

/// Populates an empty store with a small demo data set.
///
/// Returns `false` without writing when customers already exist.
pub async fn seed_demo_data(
    database: &Database,
    now: DateTime<Utc>,
) -> Result<bool, RepositoryError> {
    let customers = database.customers();
    if customers.count().await? > 0 {
        info!(stage = "seed", "store already has customers; skipping demo data");
        return Ok(false);
    }

    let today = now.date_naive();
    for customer in demo_customers(now) {
        customers.insert(customer, now).await?;
    }
    let deals = database.deals();
    for deal in demo_deals(today) {
        deals.insert(deal, now).await?;
    }
    let tasks = database.tasks();
    for task in demo_tasks(today) {
        tasks.insert(task, now).await?;
    }
    let employees = database.employees();
    for employee in demo_employees() {
        employees.insert(employee, now).await?;
    }

    info!(stage = "seed", customers = 3, deals = 3, tasks = 2, employees = 2, "demo data seeded");
    Ok(true)
}

#[allow(clippy::too_many_arguments)]
fn customer(
    id: &str,
    name: &str,
    email: &str,
    phone: &str,
    company: &str,
    status: CustomerStatus,
    notes: &str,
    now: DateTime<Utc>,
) -> Customer {
    Customer {
        id: id.to_string(),
        name: name.to_string(),
        email: email.to_string(),
        phone: phone.to_string(),
        company: company.to_string(),
        status,
        value: Decimal::ZERO,
        tags: Default::default(),
        notes: notes.to_string(),
        created_at: now,
    }
}

fn demo_customers(now: DateTime<Utc>) -> Vec<Customer> {
    vec![
        customer(
            "cust001",
            "John Smith",
            "john.smith@techcorp.com",
            "+1 555-010-0101",
            "Tech Corp",
            CustomerStatus::Active,
            "",
            now,
        ),
        customer(
            "cust002",
            "Jane Doe",
            "jane.doe@designstudio.com",
            "+1 555-010-0102",
            "Design Studio Inc",
            CustomerStatus::Lead,
            "",
            now,
        ),
        customer(
            "cust003",
            "Mike Johnson",
            "mike@startup.io",
            "+1 555-010-0103",
            "StartUp.io",
            CustomerStatus::Lead,
            "Early-stage startup, budget conscious",
            now,
        ),
    ]
}

fn deal(
    id: &str,
    title: &str,
    customer_id: &str,
    value: i64,
    stage: Stage,
    probability: u8,
    expected_close: NaiveDate,
) -> Deal {
    Deal {
        id: id.to_string(),
        title: title.to_string(),
        customer_id: customer_id.to_string(),
        value: Decimal::from(value),
        stage,
        probability,
        expected_close: Some(expected_close),
        notes: String::new(),
    }
}

fn demo_deals(today: NaiveDate) -> Vec<Deal> {
    vec![
        deal(
            "deal123",
            "Enterprise Software License",
            "cust001",
            150_000,
            Stage::Proposal,
            75,
            today + Duration::days(30),
        ),
        deal(
            "deal124",
            "Website Redesign Project",
            "cust002",
            25_000,
            Stage::Qualified,
            50,
            today + Duration::days(45),
        ),
        deal(
            "deal125",
            "Cloud Migration Services",
            "cust001",
            35_000,
            Stage::Negotiation,
            85,
            today + Duration::days(14),
        ),
    ]
}

fn demo_tasks(today: NaiveDate) -> Vec<Task> {
    vec![
        Task {
            id: "task001".to_string(),
            title: "Follow up with Tech Corp".to_string(),
            description: "Check on proposal status".to_string(),
            assignee: Some("Sarah Lee".to_string()),
            priority: TaskPriority::High,
            due_date: Some(today + Duration::days(1)),
            status: TaskStatus::Pending,
        },
        Task {
            id: "task002".to_string(),
            title: "Prepare demo for Design Studio".to_string(),
            description: "Tailor the walkthrough to their redesign goals".to_string(),
            assignee: Some("David Chen".to_string()),
            priority: TaskPriority::Medium,
            due_date: Some(today + Duration::days(6)),
            status: TaskStatus::InProgress,
        },
    ]
}

fn demo_employees() -> Vec<Employee> {
    vec![
        Employee {
            id: "emp001".to_string(),
            name: "Sarah Lee".to_string(),
            department: "Sales".to_string(),
            role: "Account Executive".to_string(),
            skills: ["negotiation", "enterprise sales"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            salary: Decimal::from(85_000),
            hire_date: NaiveDate::from_ymd_opt(2021, 3, 15),
        },
        Employee {
            id: "emp002".to_string(),
            name: "David Chen".to_string(),
            department: "Solutions".to_string(),
            role: "Sales Engineer".to_string(),
            skills: ["cloud architecture", "demos"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            salary: Decimal::from(95_000),
            hire_date: NaiveDate::from_ymd_opt(2022, 8, 1),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crm_core::pipeline::PipelineSummary;

    async fn setup_db() -> Database {
        let db = Database::connect("sqlite::memory:")
            .await
            .expect("connect");
        db.run_migrations().await.expect("migrations");
        db
    }

    #[tokio::test]
    async fn seeds_an_empty_store_once() {
        let db = setup_db().await;
        let now = Utc::now();

        assert!(seed_demo_data(&db, now).await.expect("first seed"));
        assert!(!seed_demo_data(&db, now).await.expect("second seed"));

        let snapshot = db.snapshot().await.expect("snapshot");
        assert_eq!(snapshot.customers.len(), 3);
        assert_eq!(snapshot.deals.len(), 3);
        assert_eq!(snapshot.tasks.len(), 2);
        assert_eq!(snapshot.employees.len(), 2);

        let summary = PipelineSummary::from_deals(snapshot.deals.iter().map(|s| &s.record));
        assert_eq!(summary.stage(Stage::Proposal).count, 1);
        assert_eq!(summary.total_value, Decimal::from(210_000));
    }
}
