//! Domain layer of the CRM service.
//!
//! Record schemas, validation rules, the sales pipeline stages, and the
//! derived computations (pipeline aggregates, search matching, dashboard
//! analytics, notifications, deal recommendations). Everything here is pure;
//! persistence lives in `crm-storage` and transport in `crm-app`.
pub mod analytics;
pub mod listing;
pub mod notifications;
pub mod pipeline;
pub mod recommendations;
pub mod search;
pub mod types;
pub mod validation;
