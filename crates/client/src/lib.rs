pub mod api;
pub mod autocomplete;
pub mod poller;

pub use api::{ClientError, CrmClient, ProblemBody, Session, CSRF_HEADER, SESSION_COOKIE};
pub use autocomplete::{Autocomplete, CustomerLookup, SearchView};
pub use poller::{BoardColumn, PipelineBoard, PipelinePoller, PipelineSource};
