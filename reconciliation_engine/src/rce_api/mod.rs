pub mod compensation_api;
pub mod reconciliation_api;
pub mod resolver;
