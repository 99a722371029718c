//! Google Cloud REST clients: access tokens, Dialogflow CX intent detection, BigQuery
//! queries and Vertex AI Search (Discovery Engine).

mod auth;
mod bigquery;
mod dialogflow;
mod discovery;

pub use auth::{regional_host, AuthError, GoogleAuth};
pub use bigquery::{BigQueryClient, QueryError, QueryExecutor, QueryResult};
pub use dialogflow::{DialogflowClient, IntentDetector, IntentError};
pub use discovery::{DiscoveryEngineClient, DocumentSearch, SearchError};
