pub mod agents;
pub mod cancel;
pub mod client;
pub mod db;
pub mod embeddings;
pub mod error;
pub mod handlers;
pub mod init;
pub mod models;
pub mod state;
pub mod stream;

pub use crate::cancel::{CancellationToken, RequestManager};
pub use crate::client::CouncilClient;
pub use crate::init::{AiConfig, AppState};
pub use crate::state::CouncilState;
