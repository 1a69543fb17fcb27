// Public module exports
pub mod case_parser;
pub mod citations;
pub mod council;
pub mod deliberation_agent;
pub mod opinion;
pub mod orchestrator;
pub mod persona;

// Re-export main types for convenience
pub use case_parser::CaseParser;
pub use citations::extract_citations;
pub use council::Council;
pub use deliberation_agent::DeliberationAgent;
pub use opinion::OpinionWriter;
pub use orchestrator::{AgentContext, Orchestrator};
