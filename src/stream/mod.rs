//! Client side of the deliberation event stream: line reader, event parser,
//! per-sender message assembler and the turn driver that ties them together.

pub mod assembler;
pub mod consumer;
pub mod error;
pub mod events;
pub mod parser;
pub mod reader;

pub use assembler::{Applied, ChatMessage, MessageAssembler, USER_SENDER};
pub use consumer::{drive, run_turn, settle};
pub use error::StreamError;
pub use events::{Citations, StreamEvent};
pub use parser::parse_line;
pub use reader::{lines, LineBuffer};
