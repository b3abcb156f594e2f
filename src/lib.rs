//! Question answering over biomedical laboratory equipment manuals.

pub mod core;
pub mod history;
pub mod llm;
pub mod rag;
pub mod server;
pub mod state;
