// Public API for integration tests and potential library usage

pub mod api;
pub mod letters;
pub mod llm;
pub mod protocol;
pub mod referee;
pub mod state;
pub mod types;
pub mod ws;

// Background room reaper
pub mod broadcast;
