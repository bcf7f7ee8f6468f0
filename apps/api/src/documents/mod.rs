// Document intelligence: payload → text → narrative → structured assessment.
// Every step here is a pure transformation; side effects live in the pipeline.

pub mod analysis;
pub mod extract;
pub mod models;
pub mod prompts;
pub mod sections;
