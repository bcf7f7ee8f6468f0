// Form filling: schema loading, value ingestion, application and statistics.

pub mod filler;
pub mod generation;
pub mod normalize;
pub mod prompts;
pub mod schema;
pub mod stats;
pub mod values;
