// Pipeline orchestration: the only component with side effects on persistent state.

pub mod handlers;
pub mod lock;
pub mod orchestrator;
pub mod progress;

#[cfg(test)]
pub mod testing;
