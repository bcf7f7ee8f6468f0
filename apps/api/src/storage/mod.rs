// I/O boundaries of the pipeline. Failures here are the only ones that end a run.

pub mod blob;
pub mod store;
