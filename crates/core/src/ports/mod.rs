mod processor;
mod queue;
mod repository;
mod upstream;

pub use processor::*;
pub use queue::*;
pub use repository::*;
pub use upstream::*;
