pub mod executor;
pub mod generator;

pub use executor::DdlExecutor;
pub use generator::{ChangeAnalysis, DdlGenerator, PostgresDdlGenerator};
