pub mod error;
pub mod types;
pub mod value;

pub use error::{EngineError, Result};
pub use types::{Column, Row, RowSchema};
pub use value::{DataType, Value};
