pub mod compiler;
pub mod parser;
pub mod registry;

pub use compiler::{CompileOutcome, EntityCompiler};
pub use parser::{Diagnostic, EntityProgram};
pub use registry::{EntityType, EnumCheck, LookupBinding, TypeRegistry};
