//! Dynamic entity engine: business entities are defined as metadata at
//! runtime, compiled into loadable types, materialized as SQL tables and
//! served through a generic persistence layer. No entity-specific code
//! exists anywhere; the metadata drives everything.
//!
//! The pipeline, end to end:
//!
//! ```text
//! EntityDefinition ──codegen──▶ DSL source ──compiler──▶ EntityType
//!        │                                                   │
//!        └──ddl──▶ CREATE/ALTER TABLE ──storage──▶ tables ◀──┘
//!                        (publish orchestrates both sides)
//! ```
//!
//! ```no_run
//! use dynentity::{EngineConfig, EntityEngine};
//! use dynentity::metadata::{FieldDataType, FieldMetadata};
//!
//! # async fn demo() -> dynentity::Result<()> {
//! let engine = EntityEngine::new(EngineConfig::default());
//! let mut product = engine.new_entity("Product", "admin");
//! product.upsert_field(FieldMetadata::new("Name", FieldDataType::String).with_length(200).required())?;
//! let id = engine.define_entity(product).await?;
//! let result = engine.publish(id, "admin").await?;
//! assert!(result.success);
//! # Ok(())
//! # }
//! ```

pub mod aggregate;
pub mod codegen;
pub mod compiler;
pub mod core;
pub mod ddl;
pub mod engine;
pub mod metadata;
pub mod persistence;
pub mod publish;
pub mod storage;

pub use aggregate::{Aggregate, AggregateService, DetailEntry, DetailRows};
pub use codegen::SourceGenerator;
pub use compiler::{CompileOutcome, EntityCompiler, EntityType, TypeRegistry};
pub use self::core::{EngineError, Result, Value};
pub use ddl::{ChangeAnalysis, DdlExecutor, DdlGenerator, PostgresDdlGenerator};
pub use engine::{EngineConfig, EntityEngine};
pub use metadata::{
    EntityDefinition, EntityStatus, EnumDefinition, FieldDataType, FieldMetadata, MetadataStore,
};
pub use persistence::{FilterCondition, FilterOperator, JsonMap, PersistenceService, QueryOptions};
pub use publish::{PublishResult, PublishingService, WithdrawMode};
pub use storage::{MemoryBackend, SchemaBackend};
