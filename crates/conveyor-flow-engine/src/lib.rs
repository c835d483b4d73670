//! Conveyor — integration-flow step execution.
//!
//! This crate provides the core types, traits, and step commands for
//! executing the nodes of an integration flow: the shared mutable
//! [`context::ExecutionContext`], the typed step commands (start, adapter,
//! parallel split, utility), and the built-in data/file utility
//! processors. Adapter transports live in companion crates behind the
//! [`traits::AdapterRunner`] seam, so the engine itself has zero protocol
//! dependencies.

pub mod context;
pub mod defaults;
pub mod errors;
pub mod node_config;
pub mod steps;
pub mod traits;
pub mod types;
pub mod util;

// Re-export public types at the crate level.

// context
pub use context::{
    ExecutionContext, FILE_LIST_KEYS, KEY_FILES_TO_PROCESS, KEY_FOUND_FILES,
    KEY_SENDER_FILES, KEY_SENDER_PROCESSED_FILES, KEY_TRIGGER_DATA,
};

// defaults
pub use defaults::InMemoryAdapterLookup;

// errors
pub use errors::{ContractViolation, LookupError, StepError, UtilityError};

// node_config
pub use node_config::NodeConfig;

// steps
pub use steps::{
    execute_step, AdapterStepCommand, ParallelSplitStepCommand, StartStepCommand, StepRegistry,
    UtilityStepCommand,
};

// traits
pub use traits::{AdapterLookup, AdapterRunner, StepCommand, UtilityRunner};

// types
pub use types::{
    Adapter, AdapterDirection, AdapterType, CommandResult, FlowExecutionStep, ProcessedFile,
    ResultMap, StepStatus,
};

// util
pub use util::UtilityProcessors;
