//! Active Data: a transactional, label-tree document core.
//!
//! Documents are trees of labels carrying typed attributes. On top of them
//! sit typed parameters, nodes grouped in partitions, an undoable
//! transaction engine, a LogBook of modification marks and a tree-function
//! engine that re-executes dependent functions in order.

pub mod db;
pub mod document;
pub mod exec;
pub mod func;
pub mod graph;
pub mod label;
pub mod logbook;
pub mod logging;
pub mod model;
pub mod notifier;
pub mod param;
pub mod repo;
pub mod tx;

pub use document::{DocError, DocResult, Document};
pub use exec::FuncExecutionCtx;
pub use func::{FunctionError, FunctionRegistry, FunctionResult, FunctionScope, TreeFunction};
pub use label::{AttrKind, AttrValue, Entry, LabelStore};
pub use logbook::{LogBook, LogBookSection};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::{
    BaseModel, ExecFlags, ExecutionReport, ExecutionStatus, ModelConfig, ModelError, ModelResult,
    ModelSchema, ModelStatus, Node, NodeType, Partition, VariableKind, VersionStatus,
};
pub use notifier::{MessageSeverity, Plotter, ProgressNotifier};
pub use param::tree_function::TreeFunctionParameter;
pub use param::{DataCursor, ModificationType, ParamError, ParamResult, ParamValue, Parameter, ParameterKind};
pub use repo::{DocumentRepository, RepoError, RepoResult, SqliteDocumentRepository};
pub use tx::{TxData, TxDatum, TxError, TxMode};

/// Minimal health-check API for embedders.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
