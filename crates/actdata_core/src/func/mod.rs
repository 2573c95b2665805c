//! Tree functions: driver contract, registry and per-run scope.
//!
//! # Responsibility
//! - Define the `TreeFunction` driver contract implemented by applications.
//! - Keep the GUID-keyed registry of drivers owned by a model.
//! - Run one function through the validation/propagation scheme.
//!
//! # Invariants
//! - One driver per GUID; registering a GUID again replaces the driver.
//! - Function bodies only see document access through `FunctionScope`.
//!
//! # See also
//! - `execute` for the framework execution scheme.
//! - `crate::model::execute` for the graph-wide pass.

pub mod execute;
mod scope;

pub use execute::{must_execute, run_function, RunOutcome};
pub use scope::FunctionScope;

use crate::document::Document;
use crate::param::tree_function::TreeFunctionParameter;
use crate::param::{ParamError, Parameter, ParameterKind};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Priority of functions without an explicit one.
pub const PRIORITY_NORMAL: i32 = 0;

/// Error code reported when inputs or outputs break the declared signature.
pub const VALIDATION_ERROR_CODE: i32 = 1;

pub type FunctionResult = Result<(), FunctionError>;

/// Failure of one tree function run.
#[derive(Debug, Clone, PartialEq)]
pub enum FunctionError {
    /// Inputs or outputs do not match the declared signature.
    Signature {
        function: String,
        direction: &'static str,
    },
    /// Inputs are invalid and cannot be recovered by this function.
    Unrecoverable { function: String },
    /// The body stopped because the notifier asked for cancellation.
    Cancelled,
    /// Body-level failure with an application-defined code.
    Failed { code: i32, message: String },
    Param(ParamError),
}

impl FunctionError {
    /// Numeric status of the run; `0` is reserved for success.
    pub fn code(&self) -> i32 {
        match self {
            Self::Signature { .. } => VALIDATION_ERROR_CODE,
            Self::Unrecoverable { .. } => 1,
            Self::Cancelled => 2,
            Self::Failed { code, .. } => *code,
            Self::Param(_) => 1,
        }
    }
}

impl Display for FunctionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Signature {
                function,
                direction,
            } => write!(f, "{direction} validation failed for tree function `{function}`"),
            Self::Unrecoverable { function } => {
                write!(f, "tree function `{function}` has unrecoverable invalid inputs")
            }
            Self::Cancelled => write!(f, "tree function execution cancelled"),
            Self::Failed { code, message } => write!(f, "tree function failed ({code}): {message}"),
            Self::Param(err) => write!(f, "{err}"),
        }
    }
}

impl Error for FunctionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Param(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ParamError> for FunctionError {
    fn from(value: ParamError) -> Self {
        Self::Param(value)
    }
}

impl From<crate::document::DocError> for FunctionError {
    fn from(value: crate::document::DocError) -> Self {
        Self::Param(ParamError::Doc(value))
    }
}

/// Driver of one tree function type.
pub trait TreeFunction {
    /// Identifier shared by every parameter driven by this function type.
    fn guid(&self) -> Uuid;

    fn name(&self) -> &str;

    /// Heavy functions only run with an explicit deployment record.
    fn is_heavy(&self) -> bool {
        false
    }

    /// Higher values run first among functions of the same level.
    fn priority(&self) -> i32 {
        PRIORITY_NORMAL
    }

    /// Expected argument kinds; empty disables the check.
    fn input_signature(&self) -> Vec<ParameterKind> {
        Vec::new()
    }

    /// Expected result kinds; empty disables the check.
    fn output_signature(&self) -> Vec<ParameterKind> {
        Vec::new()
    }

    /// Asks for execution although no argument is modified.
    fn must_execute_intact(&self, _doc: &Document, _inputs: &[Parameter]) -> bool {
        false
    }

    /// Suppresses pending/invalid propagation to the results.
    fn no_propagation(&self) -> bool {
        false
    }

    /// Lets the function wire its own arguments and results before the
    /// dependency graph is built.
    fn auto_connect(&self, _doc: &mut Document, _function: &TreeFunctionParameter) -> FunctionResult {
        Ok(())
    }

    fn execute(
        &self,
        scope: &mut FunctionScope<'_>,
        inputs: &[Parameter],
        outputs: &[Parameter],
    ) -> FunctionResult;
}

/// Drivers registered on one model, keyed by GUID.
#[derive(Default)]
pub struct FunctionRegistry {
    drivers: BTreeMap<Uuid, Box<dyn TreeFunction>>,
}

impl std::fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.drivers.values().map(|driver| driver.name()))
            .finish()
    }
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, driver: Box<dyn TreeFunction>) {
        self.drivers.insert(driver.guid(), driver);
    }

    pub fn get(&self, guid: &Uuid) -> Option<&dyn TreeFunction> {
        self.drivers.get(guid).map(Box::as_ref)
    }

    /// Driver bound to the GUID stored on `function`.
    pub fn driver_of(&self, doc: &Document, function: &TreeFunctionParameter) -> Option<&dyn TreeFunction> {
        function
            .driver_guid(doc)
            .and_then(|guid| self.get(&guid))
    }

    pub fn is_heavy(&self, doc: &Document, function: &TreeFunctionParameter) -> bool {
        self.driver_of(doc, function)
            .is_some_and(|driver| driver.is_heavy())
    }

    pub fn priority(&self, doc: &Document, function: &TreeFunctionParameter) -> i32 {
        self.driver_of(doc, function)
            .map_or(PRIORITY_NORMAL, |driver| driver.priority())
    }

    pub fn guids(&self) -> impl Iterator<Item = &Uuid> {
        self.drivers.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn TreeFunction> {
        self.drivers.values().map(Box::as_ref)
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }
}
