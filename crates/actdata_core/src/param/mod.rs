//! Parameter cursors over document labels.
//!
//! # Responsibility
//! - Model every persisted parameter kind as one closed variant with an
//!   explicit escape hatch for extension kinds.
//! - Provide typed value access plus validity/pending/naming datums.
//! - Report modifications to the LogBook according to the modification type.
//!
//! # Invariants
//! - A label is a user parameter iff both its type-tag datum and its validity
//!   datum exist.
//! - A value write is rejected when the value does not fit the parameter kind.
//! - Every setter runs as one implicit command in simple transaction mode.
//!
//! # See also
//! - `factory` for label-to-cursor resolution.
//! - `tree_function` for the tree-function specialization.

pub mod factory;
pub mod tree_function;
mod value;

pub use value::ParamValue;

use crate::document::{DocError, Document};
use crate::label::{AttrKind, AttrValue, Entry};
use crate::logbook::LogBook;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};
use tree_function::TreeFunctionParameter;

/// Child tags of the datums every user parameter carries.
pub mod datum {
    pub const PARAM_TYPE: u32 = 1;
    pub const NAME: u32 = 2;
    pub const SEMANTIC_ID: u32 = 3;
    pub const EVAL_STRING: u32 = 4;
    pub const MTIME: u32 = 5;
    pub const IS_VALID: u32 = 6;
    pub const USER_FLAGS: u32 = 7;
    pub const IS_PENDING: u32 = 8;
    /// First tag available to kind-specific datums.
    pub const KIND_FIRST: u32 = 101;
    pub const VALUE: u32 = KIND_FIRST;
}

pub type ParamResult<T> = Result<T, ParamError>;

#[derive(Debug, Clone, PartialEq)]
pub enum ParamError {
    Doc(DocError),
    /// Value does not fit the parameter kind.
    KindMismatch {
        expected: ParameterKind,
        actual: &'static str,
    },
    /// The cursor points to a label that does not exist.
    NotAttached(Entry),
}

impl Display for ParamError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Doc(err) => write!(f, "{err}"),
            Self::KindMismatch { expected, actual } => write!(
                f,
                "value of kind `{actual}` does not fit parameter kind `{}`",
                expected.name()
            ),
            Self::NotAttached(entry) => write!(f, "parameter is not attached: {entry}"),
        }
    }
}

impl Error for ParamError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Doc(err) => Some(err),
            Self::KindMismatch { .. } => None,
            Self::NotAttached(_) => None,
        }
    }
}

impl From<DocError> for ParamError {
    fn from(value: DocError) -> Self {
        Self::Doc(value)
    }
}

/// Persisted parameter kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterKind {
    Int,
    Real,
    Bool,
    Shape,
    Mesh,
    AsciiString,
    Name,
    Selection,
    TimeStamp,
    IntArray,
    RealArray,
    StringArray,
    ComplexArray,
    BoolArray,
    Group,
    TreeFunction,
    TreeNode,
    Reference,
    ReferenceList,
    Triangulation,
    /// Type id not known to this crate, typically an application extension.
    Unknown(i32),
}

impl ParameterKind {
    pub fn from_type_id(type_id: i32) -> Self {
        match type_id {
            2 => Self::Int,
            3 => Self::Real,
            4 => Self::Bool,
            5 => Self::Shape,
            6 => Self::Mesh,
            7 => Self::AsciiString,
            8 => Self::Name,
            9 => Self::Selection,
            10 => Self::TimeStamp,
            11 => Self::IntArray,
            12 => Self::RealArray,
            13 => Self::StringArray,
            14 => Self::ComplexArray,
            15 => Self::BoolArray,
            16 => Self::Group,
            17 => Self::TreeFunction,
            18 => Self::TreeNode,
            20 => Self::Reference,
            21 => Self::ReferenceList,
            22 => Self::Triangulation,
            other => Self::Unknown(other),
        }
    }

    pub fn type_id(self) -> i32 {
        match self {
            Self::Int => 2,
            Self::Real => 3,
            Self::Bool => 4,
            Self::Shape => 5,
            Self::Mesh => 6,
            Self::AsciiString => 7,
            Self::Name => 8,
            Self::Selection => 9,
            Self::TimeStamp => 10,
            Self::IntArray => 11,
            Self::RealArray => 12,
            Self::StringArray => 13,
            Self::ComplexArray => 14,
            Self::BoolArray => 15,
            Self::Group => 16,
            Self::TreeFunction => 17,
            Self::TreeNode => 18,
            Self::Reference => 20,
            Self::ReferenceList => 21,
            Self::Triangulation => 22,
            Self::Unknown(raw) => raw,
        }
    }

    pub fn is_undefined(self) -> bool {
        matches!(self, Self::Unknown(_))
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Real => "real",
            Self::Bool => "bool",
            Self::Shape => "shape",
            Self::Mesh => "mesh",
            Self::AsciiString => "ascii_string",
            Self::Name => "name",
            Self::Selection => "selection",
            Self::TimeStamp => "time_stamp",
            Self::IntArray => "int_array",
            Self::RealArray => "real_array",
            Self::StringArray => "string_array",
            Self::ComplexArray => "complex_array",
            Self::BoolArray => "bool_array",
            Self::Group => "group",
            Self::TreeFunction => "tree_function",
            Self::TreeNode => "tree_node",
            Self::Reference => "reference",
            Self::ReferenceList => "reference_list",
            Self::Triangulation => "triangulation",
            Self::Unknown(_) => "unknown",
        }
    }
}

/// How a modification is reported to the LogBook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModificationType {
    /// Direct edit by the user or a middle layer.
    Touched,
    /// Edit performed by a tree function.
    Impacted,
    /// Edit without LogBook synchronization.
    Silent,
}

/// Common capability of cursors settled on a label.
pub trait DataCursor {
    fn root_label(&self) -> &Entry;
    fn is_well_formed(&self, doc: &Document) -> bool;
}

/// Parameter not yet bound to any label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetachedParameter {
    kind: ParameterKind,
}

impl DetachedParameter {
    pub fn new(kind: ParameterKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> ParameterKind {
        self.kind
    }

    /// Binds the cursor to `label` without touching persistent data.
    pub fn settle_on(self, label: Entry) -> Parameter {
        Parameter {
            label,
            kind: self.kind,
        }
    }

    /// Creates the persistent datums of the parameter under `label`.
    pub fn expand_on(self, doc: &mut Document, label: Entry) -> ParamResult<Parameter> {
        let param = self.settle_on(label);
        doc.atomic(|doc| -> ParamResult<()> {
            doc.ensure_label(&param.label)?;
            param.write_datum(doc, datum::PARAM_TYPE, AttrValue::Integer(param.kind.type_id()))?;
            param.write_datum(doc, datum::IS_VALID, AttrValue::Integer(1))?;
            param.write_datum(doc, datum::IS_PENDING, AttrValue::Integer(0))?;
            param.write_datum(doc, datum::MTIME, AttrValue::TimeStamp(now_millis()))?;
            if let Some(default) = ParamValue::default_for(param.kind) {
                param.write_datum(doc, datum::VALUE, default.to_attr())?;
            }
            Ok(())
        })?;
        Ok(param)
    }
}

/// Cursor over a user parameter label.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Parameter {
    label: Entry,
    kind: ParameterKind,
}

impl DataCursor for Parameter {
    fn root_label(&self) -> &Entry {
        &self.label
    }

    fn is_well_formed(&self, doc: &Document) -> bool {
        if !doc.contains(&self.label) {
            return false;
        }
        let stored_type = self
            .datum(doc, datum::PARAM_TYPE, AttrKind::Integer)
            .and_then(AttrValue::as_integer);
        if stored_type != Some(self.kind.type_id()) {
            return false;
        }
        self.datum(doc, datum::IS_VALID, AttrKind::Integer).is_some()
    }
}

impl Parameter {
    pub fn kind(&self) -> ParameterKind {
        self.kind
    }

    pub fn parameter_type(&self) -> i32 {
        self.kind.type_id()
    }

    pub fn is_undefined_type(&self) -> bool {
        self.kind.is_undefined()
    }

    pub fn is_attached(&self, doc: &Document) -> bool {
        doc.contains(&self.label)
    }

    /// Root label of the owning node (the parameter label's grandfather).
    pub fn owning_node(&self) -> Option<Entry> {
        self.label.father().and_then(|father| father.father())
    }

    /// Safe downcast to the tree-function specialization.
    pub fn as_tree_function(&self) -> Option<TreeFunctionParameter> {
        (self.kind == ParameterKind::TreeFunction).then(|| TreeFunctionParameter::new(self.clone()))
    }

    /// Validity flag; a missing datum reads as valid.
    pub fn is_valid_data(&self, doc: &Document) -> bool {
        self.flag(doc, datum::IS_VALID).unwrap_or(true)
    }

    /// Pending flag; a missing datum reads as not pending.
    pub fn is_pending_data(&self, doc: &Document) -> bool {
        self.flag(doc, datum::IS_PENDING).unwrap_or(false)
    }

    pub fn set_validity(&self, doc: &mut Document, is_valid: bool, mod_type: ModificationType) -> ParamResult<()> {
        self.update(doc, mod_type, |param, doc| {
            param.write_datum(doc, datum::IS_VALID, AttrValue::Integer(i32::from(is_valid)))
        })
    }

    pub fn set_pending(&self, doc: &mut Document, is_pending: bool, mod_type: ModificationType) -> ParamResult<()> {
        self.update(doc, mod_type, |param, doc| {
            param.write_datum(doc, datum::IS_PENDING, AttrValue::Integer(i32::from(is_pending)))
        })
    }

    pub fn name(&self, doc: &Document) -> Option<String> {
        self.text_datum(doc, datum::NAME, AttrKind::Name)
    }

    pub fn set_name(&self, doc: &mut Document, name: &str, mod_type: ModificationType) -> ParamResult<()> {
        self.update(doc, mod_type, |param, doc| {
            param.write_datum(doc, datum::NAME, AttrValue::Name(name.to_string()))
        })
    }

    pub fn semantic_id(&self, doc: &Document) -> Option<String> {
        self.text_datum(doc, datum::SEMANTIC_ID, AttrKind::AsciiString)
    }

    pub fn set_semantic_id(&self, doc: &mut Document, id: &str, mod_type: ModificationType) -> ParamResult<()> {
        self.update(doc, mod_type, |param, doc| {
            param.write_datum(doc, datum::SEMANTIC_ID, AttrValue::AsciiString(id.to_string()))
        })
    }

    pub fn eval_string(&self, doc: &Document) -> Option<String> {
        self.text_datum(doc, datum::EVAL_STRING, AttrKind::AsciiString)
    }

    pub fn set_eval_string(&self, doc: &mut Document, expr: &str, mod_type: ModificationType) -> ParamResult<()> {
        self.update(doc, mod_type, |param, doc| {
            param.write_datum(doc, datum::EVAL_STRING, AttrValue::AsciiString(expr.to_string()))
        })
    }

    pub fn user_flags(&self, doc: &Document) -> i32 {
        self.datum(doc, datum::USER_FLAGS, AttrKind::Integer)
            .and_then(AttrValue::as_integer)
            .unwrap_or(0)
    }

    pub fn set_user_flags(&self, doc: &mut Document, flags: i32, mod_type: ModificationType) -> ParamResult<()> {
        self.update(doc, mod_type, |param, doc| {
            param.write_datum(doc, datum::USER_FLAGS, AttrValue::Integer(flags))
        })
    }

    /// Last modification time in milliseconds since the Unix epoch.
    pub fn mtime(&self, doc: &Document) -> Option<i64> {
        match self.datum(doc, datum::MTIME, AttrKind::TimeStamp) {
            Some(AttrValue::TimeStamp(value)) => Some(*value),
            _ => None,
        }
    }

    /// Stored value, if the kind carries one and it has been written.
    pub fn value(&self, doc: &Document) -> Option<ParamValue> {
        let label = self.label.child(datum::VALUE);
        let data = doc.store().label(&label)?;
        data.iter()
            .find_map(|attr| ParamValue::from_attr(self.kind, attr))
    }

    /// Writes the value and resets validity and pending state silently.
    pub fn set_value(&self, doc: &mut Document, value: ParamValue, mod_type: ModificationType) -> ParamResult<()> {
        if !value.fits(self.kind) {
            return Err(ParamError::KindMismatch {
                expected: self.kind,
                actual: value.kind_name(),
            });
        }
        self.update(doc, mod_type, |param, doc| {
            param.write_datum(doc, datum::VALUE, value.to_attr())?;
            param.write_datum(doc, datum::IS_VALID, AttrValue::Integer(1))?;
            param.write_datum(doc, datum::IS_PENDING, AttrValue::Integer(0))
        })
    }

    /// Clears the value datum, as for an unset reference.
    pub fn reset_value(&self, doc: &mut Document, mod_type: ModificationType) -> ParamResult<()> {
        self.update(doc, mod_type, |param, doc| {
            let label = param.label.child(datum::VALUE);
            if doc.contains(&label) {
                doc.forget_all_attributes(&label)?;
            }
            Ok(())
        })
    }

    /// Puts the parameter into the Touched section.
    pub fn set_touched(&self, doc: &mut Document) -> ParamResult<()> {
        LogBook::new().touch(doc, &self.label)?;
        Ok(())
    }

    /// Puts the parameter into the Impacted section.
    pub fn set_impacted(&self, doc: &mut Document) -> ParamResult<()> {
        LogBook::new().impact(doc, &self.label)?;
        Ok(())
    }

    /// Refreshes MTime and marks the parameter Touched.
    pub fn set_modified(&self, doc: &mut Document) -> ParamResult<()> {
        self.update(doc, ModificationType::Touched, |_, _| Ok(()))
    }

    fn update(
        &self,
        doc: &mut Document,
        mod_type: ModificationType,
        write: impl FnOnce(&Self, &mut Document) -> ParamResult<()>,
    ) -> ParamResult<()> {
        if !doc.contains(&self.label) {
            return Err(ParamError::NotAttached(self.label.clone()));
        }
        doc.atomic(|doc| {
            write(self, doc)?;
            match mod_type {
                ModificationType::Silent => Ok(()),
                ModificationType::Touched => {
                    self.write_datum(doc, datum::MTIME, AttrValue::TimeStamp(now_millis()))?;
                    self.set_touched(doc)
                }
                ModificationType::Impacted => {
                    self.write_datum(doc, datum::MTIME, AttrValue::TimeStamp(now_millis()))?;
                    self.set_impacted(doc)
                }
            }
        })
    }

    fn flag(&self, doc: &Document, tag: u32) -> Option<bool> {
        self.datum(doc, tag, AttrKind::Integer)
            .and_then(AttrValue::as_integer)
            .map(|value| value != 0)
    }

    fn text_datum(&self, doc: &Document, tag: u32, kind: AttrKind) -> Option<String> {
        self.datum(doc, tag, kind)
            .and_then(AttrValue::as_text)
            .map(str::to_string)
    }

    fn datum<'d>(&self, doc: &'d Document, tag: u32, kind: AttrKind) -> Option<&'d AttrValue> {
        doc.attr(&self.label.child(tag), kind)
    }

    fn write_datum(&self, doc: &mut Document, tag: u32, value: AttrValue) -> ParamResult<()> {
        let label = doc.ensure_child(&self.label, tag)?;
        doc.set_attr(&label, value)?;
        Ok(())
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
