use super::ParameterKind;
use crate::label::{AttrValue, Entry};

/// Typed value carried by a parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Int(i32),
    Real(f64),
    Bool(bool),
    AsciiString(String),
    Name(String),
    /// Sorted, duplicate-free integer ids.
    Selection(Vec<i32>),
    TimeStamp(i64),
    IntArray(Vec<i32>),
    RealArray(Vec<f64>),
    StringArray(Vec<String>),
    /// Pairs of (real, imaginary) parts.
    ComplexArray(Vec<(f64, f64)>),
    BoolArray(Vec<bool>),
    Reference(Entry),
    ReferenceList(Vec<Entry>),
    /// Father label of a tree-node parameter.
    TreeNode(Entry),
    /// Opaque payload of geometry-backed and extension kinds.
    Blob(Vec<u8>),
}

impl ParamValue {
    /// Value written by `expand_on` for kinds that have a natural default.
    pub fn default_for(kind: ParameterKind) -> Option<Self> {
        match kind {
            ParameterKind::Int => Some(Self::Int(0)),
            ParameterKind::Real => Some(Self::Real(0.0)),
            ParameterKind::Bool => Some(Self::Bool(false)),
            ParameterKind::AsciiString => Some(Self::AsciiString(String::new())),
            ParameterKind::Name => Some(Self::Name(String::new())),
            ParameterKind::Selection => Some(Self::Selection(Vec::new())),
            ParameterKind::TimeStamp => Some(Self::TimeStamp(0)),
            ParameterKind::IntArray => Some(Self::IntArray(Vec::new())),
            ParameterKind::RealArray => Some(Self::RealArray(Vec::new())),
            ParameterKind::StringArray => Some(Self::StringArray(Vec::new())),
            ParameterKind::ComplexArray => Some(Self::ComplexArray(Vec::new())),
            ParameterKind::BoolArray => Some(Self::BoolArray(Vec::new())),
            ParameterKind::ReferenceList => Some(Self::ReferenceList(Vec::new())),
            _ => None,
        }
    }

    pub fn fits(&self, kind: ParameterKind) -> bool {
        matches!(
            (self, kind),
            (Self::Int(_), ParameterKind::Int)
                | (Self::Real(_), ParameterKind::Real)
                | (Self::Bool(_), ParameterKind::Bool)
                | (Self::AsciiString(_), ParameterKind::AsciiString)
                | (Self::Name(_), ParameterKind::Name)
                | (Self::Selection(_), ParameterKind::Selection)
                | (Self::TimeStamp(_), ParameterKind::TimeStamp)
                | (Self::IntArray(_), ParameterKind::IntArray)
                | (Self::RealArray(_), ParameterKind::RealArray)
                | (Self::StringArray(_), ParameterKind::StringArray)
                | (Self::ComplexArray(_), ParameterKind::ComplexArray)
                | (Self::BoolArray(_), ParameterKind::BoolArray)
                | (Self::Reference(_), ParameterKind::Reference)
                | (Self::ReferenceList(_), ParameterKind::ReferenceList)
                | (Self::TreeNode(_), ParameterKind::TreeNode)
                | (
                    Self::Blob(_),
                    ParameterKind::Shape
                        | ParameterKind::Mesh
                        | ParameterKind::Triangulation
                        | ParameterKind::Unknown(_)
                )
        )
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Real(_) => "real",
            Self::Bool(_) => "bool",
            Self::AsciiString(_) => "ascii_string",
            Self::Name(_) => "name",
            Self::Selection(_) => "selection",
            Self::TimeStamp(_) => "time_stamp",
            Self::IntArray(_) => "int_array",
            Self::RealArray(_) => "real_array",
            Self::StringArray(_) => "string_array",
            Self::ComplexArray(_) => "complex_array",
            Self::BoolArray(_) => "bool_array",
            Self::Reference(_) => "reference",
            Self::ReferenceList(_) => "reference_list",
            Self::TreeNode(_) => "tree_node",
            Self::Blob(_) => "blob",
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_real(&self) -> Option<f64> {
        match self {
            Self::Real(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub(crate) fn to_attr(&self) -> AttrValue {
        match self {
            Self::Int(value) => AttrValue::Integer(*value),
            Self::Real(value) => AttrValue::Real(*value),
            Self::Bool(value) => AttrValue::Integer(i32::from(*value)),
            Self::AsciiString(value) => AttrValue::AsciiString(value.clone()),
            Self::Name(value) => AttrValue::Name(value.clone()),
            Self::Selection(ids) => {
                let mut ids = ids.clone();
                ids.sort_unstable();
                ids.dedup();
                AttrValue::IntArray(ids)
            }
            Self::TimeStamp(value) => AttrValue::TimeStamp(*value),
            Self::IntArray(values) => AttrValue::IntArray(values.clone()),
            Self::RealArray(values) => AttrValue::RealArray(values.clone()),
            Self::StringArray(values) => AttrValue::StringArray(values.clone()),
            Self::ComplexArray(values) => AttrValue::RealArray(
                values.iter().flat_map(|(re, im)| [*re, *im]).collect(),
            ),
            Self::BoolArray(values) => AttrValue::BoolArray(values.clone()),
            Self::Reference(target) | Self::TreeNode(target) => AttrValue::Reference(target.clone()),
            Self::ReferenceList(targets) => AttrValue::ReferenceList(targets.clone()),
            Self::Blob(bytes) => AttrValue::Bytes(bytes.clone()),
        }
    }

    pub(crate) fn from_attr(kind: ParameterKind, attr: &AttrValue) -> Option<Self> {
        let value = match (kind, attr) {
            (ParameterKind::Int, AttrValue::Integer(value)) => Self::Int(*value),
            (ParameterKind::Real, AttrValue::Real(value)) => Self::Real(*value),
            (ParameterKind::Bool, AttrValue::Integer(value)) => Self::Bool(*value != 0),
            (ParameterKind::AsciiString, AttrValue::AsciiString(value)) => {
                Self::AsciiString(value.clone())
            }
            (ParameterKind::Name, AttrValue::Name(value)) => Self::Name(value.clone()),
            (ParameterKind::Selection, AttrValue::IntArray(ids)) => Self::Selection(ids.clone()),
            (ParameterKind::TimeStamp, AttrValue::TimeStamp(value)) => Self::TimeStamp(*value),
            (ParameterKind::IntArray, AttrValue::IntArray(values)) => Self::IntArray(values.clone()),
            (ParameterKind::RealArray, AttrValue::RealArray(values)) => {
                Self::RealArray(values.clone())
            }
            (ParameterKind::StringArray, AttrValue::StringArray(values)) => {
                Self::StringArray(values.clone())
            }
            (ParameterKind::ComplexArray, AttrValue::RealArray(values)) => Self::ComplexArray(
                values
                    .chunks_exact(2)
                    .map(|pair| (pair[0], pair[1]))
                    .collect(),
            ),
            (ParameterKind::BoolArray, AttrValue::BoolArray(values)) => {
                Self::BoolArray(values.clone())
            }
            (ParameterKind::Reference, AttrValue::Reference(target)) => {
                Self::Reference(target.clone())
            }
            (ParameterKind::TreeNode, AttrValue::Reference(target)) => {
                Self::TreeNode(target.clone())
            }
            (ParameterKind::ReferenceList, AttrValue::ReferenceList(targets)) => {
                Self::ReferenceList(targets.clone())
            }
            (
                ParameterKind::Shape
                | ParameterKind::Mesh
                | ParameterKind::Triangulation
                | ParameterKind::Unknown(_),
                AttrValue::Bytes(bytes),
            ) => Self::Blob(bytes.clone()),
            _ => return None,
        };
        Some(value)
    }
}
