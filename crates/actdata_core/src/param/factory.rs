//! Resolution of persisted type tags into parameter cursors.
//!
//! # Responsibility
//! - Dispatch a type id to the matching parameter kind.
//! - Settle cursors on labels that carry a parameter type tag.
//! - Resolve the owning parameter of an arbitrary nested label.
//!
//! # Invariants
//! - Unknown type ids never fail: they produce `ParameterKind::Unknown`.
//! - Missing type tags produce `None`, never an error.

use super::{datum, DetachedParameter, Parameter, ParameterKind};
use crate::document::Document;
use crate::label::{AttrKind, AttrValue, Entry};

/// Creates a detached cursor for `type_id`.
///
/// The second element is `true` when the id is not a built-in kind.
pub fn new_parameter_detached(type_id: i32) -> (DetachedParameter, bool) {
    let kind = ParameterKind::from_type_id(type_id);
    (DetachedParameter::new(kind), kind.is_undefined())
}

/// Settles a cursor on `label` according to its stored type tag.
///
/// Returns `None` when the label carries no type tag.
pub fn new_parameter_settle(doc: &Document, label: &Entry) -> Option<(Parameter, bool)> {
    let type_id = stored_type_id(doc, label)?;
    let (detached, is_undefined) = new_parameter_detached(type_id);
    Some((detached.settle_on(label.clone()), is_undefined))
}

/// True iff `label` has both a type-tag datum and a validity datum.
pub fn is_user_parameter(doc: &Document, label: &Entry) -> bool {
    stored_type_id(doc, label).is_some()
        && doc
            .attr(&label.child(datum::IS_VALID), AttrKind::Integer)
            .is_some()
}

/// Settles a cursor on `label` if it passes [`is_user_parameter`].
pub fn user_parameter(doc: &Document, label: &Entry) -> Option<(Parameter, bool)> {
    if !is_user_parameter(doc, label) {
        return None;
    }
    new_parameter_settle(doc, label)
}

/// Walks up from `label` to the nearest user-parameter label.
///
/// Returns `None` when the walk reaches the document root.
pub fn param_by_child_label_settle(doc: &Document, label: &Entry) -> Option<(Parameter, bool)> {
    let mut current = Some(label.clone());
    let mut steps = 0usize;
    let max_steps = label.depth();
    while let Some(candidate) = current {
        if candidate.is_root() || steps > max_steps {
            return None;
        }
        if let Some(found) = user_parameter(doc, &candidate) {
            return Some(found);
        }
        current = candidate.father();
        steps += 1;
    }
    None
}

/// Settles cursors on all labels that are parameters, skipping the rest.
pub fn params_by_labels_settle(doc: &Document, labels: &[Entry]) -> Vec<Parameter> {
    labels
        .iter()
        .filter_map(|label| new_parameter_settle(doc, label).map(|(param, _)| param))
        .collect()
}

fn stored_type_id(doc: &Document, label: &Entry) -> Option<i32> {
    doc.attr(&label.child(datum::PARAM_TYPE), AttrKind::Integer)
        .and_then(AttrValue::as_integer)
}
