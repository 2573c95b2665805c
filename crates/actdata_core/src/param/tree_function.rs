//! Tree-function parameter: driver GUID plus argument and result references.
//!
//! # Invariants
//! - Connected state needs the driver attribute, the graph-node marker and the
//!   arguments reference list. Results may be empty for leaf functions.
//! - Disconnecting removes both lists; a complete kill also removes the
//!   driver attribute and the graph-node marker.

use super::factory::params_by_labels_settle;
use super::{datum, DataCursor, ParamResult, Parameter};
use crate::document::Document;
use crate::label::{AttrKind, AttrValue, Entry};
use uuid::Uuid;

pub const ARGUMENTS_TAG: u32 = datum::KIND_FIRST;
pub const RESULTS_TAG: u32 = datum::KIND_FIRST + 1;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TreeFunctionParameter {
    param: Parameter,
}

impl DataCursor for TreeFunctionParameter {
    fn root_label(&self) -> &Entry {
        self.param.root_label()
    }

    fn is_well_formed(&self, doc: &Document) -> bool {
        self.param.is_well_formed(doc)
    }
}

impl TreeFunctionParameter {
    pub(crate) fn new(param: Parameter) -> Self {
        Self { param }
    }

    pub fn as_parameter(&self) -> &Parameter {
        &self.param
    }

    pub fn set_driver_guid(&self, doc: &mut Document, guid: Uuid) -> ParamResult<()> {
        let label = self.root_label().clone();
        doc.atomic(|doc| -> ParamResult<()> {
            doc.set_attr(&label, AttrValue::Driver(guid))?;
            doc.set_attr(&label, AttrValue::GraphNode)?;
            Ok(())
        })
    }

    pub fn driver_guid(&self, doc: &Document) -> Option<Uuid> {
        doc.attr(self.root_label(), AttrKind::Driver)
            .and_then(AttrValue::as_driver)
    }

    pub fn add_argument(&self, doc: &mut Document, param: &Parameter) -> ParamResult<()> {
        self.append_reference(doc, ARGUMENTS_TAG, param.root_label())
    }

    pub fn add_result(&self, doc: &mut Document, param: &Parameter) -> ParamResult<()> {
        self.append_reference(doc, RESULTS_TAG, param.root_label())
    }

    pub fn has_argument(&self, doc: &Document, label: &Entry) -> bool {
        self.argument_labels(doc).contains(label)
    }

    pub fn has_result(&self, doc: &Document, label: &Entry) -> bool {
        self.result_labels(doc).contains(label)
    }

    pub fn argument_labels(&self, doc: &Document) -> Vec<Entry> {
        self.references(doc, ARGUMENTS_TAG)
    }

    pub fn result_labels(&self, doc: &Document) -> Vec<Entry> {
        self.references(doc, RESULTS_TAG)
    }

    pub fn arguments(&self, doc: &Document) -> Vec<Parameter> {
        params_by_labels_settle(doc, &self.argument_labels(doc))
    }

    pub fn results(&self, doc: &Document) -> Vec<Parameter> {
        params_by_labels_settle(doc, &self.result_labels(doc))
    }

    /// Replaces one reference list wholesale.
    pub(crate) fn write_references(&self, doc: &mut Document, tag: u32, targets: Vec<Entry>) -> ParamResult<()> {
        let label = doc.ensure_child(self.root_label(), tag)?;
        doc.set_attr(&label, AttrValue::ReferenceList(targets))?;
        Ok(())
    }

    /// Removes the argument and result lists, and with `kill` the driver too.
    pub fn disconnect(&self, doc: &mut Document, kill: bool) -> ParamResult<()> {
        let root = self.root_label().clone();
        doc.atomic(|doc| -> ParamResult<()> {
            if kill {
                doc.remove_attr(&root, AttrKind::Driver)?;
                doc.remove_attr(&root, AttrKind::GraphNode)?;
            }
            for tag in [ARGUMENTS_TAG, RESULTS_TAG] {
                let label = root.child(tag);
                if doc.contains(&label) {
                    doc.forget_subtree(&label)?;
                }
            }
            Ok(())
        })
    }

    pub fn is_connected(&self, doc: &Document) -> bool {
        let root = self.root_label();
        doc.attr(root, AttrKind::Driver).is_some()
            && doc.attr(root, AttrKind::GraphNode).is_some()
            && doc
                .attr(&root.child(ARGUMENTS_TAG), AttrKind::ReferenceList)
                .is_some()
    }

    pub fn has_pending_arguments(&self, doc: &Document) -> bool {
        has_pending(doc, &self.arguments(doc))
    }

    pub fn has_pending_results(&self, doc: &Document) -> bool {
        has_pending(doc, &self.results(doc))
    }

    fn references(&self, doc: &Document, tag: u32) -> Vec<Entry> {
        doc.attr(&self.root_label().child(tag), AttrKind::ReferenceList)
            .and_then(AttrValue::as_reference_list)
            .map(<[Entry]>::to_vec)
            .unwrap_or_default()
    }

    fn append_reference(&self, doc: &mut Document, tag: u32, target: &Entry) -> ParamResult<()> {
        let mut targets = self.references(doc, tag);
        targets.push(target.clone());
        doc.atomic(|doc| self.write_references(doc, tag, targets))
    }
}

fn has_pending(doc: &Document, params: &[Parameter]) -> bool {
    params
        .iter()
        .any(|param| param.is_well_formed(doc) && param.is_pending_data(doc))
}

#[cfg(test)]
mod tests {
    use crate::document::Document;
    use crate::label::Entry;
    use crate::param::{DetachedParameter, ModificationType, ParameterKind};
    use crate::tx::TxMode;
    use uuid::Uuid;

    #[test]
    fn connect_and_disconnect_cycle() {
        let mut doc = Document::new(TxMode::Simple, 10);
        let input = DetachedParameter::new(ParameterKind::Real)
            .expand_on(&mut doc, Entry::from_root(&[2, 1, 1, 2, 1]))
            .expect("input");
        let output = DetachedParameter::new(ParameterKind::Real)
            .expand_on(&mut doc, Entry::from_root(&[2, 1, 1, 2, 2]))
            .expect("output");
        let func = DetachedParameter::new(ParameterKind::TreeFunction)
            .expand_on(&mut doc, Entry::from_root(&[2, 1, 1, 2, 3]))
            .expect("function")
            .as_tree_function()
            .expect("tree function kind");

        assert!(!func.is_connected(&doc));
        func.set_driver_guid(&mut doc, Uuid::new_v4()).expect("guid");
        func.add_argument(&mut doc, &input).expect("argument");
        func.add_result(&mut doc, &output).expect("result");
        assert!(func.is_connected(&doc));
        assert!(func.has_argument(&doc, &Entry::from_root(&[2, 1, 1, 2, 1])));
        assert_eq!(func.results(&doc), vec![output.clone()]);

        output
            .set_pending(&mut doc, true, ModificationType::Silent)
            .expect("pending");
        assert!(func.has_pending_results(&doc));
        assert!(!func.has_pending_arguments(&doc));

        func.disconnect(&mut doc, false).expect("soft disconnect");
        assert!(!func.is_connected(&doc));
        assert!(func.driver_guid(&doc).is_some());
        func.disconnect(&mut doc, true).expect("kill");
        assert!(func.driver_guid(&doc).is_none());
    }
}
