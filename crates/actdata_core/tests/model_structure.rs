use actdata_core::model::SuffixOption;
use actdata_core::{
    BaseModel, DataCursor, FunctionResult, FunctionScope, LogBook, ModelConfig, ModelError, ModelSchema,
    ModificationType, Node, NodeType, ParamValue, Parameter, ParameterKind, TreeFunction, TreeFunctionParameter,
    TxData, TxError,
};
use uuid::Uuid;

const PART: u32 = 7;
const VALUE: u32 = 1;
const FORMULA: u32 = 2;
const COPY_GUID: Uuid = Uuid::from_u128(0xc0b7);

struct Identity;

impl TreeFunction for Identity {
    fn guid(&self) -> Uuid {
        COPY_GUID
    }

    fn name(&self) -> &str {
        "identity"
    }

    fn execute(&self, scope: &mut FunctionScope<'_>, inputs: &[Parameter], outputs: &[Parameter]) -> FunctionResult {
        let value = inputs[0].value(scope.doc()).unwrap_or(ParamValue::Real(0.0));
        outputs[0].set_value(scope.doc_mut(), value, ModificationType::Impacted)?;
        Ok(())
    }
}

struct Assembly;

impl ModelSchema for Assembly {
    fn node_types(&self) -> Vec<(u32, NodeType)> {
        vec![(
            PART,
            NodeType::new("Part")
                .with_param(VALUE, ParameterKind::Real, "Value")
                .with_param(FORMULA, ParameterKind::TreeFunction, "Formula"),
        )]
    }

    fn drivers(&self) -> Vec<Box<dyn TreeFunction>> {
        vec![Box::new(Identity)]
    }

    fn actual_version_app(&self) -> i32 {
        1
    }
}

fn model() -> BaseModel<Assembly> {
    let mut model = BaseModel::new(Assembly, ModelConfig::default());
    model.new_empty().expect("new document");
    model
}

fn value(model: &BaseModel<Assembly>, node: &Node) -> Parameter {
    node.parameter(model.document(), VALUE).expect("value parameter")
}

fn formula(model: &BaseModel<Assembly>, node: &Node) -> TreeFunctionParameter {
    node.parameter(model.document(), FORMULA)
        .and_then(|param| param.as_tree_function())
        .expect("formula parameter")
}

fn connect(model: &mut BaseModel<Assembly>, input_node: &Node, output_node: &Node) {
    let input = value(model, input_node);
    let output = value(model, output_node);
    let function = formula(model, output_node);
    let doc = model.document_mut();
    function.set_driver_guid(doc, COPY_GUID).expect("set driver");
    function.add_argument(doc, &input).expect("add argument");
    function.add_result(doc, &output).expect("add result");
}

fn name(model: &BaseModel<Assembly>, node: &Node) -> String {
    node.name(model.document()).expect("node name")
}

#[test]
fn aborted_command_leaves_no_trace() {
    let mut model = model();
    model.open_command().expect("open command");
    let node = model.add_node(PART, "scratch").expect("add scratch");
    assert!(model.document().contains(node.root_label()));
    model.abort_command();

    assert!(!model.document().contains(node.root_label()));
    assert_eq!(model.nb_undos(), 0);
    assert!(!model.is_modified());
}

#[test]
fn undo_and_redo_replay_whole_commands() {
    let mut model = model();
    model.open_command().expect("open command");
    let node = model.add_node(PART, "wheel").expect("add wheel");
    model.commit_command(TxData::named("add wheel")).expect("commit add wheel");
    assert_eq!(model.get_modified_nodes(), vec![node.clone()]);

    model.undo(1).expect("undo");
    assert!(model.find_node_by_name("wheel").is_none());
    assert_eq!(model.nb_redos(), 1);

    model.redo(1).expect("redo");
    assert_eq!(model.find_node_by_name("wheel"), Some(node));
    assert_eq!(model.nb_undos(), 1);
}

#[test]
fn undo_history_is_bounded_by_the_limit() {
    let mut model = BaseModel::new(
        Assembly,
        ModelConfig {
            undo_limit: 2,
            ..ModelConfig::default()
        },
    );
    model.new_empty().expect("new document");
    for label in ["a", "b", "c"] {
        model.open_command().expect("open command");
        model.add_node(PART, label).expect("add node");
        model.commit_command(TxData::named(label)).expect("commit");
    }
    assert_eq!(model.nb_undos(), 2);
}

#[test]
fn undo_with_an_open_command_is_refused() {
    let mut model = model();
    model.open_command().expect("open command");
    model.add_node(PART, "pending").expect("add pending");
    assert!(matches!(
        model.undo(1),
        Err(ModelError::Doc(_)) | Err(ModelError::Tx(TxError::CommandStillOpen))
    ));
    model.commit_command(TxData::named("pending")).expect("commit pending");
}

#[test]
fn new_commit_discards_the_redo_history() {
    let mut model = model();
    model.open_command().expect("open a");
    model.add_node(PART, "a").expect("add a");
    model.commit_command(TxData::named("a")).expect("commit a");
    model.undo(1).expect("undo a");
    assert_eq!(model.nb_redos(), 1);

    model.open_command().expect("open b");
    model.add_node(PART, "b").expect("add b");
    model.commit_command(TxData::named("b")).expect("commit b");

    assert_eq!(model.nb_redos(), 0);
    let _ = model.redo(1);
    assert!(model.find_node_by_name("a").is_none());
    assert!(model.find_node_by_name("b").is_some());
}

#[test]
fn replay_keeps_records_of_earlier_undos() {
    let mut model = model();
    model.open_command().expect("open build");
    let first = model.add_node(PART, "first").expect("add first");
    let second = model.add_node(PART, "second").expect("add second");
    model.commit_command(TxData::named("build")).expect("commit build");
    let first_value = value(&model, &first);
    let second_value = value(&model, &second);
    let logbook = LogBook::new();

    model.open_command().expect("open release");
    logbook
        .release_modified(model.document_mut())
        .expect("release");
    model.commit_command(TxData::named("release")).expect("commit release");

    model.open_command().expect("open edit");
    first_value
        .set_value(model.document_mut(), ParamValue::Real(1.0), ModificationType::Touched)
        .expect("set first");
    model.commit_command(TxData::named("edit")).expect("commit edit");

    model.undo(2).expect("undo edit and release");
    assert!(logbook.is_touched(model.document(), first_value.root_label()));

    model.redo(1).expect("redo release");
    assert!(logbook.is_touched(model.document(), first_value.root_label()));
    assert!(!logbook.is_touched(model.document(), second_value.root_label()));
}

#[test]
fn deleting_a_node_removes_its_children_and_dangling_references() {
    let mut model = model();
    model.open_command().expect("open command");
    let engine = model.add_node(PART, "engine").expect("add engine");
    let piston = model.add_node(PART, "piston").expect("add piston");
    let gauge = model.add_node(PART, "gauge").expect("add gauge");
    model.add_child_node(&engine, &piston).expect("add child node");
    connect(&mut model, &piston, &gauge);
    let piston_value = value(&model, &piston);
    piston_value
        .set_value(model.document_mut(), ParamValue::Real(3.0), ModificationType::Touched)
        .expect("set value");
    model.commit_command(TxData::named("build")).expect("commit build");

    model.open_command().expect("open command");
    model.delete_node(&engine).expect("delete node");
    model.commit_command(TxData::named("delete")).expect("commit delete");

    assert!(model.find_node_by_name("engine").is_none());
    assert!(model.find_node_by_name("piston").is_none());
    let gauge_formula = formula(&model, &gauge);
    assert!(gauge_formula.argument_labels(model.document()).is_empty());
    assert!(!LogBook::new().is_touched(model.document(), piston_value.root_label()));

    model.undo(1).expect("undo");
    assert!(model.find_node_by_names(&["engine", "piston"]).is_some());
    assert_eq!(
        formula(&model, &gauge).argument_labels(model.document()),
        vec![piston_value.root_label().clone()]
    );
}

#[test]
fn pasted_hierarchy_keeps_internal_links() {
    let mut model = model();
    model.open_command().expect("open command");
    let frame = model.add_node(PART, "frame").expect("add frame");
    let strut = model.add_node(PART, "strut").expect("add strut");
    let target = model.add_node(PART, "target").expect("add target");
    model.add_child_node(&frame, &strut).expect("add child node");
    connect(&mut model, &frame, &strut);

    model.copy_node(&frame).expect("copy node");
    let pasted = model.paste_as_child(&target).expect("paste").expect("pasted node");
    model.commit_command(TxData::named("paste")).expect("commit paste");

    assert_eq!(name(&model, &pasted), "frame [copy]");
    assert_eq!(pasted.parent(model.document()), Some(target.clone()));
    let children = pasted.children(model.document());
    assert_eq!(children.len(), 1);
    let pasted_strut = &children[0];
    assert_eq!(name(&model, pasted_strut), "strut [copy]");

    let pasted_formula = formula(&model, pasted_strut);
    assert!(pasted_formula.is_connected(model.document()));
    assert_eq!(
        pasted_formula.argument_labels(model.document()),
        vec![value(&model, &pasted).root_label().clone()]
    );
    assert_eq!(
        pasted_formula.result_labels(model.document()),
        vec![value(&model, pasted_strut).root_label().clone()]
    );
    assert_eq!(pasted_formula.driver_guid(model.document()), Some(COPY_GUID));
    assert_eq!(
        formula(&model, &strut).argument_labels(model.document()),
        vec![value(&model, &frame).root_label().clone()]
    );
}

#[test]
fn function_reaching_outside_the_copy_is_disconnected() {
    let mut model = model();
    model.open_command().expect("open command");
    let source = model.add_node(PART, "source").expect("add source");
    let sink = model.add_node(PART, "sink").expect("add sink");
    let holder = model.add_node(PART, "holder").expect("add holder");
    connect(&mut model, &source, &sink);

    model.set_copy_suffix(SuffixOption::Root);
    model.copy_node(&sink).expect("copy node");
    let pasted = model.paste_as_child(&holder).expect("paste").expect("pasted node");
    model.commit_command(TxData::named("paste")).expect("commit paste");

    assert_eq!(name(&model, &pasted), "sink [copy]");
    let pasted_formula = formula(&model, &pasted);
    assert!(!pasted_formula.is_connected(model.document()));
    assert!(pasted_formula.argument_labels(model.document()).is_empty());
    assert_eq!(pasted_formula.driver_guid(model.document()), Some(COPY_GUID));
    assert!(formula(&model, &sink).is_connected(model.document()));
}

#[test]
fn paste_into_a_copied_node_or_from_an_empty_buffer_is_refused() {
    let mut model = model();
    model.open_command().expect("open command");
    let first = model.add_node(PART, "first").expect("add first");
    let second = model.add_node(PART, "second").expect("add second");
    assert_eq!(model.paste_as_child(&second).expect("paste"), None);

    model.copy_node(&first).expect("copy node");
    assert_eq!(model.paste_as_child(&first).expect("paste"), None);

    model.set_copy_suffix(SuffixOption::None);
    let pasted = model.paste_as_child(&second).expect("paste").expect("pasted node");
    model.commit_command(TxData::named("paste")).expect("commit paste");
    assert_eq!(name(&model, &pasted), "first");
    assert_eq!(model.find_nodes_by_name("first").len(), 2);
}
