use actdata_core::{
    BaseModel, DataCursor, ExecutionStatus, FunctionResult, FunctionScope, LogBook, LogBookSection, MessageSeverity,
    ModelConfig, ModelSchema, ModificationType, Node, NodeType, ParamValue, Parameter, ParameterKind,
    ProgressNotifier, TreeFunction, TreeFunctionParameter, TxData, TxMode,
};
use std::cell::Cell;
use std::rc::Rc;
use uuid::Uuid;

const CELL: u32 = 1;
const VALUE: u32 = 1;
const FORMULA: u32 = 2;
const DOUBLE_GUID: Uuid = Uuid::from_u128(0xd0b1);
const HEAVY_GUID: Uuid = Uuid::from_u128(0x4ea7);

struct Double {
    guid: Uuid,
    heavy: bool,
    runs: Rc<Cell<usize>>,
}

impl TreeFunction for Double {
    fn guid(&self) -> Uuid {
        self.guid
    }

    fn name(&self) -> &str {
        if self.heavy {
            "heavy_double"
        } else {
            "double"
        }
    }

    fn is_heavy(&self) -> bool {
        self.heavy
    }

    fn input_signature(&self) -> Vec<ParameterKind> {
        vec![ParameterKind::Real]
    }

    fn execute(&self, scope: &mut FunctionScope<'_>, inputs: &[Parameter], outputs: &[Parameter]) -> FunctionResult {
        self.runs.set(self.runs.get() + 1);
        let value = inputs[0]
            .value(scope.doc())
            .and_then(|value| value.as_real())
            .unwrap_or_default();
        outputs[0].set_value(scope.doc_mut(), ParamValue::Real(value * 2.0), ModificationType::Impacted)?;
        Ok(())
    }
}

struct Sheet {
    light_runs: Rc<Cell<usize>>,
    heavy_runs: Rc<Cell<usize>>,
}

impl ModelSchema for Sheet {
    fn node_types(&self) -> Vec<(u32, NodeType)> {
        vec![(
            CELL,
            NodeType::new("Cell")
                .with_param(VALUE, ParameterKind::Real, "Value")
                .with_param(FORMULA, ParameterKind::TreeFunction, "Formula"),
        )]
    }

    fn drivers(&self) -> Vec<Box<dyn TreeFunction>> {
        vec![
            Box::new(Double {
                guid: DOUBLE_GUID,
                heavy: false,
                runs: Rc::clone(&self.light_runs),
            }),
            Box::new(Double {
                guid: HEAVY_GUID,
                heavy: true,
                runs: Rc::clone(&self.heavy_runs),
            }),
        ]
    }

    fn actual_version_app(&self) -> i32 {
        1
    }
}

struct Fixture {
    model: BaseModel<Sheet>,
    light_runs: Rc<Cell<usize>>,
    heavy_runs: Rc<Cell<usize>>,
}

fn fixture() -> Fixture {
    let light_runs = Rc::new(Cell::new(0));
    let heavy_runs = Rc::new(Cell::new(0));
    let schema = Sheet {
        light_runs: Rc::clone(&light_runs),
        heavy_runs: Rc::clone(&heavy_runs),
    };
    let mut model = BaseModel::new(
        schema,
        ModelConfig {
            tx_mode: TxMode::Simple,
            ..ModelConfig::default()
        },
    );
    model.new_empty().expect("new document");
    Fixture {
        model,
        light_runs,
        heavy_runs,
    }
}

fn value(model: &BaseModel<Sheet>, node: &Node) -> Parameter {
    node.parameter(model.document(), VALUE).expect("value parameter")
}

fn formula(model: &BaseModel<Sheet>, node: &Node) -> TreeFunctionParameter {
    node.parameter(model.document(), FORMULA)
        .and_then(|param| param.as_tree_function())
        .expect("formula parameter")
}

/// Wires `output_node.value = f(input_node.value)` through the formula of
/// `output_node`.
fn connect(model: &mut BaseModel<Sheet>, guid: Uuid, input_node: &Node, output_node: &Node) {
    let input = value(model, input_node);
    let output = value(model, output_node);
    let function = formula(model, output_node);
    let doc = model.document_mut();
    function.set_driver_guid(doc, guid).expect("set driver");
    function.add_argument(doc, &input).expect("add argument");
    function.add_result(doc, &output).expect("add result");
}

fn set_real(model: &mut BaseModel<Sheet>, node: &Node, real: f64) {
    let param = value(model, node);
    param
        .set_value(model.document_mut(), ParamValue::Real(real), ModificationType::Touched)
        .expect("set value");
}

fn real(model: &BaseModel<Sheet>, node: &Node) -> Option<f64> {
    value(model, node)
        .value(model.document())
        .and_then(|value| value.as_real())
}

#[test]
fn chain_executes_in_dependency_order() {
    let Fixture {
        mut model, light_runs, ..
    } = fixture();
    let a = model.add_node(CELL, "A").expect("add A");
    let b = model.add_node(CELL, "B").expect("add B");
    let c = model.add_node(CELL, "C").expect("add C");
    connect(&mut model, DOUBLE_GUID, &b, &c);
    connect(&mut model, DOUBLE_GUID, &a, &b);
    set_real(&mut model, &a, 1.5);

    let report = model.func_execute_all(false, TxData::named("recompute")).expect("execute all");

    assert_eq!(report.status, ExecutionStatus::DONE);
    assert_eq!(
        report.executed,
        vec![
            formula(&model, &b).root_label().clone(),
            formula(&model, &c).root_label().clone()
        ]
    );
    assert_eq!(light_runs.get(), 2);
    assert_eq!(real(&model, &b), Some(3.0));
    assert_eq!(real(&model, &c), Some(6.0));

    let logbook = LogBook::new();
    assert_eq!(logbook.section_len(model.document(), LogBookSection::Touched), 0);
    assert_eq!(logbook.section_len(model.document(), LogBookSection::Impacted), 0);
}

#[test]
fn untouched_chain_does_not_run_again() {
    let Fixture {
        mut model, light_runs, ..
    } = fixture();
    let a = model.add_node(CELL, "A").expect("add A");
    let b = model.add_node(CELL, "B").expect("add B");
    connect(&mut model, DOUBLE_GUID, &a, &b);
    set_real(&mut model, &a, 2.0);
    model.func_execute_all(false, TxData::new()).expect("execute all");
    assert_eq!(light_runs.get(), 1);

    let report = model.func_execute_all(false, TxData::new()).expect("execute all");
    assert_eq!(report.status, ExecutionStatus::DONE);
    assert_eq!(report.count(), 0);
    assert_eq!(light_runs.get(), 1);
}

#[test]
fn execution_pass_is_a_single_undo_step() {
    let Fixture { mut model, .. } = fixture();
    let a = model.add_node(CELL, "A").expect("add A");
    let b = model.add_node(CELL, "B").expect("add B");
    connect(&mut model, DOUBLE_GUID, &a, &b);
    set_real(&mut model, &a, 4.0);
    let undos_before = model.nb_undos();

    model.func_execute_all(false, TxData::named("recompute")).expect("execute all");
    assert_eq!(model.nb_undos(), (undos_before + 1).min(model.config().undo_limit));
    assert_eq!(real(&model, &b), Some(8.0));

    model.undo(1).expect("undo");
    assert_eq!(real(&model, &b), Some(0.0));
}

#[test]
fn cyclic_functions_are_refused() {
    let Fixture {
        mut model, light_runs, ..
    } = fixture();
    let a = model.add_node(CELL, "A").expect("add A");
    let b = model.add_node(CELL, "B").expect("add B");
    connect(&mut model, DOUBLE_GUID, &a, &b);
    connect(&mut model, DOUBLE_GUID, &b, &a);
    set_real(&mut model, &a, 1.0);

    let report = model.func_execute_all(false, TxData::new()).expect("execute all");

    assert!(report.status.contains(ExecutionStatus::LOOPS_DETECTED));
    assert!(report.status.contains(ExecutionStatus::FAILED));
    assert_eq!(report.faulty.len(), 2);
    assert_eq!(report.count(), 0);
    assert_eq!(light_runs.get(), 0);
}

#[test]
fn heavy_function_waits_for_deployment() {
    let Fixture {
        mut model, heavy_runs, ..
    } = fixture();
    let a = model.add_node(CELL, "A").expect("add A");
    let b = model.add_node(CELL, "B").expect("add B");
    connect(&mut model, HEAVY_GUID, &a, &b);
    set_real(&mut model, &a, 5.0);

    let report = model.func_execute_all(false, TxData::new()).expect("execute all");
    assert_eq!(report.status, ExecutionStatus::DONE);
    assert_eq!(heavy_runs.get(), 0);
    assert!(value(&model, &b).is_pending_data(model.document()));

    let heavy = formula(&model, &b);
    model.deploy_on_next_run(heavy.clone());
    let report = model.func_execute_all(false, TxData::new()).expect("execute all");

    assert_eq!(report.status, ExecutionStatus::DONE);
    assert_eq!(heavy_runs.get(), 1);
    assert_eq!(real(&model, &b), Some(10.0));
    assert!(!value(&model, &b).is_pending_data(model.document()));
    assert!(!LogBook::new().is_heavy_deployment(model.document(), heavy.root_label()));
    assert!(model.exec_ctx().functions_to_deploy().is_empty());
}

#[test]
fn deploying_downstream_leaves_a_settled_heavy_function_alone() {
    let Fixture {
        mut model,
        light_runs,
        heavy_runs,
    } = fixture();
    let a = model.add_node(CELL, "A").expect("add A");
    let b = model.add_node(CELL, "B").expect("add B");
    let c = model.add_node(CELL, "C").expect("add C");
    connect(&mut model, HEAVY_GUID, &a, &b);
    connect(&mut model, DOUBLE_GUID, &b, &c);
    set_real(&mut model, &a, 1.0);

    model.func_execute_all(false, TxData::new()).expect("skipping pass");
    assert!(value(&model, &b).is_pending_data(model.document()));
    let heavy = formula(&model, &b);
    model.deploy_on_next_run(heavy.clone());
    model.func_execute_all(false, TxData::new()).expect("deploying pass");
    assert_eq!(heavy_runs.get(), 1);
    assert_eq!(real(&model, &c), Some(4.0));
    assert!(!value(&model, &b).is_pending_data(model.document()));
    let light_before = light_runs.get();

    let downstream = formula(&model, &c);
    model.deploy_on_next_run(downstream.clone());
    let report = model.func_execute_all(false, TxData::new()).expect("downstream pass");

    assert_eq!(report.status, ExecutionStatus::DONE);
    assert_eq!(heavy_runs.get(), 1);
    assert_eq!(light_runs.get(), light_before + 1);
    assert!(!report.executed.contains(heavy.root_label()));
    assert!(!LogBook::new().is_heavy_deployment(model.document(), heavy.root_label()));
    assert!(!LogBook::new().is_forced(model.document(), heavy.root_label()));
}

struct CancelAfterFirst {
    steps: Rc<Cell<usize>>,
}

impl ProgressNotifier for CancelAfterFirst {
    fn send_log_message(&mut self, _severity: MessageSeverity, _message: &str) {}

    fn step_progress(&mut self, step: usize) {
        self.steps.set(step);
    }

    fn is_cancelling(&self) -> bool {
        self.steps.get() >= 1
    }
}

#[test]
fn cancellation_stops_the_pass_and_keeps_the_logbook() {
    let Fixture {
        mut model, light_runs, ..
    } = fixture();
    let a = model.add_node(CELL, "A").expect("add A");
    let b = model.add_node(CELL, "B").expect("add B");
    let c = model.add_node(CELL, "C").expect("add C");
    connect(&mut model, DOUBLE_GUID, &a, &b);
    connect(&mut model, DOUBLE_GUID, &b, &c);
    set_real(&mut model, &a, 1.0);

    let steps = Rc::new(Cell::new(0));
    model.set_progress_notifier(Box::new(CancelAfterFirst {
        steps: Rc::clone(&steps),
    }));
    model.progress_notifier_on();

    let report = model.func_execute_all(false, TxData::new()).expect("execute all");

    assert!(report.status.contains(ExecutionStatus::CANCELLED));
    assert_eq!(report.count(), 1);
    assert_eq!(light_runs.get(), 1);
    assert_eq!(real(&model, &c), Some(0.0));
    let logbook = LogBook::new();
    assert!(logbook.is_touched(model.document(), value(&model, &a).root_label()));
    assert!(!model.exec_ctx().is_graph_frozen());
}
