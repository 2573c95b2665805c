use actdata_core::model::{ConversionChain, Converter};
use actdata_core::{
    BaseModel, FunctionResult, FunctionScope, ModelConfig, ModelError, ModelSchema, ModificationType, NodeType,
    ParamValue, Parameter, ParameterKind, TreeFunction, TxData, VersionStatus,
};
use rusqlite::Connection;
use std::cell::Cell;
use std::path::Path;
use std::rc::Rc;
use uuid::Uuid;

const GAUGE: u32 = 3;
const VALUE: u32 = 1;
const FORMULA: u32 = 2;
const NEGATE_GUID: Uuid = Uuid::from_u128(0x9e9a7e);

struct Negate;

impl TreeFunction for Negate {
    fn guid(&self) -> Uuid {
        NEGATE_GUID
    }

    fn name(&self) -> &str {
        "negate"
    }

    fn execute(&self, scope: &mut FunctionScope<'_>, inputs: &[Parameter], outputs: &[Parameter]) -> FunctionResult {
        let value = inputs[0]
            .value(scope.doc())
            .and_then(|value| value.as_real())
            .unwrap_or_default();
        outputs[0].set_value(scope.doc_mut(), ParamValue::Real(-value), ModificationType::Impacted)?;
        Ok(())
    }
}

struct Gauges {
    app_version: i32,
    converter: Option<ConversionChain>,
}

impl Gauges {
    fn at(app_version: i32) -> Self {
        Self {
            app_version,
            converter: None,
        }
    }
}

impl ModelSchema for Gauges {
    fn node_types(&self) -> Vec<(u32, NodeType)> {
        vec![(
            GAUGE,
            NodeType::new("Gauge")
                .with_param(VALUE, ParameterKind::Real, "Value")
                .with_param(FORMULA, ParameterKind::TreeFunction, "Formula"),
        )]
    }

    fn drivers(&self) -> Vec<Box<dyn TreeFunction>> {
        vec![Box::new(Negate)]
    }

    fn actual_version_app(&self) -> i32 {
        self.app_version
    }

    fn converter_app(&self) -> Option<&dyn Converter> {
        self.converter.as_ref().map(|chain| chain as &dyn Converter)
    }
}

/// Saves a document with a connected `inner -> outer` pair.
fn save_sample(path: &Path, app_version: i32) {
    let mut model = BaseModel::new(Gauges::at(app_version), ModelConfig::default());
    model.new_empty().expect("new document");
    model.open_command().expect("open command");
    let inner = model.add_node(GAUGE, "inner").expect("add inner");
    let outer = model.add_node(GAUGE, "outer").expect("add outer");
    model.add_child_node(&outer, &inner).expect("add child node");
    let doc = model.document_mut();
    let input = inner.parameter(doc, VALUE).expect("value parameter");
    let output = outer.parameter(doc, VALUE).expect("value parameter");
    let function = outer
        .parameter(doc, FORMULA)
        .and_then(|param| param.as_tree_function())
        .expect("formula parameter");
    function.set_driver_guid(doc, NEGATE_GUID).expect("set driver");
    function.add_argument(doc, &input).expect("add argument");
    function.add_result(doc, &output).expect("add result");
    input
        .set_value(doc, ParamValue::Real(2.5), ModificationType::Touched)
        .expect("set value");
    model.func_execute_all(false, TxData::named("negate")).expect("execute all");
    model.commit_command(TxData::named("build")).expect("commit build");
    model.save_as(path).expect("save document");
}

fn real_of(model: &BaseModel<Gauges>, name: &str) -> Option<f64> {
    model
        .find_node_by_name(name)?
        .parameter(model.document(), VALUE)?
        .value(model.document())?
        .as_real()
}

#[test]
fn saved_document_reopens_with_values_and_functions() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("gauges.sqlite");
    save_sample(&path, 1);

    let mut model = BaseModel::new(Gauges::at(1), ModelConfig::default());
    assert_eq!(model.open(&path).expect("open document"), VersionStatus::Ok);

    assert!(model.is_initialized());
    assert!(!model.is_modified());
    assert_eq!(model.nb_undos(), 0);
    assert_eq!(real_of(&model, "inner"), Some(2.5));
    assert_eq!(real_of(&model, "outer"), Some(-2.5));
    assert!(model.find_node_by_names(&["outer", "inner"]).is_some());

    let functions = model.functions();
    assert_eq!(functions.len(), 1);
    assert!(functions[0].is_connected(model.document()));
}

#[test]
fn document_without_versions_is_not_bound() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("unbound.sqlite");
    save_sample(&path, 1);
    let conn = Connection::open(&path).expect("open sqlite file");
    conn.execute("DELETE FROM attributes WHERE entry IN ('0:1:1', '0:1:2');", [])
        .expect("delete version attributes");
    drop(conn);

    let mut model = BaseModel::new(Gauges::at(1), ModelConfig::default());
    assert!(matches!(
        model.open(&path),
        Err(ModelError::Version(VersionStatus::NotBoundFail))
    ));
    assert_eq!(model.version_status(), VersionStatus::NotBoundFail);
    assert!(!model.is_initialized());
}

#[test]
fn document_from_a_newer_application_is_refused() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("newer.sqlite");
    save_sample(&path, 5);

    let mut model = BaseModel::new(Gauges::at(4), ModelConfig::default());
    model.new_empty().expect("new document");
    assert!(matches!(
        model.open(&path),
        Err(ModelError::Version(VersionStatus::HigherFail))
    ));
    assert!(!model.is_initialized());
    assert!(model.find_node_by_name("inner").is_none());
}

#[test]
fn older_document_without_converter_fails() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("older.sqlite");
    save_sample(&path, 1);

    let mut model = BaseModel::new(Gauges::at(2), ModelConfig::default());
    assert!(matches!(
        model.open(&path),
        Err(ModelError::Version(VersionStatus::LessFail))
    ));
    assert_eq!(model.version_status(), VersionStatus::LessFail);
}

#[test]
fn older_document_is_converted_and_marked_modified() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("converted.sqlite");
    save_sample(&path, 1);

    let steps = Rc::new(Cell::new(0));
    let counter = Rc::clone(&steps);
    let schema = Gauges {
        app_version: 3,
        converter: Some(
            ConversionChain::new()
                .step(1, 2, move |_doc| {
                    counter.set(counter.get() + 1);
                    true
                })
                .step(2, 3, |_doc| true),
        ),
    };
    let mut model = BaseModel::new(schema, ModelConfig::default());

    assert_eq!(model.open(&path).expect("open document"), VersionStatus::LessOk);
    assert_eq!(steps.get(), 1);
    assert!(model.is_modified());
    assert_eq!(model.nb_undos(), 0);
    assert_eq!(model.stored_version_app(), 1);

    let resaved = dir.path().join("resaved.sqlite");
    model.save_as(&resaved).expect("save document");
    let mut reopened = BaseModel::new(Gauges::at(3), ModelConfig::default());
    assert_eq!(reopened.open(&resaved).expect("open document"), VersionStatus::Ok);
    assert_eq!(reopened.stored_version_app(), 3);
}

#[test]
fn failing_conversion_step_fails_the_open() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("broken.sqlite");
    save_sample(&path, 1);

    let schema = Gauges {
        app_version: 2,
        converter: Some(ConversionChain::new().step(1, 2, |_doc| false)),
    };
    let mut model = BaseModel::new(schema, ModelConfig::default());
    assert!(matches!(
        model.open(&path),
        Err(ModelError::Version(VersionStatus::LessFail))
    ));
}
