//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `actdata_core` linkage with `ping` and `version`.
//! - `demo <path>`: build an A→B→C document, execute it, save it and reopen
//!   it, printing each status on its own line.
//! - `ACTDATA_LOG_DIR` (absolute path) enables file logging.

use actdata_core::{
    BaseModel, FunctionResult, FunctionScope, ModelConfig, ModelError, ModelResult, ModelSchema, ModificationType, NodeType,
    ParamValue, Parameter, ParameterKind, TreeFunction, TxData,
};
use log::info;
use std::process::ExitCode;
use uuid::Uuid;

const CELL_TYPE_ID: u32 = 1;
const VALUE_TAG: u32 = 1;
const FORMULA_TAG: u32 = 2;
const DOUBLER_GUID: Uuid = Uuid::from_u128(0x00d0_0b1e);

/// `results[0] = 2 * arguments[0]`.
struct Doubler;

impl TreeFunction for Doubler {
    fn guid(&self) -> Uuid {
        DOUBLER_GUID
    }

    fn name(&self) -> &str {
        "doubler"
    }

    fn input_signature(&self) -> Vec<ParameterKind> {
        vec![ParameterKind::Real]
    }

    fn output_signature(&self) -> Vec<ParameterKind> {
        vec![ParameterKind::Real]
    }

    fn execute(&self, scope: &mut FunctionScope<'_>, inputs: &[Parameter], outputs: &[Parameter]) -> FunctionResult {
        let value = inputs[0]
            .value(scope.doc())
            .and_then(|value| value.as_real())
            .unwrap_or_default();
        outputs[0].set_value(scope.doc_mut(), ParamValue::Real(value * 2.0), ModificationType::Impacted)?;
        Ok(())
    }
}

struct Cells;

impl ModelSchema for Cells {
    fn node_types(&self) -> Vec<(u32, NodeType)> {
        vec![(
            CELL_TYPE_ID,
            NodeType::new("Cell")
                .with_param(VALUE_TAG, ParameterKind::Real, "Value")
                .with_param(FORMULA_TAG, ParameterKind::TreeFunction, "Formula"),
        )]
    }

    fn drivers(&self) -> Vec<Box<dyn TreeFunction>> {
        vec![Box::new(Doubler)]
    }

    fn actual_version_app(&self) -> i32 {
        1
    }
}

fn main() -> ExitCode {
    if let Ok(log_dir) = std::env::var("ACTDATA_LOG_DIR") {
        if let Err(err) = actdata_core::init_logging(actdata_core::default_log_level(), &log_dir) {
            eprintln!("logging disabled: {err}");
        }
    }
    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        None | Some("ping") => {
            println!("actdata_core ping={}", actdata_core::ping());
            println!("actdata_core version={}", actdata_core::core_version());
            ExitCode::SUCCESS
        }
        Some("version") => {
            println!("{}", actdata_core::core_version());
            ExitCode::SUCCESS
        }
        Some("demo") => {
            let Some(path) = args.get(1) else {
                eprintln!("usage: actdata_cli demo <path>");
                return ExitCode::FAILURE;
            };
            match demo(path) {
                Ok(()) => ExitCode::SUCCESS,
                Err(err) => {
                    eprintln!("demo failed: {err}");
                    ExitCode::FAILURE
                }
            }
        }
        Some(other) => {
            eprintln!("unknown command `{other}`; expected ping|version|demo <path>");
            ExitCode::FAILURE
        }
    }
}

fn demo(path: &str) -> ModelResult<()> {
    let mut model = BaseModel::new(Cells, ModelConfig::default());
    model.new_empty()?;

    model.open_command()?;
    let a = model.add_node(CELL_TYPE_ID, "A")?;
    let b = model.add_node(CELL_TYPE_ID, "B")?;
    let c = model.add_node(CELL_TYPE_ID, "C")?;
    let doc = model.document_mut();
    let (Some(a_value), Some(b_value), Some(c_value)) = (
        a.parameter(doc, VALUE_TAG),
        b.parameter(doc, VALUE_TAG),
        c.parameter(doc, VALUE_TAG),
    ) else {
        return Err(ModelError::NodeNotFound(a.id()));
    };
    for (node, input, output) in [(&b, &a_value, &b_value), (&c, &b_value, &c_value)] {
        let Some(formula) = node
            .parameter(doc, FORMULA_TAG)
            .and_then(|param| param.as_tree_function())
        else {
            return Err(ModelError::NodeNotFound(node.id()));
        };
        formula.set_driver_guid(doc, DOUBLER_GUID)?;
        formula.add_argument(doc, input)?;
        formula.add_result(doc, output)?;
    }
    a_value.set_value(doc, ParamValue::Real(1.5), ModificationType::Touched)?;
    let report = model.func_execute_all(false, TxData::named("demo"))?;
    model.commit_command(TxData::named("demo"))?;

    println!("execution status={:?} executed={}", report.status, report.count());
    println!(
        "values a={:?} b={:?} c={:?}",
        a_value.value(model.document()),
        b_value.value(model.document()),
        c_value.value(model.document())
    );

    let saved = model.save_as(path)?;
    info!("event=cli_demo module=cli status=saved labels={}", saved);
    println!("saved labels={saved} path={path}");

    let mut reopened = BaseModel::new(Cells, ModelConfig::default());
    let status = reopened.open(path)?;
    println!("reopened version_status={status:?} functions={}", reopened.functions().len());
    Ok(())
}
