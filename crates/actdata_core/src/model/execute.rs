//! Whole-document tree-function execution.
//!
//! # Responsibility
//! - Connect drivers, rebuild dependencies and reject cyclic graphs.
//! - Run every function that must execute, in dependency order.
//! - Settle the LogBook after a completed pass.
//!
//! # Invariants
//! - Nothing runs when the graph is empty or has loops.
//! - A cancelled pass leaves Touched and Impacted in place.
//! - HeavyDeploy is only released for functions whose body ran.

use super::partition::STRUCTURE_TAG_PARTITIONS;
use super::{BaseModel, ModelResult, ModelSchema};
use crate::document::Document;
use crate::exec::FuncExecutionCtx;
use crate::func::{must_execute, run_function, FunctionRegistry, RunOutcome, TreeFunction};
use crate::graph::{GraphState, SequentialFuncIterator};
use crate::label::{AttrKind, Entry};
use crate::logbook::{LogBook, LogBookSection};
use crate::notifier::{MessageSeverity, Plotter, ProgressNotifier};
use crate::param::factory::new_parameter_settle;
use crate::param::tree_function::TreeFunctionParameter;
use crate::param::DataCursor;
use crate::tx::TxData;
use bitflags::bitflags;
use log::{debug, error, info, warn};
use std::any::Any;
use std::time::Instant;
use uuid::Uuid;

bitflags! {
    /// Outcome of one `func_execute_all` pass.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ExecutionStatus: u32 {
        const UNDEFINED = 0x1;
        const NO_FUNCTIONS = 0x2;
        const DONE = 0x4;
        const LOOPS_DETECTED = 0x8;
        const FAILED = 0x10;
        const CANCELLED = 0x20;
    }
}

bitflags! {
    /// Execution switches kept in the model configuration.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ExecFlags: u32 {
        /// Run detach requests inline instead of refusing them.
        const FORCE_NO_DETACH = 0x1;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionReport {
    pub status: ExecutionStatus,
    /// Functions that ran or propagated, in execution order.
    pub executed: Vec<Entry>,
    pub failed: Vec<Entry>,
    /// Functions on or downstream of a loop.
    pub faulty: Vec<TreeFunctionParameter>,
}

impl ExecutionReport {
    fn with_status(status: ExecutionStatus) -> Self {
        Self {
            status,
            executed: Vec::new(),
            failed: Vec::new(),
            faulty: Vec::new(),
        }
    }

    pub fn count(&self) -> usize {
        self.executed.len()
    }
}

impl<S: ModelSchema> BaseModel<S> {
    /// Executes every tree function that must execute.
    ///
    /// Writes go through the current command; in simple mode the whole pass
    /// is one implicit command.
    pub fn func_execute_all(&mut self, do_detach: bool, tx_data: TxData) -> ModelResult<ExecutionReport> {
        let started_at = Instant::now();
        info!("event=func_execute_all module=model status=start detach={}", do_detach);
        self.ensure_initialized()?;

        if do_detach && !self.config.exec_flags.contains(ExecFlags::FORCE_NO_DETACH) {
            warn!("event=func_execute_all module=model status=refused reason=detach_unsupported");
            return Ok(ExecutionReport::with_status(ExecutionStatus::FAILED));
        }
        if let Err(err) = self.doc.transactions().admit() {
            error!(
                "event=func_execute_all module=model status=error duration_ms={} error={}",
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }

        let registry = &self.registry;
        let ctx = &mut self.ctx;
        let result = self
            .doc
            .atomic(|doc| execute_pass(doc, registry, ctx, tx_data));

        match result {
            Ok(report) => {
                info!(
                    "event=func_execute_all module=model status=ok result={:?} executed={} failed={} duration_ms={}",
                    report.status,
                    report.executed.len(),
                    report.failed.len(),
                    started_at.elapsed().as_millis()
                );
                Ok(report)
            }
            Err(err) => {
                self.ctx.unfreeze_graph();
                self.ctx.clean_functions_to_deploy();
                self.ctx.release_tx_data();
                error!(
                    "event=func_execute_all module=model status=error duration_ms={} error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
        }
    }

    /// Clears all four LogBook sections.
    pub fn func_release_logbook(&mut self) -> ModelResult<()> {
        Ok(LogBook::new().release_all(&mut self.doc)?)
    }

    /// Lets every driver connect its functions, then rebuilds dependencies.
    pub fn func_reconnect_all(&mut self) {
        auto_connect_all(&mut self.doc, &self.registry);
        self.ctx.update_dependencies(&self.doc);
    }

    pub fn func_execution_flags(&self) -> ExecFlags {
        self.config.exec_flags
    }

    pub fn func_set_execution_flags(&mut self, flags: ExecFlags) {
        self.config.exec_flags = flags;
    }

    /// Driver registered under `guid`.
    pub fn function(&self, guid: &Uuid) -> Option<&dyn TreeFunction> {
        self.registry.get(guid)
    }

    /// Connected functions of the last dependency update.
    pub fn functions(&self) -> Vec<TreeFunctionParameter> {
        self.ctx
            .graph()
            .vertices()
            .map(|vertex| vertex.function().clone())
            .collect()
    }

    /// Queues a function whose heavy upstream must run on the next pass.
    pub fn deploy_on_next_run(&mut self, function: TreeFunctionParameter) {
        self.ctx.deploy_on_next_run(function);
    }

    pub fn set_progress_notifier(&mut self, progress: Box<dyn ProgressNotifier>) {
        self.ctx.set_progress_notifier(progress);
    }

    pub fn set_plotter(&mut self, plotter: Box<dyn Plotter>) {
        self.ctx.set_plotter(plotter);
    }

    pub fn progress_notifier_on(&mut self) {
        self.ctx.progress_notifier_on();
    }

    pub fn progress_notifier_off(&mut self) {
        self.ctx.progress_notifier_off();
    }

    pub fn plotter_on(&mut self) {
        self.ctx.plotter_on();
    }

    pub fn plotter_off(&mut self) {
        self.ctx.plotter_off();
    }

    /// Binds driver-specific data handed to the function bodies of `guid`.
    pub fn bind_user_data(&mut self, guid: Uuid, data: Box<dyn Any>) {
        self.ctx.bind_user_data(guid, data);
    }

    pub fn exec_ctx(&self) -> &FuncExecutionCtx {
        &self.ctx
    }

    pub fn exec_ctx_mut(&mut self) -> &mut FuncExecutionCtx {
        &mut self.ctx
    }
}

fn execute_pass(
    doc: &mut Document,
    registry: &FunctionRegistry,
    ctx: &mut FuncExecutionCtx,
    tx_data: TxData,
) -> ModelResult<ExecutionReport> {
    auto_connect_all(doc, registry);
    ctx.update_dependencies(doc);
    ctx.force_deploy_propagation(doc, registry)?;

    let (state, faulty) = ctx.check_dependency_graph()?;
    if state.contains(GraphState::NO_GRAPH) {
        ctx.clean_functions_to_deploy();
        return Ok(ExecutionReport::with_status(ExecutionStatus::NO_FUNCTIONS));
    }
    if state.contains(GraphState::HAS_LOOPS) {
        let labels: Vec<String> = faulty.iter().map(|f| f.root_label().to_string()).collect();
        warn!(
            "event=func_execute_all module=model status=loops_detected message=\"loops detected\" faulty={}",
            labels.join(",")
        );
        ctx.send_log_message(MessageSeverity::Error, &format!("loops detected: {}", labels.join(", ")));
        ctx.clean_functions_to_deploy();
        let mut report = ExecutionReport::with_status(ExecutionStatus::LOOPS_DETECTED | ExecutionStatus::FAILED);
        report.faulty = faulty;
        return Ok(report);
    }

    ctx.set_tx_data(tx_data);
    ctx.freeze_graph();

    let order: Vec<TreeFunctionParameter> = {
        let graph = ctx.graph();
        SequentialFuncIterator::new(graph, |vertex| registry.priority(doc, vertex.function()))
            .flatten_order()
            .into_iter()
            .map(|vertex| vertex.function().clone())
            .collect()
    };

    let mut report = ExecutionReport::with_status(ExecutionStatus::DONE);
    let mut heavy_executed: Vec<Entry> = Vec::new();
    for (step, function) in order.iter().enumerate() {
        if ctx.is_cancelling() {
            report.status |= ExecutionStatus::CANCELLED;
            break;
        }
        let Some(driver) = registry.driver_of(doc, function) else {
            debug!(
                "event=func_execute_all module=model status=skipped reason=unknown_driver function={}",
                function.root_label()
            );
            continue;
        };
        if !must_execute(doc, driver, function) {
            continue;
        }

        let outcome = {
            let mut scope = ctx.scope(doc, Some(driver.guid()));
            run_function(driver, function, &mut scope)
        };
        match outcome {
            Ok(outcome) => {
                if outcome == RunOutcome::Executed && driver.is_heavy() {
                    heavy_executed.push(function.root_label().clone());
                }
                report.executed.push(function.root_label().clone());
            }
            Err(err) => {
                warn!(
                    "event=tree_function module=model status=error function={} label={} code={} error={}",
                    driver.name(),
                    function.root_label(),
                    err.code(),
                    err
                );
                report.failed.push(function.root_label().clone());
            }
        }
        ctx.step_progress(step + 1);
    }

    ctx.unfreeze_graph();
    ctx.clean_functions_to_deploy();
    ctx.release_tx_data();

    if !report.failed.is_empty() {
        report.status |= ExecutionStatus::FAILED;
    }
    if report.status.contains(ExecutionStatus::CANCELLED) {
        info!(
            "event=func_execute_all module=model status=cancelled executed={}",
            report.executed.len()
        );
        return Ok(report);
    }

    let logbook = LogBook::new();
    logbook.release_modified(doc)?;
    logbook.release_forced(doc)?;
    for label in &heavy_executed {
        logbook.remove(doc, LogBookSection::HeavyDeploy, label)?;
    }
    Ok(report)
}

/// Calls `auto_connect` once for every driver-carrying parameter of the
/// partition section.
fn auto_connect_all(doc: &mut Document, registry: &FunctionRegistry) {
    let labels: Vec<Entry> = doc
        .store()
        .iter()
        .filter(|(entry, data)| {
            entry.tags().get(1) == Some(&STRUCTURE_TAG_PARTITIONS) && data.get(AttrKind::Driver).is_some()
        })
        .map(|(entry, _)| entry.clone())
        .collect();

    for label in labels {
        let Some(function) = new_parameter_settle(doc, &label).and_then(|(param, _)| param.as_tree_function())
        else {
            continue;
        };
        let Some(driver) = registry.driver_of(doc, &function) else {
            continue;
        };
        if let Err(err) = driver.auto_connect(doc, &function) {
            warn!(
                "event=auto_connect module=model status=error function={} label={} error={}",
                driver.name(),
                label,
                err
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ExecFlags, ExecutionStatus};
    use crate::model::{BaseModel, ModelConfig, ModelSchema, NodeType};
    use crate::param::ParameterKind;
    use crate::tx::{TxData, TxMode};

    struct Empty;

    impl ModelSchema for Empty {
        fn node_types(&self) -> Vec<(u32, NodeType)> {
            vec![(1, NodeType::new("Box").with_param(1, ParameterKind::Int, "Count"))]
        }

        fn actual_version_app(&self) -> i32 {
            1
        }
    }

    fn model(flags: ExecFlags) -> BaseModel<Empty> {
        let mut model = BaseModel::new(
            Empty,
            ModelConfig {
                tx_mode: TxMode::Simple,
                exec_flags: flags,
                ..ModelConfig::default()
            },
        );
        model.new_empty().expect("new empty");
        model
    }

    #[test]
    fn document_without_functions_reports_no_functions() {
        let mut model = model(ExecFlags::empty());
        model.add_node(1, "box").expect("node");
        let report = model.func_execute_all(false, TxData::named("run")).expect("execute");
        assert_eq!(report.status, ExecutionStatus::NO_FUNCTIONS);
        assert_eq!(report.count(), 0);
    }

    #[test]
    fn detach_is_refused_unless_forced_inline() {
        let mut model = model(ExecFlags::empty());
        let report = model.func_execute_all(true, TxData::new()).expect("execute");
        assert_eq!(report.status, ExecutionStatus::FAILED);

        model.func_set_execution_flags(ExecFlags::FORCE_NO_DETACH);
        assert_eq!(model.func_execution_flags(), ExecFlags::FORCE_NO_DETACH);
        let report = model.func_execute_all(true, TxData::new()).expect("execute");
        assert_eq!(report.status, ExecutionStatus::NO_FUNCTIONS);
    }

    #[test]
    fn extended_mode_needs_an_open_command() {
        let mut model = BaseModel::new(Empty, ModelConfig::default());
        model.new_empty().expect("new empty");
        assert!(model.func_execute_all(false, TxData::new()).is_err());

        model.open_command().expect("open");
        let report = model.func_execute_all(false, TxData::new()).expect("execute");
        assert_eq!(report.status, ExecutionStatus::NO_FUNCTIONS);
        model.abort_command();
    }
}
