//! Per-model execution context of the tree-function engine.
//!
//! # Responsibility
//! - Carry the collaborators, flags and side tables used by one
//!   `func_execute_all` pass.
//! - Own the cached dependency graph and rebuild it on demand.
//! - Authorize heavy functions upstream of functions queued for deployment.
//!
//! # Invariants
//! - A frozen context never rebuilds its graph.
//! - The context is owned by exactly one model; nothing here is global.
//! - Collaborators are only handed out while they are enabled.

use crate::document::{DocResult, Document};
use crate::func::{FunctionRegistry, FunctionScope};
use crate::graph::{
    AnalyzerResult, DependencyAnalyzer, DependencyGraph, DependencyGraphIterator, DetectStrategy,
    GraphState,
};
use crate::logbook::LogBook;
use crate::notifier::{MessageSeverity, Plotter, ProgressNotifier};
use crate::param::tree_function::TreeFunctionParameter;
use crate::param::DataCursor;
use crate::tx::TxData;
use log::{debug, info};
use std::any::Any;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Default)]
pub struct FuncExecutionCtx {
    progress: Option<Box<dyn ProgressNotifier>>,
    plotter: Option<Box<dyn Plotter>>,
    progress_on: bool,
    plotter_on: bool,
    frozen: bool,
    graph: DependencyGraph,
    user_data: HashMap<Uuid, Box<dyn Any>>,
    tx_data: Option<TxData>,
    to_deploy: Vec<TreeFunctionParameter>,
}

impl std::fmt::Debug for FuncExecutionCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FuncExecutionCtx")
            .field("progress_on", &self.progress_on)
            .field("plotter_on", &self.plotter_on)
            .field("frozen", &self.frozen)
            .field("vertices", &self.graph.len())
            .field("user_data", &self.user_data.len())
            .field("to_deploy", &self.to_deploy.len())
            .finish()
    }
}

impl FuncExecutionCtx {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_progress_notifier(&mut self, progress: Box<dyn ProgressNotifier>) {
        self.progress = Some(progress);
    }

    pub fn set_plotter(&mut self, plotter: Box<dyn Plotter>) {
        self.plotter = Some(plotter);
    }

    pub fn progress_notifier_on(&mut self) {
        self.progress_on = true;
    }

    pub fn progress_notifier_off(&mut self) {
        self.progress_on = false;
    }

    pub fn is_progress_notifier_on(&self) -> bool {
        self.progress_on
    }

    pub fn plotter_on(&mut self) {
        self.plotter_on = true;
    }

    pub fn plotter_off(&mut self) {
        self.plotter_on = false;
    }

    pub fn is_plotter_on(&self) -> bool {
        self.plotter_on
    }

    /// True when an enabled notifier reports cancellation.
    pub fn is_cancelling(&self) -> bool {
        self.progress_on
            && self
                .progress
                .as_deref()
                .is_some_and(|progress| progress.is_cancelling())
    }

    pub fn step_progress(&mut self, step: usize) {
        if !self.progress_on {
            return;
        }
        if let Some(progress) = self.progress.as_deref_mut() {
            progress.step_progress(step);
        }
    }

    pub fn send_log_message(&mut self, severity: MessageSeverity, message: &str) {
        if !self.progress_on {
            return;
        }
        if let Some(progress) = self.progress.as_deref_mut() {
            progress.send_log_message(severity, message);
        }
    }

    pub fn freeze_graph(&mut self) {
        self.frozen = true;
    }

    pub fn unfreeze_graph(&mut self) {
        self.frozen = false;
    }

    pub fn is_graph_frozen(&self) -> bool {
        self.frozen
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Binds user data to a function GUID, replacing any previous binding.
    pub fn bind_user_data(&mut self, guid: Uuid, data: Box<dyn Any>) {
        self.user_data.insert(guid, data);
    }

    pub fn unbind_user_data(&mut self, guid: &Uuid) {
        self.user_data.remove(guid);
    }

    pub fn access_user_data(&self, guid: &Uuid) -> Option<&dyn Any> {
        self.user_data.get(guid).map(Box::as_ref)
    }

    pub fn release_user_data(&mut self) {
        self.user_data.clear();
    }

    pub fn set_tx_data(&mut self, data: TxData) {
        self.tx_data = Some(data);
    }

    pub fn access_tx_data(&self) -> Option<&TxData> {
        self.tx_data.as_ref()
    }

    pub fn release_tx_data(&mut self) {
        self.tx_data = None;
    }

    /// Queues `function` as a deployment root for the next pass.
    pub fn deploy_on_next_run(&mut self, function: TreeFunctionParameter) {
        if !self.to_deploy.contains(&function) {
            self.to_deploy.push(function);
        }
    }

    pub fn functions_to_deploy(&self) -> &[TreeFunctionParameter] {
        &self.to_deploy
    }

    pub fn clean_functions_to_deploy(&mut self) {
        self.to_deploy.clear();
    }

    /// Rebuilds the dependency graph from the document unless frozen.
    pub fn update_dependencies(&mut self, doc: &Document) {
        if self.frozen {
            debug!("event=update_dependencies module=exec status=skipped reason=frozen");
            return;
        }
        self.graph = DependencyGraph::build(doc);
        debug!(
            "event=update_dependencies module=exec status=ok vertices={}",
            self.graph.len()
        );
    }

    /// Runs loop detection over the cached graph.
    ///
    /// Returns the graph state together with the enriched list of faulty
    /// function parameters.
    pub fn check_dependency_graph(&self) -> AnalyzerResult<(GraphState, Vec<TreeFunctionParameter>)> {
        let mut analyzer = DependencyAnalyzer::new(&self.graph);
        let state = analyzer.detect_loops(DetectStrategy::Dfs)?;
        Ok((state, analyzer.cyclic_parameters(true)))
    }

    /// Marks `function` Forced in the LogBook.
    pub fn force(&self, doc: &mut Document, function: &TreeFunctionParameter) -> DocResult<()> {
        LogBook::new().force(doc, function)
    }

    /// Marks `function` for heavy deployment when its driver is heavy.
    pub fn deploy(
        &self,
        doc: &mut Document,
        registry: &FunctionRegistry,
        function: &TreeFunctionParameter,
    ) -> DocResult<()> {
        if !registry.is_heavy(doc, function) {
            return Ok(());
        }
        LogBook::new().heavy_deploy(doc, function)
    }

    /// Forces every queued root, then walks its predecessors and authorizes
    /// each heavy function whose results are pending.
    pub fn force_deploy_propagation(&mut self, doc: &mut Document, registry: &FunctionRegistry) -> DocResult<()> {
        if self.to_deploy.is_empty() {
            return Ok(());
        }
        let roots = self.to_deploy.clone();
        for root in &roots {
            self.force(doc, root)?;
            let Some(start) = self.graph.vertex_by_label(root.root_label()).map(|v| v.id()) else {
                continue;
            };
            let upstream: Vec<TreeFunctionParameter> = DependencyGraphIterator::new(&self.graph, start, true)
                .map(|vertex| vertex.function().clone())
                .collect();

            for function in upstream {
                let Some(driver) = registry.driver_of(doc, &function) else {
                    continue;
                };
                if !driver.is_heavy() {
                    continue;
                }
                let name = driver.name().to_string();
                let is_pending = function
                    .results(doc)
                    .iter()
                    .any(|result| result.is_pending_data(doc));
                if is_pending {
                    self.force(doc, &function)?;
                    self.deploy(doc, registry, &function)?;
                }
                info!(
                    "event=force_deploy module=exec status=ok message=HEAVY_FUNC_DEPLOY_NEXTFUNC function={} pending={}",
                    name, is_pending
                );
                if let Some(progress) = self.progress.as_deref_mut() {
                    progress.send_log_message(
                        MessageSeverity::Info,
                        &format!("HEAVY_FUNC_DEPLOY_NEXTFUNC {name}"),
                    );
                }
            }
        }
        Ok(())
    }

    /// Builds the scope handed to the body of the function with `guid`.
    pub(crate) fn scope<'a>(&'a mut self, doc: &'a mut Document, guid: Option<Uuid>) -> FunctionScope<'a> {
        let user_data = match guid {
            Some(guid) => self.user_data.get_mut(&guid).map(|data| data.as_mut()),
            None => None,
        };
        let progress = if self.progress_on {
            self.progress.as_deref_mut()
        } else {
            None
        };
        let plotter = if self.plotter_on {
            self.plotter.as_deref_mut()
        } else {
            None
        };
        FunctionScope::new(doc)
            .with_user_data(user_data)
            .with_tx_data(self.tx_data.as_ref())
            .with_progress(progress)
            .with_plotter(plotter)
    }
}
