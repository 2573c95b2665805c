//! Framework execution scheme of a single tree function.
//!
//! # Invariants
//! - Signature failures return before any result is touched.
//! - Inputs that are invalid (or pending) and not listed among the results
//!   are unrecoverable: the body does not run and the state propagates to
//!   every result instead.
//! - A heavy function runs only with a HeavyDeploy record in the LogBook.
//! - Any failure after validation invalidates every result unless the
//!   function opts out of propagation.

use super::{FunctionError, FunctionResult, FunctionScope, TreeFunction};
use crate::document::Document;
use crate::logbook::LogBook;
use crate::notifier::MessageSeverity;
use crate::param::tree_function::TreeFunctionParameter;
use crate::param::{DataCursor, ModificationType, Parameter, ParameterKind};
use log::{debug, info, warn};

/// What a successful run did to the results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The body ran and every result is up to date.
    Executed,
    /// The body was skipped and the pending state went to the results.
    Propagated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecoveryCheck {
    Validity,
    Pending,
}

/// True when `function` is forced, has a modified argument, or asks for
/// execution with intact arguments.
pub fn must_execute(doc: &Document, driver: &dyn TreeFunction, function: &TreeFunctionParameter) -> bool {
    let logbook = LogBook::new();
    if logbook.is_forced(doc, function.root_label()) {
        return true;
    }
    if function
        .argument_labels(doc)
        .iter()
        .any(|label| logbook.is_modified(doc, label))
    {
        return true;
    }
    driver.must_execute_intact(doc, &function.arguments(doc))
}

/// Runs `driver` on `function` through validation, recovery checks,
/// heavy gating and result propagation.
pub fn run_function(
    driver: &dyn TreeFunction,
    function: &TreeFunctionParameter,
    scope: &mut FunctionScope<'_>,
) -> Result<RunOutcome, FunctionError> {
    let name = driver.name().to_string();
    let inputs = function.arguments(scope.doc());
    let outputs = function.results(scope.doc());

    if !matches_signature(&driver.input_signature(), &inputs) {
        scope.send_message(MessageSeverity::Error, &format!("TREE_FUNCTION_INPUT_VALIDATION_FAILED {name}"));
        return Err(FunctionError::Signature {
            function: name,
            direction: "input",
        });
    }
    if !matches_signature(&driver.output_signature(), &outputs) {
        scope.send_message(MessageSeverity::Error, &format!("TREE_FUNCTION_OUTPUT_VALIDATION_FAILED {name}"));
        return Err(FunctionError::Signature {
            function: name,
            direction: "output",
        });
    }

    let reco_valid = !has_unrecoverable(scope.doc(), &inputs, &outputs, RecoveryCheck::Validity);
    let reco_pending = has_unrecoverable(scope.doc(), &inputs, &outputs, RecoveryCheck::Pending);
    let propagate = !driver.no_propagation();

    let outcome = if reco_pending {
        scope.send_message(MessageSeverity::Notice, &format!("TREE_FUNCTION_PENDING_INPUTS {name}"));
        if propagate {
            mark_pending(scope.doc_mut(), &outputs)?;
        }
        recovery_outcome(reco_valid, &name)
    } else {
        let can_execute = if driver.is_heavy() {
            let deployed = LogBook::is_pending_cursor(scope.doc(), function);
            if deployed && !reco_valid {
                warn!(
                    "event=tree_function module=func status=unrecoverable_input function={}",
                    name
                );
            }
            if !deployed {
                info!(
                    "event=tree_function module=func status=heavy_skipped message=\"heavy skipped\" function={} label={}",
                    name,
                    function.root_label()
                );
                scope.send_message(MessageSeverity::Notice, &format!("TREE_FUNCTION_HEAVY_SKIPPED {name}"));
            }
            deployed && reco_valid
        } else {
            reco_valid
        };

        if can_execute {
            debug!(
                "event=tree_function module=func status=start function={} label={}",
                name,
                function.root_label()
            );
            driver
                .execute(scope, &inputs, &outputs)
                .and_then(|()| mark_done(scope.doc_mut(), &outputs))
                .map(|()| RunOutcome::Executed)
        } else {
            if propagate {
                mark_pending(scope.doc_mut(), &outputs)?;
            }
            recovery_outcome(reco_valid, &name)
        }
    };

    if outcome.is_err() && propagate {
        for output in &outputs {
            output.set_validity(scope.doc_mut(), false, ModificationType::Impacted)?;
        }
    }
    outcome
}

fn matches_signature(signature: &[ParameterKind], params: &[Parameter]) -> bool {
    if signature.is_empty() {
        return true;
    }
    signature.len() == params.len()
        && signature
            .iter()
            .zip(params)
            .all(|(expected, param)| param.kind() == *expected)
}

fn has_unrecoverable(doc: &Document, inputs: &[Parameter], outputs: &[Parameter], check: RecoveryCheck) -> bool {
    inputs.iter().any(|input| {
        let is_ok = match check {
            RecoveryCheck::Validity => input.is_valid_data(doc),
            RecoveryCheck::Pending => !input.is_pending_data(doc),
        };
        !is_ok && !outputs.iter().any(|output| output.root_label() == input.root_label())
    })
}

fn recovery_outcome(reco_valid: bool, name: &str) -> Result<RunOutcome, FunctionError> {
    if reco_valid {
        Ok(RunOutcome::Propagated)
    } else {
        Err(FunctionError::Unrecoverable {
            function: name.to_string(),
        })
    }
}

fn mark_pending(doc: &mut Document, outputs: &[Parameter]) -> FunctionResult {
    for output in outputs {
        output.set_pending(doc, true, ModificationType::Impacted)?;
    }
    Ok(())
}

fn mark_done(doc: &mut Document, outputs: &[Parameter]) -> FunctionResult {
    for output in outputs {
        output.set_validity(doc, true, ModificationType::Impacted)?;
        output.set_pending(doc, false, ModificationType::Silent)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{must_execute, run_function, RunOutcome};
    use crate::document::Document;
    use crate::func::{FunctionError, FunctionResult, FunctionScope, TreeFunction};
    use crate::label::Entry;
    use crate::logbook::LogBook;
    use crate::param::tree_function::TreeFunctionParameter;
    use crate::param::{DataCursor, DetachedParameter, ModificationType, ParamValue, Parameter, ParameterKind};
    use crate::tx::TxMode;
    use uuid::Uuid;

    struct Doubler {
        heavy: bool,
    }

    impl TreeFunction for Doubler {
        fn guid(&self) -> Uuid {
            Uuid::from_u128(0x51)
        }

        fn name(&self) -> &str {
            "doubler"
        }

        fn is_heavy(&self) -> bool {
            self.heavy
        }

        fn input_signature(&self) -> Vec<ParameterKind> {
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

    fn wired(doc: &mut Document) -> (Parameter, Parameter, TreeFunctionParameter) {
        let input = DetachedParameter::new(ParameterKind::Real)
            .expand_on(doc, Entry::from_root(&[2, 1, 1, 2, 1]))
            .expect("input");
        let output = DetachedParameter::new(ParameterKind::Real)
            .expand_on(doc, Entry::from_root(&[2, 1, 1, 2, 2]))
            .expect("output");
        let function = DetachedParameter::new(ParameterKind::TreeFunction)
            .expand_on(doc, Entry::from_root(&[2, 1, 1, 2, 3]))
            .expect("function")
            .as_tree_function()
            .expect("tree function");
        function.set_driver_guid(doc, Uuid::from_u128(0x51)).expect("guid");
        function.add_argument(doc, &input).expect("argument");
        function.add_result(doc, &output).expect("result");
        (input, output, function)
    }

    #[test]
    fn body_runs_and_results_are_impacted() {
        let mut doc = Document::new(TxMode::Simple, 10);
        let (input, output, function) = wired(&mut doc);
        input
            .set_value(&mut doc, ParamValue::Real(2.5), ModificationType::Touched)
            .expect("input value");
        let driver = Doubler { heavy: false };
        assert!(must_execute(&doc, &driver, &function));

        let outcome = run_function(&driver, &function, &mut FunctionScope::new(&mut doc)).expect("run");
        assert_eq!(outcome, RunOutcome::Executed);
        assert_eq!(output.value(&doc), Some(ParamValue::Real(5.0)));
        assert!(LogBook::new().is_impacted(&doc, output.root_label()));
    }

    #[test]
    fn invalid_input_not_in_results_invalidates_outputs() {
        let mut doc = Document::new(TxMode::Simple, 10);
        let (input, output, function) = wired(&mut doc);
        input
            .set_validity(&mut doc, false, ModificationType::Silent)
            .expect("invalidate");

        let err = run_function(&Doubler { heavy: false }, &function, &mut FunctionScope::new(&mut doc))
            .expect_err("unrecoverable input");
        assert!(matches!(err, FunctionError::Unrecoverable { .. }));
        assert!(!output.is_valid_data(&doc));
    }

    #[test]
    fn heavy_function_without_deployment_only_propagates_pending() {
        let mut doc = Document::new(TxMode::Simple, 10);
        let (_, output, function) = wired(&mut doc);

        let outcome = run_function(&Doubler { heavy: true }, &function, &mut FunctionScope::new(&mut doc))
            .expect("idle run succeeds");
        assert_eq!(outcome, RunOutcome::Propagated);
        assert!(output.is_pending_data(&doc));
        assert_eq!(output.value(&doc), Some(ParamValue::Real(0.0)));
    }

    #[test]
    fn signature_mismatch_leaves_results_untouched() {
        let mut doc = Document::new(TxMode::Simple, 10);
        let (_, output, function) = wired(&mut doc);
        let extra = DetachedParameter::new(ParameterKind::Int)
            .expand_on(&mut doc, Entry::from_root(&[2, 1, 1, 2, 4]))
            .expect("extra");
        function.add_argument(&mut doc, &extra).expect("second argument");

        let err = run_function(&Doubler { heavy: false }, &function, &mut FunctionScope::new(&mut doc))
            .expect_err("signature mismatch");
        assert_eq!(err.code(), 1);
        assert!(output.is_valid_data(&doc));
    }
}
