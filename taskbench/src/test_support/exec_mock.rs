//! Recording process-execution doubles.
//!
//! [`ExecMock`] is stateless: any registered expectation may answer any
//! invocation and assertions about what ran happen afterwards, in any order.
//! [`StatefulExecMock`] turns the expectations into an ordered queue where
//! every invocation must match the next slot.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use anyhow::Result;
use thiserror::Error;
use tracing::{debug, warn};

use crate::core::types::{ExecRequest, ExecResult};
use crate::io::executor::ProcessExecutor;
use crate::project::{Project, ProjectError};
use crate::test_support::matcher::InvocationMatcher;

const BACKEND: &str = "mock";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MockError {
    #[error("unexpected invocation {actual}: no expectation matches")]
    Unmatched { actual: String },

    #[error("unexpected invocation at position {position}: expected {expected}, got {actual}")]
    Mismatch {
        position: usize,
        expected: String,
        actual: String,
    },

    #[error("unexpected invocation {actual}: all {consumed} expectation(s) already consumed")]
    Exhausted { consumed: usize, actual: String },

    #[error("unfulfilled expectations: {}", .remaining.join(", "))]
    Unfulfilled { remaining: Vec<String> },

    #[error("expected invocation {expected} never happened")]
    NotInvoked { expected: String },
}

/// Lifecycle of one expectation. A state only moves forward.
///
/// In ordered mode a slot is `Matched` only while its result is being handed
/// out, then immediately `Consumed`; tests see `Pending` or `Consumed`. In
/// stateless mode expectations are reusable, so one that answered at least
/// once stays `Matched` and is never consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Pending,
    Matched,
    Consumed,
}

impl fmt::Display for SlotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SlotState::Pending => "pending",
            SlotState::Matched => "matched",
            SlotState::Consumed => "consumed",
        })
    }
}

struct Expectation {
    matcher: InvocationMatcher,
    result: ExecResult,
    state: SlotState,
}

#[derive(Default)]
struct MockState {
    expectations: Vec<Expectation>,
    ordered: bool,
    cursor: usize,
    invocations: Vec<ExecRequest>,
    failures: Vec<MockError>,
}

impl MockState {
    fn answer(&mut self, request: &ExecRequest) -> Result<ExecResult, MockError> {
        if self.ordered {
            let position = self.match_next(request)?;
            return Ok(self.take_result(position));
        }
        if self.expectations.is_empty() {
            return Ok(ExecResult::success());
        }
        let Some(expectation) = self
            .expectations
            .iter_mut()
            .find(|expectation| expectation.matcher.matches(request))
        else {
            return Err(MockError::Unmatched {
                actual: describe(request),
            });
        };
        expectation.state = SlotState::Matched;
        Ok(expectation.result.clone())
    }

    /// Check `request` against the slot under the cursor and mark it matched.
    fn match_next(&mut self, request: &ExecRequest) -> Result<usize, MockError> {
        let position = self.cursor;
        let Some(slot) = self.expectations.get_mut(position) else {
            return Err(MockError::Exhausted {
                consumed: position,
                actual: describe(request),
            });
        };
        if !slot.matcher.matches(request) {
            return Err(MockError::Mismatch {
                position: position + 1,
                expected: slot.matcher.to_string(),
                actual: describe(request),
            });
        }
        slot.state = SlotState::Matched;
        Ok(position)
    }

    fn take_result(&mut self, position: usize) -> ExecResult {
        let slot = &mut self.expectations[position];
        slot.state = SlotState::Consumed;
        self.cursor = position + 1;
        slot.result.clone()
    }

    fn states(&self) -> Vec<SlotState> {
        self.expectations
            .iter()
            .map(|expectation| expectation.state)
            .collect()
    }

    fn remaining(&self) -> Vec<String> {
        self.expectations
            .iter()
            .enumerate()
            .skip(self.cursor)
            .map(|(index, expectation)| format!("#{} {}", index + 1, expectation.matcher))
            .collect()
    }
}

fn describe(request: &ExecRequest) -> String {
    format!("`{}` (in {})", request.command_line(), request.workdir.display())
}

/// Stateless recording executor.
///
/// With no expectations every invocation succeeds with empty output. Once
/// one is registered, the first matching expectation answers and an
/// invocation nothing matches fails immediately. Clones share state, so the
/// handle kept by the test sees what the installed copy recorded.
#[derive(Clone, Default)]
pub struct ExecMock {
    state: Rc<RefCell<MockState>>,
}

impl ExecMock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make this mock the project's executor.
    pub fn install(&self, project: &mut Project) -> Result<(), ProjectError> {
        project.install_executor(Box::new(self.clone()))
    }

    /// Answer invocations matching `matcher` with `result`.
    pub fn expect(&self, matcher: InvocationMatcher, result: ExecResult) -> &Self {
        self.state.borrow_mut().expectations.push(Expectation {
            matcher,
            result,
            state: SlotState::Pending,
        });
        self
    }

    /// Every invocation seen so far, in arrival order.
    pub fn invocations(&self) -> Vec<ExecRequest> {
        self.state.borrow().invocations.clone()
    }

    /// Invocations accepted by `matcher`; empty if it never matched.
    pub fn invocations_matching(&self, matcher: &InvocationMatcher) -> Vec<ExecRequest> {
        self.state
            .borrow()
            .invocations
            .iter()
            .filter(|request| matcher.matches(request))
            .cloned()
            .collect()
    }

    pub fn assert_invoked(&self, matcher: &InvocationMatcher) -> Result<(), MockError> {
        if self.invocations_matching(matcher).is_empty() {
            return Err(MockError::NotInvoked {
                expected: matcher.to_string(),
            });
        }
        Ok(())
    }

    /// State of each expectation in registration order; `Matched` marks the
    /// ones that answered at least once.
    pub fn expectation_states(&self) -> Vec<SlotState> {
        self.state.borrow().states()
    }

    /// Failures raised during the test, oldest first.
    pub fn failures(&self) -> Vec<MockError> {
        self.state.borrow().failures.clone()
    }

    /// End-of-test check: the first recorded failure, then (in ordered mode)
    /// any expectations left in the queue.
    pub fn verify(&self) -> Result<(), MockError> {
        let state = self.state.borrow();
        if let Some(failure) = state.failures.first() {
            return Err(failure.clone());
        }
        if state.ordered {
            let remaining = state.remaining();
            if !remaining.is_empty() {
                return Err(MockError::Unfulfilled { remaining });
            }
        }
        Ok(())
    }

    /// Switch to ordered verification. Expectations already registered become
    /// the head of the queue.
    pub fn with_stateful_verification(self) -> StatefulExecMock {
        self.state.borrow_mut().ordered = true;
        StatefulExecMock { inner: self }
    }
}

impl fmt::Debug for ExecMock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("ExecMock")
            .field("ordered", &state.ordered)
            .field("expectations", &state.expectations.len())
            .field("invocations", &state.invocations.len())
            .field("failures", &state.failures.len())
            .finish()
    }
}

impl ProcessExecutor for ExecMock {
    fn backend(&self) -> &str {
        BACKEND
    }

    fn exec(&self, request: &ExecRequest) -> Result<ExecResult> {
        let mut state = self.state.borrow_mut();
        state.invocations.push(request.clone());
        match state.answer(request) {
            Ok(result) => {
                debug!(invocation = %request, exit_code = result.exit_code, "mock answered");
                Ok(result)
            }
            Err(err) => {
                warn!(err = %err, "mock rejected invocation");
                state.failures.push(err.clone());
                Err(err.into())
            }
        }
    }
}

/// Ordered-queue view over an [`ExecMock`].
#[derive(Debug, Clone)]
pub struct StatefulExecMock {
    inner: ExecMock,
}

impl StatefulExecMock {
    pub fn new() -> Self {
        ExecMock::new().with_stateful_verification()
    }

    pub fn install(&self, project: &mut Project) -> Result<(), ProjectError> {
        self.inner.install(project)
    }

    /// Append a slot to the queue.
    pub fn expect(&self, matcher: InvocationMatcher, result: ExecResult) -> &Self {
        self.inner.expect(matcher, result);
        self
    }

    pub fn invocations(&self) -> Vec<ExecRequest> {
        self.inner.invocations()
    }

    /// Slots not yet consumed, rendered as `#position matcher`.
    pub fn remaining(&self) -> Vec<String> {
        self.inner.state.borrow().remaining()
    }

    pub fn slot_states(&self) -> Vec<SlotState> {
        self.inner.expectation_states()
    }

    pub fn verify(&self) -> Result<(), MockError> {
        self.inner.verify()
    }

    pub fn inner(&self) -> &ExecMock {
        &self.inner
    }
}

impl Default for StatefulExecMock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(command: &str, args: &[&str]) -> ExecRequest {
        ExecRequest::new(command, "/work").args(args.iter().copied())
    }

    #[test]
    fn without_expectations_everything_succeeds() {
        let mock = ExecMock::new();
        let result = mock.exec(&request("helm", &["version"])).expect("exec");
        assert_eq!(result, ExecResult::success());
        assert_eq!(mock.invocations(), vec![request("helm", &["version"])]);
        mock.verify().expect("verify");
    }

    #[test]
    fn first_matching_expectation_answers() {
        let mock = ExecMock::new();
        mock.expect(
            InvocationMatcher::command("helm").args(["version"]),
            ExecResult::success().with_stdout("v3"),
        )
        .expect(InvocationMatcher::command("helm"), ExecResult::failure(2));

        let version = mock.exec(&request("helm", &["version"])).expect("version");
        assert_eq!(version.stdout_lossy(), "v3");
        let lint = mock.exec(&request("helm", &["lint"])).expect("lint");
        assert_eq!(lint.exit_code, 2);
    }

    #[test]
    fn stateless_expectations_stay_matched_after_answering() {
        let mock = ExecMock::new();
        mock.expect(InvocationMatcher::command("helm"), ExecResult::success())
            .expect(InvocationMatcher::command("kubectl"), ExecResult::success());

        mock.exec(&request("helm", &["lint"])).expect("lint");
        mock.exec(&request("helm", &["package"])).expect("package");
        assert_eq!(
            mock.expectation_states(),
            vec![SlotState::Matched, SlotState::Pending]
        );
        mock.verify().expect("unused expectations are not an error");
    }

    #[test]
    fn unmatched_invocation_fails_now_and_at_verify() {
        let mock = ExecMock::new();
        mock.expect(InvocationMatcher::command("helm"), ExecResult::success());

        let err = mock.exec(&request("kubectl", &["apply"])).unwrap_err();
        assert!(err.to_string().contains("`kubectl apply` (in /work)"));
        assert_eq!(mock.failures().len(), 1);
        assert!(matches!(mock.verify(), Err(MockError::Unmatched { .. })));
        assert_eq!(mock.invocations().len(), 1);
    }

    #[test]
    fn querying_never_invoked_matcher_is_empty() {
        let mock = ExecMock::new();
        mock.exec(&request("helm", &["lint"])).expect("exec");

        let kubectl = InvocationMatcher::command("kubectl");
        assert!(mock.invocations_matching(&kubectl).is_empty());
        assert_eq!(
            mock.assert_invoked(&kubectl),
            Err(MockError::NotInvoked {
                expected: "`kubectl`".to_string()
            })
        );
        mock.assert_invoked(&InvocationMatcher::command("helm"))
            .expect("helm ran");
    }

    #[test]
    fn ordered_queue_walks_slot_states() {
        let mock = StatefulExecMock::new();
        mock.expect(InvocationMatcher::command("helm").args_prefix(["lint"]), ExecResult::success())
            .expect(InvocationMatcher::command("helm").args_prefix(["package"]), ExecResult::success());
        assert_eq!(mock.slot_states(), vec![SlotState::Pending, SlotState::Pending]);

        mock.inner().exec(&request("helm", &["lint", "chart"])).expect("lint");
        assert_eq!(mock.slot_states(), vec![SlotState::Consumed, SlotState::Pending]);
        assert_eq!(mock.remaining(), vec!["#2 `helm package ...`".to_string()]);

        mock.inner().exec(&request("helm", &["package", "chart"])).expect("package");
        mock.verify().expect("verify");
    }

    #[test]
    fn out_of_order_invocation_reports_expected_and_actual() {
        let mock = StatefulExecMock::new();
        mock.expect(InvocationMatcher::command("helm"), ExecResult::success())
            .expect(InvocationMatcher::command("kubectl"), ExecResult::success());

        let err = mock.inner().exec(&request("kubectl", &["apply"])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "unexpected invocation at position 1: expected `helm`, got `kubectl apply` (in /work)"
        );
        // A mismatch does not advance the cursor.
        assert_eq!(mock.slot_states(), vec![SlotState::Pending, SlotState::Pending]);
        assert!(matches!(mock.verify(), Err(MockError::Mismatch { position: 1, .. })));
    }

    #[test]
    fn invocation_past_the_queue_is_exhausted() {
        let mock = StatefulExecMock::new();
        mock.expect(InvocationMatcher::command("helm"), ExecResult::success());
        mock.inner().exec(&request("helm", &["lint"])).expect("lint");

        let err = mock.inner().exec(&request("helm", &["lint"])).unwrap_err();
        assert!(err.to_string().contains("all 1 expectation(s) already consumed"));
    }

    #[test]
    fn leftover_slots_are_unfulfilled() {
        let mock = StatefulExecMock::new();
        mock.expect(InvocationMatcher::command("helm"), ExecResult::success())
            .expect(InvocationMatcher::command("kubectl").args(["apply"]), ExecResult::success());
        mock.inner().exec(&request("helm", &[])).expect("helm");

        let err = mock.verify().unwrap_err();
        assert_eq!(err.to_string(), "unfulfilled expectations: #2 `kubectl apply`");
    }

    #[test]
    fn switching_modes_keeps_registered_expectations() {
        let mock = ExecMock::new();
        mock.expect(InvocationMatcher::command("helm"), ExecResult::failure(3));
        let ordered = mock.with_stateful_verification();
        ordered.expect(InvocationMatcher::command("kubectl"), ExecResult::success());

        let first = ordered.inner().exec(&request("helm", &[])).expect("helm");
        assert_eq!(first.exit_code, 3);
        assert_eq!(ordered.remaining(), vec!["#2 `kubectl`".to_string()]);
    }

    #[test]
    fn second_install_on_a_project_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut project = Project::open("demo", temp.path());
        let stateless = ExecMock::new();
        stateless.install(&mut project).expect("first install");
        assert_eq!(project.executor().backend(), "mock");

        let err = StatefulExecMock::new().install(&mut project).unwrap_err();
        assert!(err.to_string().contains("already installed"));
    }
}
