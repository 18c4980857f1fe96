//! Per-operation bookkeeping: deadline, phase and capability requirements.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::classify::diagnose;
use crate::client::ApiError;
use crate::error::{OperationError, Step};
use crate::kinds::KindDescriptor;

/// Default budget for each of create, read, update and delete.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(180);
/// Default number of read-back attempts.
pub const DEFAULT_READ_BACK_ATTEMPTS: u32 = 3;
/// Default spacing unit between read-back attempts.
pub const DEFAULT_READ_BACK_BACKOFF: Duration = Duration::from_secs(1);
/// Stand-in deadline for budgets too large to add to the clock.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Which top-level operation a session belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Create => "create",
            Operation::Read => "read",
            Operation::Update => "update",
            Operation::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// Convergence state machine phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Start,
    Constructing,
    Writing,
    AssigningSubResources,
    ReadingBack,
    Converged,
    Failed,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Converged | Phase::Failed)
    }
}

/// Per-operation time budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub create: Duration,
    pub read: Duration,
    pub update: Duration,
    pub delete: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            create: DEFAULT_OPERATION_TIMEOUT,
            read: DEFAULT_OPERATION_TIMEOUT,
            update: DEFAULT_OPERATION_TIMEOUT,
            delete: DEFAULT_OPERATION_TIMEOUT,
        }
    }
}

impl Timeouts {
    pub fn uniform(timeout: Duration) -> Self {
        Self {
            create: timeout,
            read: timeout,
            update: timeout,
            delete: timeout,
        }
    }

    pub fn for_operation(&self, operation: Operation) -> Duration {
        match operation {
            Operation::Create => self.create,
            Operation::Read => self.read,
            Operation::Update => self.update,
            Operation::Delete => self.delete,
        }
    }
}

/// Bounded, linearly spaced retries for the read-back phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadBackPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for ReadBackPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_READ_BACK_ATTEMPTS,
            backoff: DEFAULT_READ_BACK_BACKOFF,
        }
    }
}

impl ReadBackPolicy {
    /// Delay before the given 1-based attempt: none before the first, then
    /// `backoff`, `2 * backoff`, ...
    pub fn delay_before(&self, attempt: u32) -> Duration {
        self.backoff
            .checked_mul(attempt.saturating_sub(1))
            .unwrap_or(Duration::MAX)
    }
}

/// State carried by one create/read/update/delete call.
#[derive(Debug)]
pub struct ConvergenceSession {
    operation: Operation,
    object_kind: &'static str,
    deadline: Instant,
    phase: Phase,
    read_permissions: Vec<String>,
    write_permissions: Vec<String>,
    read_back: ReadBackPolicy,
}

impl ConvergenceSession {
    pub fn new(
        operation: Operation,
        descriptor: &KindDescriptor,
        timeouts: &Timeouts,
        read_back: ReadBackPolicy,
    ) -> Self {
        Self {
            operation,
            object_kind: descriptor.name,
            deadline: after(timeouts.for_operation(operation)),
            phase: Phase::Start,
            read_permissions: descriptor.read_permissions.clone(),
            write_permissions: descriptor.write_permissions.clone(),
            read_back,
        }
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn object_kind(&self) -> &'static str {
        self.object_kind
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn read_back(&self) -> ReadBackPolicy {
        self.read_back
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    pub fn advance(&mut self, next: Phase) {
        log::debug!(
            "{} {}: {:?} -> {:?}",
            self.object_kind,
            self.operation,
            self.phase,
            next
        );
        self.phase = next;
    }

    /// Moves to `Failed` and hands the error back.
    pub fn fail(&mut self, err: OperationError) -> OperationError {
        log::debug!(
            "{} {} failed in {:?}: {}",
            self.object_kind,
            self.operation,
            self.phase,
            err
        );
        self.phase = Phase::Failed;
        err
    }

    /// Capabilities needed by a step.
    pub fn permissions_for(&self, step: Step) -> &[String] {
        match step {
            Step::Write | Step::Assign | Step::Delete => &self.write_permissions,
            Step::ReadBack | Step::Read | Step::Construct => &self.read_permissions,
        }
    }

    pub fn timeout_error(&self, step: Step) -> OperationError {
        OperationError::timeout(
            step,
            self.object_kind,
            format!("{} did not finish before its deadline", self.operation),
        )
    }

    /// Runs one remote call under the session deadline, classifying failures.
    pub async fn call<T, F>(&self, step: Step, call: F) -> Result<T, OperationError>
    where
        F: Future<Output = Result<T, ApiError>>,
    {
        match tokio::time::timeout_at(self.deadline, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(diagnose(&err, step, self.object_kind, self.permissions_for(step))),
            Err(_) => Err(self.timeout_error(step)),
        }
    }

    /// Sleeps, unless the deadline falls first.
    pub async fn pause(&self, step: Step, delay: Duration) -> Result<(), OperationError> {
        if after(delay) >= self.deadline {
            tokio::time::sleep_until(self.deadline).await;
            return Err(self.timeout_error(step));
        }
        tokio::time::sleep(delay).await;
        Ok(())
    }
}

/// `now + delay`, saturating at a far-future instant instead of overflowing.
fn after(delay: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(delay)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::ErrorKind;
    use crate::kinds::platform_script;

    #[test]
    fn test_read_back_delays_are_linear() {
        let policy = ReadBackPolicy {
            attempts: 4,
            backoff: Duration::from_millis(500),
        };
        assert_eq!(policy.delay_before(1), Duration::ZERO);
        assert_eq!(policy.delay_before(2), Duration::from_millis(500));
        assert_eq!(policy.delay_before(3), Duration::from_millis(1000));
        assert_eq!(policy.delay_before(4), Duration::from_millis(1500));
    }

    #[test]
    fn test_read_back_delay_saturates() {
        let policy = ReadBackPolicy {
            attempts: u32::MAX,
            backoff: Duration::MAX,
        };
        assert_eq!(policy.delay_before(3), Duration::MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_timeout_does_not_overflow_the_clock() {
        let session = ConvergenceSession::new(
            Operation::Create,
            &platform_script::descriptor(),
            &Timeouts::uniform(Duration::from_secs(u64::MAX)),
            ReadBackPolicy::default(),
        );
        assert!(!session.is_expired());
        assert!(session.deadline() > Instant::now() + Duration::from_secs(86_400 * 365));

        let value = session
            .call(Step::Write, async { Ok::<_, ApiError>(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn test_default_timeouts_are_three_minutes() {
        let timeouts = Timeouts::default();
        assert_eq!(timeouts.for_operation(Operation::Delete), Duration::from_secs(180));
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_times_out_at_deadline() {
        let session = ConvergenceSession::new(
            Operation::Create,
            &platform_script::descriptor(),
            &Timeouts::uniform(Duration::from_secs(5)),
            ReadBackPolicy::default(),
        );

        let err = session
            .call(Step::Write, async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, ApiError>(())
            })
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::Timeout);
        assert_eq!(err.step, Step::Write);
        assert!(session.is_expired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_attaches_write_permissions_on_denial() {
        let session = ConvergenceSession::new(
            Operation::Update,
            &platform_script::descriptor(),
            &Timeouts::default(),
            ReadBackPolicy::default(),
        );

        let err = session
            .call(Step::Assign, async { Err::<(), _>(ApiError::forbidden()) })
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::Permission);
        assert!(err
            .required_permissions
            .contains(&"DeviceManagementConfiguration.ReadWrite.All".to_string()));
    }

    #[test]
    fn test_terminal_phases() {
        assert!(Phase::Converged.is_terminal());
        assert!(Phase::Failed.is_terminal());
        assert!(!Phase::ReadingBack.is_terminal());
    }
}
