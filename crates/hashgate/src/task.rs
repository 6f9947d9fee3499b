//! Protected task contract.

/// Failure reported by a protected task.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct TaskFailure(String);

impl TaskFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

/// An opaque, fixed-cost unit of work with a verification counterpart.
///
/// Every invocation is assumed to cost roughly the same memory and CPU, which
/// is what makes a fixed numeric concurrency cap a valid memory budget.
/// Implementations run on worker threads and may block; they must eventually
/// return, since nothing times them out.
pub trait ProtectedTask: Send + Sync + 'static {
    type Input: Send + 'static;
    type Output: Send + 'static;

    /// Short name for logs and version info.
    fn name(&self) -> &'static str;

    fn run(&self, input: &Self::Input) -> Result<Self::Output, TaskFailure>;

    /// Check that `output` was produced by `run(input)`.
    fn verify(&self, output: &Self::Output, input: &Self::Input) -> Result<bool, TaskFailure>;
}
