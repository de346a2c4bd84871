use crate::invoker::Invoker;
use crate::BackendError;
use std::sync::Mutex;

/// A recorded invocation: executable plus its argument list.
pub type Invocation = (String, Vec<String>);

/// In-memory [`Invoker`] that records every call instead of running it.
///
/// Used in place of `ceph-fuse` in tests and local development. A failure
/// reason can be set to make subsequent calls fail like a non-zero exit.
#[derive(Debug, Default)]
pub struct MockInvoker {
    calls: Mutex<Vec<Invocation>>,
    failure: Mutex<Option<String>>,
}

impl MockInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(reason: &str) -> Self {
        let mock = Self::new();
        mock.set_failure(Some(reason));
        mock
    }

    pub fn set_failure(&self, reason: Option<&str>) {
        let mut failure = self
            .failure
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *failure = reason.map(str::to_owned);
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }
}

impl Invoker for MockInvoker {
    fn invoke(&self, executable: &str, args: &[String]) -> Result<(), BackendError> {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push((executable.to_owned(), args.to_vec()));

        let failure = self
            .failure
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();
        match failure {
            Some(reason) => Err(BackendError::CommandFailed {
                command: executable.to_owned(),
                reason,
            }),
            None => Ok(()),
        }
    }
}
