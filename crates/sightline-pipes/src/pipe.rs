use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use log::warn;

/// Errors a stage may raise from [`Pipe::process`].
///
/// They never leave [`Pipe::apply`]: the stage logs them and yields its
/// empty output instead.
#[derive(thiserror::Error, Debug)]
pub enum PipeError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid parameters: {0}")]
    InvalidParams(String),
    #[error(transparent)]
    Pnp(#[from] sightline_core::PnpError),
}

/// Output of one stage plus the time it took.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PipeResult<T> {
    pub output: T,
    /// Monotonic wall time spent in `process`, never negative.
    pub elapsed_nanos: i64,
}

impl<T> PipeResult<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> PipeResult<U> {
        PipeResult {
            output: f(self.output),
            elapsed_nanos: self.elapsed_nanos,
        }
    }
}

/// One parameterised, timed transform stage.
///
/// Parameters are replaced wholesale through [`Pipe::set_params`] before a
/// run; `process` must give identical output for identical input and
/// parameters even when it reuses internal scratch buffers.
pub trait Pipe {
    type Input<'a>;
    type Output: Default;
    type Params: Clone + Default;

    /// Short stage name used in logs.
    fn name(&self) -> &'static str;

    fn params(&self) -> &Self::Params;

    fn set_params(&mut self, params: Self::Params);

    fn process(&mut self, input: Self::Input<'_>) -> Result<Self::Output, PipeError>;

    /// Run [`Pipe::process`] under a timer. Errors and panics raised by the
    /// stage or the primitives it calls are logged and replaced by the
    /// default (empty) output.
    fn apply(&mut self, input: Self::Input<'_>) -> PipeResult<Self::Output> {
        let start = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.process(input)));
        let output = match outcome {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                warn!("{} failed: {e}", self.name());
                Self::Output::default()
            }
            Err(payload) => {
                warn!("{} panicked: {}", self.name(), panic_message(&*payload));
                Self::Output::default()
            }
        };
        PipeResult {
            output,
            elapsed_nanos: i64::try_from(start.elapsed().as_nanos()).unwrap_or(i64::MAX),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
