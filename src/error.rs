//! Device-level errors.
//!
//! Everything else in the crate is reported through `anyhow`. A `DeviceError`
//! is kept distinct so the binary can describe the failed device call the way
//! camera SDKs usually do: the operation, its arguments and the message.

use thiserror::Error;

/// A failed call into a frame source backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("device error calling {function}({args}): {message}")]
pub struct DeviceError {
    /// Name of the backend operation that failed (e.g. `wait_for_frames`).
    pub function: String,
    /// Rendered arguments of the failed call.
    pub args: String,
    pub message: String,
}

impl DeviceError {
    pub fn new(
        function: impl Into<String>,
        args: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            function: function.into(),
            args: args.into(),
            message: message.into(),
        }
    }

    /// Multi-line console description used by the binary on fatal exit.
    pub fn describe(&self) -> String {
        format!(
            "device error calling {}({}):\n    {}",
            self.function, self.args, self.message
        )
    }
}
