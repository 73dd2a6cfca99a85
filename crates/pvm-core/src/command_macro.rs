//! Macros for reducing command boilerplate.

/// Auto-implement `serialize_to_json()` for commands that derive
/// `Serialize`. Use this inside a `Command` impl block as a one-liner
/// replacement for manual serialization code.
///
/// # Example
///
/// ```ignore
/// use pvm_core::{auto_serialize, Command, ExecutionMode, JobSpec};
/// use serde::Serialize;
///
/// #[derive(Debug, Clone, Serialize)]
/// struct EmitCompletionCommand {
///     job_id: uuid::Uuid,
/// }
///
/// impl Command for EmitCompletionCommand {
///     fn execution_mode(&self) -> ExecutionMode {
///         ExecutionMode::Inline
///     }
///
///     auto_serialize!();
/// }
/// ```
#[macro_export]
macro_rules! auto_serialize {
    () => {
        fn serialize_to_json(&self) -> Option<serde_json::Value> {
            serde_json::to_value(self).ok()
        }
    };
}
