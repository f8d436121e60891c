//! Error type of the crate and helpers to decorate errors with context.

use std::fmt::Debug;
pub mod error;
pub mod result;

/// Wraps an error with the `Debug` dump of the object that was being worked on
/// and the name of the failing operation.
pub trait WithDebugObjectAndFnName<S: Into<String>, O: Debug + 'static> {
    fn with_debug_object_and_fn_name(self, obj: O, fn_name: S) -> Self;
}

/// Wraps an error with a human readable message.
pub trait WithMsg<S: Into<String>> {
    fn with_msg(self, msg: S) -> Self;
}
