//! Host-OS sample sources.
//!
//! Every reader here is synchronous and stateless. Readers that have more
//! than one way to obtain a value express the alternatives as an ordered
//! [`Strategy`] list; the first strategy returning `Some` wins and an
//! exhausted list yields the caller's zero value.

pub mod connections;
pub mod dir;
pub mod net;
pub mod process;

use tracing::trace;

/// One named way of reading a value.
pub struct Strategy<A: ?Sized, T> {
    /// Name for logs
    pub name: &'static str,
    /// Reader; `None` means "try the next one"
    pub read: fn(&A) -> Option<T>,
}

/// Try `strategies` in order and return the first success.
pub fn first_success<A: ?Sized, T>(arg: &A, strategies: &[Strategy<A, T>]) -> Option<T> {
    for strategy in strategies {
        if let Some(value) = (strategy.read)(arg) {
            trace!(strategy = strategy.name, "sample source strategy succeeded");
            return Some(value);
        }
    }
    trace!("all sample source strategies exhausted");
    None
}

/// Run an external command and return its stdout when it exits zero.
pub(crate) fn command_stdout(program: &str, args: &[&str]) -> Option<String> {
    let output = std::process::Command::new(program).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8(output.stdout).ok()
}
