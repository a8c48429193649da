//! Per-call execution mode selection.
//!
//! The decision is a pure predicate over two independent signals: whether
//! the session is a remote-session context, and whether the force-local
//! env var is set. Both are re-evaluated on every call because a process
//! may flip between modes between calls.

use crate::session::{FORCE_LOCAL_ENV, Session};

/// Where an operation executes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExecMode {
    /// Forward the call unchanged to the local execution engine.
    Local,
    /// Serialize the call into a command for the session service.
    Remote,
}

/// Selects the execution mode for one call.
pub fn select(session: &Session) -> ExecMode {
    if session.is_remote() && std::env::var_os(FORCE_LOCAL_ENV).is_none() {
        ExecMode::Remote
    } else {
        ExecMode::Local
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{MockEngine, MockTransport, session_lock};
    use std::sync::Arc;

    #[test]
    fn remote_session_selects_remote() {
        let _guard = session_lock();
        let session = Session::remote(MockTransport::new(), "2.5.0");
        assert_eq!(select(&session), ExecMode::Remote);
    }

    #[test]
    fn local_session_selects_local() {
        let _guard = session_lock();
        let session = Session::local(Arc::new(MockEngine::default()), "2.5.0");
        assert_eq!(select(&session), ExecMode::Local);
    }

    #[test]
    fn force_local_env_overrides_remote_session() {
        let _guard = session_lock();
        let session = Session::remote(MockTransport::new(), "2.5.0");
        unsafe { std::env::set_var(FORCE_LOCAL_ENV, "1") };
        let selected = select(&session);
        unsafe { std::env::remove_var(FORCE_LOCAL_ENV) };
        assert_eq!(selected, ExecMode::Local);
        // Re-evaluated per call: removing the flag flips the mode back.
        assert_eq!(select(&session), ExecMode::Remote);
    }
}
