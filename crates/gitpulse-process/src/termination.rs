//! Deciding whether a process was forcefully killed.
//!
//! There is no portable way to ask this, so there are two implementations
//! picked by target platform.

use std::process::ExitStatus;

/// Returns true only when `status` says the process died from the
/// non-catchable kill signal. `None` (no status) is never a kill.
#[cfg(unix)]
pub fn was_killed(status: Option<&ExitStatus>) -> bool {
    use std::os::unix::process::ExitStatusExt;

    const SIGKILL: i32 = 9;

    status.and_then(|s| s.signal()) == Some(SIGKILL)
}

/// Text the platform's exit status renders for a process terminated with the
/// 128+SIGKILL convention (container runtimes, POSIX emulation layers).
pub const KILLED_STATUS_TEXT: &str = "exit code: 137";

/// Exact match against [`KILLED_STATUS_TEXT`], false for anything else.
/// If a runtime ever renders a kill differently this degrades to
/// always-false rather than reporting failures as kills.
pub fn is_killed_text(text: &str) -> bool {
    text == KILLED_STATUS_TEXT
}

#[cfg(not(unix))]
pub fn was_killed(status: Option<&ExitStatus>) -> bool {
    status.is_some_and(|s| is_killed_text(&s.to_string()))
}

#[cfg(test)]
mod text_tests {
    use super::*;

    #[test]
    fn test_exact_kill_text_matches() {
        assert!(is_killed_text("exit code: 137"));
    }

    #[test]
    fn test_near_miss_texts_do_not_match() {
        for text in ["exit code: 1370", "exit code: 1", "exit code: 13", " exit code: 137", ""] {
            assert!(!is_killed_text(text), "{text:?}");
        }
    }
}
