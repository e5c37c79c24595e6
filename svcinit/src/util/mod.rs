//! Small helpers shared across modules.

pub mod clock;

use std::process::ExitStatus;

/// Map a child exit status to the code this program should exit with.
///
/// Normal exits keep their code. Deaths by signal follow the shell
/// convention of `128 + signo`.
pub fn exit_code_of(status: &ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn test_exit_code_of_normal_exit() {
        use std::os::unix::process::ExitStatusExt;

        // Raw wait status: exit code lives in bits 8..16
        assert_eq!(exit_code_of(&ExitStatus::from_raw(0)), 0);
        assert_eq!(exit_code_of(&ExitStatus::from_raw(3 << 8)), 3);
    }

    #[cfg(unix)]
    #[test]
    fn test_exit_code_of_signal() {
        use std::os::unix::process::ExitStatusExt;

        // Killed by SIGTERM (15)
        assert_eq!(exit_code_of(&ExitStatus::from_raw(15)), 143);
    }
}
