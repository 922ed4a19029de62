//! Process-group signaling.

/// SIGTERM, expressed numerically so the API is identical off Unix.
pub const SIG_TERM: i32 = 15;
/// SIGKILL.
pub const SIG_KILL: i32 = 9;

/// Send a signal to an entire process group.
#[cfg(unix)]
pub fn kill_process_group(pgid: i32, sig: i32) {
    let signal = match sig {
        SIG_KILL => libc::SIGKILL,
        _ => libc::SIGTERM,
    };
    // Negative PID targets the group.
    unsafe {
        libc::kill(-pgid, signal);
    }
}

/// No process groups here; nothing to do.
#[cfg(not(unix))]
pub fn kill_process_group(_pgid: i32, _sig: i32) {}
