//! Temporarily lowers the process file descriptor limit.
//!
//! The limit is process-wide, so only test binaries with a single test
//! should use it.

/// Restores the previous file descriptor limit when dropped.
#[cfg(unix)]
#[allow(dead_code)]
pub struct FdLimitGuard {
    soft: libc::rlim_t,
    hard: libc::rlim_t,
}

#[cfg(unix)]
impl Drop for FdLimitGuard {
    fn drop(&mut self) {
        let rlim = libc::rlimit {
            rlim_cur: self.soft,
            rlim_max: self.hard,
        };
        unsafe { libc::setrlimit(libc::RLIMIT_NOFILE, &rlim) };
    }
}

/// Lowers the soft `RLIMIT_NOFILE` to `limit` (capped at the hard limit).
///
/// Returns `None` when the limit cannot be read or changed; callers skip.
#[cfg(unix)]
#[allow(dead_code)]
pub fn lower_fd_limit(limit: u64) -> Option<FdLimitGuard> {
    let mut rlim = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    if unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut rlim) } != 0 {
        return None;
    }
    let guard = FdLimitGuard {
        soft: rlim.rlim_cur,
        hard: rlim.rlim_max,
    };
    rlim.rlim_cur = (limit as libc::rlim_t).min(rlim.rlim_max);
    if unsafe { libc::setrlimit(libc::RLIMIT_NOFILE, &rlim) } != 0 {
        return None;
    }
    Some(guard)
}

/// No limit change off Unix; tests that need one skip.
#[cfg(not(unix))]
#[allow(dead_code)]
pub fn lower_fd_limit(_limit: u64) -> Option<()> {
    None
}
