//! # Cached process-wide flags.
//!
//! [`CachedFlag`] evaluates a boolean probe once (for example "is this host
//! inside a particular environment") and serves the answer from memory after
//! that. With [`CachedFlag::persisted`] the answer is also written to a file
//! and read back on the next process start, so the probe runs once per machine.
//!
//! ```text
//! get() ──► in memory? ──yes──► value
//!               │ no
//!               ▼
//!         file present and parseable? ──yes──► value (cached)
//!               │ no
//!               ▼
//!         probe() ──► write file (best effort) ──► value (cached)
//! ```
//!
//! The flag is read-only after the first call; there is no invalidation.
//!
//! ## Example
//! ```rust
//! use fanvisor::CachedFlag;
//!
//! fn detect_cloud() -> bool {
//!     std::env::var_os("CLOUD_REGION").is_some()
//! }
//!
//! static IN_CLOUD: CachedFlag = CachedFlag::new(detect_cloud);
//!
//! let first = IN_CLOUD.get();
//! assert_eq!(IN_CLOUD.get(), first);
//! ```

use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

use tracing::{debug, warn};

/// Boolean computed on first use and memoized.
pub struct CachedFlag {
    probe: fn() -> bool,
    path: Option<fn() -> PathBuf>,
    value: OnceLock<bool>,
}

impl CachedFlag {
    /// A flag cached in memory only.
    pub const fn new(probe: fn() -> bool) -> Self {
        Self {
            probe,
            path: None,
            value: OnceLock::new(),
        }
    }

    /// A flag that is also memoized in the file returned by `path`.
    pub const fn persisted(probe: fn() -> bool, path: fn() -> PathBuf) -> Self {
        Self {
            probe,
            path: Some(path),
            value: OnceLock::new(),
        }
    }

    /// Returns the flag, computing it on the first call.
    pub fn get(&self) -> bool {
        *self.value.get_or_init(|| self.load())
    }

    fn load(&self) -> bool {
        let Some(path) = self.path.map(|p| p()) else {
            return (self.probe)();
        };

        match fs::read_to_string(&path).map(|s| s.trim().parse::<bool>()) {
            Ok(Ok(value)) => {
                debug!(path = %path.display(), value, "cached flag loaded");
                return value;
            }
            Ok(Err(_)) => warn!(path = %path.display(), "ignoring unreadable cached flag"),
            Err(_) => {}
        }

        let value = (self.probe)();
        if let Err(e) = fs::write(&path, value.to_string()) {
            warn!(path = %path.display(), error = %e, "failed to persist cached flag");
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static PROBES: AtomicUsize = AtomicUsize::new(0);

    fn counting_probe() -> bool {
        PROBES.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn flag_path() -> PathBuf {
        std::env::temp_dir().join(format!("fanvisor-flag-{}", std::process::id()))
    }

    fn stale_path() -> PathBuf {
        std::env::temp_dir().join(format!("fanvisor-flag-stale-{}", std::process::id()))
    }

    #[test]
    fn probe_runs_once() {
        let flag = CachedFlag::new(counting_probe);
        let before = PROBES.load(Ordering::SeqCst);
        assert!(flag.get());
        assert!(flag.get());
        assert_eq!(PROBES.load(Ordering::SeqCst) - before, 1);
    }

    #[test]
    fn persisted_value_is_written_and_reused() {
        let path = flag_path();
        let _ = fs::remove_file(&path);

        let first = CachedFlag::persisted(|| false, flag_path);
        assert!(!first.get());
        assert_eq!(fs::read_to_string(&path).expect("flag file"), "false");

        // A fresh flag trusts the file over its own probe.
        let second = CachedFlag::persisted(|| true, flag_path);
        assert!(!second.get());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn garbage_file_is_recomputed() {
        let path = stale_path();
        fs::write(&path, "maybe").expect("write");

        let flag = CachedFlag::persisted(|| true, stale_path);
        assert!(flag.get());
        assert_eq!(fs::read_to_string(&path).expect("flag file"), "true");
        let _ = fs::remove_file(&path);
    }
}
