//! Stagnation detection over step fingerprints.
//!
//! Each dispatched call produces a fingerprint of its tool name and literal
//! result. When the last K fingerprints are identical the attempt is making
//! no progress and is aborted. Differing results, even differing errors,
//! never trigger it.

use sha2::{Digest, Sha256};
use std::collections::VecDeque;

/// SHA-256 (hex) over the tool name and the literal result text.
pub fn fingerprint(tool: &str, result: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(tool.as_bytes());
    hasher.update([0u8]);
    hasher.update(result.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone)]
pub struct StagnationDetector {
    window: usize,
    recent: VecDeque<String>,
}

impl StagnationDetector {
    /// `window` is K. Values below 2 are raised to 2; one observation can't repeat.
    pub fn new(window: usize) -> Self {
        let window = window.max(2);
        Self {
            window,
            recent: VecDeque::with_capacity(window),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Record a fingerprint. Returns true once the last K are identical.
    pub fn record(&mut self, fingerprint: String) -> bool {
        if self.recent.len() == self.window {
            self.recent.pop_front();
        }
        self.recent.push_back(fingerprint);
        self.is_stagnant()
    }

    pub fn is_stagnant(&self) -> bool {
        self.recent.len() == self.window
            && self.recent.iter().all(|fp| Some(fp) == self.recent.front())
    }

    /// Fingerprints currently in the window, oldest first.
    pub fn recent(&self) -> impl Iterator<Item = &str> {
        self.recent.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_depends_on_tool_and_result() {
        assert_eq!(fingerprint("shell", "x"), fingerprint("shell", "x"));
        assert_ne!(fingerprint("shell", "x"), fingerprint("file_read", "x"));
        assert_ne!(fingerprint("shell", "x"), fingerprint("shell", "y"));
        assert_eq!(fingerprint("a", "bc").len(), 64);
    }

    #[test]
    fn triggers_on_kth_identical() {
        let mut detector = StagnationDetector::new(3);
        let fp = fingerprint("shell", "permission denied");
        assert!(!detector.record(fp.clone()));
        assert!(!detector.record(fp.clone()));
        assert!(detector.record(fp));
    }

    #[test]
    fn differing_errors_do_not_trigger() {
        let mut detector = StagnationDetector::new(3);
        for i in 0..10 {
            assert!(!detector.record(fingerprint("shell", &format!("Error: attempt {i}"))));
        }
    }

    #[test]
    fn a_different_step_resets_the_run() {
        let mut detector = StagnationDetector::new(3);
        let same = fingerprint("shell", "denied");
        detector.record(same.clone());
        detector.record(same.clone());
        detector.record(fingerprint("shell", "ok"));
        assert!(!detector.record(same.clone()));
        assert!(!detector.record(same.clone()));
        assert!(detector.record(same));
    }

    #[test]
    fn window_floor_is_two() {
        let mut detector = StagnationDetector::new(0);
        assert_eq!(detector.window(), 2);
        assert!(!detector.record("a".into()));
        assert!(detector.record("a".into()));
    }
}
