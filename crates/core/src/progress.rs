// crates/core/src/progress.rs
//! Progress extraction from CodeQL `database analyze` output.
//!
//! CodeQL reports query loading as `[12/40] Loaded /path/Query.qlx.` and
//! evaluation as `[3/40 eval 1.2s] Evaluation done; writing results to ...`.
//! Each phase has its own pattern; the first pattern that matches a line wins.

use std::sync::OnceLock;

use regex_lite::Regex;
use serde::Serialize;

/// Analysis phase a progress line belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Loading,
    Evaluating,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Loading => "loading",
            Self::Evaluating => "evaluating",
        }
    }
}

/// A `[current/total]` fragment extracted from one output line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub phase: Phase,
    pub current: u64,
    /// Never zero: a reported total of 0 is replaced by 1.
    pub total: u64,
}

impl Progress {
    /// `current / total * 100`. Not clamped; a malformed line with
    /// `current > total` yields more than 100.
    pub fn percentage(&self) -> f32 {
        (self.current as f64 * 100.0 / self.total as f64) as f32
    }
}

fn patterns() -> &'static [(Phase, Regex)] {
    static PATTERNS: OnceLock<Vec<(Phase, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            (
                Phase::Loading,
                Regex::new(r"\[(\d+)/(\d+)\] Loaded").expect("valid loading pattern"),
            ),
            (
                Phase::Evaluating,
                Regex::new(r"\[(\d+)/(\d+) eval [^\]]*\]").expect("valid evaluating pattern"),
            ),
        ]
    })
}

/// Extract analysis progress from a single line of tool output.
pub fn extract_progress(line: &str) -> Option<Progress> {
    patterns().iter().find_map(|(phase, re)| {
        let caps = re.captures(line)?;
        let current: u64 = caps.get(1)?.as_str().parse().ok()?;
        let total: u64 = caps.get(2)?.as_str().parse().ok()?;
        Some(Progress {
            phase: *phase,
            current,
            total: total.max(1),
        })
    })
}
