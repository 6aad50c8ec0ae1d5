//! Archival candidates and the analyzers that produce them.

use std::fmt;
use std::str::FromStr;

use playbook_merge::KnowledgeBullet;
use serde::{Deserialize, Serialize};

/// Why a bullet should leave the active playbook.
///
/// Declaration order is archival priority: `HighHarmful` goes first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArchivalReason {
    HighHarmful,
    LowSignal,
    ZeroHelpful,
}

impl ArchivalReason {
    /// 0 is the most urgent.
    pub fn rank(self) -> u8 {
        match self {
            Self::HighHarmful => 0,
            Self::LowSignal => 1,
            Self::ZeroHelpful => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::HighHarmful => "high-harmful",
            Self::LowSignal => "low-signal",
            Self::ZeroHelpful => "zero-helpful",
        }
    }
}

impl fmt::Display for ArchivalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArchivalReason {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "high-harmful" => Ok(Self::HighHarmful),
            "low-signal" => Ok(Self::LowSignal),
            "zero-helpful" => Ok(Self::ZeroHelpful),
            other => Err(format!("unknown archival reason: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivalCandidate {
    pub bullet: KnowledgeBullet,
    pub reason: ArchivalReason,
}

impl ArchivalCandidate {
    pub fn new(bullet: KnowledgeBullet, reason: ArchivalReason) -> Self {
        Self { bullet, reason }
    }
}

/// Source of archival candidates for the current bullet set.
pub trait SignalAnalyzer {
    fn candidates(&self, bullets: &[KnowledgeBullet]) -> Vec<ArchivalCandidate>;
}

impl<F> SignalAnalyzer for F
where
    F: Fn(&[KnowledgeBullet]) -> Vec<ArchivalCandidate>,
{
    fn candidates(&self, bullets: &[KnowledgeBullet]) -> Vec<ArchivalCandidate> {
        self(bullets)
    }
}

/// Counter-only analyzer for callers without an external signal source.
///
/// * `high-harmful`: `harmful > 0` and `harmful * 2 >= helpful`
/// * `zero-helpful`: `helpful == 0`
/// * `low-signal`: `helpful + harmful <= low_signal_max_total`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSignalAnalyzer {
    pub low_signal_max_total: u32,
}

impl Default for CounterSignalAnalyzer {
    fn default() -> Self {
        Self {
            low_signal_max_total: 2,
        }
    }
}

impl CounterSignalAnalyzer {
    pub fn classify(&self, bullet: &KnowledgeBullet) -> Option<ArchivalReason> {
        let (helpful, harmful) = (u64::from(bullet.helpful), u64::from(bullet.harmful));
        if harmful > 0 && harmful * 2 >= helpful {
            Some(ArchivalReason::HighHarmful)
        } else if helpful == 0 {
            Some(ArchivalReason::ZeroHelpful)
        } else if helpful + harmful <= u64::from(self.low_signal_max_total) {
            Some(ArchivalReason::LowSignal)
        } else {
            None
        }
    }
}

impl SignalAnalyzer for CounterSignalAnalyzer {
    fn candidates(&self, bullets: &[KnowledgeBullet]) -> Vec<ArchivalCandidate> {
        bullets
            .iter()
            .filter_map(|b| {
                self.classify(b)
                    .map(|reason| ArchivalCandidate::new(b.clone(), reason))
            })
            .collect()
    }
}
