// profiler.rs
// Scoped section timing, active only with the `profiling` feature

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Accumulated timing of one named section.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SectionStats {
    pub total: Duration,
    pub calls: u64,
    pub longest: Duration,
}

impl SectionStats {
    pub fn mean(&self) -> Duration {
        if self.calls == 0 {
            Duration::ZERO
        } else {
            self.total / self.calls as u32
        }
    }
}

/// Cumulative time per section. Sections nest freely; each guard only
/// accounts for its own scope.
#[derive(Debug, Default)]
pub struct Profiler {
    sections: BTreeMap<&'static str, SectionStats>,
}

impl Profiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, name: &'static str, elapsed: Duration) {
        let s = self.sections.entry(name).or_default();
        s.total += elapsed;
        s.calls += 1;
        s.longest = s.longest.max(elapsed);
    }

    pub fn section(&self, name: &str) -> Option<SectionStats> {
        self.sections.get(name).copied()
    }

    /// Sections by decreasing total time.
    pub fn report_sorted(&self) -> Vec<(&'static str, SectionStats)> {
        let mut v: Vec<_> = self.sections.iter().map(|(n, s)| (*n, *s)).collect();
        v.sort_by(|a, b| b.1.total.cmp(&a.1.total));
        v
    }

    pub fn clear(&mut self) {
        self.sections.clear();
    }

    /// Emit the report at info level and start over.
    pub fn log_and_clear(&mut self) {
        for (name, s) in self.report_sorted() {
            log::info!(
                "{:<20} total {:>12?}  calls {:>8}  mean {:>10?}  max {:>10?}",
                name,
                s.total,
                s.calls,
                s.mean(),
                s.longest
            );
        }
        self.clear();
    }
}

pub struct ProfilerGuard {
    name: &'static str,
    start: Instant,
}

/// Start a section; the guard records it into the global profiler when dropped.
pub fn start(name: &'static str) -> ProfilerGuard {
    ProfilerGuard { name, start: Instant::now() }
}

#[cfg(feature = "profiling")]
impl Drop for ProfilerGuard {
    fn drop(&mut self) {
        crate::PROFILER.lock().record(self.name, self.start.elapsed());
    }
}

/// Time the enclosing scope when the `profiling` feature is enabled.
#[macro_export]
macro_rules! profile_scope {
    ($name:expr) => {
        #[cfg(feature = "profiling")]
        let _guard = $crate::profiler::start($name);
    };
}
