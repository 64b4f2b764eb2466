//! Section profiler
//!
//! Wall-clock timing of the scheduler's hot sections. Disabled profilers
//! never read the clock. With `basic` detail only the batch-level sections
//! are timed; `detailed` also times the per-item sections, which costs one
//! clock read pair per item.

use crate::config::{ProfilingConfig, ProfilingDetail};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

/// Timed section of the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Section {
    BatchProcessing,
    ProducerProcessing,
    ConsumerProcessing,
    TransitionAttempts,
    ReservationOperations,
    MutationOperations,
}

impl Section {
    pub const ALL: [Section; 6] = [
        Section::BatchProcessing,
        Section::ProducerProcessing,
        Section::ConsumerProcessing,
        Section::TransitionAttempts,
        Section::ReservationOperations,
        Section::MutationOperations,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Section::BatchProcessing => "batch_processing",
            Section::ProducerProcessing => "producer_processing",
            Section::ConsumerProcessing => "consumer_processing",
            Section::TransitionAttempts => "transition_attempts",
            Section::ReservationOperations => "reservation_operations",
            Section::MutationOperations => "mutation_operations",
        }
    }

    /// Timed even at `basic` detail
    pub fn is_batch_level(self) -> bool {
        matches!(
            self,
            Section::BatchProcessing | Section::MutationOperations
        )
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Accumulated timings for one section
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SectionStats {
    pub count: u64,
    pub total_micros: u64,
    pub max_micros: u64,
    pub last_micros: u64,
}

impl SectionStats {
    pub fn mean_micros(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total_micros as f64 / self.count as f64
        }
    }

    fn record(&mut self, elapsed: Duration) {
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.count += 1;
        self.total_micros = self.total_micros.saturating_add(micros);
        self.max_micros = self.max_micros.max(micros);
        self.last_micros = micros;
    }
}

/// Snapshot of all sections that were hit at least once
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProfileReport {
    pub sections: BTreeMap<String, SectionStats>,
}

/// Section timer owned by the scheduler
#[derive(Debug, Clone)]
pub struct Profiler {
    enabled: bool,
    detail: ProfilingDetail,
    report_every_ticks: u64,
    sections: [SectionStats; 6],
}

impl Profiler {
    pub fn new(config: &ProfilingConfig) -> Self {
        Self {
            enabled: config.enabled,
            detail: config.detail,
            report_every_ticks: config.report_every_ticks,
            sections: [SectionStats::default(); 6],
        }
    }

    pub fn disabled() -> Self {
        Self::new(&ProfilingConfig::default())
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn times(&self, section: Section) -> bool {
        self.enabled && (section.is_batch_level() || self.detail == ProfilingDetail::Detailed)
    }

    /// Start timing `section`; `None` when the section is not profiled
    pub fn start(&self, section: Section) -> Option<Instant> {
        self.times(section).then(Instant::now)
    }

    /// Close a measurement opened with [`start`](Self::start)
    pub fn finish(&mut self, section: Section, started: Option<Instant>) {
        if let Some(started) = started {
            self.record(section, started.elapsed());
        }
    }

    /// Record an externally measured duration
    pub fn record(&mut self, section: Section, elapsed: Duration) {
        if self.times(section) {
            self.sections[section.index()].record(elapsed);
        }
    }

    pub fn stats(&self, section: Section) -> SectionStats {
        self.sections[section.index()]
    }

    /// True when a periodic report is due on `tick`
    pub fn report_due(&self, tick: u64) -> bool {
        self.enabled && self.report_every_ticks > 0 && tick > 0 && tick % self.report_every_ticks == 0
    }

    pub fn report(&self) -> ProfileReport {
        let sections = Section::ALL
            .iter()
            .filter(|s| self.sections[s.index()].count > 0)
            .map(|s| (s.name().to_string(), self.sections[s.index()]))
            .collect();
        ProfileReport { sections }
    }

    /// Emit the current report through `tracing`
    pub fn log_report(&self, tick: u64) {
        for section in Section::ALL {
            let stats = self.sections[section.index()];
            if stats.count == 0 {
                continue;
            }
            tracing::info!(
                tick,
                section = section.name(),
                count = stats.count,
                total_us = stats.total_micros,
                mean_us = stats.mean_micros(),
                max_us = stats.max_micros,
                "profile"
            );
        }
    }

    pub fn reset(&mut self) {
        self.sections = [SectionStats::default(); 6];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profiler(enabled: bool, detail: ProfilingDetail) -> Profiler {
        Profiler::new(&ProfilingConfig {
            enabled,
            detail,
            report_every_ticks: 100,
        })
    }

    #[test]
    fn test_disabled_profiler_records_nothing() {
        let mut p = profiler(false, ProfilingDetail::Detailed);
        assert!(p.start(Section::BatchProcessing).is_none());
        p.record(Section::BatchProcessing, Duration::from_micros(5));
        assert!(p.report().sections.is_empty());
        assert!(!p.report_due(100));
    }

    #[test]
    fn test_basic_detail_skips_per_item_sections() {
        let mut p = profiler(true, ProfilingDetail::Basic);
        p.record(Section::BatchProcessing, Duration::from_micros(10));
        p.record(Section::ProducerProcessing, Duration::from_micros(10));
        let report = p.report();
        assert!(report.sections.contains_key("batch_processing"));
        assert!(!report.sections.contains_key("producer_processing"));
    }

    #[test]
    fn test_stats_accumulate_and_reset() {
        let mut p = profiler(true, ProfilingDetail::Detailed);
        p.record(Section::TransitionAttempts, Duration::from_micros(10));
        p.record(Section::TransitionAttempts, Duration::from_micros(30));

        let stats = p.stats(Section::TransitionAttempts);
        assert_eq!(stats.count, 2);
        assert_eq!(stats.total_micros, 40);
        assert_eq!(stats.max_micros, 30);
        assert_eq!(stats.last_micros, 30);
        assert_eq!(stats.mean_micros(), 20.0);

        p.reset();
        assert_eq!(p.stats(Section::TransitionAttempts).count, 0);
    }

    #[test]
    fn test_report_due_every_period() {
        let p = profiler(true, ProfilingDetail::Basic);
        assert!(!p.report_due(0));
        assert!(!p.report_due(99));
        assert!(p.report_due(200));
    }
}
