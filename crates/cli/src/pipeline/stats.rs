//! Pipeline statistics and run summary.

use std::time::Duration;

use coinc_engine::FlushReport;
use contracts::{QueueDiagnostics, StreamType};
use dispatcher::DispatchReport;
use observability::EmissionAggregator;

/// Statistics from a pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Records read from the input source
    pub records_received: u64,

    /// Records decoded into events
    pub records_decoded: u64,

    /// Records skipped because they could not be decoded
    pub decode_errors: u64,

    /// Records released by the merge stage and pushed into the matcher
    pub records_merged: u64,

    /// Records released after a later record of the other stream
    pub out_of_order: u64,

    /// TSC records that carried cross-clock timestamps
    pub cross_clock_records: u64,

    /// Whether the run stopped at `--max-records`
    pub truncated: bool,

    /// Total duration of the pipeline run
    pub duration: Duration,

    /// Number of sinks that received data
    pub active_sinks: usize,

    /// Matcher bookkeeping at the end of the run
    pub diagnostics: QueueDiagnostics,

    /// End-of-run drain
    pub flush: FlushReport,

    /// Emission aggregates
    pub emissions: EmissionAggregator,

    /// Dispatcher totals
    pub dispatch: DispatchReport,
}

impl PipelineStats {
    /// Merged records per wall-clock second
    pub fn records_per_sec(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.records_merged as f64 / secs
        } else {
            0.0
        }
    }

    /// Pushed events not accounted for by an emission or a counted discard
    ///
    /// Zero for every completed run.
    pub fn unaccounted(&self) -> u64 {
        let d = &self.diagnostics;
        d.pushed
            .saturating_sub(d.emitted_events())
            .saturating_sub(d.duplicates)
            .saturating_sub(d.rejected)
            .saturating_sub(d.discarded)
            .saturating_sub(2 * d.inconsistencies)
    }

    /// Print detailed summary
    pub fn print_summary(&self, clock_frequency_mhz: f64) {
        let d = &self.diagnostics;

        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                    Run Statistics                            ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        println!("📊 Overview");
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Records received: {}", self.records_received);
        println!("   ├─ Records decoded: {}", self.records_decoded);
        println!("   ├─ Decode errors: {}", self.decode_errors);
        println!("   ├─ Records merged: {}", self.records_merged);
        println!("   ├─ Out-of-order releases: {}", self.out_of_order);
        println!("   ├─ Throughput: {:.0} records/s", self.records_per_sec());
        println!("   └─ Active sinks: {}", self.active_sinks);

        println!("\n📈 Matcher");
        println!("   ├─ Coincidences: {}", d.coincidences);
        for stream in StreamType::ALL {
            println!(
                "   ├─ {} singles: {} ({:.1} Hz)",
                stream,
                d.singles_for(stream),
                d.singles_rate_hz(stream, clock_frequency_mhz)
            );
        }
        println!(
            "   ├─ Coincidence rate: {:.1} Hz",
            d.coincidence_rate_hz(clock_frequency_mhz)
        );
        println!("   ├─ Duplicates: {}", d.duplicates);
        println!("   ├─ Forced evictions: {}", d.forced_evictions);
        println!("   ├─ Rejected: {}", d.rejected);
        println!("   ├─ Inconsistencies: {}", d.inconsistencies);
        println!("   ├─ Cross-clock records: {}", self.cross_clock_records);
        println!(
            "   └─ Flush: {} flushed, {} discarded{}",
            self.flush.flushed,
            self.flush.discarded,
            if self.flush.timed_out { " (timed out)" } else { "" }
        );

        let summary = self.emissions.summary();
        println!("\n📤 Output");
        println!("   ├─ Emissions dispatched: {}", self.dispatch.received);
        println!("   ├─ Time diff (ticks): {}", summary.time_diff_ticks);
        println!("   └─ Coincident fraction: {:.2}%", summary.coincidence_fraction);

        for (name, snapshot) in &self.dispatch.sinks {
            println!(
                "      • {}: {} written, {} failed, {} dropped",
                name, snapshot.write_count, snapshot.failure_count, snapshot.dropped_count
            );
        }

        if self.truncated {
            println!("\n⚠️  Stopped at --max-records");
        }
        if self.unaccounted() > 0 {
            println!("\n⚠️  {} events unaccounted for", self.unaccounted());
        }

        println!();
    }
}
