//! 匹配结果指标收集模块
//!
//! 基于 `Emission` 与 `QueueDiagnostics` 收集和统计符合匹配的运行指标。

use contracts::{Emission, QueueDiagnostics, StreamType};
use metrics::{counter, gauge, histogram};

/// 从一次输出记录指标
///
/// 每次匹配器产生 single 或 coincidence 时调用。
pub fn record_emission(emission: &Emission) {
    match emission {
        Emission::Coincidence(pair) => {
            counter!("tscoinc_emitted_coincidences_total").increment(1);
            histogram!("tscoinc_emitted_dt_ticks").record(pair.time_diff() as f64);
        }
        Emission::Single(event) => {
            counter!(
                "tscoinc_emitted_singles_total",
                "stream" => event.stream.as_str()
            )
            .increment(1);
        }
        Emission::Diagnostic(record) => {
            counter!(
                "tscoinc_emitted_cross_clock_records_total",
                "stream" => record.stream.as_str()
            )
            .increment(1);
        }
    }
}

/// 从匹配器诊断快照记录 gauge
pub fn record_diagnostics(diagnostics: &QueueDiagnostics) {
    gauge!("tscoinc_queue_size").set(diagnostics.size as f64);
    gauge!("tscoinc_queue_time_diff_ticks").set(diagnostics.time_diff as f64);
    gauge!("tscoinc_queue_pushed").set(diagnostics.pushed as f64);
    gauge!("tscoinc_queue_coincidences").set(diagnostics.coincidences as f64);
    for stream in StreamType::ALL {
        gauge!("tscoinc_queue_singles", "stream" => stream.as_str())
            .set(diagnostics.singles_for(stream) as f64);
    }
    gauge!("tscoinc_queue_duplicates").set(diagnostics.duplicates as f64);
    gauge!("tscoinc_queue_forced_evictions").set(diagnostics.forced_evictions as f64);
}

/// 输出指标聚合器
///
/// 在内存中聚合指标，便于统计和输出摘要。
#[derive(Debug, Clone, Default)]
pub struct EmissionAggregator {
    /// 符合事件数
    pub coincidences: u64,

    /// 各流 single 数 (按 `StreamType::index`)
    pub singles: [u64; 2],

    /// 符合时间差统计 (heavy-ion 减 gamma, ticks)
    pub dt_stats: RunningStats,

    /// 交叉时钟记录数
    pub cross_clock_records: u64,

    /// 负载字节统计
    pub payload_bytes: u64,

    /// 首个输出的时间戳
    pub first_timestamp: Option<u64>,

    /// 最后一个输出的时间戳
    pub last_timestamp: Option<u64>,
}

impl EmissionAggregator {
    /// 创建新的聚合器
    pub fn new() -> Self {
        Self::default()
    }

    /// 更新聚合统计
    pub fn update(&mut self, emission: &Emission) {
        match emission {
            Emission::Coincidence(pair) => {
                self.coincidences += 1;
                self.dt_stats.push(pair.time_diff() as f64);
                self.payload_bytes +=
                    (pair.gamma.payload.len() + pair.heavy_ion.payload.len()) as u64;
            }
            Emission::Single(event) => {
                self.singles[event.stream.index()] += 1;
                self.payload_bytes += event.payload.len() as u64;
            }
            Emission::Diagnostic(_) => {
                // 不是事件，不参与时间跨度
                self.cross_clock_records += 1;
                return;
            }
        }

        let ts = emission.timestamp();
        self.first_timestamp = Some(self.first_timestamp.map_or(ts, |t| t.min(ts)));
        self.last_timestamp = Some(self.last_timestamp.map_or(ts, |t| t.max(ts)));
    }

    /// 输出事件总数 (coincidence 计 2)
    pub fn total_events(&self) -> u64 {
        self.coincidences * 2 + self.singles.iter().sum::<u64>()
    }

    /// 生成摘要报告
    pub fn summary(&self) -> MetricsSummary {
        let total_events = self.total_events();
        MetricsSummary {
            coincidences: self.coincidences,
            gamma_singles: self.singles[StreamType::Gamma.index()],
            heavy_ion_singles: self.singles[StreamType::HeavyIon.index()],
            cross_clock_records: self.cross_clock_records,
            total_events,
            coincidence_fraction: if total_events > 0 {
                (self.coincidences * 2) as f64 / total_events as f64 * 100.0
            } else {
                0.0
            },
            payload_bytes: self.payload_bytes,
            span_ticks: match (self.first_timestamp, self.last_timestamp) {
                (Some(first), Some(last)) => last - first,
                _ => 0,
            },
            time_diff_ticks: StatsSummary::from(&self.dt_stats),
        }
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 指标摘要
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub coincidences: u64,
    pub gamma_singles: u64,
    pub heavy_ion_singles: u64,
    pub cross_clock_records: u64,
    pub total_events: u64,
    pub coincidence_fraction: f64,
    pub payload_bytes: u64,
    pub span_ticks: u64,
    pub time_diff_ticks: StatsSummary,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Coincidence Summary ===")?;
        writeln!(f, "Coincidences: {}", self.coincidences)?;
        writeln!(f, "Gamma singles: {}", self.gamma_singles)?;
        writeln!(f, "Heavy-ion singles: {}", self.heavy_ion_singles)?;
        writeln!(f, "Cross-clock records: {}", self.cross_clock_records)?;
        writeln!(
            f,
            "Events emitted: {} ({:.2}% in coincidence)",
            self.total_events, self.coincidence_fraction
        )?;
        writeln!(f, "Payload bytes: {}", self.payload_bytes)?;
        writeln!(f, "Span (ticks): {}", self.span_ticks)?;
        writeln!(f, "Time diff (ticks): {}", self.time_diff_ticks)?;
        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.1}, max={:.1}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
            return;
        }

        self.min = self.min.min(value);
        self.max = self.max.max(value);

        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 { 0.0 } else { self.mean }
    }

    /// 样本方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
