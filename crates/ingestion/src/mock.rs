//! Mock 数据流源
//!
//! 生成两条带符合事件的模拟触发流，用于无硬件环境的测试与演示。

use bytes::Bytes;
use contracts::{RawRecord, StreamType};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::tsc::{encode_tsc, TscRole, KNOWN_TSC_VERSIONS};

/// Mock 数据流源配置
#[derive(Debug, Clone)]
pub struct MockStreamConfig {
    /// 每条流的基准事件数 (gamma 流)
    pub records: usize,

    /// 相邻 gamma 事件的平均间隔 (ticks)
    pub mean_interval_ticks: u64,

    /// gamma 事件带有 heavy-ion 伙伴的概率
    pub coincidence_probability: f64,

    /// 伙伴事件的最大时间偏移 (ticks, 不含)
    pub max_jitter_ticks: u64,

    /// 额外独立 heavy-ion 事件的比例
    pub heavy_ion_singles_ratio: f64,

    /// 计数器起始值，接近 u32::MAX 时可测试回绕
    pub start_counter: u32,

    /// 负载字节数
    pub payload_size: usize,

    /// 使用 TSC 字列表代替 32 位计数器
    pub use_tsc: bool,

    /// 随机种子
    pub seed: u64,
}

impl Default for MockStreamConfig {
    fn default() -> Self {
        Self {
            records: 1000,
            mean_interval_ticks: 1000,
            coincidence_probability: 0.3,
            max_jitter_ticks: 5,
            heavy_ion_singles_ratio: 0.5,
            start_counter: 0,
            payload_size: 16,
            use_tsc: false,
            seed: 0x5eed,
        }
    }
}

/// 生成结果
#[derive(Debug, Clone, Default)]
pub struct MockRun {
    /// gamma 流记录 (按时间排序)
    pub gamma: Vec<RawRecord>,

    /// heavy-ion 流记录 (按时间排序)
    pub heavy_ion: Vec<RawRecord>,

    /// 人为植入的符合事件数
    pub planted_coincidences: usize,
}

impl MockRun {
    /// 记录总数
    pub fn total_records(&self) -> usize {
        self.gamma.len() + self.heavy_ion.len()
    }

    /// 取出指定流的记录
    pub fn records(&self, stream: StreamType) -> &[RawRecord] {
        match stream {
            StreamType::Gamma => &self.gamma,
            StreamType::HeavyIon => &self.heavy_ion,
        }
    }
}

/// Mock 数据流源
///
/// 相同配置 (含种子) 生成完全相同的记录。
#[derive(Debug, Clone)]
pub struct MockStreamSource {
    config: MockStreamConfig,
}

impl MockStreamSource {
    /// 创建新的 Mock 数据流源
    pub fn new(config: MockStreamConfig) -> Self {
        Self { config }
    }

    /// 以默认参数生成 `records` 个 gamma 事件
    pub fn with_records(records: usize, seed: u64) -> Self {
        Self::new(MockStreamConfig {
            records,
            seed,
            ..Default::default()
        })
    }

    pub fn config(&self) -> &MockStreamConfig {
        &self.config
    }

    /// 生成两条流的记录
    pub fn generate(&self) -> MockRun {
        let config = &self.config;
        let mut rng = StdRng::seed_from_u64(config.seed);
        let max_step = config.mean_interval_ticks.max(1) * 2;

        let mut gamma_ticks = Vec::with_capacity(config.records);
        let mut heavy_ion_ticks = Vec::new();
        let mut planted = 0;
        let mut t: u64 = 0;

        for _ in 0..config.records {
            t += rng.random_range(1..=max_step);
            gamma_ticks.push(t);

            if rng.random_bool(config.coincidence_probability.clamp(0.0, 1.0)) {
                let jitter = rng.random_range(0..config.max_jitter_ticks.max(1));
                heavy_ion_ticks.push(t + jitter);
                planted += 1;
            }
            if rng.random_bool(config.heavy_ion_singles_ratio.clamp(0.0, 1.0)) {
                heavy_ion_ticks.push(t + rng.random_range(1..=max_step));
            }
        }

        heavy_ion_ticks.sort_unstable();
        heavy_ion_ticks.dedup();

        let run = MockRun {
            gamma: self.to_records(StreamType::Gamma, &gamma_ticks),
            heavy_ion: self.to_records(StreamType::HeavyIon, &heavy_ion_ticks),
            planted_coincidences: planted,
        };

        debug!(
            gamma = run.gamma.len(),
            heavy_ion = run.heavy_ion.len(),
            planted = run.planted_coincidences,
            seed = config.seed,
            "mock run generated"
        );
        run
    }

    fn to_records(&self, stream: StreamType, ticks: &[u64]) -> Vec<RawRecord> {
        let payload = Bytes::from(vec![stream.index() as u8; self.config.payload_size]);
        let start = u64::from(self.config.start_counter);

        ticks
            .iter()
            .enumerate()
            .map(|(idx, tick)| {
                let value = start + tick;
                let sequence_index = idx as u32;
                if self.config.use_tsc {
                    let words = encode_tsc(
                        KNOWN_TSC_VERSIONS[0],
                        false,
                        &[(value, TscRole::Trigger), (value / 2, TscRole::CrossClock)],
                    );
                    RawRecord::tsc(stream, sequence_index, words, payload.clone())
                } else {
                    // Counter wraps like the hardware one
                    RawRecord::counter(stream, sequence_index, value as u32, payload.clone())
                }
            })
            .collect()
    }
}
