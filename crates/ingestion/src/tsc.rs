//! Timestamp-counter (TSC) record decoding.
//!
//! Word layout: `[version, write_timestamp, routing, sync_number, control,
//! (lower, upper) * n]`. The low 15 control bits give `n`, bit 15 flags a
//! counter FIFO overflow. Each pair packs a 62-bit value and a 2-bit role.

use crate::error::{IngestionError, Result};

/// Firmware revisions whose layout is known
pub const KNOWN_TSC_VERSIONS: [u32; 3] = [0x0112_0809, 0x0112_0810, 0x0112_0910];

const HEADER_WORDS: usize = 5;
const CHANNEL_MASK: u32 = 0x7FFF;
const OVERFLOW_BIT: u32 = 15;
const LOWER_MASK: u32 = 0x3FFF_FFFF;
const ROLE_SHIFT: u32 = 30;

/// Role of one decoded counter value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TscRole {
    CrossClock,
    Trigger,
    Sync,
    Unused,
}

impl TscRole {
    fn from_bits(bits: u32) -> Self {
        match bits & 0b11 {
            0 => TscRole::CrossClock,
            1 => TscRole::Trigger,
            2 => TscRole::Sync,
            _ => TscRole::Unused,
        }
    }
}

/// Non-fatal anomalies found while decoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TscWarning {
    /// Version word not in `KNOWN_TSC_VERSIONS`
    UnknownCounterVersion(u32),
    /// Control word overflow bit set
    CounterOverflowFlag,
    /// Trigger value repeated with the same value
    DuplicateTriggerMatch(u64),
}

/// Decoded TSC record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TscReading {
    pub version: u32,
    pub write_timestamp: u32,
    pub routing: u32,
    pub sync_number: u32,
    /// Trigger time in ticks
    pub trigger: u64,
    /// Cross-clock timestamps, in record order
    pub cross_clocks: Vec<u64>,
    pub warnings: Vec<TscWarning>,
}

impl TscReading {
    /// Trigger time in microseconds
    pub fn trigger_time_us(&self, clock_frequency_mhz: f64) -> Option<f64> {
        (clock_frequency_mhz > 0.0).then(|| self.trigger as f64 / clock_frequency_mhz)
    }
}

/// Combine one `(lower, upper)` pair into its value and role
#[inline]
pub fn unpack_pair(lower: u32, upper: u32) -> (u64, TscRole) {
    let value = u64::from(lower & LOWER_MASK) | (u64::from(upper) << ROLE_SHIFT);
    (value, TscRole::from_bits(lower >> ROLE_SHIFT))
}

/// Decode a TSC word list
///
/// # Errors
/// - `TruncatedTimestampRecord` if the header or the announced pairs are missing
/// - `DuplicateTriggerMismatch` if two different trigger values are present
/// - `MissingTriggerTimestamp` if no pair carries the trigger role
pub fn decode_tsc(words: &[u32]) -> Result<TscReading> {
    let Some((header, body)) = words.split_first_chunk::<HEADER_WORDS>() else {
        return Err(IngestionError::TruncatedTimestampRecord {
            message: format!("{} header words, need {HEADER_WORDS}", words.len()),
        });
    };
    let [version, write_timestamp, routing, sync_number, control] = *header;

    let mut warnings = Vec::new();
    if !KNOWN_TSC_VERSIONS.contains(&version) {
        warnings.push(TscWarning::UnknownCounterVersion(version));
    }
    if (control >> OVERFLOW_BIT) & 1 == 1 {
        warnings.push(TscWarning::CounterOverflowFlag);
    }

    let pairs = (control & CHANNEL_MASK) as usize;
    if body.len() < pairs * 2 {
        return Err(IngestionError::TruncatedTimestampRecord {
            message: format!("{pairs} pairs announced, {} words present", body.len()),
        });
    }

    let mut trigger: Option<u64> = None;
    let mut cross_clocks = Vec::new();
    for pair in body[..pairs * 2].chunks_exact(2) {
        let (value, role) = unpack_pair(pair[0], pair[1]);
        match role {
            TscRole::CrossClock => cross_clocks.push(value),
            TscRole::Trigger => match trigger {
                None => trigger = Some(value),
                Some(first) if first == value => {
                    warnings.push(TscWarning::DuplicateTriggerMatch(value));
                }
                Some(first) => {
                    return Err(IngestionError::DuplicateTriggerMismatch {
                        first,
                        second: value,
                    });
                }
            },
            TscRole::Sync | TscRole::Unused => {}
        }
    }

    let trigger = trigger.ok_or(IngestionError::MissingTriggerTimestamp)?;

    Ok(TscReading {
        version,
        write_timestamp,
        routing,
        sync_number,
        trigger,
        cross_clocks,
        warnings,
    })
}

/// Encode a value and role into a `(lower, upper)` pair
pub fn pack_pair(value: u64, role: TscRole) -> (u32, u32) {
    let role_bits = match role {
        TscRole::CrossClock => 0,
        TscRole::Trigger => 1,
        TscRole::Sync => 2,
        TscRole::Unused => 3,
    };
    let lower = (value as u32 & LOWER_MASK) | (role_bits << ROLE_SHIFT);
    let upper = (value >> ROLE_SHIFT) as u32;
    (lower, upper)
}

/// Build a TSC word list from `(value, role)` pairs
pub fn encode_tsc(version: u32, overflow: bool, pairs: &[(u64, TscRole)]) -> Vec<u32> {
    let mut control = (pairs.len() as u32) & CHANNEL_MASK;
    if overflow {
        control |= 1 << OVERFLOW_BIT;
    }

    let mut words = vec![version, 0, 0, 0, control];
    for (value, role) in pairs {
        let (lower, upper) = pack_pair(*value, *role);
        words.push(lower);
        words.push(upper);
    }
    words
}
