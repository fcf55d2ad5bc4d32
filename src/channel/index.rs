//! Index channel metadata and index values.
//!
//! A chunk row starts with one cell per index channel. The first index
//! is the primary one: it decides row order and chunk boundaries.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ChunkingConfig;
use crate::error::{ChunkError, ChunkResult};
use crate::range::Range;

/// One index dimension of a chunk or reader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelIndexInfo {
    pub mnemonic: String,
    pub unit: String,
    pub is_time_index: bool,
    pub increasing: bool,
    #[serde(default)]
    pub scale: i32,
    #[serde(default)]
    pub start: Option<f64>,
    #[serde(default)]
    pub end: Option<f64>,
}

impl ChannelIndexInfo {
    pub fn depth(mnemonic: &str, unit: &str, increasing: bool) -> Self {
        ChannelIndexInfo {
            mnemonic: mnemonic.to_string(),
            unit: unit.to_string(),
            is_time_index: false,
            increasing,
            scale: 0,
            start: None,
            end: None,
        }
    }

    pub fn time(mnemonic: &str, increasing: bool) -> Self {
        ChannelIndexInfo {
            mnemonic: mnemonic.to_string(),
            unit: "us".to_string(),
            is_time_index: true,
            increasing,
            scale: 0,
            start: None,
            end: None,
        }
    }

    pub fn with_scale(mut self, scale: i32) -> Self {
        self.scale = scale;
        self
    }

    pub fn range(&self) -> Range<f64> {
        Range::new(self.start, self.end)
    }

    /// Bucket width in scaled units for this index.
    pub fn range_size(&self, config: &ChunkingConfig) -> i64 {
        if self.is_time_index {
            config.time_range_size
        } else {
            config
                .depth_range_size
                .saturating_mul(10i64.saturating_pow(self.scale.max(0) as u32))
        }
    }

    /// Read an index cell from a JSON row.
    pub fn parse_value(&self, cell: &Value) -> ChunkResult<IndexValue> {
        let invalid = || ChunkError::InvalidIndexValue {
            mnemonic: self.mnemonic.clone(),
            value: cell.to_string(),
        };

        let value = match cell {
            Value::Number(n) => {
                let v = n.as_f64().ok_or_else(invalid)?;
                if self.is_time_index {
                    IndexValue::Time(v)
                } else {
                    IndexValue::Depth(v)
                }
            }
            Value::String(s) if self.is_time_index => {
                let ts = DateTime::parse_from_rfc3339(s).map_err(|_| invalid())?;
                IndexValue::Time(ts.timestamp_micros() as f64)
            }
            Value::String(s) => IndexValue::Depth(s.trim().parse().map_err(|_| invalid())?),
            Value::Object(map) if !self.is_time_index => {
                let depth = map.get("depth").and_then(Value::as_f64).ok_or_else(invalid)?;
                IndexValue::PassIndexedDepth(depth)
            }
            _ => return Err(invalid()),
        };

        if value.as_f64().is_finite() {
            Ok(value)
        } else {
            Err(invalid())
        }
    }

    /// Scaled integer for a plain index number, rounded in this index's direction.
    pub fn to_scaled(&self, value: f64) -> i64 {
        let value = if self.is_time_index {
            IndexValue::Time(value)
        } else {
            IndexValue::Depth(value)
        };
        value.to_scaled(self.scale, self.increasing)
    }

    /// Convert a scaled integer back to index units.
    pub fn unscale(&self, scaled: i64) -> f64 {
        if self.is_time_index {
            scaled as f64
        } else {
            scaled as f64 / 10f64.powi(self.scale)
        }
    }
}

/// A primary index value.
///
/// Time is in microseconds since the Unix epoch. Pass-indexed depth
/// keeps only the depth; the pass number does not take part in ordering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IndexValue {
    Time(f64),
    Depth(f64),
    PassIndexedDepth(f64),
}

impl IndexValue {
    pub fn as_f64(self) -> f64 {
        match self {
            IndexValue::Time(v) | IndexValue::Depth(v) | IndexValue::PassIndexedDepth(v) => v,
        }
    }

    /// Normalize to the scaled integer used for bucketing.
    ///
    /// Rounds toward the start of the value's bucket (down when increasing,
    /// up when decreasing), so the bucket of the key always contains the
    /// unscaled value itself.
    pub fn to_scaled(self, scale: i32, increasing: bool) -> i64 {
        let scaled = match self {
            IndexValue::Time(micros) => micros,
            IndexValue::Depth(depth) | IndexValue::PassIndexedDepth(depth) => depth * 10f64.powi(scale),
        };
        if increasing {
            scaled.floor() as i64
        } else {
            scaled.ceil() as i64
        }
    }
}
