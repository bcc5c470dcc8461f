//! 策略相关枚举

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// 时间周期
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    /// 1分钟
    M1,
    /// 3分钟
    M3,
    /// 5分钟
    M5,
    /// 15分钟
    M15,
    /// 30分钟
    M30,
    /// 1小时
    H1,
    /// 2小时
    H2,
    /// 4小时
    H4,
    /// 6小时
    H6,
    /// 12小时
    H12,
    /// 1天
    D1,
    /// 1周（周一 00:00 UTC 对齐）
    W1,
}

/// 1970-01-01 是周四，周线边界需要平移到周一
const WEEK_ALIGN_OFFSET_MS: i64 = 4 * 86_400_000;

/// 执行锁 TTL 下限：必须覆盖 30s 信号超时 + 扇出
pub const MIN_LOCK_TTL_SECS: u64 = 120;
/// 执行锁 TTL 上限
pub const MAX_LOCK_TTL_SECS: u64 = 3600;

impl Timeframe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M3 => "3m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1H",
            Timeframe::H2 => "2H",
            Timeframe::H4 => "4H",
            Timeframe::H6 => "6H",
            Timeframe::H12 => "12H",
            Timeframe::D1 => "1D",
            Timeframe::W1 => "1W",
        }
    }

    /// 获取时间周期对应的分钟数
    pub fn to_minutes(&self) -> i64 {
        match self {
            Timeframe::M1 => 1,
            Timeframe::M3 => 3,
            Timeframe::M5 => 5,
            Timeframe::M15 => 15,
            Timeframe::M30 => 30,
            Timeframe::H1 => 60,
            Timeframe::H2 => 120,
            Timeframe::H4 => 240,
            Timeframe::H6 => 360,
            Timeframe::H12 => 720,
            Timeframe::D1 => 1440,
            Timeframe::W1 => 10080,
        }
    }

    pub fn to_millis(&self) -> i64 {
        self.to_minutes() * 60_000
    }

    /// 将时间向下取整到周期边界（UTC）
    pub fn floor_millis(&self, ts_ms: i64) -> i64 {
        let step = self.to_millis();
        match self {
            Timeframe::W1 => {
                (ts_ms - WEEK_ALIGN_OFFSET_MS).div_euclid(step) * step + WEEK_ALIGN_OFFSET_MS
            }
            _ => ts_ms.div_euclid(step) * step,
        }
    }

    /// 向下取整后的边界时间
    pub fn floor(&self, time: DateTime<Utc>) -> DateTime<Utc> {
        let boundary = self.floor_millis(time.timestamp_millis());
        Utc.timestamp_millis_opt(boundary).single().unwrap_or(time)
    }

    /// 周期键：同一个调度 tick 的重试得到相同的 key
    pub fn interval_key(&self, scheduled_time: DateTime<Utc>) -> String {
        format!(
            "{}:{}",
            self.as_str(),
            self.floor_millis(scheduled_time.timestamp_millis())
        )
    }

    /// 执行锁 TTL（秒）
    pub fn lock_ttl_secs(&self) -> u64 {
        ((self.to_minutes() * 60) as u64).clamp(MIN_LOCK_TTL_SECS, MAX_LOCK_TTL_SECS)
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1m" => Ok(Timeframe::M1),
            "3m" => Ok(Timeframe::M3),
            "5m" => Ok(Timeframe::M5),
            "15m" => Ok(Timeframe::M15),
            "30m" => Ok(Timeframe::M30),
            "1H" | "1h" => Ok(Timeframe::H1),
            "2H" | "2h" => Ok(Timeframe::H2),
            "4H" | "4h" => Ok(Timeframe::H4),
            "6H" | "6h" => Ok(Timeframe::H6),
            "12H" | "12h" => Ok(Timeframe::H12),
            "1D" | "1Dutc" | "1d" => Ok(Timeframe::D1),
            "1W" | "1w" => Ok(Timeframe::W1),
            _ => Err(format!("Unknown timeframe: {}", s)),
        }
    }
}

/// 策略信号类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalType {
    Long,
    Short,
    Hold,
    ExitLong,
    ExitShort,
}

impl SignalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalType::Long => "LONG",
            SignalType::Short => "SHORT",
            SignalType::Hold => "HOLD",
            SignalType::ExitLong => "EXIT_LONG",
            SignalType::ExitShort => "EXIT_SHORT",
        }
    }

    /// 是否为开仓信号
    pub fn is_entry(&self) -> bool {
        matches!(self, SignalType::Long | SignalType::Short)
    }

    /// `other` 是否与以本信号开出的仓位方向相反
    ///
    /// LONG 的反向为 SHORT / EXIT_LONG，SHORT 的反向为 LONG / EXIT_SHORT
    pub fn is_reversed_by(&self, other: SignalType) -> bool {
        match self {
            SignalType::Long => matches!(other, SignalType::Short | SignalType::ExitLong),
            SignalType::Short => matches!(other, SignalType::Long | SignalType::ExitShort),
            _ => false,
        }
    }
}

impl std::fmt::Display for SignalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SignalType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "LONG" => Ok(SignalType::Long),
            "SHORT" => Ok(SignalType::Short),
            "HOLD" => Ok(SignalType::Hold),
            "EXIT_LONG" => Ok(SignalType::ExitLong),
            "EXIT_SHORT" => Ok(SignalType::ExitShort),
            _ => Err(format!("Unknown signal type: {}", s)),
        }
    }
}

/// 执行记录状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Success,
    Failed,
    Skipped,
    NoSignal,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Success => "SUCCESS",
            ExecutionStatus::Failed => "FAILED",
            ExecutionStatus::Skipped => "SKIPPED",
            ExecutionStatus::NoSignal => "NO_SIGNAL",
        }
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUCCESS" => Ok(ExecutionStatus::Success),
            "FAILED" => Ok(ExecutionStatus::Failed),
            "SKIPPED" => Ok(ExecutionStatus::Skipped),
            "NO_SIGNAL" => Ok(ExecutionStatus::NoSignal),
            _ => Err(format!("Unknown execution status: {}", s)),
        }
    }
}
