pub mod time;

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// # Summary
/// 交易时间周期枚举，定义 K 线的时间跨度。
///
/// # Invariants
/// - 文本编码统一为小写短码 (`1m`, `4h`, `1d`)，同时兼容 MT5 风格的 `H1`/`H4`/`D1`。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(try_from = "String", into = "String")]
pub enum TimeFrame {
    // 1分钟
    Minute1,
    // 5分钟
    Minute5,
    // 15分钟
    Minute15,
    // 30分钟
    Minute30,
    // 1小时
    Hour1,
    // 4小时
    Hour4,
    // 1日
    Day1,
}

impl TimeFrame {
    /// # Summary
    /// 周期对应的秒数。
    pub fn seconds(&self) -> i64 {
        match self {
            TimeFrame::Minute1 => 60,
            TimeFrame::Minute5 => 300,
            TimeFrame::Minute15 => 900,
            TimeFrame::Minute30 => 1_800,
            TimeFrame::Hour1 => 3_600,
            TimeFrame::Hour4 => 14_400,
            TimeFrame::Day1 => 86_400,
        }
    }
}

impl FromStr for TimeFrame {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "1m" | "m1" | "minute1" => Ok(TimeFrame::Minute1),
            "5m" | "m5" | "minute5" => Ok(TimeFrame::Minute5),
            "15m" | "m15" | "minute15" => Ok(TimeFrame::Minute15),
            "30m" | "m30" | "minute30" => Ok(TimeFrame::Minute30),
            "1h" | "h1" | "hour1" => Ok(TimeFrame::Hour1),
            "4h" | "h4" | "hour4" => Ok(TimeFrame::Hour4),
            "1d" | "d1" | "day1" => Ok(TimeFrame::Day1),
            _ => Err(format!("Unknown TimeFrame: {}", s)),
        }
    }
}

impl TryFrom<String> for TimeFrame {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeFrame> for String {
    fn from(value: TimeFrame) -> Self {
        value.to_string()
    }
}

impl std::fmt::Display for TimeFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeFrame::Minute1 => write!(f, "1m"),
            TimeFrame::Minute5 => write!(f, "5m"),
            TimeFrame::Minute15 => write!(f, "15m"),
            TimeFrame::Minute30 => write!(f, "30m"),
            TimeFrame::Hour1 => write!(f, "1h"),
            TimeFrame::Hour4 => write!(f, "4h"),
            TimeFrame::Day1 => write!(f, "1d"),
        }
    }
}

/// # Summary
/// 交易方向。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Buy,
    Sell,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Buy => write!(f, "BUY"),
            Direction::Sell => write!(f, "SELL"),
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "BUY" | "LONG" => Ok(Direction::Buy),
            "SELL" | "SHORT" => Ok(Direction::Sell),
            _ => Err(format!("Unknown Direction: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeframe_codes() {
        assert_eq!("H4".parse::<TimeFrame>(), Ok(TimeFrame::Hour4));
        assert_eq!("1h".parse::<TimeFrame>(), Ok(TimeFrame::Hour1));
        assert_eq!(TimeFrame::Minute15.to_string(), "15m");
        assert!("2w".parse::<TimeFrame>().is_err());

        let json = serde_json::to_string(&TimeFrame::Day1).unwrap();
        assert_eq!(json, "\"1d\"");
        let back: TimeFrame = serde_json::from_str("\"d1\"").unwrap();
        assert_eq!(back, TimeFrame::Day1);
    }

    #[test]
    fn test_timeframe_parsing_ignores_case_only() {
        assert_eq!("1H".parse::<TimeFrame>(), Ok(TimeFrame::Hour1));
        assert_eq!("m15".parse::<TimeFrame>(), Ok(TimeFrame::Minute15));
        assert!(" 1h".parse::<TimeFrame>().is_err());
        assert!("60m".parse::<TimeFrame>().is_err());
    }

    #[test]
    fn test_direction_aliases() {
        assert_eq!("long".parse::<Direction>(), Ok(Direction::Buy));
        assert_eq!("SELL".parse::<Direction>(), Ok(Direction::Sell));
        assert_eq!(Direction::Buy.to_string(), "BUY");
    }
}
