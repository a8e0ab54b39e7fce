// src/model/runtime.rs

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 广告投放时长（runtime token）
///
/// 枚举值对应固定偏移量；自定义值编码为 `custom_<d>d_<h>h_<m>m`。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeToken {
    OneMinute,
    FiveMinutes,
    OneHour,
    OneDay,
    OneWeek,
    /// 固定 30 天
    OneMonth,
    /// 固定 90 天
    ThreeMonths,
    /// 固定 365 天
    OneYear,
    Custom { days: i64, hours: i64, minutes: i64 },
}

const CUSTOM_PREFIX: &str = "custom_";

const FIXED_TOKENS: [(&str, RuntimeToken); 8] = [
    ("1 minute", RuntimeToken::OneMinute),
    ("5 minutes", RuntimeToken::FiveMinutes),
    ("1 hour", RuntimeToken::OneHour),
    ("1 day", RuntimeToken::OneDay),
    ("1 week", RuntimeToken::OneWeek),
    ("1 month", RuntimeToken::OneMonth),
    ("3 months", RuntimeToken::ThreeMonths),
    ("1 year", RuntimeToken::OneYear),
];

/// 时长解析失败
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationError {
    #[error("invalid duration: `{0}` is not a known runtime token")]
    Malformed(String),
    #[error("invalid duration: `{0}` does not describe a positive offset")]
    NonPositive(String),
    #[error("invalid duration: `{0}` is out of range")]
    OutOfRange(String),
}

impl RuntimeToken {
    /// 所有可选的枚举时长，按从短到长排序
    pub fn fixed_tokens() -> impl Iterator<Item = &'static str> {
        FIXED_TOKENS.iter().map(|(label, _)| *label)
    }

    /// 计算偏移量，自定义值溢出时返回 `None`
    pub fn offset(&self) -> Option<TimeDelta> {
        match *self {
            RuntimeToken::OneMinute => TimeDelta::try_minutes(1),
            RuntimeToken::FiveMinutes => TimeDelta::try_minutes(5),
            RuntimeToken::OneHour => TimeDelta::try_hours(1),
            RuntimeToken::OneDay => TimeDelta::try_days(1),
            RuntimeToken::OneWeek => TimeDelta::try_weeks(1),
            RuntimeToken::OneMonth => TimeDelta::try_days(30),
            RuntimeToken::ThreeMonths => TimeDelta::try_days(90),
            RuntimeToken::OneYear => TimeDelta::try_days(365),
            RuntimeToken::Custom { days, hours, minutes } => TimeDelta::try_days(days)?
                .checked_add(&TimeDelta::try_hours(hours)?)?
                .checked_add(&TimeDelta::try_minutes(minutes)?),
        }
    }
}

impl fmt::Display for RuntimeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let RuntimeToken::Custom { days, hours, minutes } = self {
            return write!(f, "{CUSTOM_PREFIX}{days}d_{hours}h_{minutes}m");
        }
        let label = FIXED_TOKENS
            .iter()
            .find(|(_, token)| token == self)
            .map(|(label, _)| *label)
            .unwrap_or_default();
        f.write_str(label)
    }
}

impl FromStr for RuntimeToken {
    type Err = DurationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase();
        if let Some((_, token)) = FIXED_TOKENS.iter().find(|(label, _)| *label == normalized) {
            return Ok(*token);
        }

        let malformed = || DurationError::Malformed(raw.to_string());
        let encoded = normalized.strip_prefix(CUSTOM_PREFIX).ok_or_else(malformed)?;
        let mut parts = encoded.split('_');
        let mut component = |suffix: char| -> Result<i64, DurationError> {
            parts
                .next()
                .and_then(|part| part.strip_suffix(suffix))
                .and_then(|digits| digits.parse::<i64>().ok())
                .ok_or_else(malformed)
        };
        let days = component('d')?;
        let hours = component('h')?;
        let minutes = component('m')?;
        if parts.next().is_some() {
            return Err(malformed());
        }
        Ok(RuntimeToken::Custom { days, hours, minutes })
    }
}

/// 管理后台提交的时长：字符串 token 或结构化的自定义时长
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum RuntimeInput {
    Token(String),
    Custom {
        #[serde(default)]
        days: i64,
        #[serde(default)]
        hours: i64,
        #[serde(default)]
        minutes: i64,
    },
}

impl RuntimeInput {
    /// 统一转换为持久化使用的字符串 token
    pub fn into_token(self) -> String {
        match self {
            RuntimeInput::Token(token) => token.trim().to_string(),
            RuntimeInput::Custom { days, hours, minutes } => {
                RuntimeToken::Custom { days, hours, minutes }.to_string()
            }
        }
    }
}

/// **根据 runtime token 计算过期时间**
///
/// 纯函数；偏移量为零或负数、token 无法识别时返回 [`DurationError`]，
/// 调用方不得用这样的 token 排期。
pub fn parse(token: &str, start: DateTime<Utc>) -> Result<DateTime<Utc>, DurationError> {
    let parsed: RuntimeToken = token.parse()?;
    let offset = parsed
        .offset()
        .ok_or_else(|| DurationError::OutOfRange(token.to_string()))?;
    if offset <= TimeDelta::zero() {
        return Err(DurationError::NonPositive(token.to_string()));
    }
    start
        .checked_add_signed(offset)
        .ok_or_else(|| DurationError::OutOfRange(token.to_string()))
}
