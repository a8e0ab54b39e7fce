// src/model/countdown.rs

use std::fmt;

use chrono::{DateTime, Utc};
use serde::ser::{Serialize, SerializeStruct, Serializer};

use crate::model::placements::AdPlacement;

/// 倒计时
///
/// 序列化为 `{"expired": true}` 或 `{"expired": false, "days": .., "hours": .., "minutes": .., "seconds": ..}`。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Countdown {
    Expired,
    Remaining {
        days: i64,
        hours: i64,
        minutes: i64,
        seconds: i64,
    },
}

/// 计算剩余时间，纯函数，没有隐藏状态，可以按任意频率重复调用
pub fn remaining(expiration: DateTime<Utc>, now: DateTime<Utc>) -> Countdown {
    if now >= expiration {
        return Countdown::Expired;
    }
    let total = (expiration - now).num_seconds();
    Countdown::Remaining {
        days: total / 86_400,
        hours: total % 86_400 / 3_600,
        minutes: total % 3_600 / 60,
        seconds: total % 60,
    }
}

impl Countdown {
    /// 广告位没有排期时返回 `None`
    pub fn for_placement(placement: &AdPlacement, now: DateTime<Utc>) -> Option<Countdown> {
        placement.expiration_date.map(|exp| remaining(exp, now))
    }

    pub fn is_expired(&self) -> bool {
        matches!(self, Countdown::Expired)
    }
}

impl fmt::Display for Countdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Countdown::Expired => f.write_str("expired"),
            Countdown::Remaining { days, hours, minutes, seconds } => {
                write!(f, "{days}d {hours:02}h {minutes:02}m {seconds:02}s")
            }
        }
    }
}

impl Serialize for Countdown {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Countdown::Expired => {
                let mut state = serializer.serialize_struct("Countdown", 1)?;
                state.serialize_field("expired", &true)?;
                state.end()
            }
            Countdown::Remaining { days, hours, minutes, seconds } => {
                let mut state = serializer.serialize_struct("Countdown", 5)?;
                state.serialize_field("expired", &false)?;
                state.serialize_field("days", days)?;
                state.serialize_field("hours", hours)?;
                state.serialize_field("minutes", minutes)?;
                state.serialize_field("seconds", seconds)?;
                state.end()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};
    use proptest::prelude::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 10, 8, 0, 0).unwrap()
    }

    #[test]
    fn splits_remaining_time_into_components() {
        let exp = t0() + TimeDelta::days(2) + TimeDelta::hours(3) + TimeDelta::minutes(15) + TimeDelta::seconds(9);
        assert_eq!(
            remaining(exp, t0()),
            Countdown::Remaining { days: 2, hours: 3, minutes: 15, seconds: 9 }
        );
    }

    #[test]
    fn reaching_the_boundary_is_expired() {
        assert_eq!(remaining(t0(), t0()), Countdown::Expired);
        assert_eq!(remaining(t0(), t0() + TimeDelta::seconds(1)), Countdown::Expired);
    }

    #[test]
    fn serializes_to_display_shape() {
        let json = serde_json::to_value(Countdown::Expired).unwrap();
        assert_eq!(json, serde_json::json!({ "expired": true }));

        let json = serde_json::to_value(remaining(t0() + TimeDelta::seconds(61), t0())).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "expired": false, "days": 0, "hours": 0, "minutes": 1, "seconds": 1 })
        );
    }

    #[test]
    fn unscheduled_placement_has_no_countdown() {
        assert_eq!(Countdown::for_placement(&AdPlacement::default(), t0()), None);
    }

    proptest! {
        #[test]
        fn components_reassemble_to_total(secs in 1i64..400 * 86_400) {
            let exp = t0() + TimeDelta::seconds(secs);
            match remaining(exp, t0()) {
                Countdown::Remaining { days, hours, minutes, seconds } => {
                    prop_assert!(hours < 24 && minutes < 60 && seconds < 60);
                    prop_assert_eq!(days * 86_400 + hours * 3_600 + minutes * 60 + seconds, secs);
                }
                Countdown::Expired => prop_assert!(false, "positive offset reported as expired"),
            }
        }
    }
}
