// src/model/patch.rs

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::model::placements::{
    AdPlacement, DeactivationReason, ExpirationEvents, NotificationMethod,
};
use crate::model::runtime::RuntimeInput;

/// 区分「字段缺失」与「显式置空」：缺失 -> `None`，`null` -> `Some(None)`
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// **广告位补丁**
///
/// 每个字段都是可选的，`apply_to` 只覆盖出现的字段。
/// 可清空的字段使用 `Option<Option<T>>`。
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PlacementPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub image: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub start_date: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<Option<DateTime<Utc>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_events: Option<ExpirationEvents>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_methods: Option<BTreeSet<NotificationMethod>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_users: Option<Vec<String>>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub notification_emails: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clicks: Option<u64>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub url: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handled: Option<bool>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub deactivated_at: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub deactivation_reason: Option<Option<DeactivationReason>>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub cycle_id: Option<Option<Uuid>>,
}

impl PlacementPatch {
    pub fn is_empty(&self) -> bool {
        *self == PlacementPatch::default()
    }

    /// 将补丁合并到目标上，只覆盖补丁中出现的字段
    pub fn apply_to(self, target: &mut AdPlacement) {
        fn set<T>(slot: &mut T, value: Option<T>) {
            if let Some(value) = value {
                *slot = value;
            }
        }

        set(&mut target.active, self.active);
        set(&mut target.image, self.image);
        set(&mut target.description, self.description);
        set(&mut target.runtime, self.runtime);
        set(&mut target.start_date, self.start_date);
        set(&mut target.expiration_date, self.expiration_date);
        set(&mut target.expiration_events, self.expiration_events);
        set(&mut target.notification_methods, self.notification_methods);
        set(&mut target.notification_users, self.notification_users);
        set(&mut target.notification_emails, self.notification_emails);
        set(&mut target.clicks, self.clicks);
        set(&mut target.url, self.url);
        set(&mut target.handled, self.handled);
        set(&mut target.deactivated_at, self.deactivated_at);
        set(&mut target.deactivation_reason, self.deactivation_reason);
        set(&mut target.cycle_id, self.cycle_id);
    }

    /// 开启一个新的投放周期：写入起止时间、清除 handled 与停用信息
    pub fn schedule(mut self, start: DateTime<Utc>, expiration: DateTime<Utc>) -> Self {
        self.start_date = Some(Some(start));
        self.expiration_date = Some(Some(expiration));
        self.handled = Some(false);
        self.cycle_id = Some(Some(Uuid::new_v4()));
        self.deactivated_at = Some(None);
        self.deactivation_reason = Some(None);
        self
    }

    pub fn deactivate(mut self, at: DateTime<Utc>, reason: DeactivationReason) -> Self {
        self.active = Some(false);
        self.deactivated_at = Some(Some(at));
        self.deactivation_reason = Some(Some(reason));
        self
    }
}

/// **管理后台可编辑的字段**
///
/// 调度相关字段（起止时间、handled、周期标识、点击数）不对外开放，
/// 出现未知字段时直接拒绝。
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AdminPatch {
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default, deserialize_with = "double_option")]
    pub image: Option<Option<String>>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub runtime: Option<RuntimeInput>,
    #[serde(default)]
    pub expiration_events: Option<ExpirationEvents>,
    #[serde(default)]
    pub notification_methods: Option<BTreeSet<NotificationMethod>>,
    #[serde(default)]
    pub notification_users: Option<Vec<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub notification_emails: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub url: Option<Option<String>>,
}

impl From<AdminPatch> for PlacementPatch {
    fn from(patch: AdminPatch) -> Self {
        PlacementPatch {
            active: patch.active,
            image: patch.image,
            description: patch.description,
            runtime: patch.runtime.map(RuntimeInput::into_token),
            expiration_events: patch.expiration_events,
            notification_methods: patch.notification_methods,
            notification_users: patch.notification_users,
            notification_emails: patch.notification_emails,
            url: patch.url,
            ..PlacementPatch::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::placements::ExpirationEvent;

    #[test]
    fn absent_fields_are_left_untouched() {
        let mut placement = AdPlacement {
            description: "keep me".into(),
            url: Some("https://shop.example/sale".into()),
            ..AdPlacement::default()
        };
        let patch: PlacementPatch = serde_json::from_str(r#"{"clicks": 4}"#).unwrap();
        patch.apply_to(&mut placement);
        assert_eq!(placement.description, "keep me");
        assert_eq!(placement.url.as_deref(), Some("https://shop.example/sale"));
        assert_eq!(placement.clicks, 4);
    }

    #[test]
    fn explicit_null_clears_optional_fields() {
        let mut placement = AdPlacement {
            image: Some("https://cdn.example/banner.png".into()),
            ..AdPlacement::default()
        };
        let patch: PlacementPatch = serde_json::from_str(r#"{"image": null}"#).unwrap();
        assert_eq!(patch.image, Some(None));
        patch.apply_to(&mut placement);
        assert_eq!(placement.image, None);
    }

    #[test]
    fn admin_patch_rejects_internal_fields() {
        let err = serde_json::from_str::<AdminPatch>(r#"{"handled": true}"#).unwrap_err();
        assert!(err.to_string().contains("unknown field"));
    }

    #[test]
    fn admin_patch_normalizes_structured_runtime() {
        let admin: AdminPatch = serde_json::from_str(
            r#"{"runtime": {"days": 2, "hours": 3, "minutes": 15}, "expirationEvents": ["notify", "deactivate"]}"#,
        )
        .unwrap();
        let patch = PlacementPatch::from(admin);
        assert_eq!(patch.runtime.as_deref(), Some("custom_2d_3h_15m"));
        assert!(patch.expiration_events.unwrap().contains(ExpirationEvent::Deactivate));
    }

    #[test]
    fn empty_patch_is_detected() {
        assert!(PlacementPatch::default().is_empty());
        assert!(!PlacementPatch { clicks: Some(1), ..Default::default() }.is_empty());
    }
}
