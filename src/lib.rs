//! Ad placement lifecycle & expiration service.
//!
//! 广告位的投放窗口、过期动作（通知 / 停用 / 重置）与多渠道通知分发。

pub mod api;
pub mod config;
pub mod lifecycle;
pub mod logging;
pub mod mock_services;
pub mod model;
pub mod notify;
pub mod store;
pub mod upload;
