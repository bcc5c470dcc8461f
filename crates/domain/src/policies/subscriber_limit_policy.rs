//! 订阅者风控限额

use crate::entities::SubscriberSettings;

/// 限额检查结果
#[derive(Debug, Clone, PartialEq)]
pub enum LimitDecision {
    Allowed,
    MaxPositionsReached { open: u32, max: i32 },
    DailyLossExceeded { realized: f64, max: f64 },
}

impl LimitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, LimitDecision::Allowed)
    }
}

/// 检查是否还能为该订阅者开新仓
///
/// `max_positions <= 0` 与 `max_daily_loss <= 0` 表示不限制
pub fn check_subscriber_limits(
    settings: &SubscriberSettings,
    open_positions: u32,
    realized_pnl_today: f64,
) -> LimitDecision {
    if settings.max_positions > 0 && open_positions as i64 >= settings.max_positions as i64 {
        return LimitDecision::MaxPositionsReached {
            open: open_positions,
            max: settings.max_positions,
        };
    }

    if settings.max_daily_loss > 0.0 && realized_pnl_today <= -settings.max_daily_loss {
        return LimitDecision::DailyLossExceeded {
            realized: realized_pnl_today,
            max: settings.max_daily_loss,
        };
    }

    LimitDecision::Allowed
}
