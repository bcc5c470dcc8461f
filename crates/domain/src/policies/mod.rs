//! 业务策略（纯计算）

pub mod position_sizing;
pub mod subscriber_limit_policy;

pub use position_sizing::calculate_position_size;
pub use subscriber_limit_policy::{check_subscriber_limits, LimitDecision};
