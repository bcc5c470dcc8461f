//! 仓位计算策略

/// 计算开仓数量
///
/// - 无止损：`capital * risk * leverage / entry`
/// - 有止损：`(capital * risk / |entry - stop|) * leverage`，止损距离为 0 时返回 0
///
/// 输入非法（非正数、非有限值）时返回 0，由调用方按跳过处理
pub fn calculate_position_size(
    capital: f64,
    risk_per_trade: f64,
    entry_price: f64,
    stop_loss: Option<f64>,
    leverage: f64,
) -> f64 {
    if !(capital > 0.0 && risk_per_trade > 0.0 && entry_price > 0.0 && leverage > 0.0) {
        return 0.0;
    }

    let size = match stop_loss {
        None => capital * risk_per_trade * leverage / entry_price,
        Some(stop) => {
            let risk_amount = capital * risk_per_trade;
            let stop_distance = (entry_price - stop).abs();
            if stop_distance == 0.0 {
                return 0.0;
            }
            (risk_amount / stop_distance) * leverage
        }
    };

    if size.is_finite() {
        size
    } else {
        0.0
    }
}
