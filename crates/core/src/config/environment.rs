use std::env;

/// 读取布尔型环境变量：支持 true/false/1/0（大小写不敏感）
pub fn env_is_true(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) => {
            let v = v.trim();
            v.eq_ignore_ascii_case("true") || v == "1"
        }
        Err(_) => default,
    }
}

/// 读取字符串环境变量，若不存在则返回默认值
pub fn env_or_default(key: &str, default: &str) -> String {
    match env::var(key) {
        Ok(v) => v,
        Err(_) => default.to_string(),
    }
}

/// 读取 i64 环境变量，不存在或解析失败返回默认值
pub fn env_i64(key: &str, default: i64) -> i64 {
    match env::var(key) {
        Ok(v) => v.trim().parse::<i64>().ok().unwrap_or(default),
        Err(_) => default,
    }
}

/// 读取 f64 环境变量，非有限值或解析失败返回默认值
pub fn env_f64(key: &str, default: f64) -> f64 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(default)
}

/// 读取逗号分隔的列表，空项会被忽略
pub fn env_list(key: &str) -> Vec<String> {
    env::var(key)
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_helpers_fall_back_to_default() {
        assert!(env_is_true("QUANT_RELAY_TEST_MISSING_BOOL", true));
        assert_eq!(env_i64("QUANT_RELAY_TEST_MISSING_I64", 42), 42);
        assert_eq!(env_f64("QUANT_RELAY_TEST_MISSING_F64", 1.5), 1.5);
        assert_eq!(env_or_default("QUANT_RELAY_TEST_MISSING_STR", "x"), "x");
        assert!(env_list("QUANT_RELAY_TEST_MISSING_LIST").is_empty());
    }

    #[test]
    fn test_env_list_parsing() {
        env::set_var("QUANT_RELAY_TEST_LIST", "BTC-USDT-SWAP, ETH-USDT-SWAP,,");
        assert_eq!(
            env_list("QUANT_RELAY_TEST_LIST"),
            vec!["BTC-USDT-SWAP".to_string(), "ETH-USDT-SWAP".to_string()]
        );
        env::remove_var("QUANT_RELAY_TEST_LIST");
    }
}
