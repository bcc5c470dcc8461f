//! 子进程信号源
//!
//! 启动 `<command> <script_dir>/<strategy_id>.py`，stdin 写入请求 JSON，
//! 从 stdout 读取响应 JSON。超时后进程被杀掉

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use quant_relay_domain::traits::SignalSource;
use quant_relay_domain::{SignalRequest, SignalResponse};

pub struct ProcessSignalSource {
    command: String,
    script_dir: PathBuf,
    timeout: Duration,
}

impl ProcessSignalSource {
    pub fn new(command: impl Into<String>, script_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            script_dir: script_dir.into(),
            timeout,
        }
    }

    /// 策略脚本路径；策略ID只允许字母数字、`-`、`_`
    pub fn script_path(&self, strategy_id: &str) -> Result<PathBuf> {
        let valid = !strategy_id.is_empty()
            && strategy_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(anyhow!("非法的策略ID: {:?}", strategy_id));
        }
        Ok(self.script_dir.join(format!("{}.py", strategy_id)))
    }

    async fn run(&self, request: &SignalRequest) -> Result<SignalResponse> {
        let script = self.script_path(&request.strategy_id)?;
        let input = serde_json::to_vec(request)?;

        let mut child = Command::new(&self.command)
            .arg(&script)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("启动信号进程失败: {} {}", self.command, script.display()))?;

        // 写入与读取并发进行，脚本先输出大量内容也不会把双方卡在管道上
        let stdin = child.stdin.take();
        let feed = async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(&input).await?;
                stdin.shutdown().await?;
            }
            Ok::<(), std::io::Error>(())
        };
        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        let output = output?;
        match fed {
            Ok(()) => {}
            // 脚本不读 stdin 就退出
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                debug!(strategy_id = %request.strategy_id, "信号进程未读取完请求");
            }
            Err(e) => return Err(e).context("写入信号进程 stdin 失败"),
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            debug!(strategy_id = %request.strategy_id, "信号进程 stderr: {}", stderr.trim());
        }

        if !output.status.success() {
            return Err(anyhow!(
                "信号进程退出码异常: {:?}, stderr: {}",
                output.status.code(),
                stderr.trim()
            ));
        }

        let response: SignalResponse = serde_json::from_slice(&output.stdout)
            .with_context(|| "信号进程输出不是合法的 JSON")?;
        Ok(response)
    }
}

#[async_trait]
impl SignalSource for ProcessSignalSource {
    async fn evaluate(&self, request: &SignalRequest) -> Result<SignalResponse> {
        let start = Instant::now();
        // 超时后 future 被丢弃，kill_on_drop 结束子进程
        match tokio::time::timeout(self.timeout, self.run(request)).await {
            Ok(result) => {
                debug!(
                    strategy_id = %request.strategy_id,
                    "信号进程完成，耗时: {:?}",
                    start.elapsed()
                );
                result
            }
            Err(_) => {
                warn!(
                    strategy_id = %request.strategy_id,
                    "信号进程超时 ({:?})，已终止",
                    self.timeout
                );
                Err(anyhow!("信号进程超时 ({:?})", self.timeout))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use quant_relay_domain::{StrategySettings, Timeframe};

    fn request(strategy_id: &str) -> SignalRequest {
        SignalRequest {
            strategy_id: strategy_id.to_string(),
            execution_time: Utc::now(),
            settings: StrategySettings::new(strategy_id, "BTC-USDT-SWAP", Timeframe::M5),
        }
    }

    #[test]
    fn test_script_path_rejects_traversal() {
        let source = ProcessSignalSource::new("python3", "/opt/strategies", Duration::from_secs(1));
        assert_eq!(
            source.script_path("vegas_btc-1").unwrap(),
            PathBuf::from("/opt/strategies/vegas_btc-1.py")
        );
        assert!(source.script_path("../etc/passwd").is_err());
        assert!(source.script_path("").is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_reads_json_from_stdout() {
        let dir = std::env::temp_dir().join(format!("relay-signal-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("echo_long.py"),
            "cat > /dev/null\necho '{\"success\": true, \"signal\": {\"signal\": \"LONG\", \"price\": 100.0}}'\n",
        )
        .unwrap();

        let source = ProcessSignalSource::new("sh", &dir, Duration::from_secs(5));
        let response = source.evaluate(&request("echo_long")).await.unwrap();
        assert!(response.success);
        assert_eq!(response.signal.unwrap().price, 100.0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_large_output_before_reading_stdin() {
        let dir = std::env::temp_dir().join(format!("relay-signal-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("chatty.py"),
            "head -c 200000 /dev/zero | tr '\\0' ' '\ncat > /dev/null\necho '{\"success\": true, \"signal\": null}'\n",
        )
        .unwrap();

        let mut req = request("chatty");
        req.settings.parameters = serde_json::json!({ "padding": "x".repeat(200_000) });

        let source = ProcessSignalSource::new("sh", &dir, Duration::from_secs(5));
        let started = Instant::now();
        let response = source.evaluate(&req).await.unwrap();
        assert!(response.success);
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_and_exit_code() {
        let dir = std::env::temp_dir().join(format!("relay-signal-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("slow.py"), "sleep 5\n").unwrap();
        std::fs::write(dir.join("broken.py"), "exit 3\n").unwrap();

        let source = ProcessSignalSource::new("sh", &dir, Duration::from_millis(200));
        let started = Instant::now();
        assert!(source.evaluate(&request("slow")).await.is_err());
        assert!(started.elapsed() < Duration::from_secs(3));

        assert!(source.evaluate(&request("broken")).await.is_err());
    }
}
