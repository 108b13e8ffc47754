/// 获取当前 UTC 时间戳（秒），与存储层的 `Timestamp.seconds` 一致
pub fn now_seconds() -> i64 {
    chrono::Utc::now().timestamp()
}
