use crate::error::CheckoutError;
use chrono::{DateTime, FixedOffset, NaiveDateTime, SecondsFormat, TimeZone, Utc};

// 北京时间 (UTC+8)，SQLite 中的时间列与日志时间统一使用
pub const BEIJING_OFFSET: FixedOffset = FixedOffset::east_opt(8 * 3600).unwrap();
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn to_beijing_string(dt: &DateTime<Utc>) -> String {
    dt.with_timezone(&BEIJING_OFFSET)
        .format(DATETIME_FORMAT)
        .to_string()
}

pub fn to_iso8601_utc_string(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// 优先按 RFC3339 解析，否则按 `YYYY-MM-DD HH:mm:ss` 北京时间解释
pub fn parse_datetime_string(s: &str) -> crate::error::Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)
        .map_err(|e| CheckoutError::TimeParse(format!("{}: {}", s, e)))?;
    BEIJING_OFFSET
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| CheckoutError::TimeParse(format!("ambiguous local datetime: {}", s)))
}

// tracing_subscriber 时间格式：北京时间，与数据库一致
pub struct BeijingTimer;

impl tracing_subscriber::fmt::time::FormatTime for BeijingTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", to_beijing_string(&Utc::now()))
    }
}
