use anyhow::Context;
use chrono::{DateTime, FixedOffset, Utc};

const KST_OFFSET_SECS: i32 = 9 * 3600;

/// Korea Standard Time. No DST, so a fixed offset is exact.
pub fn kst() -> anyhow::Result<FixedOffset> {
    FixedOffset::east_opt(KST_OFFSET_SECS).context("invalid KST offset")
}

pub fn to_kst(now_utc: DateTime<Utc>) -> anyhow::Result<DateTime<FixedOffset>> {
    Ok(now_utc.with_timezone(&kst()?))
}

/// `YYYY-MM-DD HH:MM:SS KST`, used in scheduler log lines.
pub fn format_kst(now_utc: DateTime<Utc>) -> anyhow::Result<String> {
    Ok(to_kst(now_utc)?.format("%Y-%m-%d %H:%M:%S KST").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    #[test]
    fn shifts_utc_by_nine_hours() {
        // 2026-01-26 23:30 UTC = 2026-01-27 08:30 KST
        let now = Utc.with_ymd_and_hms(2026, 1, 26, 23, 30, 0).unwrap();
        let k = to_kst(now).unwrap();
        assert_eq!((k.hour(), k.minute()), (8, 30));
        assert_eq!(format_kst(now).unwrap(), "2026-01-27 08:30:00 KST");
    }
}
