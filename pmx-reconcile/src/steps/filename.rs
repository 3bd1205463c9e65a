//! Dates embedded in file names
//!
//! Cameras, phones and messengers encode the capture time in the file name
//! (`IMG_20230615_143012.jpg`, `PXL_20230615_143012345.jpg`,
//! `2023-06-15 14.30.12.jpg`, `IMG-20230615-WA0001.jpg`). The inference step
//! turns full date-times into naive datetime values on the filename entries so
//! the datetime step can use them as weak candidates. Date-only patterns are
//! used later by the fallback cascade.

use crate::context::MergeContext;
use crate::error::MergeResult;
use crate::keys;
use crate::pipeline::MergeStep;
use chrono::{NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use pmx_common::Timestamp;
use regex::Regex;
use tracing::debug;

static DATETIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?:^|[^0-9])(\d{4})[-_.]?(\d{2})[-_.]?(\d{2})[-_ T]?(\d{2})[-:_.]?(\d{2})[-:_.]?(\d{2})(\d{3})?(?:[^0-9]|$)",
    )
    .expect("filename datetime regex is valid")
});

static DIGIT_RUN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+").expect("digit run regex is valid"));

static WHATSAPP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:^|[^A-Za-z])(?:IMG|VID|AUD|PTT)-(\d{8})-WA\d{4}(?:[^0-9]|$)")
        .expect("whatsapp regex is valid")
});

const MIN_YEAR: i32 = 1900;
const MAX_YEAR: i32 = 2100;

/// Final path component, accepting both separators
pub fn base_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

fn valid_date(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, day)
}

fn parse_yyyymmdd(digits: &str) -> Option<NaiveDate> {
    if digits.len() != 8 {
        return None;
    }
    let year = digits.get(0..4)?.parse().ok()?;
    let month = digits.get(4..6)?.parse().ok()?;
    let day = digits.get(6..8)?.parse().ok()?;
    valid_date(year, month, day)
}

/// Full date-time embedded in a file name
pub fn datetime_from_filename(path: &str) -> Option<NaiveDateTime> {
    let name = base_name(path);
    DATETIME_RE.captures_iter(name).find_map(|caps| {
        let number = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());
        let year = i32::try_from(number(1)?).ok()?;
        let date = valid_date(year, number(2)?, number(3)?)?;
        let millis = number(7).unwrap_or(0);
        date.and_hms_milli_opt(number(4)?, number(5)?, number(6)?, millis)
    })
}

/// Every valid 8-digit `YYYYMMDD` date in a file name
pub fn dates_from_filename(path: &str) -> Vec<NaiveDate> {
    DIGIT_RUN_RE
        .find_iter(base_name(path))
        .filter_map(|m| parse_yyyymmdd(m.as_str()))
        .collect()
}

/// Date of a WhatsApp-style name (`IMG-20230615-WA0001.jpg`)
pub fn whatsapp_date(path: &str) -> Option<NaiveDate> {
    WHATSAPP_RE
        .captures(base_name(path))
        .and_then(|caps| caps.get(1))
        .and_then(|m| parse_yyyymmdd(m.as_str()))
}

/// Noon on `date`, used when only the day is known
pub fn noon(date: NaiveDate) -> NaiveDateTime {
    date.and_hms_opt(12, 0, 0).unwrap_or_else(|| date.and_time(chrono::NaiveTime::MIN))
}

/// File names recorded for the file (source path and cloud title)
pub(crate) fn filenames(ctx: &MergeContext) -> Vec<String> {
    ctx.entries()
        .iter()
        .filter(|e| keys::is_filename_key(&e.key))
        .filter_map(|e| e.text.clone())
        .collect()
}

/// Fills the datetime slot of filename entries whose name embeds a date-time
pub struct FilenameDateStep;

impl MergeStep for FilenameDateStep {
    fn name(&self) -> &str {
        "filename_dates"
    }

    fn process(&self, ctx: &mut MergeContext) -> MergeResult<()> {
        for entry in ctx.entries_mut() {
            if !keys::is_filename_key(&entry.key) || entry.datetime.is_some() {
                continue;
            }
            let Some(name) = entry.text.as_deref() else {
                continue;
            };
            if let Some(parsed) = datetime_from_filename(name) {
                debug!(entry_id = %entry.id, name, datetime = %parsed, "Date inferred from file name");
                entry.datetime = Some(Timestamp::Naive(parsed));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MetadataEntry;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").unwrap()
    }

    #[test]
    fn test_camera_and_phone_patterns() {
        assert_eq!(
            datetime_from_filename("/photos/IMG_20230615_143012.jpg"),
            Some(dt("2023-06-15 14:30:12"))
        );
        assert_eq!(
            datetime_from_filename("PXL_20230615_143012345.jpg"),
            Some(dt("2023-06-15 14:30:12.345"))
        );
        assert_eq!(
            datetime_from_filename("C:\\Users\\me\\2023-06-15 14.30.12.jpg"),
            Some(dt("2023-06-15 14:30:12"))
        );
        assert_eq!(
            datetime_from_filename("Screenshot_2023-06-15-14-30-12.png"),
            Some(dt("2023-06-15 14:30:12"))
        );
    }

    #[test]
    fn test_invalid_calendar_values_rejected() {
        assert_eq!(datetime_from_filename("IMG_20231315_143012.jpg"), None);
        assert_eq!(datetime_from_filename("IMG_20230615_256012.jpg"), None);
        assert_eq!(datetime_from_filename("IMG_18000615_143012.jpg"), None);
    }

    #[test]
    fn test_whatsapp_has_no_time() {
        assert_eq!(datetime_from_filename("IMG-20230615-WA0001.jpg"), None);
        assert_eq!(
            whatsapp_date("IMG-20230615-WA0001.jpg"),
            NaiveDate::from_ymd_opt(2023, 6, 15)
        );
        assert_eq!(
            whatsapp_date("/x/vid-20230615-wa0042.mp4"),
            NaiveDate::from_ymd_opt(2023, 6, 15)
        );
        assert_eq!(whatsapp_date("IMG_20230615_143012.jpg"), None);
        assert_eq!(whatsapp_date("XIMG-20230615-WA0001.jpg"), None);
        assert_eq!(whatsapp_date("IMG-20230615-WA01.jpg"), None);
        assert_eq!(whatsapp_date("IMG-20230615-WA000123.jpg"), None);
        assert_eq!(
            whatsapp_date("Copy of IMG-20230615-WA0001.jpg"),
            NaiveDate::from_ymd_opt(2023, 6, 15)
        );
    }

    #[test]
    fn test_eight_digit_dates() {
        assert_eq!(
            dates_from_filename("IMG-20230615-WA0001.jpg"),
            vec![NaiveDate::from_ymd_opt(2023, 6, 15).unwrap()]
        );
        assert!(dates_from_filename("IMG_99999999.jpg").is_empty());
        assert!(dates_from_filename("DSC_0042.jpg").is_empty());
    }

    #[test]
    fn test_step_fills_filename_entries_only() {
        let mut ctx = MergeContext::new(vec![
            MetadataEntry::text(1, keys::SOURCE_FILE, "/a/IMG_20230615_143012.jpg"),
            MetadataEntry::text(2, keys::GOOGLE_TITLE, "DSC_0042.jpg"),
            MetadataEntry::text(3, "XMP:Title", "IMG_20230615_143012.jpg"),
        ]);
        FilenameDateStep.process(&mut ctx).unwrap();

        let entries = ctx.entries();
        assert_eq!(entries[0].datetime, Some(Timestamp::Naive(dt("2023-06-15 14:30:12"))));
        assert!(entries[1].datetime.is_none());
        assert!(entries[2].datetime.is_none());
    }
}
