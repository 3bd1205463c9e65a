//! Metadata key and merged field names

// Source keys (namespaced tag names as produced by the extractors)
pub const EXIF_MAKE: &str = "EXIF:Make";
pub const EXIF_MODEL: &str = "EXIF:Model";
pub const EXIF_LENS_MODEL: &str = "EXIF:LensModel";
pub const XMP_DESCRIPTION: &str = "XMP:Description";

pub const COMPOSITE_GPS_LATITUDE: &str = "Composite:GPSLatitude";
pub const COMPOSITE_GPS_LONGITUDE: &str = "Composite:GPSLongitude";
pub const COMPOSITE_GPS_DATETIME: &str = "Composite:GPSDateTime";
pub const GOOGLE_GEO_LATITUDE: &str = "google:geoDataLatitude";
pub const GOOGLE_GEO_LONGITUDE: &str = "google:geoDataLongitude";

pub const XMP_DATETIME_ORIGINAL: &str = "XMP:DateTimeOriginal";
pub const EXIF_DATETIME_ORIGINAL: &str = "EXIF:DateTimeOriginal";
pub const EXIF_OFFSET_TIME_ORIGINAL: &str = "EXIF:OffsetTimeOriginal";
pub const EXIF_CREATE_DATE: &str = "EXIF:CreateDate";
pub const QUICKTIME_CREATE_DATE: &str = "QuickTime:CreateDate";
pub const QUICKTIME_MEDIA_CREATE_DATE: &str = "QuickTime:MediaCreateDate";
pub const GOOGLE_PHOTO_TAKEN_TIME: &str = "google:photoTakenTime";

pub const XMP_MODIFY_DATE: &str = "XMP:ModifyDate";
pub const EXIF_MODIFY_DATE: &str = "EXIF:ModifyDate";
pub const EXIF_OFFSET_TIME: &str = "EXIF:OffsetTime";
pub const QUICKTIME_MODIFY_DATE: &str = "QuickTime:ModifyDate";
pub const QUICKTIME_MEDIA_MODIFY_DATE: &str = "QuickTime:MediaModifyDate";
pub const GOOGLE_PHOTO_LAST_MODIFIED_TIME: &str = "google:photoLastModifiedTime";

pub const FILE_MODIFY_DATE: &str = "File:FileModifyDate";

/// Synthetic filename keys used for filename date inference
pub const SOURCE_FILE: &str = "exiftool:SourceFile";
pub const GOOGLE_TITLE: &str = "google:title";
pub const FILENAME_KEYS: [&str; 2] = [SOURCE_FILE, GOOGLE_TITLE];

// Merged field names
pub const FIELD_MAKE: &str = "make";
pub const FIELD_MODEL: &str = "model";
pub const FIELD_LENS: &str = "lens_model";
pub const FIELD_DESCRIPTION: &str = "description";
pub const FIELD_GPS_LATITUDE: &str = "gps_latitude";
pub const FIELD_GPS_LONGITUDE: &str = "gps_longitude";
pub const FIELD_GPS_DATETIME: &str = "gps_datetime";
pub const FIELD_TAKEN: &str = "date_time_original";
pub const FIELD_MODIFIED: &str = "modify_date";

/// Sentinel field under which export tag collisions are reported
pub const FIELD_EXPORT_TAGS: &str = "__export_tags__";

pub fn is_filename_key(key: &str) -> bool {
    FILENAME_KEYS.contains(&key)
}

/// EXIF, XMP and container tags written by the capturing device or an editor
pub fn is_embedded_key(key: &str) -> bool {
    ["EXIF:", "XMP:", "QuickTime:", "Keys:"]
        .iter()
        .any(|prefix| key.starts_with(prefix))
}

pub fn is_cloud_key(key: &str) -> bool {
    key.starts_with("google:") && !is_filename_key(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_families() {
        assert!(is_filename_key(GOOGLE_TITLE));
        assert!(!is_cloud_key(GOOGLE_TITLE));
        assert!(is_cloud_key(GOOGLE_PHOTO_TAKEN_TIME));
        assert!(is_embedded_key(XMP_DATETIME_ORIGINAL));
        assert!(is_embedded_key(QUICKTIME_CREATE_DATE));
        assert!(!is_embedded_key(FILE_MODIFY_DATE));
    }
}
