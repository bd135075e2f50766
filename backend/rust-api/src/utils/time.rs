use chrono::{DateTime, Datelike, Duration, Utc};
use mongodb::bson::DateTime as BsonDateTime;

/// Stored documents keep datetimes as native BSON dates, so query boundaries
/// must be BSON dates too.
pub fn chrono_to_bson(dt: DateTime<Utc>) -> BsonDateTime {
    BsonDateTime::from_millis(dt.timestamp_millis())
}

/// Serde converter for chrono::DateTime <-> mongodb::bson::DateTime, applied
/// to every datetime field on stored documents.
pub mod bson_datetime_as_chrono {
    use chrono::{DateTime, Utc};
    use mongodb::bson;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let bson_dt = bson::DateTime::from_millis(date.timestamp_millis());
        bson_dt.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bson_dt = bson::DateTime::deserialize(deserializer)?;
        DateTime::from_timestamp_millis(bson_dt.timestamp_millis())
            .ok_or_else(|| serde::de::Error::custom("timestamp out of range"))
    }
}

/// Midnight UTC of the given instant's calendar day.
pub fn start_of_day(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.date_naive().and_time(chrono::NaiveTime::MIN).and_utc()
}

/// Start of the week containing `dt`: Sunday 00:00 UTC.
pub fn start_of_week(dt: DateTime<Utc>) -> DateTime<Utc> {
    let midnight = start_of_day(dt);
    let days_from_sunday = midnight.weekday().num_days_from_sunday() as i64;
    midnight - Duration::days(days_from_sunday)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn start_of_day_truncates_time() {
        let dt = Utc.with_ymd_and_hms(2025, 3, 14, 15, 9, 26).unwrap();
        assert_eq!(
            start_of_day(dt),
            Utc.with_ymd_and_hms(2025, 3, 14, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn start_of_week_lands_on_sunday() {
        // 2025-03-14 is a Friday; the enclosing week starts Sunday 2025-03-09.
        let dt = Utc.with_ymd_and_hms(2025, 3, 14, 15, 9, 26).unwrap();
        assert_eq!(
            start_of_week(dt),
            Utc.with_ymd_and_hms(2025, 3, 9, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn start_of_week_is_identity_on_sunday_midnight() {
        let sunday = Utc.with_ymd_and_hms(2025, 3, 9, 0, 0, 0).unwrap();
        assert_eq!(start_of_week(sunday), sunday);
    }

    #[test]
    fn chrono_to_bson_preserves_millis() {
        let dt = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        assert_eq!(chrono_to_bson(dt).timestamp_millis(), dt.timestamp_millis());
    }
}
