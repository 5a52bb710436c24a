use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// User data
// =============================================================================

/// Per-user playback state for a single media item.
///
/// `(key, user_id)` identifies the record. Saving a record with an existing
/// pair replaces the stored row. Optional fields are real absences and are
/// never encoded with sentinel values.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UserDataRecord {
    /// Media item key, unique only within a user's scope.
    pub key: String,
    /// Owning user.
    pub user_id: Uuid,
    /// User rating, if the user rated the item.
    pub rating: Option<f64>,
    /// Watched status.
    pub played: bool,
    /// Number of times played.
    pub play_count: i32,
    pub is_favorite: bool,
    /// Resume offset in ticks (100ns units).
    pub playback_position_ticks: i64,
    pub last_played_date: Option<DateTime<Utc>>,
    /// Last selected audio stream.
    pub audio_stream_index: Option<i32>,
    /// Last selected subtitle stream.
    pub subtitle_stream_index: Option<i32>,
}

impl UserDataRecord {
    /// Create an unplayed record for `(user_id, key)` with every other field
    /// at its default.
    pub fn new(user_id: Uuid, key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            user_id,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_new_record_defaults() {
        let user = Uuid::new_v4();
        let record = UserDataRecord::new(user, "movie:42");
        assert_eq!(record.key, "movie:42");
        assert_eq!(record.user_id, user);
        assert!(!record.played);
        assert_eq!(record.play_count, 0);
        assert_eq!(record.rating, None);
        assert_eq!(record.last_played_date, None);
        assert_eq!(record.audio_stream_index, None);
        assert_eq!(record.subtitle_stream_index, None);
    }

    #[test]
    fn test_serde_keeps_absent_fields_absent() {
        let record = UserDataRecord {
            played: true,
            play_count: 3,
            last_played_date: Some(Utc.with_ymd_and_hms(2024, 5, 1, 20, 30, 0).unwrap()),
            ..UserDataRecord::new(Uuid::new_v4(), "episode:7")
        };

        let json = serde_json::to_string(&record).unwrap();
        let back: UserDataRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
        assert_eq!(back.rating, None);
        assert_eq!(back.audio_stream_index, None);
    }
}
