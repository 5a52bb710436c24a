//! Row codec for the `userdata` table.
//!
//! Maps [`UserDataRecord`] to column values and back. User ids are stored as
//! their 16 raw bytes, timestamps as RFC 3339 text, and every optional field
//! as SQL NULL.

use chrono::{DateTime, Datelike, NaiveDateTime, SecondsFormat, Utc};
use rusqlite::types::{FromSql, ToSql, ValueRef};
use rusqlite::Row;
use uuid::Uuid;

use playstate_core::error::{PlaystateError, Result};
use playstate_core::types::UserDataRecord;

/// Column list shared by every read, in the order [`decode_row`] expects.
pub const SELECT_COLUMNS: &str = "key, userId, rating, played, playCount, isFavorite, \
     playbackPositionTicks, lastPlayedDate, AudioStreamIndex, SubtitleStreamIndex";

/// Column values for one upsert, in [`SELECT_COLUMNS`] order.
#[derive(Debug)]
pub struct EncodedRow<'a> {
    key: &'a str,
    user_id: [u8; 16],
    rating: Option<f64>,
    played: bool,
    play_count: i32,
    is_favorite: bool,
    playback_position_ticks: i64,
    last_played_date: Option<String>,
    audio_stream_index: Option<i32>,
    subtitle_stream_index: Option<i32>,
}

impl<'a> EncodedRow<'a> {
    /// Bind parameters `?1..?10`.
    pub fn params(&self) -> [&dyn ToSql; 10] {
        [
            &self.key,
            &self.user_id,
            &self.rating,
            &self.played,
            &self.play_count,
            &self.is_favorite,
            &self.playback_position_ticks,
            &self.last_played_date,
            &self.audio_stream_index,
            &self.subtitle_stream_index,
        ]
    }
}

/// Encode `record` under the given identity.
///
/// The identity comes from the caller, not from the record, so a record can
/// be saved under the key and user the caller resolved.
pub fn encode<'a>(user_id: &Uuid, key: &'a str, record: &UserDataRecord) -> EncodedRow<'a> {
    EncodedRow {
        key,
        user_id: encode_user_id(user_id),
        rating: record.rating,
        played: record.played,
        play_count: record.play_count,
        is_favorite: record.is_favorite,
        playback_position_ticks: record.playback_position_ticks,
        last_played_date: record.last_played_date.as_ref().map(encode_timestamp),
        audio_stream_index: record.audio_stream_index,
        subtitle_stream_index: record.subtitle_stream_index,
    }
}

/// Reject field values the row format cannot read back unchanged.
///
/// SQLite stores NaN as NULL, and RFC 3339 only covers years 0000-9999.
pub fn validate(record: &UserDataRecord) -> Result<()> {
    if let Some(rating) = record.rating {
        if !rating.is_finite() {
            return Err(PlaystateError::invalid_argument(
                "rating",
                "must be a finite number",
            ));
        }
    }
    if let Some(ts) = &record.last_played_date {
        if !(0..=9999).contains(&ts.year()) {
            return Err(PlaystateError::invalid_argument(
                "last_played_date",
                "year must be between 0 and 9999",
            ));
        }
    }
    Ok(())
}

/// Decode a row selected with [`SELECT_COLUMNS`].
pub fn decode_row(row: &Row<'_>) -> Result<UserDataRecord> {
    let user_id_bytes: Vec<u8> = required(row, 1, "userId")?;

    Ok(UserDataRecord {
        key: required(row, 0, "key")?,
        user_id: decode_user_id(&user_id_bytes)?,
        rating: nullable(row, 2, "rating")?,
        played: required(row, 3, "played")?,
        play_count: required(row, 4, "playCount")?,
        is_favorite: required(row, 5, "isFavorite")?,
        playback_position_ticks: required(row, 6, "playbackPositionTicks")?,
        last_played_date: decode_timestamp_column(row, 7)?,
        audio_stream_index: nullable(row, 8, "AudioStreamIndex")?,
        subtitle_stream_index: nullable(row, 9, "SubtitleStreamIndex")?,
    })
}

pub fn encode_user_id(user_id: &Uuid) -> [u8; 16] {
    *user_id.as_bytes()
}

pub fn decode_user_id(bytes: &[u8]) -> Result<Uuid> {
    Uuid::from_slice(bytes)
        .map_err(|e| PlaystateError::Storage(format!("Invalid stored userId: {}", e)))
}

pub fn encode_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Zone-less forms written by SQLite and older clients, read as UTC.
const NAIVE_TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Parse a stored timestamp. Accepts RFC 3339 and the
/// [`NAIVE_TIMESTAMP_FORMATS`].
pub fn decode_timestamp(text: &str) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Ok(ts.with_timezone(&Utc));
    }
    NAIVE_TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| PlaystateError::Storage(format!("Invalid stored lastPlayedDate {:?}", text)))
}

fn decode_timestamp_column(row: &Row<'_>, idx: usize) -> Result<Option<DateTime<Utc>>> {
    match column_ref(row, idx, "lastPlayedDate")? {
        ValueRef::Null => Ok(None),
        ValueRef::Text(bytes) => {
            let text = std::str::from_utf8(bytes).map_err(|e| {
                PlaystateError::Storage(format!("Invalid stored lastPlayedDate: {}", e))
            })?;
            decode_timestamp(text).map(Some)
        }
        // Unix seconds.
        ValueRef::Integer(secs) => DateTime::from_timestamp(secs, 0).map(Some).ok_or_else(|| {
            PlaystateError::Storage(format!("lastPlayedDate out of range: {}", secs))
        }),
        other => Err(PlaystateError::Storage(format!(
            "Unexpected lastPlayedDate type: {}",
            other.data_type()
        ))),
    }
}

fn column_ref<'r>(row: &'r Row<'_>, idx: usize, name: &str) -> Result<ValueRef<'r>> {
    row.get_ref(idx)
        .map_err(|e| PlaystateError::Storage(format!("Failed to read {}: {}", name, e)))
}

/// Read a NOT NULL column. A NULL here means the row is corrupt.
fn required<T: FromSql>(row: &Row<'_>, idx: usize, name: &str) -> Result<T> {
    match column_ref(row, idx, name)? {
        ValueRef::Null => Err(PlaystateError::Storage(format!(
            "Unexpected NULL in {}",
            name
        ))),
        value => T::column_result(value)
            .map_err(|e| PlaystateError::Storage(format!("Failed to decode {}: {}", name, e))),
    }
}

/// Read a nullable column, checking for NULL before converting.
fn nullable<T: FromSql>(row: &Row<'_>, idx: usize, name: &str) -> Result<Option<T>> {
    match column_ref(row, idx, name)? {
        ValueRef::Null => Ok(None),
        value => T::column_result(value)
            .map(Some)
            .map_err(|e| PlaystateError::Storage(format!("Failed to decode {}: {}", name, e))),
    }
}
