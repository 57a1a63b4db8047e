//! Note key encoding.
//!
//! # Responsibility
//! - Format instants into fixed-width, lexicographically sortable keys.
//! - Keep keys unique within one process even when saves share a second.
//!
//! # Invariants
//! - Base keys are `YYYYMMDD_HHMMSS` (or `YYYYMMDD_HHMMSS_mmm` at millisecond
//!   resolution), zero-padded.
//! - For one timezone policy, `t1 < t2` by at least one resolution unit implies
//!   `encode(t1) < encode(t2)` as strings.
//! - Keys issued by one `KeySequencer` are strictly increasing.
//! - Keys never contain `. $ # [ ] /`, which remote paths reject.

use chrono::{DateTime, FixedOffset, Local, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

static NOTE_KEY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{8}_\d{6}(_\d{3})?(-\d{6})?$").expect("valid note key regex")
});

const SECONDS_FORMAT: &str = "%Y%m%d_%H%M%S";
const MILLIS_FORMAT: &str = "%Y%m%d_%H%M%S_%3f";
/// Largest counter that fits the six-digit `-NNNNNN` suffix.
const MAX_SEQUENCE: u32 = 999_999;

/// Errors raised while parsing keys or key policies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    InvalidKey(String),
    InvalidTimezone(String),
    InvalidResolution(String),
    /// Every suffix for this base key has been issued.
    SequenceExhausted(String),
}

impl Display for KeyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidKey(value) => write!(f, "invalid note key: `{value}`"),
            Self::InvalidTimezone(value) => write!(
                f,
                "invalid key timezone `{value}`; expected local|utc|+HH:MM|-HH:MM"
            ),
            Self::InvalidResolution(value) => write!(
                f,
                "invalid key resolution `{value}`; expected seconds|millis"
            ),
            Self::SequenceExhausted(base) => {
                write!(f, "no key suffix left for `{base}`; retry in the next second")
            }
        }
    }
}

impl Error for KeyError {}

/// Storage key of one note.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteKey(String);

impl NoteKey {
    /// Parses and validates a key string.
    pub fn parse(value: &str) -> Result<Self, KeyError> {
        if Self::is_well_formed(value) {
            Ok(Self(value.to_string()))
        } else {
            Err(KeyError::InvalidKey(value.to_string()))
        }
    }

    /// Wraps a key read back from a backing store as-is.
    ///
    /// Stored keys may predate the current grammar; they still order as
    /// plain strings.
    pub(crate) fn from_stored(value: String) -> Self {
        Self(value)
    }

    /// Returns whether `value` follows the note key grammar.
    pub fn is_well_formed(value: &str) -> bool {
        NOTE_KEY_RE.is_match(value)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl Display for NoteKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for NoteKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Calendar/timezone policy applied before formatting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyTimezone {
    /// Device local time. Keys from devices in different zones do not interleave correctly.
    #[default]
    Local,
    Utc,
    Fixed(FixedOffset),
}

impl FromStr for KeyTimezone {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "local" => return Ok(Self::Local),
            "utc" | "z" => return Ok(Self::Utc),
            _ => {}
        }
        parse_fixed_offset(trimmed)
            .map(Self::Fixed)
            .ok_or_else(|| KeyError::InvalidTimezone(trimmed.to_string()))
    }
}

impl Display for KeyTimezone {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Utc => f.write_str("utc"),
            Self::Fixed(offset) => write!(f, "{offset}"),
        }
    }
}

/// Precision of the timestamp part of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyResolution {
    #[default]
    Seconds,
    Millis,
}

impl FromStr for KeyResolution {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "seconds" | "second" | "s" => Ok(Self::Seconds),
            "millis" | "milliseconds" | "ms" => Ok(Self::Millis),
            other => Err(KeyError::InvalidResolution(other.to_string())),
        }
    }
}

/// Stateless instant → key formatter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyEncoder {
    timezone: KeyTimezone,
    resolution: KeyResolution,
}

impl KeyEncoder {
    pub fn new(timezone: KeyTimezone, resolution: KeyResolution) -> Self {
        Self {
            timezone,
            resolution,
        }
    }

    pub fn timezone(&self) -> KeyTimezone {
        self.timezone
    }

    pub fn resolution(&self) -> KeyResolution {
        self.resolution
    }

    /// Formats `instant` as a base key. Total over all representable instants.
    pub fn encode(&self, instant: DateTime<Utc>) -> NoteKey {
        let pattern = match self.resolution {
            KeyResolution::Seconds => SECONDS_FORMAT,
            KeyResolution::Millis => MILLIS_FORMAT,
        };
        let formatted = match self.timezone {
            KeyTimezone::Local => instant.with_timezone(&Local).format(pattern).to_string(),
            KeyTimezone::Utc => instant.format(pattern).to_string(),
            KeyTimezone::Fixed(offset) => {
                instant.with_timezone(&offset).format(pattern).to_string()
            }
        };
        NoteKey(formatted)
    }
}

/// Issues strictly increasing keys for one process.
///
/// When the encoded base is not newer than the last issued base (two saves in
/// the same second, or the clock stepping backwards), the last base is reused
/// with a `-NNNNNN` counter suffix. `-` sorts below `_` and digits, so a
/// suffixed key orders after its base and before the next base.
#[derive(Debug, Clone, Default)]
pub struct KeySequencer {
    encoder: KeyEncoder,
    last_base: Option<String>,
    counter: u32,
}

impl KeySequencer {
    pub fn new(encoder: KeyEncoder) -> Self {
        Self {
            encoder,
            last_base: None,
            counter: 0,
        }
    }

    pub fn encoder(&self) -> &KeyEncoder {
        &self.encoder
    }

    /// Returns the next unique key for `instant`.
    ///
    /// # Errors
    /// - `KeyError::SequenceExhausted` once `-999999` has been issued for the
    ///   current base and the clock has not moved past it.
    pub fn next_key(&mut self, instant: DateTime<Utc>) -> Result<NoteKey, KeyError> {
        let base = self.encoder.encode(instant).into_string();
        match self.last_base.as_deref() {
            Some(last) if base.as_str() <= last => {
                if self.counter >= MAX_SEQUENCE {
                    return Err(KeyError::SequenceExhausted(last.to_string()));
                }
                self.counter += 1;
                Ok(NoteKey(format!("{last}-{:06}", self.counter)))
            }
            _ => {
                self.last_base = Some(base.clone());
                self.counter = 0;
                Ok(NoteKey(base))
            }
        }
    }
}

fn parse_fixed_offset(value: &str) -> Option<FixedOffset> {
    let (sign, rest) = match value.as_bytes().first()? {
        b'+' => (1, &value[1..]),
        b'-' => (-1, &value[1..]),
        _ => return None,
    };
    let (hours, minutes) = match rest.split_once(':') {
        Some((h, m)) => (h, m),
        None if rest.len() == 4 => rest.split_at(2),
        None if rest.len() <= 2 => (rest, "0"),
        None => return None,
    };
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if !(0..=23).contains(&hours) || !(0..=59).contains(&minutes) {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

#[cfg(test)]
mod tests {
    use super::{
        KeyEncoder, KeyError, KeyResolution, KeySequencer, KeyTimezone, NoteKey, MAX_SEQUENCE,
    };
    use chrono::{Duration, FixedOffset, TimeZone, Utc};

    fn utc_encoder() -> KeyEncoder {
        KeyEncoder::new(KeyTimezone::Utc, KeyResolution::Seconds)
    }

    #[test]
    fn encode_uses_fixed_width_zero_padded_fields() {
        let instant = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(utc_encoder().encode(instant).as_str(), "20240102_030405");
    }

    #[test]
    fn encode_applies_fixed_offset_across_day_boundary() {
        let instant = Utc.with_ymd_and_hms(2024, 1, 1, 23, 30, 0).unwrap();
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let encoder = KeyEncoder::new(KeyTimezone::Fixed(offset), KeyResolution::Seconds);
        assert_eq!(encoder.encode(instant).as_str(), "20240102_013000");
    }

    #[test]
    fn encode_millis_resolution_appends_fraction() {
        let instant = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
            + Duration::milliseconds(7);
        let encoder = KeyEncoder::new(KeyTimezone::Utc, KeyResolution::Millis);
        assert_eq!(encoder.encode(instant).as_str(), "20240101_000000_007");
    }

    #[test]
    fn encode_preserves_order_for_instants_one_second_apart() {
        let encoder = utc_encoder();
        let mut instant = Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 55).unwrap();
        let mut previous = encoder.encode(instant);
        for _ in 0..20 {
            instant += Duration::seconds(1);
            let next = encoder.encode(instant);
            assert!(previous.as_str() < next.as_str(), "{previous} !< {next}");
            previous = next;
        }
    }

    #[test]
    fn sequencer_suffixes_keys_within_same_second() {
        let mut sequencer = KeySequencer::new(utc_encoder());
        let instant = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        let first = sequencer.next_key(instant).unwrap();
        let second = sequencer.next_key(instant).unwrap();
        let third = sequencer.next_key(instant + Duration::milliseconds(400)).unwrap();
        let next_second = sequencer.next_key(instant + Duration::seconds(1)).unwrap();

        assert_eq!(first.as_str(), "20240101_000000");
        assert_eq!(second.as_str(), "20240101_000000-000001");
        assert_eq!(third.as_str(), "20240101_000000-000002");
        assert_eq!(next_second.as_str(), "20240101_000001");
        assert!(first < second && second < third && third < next_second);
    }

    #[test]
    fn sequencer_stays_monotonic_when_clock_steps_back() {
        let mut sequencer = KeySequencer::new(utc_encoder());
        let instant = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 10).unwrap();

        let first = sequencer.next_key(instant).unwrap();
        let rewound = sequencer.next_key(instant - Duration::seconds(5)).unwrap();
        assert!(first < rewound);
        assert_eq!(rewound.as_str(), "20240101_000010-000001");
    }

    #[test]
    fn sequencer_stops_at_last_six_digit_suffix() {
        let mut sequencer = KeySequencer::new(utc_encoder());
        let instant = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        sequencer.next_key(instant).unwrap();
        sequencer.counter = MAX_SEQUENCE - 1;

        let last = sequencer.next_key(instant).unwrap();
        assert_eq!(last.as_str(), "20240101_000000-999999");
        assert!(NoteKey::is_well_formed(last.as_str()));
        assert_eq!(
            sequencer.next_key(instant).unwrap_err(),
            KeyError::SequenceExhausted("20240101_000000".to_string())
        );

        let next = sequencer.next_key(instant + Duration::seconds(1)).unwrap();
        assert_eq!(next.as_str(), "20240101_000001");
        assert!(last < next);
    }

    #[test]
    fn note_key_grammar() {
        for ok in [
            "20240101_000000",
            "20240101_000000_123",
            "20240101_000000-000001",
            "20240101_000000_123-000042",
        ] {
            assert!(NoteKey::parse(ok).is_ok(), "{ok} should parse");
        }
        for bad in ["", "2024-01-01", "20240101_00000", "20240101_000000.123", "x20240101_000000"] {
            assert!(NoteKey::parse(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn timezone_parses_named_and_offset_forms() {
        assert_eq!("LOCAL".parse::<KeyTimezone>().unwrap(), KeyTimezone::Local);
        assert_eq!(" utc ".parse::<KeyTimezone>().unwrap(), KeyTimezone::Utc);
        assert_eq!(
            "+05:30".parse::<KeyTimezone>().unwrap(),
            KeyTimezone::Fixed(FixedOffset::east_opt(5 * 3600 + 30 * 60).unwrap())
        );
        assert_eq!(
            "-0800".parse::<KeyTimezone>().unwrap(),
            KeyTimezone::Fixed(FixedOffset::west_opt(8 * 3600).unwrap())
        );
        assert!("+25:00".parse::<KeyTimezone>().is_err());
        assert!("Europe/Paris".parse::<KeyTimezone>().is_err());
    }

    #[test]
    fn resolution_parses_aliases() {
        assert_eq!("Seconds".parse::<KeyResolution>().unwrap(), KeyResolution::Seconds);
        assert_eq!("ms".parse::<KeyResolution>().unwrap(), KeyResolution::Millis);
        assert!("minutes".parse::<KeyResolution>().is_err());
    }
}
