use crate::err::DeserializationResult;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use jiff::Timestamp;
use jiff::civil::DateTime;
use jiff::tz::Offset;
use std::fmt;
use std::io::{self, Cursor, Write};

/// `EFI_UNSPECIFIED_TIMEZONE`, read as UTC.
pub const UNSPECIFIED_TIMEZONE: i16 = 0x07FF;

pub const UEFI_TIME_SIZE: usize = 16;

/// Packed `EFI_TIME`.
///
/// ```text
///  Year:       1900 - 9999
///  Month:      1 - 12
///  Day:        1 - 31
///  Hour:       0 - 23
///  Minute:     0 - 59
///  Second:     0 - 59
///  Nanosecond: 0 - 999,999,999
///  TimeZone:   -1440 to 1440 or 2047
/// ```
///
/// An all-zero value (in practice, a zero year) means "no timestamp".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UefiTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub pad1: u8,
    pub nanosecond: u32,
    pub timezone: i16,
    pub daylight: u8,
    pub pad2: u8,
}

impl UefiTime {
    pub fn from_stream(stream: &mut Cursor<&[u8]>) -> DeserializationResult<UefiTime> {
        Ok(UefiTime {
            year: try_read!(stream, read_u16, "timestamp year"),
            month: try_read!(stream, read_u8, "timestamp month"),
            day: try_read!(stream, read_u8, "timestamp day"),
            hour: try_read!(stream, read_u8, "timestamp hour"),
            minute: try_read!(stream, read_u8, "timestamp minute"),
            second: try_read!(stream, read_u8, "timestamp second"),
            pad1: try_read!(stream, read_u8, "timestamp padding"),
            nanosecond: try_read!(stream, read_u32, "timestamp nanosecond"),
            timezone: try_read!(stream, read_i16, "timestamp timezone"),
            daylight: try_read!(stream, read_u8, "timestamp daylight"),
            pad2: try_read!(stream, read_u8, "timestamp padding"),
        })
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u16::<LittleEndian>(self.year)?;
        w.write_u8(self.month)?;
        w.write_u8(self.day)?;
        w.write_u8(self.hour)?;
        w.write_u8(self.minute)?;
        w.write_u8(self.second)?;
        w.write_u8(self.pad1)?;
        w.write_u32::<LittleEndian>(self.nanosecond)?;
        w.write_i16::<LittleEndian>(self.timezone)?;
        w.write_u8(self.daylight)?;
        w.write_u8(self.pad2)
    }

    pub fn is_unset(&self) -> bool {
        self.year == 0
    }

    pub fn offset(&self) -> Result<Offset, jiff::Error> {
        if self.timezone == UNSPECIFIED_TIMEZONE {
            Ok(Offset::UTC)
        } else {
            Offset::from_seconds(i32::from(self.timezone) * 60)
        }
    }

    /// The instant this stamp denotes, `None` when unset.
    ///
    /// Fields outside their calendar range fail instead of wrapping.
    pub fn to_timestamp(&self) -> Result<Option<Timestamp>, jiff::Error> {
        if self.is_unset() {
            return Ok(None);
        }

        // Saturated values are rejected by jiff's own range checks.
        let datetime = DateTime::new(
            i16::try_from(self.year).unwrap_or(i16::MAX),
            i8::try_from(self.month).unwrap_or(i8::MAX),
            i8::try_from(self.day).unwrap_or(i8::MAX),
            i8::try_from(self.hour).unwrap_or(i8::MAX),
            i8::try_from(self.minute).unwrap_or(i8::MAX),
            i8::try_from(self.second).unwrap_or(i8::MAX),
            i32::try_from(self.nanosecond).unwrap_or(i32::MAX),
        )?;

        Ok(Some(self.offset()?.to_timestamp(datetime)?))
    }

    /// Stores `timestamp` as UTC wall-clock fields with a zero offset.
    ///
    /// Returns `None` for years before 1, which an `EFI_TIME` cannot hold.
    pub fn from_timestamp(timestamp: Timestamp) -> Option<UefiTime> {
        let datetime = Offset::UTC.to_datetime(timestamp);
        let year = u16::try_from(datetime.year()).ok().filter(|&y| y > 0)?;

        Some(UefiTime {
            year,
            month: datetime.month().unsigned_abs(),
            day: datetime.day().unsigned_abs(),
            hour: datetime.hour().unsigned_abs(),
            minute: datetime.minute().unsigned_abs(),
            second: datetime.second().unsigned_abs(),
            pad1: 0,
            nanosecond: datetime.subsec_nanosecond().unsigned_abs(),
            timezone: 0,
            daylight: 0,
            pad2: 0,
        })
    }
}

impl fmt::Display for UefiTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )?;
        // Microsecond precision, sub-microsecond digits are dropped.
        let microsecond = self.nanosecond / 1000;
        if microsecond != 0 {
            write!(f, ".{:06}", microsecond)?;
        }
        if self.timezone == UNSPECIFIED_TIMEZONE {
            write!(f, "+00:00")
        } else {
            let sign = if self.timezone < 0 { '-' } else { '+' };
            let minutes = i32::from(self.timezone).abs();
            write!(f, "{sign}{:02}:{:02}", minutes / 60, minutes % 60)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn stamp(timezone: i16) -> UefiTime {
        UefiTime {
            year: 2021,
            month: 3,
            day: 4,
            hour: 5,
            minute: 6,
            second: 7,
            nanosecond: 500,
            timezone,
            ..UefiTime::default()
        }
    }

    #[test]
    fn test_parses_packed_layout() {
        let raw: [u8; 16] = [
            0xe5, 0x07, 3, 4, 5, 6, 7, 0, 0xf4, 0x01, 0, 0, 0xff, 0x07, 1, 0,
        ];
        let mut cursor = Cursor::new(&raw[..]);
        let time = UefiTime::from_stream(&mut cursor).unwrap();

        assert_eq!(cursor.position(), UEFI_TIME_SIZE as u64);
        assert_eq!(
            time,
            UefiTime {
                daylight: 1,
                ..stamp(UNSPECIFIED_TIMEZONE)
            }
        );

        let mut out = vec![];
        time.write_to(&mut out).unwrap();
        assert_eq!(out, raw);
    }

    #[test]
    fn test_zero_year_has_no_timestamp() {
        assert_eq!(UefiTime::default().to_timestamp().unwrap(), None);
        let odd = UefiTime {
            month: 7,
            ..UefiTime::default()
        };
        assert_eq!(odd.to_timestamp().unwrap(), None);
    }

    #[test]
    fn test_unspecified_timezone_is_utc() {
        let ts = stamp(UNSPECIFIED_TIMEZONE).to_timestamp().unwrap().unwrap();
        assert_eq!(ts.to_string(), "2021-03-04T05:06:07.0000005Z");
    }

    #[test]
    fn test_offset_is_applied() {
        let ts = stamp(120).to_timestamp().unwrap().unwrap();
        assert_eq!(ts.to_string(), "2021-03-04T03:06:07.0000005Z");
        assert_eq!(stamp(-90).to_string(), "2021-03-04 05:06:07-01:30");
    }

    #[test]
    fn test_display_shows_microseconds() {
        let time = UefiTime {
            nanosecond: 250_000_900,
            ..stamp(0)
        };
        assert_eq!(time.to_string(), "2021-03-04 05:06:07.250000+00:00");
    }

    #[test]
    fn test_rejects_out_of_range_fields() {
        let bad_month = UefiTime {
            month: 13,
            ..stamp(0)
        };
        assert!(bad_month.to_timestamp().is_err());

        let bad_zone = stamp(i16::MAX);
        assert!(bad_zone.to_timestamp().is_err());
    }

    #[test]
    fn test_timestamp_round_trips_through_utc_fields() {
        let ts: Timestamp = "2021-03-04T05:06:07.25+02:00".parse().unwrap();
        let time = UefiTime::from_timestamp(ts).unwrap();

        assert_eq!(time.hour, 3);
        assert_eq!(time.nanosecond, 250_000_000);
        assert_eq!(time.timezone, 0);
        assert_eq!(time.to_timestamp().unwrap(), Some(ts));
    }

    #[test]
    fn test_year_zero_is_not_representable() {
        let ts: Timestamp = "0000-06-01T00:00:00Z".parse().unwrap();
        assert_eq!(UefiTime::from_timestamp(ts), None);
    }
}
