//! First-column extraction.
//!
//! Opens a workbook from memory (xlsx, xlsm, xlsb, xls and ods are detected
//! automatically), reads the first worksheet, discards the header row and
//! returns the cleaned values of column A in row order.
//!
//! Cell values are normalized at this boundary into [`CellText`], so nothing
//! downstream ever looks at spreadsheet type tags.

use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Range, Reader};
use chrono::{NaiveDateTime, NaiveTime};

use crate::error::ParseError;

/// A spreadsheet cell reduced to text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellText {
    /// No value in the cell.
    Absent,
    /// Canonical string form of the value, untrimmed.
    Present(String),
}

impl CellText {
    /// Turn the cell into a record: trimmed, non-empty, on a single line.
    ///
    /// Embedded line breaks collapse to single spaces, so each record stays on
    /// one line of the merged output.
    pub fn into_record(self) -> Option<String> {
        let Self::Present(text) = self else {
            return None;
        };

        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }

        // Records are newline-separated in the merged output.
        if trimmed.contains(['\n', '\r']) {
            return Some(
                trimmed
                    .split(['\n', '\r'])
                    .map(str::trim)
                    .filter(|part| !part.is_empty())
                    .collect::<Vec<_>>()
                    .join(" "),
            );
        }

        Some(trimmed.to_string())
    }
}

impl From<&Data> for CellText {
    fn from(cell: &Data) -> Self {
        match cell {
            Data::Empty => Self::Absent,
            Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => {
                Self::Present(s.clone())
            }
            Data::Int(n) => Self::Present(n.to_string()),
            Data::Float(n) => Self::Present(format_number(*n)),
            Data::Bool(b) => Self::Present(if *b { "TRUE" } else { "FALSE" }.to_string()),
            Data::Error(e) => Self::Present(e.to_string()),
            // Serial 60, Excel's fictitious 1900-02-29, reads as 1900-02-28.
            Data::DateTime(dt) => {
                let serial = dt.as_f64();
                if !dt.is_duration() {
                    if let Some(value) = dt.as_datetime() {
                        return Self::Present(format_datetime(value, serial));
                    }
                }
                Self::Present(format_number(serial))
            }
        }
    }
}

/// Integral floats print without a fractional part.
#[allow(clippy::cast_possible_truncation)]
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

fn format_datetime(value: NaiveDateTime, serial: f64) -> String {
    if serial.abs() < 1.0 {
        // Time of day without a date.
        value.format("%H:%M:%S").to_string()
    } else if value.time() == NaiveTime::MIN {
        value.format("%Y-%m-%d").to_string()
    } else {
        value.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

/// Extract the cleaned first-column values below the header.
///
/// Fails with [`ParseError`] when `bytes` is not a decodable workbook. An
/// empty sheet, a header-only sheet, or a sheet with nothing in column A
/// yields an empty list.
pub fn extract(bytes: &[u8]) -> Result<Vec<String>, ParseError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))
        .map_err(|e| ParseError::Unreadable(e.to_string()))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or(ParseError::NoWorksheets)?
        .map_err(|e| ParseError::Unreadable(e.to_string()))?;

    let records = first_column(&range);

    tracing::debug!(
        rows = range.height(),
        records = records.len(),
        "Extracted first column"
    );

    Ok(records)
}

/// Records from column A of `range`, skipping the first row of the range.
///
/// The range is the sheet's used area: its first row is the header. If the
/// used area starts right of column A there is no first column to read.
pub fn first_column(range: &Range<Data>) -> Vec<String> {
    let Some((_, start_col)) = range.start() else {
        return Vec::new();
    };
    if start_col != 0 {
        return Vec::new();
    }

    range
        .rows()
        .skip(1)
        .filter_map(|row| row.first())
        .filter_map(|cell| CellText::from(cell).into_record())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::{ExcelDateTime, ExcelDateTimeType};

    fn record(cell: Data) -> Option<String> {
        CellText::from(&cell).into_record()
    }

    #[test]
    fn absent_and_blank_cells_are_dropped() {
        assert_eq!(record(Data::Empty), None);
        assert_eq!(record(Data::String(String::new())), None);
        assert_eq!(record(Data::String("   \t ".into())), None);
    }

    #[test]
    fn strings_are_trimmed() {
        assert_eq!(record(Data::String("  Alice ".into())), Some("Alice".into()));
    }

    #[test]
    fn literal_none_is_kept() {
        assert_eq!(record(Data::String("None".into())), Some("None".into()));
    }

    #[test]
    fn numbers_use_canonical_form() {
        assert_eq!(record(Data::Int(42)), Some("42".into()));
        assert_eq!(record(Data::Float(42.0)), Some("42".into()));
        assert_eq!(record(Data::Float(-7.0)), Some("-7".into()));
        assert_eq!(record(Data::Float(3.25)), Some("3.25".into()));
        assert_eq!(record(Data::Float(0.1)), Some("0.1".into()));
    }

    #[test]
    fn huge_floats_keep_float_form() {
        assert_eq!(record(Data::Float(1e20)), Some(format!("{}", 1e20_f64)));
    }

    #[test]
    fn booleans_use_excel_spelling() {
        assert_eq!(record(Data::Bool(true)), Some("TRUE".into()));
        assert_eq!(record(Data::Bool(false)), Some("FALSE".into()));
    }

    #[test]
    fn error_cells_render_their_literal() {
        assert_eq!(
            record(Data::Error(calamine::CellErrorType::Div0)),
            Some("#DIV/0!".into())
        );
    }

    #[test]
    fn iso_strings_pass_through() {
        assert_eq!(
            record(Data::DateTimeIso("2024-01-05T10:00:00".into())),
            Some("2024-01-05T10:00:00".into())
        );
        assert_eq!(record(Data::DurationIso("PT1H".into())), Some("PT1H".into()));
    }

    #[test]
    fn embedded_line_breaks_are_collapsed() {
        assert_eq!(
            record(Data::String("first line\r\n  second line\n".into())),
            Some("first line second line".into())
        );
    }

    #[test]
    fn datetime_formatting() {
        let date = chrono::NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        assert_eq!(
            format_datetime(date.and_hms_opt(0, 0, 0).unwrap(), 45296.0),
            "2024-01-05"
        );
        assert_eq!(
            format_datetime(date.and_hms_opt(12, 30, 0).unwrap(), 45296.52),
            "2024-01-05 12:30:00"
        );
        let epoch = chrono::NaiveDate::from_ymd_opt(1899, 12, 31).unwrap();
        assert_eq!(
            format_datetime(epoch.and_hms_opt(6, 0, 0).unwrap(), 0.25),
            "06:00:00"
        );
    }

    #[test]
    fn leap_year_bug_serial_reads_as_real_date() {
        let serial = |value| {
            record(Data::DateTime(ExcelDateTime::new(
                value,
                ExcelDateTimeType::DateTime,
                false,
            )))
        };
        assert_eq!(serial(60.0), Some("1900-02-28".into()));
        assert_eq!(serial(61.0), Some("1900-03-01".into()));
    }

    #[test]
    fn garbage_bytes_fail_to_parse() {
        let err = extract(b"definitely not a workbook").unwrap_err();
        assert!(matches!(err, ParseError::Unreadable(_)));
    }

    #[test]
    fn empty_buffer_fails_to_parse() {
        assert!(extract(&[]).is_err());
    }

    #[test]
    fn first_column_of_empty_range() {
        let range: Range<Data> = Range::empty();
        assert!(first_column(&range).is_empty());
    }

    #[test]
    fn first_column_skips_header_and_blanks() {
        let mut range: Range<Data> = Range::new((0, 0), (4, 1));
        range.set_value((0, 0), Data::String("Name".into()));
        range.set_value((0, 1), Data::String("Note".into()));
        range.set_value((1, 0), Data::String("Alice".into()));
        range.set_value((2, 0), Data::String(String::new()));
        range.set_value((3, 0), Data::String("  ".into()));
        range.set_value((3, 1), Data::String("ignored".into()));
        range.set_value((4, 0), Data::String("Bob".into()));

        assert_eq!(first_column(&range), vec!["Alice", "Bob"]);
    }

    #[test]
    fn first_column_missing_when_range_starts_at_b() {
        let mut range: Range<Data> = Range::new((0, 1), (2, 1));
        range.set_value((0, 1), Data::String("Header".into()));
        range.set_value((1, 1), Data::String("value".into()));

        assert!(first_column(&range).is_empty());
    }

    #[test]
    fn header_is_first_used_row() {
        let mut range: Range<Data> = Range::new((2, 0), (4, 0));
        range.set_value((2, 0), Data::String("Header".into()));
        range.set_value((3, 0), Data::Int(1));
        range.set_value((4, 0), Data::Int(2));

        assert_eq!(first_column(&range), vec!["1", "2"]);
    }
}
