//! In-memory workbook fixtures.

#![allow(dead_code)]

use rust_xlsxwriter::{Format, Workbook};

/// One cell of a fixture row.
#[derive(Debug, Clone, Copy)]
pub enum Cell<'a> {
    Text(&'a str),
    Number(f64),
    Bool(bool),
    /// Excel serial number shown with a date/time format.
    Date(f64, &'a str),
    Blank,
}

/// Build an xlsx file whose first sheet holds `rows`, starting at A1.
pub fn workbook(rows: &[Vec<Cell<'_>>]) -> Vec<u8> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();

    for (r, row) in rows.iter().enumerate() {
        for (c, cell) in row.iter().enumerate() {
            let (r, c) = (r as u32, c as u16);
            match *cell {
                // Excel has no empty string cells; leave it blank.
                Cell::Text("") | Cell::Blank => {}
                Cell::Text(s) => {
                    sheet.write_string(r, c, s).unwrap();
                }
                Cell::Number(n) => {
                    sheet.write_number(r, c, n).unwrap();
                }
                Cell::Bool(b) => {
                    sheet.write_boolean(r, c, b).unwrap();
                }
                Cell::Date(serial, format) => {
                    let format = Format::new().set_num_format(format);
                    sheet.write_number_with_format(r, c, serial, &format).unwrap();
                }
            }
        }
    }

    workbook.save_to_buffer().unwrap()
}

/// Single-column workbook: a header followed by text values.
pub fn column(header: &str, values: &[&str]) -> Vec<u8> {
    let mut rows = vec![vec![Cell::Text(header)]];
    rows.extend(values.iter().map(|v| vec![Cell::Text(v)]));
    workbook(&rows)
}

/// Single-column workbook with `n` distinct values `<prefix>-1 ..= <prefix>-n`.
pub fn numbered(prefix: &str, n: usize) -> (Vec<u8>, Vec<String>) {
    let values: Vec<String> = (1..=n).map(|i| format!("{prefix}-{i}")).collect();
    let refs: Vec<&str> = values.iter().map(String::as_str).collect();
    (column("Header", &refs), values)
}
