// XLSX extractor
use anyhow::{Context, Result};
use calamine::{Data, Range, Reader, Xlsx};
use std::io::Cursor;

pub struct XlsxExtractor;

impl XlsxExtractor {
    /// Extract every worksheet as tab-separated rows, in workbook order.
    pub fn extract(bytes: &[u8]) -> Result<String> {
        let mut workbook: Xlsx<_> =
            Xlsx::new(Cursor::new(bytes)).context("Failed to open XLSX workbook")?;

        let mut sheets = Vec::new();
        for sheet_name in workbook.sheet_names() {
            let range = workbook
                .worksheet_range(&sheet_name)
                .with_context(|| format!("Failed to read worksheet '{}'", sheet_name))?;
            sheets.push((sheet_name, sheet_rows(&range)));
        }

        Ok(Self::render_sheets(&sheets))
    }

    /// One header line per sheet, one tab-joined line per row, a blank line
    /// between sheets.
    fn render_sheets(sheets: &[(String, Vec<Vec<String>>)]) -> String {
        sheets
            .iter()
            .map(|(name, rows)| {
                let mut block = vec![sheet_marker(name)];
                block.extend(rows.iter().map(|row| row.join("\t")));
                block.join("\n")
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

pub fn sheet_marker(name: &str) -> String {
    format!("--- 시트: {} ---", name)
}

/// Rows of a used range, anchored at A1. calamine trims leading empty rows
/// and columns, so they are padded back in.
fn sheet_rows(range: &Range<Data>) -> Vec<Vec<String>> {
    let Some((first_row, first_col)) = range.start() else {
        return Vec::new();
    };

    let mut rows: Vec<Vec<String>> = (0..first_row).map(|_| Vec::new()).collect();
    rows.extend(range.rows().map(|row| {
        let mut cells = vec![String::new(); first_col as usize];
        cells.extend(row.iter().map(cell_to_string));
        cells
    }));
    rows
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::Float(value) if value.fract() == 0.0 && value.abs() < 1e15 => {
            format!("{}", *value as i64)
        }
        _ => cell.to_string(),
    }
}
