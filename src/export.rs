use std::path::Path;

use anyhow::{Context, Result};
use rust_xlsxwriter::{Workbook, Worksheet};

use crate::features::{FEATURE_NAMES, FeatureFrame, FeatureRow};

const KEY_COLUMNS: [&str; 8] = [
    "player_id",
    "game_id",
    "team_id",
    "game_date",
    "opponent_team_id",
    "minutes",
    "player_points",
    "points_allowed",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReport {
    pub rows: usize,
    pub columns: usize,
}

/// Writes the frame to a workbook with a `Features` sheet (one row per feature
/// row, blank cells for missing values) and a `Missing` sheet with per-feature
/// null counts.
pub fn export_feature_frame(path: &Path, frame: &FeatureFrame) -> Result<ExportReport> {
    let mut workbook = Workbook::new();
    let header = KEY_COLUMNS
        .iter()
        .chain(FEATURE_NAMES.iter())
        .copied()
        .collect::<Vec<_>>();
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Features")?;
        write_header(sheet, &header)?;
        for (idx, row) in frame.rows.iter().enumerate() {
            write_feature_row(sheet, idx as u32 + 1, row)?;
        }
    }
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Missing")?;
        write_header(sheet, &["feature", "missing", "rows"])?;
        for (idx, (name, missing)) in FEATURE_NAMES
            .iter()
            .zip(frame.missing_counts())
            .enumerate()
        {
            let r = idx as u32 + 1;
            sheet.write_string(r, 0, *name)?;
            sheet.write_number(r, 1, missing as f64)?;
            sheet.write_number(r, 2, frame.len() as f64)?;
        }
    }

    workbook
        .save(path)
        .with_context(|| format!("failed writing workbook to {}", path.display()))?;

    Ok(ExportReport {
        rows: frame.len(),
        columns: header.len(),
    })
}

fn write_header(sheet: &mut Worksheet, header: &[&str]) -> Result<()> {
    for (col, name) in header.iter().enumerate() {
        sheet
            .write_string(0, col as u16, *name)
            .with_context(|| format!("write header {name}"))?;
    }
    Ok(())
}

fn write_feature_row(sheet: &mut Worksheet, r: u32, row: &FeatureRow) -> Result<()> {
    sheet.write_number(r, 0, row.player_id as f64)?;
    sheet.write_string(r, 1, &row.game_id)?;
    sheet.write_number(r, 2, row.team_id as f64)?;
    sheet.write_string(r, 3, row.game_date.format("%Y-%m-%d").to_string())?;
    sheet.write_number(r, 4, row.opponent_team_id as f64)?;
    sheet.write_number(r, 5, row.minutes)?;
    sheet.write_number(r, 6, row.player_points)?;
    if let Some(v) = row.points_allowed {
        sheet.write_number(r, 7, v)?;
    }
    let offset = KEY_COLUMNS.len() as u16;
    for (idx, value) in row.feature_vector().into_iter().enumerate() {
        if let Some(v) = value {
            sheet
                .write_number(r, offset + idx as u16, v)
                .with_context(|| format!("write cell ({r},{})", offset + idx as u16))?;
        }
    }
    Ok(())
}
