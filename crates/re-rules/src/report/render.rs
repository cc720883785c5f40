//! PDF and CSV rendering for report output (spec §4.H): one page with a
//! title block and a metric table for PDF, one row per metric/timestamp
//! /value for CSV.

use chrono::Utc;
use printpdf::{BuiltinFont, Mm, PdfDocument};

use re_core::error::RulesError;
use re_core::ports::SenmlRecord;

const PAGE_WIDTH_MM: f32 = 210.0;
const PAGE_HEIGHT_MM: f32 = 297.0;
const ROW_HEIGHT_MM: f32 = 8.0;
const BOTTOM_MARGIN_MM: f32 = 15.0;

/// A metric's readings, already resolved for one report window.
pub struct MetricSeries {
    pub name: String,
    pub records: Vec<SenmlRecord>,
}

fn format_value(record: &SenmlRecord) -> String {
    if let Some(v) = record.value {
        v.to_string()
    } else if let Some(v) = &record.string_value {
        v.clone()
    } else if let Some(v) = record.bool_value {
        v.to_string()
    } else if let Some(v) = record.sum {
        v.to_string()
    } else {
        String::new()
    }
}

/// Render a single-page PDF: title block, generation timestamp, then a
/// metric/time/value table. Rows that would fall below the bottom
/// margin are dropped rather than spilling onto a second page.
pub fn render_pdf(title: &str, series: &[MetricSeries]) -> Result<Vec<u8>, RulesError> {
    let (doc, page, layer) = PdfDocument::new(title, Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), "metrics");
    let font = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| RulesError::Other(format!("failed to load PDF font: {e}")))?;
    let current_layer = doc.get_page(page).get_layer(layer);

    current_layer.use_text(title, 18.0, Mm(BOTTOM_MARGIN_MM), Mm(PAGE_HEIGHT_MM - 20.0), &font);
    current_layer.use_text(
        format!("generated {}", Utc::now().to_rfc3339()),
        9.0,
        Mm(BOTTOM_MARGIN_MM),
        Mm(PAGE_HEIGHT_MM - 28.0),
        &font,
    );

    let mut y = PAGE_HEIGHT_MM - 40.0;
    current_layer.use_text("metric", 10.0, Mm(BOTTOM_MARGIN_MM), Mm(y), &font);
    current_layer.use_text("time", 10.0, Mm(90.0), Mm(y), &font);
    current_layer.use_text("value", 10.0, Mm(150.0), Mm(y), &font);
    y -= ROW_HEIGHT_MM;

    'rows: for metric in series {
        for record in &metric.records {
            if y < BOTTOM_MARGIN_MM {
                break 'rows;
            }
            current_layer.use_text(metric.name.as_str(), 9.0, Mm(BOTTOM_MARGIN_MM), Mm(y), &font);
            current_layer.use_text(format!("{:.0}", record.time), 9.0, Mm(90.0), Mm(y), &font);
            current_layer.use_text(format_value(record), 9.0, Mm(150.0), Mm(y), &font);
            y -= ROW_HEIGHT_MM;
        }
    }

    let mut buffer = Vec::new();
    doc.save(&mut std::io::BufWriter::new(&mut buffer))
        .map_err(|e| RulesError::Other(format!("failed to render PDF: {e}")))?;
    Ok(buffer)
}

/// Render CSV: header row, then one row per metric/timestamp/value.
pub fn render_csv(series: &[MetricSeries]) -> Result<Vec<u8>, RulesError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(["metric", "time", "value"])
        .map_err(|e| RulesError::Other(format!("failed to render CSV: {e}")))?;
    for metric in series {
        for record in &metric.records {
            writer
                .write_record([metric.name.as_str(), &record.time.to_string(), &format_value(record)])
                .map_err(|e| RulesError::Other(format!("failed to render CSV: {e}")))?;
        }
    }
    writer
        .into_inner()
        .map_err(|e| RulesError::Other(format!("failed to render CSV: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series() -> Vec<MetricSeries> {
        vec![MetricSeries {
            name: "temperature".into(),
            records: vec![SenmlRecord {
                base_name: None,
                name: "temperature".into(),
                unit: Some("Cel".into()),
                value: Some(21.5),
                string_value: None,
                bool_value: None,
                sum: None,
                time: 1_700_000_000.0,
            }],
        }]
    }

    #[test]
    fn csv_report_has_a_header_and_one_row_per_record() {
        let bytes = render_csv(&series()).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("metric,time,value"));
        assert_eq!(lines.next(), Some("temperature,1700000000,21.5"));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn csv_report_with_no_records_still_has_a_header() {
        let bytes = render_csv(&[]).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "metric,time,value\n");
    }

    #[test]
    fn pdf_report_renders_a_non_empty_document() {
        let bytes = render_pdf("nightly summary", &series()).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }
}
