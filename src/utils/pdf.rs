use printpdf::{BuiltinFont, Mm, PdfDocument};
use std::io::BufWriter;

use crate::errors::{AppError, AppResult};
use crate::services::structured::MedicalReport;

const PAGE_WIDTH_MM: f32 = 210.0;
const PAGE_HEIGHT_MM: f32 = 297.0;
const TOP_MM: f32 = 280.0;
const BOTTOM_MARGIN_MM: f32 = 20.0;
const LEFT_MM: f32 = 20.0;
const INDENT_MM: f32 = 25.0;
const BODY_CHARS_PER_LINE: usize = 85;

pub const DISCLAIMER: &str = "This report was generated by an AI assistant and is not a medical \
    diagnosis. Always consult a qualified healthcare professional.";

/// One positioned line of text.
#[derive(Debug, Clone, PartialEq)]
pub struct PdfLine {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub size: f32,
    pub bold: bool,
}

/// Line layout for a report, split into pages.
#[derive(Debug)]
struct Layout {
    pages: Vec<Vec<PdfLine>>,
    y: f32,
}

impl Layout {
    fn new() -> Self {
        Self {
            pages: vec![Vec::new()],
            y: TOP_MM,
        }
    }

    /// Places a line, starting a new page when it would cross the bottom margin.
    fn line(&mut self, text: &str, x: f32, size: f32, bold: bool, height: f32) {
        if self.y - height < BOTTOM_MARGIN_MM {
            self.pages.push(Vec::new());
            self.y = TOP_MM;
        }
        if let Some(page) = self.pages.last_mut() {
            page.push(PdfLine {
                text: text.to_string(),
                x,
                y: self.y,
                size,
                bold,
            });
        }
        self.y -= height;
    }

    fn gap(&mut self, height: f32) {
        self.y -= height;
    }

    fn heading(&mut self, text: &str) {
        self.gap(4.0);
        self.line(text, LEFT_MM, 11.0, true, 6.0);
    }

    fn paragraph(&mut self, text: &str, x: f32) {
        for line in wrap_text(text, BODY_CHARS_PER_LINE) {
            self.line(&line, x, 9.0, false, 4.5);
        }
    }

    fn list<'a>(&mut self, items: impl IntoIterator<Item = &'a String>, numbered: bool, empty: &str) {
        let mut any = false;
        for (i, item) in items.into_iter().enumerate() {
            any = true;
            let text = if numbered {
                format!("{}. {}", i + 1, item)
            } else {
                format!("· {}", item)
            };
            self.paragraph(&text, INDENT_MM);
        }
        if !any {
            self.paragraph(empty, INDENT_MM);
        }
    }
}

/// Split text into lines of at most `max_chars` characters, breaking on whitespace.
pub fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let needed = current.chars().count() + word.chars().count() + 1;
        if needed > max_chars && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }

    if !current.is_empty() {
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

/// Lays out a report into pages of positioned lines.
pub fn layout_report(report: &MedicalReport, title: &str, date: &str) -> Vec<Vec<PdfLine>> {
    let mut layout = Layout::new();

    layout.line(title, LEFT_MM, 16.0, true, 8.0);
    layout.line(&format!("Date: {}", date), LEFT_MM, 9.0, false, 6.0);

    layout.heading("DIAGNOSIS");
    layout.paragraph(&report.diagnosis.condition, INDENT_MM);
    if !report.diagnosis.description.is_empty() {
        layout.paragraph(&report.diagnosis.description, INDENT_MM);
    }
    if let Some(severity) = &report.diagnosis.severity {
        layout.paragraph(&format!("Severity: {}", severity), INDENT_MM);
    }

    layout.heading("TREATMENT");
    layout.list(&report.treatment.steps, true, "No specific treatment steps.");
    if let Some(duration) = &report.treatment.duration {
        layout.paragraph(&format!("Duration: {}", duration), INDENT_MM);
    }

    layout.heading("MEDICATIONS");
    if report.medications.is_empty() {
        layout.paragraph("No medications suggested.", INDENT_MM);
    }
    for medication in &report.medications {
        let mut text = format!(
            "· {} - {} - {}",
            medication.name, medication.dosage, medication.frequency
        );
        if let Some(notes) = &medication.notes {
            text.push_str(&format!(" ({})", notes));
        }
        layout.paragraph(&text, INDENT_MM);
    }

    layout.heading("RECOMMENDATIONS");
    layout.list(&report.recommendations, false, "None.");

    layout.heading("PRECAUTIONS");
    layout.list(&report.precautions, false, "None.");

    layout.heading("FOLLOW-UP");
    layout.paragraph(&report.follow_up.timeframe, INDENT_MM);
    if !report.follow_up.instructions.is_empty() {
        layout.paragraph(&report.follow_up.instructions, INDENT_MM);
    }

    layout.gap(6.0);
    for line in wrap_text(DISCLAIMER, 100) {
        layout.line(&line, LEFT_MM, 7.0, false, 3.5);
    }

    layout.pages
}

fn pdf_error(e: impl std::fmt::Display) -> AppError {
    AppError::Other(format!("PDF error: {e}"))
}

/// Render a report to PDF bytes.
pub fn render_report_pdf(report: &MedicalReport, title: &str, date: &str) -> AppResult<Vec<u8>> {
    let pages = layout_report(report, title, date);
    tracing::info!("Rendering report PDF with {} pages", pages.len());

    let (doc, first_page, first_layer) =
        PdfDocument::new(title, Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), "Layer 1");
    let font = doc.add_builtin_font(BuiltinFont::Helvetica).map_err(pdf_error)?;
    let bold = doc.add_builtin_font(BuiltinFont::HelveticaBold).map_err(pdf_error)?;

    for (index, lines) in pages.iter().enumerate() {
        let (page, layer) = if index == 0 {
            (first_page, first_layer)
        } else {
            doc.add_page(Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), "Layer 1")
        };
        let layer = doc.get_page(page).get_layer(layer);

        for line in lines {
            let face = if line.bold { &bold } else { &font };
            layer.use_text(line.text.as_str(), line.size, Mm(line.x), Mm(line.y), face);
        }
    }

    let mut buf = BufWriter::new(Vec::new());
    doc.save(&mut buf).map_err(pdf_error)?;
    buf.into_inner().map_err(pdf_error)
}
