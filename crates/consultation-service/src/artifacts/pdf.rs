//! Single-page A4 portrait renderer for certificates and prescriptions.
//!
//! Layout, top to bottom: header block, patient-data table, body section,
//! signature line. Output depends only on the input record. Long values
//! wrap; a document whose body would reach the signature block is refused
//! with [`RenderError::Overflow`].

use super::{CertificateInput, PrescriptionInput};
use crate::models::Patient;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

/// A4 portrait in points.
const PAGE_WIDTH: i64 = 595;
const PAGE_HEIGHT: i64 = 842;
const MARGIN: i64 = 56;

/// Baseline of the signature rule.
const SIGNATURE_Y: i64 = MARGIN + 60;

/// Lowest baseline available to body text.
const BODY_FLOOR: i64 = SIGNATURE_Y + 20;

/// Offset of the value column in patient and certificate rows.
const VALUE_COLUMN: i64 = 140;

const REGULAR: &str = "F1";
const BOLD: &str = "F2";

/// Rendering failure from the PDF library.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("document does not fit on a single page")]
    Overflow,

    #[error("failed to encode page content: {0}")]
    Encode(#[from] lopdf::Error),

    #[error("failed to serialize document: {0}")]
    Serialize(#[from] std::io::Error),
}

/// Encode text for the WinAnsiEncoding standard fonts. Characters outside
/// the code page become `?`.
fn win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            ' '..='~' | '\u{a0}'..='\u{ff}' => u8::try_from(c).unwrap_or(b'?'),
            '\u{20ac}' => 0x80,
            '\u{201a}' => 0x82,
            '\u{0192}' => 0x83,
            '\u{201e}' => 0x84,
            '\u{2026}' => 0x85,
            '\u{2020}' => 0x86,
            '\u{2021}' => 0x87,
            '\u{02c6}' => 0x88,
            '\u{2030}' => 0x89,
            '\u{0160}' => 0x8a,
            '\u{2039}' => 0x8b,
            '\u{0152}' => 0x8c,
            '\u{017d}' => 0x8e,
            '\u{2018}' => 0x91,
            '\u{2019}' => 0x92,
            '\u{201c}' => 0x93,
            '\u{201d}' => 0x94,
            '\u{2022}' => 0x95,
            '\u{2013}' => 0x96,
            '\u{2014}' => 0x97,
            '\u{02dc}' => 0x98,
            '\u{2122}' => 0x99,
            '\u{0161}' => 0x9a,
            '\u{203a}' => 0x9b,
            '\u{0153}' => 0x9c,
            '\u{017e}' => 0x9e,
            '\u{0178}' => 0x9f,
            _ => b'?',
        })
        .collect()
}

/// Characters per line for `width` points of Helvetica at `size`. Uses a
/// 0.6 em average advance, wider than typical mixed-case text.
fn chars_per_line(size: i64, width: i64) -> usize {
    usize::try_from(width * 10 / (size * 6)).unwrap_or(1).max(1)
}

/// Greedy word wrap. Words longer than a line are split. Always returns at
/// least one line.
fn wrap(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let chars: Vec<char> = word.chars().collect();
        for piece in chars.chunks(max_chars) {
            if current_len > 0 && current_len + 1 + piece.len() > max_chars {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
            }
            if current_len > 0 {
                current.push(' ');
                current_len += 1;
            }
            current.extend(piece);
            current_len += piece.len();
        }
    }
    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}

/// Accumulates text and rule operations top-down.
struct Page {
    ops: Vec<Operation>,
    cursor: i64,
    overflow: bool,
}

impl Page {
    fn new() -> Self {
        Self {
            ops: Vec::new(),
            cursor: PAGE_HEIGHT - MARGIN,
            overflow: false,
        }
    }

    fn text_at(&mut self, font: &str, size: i64, x: i64, y: i64, text: &str) {
        self.ops.push(Operation::new("BT", vec![]));
        self.ops
            .push(Operation::new("Tf", vec![font.into(), Object::Integer(size)]));
        self.ops.push(Operation::new(
            "Td",
            vec![Object::Integer(x), Object::Integer(y)],
        ));
        self.ops
            .push(Operation::new("Tj", vec![Object::string_literal(win_ansi(text))]));
        self.ops.push(Operation::new("ET", vec![]));
    }

    /// Move the cursor down one step, `None` once the body area is used up.
    fn advance(&mut self, step: i64) -> Option<i64> {
        let y = self.cursor - step;
        if y < BODY_FLOOR {
            self.overflow = true;
            return None;
        }
        self.cursor = y;
        Some(y)
    }

    fn line(&mut self, font: &str, size: i64, text: &str) {
        self.indented(font, size, 0, text);
    }

    /// Wrapped paragraph starting `indent` points right of the margin.
    fn indented(&mut self, font: &str, size: i64, indent: i64, text: &str) {
        let width = PAGE_WIDTH - 2 * MARGIN - indent;
        for chunk in wrap(text, chars_per_line(size, width)) {
            if let Some(y) = self.advance(size + 6) {
                self.text_at(font, size, MARGIN + indent, y, &chunk);
            }
        }
    }

    fn row(&mut self, label: &str, value: &str) {
        let width = PAGE_WIDTH - 2 * MARGIN - VALUE_COLUMN;
        for (index, chunk) in wrap(value, chars_per_line(11, width)).iter().enumerate() {
            let Some(y) = self.advance(18) else {
                return;
            };
            if index == 0 {
                self.text_at(BOLD, 11, MARGIN, y, label);
            }
            self.text_at(REGULAR, 11, MARGIN + VALUE_COLUMN, y, chunk);
        }
    }

    fn rule(&mut self, y: i64, from_x: i64, to_x: i64) {
        self.ops.push(Operation::new("w", vec![Object::Integer(1)]));
        self.ops.push(Operation::new(
            "m",
            vec![Object::Integer(from_x), Object::Integer(y)],
        ));
        self.ops.push(Operation::new(
            "l",
            vec![Object::Integer(to_x), Object::Integer(y)],
        ));
        self.ops.push(Operation::new("S", vec![]));
    }

    fn gap(&mut self, points: i64) {
        self.cursor -= points;
    }

    fn divider(&mut self) {
        if let Some(y) = self.advance(10) {
            self.rule(y, MARGIN, PAGE_WIDTH - MARGIN);
        }
    }
}

fn gender_label(gender_id: i16) -> &'static str {
    match gender_id {
        1 => "Male",
        2 => "Female",
        _ => "Unspecified",
    }
}

fn header(page: &mut Page, title: &str) {
    page.line(BOLD, 20, title);
    page.line(REGULAR, 10, "Consultation Room Telemedicine Service");
    page.divider();
}

fn patient_table(page: &mut Page, patient: &Patient, age: u32) {
    page.gap(8);
    page.line(BOLD, 12, "Patient");
    page.row("Name", &patient.name);
    page.row("Date of birth", &patient.birth_date.format("%Y-%m-%d").to_string());
    page.row("Gender", gender_label(patient.gender_id));
    page.row("Age", &format!("{age} years"));
    page.divider();
}

fn signature(page: &mut Page, doctor_name: &str) {
    let y = SIGNATURE_Y;
    let x = PAGE_WIDTH - MARGIN - 200;
    let name = wrap(doctor_name, chars_per_line(11, 200))
        .into_iter()
        .next()
        .unwrap_or_default();
    page.rule(y, x, PAGE_WIDTH - MARGIN);
    page.text_at(REGULAR, 11, x, y - 16, &name);
    page.text_at(REGULAR, 9, x, y - 30, "Attending physician");
}

fn finish(page: Page) -> Result<Vec<u8>, RenderError> {
    if page.overflow {
        return Err(RenderError::Overflow);
    }
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let regular_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let bold_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica-Bold",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            REGULAR => regular_id,
            BOLD => bold_id,
        },
    });

    let content = Content { operations: page.ops };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });

    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => vec![page_id.into()],
        "Count" => 1,
        "Resources" => resources_id,
        "MediaBox" => vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(PAGE_WIDTH),
            Object::Integer(PAGE_HEIGHT),
        ],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)?;
    Ok(bytes)
}

/// Render a medical certificate.
pub fn render_certificate(input: &CertificateInput) -> Result<Vec<u8>, RenderError> {
    let mut page = Page::new();
    header(&mut page, "MEDICAL CERTIFICATE");
    patient_table(&mut page, &input.patient, input.age);

    page.gap(8);
    page.line(BOLD, 12, "Statement");
    page.line(
        REGULAR,
        11,
        "This is to certify that the patient named above was examined and \
         requires rest for the period stated below.",
    );
    page.gap(6);
    page.row("Diagnosis", &input.diagnosis);
    page.row("Rest from", &input.start.format("%Y-%m-%d").to_string());
    page.row("Rest until", &input.end.format("%Y-%m-%d").to_string());
    page.row("Days", &input.days().to_string());

    signature(&mut page, &input.doctor_name);
    finish(page)
}

/// Render a prescription.
pub fn render_prescription(input: &PrescriptionInput) -> Result<Vec<u8>, RenderError> {
    let mut page = Page::new();
    header(&mut page, "PRESCRIPTION");
    patient_table(&mut page, &input.patient, input.age);

    page.gap(8);
    page.line(BOLD, 12, "Prescribed items");
    for (index, line) in input.lines.iter().enumerate() {
        page.indented(
            REGULAR,
            11,
            12,
            &format!(
                "{}. {} x{} {}",
                index + 1,
                line.product_name,
                line.quantity,
                line.unit
            ),
        );
    }

    signature(&mut page, &input.doctor_name);
    finish(page)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::artifacts::PrescriptionLine;
    use chrono::NaiveDate;

    fn patient() -> Patient {
        Patient {
            name: "Ana".to_string(),
            birth_date: NaiveDate::from_ymd_opt(1990, 4, 2).unwrap(),
            gender_id: 2,
        }
    }

    fn certificate() -> CertificateInput {
        CertificateInput {
            patient: patient(),
            diagnosis: "Flu".to_string(),
            start: NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 1, 12).unwrap(),
            age: 34,
            doctor_name: "Dr. Budi".to_string(),
        }
    }

    #[test]
    fn test_certificate_is_single_page_pdf() {
        let bytes = render_certificate(&certificate()).unwrap();

        assert!(bytes.starts_with(b"%PDF-1.5"));
        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 1);

        let raw = String::from_utf8_lossy(&bytes);
        assert!(raw.contains("(Flu)"));
        assert!(raw.contains("(Dr. Budi)"));
        assert!(raw.contains("(2024-01-12)"));
    }

    #[test]
    fn test_rendering_is_deterministic() {
        let first = render_certificate(&certificate()).unwrap();
        let second = render_certificate(&certificate()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_prescription_lists_every_line() {
        let input = PrescriptionInput {
            patient: patient(),
            age: 34,
            doctor_name: "Dr. Budi".to_string(),
            lines: vec![
                PrescriptionLine {
                    product_name: "Paracetamol 500mg".to_string(),
                    quantity: 2,
                    unit: "strip".to_string(),
                },
                PrescriptionLine {
                    product_name: "Amoxicillin 250mg".to_string(),
                    quantity: 1000,
                    unit: "box".to_string(),
                },
            ],
        };

        let bytes = render_prescription(&input).unwrap();
        let raw = String::from_utf8_lossy(&bytes);

        assert!(raw.contains("(1. Paracetamol 500mg x2 strip)"));
        assert!(raw.contains("(2. Amoxicillin 250mg x1000 box)"));
        assert_eq!(Document::load_mem(&bytes).unwrap().get_pages().len(), 1);
    }

    /// Baseline and raw bytes of every text run on the single page.
    fn text_runs(bytes: &[u8]) -> Vec<(i64, Vec<u8>)> {
        let doc = Document::load_mem(bytes).unwrap();
        let pages = doc.get_pages();
        assert_eq!(pages.len(), 1);
        let page_id = *pages.values().next().unwrap();
        let content = Content::decode(&doc.get_page_content(page_id).unwrap()).unwrap();

        let mut runs = Vec::new();
        let mut y = 0;
        for op in content.operations {
            match op.operator.as_str() {
                "Td" => y = op.operands.get(1).unwrap().as_i64().unwrap(),
                "Tj" => runs.push((y, op.operands.first().unwrap().as_str().unwrap().to_vec())),
                _ => {}
            }
        }
        runs
    }

    fn prescription_with(count: usize, product_name: &str) -> PrescriptionInput {
        PrescriptionInput {
            patient: patient(),
            age: 34,
            doctor_name: "Dr. Budi".to_string(),
            lines: (0..count)
                .map(|_| PrescriptionLine {
                    product_name: product_name.to_string(),
                    quantity: 1,
                    unit: "box".to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_long_diagnosis_wraps_above_signature() {
        let mut input = certificate();
        input.diagnosis = "Acute viral upper respiratory tract infection with fever ".repeat(8);

        let runs = text_runs(&render_certificate(&input).unwrap());
        let short = text_runs(&render_certificate(&certificate()).unwrap());

        assert!(runs.len() > short.len() + 1);
        assert!(runs.iter().all(|(y, _)| *y >= MARGIN));
        let signature_name = runs.iter().find(|(_, text)| text == b"Dr. Budi").unwrap();
        assert!(runs
            .iter()
            .filter(|(_, text)| text != b"Dr. Budi" && text != b"Attending physician")
            .all(|(y, _)| *y >= BODY_FLOOR && *y > signature_name.0));
    }

    #[test]
    fn test_prescription_within_capacity_stays_above_margin() {
        let bytes = render_prescription(&prescription_with(20, "Paracetamol 500mg")).unwrap();

        let runs = text_runs(&bytes);
        assert!(runs.iter().all(|(y, _)| *y >= MARGIN));
        assert!(runs.iter().any(|(_, text)| text.starts_with(b"20. ")));
    }

    #[test]
    fn test_prescription_too_long_for_one_page_is_refused() {
        let result = render_prescription(&prescription_with(60, "Paracetamol 500mg"));
        assert!(matches!(result, Err(RenderError::Overflow)));
    }

    #[test]
    fn test_latin_names_use_win_ansi_bytes() {
        let mut input = certificate();
        input.patient.name = "Jos\u{e9} M\u{fc}ller".to_string();
        input.doctor_name = "Dr. \u{0160}imi\u{107}".to_string();

        let runs = text_runs(&render_certificate(&input).unwrap());

        assert!(runs.iter().any(|(_, text)| text == b"Jos\xe9 M\xfcller"));
        // U+0107 is outside the code page.
        assert!(runs.iter().any(|(_, text)| text == b"Dr. \x8aimi?"));
    }

    #[test]
    fn test_wrap_splits_on_words_and_long_tokens() {
        assert_eq!(wrap("one two three", 7), vec!["one two", "three"]);
        assert_eq!(wrap("abcdefghij", 4), vec!["abcd", "efgh", "ij"]);
        assert_eq!(wrap("", 10), vec![String::new()]);
    }

    #[test]
    fn test_gender_label() {
        assert_eq!(gender_label(1), "Male");
        assert_eq!(gender_label(2), "Female");
        assert_eq!(gender_label(9), "Unspecified");
    }
}
