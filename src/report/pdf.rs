//! Two-page letterhead PDF via `printpdf`.
//!
//! Layout is in PDF points (1/72 in) on US Letter, origin bottom-left, then
//! converted to `Mm` at draw time. Page 1 carries patient details and findings,
//! page 2 the radiograph. Both pages share header, footer and signature block.

use std::io::BufWriter;
use std::path::Path;

use image::{DynamicImage, Rgb, RgbImage};
use printpdf::{
    BuiltinFont, Color, Image, ImageTransform, IndirectFontRef, Mm, PdfDocument,
    PdfLayerReference, Rect,
};
use tracing::{debug, warn};

use super::{PatientMetadata, ReportError};
use crate::config::LetterheadConfig;

const PAGE_WIDTH: f32 = 612.0;
const PAGE_HEIGHT: f32 = 792.0;

const HEADER_HEIGHT: f32 = 80.0;
const FOOTER_HEIGHT: f32 = 50.0;
const SIGNATURE_Y: f32 = 90.0;

const MARGIN: f32 = 50.0;
const BODY_TOP: f32 = PAGE_HEIGHT - 100.0;
/// Lowest baseline on page 1; keeps text clear of the signature image.
const BODY_BOTTOM: f32 = SIGNATURE_Y + 60.0;
/// Characters per wrapped body line at 13 pt across the 512 pt frame.
const BODY_CHARS: usize = 78;

const BODY_SIZE: f32 = 13.0;
const BODY_LEADING: f32 = BODY_SIZE * 1.2;
const FIELD_SPACING: f32 = 10.0;
const HEADING_SIZE: f32 = 14.0;
const HEADING_SPACING: f32 = 12.0;

const XRAY_SIZE: f32 = 5.8 * 72.0;
const XRAY_Y: f32 = 230.0;

/// Resolution images are registered at before scaling to their box.
const IMAGE_DPI: f32 = 300.0;

fn pt(v: f32) -> Mm {
    Mm(v * 25.4 / 72.0)
}

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

/// Everything one report page set is drawn from.
pub struct ReportDocument<'a> {
    pub letterhead: &'a LetterheadConfig,
    pub metadata: &'a PatientMetadata,
    pub findings: &'a str,
    pub xray: &'a RgbImage,
    pub logo: Option<&'a RgbImage>,
    pub signature: Option<&'a RgbImage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontStyle {
    Regular,
    Bold,
    Italic,
}

/// One positioned string, in points.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub text: String,
    pub size: f32,
    pub x: f32,
    pub y: f32,
    pub style: FontStyle,
}

/// Page-1 body after layout.
#[derive(Debug, Clone)]
pub struct BodyLayout {
    pub runs: Vec<TextRun>,
    /// Wrapped lines that did not fit above the signature block.
    pub dropped_lines: usize,
}

struct Fonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    italic: IndirectFontRef,
}

impl Fonts {
    fn get(&self, style: FontStyle) -> &IndirectFontRef {
        match style {
            FontStyle::Regular => &self.regular,
            FontStyle::Bold => &self.bold,
            FontStyle::Italic => &self.italic,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Rendering
// ═══════════════════════════════════════════════════════════

/// Render the report. Returns PDF bytes.
pub fn render_report(report: &ReportDocument<'_>) -> Result<Vec<u8>, ReportError> {
    let (doc, page1, layer1) = PdfDocument::new(
        "X-ray Consultation Report",
        pt(PAGE_WIDTH),
        pt(PAGE_HEIGHT),
        "Layer 1",
    );
    let fonts = Fonts {
        regular: doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| ReportError::Pdf(format!("PDF font error: {e}")))?,
        bold: doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| ReportError::Pdf(format!("PDF font error: {e}")))?,
        italic: doc
            .add_builtin_font(BuiltinFont::HelveticaOblique)
            .map_err(|e| ReportError::Pdf(format!("PDF font error: {e}")))?,
    };

    // Page 1: details and findings
    let layer = doc.get_page(page1).get_layer(layer1);
    draw_letterhead(&layer, report, &fonts)?;
    let body = layout_body(report.metadata, report.findings);
    if body.dropped_lines > 0 {
        warn!(dropped_lines = body.dropped_lines, "Findings overflow page 1, truncated");
    }
    draw_runs(&layer, &body.runs, &fonts);

    // Page 2: radiograph
    let (page2, layer2) = doc.add_page(pt(PAGE_WIDTH), pt(PAGE_HEIGHT), "Layer 1");
    let layer = doc.get_page(page2).get_layer(layer2);
    draw_letterhead(&layer, report, &fonts)?;
    layer.use_text(
        "X-ray Image:",
        12.0,
        pt(MARGIN),
        pt(XRAY_Y + XRAY_SIZE + 15.0),
        &fonts.bold,
    );
    place_image(
        &layer,
        report.xray,
        (PAGE_WIDTH - XRAY_SIZE) / 2.0,
        XRAY_Y,
        XRAY_SIZE,
        XRAY_SIZE,
    )?;

    let mut buf = BufWriter::new(Vec::new());
    doc.save(&mut buf)
        .map_err(|e| ReportError::Pdf(format!("PDF save error: {e}")))?;
    buf.into_inner()
        .map_err(|e| ReportError::Pdf(format!("PDF buffer error: {e}")))
}

/// Header band, footer band and signature block.
fn draw_letterhead(
    layer: &PdfLayerReference,
    report: &ReportDocument<'_>,
    fonts: &Fonts,
) -> Result<(), ReportError> {
    let text = letterhead_text(report.letterhead);

    // Header
    layer.set_fill_color(rgb(0.2, 0.4, 0.6));
    layer.add_rect(Rect::new(
        pt(0.0),
        pt(PAGE_HEIGHT - HEADER_HEIGHT),
        pt(PAGE_WIDTH),
        pt(PAGE_HEIGHT),
    ));
    layer.set_fill_color(rgb(1.0, 1.0, 1.0));
    draw_runs(layer, &text.header, fonts);
    if let Some(logo) = report.logo {
        place_image(layer, logo, 40.0, PAGE_HEIGHT - 75.0, 40.0, 40.0)?;
    }

    // Footer
    layer.set_fill_color(rgb(0.85, 0.85, 0.85));
    layer.add_rect(Rect::new(pt(0.0), pt(0.0), pt(PAGE_WIDTH), pt(FOOTER_HEIGHT)));
    layer.set_fill_color(rgb(0.0, 0.0, 0.0));
    draw_runs(layer, &text.footer, fonts);

    // Signature
    if let Some(signature) = report.signature {
        place_image(layer, signature, PAGE_WIDTH - 180.0, SIGNATURE_Y, 120.0, 50.0)?;
    }
    draw_runs(layer, &text.signature, fonts);
    Ok(())
}

/// Letterhead strings, positioned. Header runs print white on the band,
/// the rest black.
#[derive(Debug, Clone)]
pub struct LetterheadText {
    pub header: Vec<TextRun>,
    pub footer: Vec<TextRun>,
    pub signature: Vec<TextRun>,
}

pub fn letterhead_text(head: &LetterheadConfig) -> LetterheadText {
    let header = vec![
        run(&head.practice_name, 16.0, 100.0, PAGE_HEIGHT - 50.0, FontStyle::Bold),
        run(&head.address, 11.0, 100.0, PAGE_HEIGHT - 68.0, FontStyle::Regular),
        run(
            &format!("Phone: {}", head.phone),
            11.0,
            400.0,
            PAGE_HEIGHT - 68.0,
            FontStyle::Regular,
        ),
    ];
    let footer = vec![right_aligned(
        &format!("Email: {}", head.email),
        9.0,
        PAGE_WIDTH - 40.0,
        30.0,
        FontStyle::Regular,
    )];
    let signature = vec![
        right_aligned(&head.signer_name, 10.0, PAGE_WIDTH - 50.0, SIGNATURE_Y - 10.0, FontStyle::Bold),
        right_aligned(
            &head.signer_credentials,
            9.0,
            PAGE_WIDTH - 50.0,
            SIGNATURE_Y - 22.0,
            FontStyle::Italic,
        ),
    ];
    LetterheadText {
        header,
        footer,
        signature,
    }
}

fn draw_runs(layer: &PdfLayerReference, runs: &[TextRun], fonts: &Fonts) {
    for run in runs {
        layer.use_text(&run.text, run.size, pt(run.x), pt(run.y), fonts.get(run.style));
    }
}

/// Run ending at `right_x` by the estimated width.
fn right_aligned(text: &str, size: f32, right_x: f32, y: f32, style: FontStyle) -> TextRun {
    let x = (right_x - estimate_text_width(text, size, style)).max(0.0);
    run(text, size, x, y, style)
}

/// Scale an RGB raster into the given box (points). Aspect ratio follows the box.
fn place_image(
    layer: &PdfLayerReference,
    img: &RgbImage,
    x: f32,
    y: f32,
    width: f32,
    height: f32,
) -> Result<(), ReportError> {
    let (px_w, px_h) = img.dimensions();
    if px_w == 0 || px_h == 0 {
        return Err(ReportError::Pdf("Cannot embed an image with zero area".into()));
    }

    let buffer = printpdf::image_crate::RgbImage::from_raw(px_w, px_h, img.as_raw().clone())
        .ok_or_else(|| ReportError::Pdf("Image buffer does not match its dimensions".into()))?;
    let image = Image::from_dynamic_image(&printpdf::image_crate::DynamicImage::ImageRgb8(buffer));

    // Natural size at IMAGE_DPI, in points
    let natural_w = px_w as f32 / IMAGE_DPI * 72.0;
    let natural_h = px_h as f32 / IMAGE_DPI * 72.0;

    image.add_to_layer(
        layer.clone(),
        ImageTransform {
            translate_x: Some(pt(x)),
            translate_y: Some(pt(y)),
            scale_x: Some(width / natural_w),
            scale_y: Some(height / natural_h),
            dpi: Some(IMAGE_DPI),
            ..Default::default()
        },
    );
    Ok(())
}

fn rgb(r: f32, g: f32, b: f32) -> Color {
    Color::Rgb(printpdf::Rgb::new(r, g, b, None))
}

// ═══════════════════════════════════════════════════════════
// Layout
// ═══════════════════════════════════════════════════════════

/// Lay out page 1: six labelled fields, the "Findings:" heading, then one or
/// more wrapped lines per findings line. Stops at [`BODY_BOTTOM`].
pub fn layout_body(metadata: &PatientMetadata, findings: &str) -> BodyLayout {
    let fields = [
        ("Patient's Name", metadata.name.as_str(), FontStyle::Regular),
        ("Referred by", metadata.referred_by.as_str(), FontStyle::Regular),
        ("Date Taken", metadata.date_taken.as_str(), FontStyle::Regular),
        ("Date of Report", metadata.date_of_report.as_str(), FontStyle::Regular),
        ("Patient's Complaint", metadata.complaint.as_str(), FontStyle::Italic),
        ("Patient's History", metadata.history.as_str(), FontStyle::Italic),
    ];

    let mut runs = Vec::new();
    let mut dropped_lines = 0;
    let mut y = BODY_TOP - BODY_SIZE;

    for (label, value, style) in fields {
        let label = format!("{label}:");
        let lines = wrap_text(&format!("{label} {value}"), BODY_CHARS);
        for (i, line) in lines.iter().enumerate() {
            if y < BODY_BOTTOM {
                dropped_lines += 1;
                continue;
            }
            if i == 0 {
                let rest = line.strip_prefix(label.as_str()).unwrap_or(line).trim_start();
                let value_x = MARGIN + estimate_text_width(&label, BODY_SIZE, FontStyle::Bold) + 4.0;
                runs.push(run(&label, BODY_SIZE, MARGIN, y, FontStyle::Bold));
                if !rest.is_empty() {
                    runs.push(run(rest, BODY_SIZE, value_x, y, style));
                }
            } else {
                runs.push(run(line, BODY_SIZE, MARGIN, y, style));
            }
            y -= BODY_LEADING;
        }
        y -= FIELD_SPACING;
    }

    if y >= BODY_BOTTOM {
        y -= HEADING_SIZE * 1.2 - BODY_LEADING;
        runs.push(run("Findings:", HEADING_SIZE, MARGIN, y, FontStyle::Bold));
        y -= HEADING_SIZE * 1.2 + HEADING_SPACING;
    }

    for line in findings.lines() {
        for wrapped in wrap_text(line, BODY_CHARS) {
            if y < BODY_BOTTOM {
                dropped_lines += 1;
                continue;
            }
            runs.push(run(&wrapped, BODY_SIZE, MARGIN, y, FontStyle::Regular));
            y -= BODY_LEADING;
        }
    }

    BodyLayout { runs, dropped_lines }
}

fn run(text: &str, size: f32, x: f32, y: f32, style: FontStyle) -> TextRun {
    TextRun {
        text: text.to_string(),
        size,
        x,
        y,
        style,
    }
}

/// Rough Helvetica advance width in points. Builtin fonts carry no metrics here.
pub fn estimate_text_width(text: &str, size: f32, style: FontStyle) -> f32 {
    let em = match style {
        FontStyle::Bold => 0.58,
        FontStyle::Regular | FontStyle::Italic => 0.5,
    };
    text.chars().count() as f32 * size * em
}

/// Simple word wrap to approximate character width.
pub fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.chars().count() + word.chars().count() + 1 > max_chars && !current.is_empty() {
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

// ═══════════════════════════════════════════════════════════
// Letterhead assets
// ═══════════════════════════════════════════════════════════

/// Load a logo or signature file. Missing or unreadable files yield `None`.
pub fn load_letterhead_image(path: &Path) -> Option<RgbImage> {
    if !path.exists() {
        debug!(path = %path.display(), "Letterhead image absent, skipping");
        return None;
    }
    match image::open(path) {
        Ok(img) => Some(flatten_on_white(&img)),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Letterhead image unreadable, skipping");
            None
        }
    }
}

/// Composite any alpha channel onto white so transparent areas print blank.
pub fn flatten_on_white(img: &DynamicImage) -> RgbImage {
    let rgba = img.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let alpha = a as u16;
        let blend = |c: u8| ((c as u16 * alpha + 255 * (255 - alpha)) / 255) as u8;
        Rgb([blend(r), blend(g), blend(b)])
    })
}
