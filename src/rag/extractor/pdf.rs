//! Thin wrapper over `lopdf` that yields positioned text fragments.
//!
//! Only the text-showing subset of the content-stream language is
//! interpreted. Strings are decoded through the font selected by `Tf`.
//! Glyph widths are estimated from the font size, which is enough to
//! separate words, table cells and columns.

use std::path::Path;

use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, ObjectId};

use super::fonts::{page_fonts, FontMap};
use crate::core::errors::RagError;

const DEFAULT_PAGE_WIDTH: f32 = 612.0;
const DEFAULT_PAGE_HEIGHT: f32 = 792.0;
/// Average glyph advance as a fraction of the font size.
pub const AVG_CHAR_WIDTH_EM: f32 = 0.5;
/// `TJ` adjustments below this (thousandths of an em) read as a word gap.
const TJ_SPACE_THRESHOLD: f32 = -250.0;

type Matrix = [f32; 6];

const IDENTITY: Matrix = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

/// A run of text drawn at one position.
#[derive(Debug, Clone, PartialEq)]
pub struct TextFragment {
    pub x: f32,
    pub y: f32,
    /// Effective font size in user-space units.
    pub size: f32,
    pub text: String,
}

impl TextFragment {
    pub fn estimated_width(&self) -> f32 {
        self.text.chars().count() as f32 * self.size * AVG_CHAR_WIDTH_EM
    }

    pub fn right(&self) -> f32 {
        self.x + self.estimated_width()
    }
}

#[derive(Debug, Clone)]
pub struct RawPage {
    pub number: u32,
    pub width: f32,
    pub height: f32,
    pub fragments: Vec<TextFragment>,
}

#[derive(Debug, Clone, Default)]
pub struct PdfInfo {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
}

pub struct PdfDocument {
    name: String,
    doc: Document,
}

impl PdfDocument {
    pub fn open(path: &Path) -> Result<Self, RagError> {
        let name = path.display().to_string();
        if !path.is_file() {
            return Err(RagError::extraction(&name, "file does not exist"));
        }
        let doc = Document::load(path).map_err(|e| RagError::extraction(&name, e))?;
        Ok(Self { name, doc })
    }

    pub fn page_count(&self) -> u32 {
        self.doc.get_pages().len() as u32
    }

    /// Positioned text of every page, in page order.
    pub fn pages(&self) -> Vec<RawPage> {
        self.doc
            .get_pages()
            .into_iter()
            .map(|(number, id)| self.read_page(number, id))
            .collect()
    }

    pub fn page(&self, number: u32) -> Option<RawPage> {
        let pages = self.doc.get_pages();
        let id = pages.get(&number)?;
        Some(self.read_page(number, *id))
    }

    /// Text as produced by the backend's own extractor, without layout.
    pub fn flow_text(&self, number: u32) -> Option<String> {
        match self.doc.extract_text(&[number]) {
            Ok(text) => Some(text),
            Err(err) => {
                tracing::debug!("{}: no flow text for page {}: {}", self.name, number, err);
                None
            }
        }
    }

    pub fn info(&self) -> PdfInfo {
        let info = match self.doc.trailer.get(b"Info") {
            Ok(Object::Reference(id)) => self.doc.get_dictionary(*id).ok(),
            Ok(Object::Dictionary(dict)) => Some(dict),
            _ => None,
        };
        let Some(info) = info else {
            return PdfInfo::default();
        };

        let field = |key: &[u8]| match info.get(key) {
            Ok(Object::String(bytes, _)) => {
                let value = decode_pdf_string(bytes);
                let value = value.trim();
                (!value.is_empty()).then(|| value.to_string())
            }
            _ => None,
        };

        PdfInfo {
            title: field(b"Title"),
            author: field(b"Author"),
            subject: field(b"Subject"),
            creator: field(b"Creator"),
        }
    }

    fn read_page(&self, number: u32, id: ObjectId) -> RawPage {
        let (width, height) = self.media_box(id);
        let fragments = match self
            .doc
            .get_page_content(id)
            .and_then(|bytes| Content::decode(&bytes))
        {
            Ok(content) => {
                let fonts = page_fonts(&self.doc, id);
                TextWalker::new(&fonts).run(&content)
            }
            Err(err) => {
                tracing::warn!(
                    "{}: could not decode content of page {}: {}",
                    self.name,
                    number,
                    err
                );
                Vec::new()
            }
        };

        RawPage {
            number,
            width,
            height,
            fragments,
        }
    }

    /// MediaBox size, inherited through the page tree when absent.
    fn media_box(&self, id: ObjectId) -> (f32, f32) {
        let mut current = self.doc.get_dictionary(id).ok();
        let mut depth = 0;
        while let Some(dict) = current {
            if let Some(size) = media_box_size(dict) {
                return size;
            }
            depth += 1;
            if depth > 32 {
                break;
            }
            current = match dict.get(b"Parent") {
                Ok(Object::Reference(parent)) => self.doc.get_dictionary(*parent).ok(),
                _ => None,
            };
        }
        (DEFAULT_PAGE_WIDTH, DEFAULT_PAGE_HEIGHT)
    }
}

fn media_box_size(dict: &Dictionary) -> Option<(f32, f32)> {
    let values = dict.get(b"MediaBox").ok()?.as_array().ok()?;
    if values.len() != 4 {
        return None;
    }
    let coords: Vec<f32> = values.iter().filter_map(number).collect();
    if coords.len() != 4 {
        return None;
    }
    Some(((coords[2] - coords[0]).abs(), (coords[3] - coords[1]).abs()))
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(value) => Some(*value as f32),
        Object::Real(value) => Some(*value as f32),
        _ => None,
    }
}

fn multiply(m: &Matrix, n: &Matrix) -> Matrix {
    [
        m[0] * n[0] + m[1] * n[2],
        m[0] * n[1] + m[1] * n[3],
        m[2] * n[0] + m[3] * n[2],
        m[2] * n[1] + m[3] * n[3],
        m[4] * n[0] + m[5] * n[2] + n[4],
        m[4] * n[1] + m[5] * n[3] + n[5],
    ]
}

fn translation(tx: f32, ty: f32) -> Matrix {
    [1.0, 0.0, 0.0, 1.0, tx, ty]
}

/// Text state machine over one content stream.
struct TextWalker<'f> {
    fonts: &'f FontMap,
    font: Option<Vec<u8>>,
    ctm: Matrix,
    ctm_stack: Vec<Matrix>,
    tm: Matrix,
    tlm: Matrix,
    font_size: f32,
    leading: f32,
    char_spacing: f32,
    word_spacing: f32,
    fragments: Vec<TextFragment>,
}

impl<'f> TextWalker<'f> {
    fn new(fonts: &'f FontMap) -> Self {
        Self {
            fonts,
            font: None,
            ctm: IDENTITY,
            ctm_stack: Vec::new(),
            tm: IDENTITY,
            tlm: IDENTITY,
            font_size: 12.0,
            leading: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            fragments: Vec::new(),
        }
    }

    fn run(mut self, content: &Content) -> Vec<TextFragment> {
        for op in &content.operations {
            let args: Vec<f32> = op.operands.iter().filter_map(number).collect();
            match op.operator.as_str() {
                "q" => self.ctm_stack.push(self.ctm),
                "Q" => {
                    if let Some(ctm) = self.ctm_stack.pop() {
                        self.ctm = ctm;
                    }
                }
                "cm" if args.len() == 6 => {
                    let m = [args[0], args[1], args[2], args[3], args[4], args[5]];
                    self.ctm = multiply(&m, &self.ctm);
                }
                "BT" => {
                    self.tm = IDENTITY;
                    self.tlm = IDENTITY;
                }
                "Tf" => {
                    if let Some(Object::Name(name)) = op.operands.first() {
                        self.font = Some(name.clone());
                    }
                    if let Some(size) = op.operands.get(1).and_then(number) {
                        self.font_size = size;
                    }
                }
                "TL" if !args.is_empty() => self.leading = args[0],
                "Tc" if !args.is_empty() => self.char_spacing = args[0],
                "Tw" if !args.is_empty() => self.word_spacing = args[0],
                "Td" if args.len() == 2 => self.move_line(args[0], args[1]),
                "TD" if args.len() == 2 => {
                    self.leading = -args[1];
                    self.move_line(args[0], args[1]);
                }
                "Tm" if args.len() == 6 => {
                    self.tm = [args[0], args[1], args[2], args[3], args[4], args[5]];
                    self.tlm = self.tm;
                }
                "T*" => self.next_line(),
                "Tj" => {
                    if let Some(Object::String(bytes, _)) = op.operands.first() {
                        let text = self.decode(bytes);
                        self.show(&text);
                    }
                }
                "'" => {
                    self.next_line();
                    if let Some(Object::String(bytes, _)) = op.operands.first() {
                        let text = self.decode(bytes);
                        self.show(&text);
                    }
                }
                "\"" => {
                    if args.len() >= 2 {
                        self.word_spacing = args[0];
                        self.char_spacing = args[1];
                    }
                    self.next_line();
                    if let Some(Object::String(bytes, _)) = op.operands.get(2) {
                        let text = self.decode(bytes);
                        self.show(&text);
                    }
                }
                "TJ" => {
                    if let Some(Object::Array(items)) = op.operands.first() {
                        self.show_array(items);
                    }
                }
                _ => {}
            }
        }
        self.fragments
    }

    fn decode(&self, bytes: &[u8]) -> String {
        match self.font.as_ref().and_then(|name| self.fonts.get(name)) {
            Some(decoder) => decoder.decode(bytes),
            None => decode_pdf_string(bytes),
        }
    }

    fn move_line(&mut self, tx: f32, ty: f32) {
        self.tlm = multiply(&translation(tx, ty), &self.tlm);
        self.tm = self.tlm;
    }

    fn next_line(&mut self) {
        self.move_line(0.0, -self.leading);
    }

    fn effective_size(&self) -> f32 {
        let m = multiply(&self.tm, &self.ctm);
        let scale = (m[2] * m[2] + m[3] * m[3]).sqrt();
        let size = self.font_size * scale;
        if size > 0.0 {
            size
        } else {
            self.font_size.abs()
        }
    }

    fn show(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let m = multiply(&self.tm, &self.ctm);
        if !text.trim().is_empty() {
            self.fragments.push(TextFragment {
                x: m[4],
                y: m[5],
                size: self.effective_size(),
                text: text.to_string(),
            });
        }
        self.advance(text);
    }

    fn show_array(&mut self, items: &[Object]) {
        let mut text = String::new();
        let origin = multiply(&self.tm, &self.ctm);
        let mut advance = 0.0;

        for item in items {
            match item {
                Object::String(bytes, _) => {
                    let piece = self.decode(bytes);
                    advance += self.text_advance(&piece);
                    text.push_str(&piece);
                }
                other => {
                    if let Some(adjust) = number(other) {
                        if adjust < TJ_SPACE_THRESHOLD && !text.ends_with(' ') {
                            text.push(' ');
                        }
                        advance -= adjust / 1000.0 * self.font_size;
                    }
                }
            }
        }

        if !text.trim().is_empty() {
            self.fragments.push(TextFragment {
                x: origin[4],
                y: origin[5],
                size: self.effective_size(),
                text,
            });
        }
        self.tm = multiply(&translation(advance, 0.0), &self.tm);
    }

    fn text_advance(&self, text: &str) -> f32 {
        let chars = text.chars().count() as f32;
        let spaces = text.chars().filter(|c| *c == ' ').count() as f32;
        chars * (self.font_size * AVG_CHAR_WIDTH_EM + self.char_spacing)
            + spaces * self.word_spacing
    }

    fn advance(&mut self, text: &str) {
        let tx = self.text_advance(text);
        self.tm = multiply(&translation(tx, 0.0), &self.tm);
    }
}

/// Decodes a PDF string object: UTF-16BE when it carries a byte-order
/// mark, otherwise a single-byte encoding read as WinAnsi.
pub fn decode_pdf_string(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }

    bytes.iter().map(|b| win_ansi_char(*b)).collect()
}

fn win_ansi_char(byte: u8) -> char {
    match byte {
        0x80 => '€',
        0x82 => '‚',
        0x84 => '„',
        0x85 => '…',
        0x8C => 'Œ',
        0x91 => '‘',
        0x92 => '’',
        0x93 => '“',
        0x94 => '”',
        0x95 => '•',
        0x96 => '–',
        0x97 => '—',
        0x99 => '™',
        0x9C => 'œ',
        other => other as char,
    }
}
