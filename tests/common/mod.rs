#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, Stream, StringFormat};

use mediassist_backend::core::config::{AppPaths, Settings};
use mediassist_backend::core::errors::RagError;
use mediassist_backend::llm::LlmProvider;
use mediassist_backend::state::AppState;

/// One line of text placed at `(x, y)` in points.
#[derive(Debug, Clone)]
pub struct TextLine {
    pub x: i64,
    pub y: i64,
    pub size: i64,
    pub text: String,
}

pub fn line(x: i64, y: i64, size: i64, text: &str) -> TextLine {
    TextLine {
        x,
        y,
        size,
        text: text.to_string(),
    }
}

fn name(value: &str) -> Object {
    Object::Name(value.as_bytes().to_vec())
}

fn literal(value: &str) -> Object {
    Object::String(value.as_bytes().to_vec(), StringFormat::Literal)
}

/// Writes an A4 PDF with one page per entry, all text in Helvetica.
pub fn write_pdf(path: &Path, title: &str, pages: &[Vec<TextLine>]) {
    let mut font = Dictionary::new();
    font.set("Type", name("Font"));
    font.set("Subtype", name("Type1"));
    font.set("BaseFont", name("Helvetica"));
    font.set("Encoding", name("WinAnsiEncoding"));

    let mut doc = Document::with_version("1.5");
    let font_id = doc.add_object(font);
    let mut fonts = Dictionary::new();
    fonts.set("F1", Object::Reference(font_id));

    let pages = pages
        .iter()
        .map(|lines| {
            lines
                .iter()
                .flat_map(|l| show_text("F1", l, literal(&l.text)))
                .collect()
        })
        .collect();
    save_document(doc, path, title, fonts, pages);
}

fn show_text(font: &str, l: &TextLine, shown: Object) -> Vec<Operation> {
    vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec![name(font), Object::Integer(l.size)]),
        Operation::new("Td", vec![Object::Integer(l.x), Object::Integer(l.y)]),
        Operation::new("Tj", vec![shown]),
        Operation::new("ET", vec![]),
    ]
}

fn save_document(
    mut doc: Document,
    path: &Path,
    title: &str,
    fonts: Dictionary,
    pages: Vec<Vec<Operation>>,
) {
    let pages_id = doc.new_object_id();
    let mut resources = Dictionary::new();
    resources.set("Font", Object::Dictionary(fonts));
    let resources_id = doc.add_object(resources);

    let mut kids = Vec::new();
    for operations in pages {
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(
            Dictionary::new(),
            content.encode().unwrap(),
        ));

        let mut page = Dictionary::new();
        page.set("Type", name("Page"));
        page.set("Parent", Object::Reference(pages_id));
        page.set("Contents", Object::Reference(content_id));
        page.set("Resources", Object::Reference(resources_id));
        page.set(
            "MediaBox",
            Object::Array(vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(595),
                Object::Integer(842),
            ]),
        );
        kids.push(Object::Reference(doc.add_object(page)));
    }

    let mut pages_dict = Dictionary::new();
    pages_dict.set("Type", name("Pages"));
    pages_dict.set("Count", Object::Integer(kids.len() as i64));
    pages_dict.set("Kids", Object::Array(kids));
    doc.objects.insert(pages_id, Object::Dictionary(pages_dict));

    let mut catalog = Dictionary::new();
    catalog.set("Type", name("Catalog"));
    catalog.set("Pages", Object::Reference(pages_id));
    let catalog_id = doc.add_object(catalog);

    let mut info = Dictionary::new();
    info.set("Title", literal(title));
    info.set("Creator", literal("lab-docs"));
    let info_id = doc.add_object(info);

    doc.trailer.set("Root", Object::Reference(catalog_id));
    doc.trailer.set("Info", Object::Reference(info_id));
    doc.save(path).unwrap();
}

/// Adobe glyph name for the characters the subset fixtures draw.
fn glyph_name(c: char) -> String {
    const DIGITS: [&str; 10] = [
        "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine",
    ];
    match c {
        ' ' => "space".to_string(),
        '.' => "period".to_string(),
        '-' => "hyphen".to_string(),
        '0'..='9' => DIGITS[c as usize - '0' as usize].to_string(),
        _ => c.to_string(),
    }
}

/// A one-page incubator manual set the way subsetting PDF producers write
/// it: body text in a CID font with two-byte glyph ids and a ToUnicode
/// map, the heading in a TrueType subset whose codes only make sense
/// through `/Differences`. Content is drawn alternating between columns.
pub fn write_subset_font_manual(path: &Path) {
    let heading = line(72, 780, 16, "Chapter 3 Operation");
    let body = vec![
        line(72, 740, 10, "Switch on the incubator at the rear"),
        line(320, 740, 10, "Load the culture flasks only after"),
        line(72, 726, 10, "panel and let the chamber warm up"),
        line(320, 726, 10, "the display shows the set point and"),
        line(72, 712, 10, "for at least thirty minutes first."),
        line(320, 712, 10, "the door alarm has been tested."),
    ];

    let mut glyphs: BTreeMap<char, u16> = BTreeMap::new();
    for c in body.iter().flat_map(|l| l.text.chars()) {
        let next = glyphs.len() as u16 + 3;
        glyphs.entry(c).or_insert(next);
    }
    let mut codes: BTreeMap<char, u8> = BTreeMap::new();
    for c in heading.text.chars() {
        let next = codes.len() as u8 + 1;
        codes.entry(c).or_insert(next);
    }

    let mut doc = Document::with_version("1.5");

    let mut cmap = String::from(
        "/CIDInit /ProcSet findresource begin\n12 dict begin\nbegincmap\n\
         /CMapName /Adobe-Identity-UCS def\n\
         1 begincodespacerange\n<0000> <FFFF>\nendcodespacerange\n",
    );
    cmap.push_str(&format!("{} beginbfchar\n", glyphs.len()));
    for (c, gid) in &glyphs {
        cmap.push_str(&format!("<{:04X}> <{:04X}>\n", gid, *c as u32));
    }
    cmap.push_str("endbfchar\nendcmap\nend\nend\n");
    let cmap_id = doc.add_object(Stream::new(Dictionary::new(), cmap.into_bytes()));

    let mut cid_font = Dictionary::new();
    cid_font.set("Type", name("Font"));
    cid_font.set("Subtype", name("CIDFontType2"));
    cid_font.set("BaseFont", name("QXBKAA+Arial"));
    let cid_font_id = doc.add_object(cid_font);

    let mut body_font = Dictionary::new();
    body_font.set("Type", name("Font"));
    body_font.set("Subtype", name("Type0"));
    body_font.set("BaseFont", name("QXBKAA+Arial"));
    body_font.set("Encoding", name("Identity-H"));
    body_font.set(
        "DescendantFonts",
        Object::Array(vec![Object::Reference(cid_font_id)]),
    );
    body_font.set("ToUnicode", Object::Reference(cmap_id));
    let body_font_id = doc.add_object(body_font);

    let mut differences = Vec::new();
    for (c, code) in &codes {
        differences.push(Object::Integer(i64::from(*code)));
        differences.push(name(&glyph_name(*c)));
    }
    let mut encoding = Dictionary::new();
    encoding.set("Type", name("Encoding"));
    encoding.set("Differences", Object::Array(differences));

    let mut heading_font = Dictionary::new();
    heading_font.set("Type", name("Font"));
    heading_font.set("Subtype", name("TrueType"));
    heading_font.set("BaseFont", name("QXBKAB+Arial-Bold"));
    heading_font.set("Encoding", Object::Dictionary(encoding));
    let heading_font_id = doc.add_object(heading_font);

    let mut fonts = Dictionary::new();
    fonts.set("C2_0", Object::Reference(body_font_id));
    fonts.set("TT1", Object::Reference(heading_font_id));

    let heading_bytes: Vec<u8> = heading.text.chars().map(|c| codes[&c]).collect();
    let mut operations = show_text(
        "TT1",
        &heading,
        Object::String(heading_bytes, StringFormat::Hexadecimal),
    );
    for l in &body {
        let bytes: Vec<u8> = l
            .text
            .chars()
            .flat_map(|c| glyphs[&c].to_be_bytes())
            .collect();
        operations.extend(show_text(
            "C2_0",
            l,
            Object::String(bytes, StringFormat::Hexadecimal),
        ));
    }

    save_document(doc, path, "Incubator I-200", fonts, vec![operations]);
}

/// A data sheet whose value column starts right of the page middle.
pub fn write_data_sheet(path: &Path) {
    let page = vec![
        line(72, 780, 16, "Chapter 4 Technical Data"),
        line(
            72,
            740,
            10,
            "The values below apply to the standard mains version of the benchtop unit C-400.",
        ),
        line(72, 720, 10, "GMDN Code"),
        line(380, 720, 10, "17489"),
        line(72, 706, 10, "Rated voltage"),
        line(380, 706, 10, "230 V"),
        line(72, 692, 10, "Frequency"),
        line(380, 692, 10, "50 Hz"),
        line(72, 678, 10, "Weight"),
        line(380, 678, 10, "62 kg"),
        line(72, 664, 10, "Max speed"),
        line(380, 664, 10, "4000 rpm"),
    ];
    write_pdf(path, "C-400 Data Sheet", &[page]);
}

/// A three-page centrifuge manual. Page 2 has a technical data table in
/// the left column and installation prose in the right column.
pub fn write_centrifuge_manual(path: &Path) {
    let page_one = vec![
        line(72, 780, 16, "Chapter 1 Introduction"),
        line(72, 740, 10, "This manual describes the benchtop centrifuge model C-400."),
        line(72, 726, 10, "Read every safety instruction before operating the device."),
        line(72, 712, 10, "Keep this manual next to the instrument at all times."),
    ];
    let page_two = vec![
        line(72, 760, 10, "Specifications"),
        line(320, 760, 10, "The centrifuge must stand on a level"),
        line(72, 746, 10, "GMDN Code"),
        line(200, 746, 10, "17489"),
        line(320, 746, 10, "bench with ten centimetres of free"),
        line(72, 732, 10, "Rated voltage"),
        line(200, 732, 10, "230 V"),
        line(320, 732, 10, "space around the housing for airflow."),
        line(72, 718, 10, "Weight"),
        line(200, 718, 10, "62 kg"),
        line(320, 718, 10, "Never open the lid while it spins."),
    ];
    let page_three = vec![
        line(72, 780, 16, "Chapter 2 Maintenance"),
        line(72, 740, 10, "Clean the rotor chamber with a damp cloth after each run."),
        line(72, 726, 10, "Inspect the lid seal every month and replace it if cracked."),
        line(72, 712, 10, "Have the drive belt checked by service once a year."),
    ];
    write_pdf(path, "C-400 Centrifuge", &[page_one, page_two, page_three]);
}

/// Generation backend with a fixed reply and a call counter.
pub struct ScriptedLlm {
    reply: Result<String, String>,
    calls: AtomicUsize,
}

impl ScriptedLlm {
    pub fn answering(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(reply.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing(reason: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(reason.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn health_check(&self) -> Result<bool, RagError> {
        Ok(true)
    }

    async fn complete(&self, _prompt: &str) -> Result<String, RagError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reply.clone().map_err(RagError::GenerationBackend)
    }
}

/// Application state rooted in `data_dir` with default settings.
pub async fn state(data_dir: &Path, llm: Option<Arc<dyn LlmProvider>>) -> Arc<AppState> {
    let paths = Arc::new(AppPaths::from_data_dir(data_dir.to_path_buf()));
    AppState::build(paths, Settings::default(), llm).await.unwrap()
}
