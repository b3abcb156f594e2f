//! Font-aware decoding of string operands.
//!
//! A font's `/ToUnicode` CMap wins when present. Otherwise simple fonts
//! decode one byte per glyph through their base encoding, with
//! `/Differences` applied on top. Fonts neither path can read are left
//! out of the map and their strings go through [`decode_pdf_string`].

use std::collections::HashMap;
use std::sync::OnceLock;

use lopdf::{Dictionary, Document, Object};
use regex::Regex;

use super::pdf::decode_pdf_string;

/// Decoders keyed by font resource name (`/F1`, `/TT0`, ...).
pub type FontMap = HashMap<Vec<u8>, FontDecoder>;

/// Upper bound on codes expanded from a single `bfrange` entry.
const MAX_RANGE_SPAN: u32 = 0xFFFF;

static CODESPACE: OnceLock<Regex> = OnceLock::new();
static BFCHAR: OnceLock<Regex> = OnceLock::new();
static BFRANGE: OnceLock<Regex> = OnceLock::new();
static HEX_STRING: OnceLock<Regex> = OnceLock::new();

fn codespace_pattern() -> &'static Regex {
    CODESPACE.get_or_init(|| {
        Regex::new(r"begincodespacerange\s*<([0-9A-Fa-f]+)>").expect("valid codespace pattern")
    })
}

fn bfchar_pattern() -> &'static Regex {
    BFCHAR.get_or_init(|| {
        Regex::new(r"<([0-9A-Fa-f]+)>\s*<([0-9A-Fa-f]*)>").expect("valid bfchar pattern")
    })
}

fn bfrange_pattern() -> &'static Regex {
    BFRANGE.get_or_init(|| {
        Regex::new(r"<([0-9A-Fa-f]+)>\s*<([0-9A-Fa-f]+)>\s*(?:<([0-9A-Fa-f]*)>|\[([^\]]*)\])")
            .expect("valid bfrange pattern")
    })
}

fn hex_string_pattern() -> &'static Regex {
    HEX_STRING
        .get_or_init(|| Regex::new(r"<([0-9A-Fa-f]*)>").expect("valid hex string pattern"))
}

#[derive(Debug, Clone)]
pub enum FontDecoder {
    /// `/ToUnicode` map over codes of `code_len` bytes.
    CMap {
        code_len: usize,
        map: HashMap<u32, String>,
    },
    /// One byte per glyph, 256 entries.
    Simple { table: Vec<Option<String>> },
}

impl FontDecoder {
    pub fn from_font(doc: &Document, font: &Dictionary) -> Option<Self> {
        if let Some(cmap) = to_unicode(doc, font) {
            return Some(cmap);
        }
        if font.get(b"Subtype").and_then(Object::as_name).ok() == Some(b"Type0".as_slice()) {
            // CID fonts without a ToUnicode map carry no text semantics.
            return None;
        }
        simple_encoding(doc, font)
    }

    pub fn decode(&self, bytes: &[u8]) -> String {
        match self {
            Self::CMap { code_len, map } => bytes
                .chunks(*code_len)
                .filter_map(|code| map.get(&code_value(code)))
                .map(String::as_str)
                .collect(),
            Self::Simple { table } => bytes
                .iter()
                .filter_map(|b| table[*b as usize].as_deref())
                .collect(),
        }
    }
}

/// Decoders for every font the page can reach, inherited resources included.
pub fn page_fonts(doc: &Document, page: lopdf::ObjectId) -> FontMap {
    match doc.get_page_fonts(page) {
        Ok(fonts) => fonts
            .into_iter()
            .filter_map(|(name, dict)| FontDecoder::from_font(doc, dict).map(|d| (name, d)))
            .collect(),
        Err(err) => {
            tracing::debug!("no font resources for page {:?}: {}", page, err);
            FontMap::new()
        }
    }
}

fn to_unicode(doc: &Document, font: &Dictionary) -> Option<FontDecoder> {
    let object = font.get(b"ToUnicode").ok()?;
    let (_, object) = doc.dereference(object).ok()?;
    let stream = object.as_stream().ok()?;
    let content = match stream.get_plain_content() {
        Ok(content) => content,
        Err(err) => {
            tracing::debug!("unreadable ToUnicode stream: {}", err);
            return None;
        }
    };
    parse_cmap(&String::from_utf8_lossy(&content))
}

/// Reads the `bfchar` and `bfrange` sections of a ToUnicode CMap.
pub fn parse_cmap(text: &str) -> Option<FontDecoder> {
    let mut map = HashMap::new();

    for block in sections(text, "beginbfchar", "endbfchar") {
        for cap in bfchar_pattern().captures_iter(block) {
            map.insert(code_value(&hex_bytes(&cap[1])), utf16_text(&cap[2]));
        }
    }

    for block in sections(text, "beginbfrange", "endbfrange") {
        for cap in bfrange_pattern().captures_iter(block) {
            let lo = code_value(&hex_bytes(&cap[1]));
            let hi = code_value(&hex_bytes(&cap[2]));
            if hi < lo || hi - lo > MAX_RANGE_SPAN {
                continue;
            }
            if let Some(start) = cap.get(3) {
                let units = utf16_units(start.as_str());
                for (offset, code) in (lo..=hi).enumerate() {
                    let mut units = units.clone();
                    if let Some(last) = units.last_mut() {
                        *last = last.wrapping_add(offset as u16);
                    }
                    map.insert(code, String::from_utf16_lossy(&units));
                }
            } else if let Some(list) = cap.get(4) {
                for (code, dst) in (lo..=hi).zip(hex_string_pattern().captures_iter(list.as_str()))
                {
                    map.insert(code, utf16_text(&dst[1]));
                }
            }
        }
    }

    if map.is_empty() {
        return None;
    }

    let code_len = codespace_pattern()
        .captures(text)
        .map(|cap| cap[1].len().div_ceil(2))
        .unwrap_or(2)
        .clamp(1, 4);

    Some(FontDecoder::CMap { code_len, map })
}

fn sections<'a>(text: &'a str, begin: &'a str, end: &'a str) -> impl Iterator<Item = &'a str> {
    text.split(begin)
        .skip(1)
        .filter_map(move |rest| rest.split(end).next())
}

fn simple_encoding(doc: &Document, font: &Dictionary) -> Option<FontDecoder> {
    let (_, encoding) = doc.dereference(font.get(b"Encoding").ok()?).ok()?;
    let (base, differences) = match encoding {
        Object::Name(name) => (Some(name.as_slice()), None),
        Object::Dictionary(dict) => (
            dict.get(b"BaseEncoding").and_then(Object::as_name).ok(),
            dict.get(b"Differences").and_then(Object::as_array).ok(),
        ),
        _ => return None,
    };

    let mut table = base_table(doc, base);
    if let Some(differences) = differences {
        apply_differences(&mut table, differences);
    }
    Some(FontDecoder::Simple { table })
}

/// Single-byte table for a named base encoding; WinAnsi when unnamed or
/// unknown.
fn base_table(doc: &Document, name: Option<&[u8]>) -> Vec<Option<String>> {
    let win_ansi = || -> Vec<Option<String>> {
        (0..=255u8).map(|b| Some(decode_pdf_string(&[b]))).collect()
    };

    let Some(name) = name.filter(|n| *n != b"WinAnsiEncoding".as_slice()) else {
        return win_ansi();
    };

    let mut font = Dictionary::new();
    font.set("Type", Object::Name(b"Font".to_vec()));
    font.set("Encoding", Object::Name(name.to_vec()));
    let Ok(encoding) = font.get_font_encoding(doc) else {
        return win_ansi();
    };

    let table: Vec<Option<String>> = (0..=255u8)
        .map(|b| {
            Document::decode_text(&encoding, &[b])
                .ok()
                .filter(|text| !text.is_empty())
        })
        .collect();
    if table.iter().all(Option::is_none) {
        return win_ansi();
    }
    table
}

fn apply_differences(table: &mut [Option<String>], differences: &[Object]) {
    let mut code: Option<usize> = None;
    for item in differences {
        match item {
            Object::Integer(value) => code = usize::try_from(*value).ok(),
            Object::Name(name) => {
                if let Some(current) = code {
                    if let Some(slot) = table.get_mut(current) {
                        *slot = glyph_text(name);
                    }
                    code = Some(current + 1);
                }
            }
            _ => {}
        }
    }
}

const GLYPH_NAMES: &[(&str, &str)] = &[
    ("space", " "),
    ("exclam", "!"),
    ("quotedbl", "\""),
    ("numbersign", "#"),
    ("dollar", "$"),
    ("percent", "%"),
    ("ampersand", "&"),
    ("quotesingle", "'"),
    ("parenleft", "("),
    ("parenright", ")"),
    ("asterisk", "*"),
    ("plus", "+"),
    ("comma", ","),
    ("hyphen", "-"),
    ("period", "."),
    ("slash", "/"),
    ("zero", "0"),
    ("one", "1"),
    ("two", "2"),
    ("three", "3"),
    ("four", "4"),
    ("five", "5"),
    ("six", "6"),
    ("seven", "7"),
    ("eight", "8"),
    ("nine", "9"),
    ("colon", ":"),
    ("semicolon", ";"),
    ("less", "<"),
    ("equal", "="),
    ("greater", ">"),
    ("question", "?"),
    ("at", "@"),
    ("bracketleft", "["),
    ("backslash", "\\"),
    ("bracketright", "]"),
    ("underscore", "_"),
    ("braceleft", "{"),
    ("bar", "|"),
    ("braceright", "}"),
    ("quoteleft", "\u{2018}"),
    ("quoteright", "\u{2019}"),
    ("quotedblleft", "\u{201C}"),
    ("quotedblright", "\u{201D}"),
    ("endash", "\u{2013}"),
    ("emdash", "\u{2014}"),
    ("bullet", "\u{2022}"),
    ("degree", "\u{B0}"),
    ("plusminus", "\u{B1}"),
    ("mu", "\u{B5}"),
    ("multiply", "\u{D7}"),
    ("registered", "\u{AE}"),
    ("copyright", "\u{A9}"),
    ("trademark", "\u{2122}"),
    ("eacute", "\u{E9}"),
    ("egrave", "\u{E8}"),
    ("ecircumflex", "\u{EA}"),
    ("agrave", "\u{E0}"),
    ("ccedilla", "\u{E7}"),
    ("udieresis", "\u{FC}"),
    ("odieresis", "\u{F6}"),
    ("adieresis", "\u{E4}"),
    ("fi", "fi"),
    ("fl", "fl"),
];

/// Unicode text for an Adobe glyph name.
fn glyph_text(name: &[u8]) -> Option<String> {
    let name = std::str::from_utf8(name).ok()?;
    let name = name.split('.').next().unwrap_or(name);

    if let Some(hex) = name.strip_prefix("uni") {
        if hex.len() >= 4 && hex.len() % 4 == 0 {
            let units: Option<Vec<u16>> = (0..hex.len())
                .step_by(4)
                .map(|i| u16::from_str_radix(&hex[i..i + 4], 16).ok())
                .collect();
            return units.map(|u| String::from_utf16_lossy(&u));
        }
    }
    if let Some(hex) = name.strip_prefix('u') {
        if (4..=6).contains(&hex.len()) {
            if let Some(c) = u32::from_str_radix(hex, 16).ok().and_then(char::from_u32) {
                return Some(c.to_string());
            }
        }
    }
    let mut chars = name.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        if c.is_ascii_alphabetic() {
            return Some(c.to_string());
        }
    }
    GLYPH_NAMES
        .iter()
        .find(|(glyph, _)| *glyph == name)
        .map(|(_, text)| text.to_string())
}

fn hex_bytes(hex: &str) -> Vec<u8> {
    let mut padded = hex.to_string();
    if padded.len() % 2 == 1 {
        padded.push('0');
    }
    hex::decode(padded).unwrap_or_default()
}

fn code_value(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, b| (acc << 8) | u32::from(*b))
}

fn utf16_units(hex: &str) -> Vec<u16> {
    hex_bytes(hex)
        .chunks(2)
        .map(|pair| match pair {
            [hi, lo] => u16::from_be_bytes([*hi, *lo]),
            [single] => u16::from(*single),
            _ => 0,
        })
        .collect()
}

fn utf16_text(hex: &str) -> String {
    String::from_utf16_lossy(&utf16_units(hex))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUBSET_CMAP: &str = "/CIDInit /ProcSet findresource begin\n\
        12 dict begin\nbegincmap\n\
        1 begincodespacerange\n<0000> <FFFF>\nendcodespacerange\n\
        2 beginbfchar\n<0003> <0020>\n<0011> <00B0>\nendbfchar\n\
        2 beginbfrange\n<0024> <003D> <0041>\n<0044> <0046> [<0066006C> <0065> <0072>]\nendbfrange\n\
        endcmap\nCMapName currentdict /CMap defineresource pop\nend\nend";

    #[test]
    fn cmap_decodes_two_byte_codes() {
        let decoder = parse_cmap(SUBSET_CMAP).unwrap();
        let bytes = [0x00, 0x24, 0x00, 0x25, 0x00, 0x03, 0x00, 0x11, 0x00, 0x44];
        assert_eq!(decoder.decode(&bytes), "AB °fl");
        assert!(matches!(decoder, FontDecoder::CMap { code_len: 2, .. }));
    }

    #[test]
    fn single_byte_codespace_reads_one_byte_per_code() {
        let cmap = "begincodespacerange\n<00> <FF>\nendcodespacerange\n\
            1 beginbfrange\n<41> <43> <0058>\nendbfrange";
        let decoder = parse_cmap(cmap).unwrap();
        assert_eq!(decoder.decode(b"CAB"), "ZXY");
    }

    #[test]
    fn differences_override_the_base_encoding() {
        let doc = Document::with_version("1.5");
        let mut table = base_table(&doc, None);
        apply_differences(
            &mut table,
            &[
                Object::Integer(1),
                Object::Name(b"G".to_vec()),
                Object::Name(b"uni00B5".to_vec()),
                Object::Name(b"degree".to_vec()),
            ],
        );
        let decoder = FontDecoder::Simple { table };
        assert_eq!(decoder.decode(&[1, 0x20, 2, 3]), "G µ°");
    }

    #[test]
    fn glyph_names_cover_common_forms() {
        assert_eq!(glyph_text(b"A").as_deref(), Some("A"));
        assert_eq!(glyph_text(b"five").as_deref(), Some("5"));
        assert_eq!(glyph_text(b"u1F600").as_deref(), Some("\u{1F600}"));
        assert_eq!(glyph_text(b"a.sc").as_deref(), Some("a"));
        assert_eq!(glyph_text(b"g42"), None);
    }
}
