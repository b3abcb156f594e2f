//! Reading-order reconstruction for positioned page text.
//!
//! Fragments are grouped into lines, lines into cell segments, and a page
//! with a clear vertical gutter is read column by column: every band of
//! lines between two full-width lines yields its left column, then its
//! right column. Runs of multi-cell lines become Markdown table rows and
//! lines set in a larger font become Markdown headings.

use std::collections::HashMap;

use super::pdf::{RawPage, TextFragment};

/// Horizontal gap (in ems) that separates two table cells or columns.
const CELL_GAP_EM: f32 = 1.5;
/// Vertical distance (in ems of body text) under which fragments share a line.
const LINE_TOLERANCE_EM: f32 = 0.5;
/// Font size ratio, relative to body text, from which a line is a heading.
const HEADING_SCALE: f32 = 1.2;
const MAX_HEADING_LEVEL: usize = 3;
/// Minimum number of lines on each side of a gutter.
const MIN_COLUMN_LINES: usize = 2;
/// Share of lines allowed to span a gutter before it is rejected.
const MAX_CROSSING_RATIO: f32 = 0.3;
/// Median share of its column a line must fill on each side of a gutter.
/// Keeps key/value rows, whose cells sit far apart, from reading as columns.
const MIN_COLUMN_FILL: f32 = 0.6;
const GUTTER_SCAN_START: f32 = 0.3;
const GUTTER_SCAN_END: f32 = 0.7;
const GUTTER_STEP: f32 = 2.0;
/// A vertical gap this many times the usual line gap starts a paragraph.
const PARAGRAPH_GAP_FACTOR: f32 = 1.6;
/// Share of printable characters required for positioned text to be used.
const MIN_READABLE_RATIO: f32 = 0.8;

/// Font sizes observed across a whole document.
#[derive(Debug, Clone, PartialEq)]
pub struct FontProfile {
    pub body_size: f32,
    /// Distinct heading sizes, largest first.
    heading_sizes: Vec<f32>,
}

impl Default for FontProfile {
    fn default() -> Self {
        Self {
            body_size: 10.0,
            heading_sizes: Vec::new(),
        }
    }
}

impl FontProfile {
    /// Body size is the size carrying the most characters; every size at
    /// least `HEADING_SCALE` times larger is a heading size.
    pub fn from_pages(pages: &[RawPage]) -> Self {
        let mut weights: HashMap<i32, usize> = HashMap::new();
        for fragment in pages.iter().flat_map(|p| p.fragments.iter()) {
            *weights.entry(size_key(fragment.size)).or_default() += fragment.text.chars().count();
        }

        let Some(body_key) = weights
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
            .map(|(key, _)| *key)
        else {
            return Self::default();
        };
        let body_size = key_size(body_key);

        let mut heading_sizes: Vec<f32> = weights
            .keys()
            .map(|key| key_size(*key))
            .filter(|size| *size >= body_size * HEADING_SCALE)
            .collect();
        heading_sizes.sort_by(|a, b| b.total_cmp(a));

        Self {
            body_size,
            heading_sizes,
        }
    }

    pub fn heading_level(&self, size: f32) -> Option<usize> {
        let key = size_key(size);
        self.heading_sizes
            .iter()
            .position(|s| size_key(*s) == key)
            .map(|index| (index + 1).min(MAX_HEADING_LEVEL))
    }
}

/// Sizes are compared at half-point resolution.
fn size_key(size: f32) -> i32 {
    (size * 2.0).round() as i32
}

fn key_size(key: i32) -> f32 {
    key as f32 / 2.0
}

#[derive(Debug, Clone)]
struct Segment {
    x0: f32,
    x1: f32,
    text: String,
}

#[derive(Debug, Clone)]
struct Line {
    y: f32,
    size: f32,
    segments: Vec<Segment>,
}

impl Line {
    fn text(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn crosses(&self, gutter: f32) -> bool {
        self.segments.iter().any(|s| s.x0 < gutter && s.x1 > gutter)
    }

    fn split_at(&self, gutter: f32) -> (Option<Line>, Option<Line>) {
        let (left, right): (Vec<Segment>, Vec<Segment>) = self
            .segments
            .iter()
            .cloned()
            .partition(|s| s.x1 <= gutter);
        let part = |segments: Vec<Segment>| {
            (!segments.is_empty()).then(|| Line {
                y: self.y,
                size: self.size,
                segments,
            })
        };
        (part(left), part(right))
    }
}

/// Renders one page as reading-ordered text with Markdown tables and
/// headings.
pub fn reconstruct(page: &RawPage, profile: &FontProfile) -> String {
    let lines = group_lines(&page.fragments, profile.body_size);
    if lines.is_empty() {
        return String::new();
    }

    let flows = match find_gutter(&lines, page.width) {
        Some(gutter) => column_flows(&lines, gutter),
        None => vec![lines],
    };

    flows
        .iter()
        .map(|flow| render_flow(flow, profile))
        .filter(|text| !text.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn group_lines(fragments: &[TextFragment], body_size: f32) -> Vec<Line> {
    let mut sorted: Vec<&TextFragment> = fragments.iter().collect();
    sorted.sort_by(|a, b| b.y.total_cmp(&a.y).then(a.x.total_cmp(&b.x)));

    let tolerance = body_size.max(1.0) * LINE_TOLERANCE_EM;
    let mut groups: Vec<Vec<&TextFragment>> = Vec::new();
    for fragment in sorted {
        match groups.last_mut() {
            Some(group) if (group[0].y - fragment.y).abs() <= tolerance => group.push(fragment),
            _ => groups.push(vec![fragment]),
        }
    }

    groups
        .into_iter()
        .map(|mut group| {
            group.sort_by(|a, b| a.x.total_cmp(&b.x));
            Line {
                y: group[0].y,
                size: group.iter().map(|f| f.size).fold(0.0, f32::max),
                segments: merge_segments(&group),
            }
        })
        .collect()
}

fn merge_segments(fragments: &[&TextFragment]) -> Vec<Segment> {
    let mut segments: Vec<Segment> = Vec::new();
    for fragment in fragments {
        let text = fragment.text.trim();
        if text.is_empty() {
            continue;
        }
        match segments.last_mut() {
            Some(last) if fragment.x - last.x1 <= CELL_GAP_EM * fragment.size => {
                let gap = fragment.x - last.x1;
                if gap > fragment.size * 0.2 || fragment.text.starts_with(' ') {
                    last.text.push(' ');
                }
                last.text.push_str(text);
                last.x1 = last.x1.max(fragment.right());
            }
            _ => segments.push(Segment {
                x0: fragment.x,
                x1: fragment.right(),
                text: text.to_string(),
            }),
        }
    }
    segments
}

/// Finds an x position that most lines do not span and that has text on
/// both sides.
fn find_gutter(lines: &[Line], width: f32) -> Option<f32> {
    let start = width * GUTTER_SCAN_START;
    let end = width * GUTTER_SCAN_END;

    let mut best: Option<(usize, f32, f32)> = None;
    let mut run: Option<(usize, f32, f32)> = None;
    let mut x = start;
    while x <= end {
        let crossing = lines.iter().filter(|l| l.crosses(x)).count();
        run = match run {
            Some((count, from, _)) if count == crossing => Some((count, from, x)),
            _ => Some((crossing, x, x)),
        };
        if let Some(current) = run {
            let better = match best {
                None => true,
                Some((count, from, to)) => {
                    current.0 < count || (current.0 == count && current.2 - current.1 > to - from)
                }
            };
            if better {
                best = Some(current);
            }
        }
        x += GUTTER_STEP;
    }

    let (crossing, from, to) = best?;
    let gutter = (from + to) / 2.0;
    if crossing as f32 > lines.len() as f32 * MAX_CROSSING_RATIO {
        return None;
    }

    let left = lines
        .iter()
        .filter(|l| l.segments.iter().any(|s| s.x1 <= gutter))
        .count();
    let right = lines
        .iter()
        .filter(|l| l.segments.iter().any(|s| s.x0 >= gutter))
        .count();
    if left < MIN_COLUMN_LINES || right < MIN_COLUMN_LINES {
        return None;
    }

    let (left_fill, right_fill) = column_fill(lines, gutter)?;
    (left_fill >= MIN_COLUMN_FILL && right_fill >= MIN_COLUMN_FILL).then_some(gutter)
}

/// Median width of each side's text relative to the room between the
/// outer text edge and the gutter.
fn column_fill(lines: &[Line], gutter: f32) -> Option<(f32, f32)> {
    let sides: Vec<(Option<Line>, Option<Line>)> = lines
        .iter()
        .filter(|l| !l.crosses(gutter))
        .map(|l| l.split_at(gutter))
        .collect();

    let extent = |line: &Line| {
        let x0 = line.segments.iter().map(|s| s.x0).fold(f32::MAX, f32::min);
        let x1 = line.segments.iter().map(|s| s.x1).fold(f32::MIN, f32::max);
        (x0, x1)
    };
    let left: Vec<(f32, f32)> = sides.iter().filter_map(|(l, _)| l.as_ref()).map(extent).collect();
    let right: Vec<(f32, f32)> = sides.iter().filter_map(|(_, r)| r.as_ref()).map(extent).collect();

    let left_edge = left.iter().map(|e| e.0).fold(f32::MAX, f32::min);
    let right_edge = right.iter().map(|e| e.1).fold(f32::MIN, f32::max);
    let left_room = gutter - left_edge;
    let right_room = right_edge - gutter;
    if left_room <= 0.0 || right_room <= 0.0 {
        return None;
    }

    let left_fill = median(left.iter().map(|(_, x1)| (x1 - left_edge) / left_room).collect())?;
    let right_fill = median(right.iter().map(|(x0, x1)| (x1 - x0) / right_room).collect())?;
    Some((left_fill, right_fill))
}

fn median(mut values: Vec<f32>) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f32::total_cmp);
    Some(values[values.len() / 2])
}

/// Splits lines into flows: full-width lines stay in place, the lines
/// between them are read left column first.
fn column_flows(lines: &[Line], gutter: f32) -> Vec<Vec<Line>> {
    let mut flows = Vec::new();
    let mut left: Vec<Line> = Vec::new();
    let mut right: Vec<Line> = Vec::new();

    let flush = |flows: &mut Vec<Vec<Line>>, left: &mut Vec<Line>, right: &mut Vec<Line>| {
        if !left.is_empty() {
            flows.push(std::mem::take(left));
        }
        if !right.is_empty() {
            flows.push(std::mem::take(right));
        }
    };

    for line in lines {
        if line.crosses(gutter) {
            flush(&mut flows, &mut left, &mut right);
            flows.push(vec![line.clone()]);
            continue;
        }
        let (l, r) = line.split_at(gutter);
        left.extend(l);
        right.extend(r);
    }
    flush(&mut flows, &mut left, &mut right);
    flows
}

fn render_flow(lines: &[Line], profile: &FontProfile) -> String {
    let line_gap = typical_gap(lines);
    let mut out: Vec<String> = Vec::new();
    let mut index = 0;

    while index < lines.len() {
        let table_len = lines[index..]
            .iter()
            .take_while(|l| l.segments.len() >= 2)
            .count();

        if index > 0 {
            let gap = lines[index - 1].y - lines[index].y;
            if line_gap.is_some_and(|g| gap > g * PARAGRAPH_GAP_FACTOR) {
                out.push(String::new());
            }
        }

        if table_len >= 2 {
            if out.last().is_some_and(|l| !l.is_empty()) {
                out.push(String::new());
            }
            out.extend(table_rows(&lines[index..index + table_len]));
            out.push(String::new());
            index += table_len;
            continue;
        }

        let line = &lines[index];
        match profile.heading_level(line.size) {
            Some(level) => {
                if out.last().is_some_and(|l| !l.is_empty()) {
                    out.push(String::new());
                }
                out.push(format!("{} {}", "#".repeat(level), line.text()));
                out.push(String::new());
            }
            None => out.push(line.text()),
        }
        index += 1;
    }

    out.join("\n").trim().to_string()
}

fn table_rows(lines: &[Line]) -> Vec<String> {
    let mut rows = Vec::with_capacity(lines.len() + 1);
    for (i, line) in lines.iter().enumerate() {
        let cells: Vec<&str> = line.segments.iter().map(|s| s.text.as_str()).collect();
        rows.push(format!("| {} |", cells.join(" | ")));
        if i == 0 {
            rows.push(format!("|{}", " --- |".repeat(cells.len())));
        }
    }
    rows
}

fn typical_gap(lines: &[Line]) -> Option<f32> {
    let mut gaps: Vec<f32> = lines
        .windows(2)
        .map(|pair| pair[0].y - pair[1].y)
        .filter(|gap| *gap > 0.0)
        .collect();
    if gaps.is_empty() {
        return None;
    }
    gaps.sort_by(f32::total_cmp);
    Some(gaps[gaps.len() / 2])
}

/// True when most characters are printable text rather than glyph ids
/// decoded without a font mapping.
pub fn is_readable(text: &str) -> bool {
    let total = text.chars().filter(|c| !c.is_whitespace()).count();
    if total == 0 {
        return false;
    }
    let printable = text
        .chars()
        .filter(|c| !c.is_whitespace())
        .filter(|c| !c.is_control() && *c != '\u{FFFD}' && !('\u{E000}'..='\u{F8FF}').contains(c))
        .count();
    printable as f32 / total as f32 >= MIN_READABLE_RATIO
}
