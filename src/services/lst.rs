//! Structural parser and merger for XvT mission list (`.lst`) files.
//!
//! A list file is a sequence of sections. Each section has a header line that the
//! game shows as a drop-down grouping, an optional `//` marker, then missions as
//! groups of three lines (id, file name, display name), closed by a `//` marker:
//!
//! ```text
//! //Header A
//! //
//! 1
//! M1.TIE
//! Name1
//! //
//! ```
//!
//! Merging is additive: missions are deduplicated globally by file name
//! (case-insensitive) and sections are matched by header (case-insensitive).

use std::collections::HashSet;

const MARKER: &str = "//";

/// One mission entry: three consecutive lines in a list file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mission {
    pub id: String,
    pub filename: String,
    pub name: String,
}

impl Mission {
    pub fn new(id: impl Into<String>, filename: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            filename: filename.into(),
            name: name.into(),
        }
    }

    fn key(&self) -> String {
        self.filename.to_lowercase()
    }
}

/// A header and the missions listed under it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub header: String,
    pub missions: Vec<Mission>,
}

impl Section {
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            missions: Vec::new(),
        }
    }

    pub fn with_missions(header: impl Into<String>, missions: Vec<Mission>) -> Self {
        Self {
            header: header.into(),
            missions,
        }
    }

    fn same_header(&self, header: &str) -> bool {
        self.header.trim().to_lowercase() == header.trim().to_lowercase()
    }
}

/// Line terminator used when writing a document back out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineEnding {
    #[default]
    CrLf,
    Lf,
}

impl LineEnding {
    fn as_str(self) -> &'static str {
        match self {
            LineEnding::CrLf => "\r\n",
            LineEnding::Lf => "\n",
        }
    }
}

/// Byte encoding of the file the document was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextEncoding {
    #[default]
    Utf8,
    /// One byte per character; used when the bytes are not valid UTF-8
    Latin1,
}

/// How a document was stored on disk, so a rewrite keeps the same shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextFormat {
    pub encoding: TextEncoding,
    pub line_ending: LineEnding,
    pub byte_order_mark: bool,
}

/// Parsed list file. Never persisted; rebuilt from bytes each time.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LstDocument {
    pub sections: Vec<Section>,
    pub format: TextFormat,
}

impl LstDocument {
    pub fn new(sections: Vec<Section>) -> Self {
        Self {
            sections,
            format: TextFormat::default(),
        }
    }

    /// Parse already-split lines.
    pub fn parse<S: AsRef<str>>(lines: &[S]) -> Self {
        Self::new(parse_sections(lines))
    }

    /// Parse text, remembering which line ending it used.
    pub fn parse_text(text: &str) -> Self {
        let line_ending = if text.contains("\r\n") || !text.contains('\n') {
            LineEnding::CrLf
        } else {
            LineEnding::Lf
        };
        let lines: Vec<&str> = text.lines().collect();

        let mut document = Self::parse(&lines);
        document.format.line_ending = line_ending;
        document
    }

    /// Decode raw file bytes (UTF-8, falling back to Latin-1) and parse them.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let (bytes, byte_order_mark) = match bytes.strip_prefix(b"\xEF\xBB\xBF") {
            Some(rest) => (rest, true),
            None => (bytes, false),
        };

        let (text, encoding) = match std::str::from_utf8(bytes) {
            Ok(text) => (text.to_string(), TextEncoding::Utf8),
            Err(_) => (
                bytes.iter().map(|&b| char::from(b)).collect(),
                TextEncoding::Latin1,
            ),
        };

        let mut document = Self::parse_text(&text);
        document.format.encoding = encoding;
        document.format.byte_order_mark = byte_order_mark;
        document
    }

    pub fn render(&self) -> Vec<String> {
        render_sections(&self.sections)
    }

    /// Render to text with the document's line ending, including a trailing one.
    pub fn to_text(&self) -> String {
        let ending = self.format.line_ending.as_str();
        let mut text = String::new();
        for line in self.render() {
            text.push_str(&line);
            text.push_str(ending);
        }
        text
    }

    /// Encode for writing back to disk.
    ///
    /// Latin-1 documents stay Latin-1 unless merged content added characters
    /// it cannot represent, in which case the output is UTF-8.
    pub fn to_bytes(&self) -> Vec<u8> {
        let text = self.to_text();
        let mut bytes = Vec::with_capacity(text.len() + 3);

        let latin1 = self.format.encoding == TextEncoding::Latin1 && text.chars().all(|c| (c as u32) <= 0xFF);
        if latin1 {
            bytes.extend(text.chars().map(|c| c as u32 as u8));
        } else {
            if self.format.byte_order_mark {
                bytes.extend_from_slice(b"\xEF\xBB\xBF");
            }
            bytes.extend_from_slice(text.as_bytes());
        }
        bytes
    }

    pub fn mission_count(&self) -> usize {
        self.sections.iter().map(|s| s.missions.len()).sum()
    }

    /// Lowercased file names of every mission in the document.
    pub fn filename_set(&self) -> HashSet<String> {
        self.sections
            .iter()
            .flat_map(|s| s.missions.iter().map(Mission::key))
            .collect()
    }

    pub fn contains_filename(&self, filename: &str) -> bool {
        let key = filename.to_lowercase();
        self.sections
            .iter()
            .any(|s| s.missions.iter().any(|m| m.key() == key))
    }

    /// Merge `incoming` into this document and return how many missions were added.
    ///
    /// Missions whose file name already appears anywhere in this document are
    /// skipped. Sections matching an existing header extend it in place; new
    /// headers become trailing sections. A section with nothing new is not added.
    pub fn merge_from(&mut self, incoming: &LstDocument) -> usize {
        let mut seen = self.filename_set();
        let mut added = 0;

        for section in &incoming.sections {
            let fresh: Vec<Mission> = section
                .missions
                .iter()
                .filter(|m| seen.insert(m.key()))
                .cloned()
                .collect();

            if fresh.is_empty() {
                continue;
            }
            added += fresh.len();

            match self.sections.iter_mut().find(|s| s.same_header(&section.header)) {
                Some(existing) => existing.missions.extend(fresh),
                None => self
                    .sections
                    .push(Section::with_missions(section.header.clone(), fresh)),
            }
        }

        added
    }
}

/// Merge `incoming` into `base`, returning the merged document and the number of missions added.
pub fn merge(mut base: LstDocument, incoming: &LstDocument) -> (LstDocument, usize) {
    let added = base.merge_from(incoming);
    (base, added)
}

fn is_marker(line: &str) -> bool {
    line == MARKER
}

fn starts_marker(line: &str) -> bool {
    line.starts_with(MARKER)
}

/// Parse list-file lines into sections.
///
/// Blank lines are ignored, bare `//` lines where a header is expected are
/// skipped, trailing partial mission groups are dropped, and sections without
/// missions are discarded.
pub fn parse_sections<S: AsRef<str>>(lines: &[S]) -> Vec<Section> {
    let lines: Vec<&str> = lines
        .iter()
        .map(|l| l.as_ref().trim())
        .filter(|l| !l.is_empty())
        .collect();

    let mut sections = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        if is_marker(lines[i]) {
            i += 1;
            continue;
        }

        let mut section = Section::new(lines[i]);
        i += 1;

        if i < lines.len() && is_marker(lines[i]) {
            i += 1;
        }

        loop {
            if i >= lines.len() {
                break;
            }
            if starts_marker(lines[i]) {
                // A bare marker closes the section; a `//Header` opens the next one.
                if is_marker(lines[i]) {
                    i += 1;
                }
                break;
            }

            let group: Vec<&str> = lines[i..]
                .iter()
                .take(3)
                .take_while(|l| !starts_marker(l))
                .copied()
                .collect();
            i += group.len();

            if let &[id, filename, name] = group.as_slice() {
                section.missions.push(Mission::new(id, filename, name));
            }
        }

        if !section.missions.is_empty() {
            sections.push(section);
        }
    }

    sections
}

/// Render sections back to list-file lines.
pub fn render_sections(sections: &[Section]) -> Vec<String> {
    let mut lines = Vec::with_capacity(sections.iter().map(|s| s.missions.len() * 3 + 3).sum());

    for section in sections {
        lines.push(section.header.clone());
        lines.push(MARKER.to_string());
        for mission in &section.missions {
            lines.push(mission.id.clone());
            lines.push(mission.filename.clone());
            lines.push(mission.name.clone());
        }
        lines.push(MARKER.to_string());
    }

    lines
}
