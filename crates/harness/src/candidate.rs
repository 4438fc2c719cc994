//! Parsing generator responses into candidates.
//!
//! A response must carry a `## Policy Name` heading, a `## Policy
//! Description` heading and exactly one fenced C++ block. Headings are
//! matched case-insensitively, in any order, and each must appear exactly
//! once outside code fences. Anything less and the response is rejected.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static NAME_HEADING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^#{1,6}\s*policy\s+name\s*:?$").expect("Invalid name heading regex")
});

static DESCRIPTION_HEADING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^#{1,6}\s*policy\s+description\s*:?$")
        .expect("Invalid description heading regex")
});

static ANY_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#{1,6}\s").expect("Invalid heading regex"));

const CODE_LANGUAGES: [&str; 4] = ["cpp", "c++", "cc", "cxx"];

/// The three sections recovered from one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseSections {
    pub name: String,
    pub description: String,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    /// `<iteration:03>_<slot:02>_<sanitized name>`.
    pub id: String,
    pub iteration: usize,
    pub slot: usize,
    pub name: String,
    pub description: String,
    pub source_text: String,
}

impl Candidate {
    pub fn new(iteration: usize, slot: usize, sections: ResponseSections) -> Self {
        Self {
            id: candidate_id(iteration, slot, &sections.name),
            iteration,
            slot,
            name: sections.name,
            description: sections.description,
            source_text: sections.code,
        }
    }

    pub fn from_response(iteration: usize, slot: usize, text: &str) -> Option<Self> {
        parse_generator_response(text).map(|sections| Self::new(iteration, slot, sections))
    }
}

pub fn candidate_id(iteration: usize, slot: usize, name: &str) -> String {
    format!("{iteration:03}_{slot:02}_{}", sanitize_name(name))
}

/// Lower-case ASCII alphanumerics joined by single underscores.
pub fn sanitize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut separator = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if separator && !out.is_empty() {
                out.push('_');
            }
            separator = false;
            out.push(c.to_ascii_lowercase());
        } else {
            separator = true;
        }
    }
    if out.is_empty() {
        "unnamed".to_string()
    } else {
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum LineKind {
    Prose,
    FenceOpen(String),
    FenceClose,
    Fenced,
}

#[derive(Debug)]
struct Line<'a> {
    text: &'a str,
    start: usize,
    end: usize,
    kind: LineKind,
}

impl Line<'_> {
    fn is_prose(&self) -> bool {
        self.kind == LineKind::Prose
    }

    fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    fn is_heading(&self) -> bool {
        ANY_HEADING.is_match(self.text.trim())
    }
}

fn scan(text: &str) -> Vec<Line<'_>> {
    let mut lines = Vec::new();
    let mut offset = 0;
    let mut fenced = false;
    for raw in text.split_inclusive('\n') {
        let start = offset;
        offset += raw.len();
        let content = raw.trim_end_matches(['\n', '\r']);
        let kind = match content.trim().strip_prefix("```") {
            Some(_) if fenced => {
                fenced = false;
                LineKind::FenceClose
            }
            Some(lang) => {
                fenced = true;
                LineKind::FenceOpen(lang.trim().to_ascii_lowercase())
            }
            None if fenced => LineKind::Fenced,
            None => LineKind::Prose,
        };
        lines.push(Line {
            text: content,
            start,
            end: offset,
            kind,
        });
    }
    lines
}

fn single<I: Iterator<Item = usize>>(mut found: I) -> Option<usize> {
    let first = found.next()?;
    match found.next() {
        Some(_) => None,
        None => Some(first),
    }
}

fn heading_index(lines: &[Line<'_>], heading: &Regex) -> Option<usize> {
    single(
        lines
            .iter()
            .enumerate()
            .filter(|(_, line)| line.is_prose() && heading.is_match(line.text.trim()))
            .map(|(idx, _)| idx),
    )
}

fn name_after(lines: &[Line<'_>], heading: usize) -> Option<String> {
    let line = lines[heading + 1..].iter().find(|line| !line.is_blank())?;
    if !line.is_prose() || line.is_heading() {
        return None;
    }
    let name = line.text.trim().trim_matches(|c| c == '*' || c == '`').trim();
    (!name.is_empty()).then(|| name.to_string())
}

fn paragraph_after(lines: &[Line<'_>], heading: usize) -> Option<String> {
    let body: Vec<&str> = lines[heading + 1..]
        .iter()
        .skip_while(|line| line.is_blank() && line.is_prose())
        .take_while(|line| line.is_prose() && !line.is_blank() && !line.is_heading())
        .map(|line| line.text.trim_end())
        .collect();
    let paragraph = body.join("\n").trim().to_string();
    (!paragraph.is_empty()).then_some(paragraph)
}

fn code_block(text: &str, lines: &[Line<'_>]) -> Option<String> {
    let mut blocks = Vec::new();
    for (idx, line) in lines.iter().enumerate() {
        let LineKind::FenceOpen(lang) = &line.kind else {
            continue;
        };
        if !CODE_LANGUAGES.contains(&lang.as_str()) {
            continue;
        }
        let Some(close) = lines[idx + 1..]
            .iter()
            .find(|l| l.kind == LineKind::FenceClose)
        else {
            continue;
        };
        let body = &text[line.end..close.start];
        let body = body
            .strip_suffix("\r\n")
            .or_else(|| body.strip_suffix('\n'))
            .unwrap_or(body);
        blocks.push(body);
    }
    match blocks.as_slice() {
        [only] if !only.trim().is_empty() => Some(only.to_string()),
        _ => None,
    }
}

/// Recover name, description and code, or nothing at all.
pub fn parse_generator_response(text: &str) -> Option<ResponseSections> {
    let lines = scan(text);
    let name = name_after(&lines, heading_index(&lines, &NAME_HEADING)?)?;
    let description = paragraph_after(&lines, heading_index(&lines, &DESCRIPTION_HEADING)?)?;
    let code = code_block(text, &lines)?;
    Some(ResponseSections {
        name,
        description,
        code,
    })
}
