//! Line-level analysis of outline text.
//!
//! One classifier decides which lines are chapter headings. Title extraction and
//! document export both go through it, so a line rendered as a heading in the
//! exported file is exactly a line that produced a chapter request.

use crate::services::prompts::Language;
use crate::utils::strip_bom;
use regex::Regex;
use std::sync::LazyLock;

/// Separator between the marker part of a heading and the chapter title.
pub const TITLE_SEPARATOR: &str = ": ";

/// What to do with a marker line that carries no `": "` separator
/// (or nothing after it), e.g. `Capítulo 3`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UntitledMarker {
    /// Drop the line; it yields no chapter.
    Skip,
    /// Use the whole trimmed line as the title.
    #[default]
    WholeLine,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerRule {
    pub marker: String,
    pub untitled: UntitledMarker,
}

impl MarkerRule {
    pub fn new(marker: impl Into<String>, untitled: UntitledMarker) -> Self {
        MarkerRule {
            marker: marker.into(),
            untitled,
        }
    }

    pub fn for_language(language: Language) -> Self {
        MarkerRule::new(language.marker(), UntitledMarker::default())
    }

    /// The marker must be a whole word: `Capítulos:` is not a heading.
    pub fn is_heading(&self, line: &str) -> bool {
        match line.trim_start().strip_prefix(self.marker.as_str()) {
            Some(rest) => !rest.chars().next().is_some_and(char::is_alphanumeric),
            None => false,
        }
    }

    /// Chapter title carried by `line`, or `None` if the line is not a heading
    /// (or is an untitled heading under [`UntitledMarker::Skip`]).
    pub fn title<'a>(&self, line: &'a str) -> Option<&'a str> {
        let line = line.trim();
        if !self.is_heading(line) {
            return None;
        }
        match line.split_once(TITLE_SEPARATOR) {
            Some((_, rest)) if !rest.trim().is_empty() => Some(rest.trim()),
            _ => match self.untitled {
                UntitledMarker::Skip => None,
                UntitledMarker::WholeLine => Some(line),
            },
        }
    }

    /// Heading line as written into assembled documents.
    pub fn heading(&self, index: usize, title: &str) -> String {
        format!("{} {}{}{}", self.marker, index, TITLE_SEPARATOR, title)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Heading,
    Body,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifiedLine<'a> {
    pub text: &'a str,
    pub kind: LineKind,
}

/// Tags every non-blank line of `text`. Blank lines separate paragraphs and
/// are not reported.
pub fn classify<'a>(
    text: &'a str,
    rule: &'a MarkerRule,
) -> impl Iterator<Item = ClassifiedLine<'a>> + 'a {
    strip_bom(text)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(move |line| ClassifiedLine {
            text: line,
            kind: if rule.is_heading(line) {
                LineKind::Heading
            } else {
                LineKind::Body
            },
        })
}

/// Chapter titles of an outline, in order of appearance, duplicates kept.
///
/// Holds only borrows, so it can be iterated any number of times.
#[derive(Debug, Clone, Copy)]
pub struct ChapterTitles<'a> {
    outline: &'a str,
    rule: &'a MarkerRule,
}

impl<'a> ChapterTitles<'a> {
    pub fn new(outline: &'a str, rule: &'a MarkerRule) -> Self {
        ChapterTitles { outline, rule }
    }

    pub fn iter(&self) -> TitlesIter<'a> {
        TitlesIter {
            lines: strip_bom(self.outline).lines(),
            rule: self.rule,
        }
    }
}

impl<'a> IntoIterator for ChapterTitles<'a> {
    type Item = &'a str;
    type IntoIter = TitlesIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a> IntoIterator for &ChapterTitles<'a> {
    type Item = &'a str;
    type IntoIter = TitlesIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub struct TitlesIter<'a> {
    lines: std::str::Lines<'a>,
    rule: &'a MarkerRule,
}

impl<'a> Iterator for TitlesIter<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let rule = self.rule;
        self.lines.by_ref().find_map(|line| rule.title(line))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Synopsis,
    Plot,
    Characters,
    Setting,
    Technique,
    Contents,
}

fn section_named(name: &str, language: Language) -> Option<Section> {
    let name = name.trim().to_lowercase();
    let section = match language {
        Language::Spanish => match name.as_str() {
            "sinopsis" | "resumen" => Section::Synopsis,
            "trama" | "argumento" => Section::Plot,
            "personajes" | "personajes principales" => Section::Characters,
            "ambientación" | "ambientacion" | "escenario" => Section::Setting,
            "técnica narrativa" | "tecnica narrativa" => Section::Technique,
            "índice" | "indice" | "tabla de contenido" | "tabla de contenidos" => {
                Section::Contents
            }
            _ => return None,
        },
        Language::English => match name.as_str() {
            "synopsis" | "summary" => Section::Synopsis,
            "plot" => Section::Plot,
            "characters" | "main characters" => Section::Characters,
            "setting" => Section::Setting,
            "narrative technique" => Section::Technique,
            "contents" | "table of contents" => Section::Contents,
            _ => return None,
        },
    };
    Some(section)
}

static SECTION_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:#{1,6}\s*)?(?:\d+[.)]\s*)?(?:\*\*|__)?\s*(?P<name>[^:*#_]+?)\s*(?:\*\*|__)?\s*(?::(?P<rest>.*))?$",
    )
    .expect("section header pattern is valid")
});

static LIST_BULLET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:[-*•+]|\d+[.)])\s+").expect("list bullet pattern is valid")
});

fn section_header(line: &str, language: Language) -> Option<(Section, &str)> {
    let captures = SECTION_HEADER.captures(line)?;
    let section = section_named(captures.name("name")?.as_str(), language)?;
    let rest = captures
        .name("rest")
        .map(|m| m.as_str().trim_matches(|c: char| c == '*' || c == '_' || c.is_whitespace()))
        .unwrap_or("");
    Some((section, rest))
}

fn character_name(line: &str) -> Option<String> {
    let line = LIST_BULLET.replace(line, "");
    let line = line.replace("**", "");
    let name = [":", " - ", " – ", " — ", " ("]
        .iter()
        .filter_map(|sep| line.find(sep))
        .min()
        .map(|idx| &line[..idx])
        .unwrap_or(line.as_str())
        .trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// The parts of an outline that every chapter prompt needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutlineSections {
    pub synopsis: String,
    pub characters: Vec<String>,
}

impl OutlineSections {
    /// Missing sections leave the corresponding field empty.
    pub fn parse(outline: &str, language: Language) -> Self {
        let mut current = None;
        let mut synopsis: Vec<&str> = Vec::new();
        let mut characters = Vec::new();

        for line in strip_bom(outline).lines() {
            if let Some((section, rest)) = section_header(line, language) {
                current = Some(section);
                match section {
                    Section::Synopsis if !rest.is_empty() => synopsis.push(rest),
                    Section::Characters if !rest.is_empty() => {
                        characters.extend(rest.split(',').filter_map(character_name));
                    }
                    _ => {}
                }
                continue;
            }

            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match current {
                Some(Section::Synopsis) => synopsis.push(line),
                Some(Section::Characters) => characters.extend(character_name(line)),
                _ => {}
            }
        }

        OutlineSections {
            synopsis: synopsis.join(" "),
            characters,
        }
    }
}
