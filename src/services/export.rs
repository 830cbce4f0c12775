//! Assembly of the generated novel and its serialization to DOCX and EPUB.

use crate::models::{Chapter, GenerationSession};
use crate::services::outline::{LineKind, MarkerRule, classify};
use crate::services::prompts::Language;
use anyhow::{Result, anyhow};
use docx_rs::{Docx, Paragraph, Run, Style, StyleType};
use epub_builder::{EpubBuilder, EpubContent, ReferenceType, ZipLibrary};
use html_escape::encode_text;
use serde::Deserialize;
use std::io::Cursor;

/// How chapters whose request failed appear in the exported document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailedChapters {
    Skip,
    /// Keep the heading and write an error note as its body.
    #[default]
    Marker,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Docx,
    Epub,
}

impl ExportFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            ExportFormat::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            ExportFormat::Epub => "application/epub+zip",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Docx => "docx",
            ExportFormat::Epub => "epub",
        }
    }
}

/// A stretch of text, optionally introduced by a chapter heading line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    pub heading: Option<String>,
    pub body: String,
}

impl Part {
    pub fn text(&self) -> String {
        match &self.heading {
            Some(heading) => format!("{heading}\n\n{}", self.body),
            None => self.body.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Heading(String),
    Paragraph(String),
}

/// Outline plus chapters, built fresh for every export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NovelDocument {
    pub title: String,
    pub author: Option<String>,
    pub parts: Vec<Part>,
    rule: MarkerRule,
}

impl NovelDocument {
    pub fn assemble(
        session: &GenerationSession,
        rule: &MarkerRule,
        language: Language,
        failed: FailedChapters,
    ) -> Self {
        let mut parts = Vec::with_capacity(session.chapters.len() + 1);
        if let Some(outline) = session.outline.as_deref() {
            parts.push(Part {
                heading: None,
                body: outline.trim().to_string(),
            });
        }

        for Chapter {
            index,
            title,
            content,
        } in &session.chapters
        {
            let body = match (content, failed) {
                (Some(text), _) => text.trim().to_string(),
                (None, FailedChapters::Skip) => continue,
                (None, FailedChapters::Marker) => language.failed_chapter_note(*index),
            };
            parts.push(Part {
                heading: Some(rule.heading(*index, title)),
                body,
            });
        }

        NovelDocument {
            title: session.request.title.clone(),
            author: session.request.author.clone(),
            parts,
            rule: rule.clone(),
        }
    }

    /// The document as plain text, the same text shown on screen.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .map(Part::text)
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Marker lines become headings, every other non-blank line a paragraph.
    pub fn blocks(&self) -> Vec<Block> {
        blocks_of(&self.text(), &self.rule)
    }

    pub fn render(&self, format: ExportFormat) -> Result<Vec<u8>> {
        match format {
            ExportFormat::Docx => self.to_docx(),
            ExportFormat::Epub => self.to_epub(),
        }
    }

    pub fn to_docx(&self) -> Result<Vec<u8>> {
        let mut docx = Docx::new()
            .add_style(
                Style::new("Title", StyleType::Paragraph)
                    .name("Title")
                    .size(52)
                    .bold(),
            )
            .add_style(
                Style::new("Heading1", StyleType::Paragraph)
                    .name("Heading 1")
                    .size(32)
                    .bold(),
            )
            .add_paragraph(docx_paragraph(&self.title).style("Title"));

        for block in self.blocks() {
            docx = match block {
                Block::Heading(text) => {
                    docx.add_paragraph(docx_paragraph(&text).style("Heading1"))
                }
                Block::Paragraph(text) => docx.add_paragraph(docx_paragraph(&text)),
            };
        }

        let mut out = Cursor::new(Vec::new());
        docx.build().pack(&mut out)?;
        Ok(out.into_inner())
    }

    pub fn to_epub(&self) -> Result<Vec<u8>> {
        let zip = ZipLibrary::new().map_err(|e| anyhow!("epub archive: {e}"))?;
        let mut builder = EpubBuilder::new(zip).map_err(|e| anyhow!("epub builder: {e}"))?;
        builder
            .metadata("title", self.title.as_str())
            .map_err(|e| anyhow!("epub metadata: {e}"))?;
        if let Some(author) = &self.author {
            builder
                .metadata("author", author.as_str())
                .map_err(|e| anyhow!("epub metadata: {e}"))?;
        }
        builder.inline_toc();

        for (i, part) in self.parts.iter().enumerate() {
            let heading = part.heading.as_deref().unwrap_or(&self.title);
            let mut html = format!("<h1>{}</h1>\n", encode_text(heading));
            for block in blocks_of(&part.body, &self.rule) {
                match block {
                    Block::Heading(text) => {
                        html.push_str(&format!("<h2>{}</h2>\n", encode_text(&text)))
                    }
                    Block::Paragraph(text) => {
                        html.push_str(&format!("<p>{}</p>\n", encode_text(&text)))
                    }
                }
            }
            let xhtml = xhtml_page(heading, &html);
            builder
                .add_content(
                    EpubContent::new(format!("part_{i}.xhtml"), xhtml.as_bytes())
                        .title(heading)
                        .reftype(ReferenceType::Text),
                )
                .map_err(|e| anyhow!("epub section {i}: {e}"))?;
        }

        let mut out = Vec::new();
        builder
            .generate(&mut out)
            .map_err(|e| anyhow!("epub generation: {e}"))?;
        Ok(out)
    }
}

fn blocks_of(text: &str, rule: &MarkerRule) -> Vec<Block> {
    classify(text, rule)
        .map(|line| match line.kind {
            LineKind::Heading => Block::Heading(line.text.to_string()),
            LineKind::Body => Block::Paragraph(line.text.to_string()),
        })
        .collect()
}

fn docx_paragraph(text: &str) -> Paragraph {
    Paragraph::new().add_run(Run::new().add_text(text))
}

fn xhtml_page(title: &str, body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml">
<head><title>{}</title></head>
<body>
{body}</body>
</html>
"#,
        encode_text(title)
    )
}
