//! Document export: the three answers under their UCAS question headings,
//! as a Word document (default) or Markdown.

use std::io::Cursor;

use bytes::Bytes;
use docx_rs::{Docx, Paragraph, Run};
use serde::Deserialize;

use crate::generation::generator::GeneratedEssay;

const QUESTIONS: [&str; 3] = [
    "Why do you want to study this course or subject?",
    "How have your qualifications and studies helped you to prepare for this course or subject?",
    "What else have you done to prepare outside of education, and why are these experiences useful?",
];

const DEFAULT_TITLE: &str = "Personal Statement";

// docx-rs sizes are half-points.
const TITLE_SIZE: usize = 32;
const HEADING_SIZE: usize = 24;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Docx,
    Markdown,
}

impl ExportFormat {
    pub fn content_type(self) -> &'static str {
        match self {
            ExportFormat::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            ExportFormat::Markdown => "text/markdown; charset=utf-8",
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            ExportFormat::Docx => "personal_statement.docx",
            ExportFormat::Markdown => "personal_statement.md",
        }
    }
}

pub fn render(
    essay: &GeneratedEssay,
    title: Option<&str>,
    format: ExportFormat,
) -> anyhow::Result<Bytes> {
    match format {
        ExportFormat::Docx => render_docx(essay, title),
        ExportFormat::Markdown => Ok(render_markdown(essay, title)),
    }
}

fn answers(essay: &GeneratedEssay) -> [&str; 3] {
    [
        essay.q1_answer.trim(),
        essay.q2_answer.trim(),
        essay.q3_answer.trim(),
    ]
}

fn render_markdown(essay: &GeneratedEssay, title: Option<&str>) -> Bytes {
    let counts = essay.char_counts();
    let mut out = String::new();
    out.push_str(&format!("# {}\n\n", title.unwrap_or(DEFAULT_TITLE)));

    for (i, (question, answer)) in QUESTIONS.iter().zip(answers(essay)).enumerate() {
        out.push_str(&format!("## {}. {question}\n\n{answer}\n\n", i + 1));
    }
    out.push_str(&format!("_Total: {} characters_\n", counts.total));
    Bytes::from(out)
}

fn render_docx(essay: &GeneratedEssay, title: Option<&str>) -> anyhow::Result<Bytes> {
    let mut doc = Docx::new().add_paragraph(
        Paragraph::new().add_run(
            Run::new()
                .add_text(title.unwrap_or(DEFAULT_TITLE))
                .bold()
                .size(TITLE_SIZE),
        ),
    );

    for (i, (question, answer)) in QUESTIONS.iter().zip(answers(essay)).enumerate() {
        doc = doc.add_paragraph(
            Paragraph::new().add_run(
                Run::new()
                    .add_text(format!("{}. {question}", i + 1))
                    .bold()
                    .size(HEADING_SIZE),
            ),
        );
        // One Word paragraph per blank-line separated paragraph of the answer.
        for paragraph in answer.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
            doc = doc.add_paragraph(Paragraph::new().add_run(Run::new().add_text(paragraph)));
        }
    }

    let total = essay.char_counts().total;
    doc = doc.add_paragraph(
        Paragraph::new()
            .add_run(Run::new().add_text(format!("Total: {total} characters")).italic()),
    );

    let mut buf = Cursor::new(Vec::new());
    doc.build()
        .pack(&mut buf)
        .map_err(|e| anyhow::anyhow!("could not write DOCX: {e}"))?;
    Ok(Bytes::from(buf.into_inner()))
}
