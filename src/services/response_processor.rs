use uuid::Uuid;

use crate::models::requirement::Diagram;
use crate::services::diagram_files::DiagramFiles;
use crate::services::prompt_builder::SECTION_DELIMITER;

pub const DEFAULT_TITLE: &str = "Diagrama sin título";
pub const DEFAULT_DESCRIPTION: &str = "Sin descripción";
pub const DEFAULT_EXPLANATION: &str = "Sin explicación detallada";

const FENCE: &str = "```";
const EXPLANATION_HEADINGS: [&str; 3] = ["explicación", "explicacion", "explanation"];

/// Fields pulled out of one response section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedContent {
    pub title: String,
    pub description: String,
    pub diagram_text: String,
    pub explanation: String,
}

#[derive(Debug, Clone, Default)]
pub struct ProcessedResponse {
    pub diagrams: Vec<Diagram>,
    pub diagram_urls: Vec<String>,
}

/// Where the extractor currently attributes lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Title,
    Body,
    Diagram,
    Explanation,
}

/// Split a response into its non-blank sections, in order.
///
/// A section boundary is a line holding only the delimiter. Unlike a plain
/// substring split, a `---` inside a line (Mermaid edges such as `a---b`) is
/// not a boundary.
pub fn split_sections(text: &str) -> Vec<&str> {
    let mut sections = Vec::new();
    let mut start = 0;
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        if line.trim() == SECTION_DELIMITER {
            sections.push(&text[start..offset]);
            start = offset + line.len();
        }
        offset += line.len();
    }
    sections.push(&text[start..]);

    sections
        .into_iter()
        .filter(|section| !section.trim().is_empty())
        .collect()
}

fn is_fence(line: &str) -> bool {
    line.trim_start().starts_with(FENCE)
}

fn is_explanation_heading(line: &str) -> bool {
    let trimmed = line.trim();
    let heading = match trimmed.strip_prefix("###").or_else(|| trimmed.strip_prefix("##")) {
        Some(rest) => rest.trim().to_lowercase(),
        None => return false,
    };

    EXPLANATION_HEADINGS
        .iter()
        .any(|candidate| heading.starts_with(candidate))
}

fn or_default(value: String, default: &str) -> String {
    if value.trim().is_empty() {
        default.to_string()
    } else {
        value
    }
}

/// Attribute the lines of one section to title, description, diagram and
/// explanation. Never fails; missing parts fall back to placeholder text.
pub fn extract_content(section: &str) -> ExtractedContent {
    let mut state = Section::Title;
    let mut title = String::new();
    let mut description: Vec<&str> = Vec::new();
    let mut diagram: Vec<&str> = Vec::new();
    let mut explanation: Vec<&str> = Vec::new();
    let mut explicit_explanation = false;

    for line in section.lines() {
        let blank = line.trim().is_empty();

        if state == Section::Title {
            if blank {
                continue;
            }
            state = Section::Body;
            if !is_fence(line) {
                title = line.trim().to_string();
                continue;
            }
        }

        if is_fence(line) {
            diagram.push(line.trim_end());
            state = match state {
                Section::Diagram => Section::Explanation,
                _ => Section::Diagram,
            };
            continue;
        }

        if blank {
            // Keep paragraph breaks so the description can be split later
            if state == Section::Body && description.last().is_some_and(|l| !l.is_empty()) {
                description.push("");
            }
            continue;
        }

        match state {
            Section::Diagram => diagram.push(line.trim_end()),
            _ if is_explanation_heading(line) => {
                explicit_explanation = true;
                state = Section::Explanation;
            }
            Section::Body => description.push(line.trim()),
            Section::Explanation => explanation.push(line.trim()),
            Section::Title => {}
        }
    }

    while description.last() == Some(&"") {
        description.pop();
    }

    let mut description = description.join("\n");
    let mut explanation = explanation.join("\n");

    if !explicit_explanation {
        if let Some((first, rest)) = description.split_once("\n\n") {
            let rest = rest.trim().to_string();
            explanation = if explanation.is_empty() {
                rest
            } else {
                format!("{}\n\n{}", rest, explanation)
            };
            description = first.to_string();
        }
    }

    ExtractedContent {
        title: or_default(title, DEFAULT_TITLE),
        description: or_default(description, DEFAULT_DESCRIPTION),
        diagram_text: diagram.join("\n"),
        explanation: or_default(explanation, DEFAULT_EXPLANATION),
    }
}

/// Turn a raw completion into ordered diagram records, caching each raw
/// section as a Markdown file.
pub async fn process_response(
    text: &str,
    requirement_id: Uuid,
    files: &DiagramFiles,
) -> ProcessedResponse {
    let sections = split_sections(text);

    // Each batch replaces the previous attempt's files
    files.remove_requirement(requirement_id).await;

    let mut processed = ProcessedResponse {
        diagrams: Vec::with_capacity(sections.len()),
        diagram_urls: Vec::with_capacity(sections.len()),
    };

    for (index, section) in sections.into_iter().enumerate() {
        let content = extract_content(section);
        if content.diagram_text.is_empty() {
            log::warn!(
                "Section {} of requirement {} has no diagram block",
                index + 1,
                requirement_id
            );
        }

        let url = DiagramFiles::url_for(requirement_id, index);
        files.write(&url, section.trim()).await;

        processed.diagram_urls.push(url.clone());
        processed.diagrams.push(Diagram {
            title: content.title,
            description: content.description,
            diagram_text: content.diagram_text,
            explanation: content.explanation,
            url,
        });
    }

    log::info!(
        "Extracted {} diagrams for requirement {}",
        processed.diagrams.len(),
        requirement_id
    );

    processed
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &str =
        "# Diagram A\n```\ngraph A\n```\n## Explicación\nFoo\n---\n# Diagram B\nBar";

    #[test]
    fn test_split_preserves_order_and_count() {
        let parts = ["# One\nalpha", "# Two\nbeta", "# Three\ngamma"];
        let text = parts.join("\n---\n");

        let sections = split_sections(&text);
        assert_eq!(sections.len(), 3);
        for (section, part) in sections.iter().zip(parts) {
            assert_eq!(section.trim(), part);
        }
    }

    #[test]
    fn test_split_drops_blank_sections() {
        let text = "---\n\n---\n# Only\nbody\n---\n   \n";
        let sections = split_sections(text);
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].trim(), "# Only\nbody");
    }

    #[test]
    fn test_split_ignores_inline_hyphens() {
        let text = "# Table\n| a | b |\n|---|---|\n| 1 | 2 |\nA --> B";
        assert_eq!(split_sections(text).len(), 1);
        assert!(split_sections("").is_empty());
    }

    #[test]
    fn test_extract_full_section() {
        let content = extract_content(
            "## Arquitectura\nVista general del sistema.\n\n```mermaid\ngraph TD\n  A --> B\n```\n### Explicación\nEl cliente llama al API.\nLuego persiste.",
        );

        assert_eq!(content.title, "## Arquitectura");
        assert_eq!(content.description, "Vista general del sistema.");
        assert_eq!(content.diagram_text, "```mermaid\ngraph TD\n  A --> B\n```");
        assert_eq!(content.explanation, "El cliente llama al API.\nLuego persiste.");
    }

    #[test]
    fn test_extract_defaults_for_empty_section() {
        let content = extract_content("   \n\n");
        assert_eq!(content.title, DEFAULT_TITLE);
        assert_eq!(content.description, DEFAULT_DESCRIPTION);
        assert_eq!(content.diagram_text, "");
        assert_eq!(content.explanation, DEFAULT_EXPLANATION);
    }

    #[test]
    fn test_extract_section_starting_with_fence_has_no_title() {
        let content = extract_content("```mermaid\nerDiagram\n```\nTablas principales");
        assert_eq!(content.title, DEFAULT_TITLE);
        assert_eq!(content.diagram_text, "```mermaid\nerDiagram\n```");
        assert_eq!(content.explanation, "Tablas principales");
    }

    #[test]
    fn test_text_after_diagram_is_explanation() {
        let content = extract_content("Secuencia\nFlujo de login\n```\nsequenceDiagram\n```\nEl usuario envía credenciales");
        assert_eq!(content.description, "Flujo de login");
        assert_eq!(content.explanation, "El usuario envía credenciales");
    }

    #[test]
    fn test_second_paragraph_becomes_explanation() {
        let content = extract_content("Título\nPrimer párrafo.\n\nSegundo párrafo.\nMás detalle.");
        assert_eq!(content.description, "Primer párrafo.");
        assert_eq!(content.explanation, "Segundo párrafo.\nMás detalle.");
        assert_eq!(content.diagram_text, "");
    }

    #[test]
    fn test_explicit_heading_keeps_paragraphs_in_description() {
        let content = extract_content("Título\nUno.\n\nDos.\n## Explanation\nTres.");
        assert_eq!(content.description, "Uno.\n\nDos.");
        assert_eq!(content.explanation, "Tres.");
    }

    #[test]
    fn test_unclosed_fence_consumes_rest() {
        let content = extract_content("T\n```mermaid\ngraph LR\n## Explicación\nX");
        assert_eq!(content.diagram_text, "```mermaid\ngraph LR\n## Explicación\nX");
        assert_eq!(content.explanation, DEFAULT_EXPLANATION);
    }

    #[tokio::test]
    async fn test_process_response_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let files = DiagramFiles::new(dir.path());
        let requirement_id = Uuid::new_v4();

        let processed = process_response(SCENARIO, requirement_id, &files).await;

        assert_eq!(processed.diagrams.len(), 2);
        assert_eq!(processed.diagram_urls.len(), 2);

        let first = &processed.diagrams[0];
        assert_eq!(first.title, "# Diagram A");
        assert_eq!(first.diagram_text, "```\ngraph A\n```");
        assert_eq!(first.explanation, "Foo");
        assert_eq!(first.description, DEFAULT_DESCRIPTION);

        let second = &processed.diagrams[1];
        assert_eq!(second.title, "# Diagram B");
        assert_eq!(second.diagram_text, "");
        assert_eq!(second.description, "Bar");
        assert_eq!(second.explanation, DEFAULT_EXPLANATION);

        for (diagram, url) in processed.diagrams.iter().zip(&processed.diagram_urls) {
            assert_eq!(&diagram.url, url);
            let path = files.resolve(url).unwrap();
            assert!(path.exists());
        }
        let cached = std::fs::read_to_string(files.resolve(&second.url).unwrap()).unwrap();
        assert_eq!(cached, "# Diagram B\nBar");
    }

    #[tokio::test]
    async fn test_new_batch_replaces_previous_files() {
        let dir = tempfile::tempdir().unwrap();
        let files = DiagramFiles::new(dir.path());
        let requirement_id = Uuid::new_v4();

        let first = process_response(SCENARIO, requirement_id, &files).await;
        let second = process_response("# Only\nbody", requirement_id, &files).await;

        for url in &first.diagram_urls {
            assert!(!files.resolve(url).unwrap().exists());
        }
        assert!(files.resolve(&second.diagram_urls[0]).unwrap().exists());
        let remaining = std::fs::read_dir(dir.path().join(requirement_id.to_string()))
            .unwrap()
            .count();
        assert_eq!(remaining, 1);
    }

    #[tokio::test]
    async fn test_process_response_without_sections() {
        let dir = tempfile::tempdir().unwrap();
        let files = DiagramFiles::new(dir.path());

        let processed = process_response("\n---\n  ", Uuid::new_v4(), &files).await;
        assert!(processed.diagrams.is_empty());
        assert!(processed.diagram_urls.is_empty());
    }

    #[tokio::test]
    async fn test_unwritable_storage_does_not_fail_batch() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocked");
        std::fs::write(&blocker, "not a directory").unwrap();
        let files = DiagramFiles::new(&blocker);

        let processed = process_response("# A\nbody", Uuid::new_v4(), &files).await;
        assert_eq!(processed.diagrams.len(), 1);
        assert_eq!(processed.diagrams[0].title, "# A");
    }
}
