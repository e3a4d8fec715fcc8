/*
 * Notebook (`.ipynb`) translation. Only markdown cells are sent to the translator; code
 * cells, outputs and metadata are kept as they are. The notebook is written back with
 * the one-space indentation Jupyter itself uses.
 */
use crate::core::path_utils;
use crate::core::translator::{self, TranslateError, TranslatorOperations};
use serde::Serialize;
use serde_json::Value;

pub const NOTEBOOK_EXTENSION: &str = "ipynb";

pub fn is_notebook(path: &str) -> bool {
    path_utils::extension_of(path).as_deref() == Some(NOTEBOOK_EXTENSION)
}

pub async fn translate_notebook(
    translator: &dyn TranslatorOperations,
    content: &str,
    prompt: Option<&str>,
) -> translator::Result<String> {
    let mut notebook: Value = serde_json::from_str(content)
        .map_err(|e| TranslateError::Format(format!("notebook is not valid JSON: {e}")))?;
    let cells = notebook
        .get_mut("cells")
        .and_then(Value::as_array_mut)
        .ok_or_else(|| TranslateError::Format("notebook has no cells array".to_string()))?;

    let mut translated_cells = 0usize;
    for cell in cells.iter_mut() {
        if cell.get("cell_type").and_then(Value::as_str) != Some("markdown") {
            continue;
        }
        let source = cell_source(cell.get("source"));
        if source.trim().is_empty() {
            continue;
        }
        let translated = translator.translate(&source, prompt).await?;
        cell["source"] = Value::Array(
            split_source_lines(&translated)
                .into_iter()
                .map(Value::String)
                .collect(),
        );
        translated_cells += 1;
    }
    log::debug!("Notebook: Translated {translated_cells} markdown cell(s).");

    serialize_notebook(&notebook)
}

/// Jupyter stores `source` either as one string or as a list of lines.
fn cell_source(source: Option<&Value>) -> String {
    match source {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Array(lines)) => lines.iter().filter_map(Value::as_str).collect(),
        _ => String::new(),
    }
}

fn split_source_lines(text: &str) -> Vec<String> {
    text.split_inclusive('\n').map(str::to_string).collect()
}

fn serialize_notebook(notebook: &Value) -> translator::Result<String> {
    let mut buffer = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b" ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    notebook
        .serialize(&mut serializer)
        .map_err(|e| TranslateError::Format(format!("failed to write notebook: {e}")))?;
    buffer.push(b'\n');
    String::from_utf8(buffer)
        .map_err(|e| TranslateError::Format(format!("notebook output is not UTF-8: {e}")))
}
