//! Fence-delimited file extraction from a model response.

use crate::generator::GeneratedFile;

/// File name used when a fence has no label or the response has no fences.
pub const DEFAULT_FILE_NAME: &str = "main.tf";

const FENCE: &str = "```";

/// Split a response into files, one per fenced block.
///
/// The text after an opening fence names the file. A block left open at
/// the end of the response is still emitted. A response without any fence
/// becomes a single [`DEFAULT_FILE_NAME`] file.
pub fn extract_files(response: &str) -> Vec<GeneratedFile> {
    let mut files = Vec::new();
    let mut current: Option<(String, Vec<&str>)> = None;

    for line in response.lines() {
        let trimmed = line.trim();
        if let Some(label) = trimmed.strip_prefix(FENCE) {
            match current.take() {
                Some((name, lines)) => files.push(GeneratedFile::new(name, lines.join("\n"))),
                None => {
                    let label = label.trim();
                    let name = if label.is_empty() { DEFAULT_FILE_NAME } else { label };
                    current = Some((name.to_string(), Vec::new()));
                }
            }
            continue;
        }

        if let Some((_, lines)) = current.as_mut() {
            lines.push(line.trim_end());
        }
    }

    if let Some((name, lines)) = current {
        files.push(GeneratedFile::new(name, lines.join("\n")));
    }

    if files.is_empty() {
        files.push(GeneratedFile::new(DEFAULT_FILE_NAME, response));
    }
    files
}
