//! Reading a problem document from disk.
//!
//! A problem is a markdown file. The description is the document body; an
//! optional YAML frontmatter block may pin a stable `id`. Without one, the id
//! is the file stem.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};

use crate::core::types::ProblemInput;

/// Load a problem from `path`, with an optional code template from `starting_code`.
pub fn load_problem(path: &Path, starting_code: Option<&Path>) -> Result<ProblemInput> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let (frontmatter, body) = split_frontmatter(&contents);
    let id = match frontmatter.and_then(frontmatter_id) {
        Some(id) => id,
        None => path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .map(str::to_string)
            .with_context(|| format!("problem path has no usable file stem {}", path.display()))?,
    };
    validate_id(&id)?;
    let description = body.trim().to_string();
    if description.is_empty() {
        return Err(anyhow!("problem description in {} is empty", path.display()));
    }
    let title = first_heading(&description).unwrap_or_else(|| id.clone());
    let starting_code = starting_code
        .map(|path| fs::read_to_string(path).with_context(|| format!("read {}", path.display())))
        .transpose()?
        .filter(|code| !code.trim().is_empty());
    Ok(ProblemInput {
        id,
        title,
        description,
        starting_code,
    })
}

/// Validate that an id is safe for use in file names and judge commands.
pub fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(anyhow!("id must not be empty"));
    }
    if id
        .chars()
        .any(|c| !(c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-'))
    {
        return Err(anyhow!("id must be [A-Za-z0-9._-] only (got '{id}')"));
    }
    Ok(())
}

fn frontmatter_id(frontmatter: &str) -> Option<String> {
    for line in frontmatter.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let Some((key, value)) = trimmed.split_once(':') else {
            continue;
        };
        if key.trim() != "id" {
            continue;
        }
        let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
        return (!value.is_empty()).then(|| value.to_string());
    }
    None
}

fn first_heading(markdown: &str) -> Option<String> {
    markdown
        .lines()
        .find_map(|line| line.trim().strip_prefix("# "))
        .map(|title| title.trim().to_string())
        .filter(|title| !title.is_empty())
}

/// Split a document into (frontmatter, body). A document without frontmatter is all body.
fn split_frontmatter(contents: &str) -> (Option<&str>, &str) {
    let Some(after) = contents.strip_prefix("---\n") else {
        return (None, contents);
    };
    match after.find("\n---\n") {
        Some(end) => (Some(&after[..end]), &after[end + 5..]),
        None => (None, contents),
    }
}
