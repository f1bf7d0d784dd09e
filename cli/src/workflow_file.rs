//! Reading workflow markdown files: YAML frontmatter followed by the prompt body.

use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;

use aw_engine::WorkflowSpec;
use thiserror::Error;

const FRONTMATTER_DELIM: &str = "---";

#[derive(Debug, Error)]
pub enum WorkflowFileError {
    #[error("failed to read `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("workflow is missing a `---` delimited frontmatter block")]
    MissingFrontmatter,

    #[error("invalid frontmatter: {0}")]
    InvalidFrontmatter(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone)]
pub struct WorkflowDocument {
    pub spec: WorkflowSpec,
    /// Markdown after the frontmatter; becomes the agent prompt.
    pub body: String,
}

pub fn load_workflow(path: &Path) -> Result<WorkflowDocument, WorkflowFileError> {
    let contents = fs::read_to_string(path).map_err(|source| WorkflowFileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_workflow_str(&contents)
}

pub fn parse_workflow_str(contents: &str) -> Result<WorkflowDocument, WorkflowFileError> {
    let (frontmatter, body) = split_frontmatter(contents)?;
    let spec = if frontmatter.is_empty() {
        WorkflowSpec::default()
    } else {
        serde_yaml::from_str(frontmatter)?
    };
    Ok(WorkflowDocument {
        spec,
        body: body.to_string(),
    })
}

fn split_frontmatter(contents: &str) -> Result<(&str, &str), WorkflowFileError> {
    let trimmed = contents.trim_start_matches('\u{feff}');
    let rest = trimmed
        .strip_prefix(FRONTMATTER_DELIM)
        .ok_or(WorkflowFileError::MissingFrontmatter)?;
    let rest = rest.strip_prefix('\r').unwrap_or(rest);
    let rest = rest
        .strip_prefix('\n')
        .ok_or(WorkflowFileError::MissingFrontmatter)?;

    // An empty block closes on the very next line.
    let (frontmatter, after) = if let Some(after) = rest.strip_prefix(FRONTMATTER_DELIM) {
        ("", after)
    } else if let Some(idx) = rest.find("\n---") {
        (&rest[..idx], &rest[idx + 4..])
    } else {
        return Err(WorkflowFileError::MissingFrontmatter);
    };

    let body = after.strip_prefix('\r').unwrap_or(after);
    let body = body.strip_prefix('\n').unwrap_or(body);
    Ok((frontmatter.trim(), body))
}
