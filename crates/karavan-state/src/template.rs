//! Companion `application.properties` rendering for new projects.

use std::path::Path;

use crate::error::{StateError, StateResult};
use crate::types::Project;

/// File name of the companion file created alongside a new project.
pub const APPLICATION_PROPERTIES_FILENAME: &str = "application.properties";

const BUILTIN: &str = "\
camel.karavan.project-id={projectId}
camel.karavan.project-name={projectName}
camel.karavan.project-description={projectDescription}
camel.karavan.runtime={runtime}
camel.jbang.gav=org.camel.karavan.demo:{projectId}:1
camel.jbang.dependencies=camel:microprofile-health
camel.health.enabled=true
camel.health.exposure-level=full
";

/// Template with `{projectId}`, `{projectName}`, `{projectDescription}`
/// and `{runtime}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertiesTemplate {
    source: String,
}

impl Default for PropertiesTemplate {
    fn default() -> Self {
        Self::new(BUILTIN)
    }
}

impl PropertiesTemplate {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    pub fn from_file(path: &Path) -> StateResult<Self> {
        std::fs::read_to_string(path)
            .map(Self::new)
            .map_err(|e| StateError::Read(format!("{}: {e}", path.display())))
    }

    /// Substitute placeholders in a single left-to-right pass. Substituted
    /// values are never rescanned, and unknown `{...}` text is kept as is.
    pub fn render(&self, project: &Project) -> String {
        let mut out = String::with_capacity(self.source.len());
        let mut rest = self.source.as_str();
        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let tail = &rest[open..];
            match tail.find('}').and_then(|close| {
                placeholder(project, &tail[1..close]).map(|value| (close, value))
            }) {
                Some((close, value)) => {
                    out.push_str(value);
                    rest = &tail[close + 1..];
                }
                None => {
                    out.push('{');
                    rest = &tail[1..];
                }
            }
        }
        out.push_str(rest);
        out
    }
}

fn placeholder<'a>(project: &'a Project, name: &str) -> Option<&'a str> {
    match name {
        "projectId" => Some(project.project_id.as_str()),
        "projectName" => Some(project.name.as_str()),
        "projectDescription" => Some(project.description.as_str()),
        "runtime" => Some(project.runtime.as_str()),
        _ => None,
    }
}
