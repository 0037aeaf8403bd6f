// ABOUTME: Container operations trait for container runtimes.
// ABOUTME: Lists containers belonging to a compose project or one of its services.

use async_trait::async_trait;
use std::collections::HashMap;

/// Label compose puts on every container with the project name.
pub const COMPOSE_PROJECT_LABEL: &str = "com.docker.compose.project";
/// Label compose puts on every container with its service name.
pub const COMPOSE_SERVICE_LABEL: &str = "com.docker.compose.service";

/// Container listing.
#[async_trait]
pub trait ContainerOps: Send + Sync {
    /// List containers matching the given filters.
    async fn list_containers(
        &self,
        filters: &ContainerFilters,
    ) -> Result<Vec<ContainerSummary>, ContainerError>;
}

/// Filters for listing containers.
#[derive(Debug, Clone, Default)]
pub struct ContainerFilters {
    /// Filter by label (key=value).
    pub labels: HashMap<String, String>,
    /// Filter by name (supports partial match).
    pub name: Option<String>,
    /// Include stopped containers.
    pub all: bool,
}

impl ContainerFilters {
    /// All containers of a compose project.
    pub fn for_project(project: &str, all: bool) -> Self {
        let mut labels = HashMap::new();
        labels.insert(COMPOSE_PROJECT_LABEL.to_string(), project.to_string());
        Self {
            labels,
            name: None,
            all,
        }
    }

    /// Containers of one compose service within a project.
    pub fn for_service(project: &str, service: &str, all: bool) -> Self {
        let mut filters = Self::for_project(project, all);
        filters
            .labels
            .insert(COMPOSE_SERVICE_LABEL.to_string(), service.to_string());
        filters
    }

    /// Whether a container carries every label this filter asks for.
    pub fn matches(&self, summary: &ContainerSummary) -> bool {
        let labels_match = self
            .labels
            .iter()
            .all(|(k, v)| summary.labels.get(k) == Some(v));
        let name_match = self
            .name
            .as_ref()
            .is_none_or(|n| summary.name.contains(n.as_str()));
        let state_match = self.all || summary.is_running();
        labels_match && name_match && state_match
    }
}

/// Summary information about a container.
#[derive(Debug, Clone)]
pub struct ContainerSummary {
    /// Container ID.
    pub id: String,
    /// Container name.
    pub name: String,
    /// Image used.
    pub image: String,
    /// Current state.
    pub state: String,
    /// Status message.
    pub status: String,
    /// Labels.
    pub labels: HashMap<String, String>,
}

impl ContainerSummary {
    pub fn is_running(&self) -> bool {
        self.state == "running"
    }

    /// Compose service name, if the container was created by compose.
    pub fn service(&self) -> Option<&str> {
        self.labels.get(COMPOSE_SERVICE_LABEL).map(String::as_str)
    }
}

/// Errors from container operations.
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    #[error("runtime error: {0}")]
    Runtime(String),
}
