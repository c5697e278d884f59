use super::{ContainerLevel, ContainerRef, RemoteStore};
use crate::config::AppConfig;
use crate::error::Error;
use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::StatusCode;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Flywheel REST client. All calls are blocking with connect and request
/// timeouts from the configuration.
pub struct FlywheelClient {
    http: Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct ContainerDoc {
    #[serde(rename = "_id")]
    id: String,
    label: String,
}

#[derive(Debug, Deserialize)]
struct CreatedDoc {
    #[serde(rename = "_id")]
    id: String,
}

impl FlywheelClient {
    pub fn new(config: &AppConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.header("Authorization", format!("scitran-user {}", self.api_key))
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path)
    }

    fn list_containers(&self, path: &str) -> Result<Vec<ContainerDoc>, Error> {
        let response = self
            .authorized(self.http.get(self.api_url(path)))
            .send()?
            .error_for_status()?;
        Ok(response.json()?)
    }

    fn child_level(parent: &ContainerRef) -> Result<ContainerLevel, Error> {
        parent.level.child().ok_or_else(|| {
            Error::Remote(format!(
                "Container level {:?} has no children",
                parent.level
            ))
        })
    }
}

impl RemoteStore for FlywheelClient {
    fn find_project(&self, label_prefix: &str) -> Result<Option<ContainerRef>, Error> {
        let projects = self.list_containers("projects")?;
        Ok(projects
            .into_iter()
            .find(|p| p.label.starts_with(label_prefix))
            .map(|p| ContainerRef {
                id: p.id,
                label: p.label,
                level: ContainerLevel::Project,
            }))
    }

    fn find_child(
        &self,
        parent: &ContainerRef,
        label: &str,
    ) -> Result<Option<ContainerRef>, Error> {
        let level = Self::child_level(parent)?;
        let path = format!("{}/{}/{}", parent.level.plural(), parent.id, level.plural());
        let children = self.list_containers(&path)?;
        Ok(children
            .into_iter()
            .find(|c| c.label == label)
            .map(|c| ContainerRef {
                id: c.id,
                label: c.label,
                level,
            }))
    }

    fn create_child(&self, parent: &ContainerRef, label: &str) -> Result<ContainerRef, Error> {
        let level = Self::child_level(parent)?;
        let body = serde_json::json!({
            level.parent_key(): parent.id,
            "label": label,
        });

        let response = self
            .authorized(self.http.post(self.api_url(level.plural())))
            .json(&body)
            .send()?;

        if response.status() == StatusCode::CONFLICT {
            return Err(Error::CreateConflict(label.to_string()));
        }

        let created: CreatedDoc = response.error_for_status()?.json()?;
        debug!(label, level = level.plural(), id = %created.id, "Created container");

        Ok(ContainerRef {
            id: created.id,
            label: label.to_string(),
            level,
        })
    }

    fn deposit_file(
        &self,
        container: &ContainerRef,
        local_path: &Path,
        file_name: &str,
        metadata: &serde_json::Value,
    ) -> Result<(), Error> {
        let part = Part::file(local_path)?.file_name(file_name.to_string());
        let form = Form::new()
            .part("file", part)
            .text("metadata", metadata.to_string());

        let path = format!("{}/{}/files", container.level.plural(), container.id);
        self.authorized(self.http.post(self.api_url(&path)))
            .multipart(form)
            .send()?
            .error_for_status()?;

        Ok(())
    }
}
