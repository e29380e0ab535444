//! Finding and reconstructing handles for already-running managed containers.

use std::{path::PathBuf, time::Duration};

use crate::{
    container::{ContainerFilter, ContainerListOptions},
    errors::Result,
    handle::ContainerHandle,
    Docker,
};

/// One row of `list`: just enough to display or to `resume`.
#[derive(Clone, Debug)]
pub struct ManagedContainer {
    pub id: String,
    pub name: String,
    pub status: String,
    pub image: String,
    pub created_at: String,
    pub persist: bool,
    pub project: Option<String>,
}

fn label(
    labels: &std::collections::HashMap<String, String>,
    key: &str,
) -> Option<String> {
    labels.get(key).cloned()
}

fn to_managed(info: crate::container::ContainerInfo) -> ManagedContainer {
    let persist = label(&info.labels, "pocketdock.persist")
        .map(|v| v == "true")
        .unwrap_or(false);
    let project = label(&info.labels, "pocketdock.project").filter(|p| !p.is_empty());
    let name = label(&info.labels, "pocketdock.instance").unwrap_or_else(|| {
        info.names
            .first()
            .map(|n| n.trim_start_matches('/').to_owned())
            .unwrap_or_else(|| info.id.clone())
    });
    let created_at = label(&info.labels, "pocketdock.created-at").unwrap_or_default();

    ManagedContainer {
        id: info.id,
        name,
        status: info.status,
        image: info.image,
        created_at,
        persist,
        project,
    }
}

/// Lists every container carrying `pocketdock.managed=true`, optionally narrowed to one project.
///
/// The project narrowing happens client-side: the engine's `filters` query ORs multiple values
/// given under the same key, so a single request can't express "managed AND this project" — only
/// "managed" is sent to the engine, and the project label is matched locally.
pub async fn list(
    docker: &Docker,
    project: Option<&str>,
) -> Result<Vec<ManagedContainer>> {
    let mut opts = ContainerListOptions::builder();
    opts.all().filter(vec![ContainerFilter::Label(
        "pocketdock.managed".into(),
        "true".into(),
    )]);

    let infos = docker.containers().list(&opts.build()).await?;
    let managed: Vec<ManagedContainer> = infos.into_iter().map(to_managed).collect();

    Ok(match project {
        Some(project) => managed
            .into_iter()
            .filter(|m| m.project.as_deref() == Some(project))
            .collect(),
        None => managed,
    })
}

/// Finds `name` among managed containers, starting it if stopped, and returns a fresh Handle with
/// an empty active-operations set.
pub async fn resume(
    docker: &Docker,
    name: &str,
) -> Result<ContainerHandle> {
    let matches = list(docker, None).await?;
    let found = matches
        .into_iter()
        .find(|m| m.name == name)
        .ok_or_else(|| crate::errors::Error::ContainerNotFound { id: name.to_owned() })?;

    let container = docker.containers().get(&found.id);
    let details = container.inspect().await?;
    if !details.state.running {
        container.start().await?;
    }

    let data_path = details
        .config
        .labels
        .as_ref()
        .and_then(|labels| labels.get("pocketdock.data-path"))
        .filter(|p| !p.is_empty())
        .map(PathBuf::from);

    Ok(ContainerHandle::new(
        docker.clone(),
        found.id,
        found.name,
        found.persist,
        found.project,
        data_path,
    ))
}

/// Removes a managed container unconditionally, regardless of its persist label.
pub async fn destroy(
    docker: &Docker,
    name: &str,
) -> Result<()> {
    let matches = list(docker, None).await?;
    let found = matches
        .into_iter()
        .find(|m| m.name == name)
        .ok_or_else(|| crate::errors::Error::ContainerNotFound { id: name.to_owned() })?;

    let container = docker.containers().get(&found.id);
    let _ = container.stop(Some(Duration::from_secs(5))).await;
    let opts = crate::container::RmContainerOptions::builder().force(true).build();
    container.remove(opts).await
}

/// Removes every stopped managed container, optionally narrowed to one project. Returns the names
/// removed.
pub async fn prune(
    docker: &Docker,
    project: Option<&str>,
) -> Result<Vec<String>> {
    let matches = list(docker, project).await?;
    let mut removed = Vec::new();

    for managed in matches {
        if managed.status == "running" {
            continue;
        }
        let container = docker.containers().get(&managed.id);
        let opts = crate::container::RmContainerOptions::builder().force(true).build();
        container.remove(opts).await?;
        removed.push(managed.name);
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn info_with_labels(labels: HashMap<String, String>) -> crate::container::ContainerInfo {
        crate::container::ContainerInfo {
            #[cfg(feature = "chrono")]
            created: chrono::Utc::now(),
            #[cfg(not(feature = "chrono"))]
            created: 0,
            command: "sleep infinity".into(),
            id: "abc123".into(),
            image: "alpine".into(),
            image_id: "sha256:deadbeef".into(),
            labels,
            names: vec!["/pd-deadbeef".into()],
            ports: Vec::new(),
            state: "running".into(),
            status: "Up 2 minutes".into(),
            size_rw: None,
            size_root_fs: None,
        }
    }

    #[test]
    fn to_managed_prefers_instance_label_over_engine_name() {
        let mut labels = HashMap::new();
        labels.insert("pocketdock.instance".to_owned(), "my-sandbox".to_owned());
        labels.insert("pocketdock.persist".to_owned(), "true".to_owned());
        labels.insert("pocketdock.project".to_owned(), "demo".to_owned());

        let managed = to_managed(info_with_labels(labels));
        assert_eq!(managed.name, "my-sandbox");
        assert!(managed.persist);
        assert_eq!(managed.project.as_deref(), Some("demo"));
    }

    #[test]
    fn to_managed_falls_back_to_engine_name_without_instance_label() {
        let managed = to_managed(info_with_labels(HashMap::new()));
        assert_eq!(managed.name, "pd-deadbeef");
        assert!(!managed.persist);
        assert_eq!(managed.project, None);
    }
}
