//! Docker client serving a fixed container set and a silent event stream.

use futures::StreamExt;

use labelsync_core::types::ContainerSnapshot;
use labelsync_docker::{DockerClient, DockerWatchError, EventStream};

pub struct StaticDocker {
    containers: Vec<ContainerSnapshot>,
}

impl StaticDocker {
    pub fn new(containers: Vec<ContainerSnapshot>) -> Self {
        Self { containers }
    }
}

impl DockerClient for StaticDocker {
    async fn list_running(&self) -> Result<Vec<String>, DockerWatchError> {
        Ok(self.containers.iter().map(|c| c.id.clone()).collect())
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerSnapshot, DockerWatchError> {
        self.containers
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| DockerWatchError::ContainerNotFound(id.to_owned()))
    }

    async fn subscribe(&self) -> Result<EventStream, DockerWatchError> {
        Ok(futures::stream::pending().boxed())
    }

    async fn ping(&self) -> Result<(), DockerWatchError> {
        Ok(())
    }
}
