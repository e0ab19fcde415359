//! Polls `GET /containers/json` on an interval and hands newly-seen
//! containers to the caller (spec.md §4.6). Uses the `created`
//! timestamp of the most recent container observed so far as a
//! `since`-style floor, so a steady-state poll only has to look at
//! containers created after the last cycle.

use bollard::container::ListContainersOptions;
use bollard::Docker;
use logforge_ids::ContainerId;
use logforge_protocol::error::{ErrorKind, LogforgeError, Result};
use std::collections::HashMap;

pub struct DiscoveredContainer {
    pub id: ContainerId,
    pub name: String,
    pub image: String,
    pub labels: serde_json::Value,
    pub created: i64,
}

pub struct Poller {
    docker: Docker,
    list_options: String,
    since: i64,
}

impl Poller {
    pub fn new(docker: Docker, list_options: String) -> Self {
        Self {
            docker,
            list_options,
            since: 0,
        }
    }

    /// One polling cycle: list all running containers, filter to those
    /// created at or after the last cycle's high-water mark, and advance
    /// that mark.
    pub async fn poll(&mut self) -> Result<Vec<DiscoveredContainer>> {
        let mut filters: HashMap<String, Vec<String>> = HashMap::new();
        filters.insert("status".to_string(), vec!["running".to_string()]);
        if !self.list_options.is_empty() {
            filters.insert("label".to_string(), vec![self.list_options.clone()]);
        }

        let summaries = self
            .docker
            .list_containers(Some(ListContainersOptions {
                all: false,
                filters,
                ..Default::default()
            }))
            .await
            .map_err(|e| LogforgeError::with_source(ErrorKind::DockerApi, "listing containers", e))?;

        let mut discovered = Vec::new();
        let mut new_high_water = self.since;

        for summary in summaries {
            let created = summary.created.unwrap_or(0);
            if created < self.since {
                continue;
            }
            new_high_water = new_high_water.max(created);

            let Some(raw_id) = summary.id else { continue };
            let id = match ContainerId::parse(raw_id.clone()) {
                Ok(id) => id,
                Err(e) => {
                    tracing::warn!(id = raw_id, error = %e, "skipping container with unparseable id");
                    continue;
                }
            };
            let name = summary
                .names
                .and_then(|names| names.into_iter().next())
                .unwrap_or_else(|| id.short().to_string())
                .trim_start_matches('/')
                .to_string();
            let labels = summary
                .labels
                .map(|l| serde_json::to_value(l).unwrap_or(serde_json::json!({})))
                .unwrap_or(serde_json::json!({}));

            discovered.push(DiscoveredContainer {
                id,
                name,
                image: summary.image.unwrap_or_default(),
                labels,
                created,
            });
        }

        self.since = new_high_water;
        Ok(discovered)
    }
}
