//! Owns the single multi-stream HTTP client and its event loop (spec.md
//! §4.6/§9: imdocker runs its own tokio runtime internally and bridges
//! into the synchronous core over a channel, rather than the whole
//! daemon being async).

use crate::poller::Poller;
use crate::stream::stream_container;
use crate::table::{ContainerInfo, ContainerTable};
use bollard::Docker;
use logforge_protocol::config::DockerInputConfig;
use logforge_protocol::error::{ErrorKind, LogforgeError, Result};
use logforge_protocol::types::Message;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub struct DockerInput {
    runtime: tokio::runtime::Runtime,
    shutdown: Arc<std::sync::atomic::AtomicBool>,
}

impl DockerInput {
    /// Connect and start polling/streaming in a background runtime,
    /// pushing `Message`s onto `sink` as they arrive. Returns once the
    /// initial connection succeeds; ongoing work continues on the
    /// runtime's own threads until `shutdown` is called.
    pub fn start(config: DockerInputConfig, sink: crossbeam_channel::Sender<Message>) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("logforge-imdocker")
            .enable_all()
            .build()
            .map_err(|e| LogforgeError::with_source(ErrorKind::Io, "building imdocker tokio runtime", e))?;

        let docker = runtime.block_on(connect(&config))?;
        let shutdown = Arc::new(std::sync::atomic::AtomicBool::new(false));

        let table = Arc::new(ContainerTable::new());
        let poll_interval = Duration::from_secs(config.polling_interval_secs.max(1));
        let default_facility = config.default_facility;
        let default_severity = config.default_severity;
        let list_options = config.list_options.clone();

        let loop_shutdown = Arc::clone(&shutdown);
        let loop_docker = docker.clone();
        runtime.spawn(async move {
            let mut poller = Poller::new(loop_docker.clone(), list_options);
            loop {
                if loop_shutdown.load(std::sync::atomic::Ordering::Relaxed) {
                    break;
                }
                match poller.poll().await {
                    Ok(discovered) => {
                        for container in discovered {
                            let start_regex = start_regex_label(&container.labels);
                            let info = ContainerInfo {
                                id: container.id.clone(),
                                name: container.name,
                                image: container.image,
                                labels: container.labels,
                                start_regex,
                                tail_applied: false,
                            };
                            if table.insert_if_absent(info.clone()) {
                                info!(container = %info.id, name = %info.name, "attaching to container log stream");
                                let docker = loop_docker.clone();
                                let sink = sink.clone();
                                let table = Arc::clone(&table);
                                let id = info.id.clone();
                                tokio::spawn(async move {
                                    stream_container(docker, info, default_facility, default_severity, sink).await;
                                    table.remove(&id);
                                });
                            }
                        }
                    }
                    Err(e) => warn!(error = %e, "docker container listing failed"),
                }
                tokio::time::sleep(poll_interval).await;
            }
        });

        Ok(Self { runtime, shutdown })
    }

    pub fn shutdown(self) {
        self.shutdown.store(true, std::sync::atomic::Ordering::Relaxed);
        self.runtime.shutdown_timeout(Duration::from_secs(5));
    }
}

/// Pull the multi-line start-of-record pattern from a container's
/// `imdocker.startregex` label (spec.md §4.6), if present. The list
/// endpoint already returns labels per-container, so no extra inspect
/// call is needed.
fn start_regex_label(labels: &serde_json::Value) -> Option<String> {
    labels.get("imdocker.startregex")?.as_str().map(str::to_string)
}

async fn connect(config: &DockerInputConfig) -> Result<Docker> {
    let docker = if let Some(path) = config.endpoint.strip_prefix("unix://") {
        Docker::connect_with_unix(path, 120, bollard::API_DEFAULT_VERSION)
    } else if let Some(addr) = config.endpoint.strip_prefix("tcp://") {
        Docker::connect_with_http(addr, 120, bollard::API_DEFAULT_VERSION)
    } else {
        Docker::connect_with_local_defaults()
    }
    .map_err(|e| LogforgeError::with_source(ErrorKind::DockerApi, format!("connecting to {}", config.endpoint), e))?;

    docker
        .ping()
        .await
        .map_err(|e| LogforgeError::with_source(ErrorKind::DockerApi, "pinging docker daemon", e))?;

    Ok(docker)
}
