//! Per-container log streaming (spec.md §4.6). Bollard's `logs` stream
//! already demultiplexes the Docker API's 8-byte stream-type/length
//! frame header for us; this module turns the resulting byte chunks
//! into newline-delimited lines, reassembles multi-line records, and
//! emits `Message`s.

use crate::reassembly::Reassembler;
use crate::table::ContainerInfo;
use bollard::container::LogsOptions;
use bollard::container::LogOutput;
use bollard::Docker;
use futures_util::StreamExt;
use logforge_protocol::types::{Facility, Message, Pri, Severity};
use std::sync::Arc;

/// Stream one container's combined stdout/stderr, reassemble multi-line
/// records, and push a `Message` per completed record onto `sink`.
///
/// `tail` controls the Docker API's own backlog replay: `"1"` on first
/// attach (so we don't replay a container's entire history the moment
/// we notice it), `"all"` once `tail_applied` is already set (spec.md
/// §4.6 "tail=1 on first attach, full stream thereafter" -- in practice
/// this only matters across a daemon restart, since within one run a
/// container is only ever attached to once).
pub async fn stream_container(
    docker: Docker,
    info: ContainerInfo,
    default_facility: Facility,
    default_severity: Severity,
    sink: crossbeam_channel::Sender<Message>,
) {
    let tail = if info.tail_applied { "all" } else { "1" };
    // One reassembler per stream, per the data model (§3 "two per-stream
    // read buffers (stdout, stderr)"): interleaved stdout/stderr output
    // must not be joined into the same multi-line record.
    let mut stdout_reassembler = Reassembler::new(info.start_regex.as_deref());
    let mut stderr_reassembler = Reassembler::new(info.start_regex.as_deref());
    let labels = Arc::new(info.labels.clone());

    let options = LogsOptions::<String> {
        follow: true,
        stdout: true,
        stderr: true,
        tail: tail.to_string(),
        timestamps: false,
        ..Default::default()
    };

    let mut log_stream = docker.logs(info.id.full(), Some(options));

    while let Some(chunk) = log_stream.next().await {
        let output = match chunk {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(container = %info.id, error = %e, "docker log stream error");
                break;
            }
        };

        // spec.md §4.6: severity is the configured default, or LOG_ERR
        // when the frame's stream-type is stderr.
        let (bytes, reassembler, severity) = match &output {
            LogOutput::StdOut { message } => (message.clone(), &mut stdout_reassembler, default_severity),
            LogOutput::StdErr { message } => (message.clone(), &mut stderr_reassembler, Severity::Err),
            LogOutput::Console { message } => (message.clone(), &mut stdout_reassembler, default_severity),
            LogOutput::StdIn { .. } => continue,
        };

        for line in String::from_utf8_lossy(&bytes).lines() {
            if let Some(record) = reassembler.feed(line) {
                emit(&info, &labels, record, default_facility, severity, &sink);
            }
        }
    }

    if let Some(record) = stdout_reassembler.finish() {
        emit(&info, &labels, record, default_facility, default_severity, &sink);
    }
    if let Some(record) = stderr_reassembler.finish() {
        emit(&info, &labels, record, default_facility, Severity::Err, &sink);
    }
}

fn emit(
    info: &ContainerInfo,
    labels: &Arc<serde_json::Value>,
    body: String,
    facility: Facility,
    severity: Severity,
    sink: &crossbeam_channel::Sender<Message>,
) {
    let mut msg = Message::construct("imdocker", Pri::new(facility, severity), body);
    // spec.md §4.6: "Tag is the literal `docker:`" -- the container's own
    // identity travels in metadata, not the tag.
    msg.set_tag("docker:");
    msg.insert_metadata("docker.container_id.short", info.id.short());
    msg.insert_metadata("docker.container_id.full", info.id.full());
    msg.insert_metadata("docker.container_name", info.name.as_str());
    msg.insert_metadata("docker.image", info.image.as_str());
    msg.insert_metadata("docker.labels", labels.to_string());
    let _ = sink.send(msg);
}
