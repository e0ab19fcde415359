//! Container log input (imdocker): discovers running containers by
//! polling the Docker API, streams and demultiplexes their combined
//! stdout/stderr, reassembles multi-line records, and emits `Message`s
//! onto a channel the synchronous core reads from (spec.md §4.6).

pub mod frame;
pub mod poller;
pub mod reassembly;
pub mod runtime;
pub mod stream;
pub mod table;

pub use runtime::DockerInput;
pub use table::{ContainerInfo, ContainerTable};
