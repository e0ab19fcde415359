//! A single forwarder target: its connection, send-buffer batching, and
//! per-target failure bookkeeping (spec.md §3 "Forwarder target", §4.5).

use crate::compress::Compressor;
use crate::framing::frame;
use logforge_core::action::RetryPolicy;
use logforge_core::ActionState;
use logforge_protocol::config::{ForwarderConfig, TransportProtocol};
use logforge_protocol::error::{ErrorKind, LogforgeError, Result};
use logforge_security::{NativeTlsDriver, TlsDriver, TlsStream};
use socket2::{Domain, Protocol, SockAddr, Socket, TcpKeepalive, Type};
use std::io::Write;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs, UdpSocket};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::warn;

enum Transport {
    /// One socket per resolved address for this target's host (spec.md
    /// §4.5 / `original_source/tools/omfwd.c` `UDPSend`'s socket set):
    /// a multi-homed or round-robin-DNS target gets a send attempt
    /// against each address, not just the first one resolved.
    Udp(Vec<UdpSocket>),
    Tcp(TlsStream),
}

struct Connection {
    transport: Transport,
    messages_since_bind: u64,
}

#[derive(Default)]
pub struct TargetStats {
    pub bytes_sent: AtomicU64,
    pub messages_sent: AtomicU64,
    pub connection_errors: AtomicU64,
}

/// One target host:port within a forwarder's pool. Owns its own
/// connection, send buffer, and retry policy so the pool can drive many
/// of these independently (spec.md §4.5's per-target suspend/resume).
pub struct Target {
    pub host: String,
    pub port: u16,
    config: ForwarderConfig,
    tls: NativeTlsDriver,
    conn: Mutex<Option<Connection>>,
    send_buffer: Mutex<Vec<u8>>,
    compressor: Mutex<Compressor>,
    policy: RetryPolicy,
    stats: TargetStats,
    conn_err_since_log: AtomicU32,
}

impl Target {
    pub fn new(host: impl Into<String>, port: u16, config: ForwarderConfig) -> Self {
        let compressor = Compressor::new(config.compression);
        Self {
            host: host.into(),
            port,
            tls: NativeTlsDriver::new(),
            conn: Mutex::new(None),
            send_buffer: Mutex::new(Vec::with_capacity(config.send_buffer_cap)),
            compressor: Mutex::new(compressor),
            policy: RetryPolicy::new(5, Duration::from_secs(config.pool_resume_interval_secs)),
            stats: TargetStats::default(),
            conn_err_since_log: AtomicU32::new(0),
            config,
        }
    }

    pub fn state(&self) -> ActionState {
        self.policy.state()
    }

    pub fn stats(&self) -> &TargetStats {
        &self.stats
    }

    fn resolve(&self) -> Result<SocketAddr> {
        self.resolve_all()?
            .into_iter()
            .next()
            .ok_or_else(|| LogforgeError::new(ErrorKind::ConnectFailed, format!("no address for {}:{}", self.host, self.port)))
    }

    /// The full resolved address list for this target's host, not just
    /// the first one -- `original_source/tools/omfwd.c`'s `UDPSend`
    /// builds one socket per entry returned by `getaddrinfo` rather than
    /// picking a single winner up front.
    fn resolve_all(&self) -> Result<Vec<SocketAddr>> {
        let addrs: Vec<SocketAddr> = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| LogforgeError::with_source(ErrorKind::ConnectFailed, format!("resolving {}:{}", self.host, self.port), e))?
            .collect();
        if addrs.is_empty() {
            return Err(LogforgeError::new(ErrorKind::ConnectFailed, format!("no address for {}:{}", self.host, self.port)));
        }
        Ok(addrs)
    }

    /// spec.md §4.5 UDP: "resolve host once ... optionally bind local
    /// address and port." Built on `socket2` (as `shred-ingest`'s
    /// `ShredReceiver` does for its datagram socket) so the bind can set
    /// `SO_REUSEADDR` before the address/port are fixed, which
    /// `std::net::UdpSocket::bind` cannot express.
    fn bind_udp(&self, addr: SocketAddr) -> Result<UdpSocket> {
        let domain = if addr.is_ipv4() { Domain::IPV4 } else { Domain::IPV6 };
        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))
            .map_err(|e| LogforgeError::with_source(ErrorKind::ConnectFailed, "creating UDP socket", e))?;
        socket
            .set_reuse_address(true)
            .map_err(|e| LogforgeError::with_source(ErrorKind::ConnectFailed, "setting SO_REUSEADDR", e))?;

        let local: SocketAddr = match (&self.config.bind_address, self.config.bind_port) {
            (Some(host), port) => format!("{host}:{}", port.unwrap_or(0))
                .parse()
                .map_err(|e| LogforgeError::new(ErrorKind::InvalidConfig, format!("bind_address: {e}")))?,
            (None, Some(port)) => {
                if addr.is_ipv4() { ([0, 0, 0, 0], port).into() } else { ([0u16; 8], port).into() }
            }
            (None, None) => {
                if addr.is_ipv4() { ([0, 0, 0, 0], 0).into() } else { ([0u16; 8], 0).into() }
            }
        };
        socket
            .bind(&SockAddr::from(local))
            .map_err(|e| LogforgeError::with_source(ErrorKind::ConnectFailed, format!("binding UDP to {local}"), e))?;
        socket
            .connect(&SockAddr::from(addr))
            .map_err(|e| LogforgeError::with_source(ErrorKind::ConnectFailed, format!("connecting UDP to {addr}"), e))?;
        Ok(socket.into())
    }

    /// spec.md §4.5 TCP: "optionally keep-alive {probes, interval,
    /// time}." `std::net::TcpStream` exposes no keepalive knobs at all,
    /// so the socket is built through `socket2::Socket` and converted
    /// back once connected.
    fn connect_tcp(&self, addr: SocketAddr) -> Result<TcpStream> {
        let domain = if addr.is_ipv4() { Domain::IPV4 } else { Domain::IPV6 };
        let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))
            .map_err(|e| LogforgeError::with_source(ErrorKind::ConnectFailed, "creating TCP socket", e))?;
        if self.config.keep_alive.enabled {
            let ka = &self.config.keep_alive;
            let keepalive = TcpKeepalive::new()
                .with_time(Duration::from_secs(ka.time_secs as u64))
                .with_interval(Duration::from_secs(ka.interval_secs as u64));
            #[cfg(not(target_os = "windows"))]
            let keepalive = keepalive.with_retries(ka.probes);
            if let Err(e) = socket.set_tcp_keepalive(&keepalive) {
                warn!(target = %self.host, error = %e, "failed to set TCP keepalive, continuing without it");
            }
        }
        socket
            .connect(&SockAddr::from(addr))
            .map_err(|e| LogforgeError::with_source(ErrorKind::ConnectFailed, format!("connecting TCP to {addr}"), e))?;
        let stream: TcpStream = socket.into();
        stream
            .set_nodelay(true)
            .map_err(|e| LogforgeError::with_source(ErrorKind::ConnectFailed, "setting TCP_NODELAY", e))?;
        Ok(stream)
    }

    fn connect(&self) -> Result<Connection> {
        match self.config.protocol {
            TransportProtocol::Udp => {
                let addrs = self.resolve_all()?;
                let sockets = addrs
                    .into_iter()
                    .map(|addr| self.bind_udp(addr))
                    .collect::<Result<Vec<UdpSocket>>>()?;
                Ok(Connection {
                    transport: Transport::Udp(sockets),
                    messages_since_bind: 0,
                })
            }
            TransportProtocol::Tcp => {
                let addr = self.resolve()?;
                let stream = self.connect_tcp(addr)?;
                let tls_stream = self.tls.wrap_client(stream, &self.host, &self.config.tls)?;
                Ok(Connection {
                    transport: Transport::Tcp(tls_stream),
                    messages_since_bind: 0,
                })
            }
        }
    }

    fn ensure_connected<'a>(&self, guard: &'a mut Option<Connection>) -> Result<&'a mut Connection> {
        if guard.is_none() {
            *guard = Some(self.connect()?);
        }
        Ok(guard.as_mut().expect("just connected"))
    }

    /// One UDP datagram to one socket of the set, with
    /// `original_source/tools/omfwd.c` `UDPSend`'s `EMSGSIZE` handling:
    /// on "message too long" the datagram is shrunk by 1KiB (down to a
    /// 512B floor) and resent, rather than failing the whole send.
    fn send_udp_one(socket: &UdpSocket, payload: &[u8]) -> Result<usize> {
        let mut len = payload.len();
        loop {
            match socket.send(&payload[..len]) {
                Ok(n) => return Ok(n),
                Err(e) if len > 512 && e.raw_os_error() == Some(libc::EMSGSIZE as i32) => {
                    len = if len > 1024 { len - 1024 } else { 512 };
                    warn!(new_len = len, "EMSGSIZE on UDP send, shrinking datagram and retrying");
                }
                Err(e) => return Err(LogforgeError::with_source(ErrorKind::SendFailed, "UDP send", e)),
            }
        }
    }

    /// Send one already-framed datagram/chunk. Returns bytes sent and
    /// whether the connection must be torn down and rebuilt even though
    /// this call reports overall success (a UDP socket set where at
    /// least one address worked but another hard-failed).
    ///
    /// UDP: one send per resolved address (spec.md §4.5,
    /// `original_source/tools/omfwd.c` `UDPSend`) -- stop at the first
    /// success unless `send_to_all` says every address should get a
    /// copy. TCP: batches writes up to `send_buffer_cap`, flushing
    /// whatever's already buffered *before* appending the new frame so
    /// the two are never briefly held together above the cap
    /// (`TCPSendFrame`); a frame that alone exceeds the cap bypasses the
    /// buffer and goes straight to the wire.
    fn write_framed(&self, conn: &mut Connection, framed: &[u8]) -> Result<(usize, bool)> {
        match &mut conn.transport {
            Transport::Udp(sockets) => {
                let payload = if framed.len() > logforge_protocol::defaults::MAX_UDP_PAYLOAD {
                    warn!(len = framed.len(), "truncating oversize UDP datagram");
                    &framed[..logforge_protocol::defaults::MAX_UDP_PAYLOAD]
                } else {
                    framed
                };

                let mut any_ok = false;
                let mut any_hard_fail = false;
                let mut total_sent = 0usize;
                for socket in sockets.iter() {
                    match Self::send_udp_one(socket, payload) {
                        Ok(n) => {
                            any_ok = true;
                            total_sent += n;
                            if !self.config.send_to_all {
                                break;
                            }
                        }
                        Err(e) => {
                            any_hard_fail = true;
                            warn!(target = %self.host, error = %e, "UDP send failed against one resolved address");
                        }
                    }
                }

                if any_ok {
                    Ok((total_sent, any_hard_fail))
                } else {
                    Err(LogforgeError::new(ErrorKind::SendFailed, format!("UDP send failed against every resolved address for {}", self.host)))
                }
            }
            Transport::Tcp(stream) => {
                let mut buffer = self.send_buffer.lock().expect("send buffer mutex poisoned");
                let cap = self.config.send_buffer_cap;

                if !buffer.is_empty() && buffer.len() + framed.len() >= cap {
                    let to_send = std::mem::take(&mut *buffer);
                    stream
                        .write_all(&to_send)
                        .map_err(|e| LogforgeError::with_source(ErrorKind::SendFailed, "TCP send", e))?;
                }

                if framed.len() > cap {
                    stream
                        .write_all(framed)
                        .map_err(|e| LogforgeError::with_source(ErrorKind::SendFailed, "TCP send", e))?;
                    return Ok((framed.len(), false));
                }

                buffer.extend_from_slice(framed);
                if buffer.len() >= cap {
                    let to_send = std::mem::take(&mut *buffer);
                    stream
                        .write_all(&to_send)
                        .map_err(|e| LogforgeError::with_source(ErrorKind::SendFailed, "TCP send", e))?;
                    Ok((to_send.len(), false))
                } else {
                    Ok((framed.len(), false))
                }
            }
        }
    }

    /// Force whatever is sitting in the TCP send buffer out onto the
    /// wire; a no-op for UDP, which never batches.
    pub fn flush(&self) -> Result<()> {
        let conn_guard = &mut *self.conn.lock().expect("connection mutex poisoned");
        let Some(conn) = conn_guard.as_mut() else {
            return Ok(());
        };
        if let Transport::Tcp(stream) = &mut conn.transport {
            let mut buffer = self.send_buffer.lock().expect("send buffer mutex poisoned");
            if !buffer.is_empty() {
                let to_send = std::mem::take(&mut *buffer);
                stream
                    .write_all(&to_send)
                    .map_err(|e| LogforgeError::with_source(ErrorKind::SendFailed, "flushing TCP send buffer", e))?;
            }
        }
        Ok(())
    }

    /// Send one message body: compress, frame, write. Drives the
    /// suspend/resume policy and the rebind-after-N-messages counter
    /// (spec.md §4.5).
    pub fn send(&self, payload: &[u8]) -> Result<()> {
        if self.policy.state() != ActionState::Ready {
            return Err(LogforgeError::new(ErrorKind::ActionSuspended, "target is suspended"));
        }

        let compressed = self.compressor.lock().expect("compressor mutex poisoned").compress(payload)?;
        let framed = frame(&compressed, self.config.framing);

        let mut conn_guard = self.conn.lock().expect("connection mutex poisoned");
        let result = (|| -> Result<(usize, bool)> {
            let conn = self.ensure_connected(&mut conn_guard)?;
            let (sent, force_reconnect) = self.write_framed(conn, &framed)?;
            conn.messages_since_bind += 1;
            let rebind_due = self.config.rebind_interval_messages > 0
                && conn.messages_since_bind >= self.config.rebind_interval_messages;
            if rebind_due || force_reconnect {
                *conn_guard = None;
            }
            Ok((sent, force_reconnect))
        })();

        match result {
            Ok((sent, force_reconnect)) => {
                self.policy.record_success();
                self.stats.bytes_sent.fetch_add(sent as u64, Ordering::Relaxed);
                self.stats.messages_sent.fetch_add(1, Ordering::Relaxed);
                if force_reconnect {
                    self.stats.connection_errors.fetch_add(1, Ordering::Relaxed);
                    warn!(target = %self.host, port = self.port, "rebuilding UDP socket set after a partial send failure");
                } else {
                    self.conn_err_since_log.store(0, Ordering::Relaxed);
                }
                Ok(())
            }
            Err(e) => {
                *conn_guard = None;
                self.stats.connection_errors.fetch_add(1, Ordering::Relaxed);
                let skip = self.conn_err_since_log.fetch_add(1, Ordering::Relaxed);
                if skip % self.config.conn_err_skip.max(1) == 0 {
                    warn!(target = %self.host, port = self.port, error = %e, "forwarder send failed");
                }
                self.policy.record_failure();
                Err(e)
            }
        }
    }
}
