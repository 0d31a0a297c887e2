//! Data block server.
//!
//! This module provides the [`Server`] struct, which owns the registered
//! memory areas, accepts client sessions and serves their read and write
//! requests. It also keeps the event queue and session table an operator
//! loop polls (see [`monitor`](crate::monitor)).
//!
//! # Example
//!
//! ```no_run
//! use s7_datablock::{AreaId, MemoryArea, Server};
//!
//! let mut server = Server::new();
//! server.register_area(MemoryArea::new(AreaId::db(1), 10240))?;
//! server.start("0.0.0.0:102".parse().unwrap())?;
//!
//! if let Some(event) = server.pick_event() {
//!     println!("{}", event);
//!     server.clear_events();
//! }
//! println!("{:?}", server.status());
//!
//! server.stop();
//! # Ok::<(), s7_datablock::DbError>(())
//! ```
//!
//! # Concurrency
//!
//! Every session runs on its own thread. Each memory area sits behind its own
//! read/write lock, so requests against different areas never contend; reads
//! of one area proceed in parallel and a write excludes all other access to
//! that area while it copies its bytes.
//!
//! The lock covers a single request only. A client changing one bit does so
//! with two requests (read the byte, write it back), and another client
//! writing the same byte in between will have its update overwritten.

use std::collections::HashMap;
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{error, info, warn};
use parking_lot::{Mutex, RwLock};

use crate::error::{DbError, Result};
use crate::event::{Event, EventKind, EventMask, EventQueue};
use crate::memory::{AreaId, MemoryArea};
use crate::session::{self, Session, SessionContext, SessionTable};
use crate::transport::DEFAULT_PORT;

/// Default idle delay of the operator loop.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// How long the accept loop sleeps when no connection is pending.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// A memory area shared between the server and its sessions.
pub type SharedArea = Arc<RwLock<MemoryArea>>;

/// Registered memory areas, one lock per area.
pub(crate) struct AreaRegistry {
    areas: RwLock<HashMap<AreaId, SharedArea>>,
}

impl AreaRegistry {
    pub(crate) fn new() -> Self {
        Self {
            areas: RwLock::new(HashMap::new()),
        }
    }

    pub(crate) fn register(&self, area: MemoryArea) -> Result<SharedArea> {
        let mut areas = self.areas.write();
        let id = area.id();
        if areas.contains_key(&id) {
            return Err(DbError::DuplicateArea(id));
        }
        let shared = Arc::new(RwLock::new(area));
        areas.insert(id, Arc::clone(&shared));
        Ok(shared)
    }

    pub(crate) fn get(&self, id: AreaId) -> Result<SharedArea> {
        self.areas
            .read()
            .get(&id)
            .cloned()
            .ok_or(DbError::AreaNotFound(id))
    }
}

/// Whether the listener is up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Not listening.
    Stopped,
    /// Accepting sessions.
    Running,
}

/// CPU state reported to clients and operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuState {
    /// Not known.
    Unknown,
    /// CPU in STOP.
    Stopped,
    /// CPU in RUN.
    Running,
}

/// Point-in-time server status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerStatus {
    /// Listener state.
    pub server: ServerState,
    /// Reported CPU state.
    pub cpu: CpuState,
    /// Sessions connected at the time of the call.
    pub sessions: usize,
}

impl ServerStatus {
    /// Returns whether the listener is up.
    pub fn is_running(&self) -> bool {
        self.server == ServerState::Running
    }
}

/// Configuration for building a [`Server`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on.
    pub bind: SocketAddr,
    /// Areas to register: identifier and size in bytes.
    pub areas: Vec<(AreaId, usize)>,
    /// Event kinds to queue.
    pub event_mask: EventMask,
    /// CPU state reported initially.
    pub cpu_state: CpuState,
    /// Idle delay between operator loop iterations.
    pub poll_interval: Duration,
}

impl ServerConfig {
    /// Creates a configuration listening on all interfaces, port 102, with
    /// no areas.
    ///
    /// # Example
    ///
    /// ```
    /// use s7_datablock::{AreaId, ServerConfig};
    ///
    /// let config = ServerConfig::new()
    ///     .with_port(1102)
    ///     .with_area(AreaId::db(1), 10240);
    /// assert_eq!(config.bind.port(), 1102);
    /// assert_eq!(config.areas, vec![(AreaId::db(1), 10240)]);
    /// ```
    pub fn new() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            areas: Vec::new(),
            event_mask: EventMask::default(),
            cpu_state: CpuState::Running,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Sets the listen address.
    pub fn with_bind(mut self, bind: SocketAddr) -> Self {
        self.bind = bind;
        self
    }

    /// Sets the listen port, keeping the address.
    pub fn with_port(mut self, port: u16) -> Self {
        self.bind.set_port(port);
        self
    }

    /// Adds a zero-filled area of `size` bytes.
    pub fn with_area(mut self, id: AreaId, size: usize) -> Self {
        self.areas.push((id, size));
        self
    }

    /// Sets which event kinds are queued.
    pub fn with_event_mask(mut self, mask: EventMask) -> Self {
        self.event_mask = mask;
        self
    }

    /// Sets the initially reported CPU state.
    pub fn with_cpu_state(mut self, cpu_state: CpuState) -> Self {
        self.cpu_state = cpu_state;
        self
    }

    /// Sets the operator loop idle delay (default is 1 second).
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

struct Listener {
    local_addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    accept_thread: JoinHandle<Vec<JoinHandle<()>>>,
}

/// Data block server.
///
/// Owns its memory areas for its whole lifetime. Areas can be registered
/// before or after [`start`](Self::start); they are never removed or resized.
pub struct Server {
    areas: Arc<AreaRegistry>,
    events: Arc<EventQueue>,
    sessions: Arc<SessionTable>,
    cpu_state: Mutex<CpuState>,
    listener: Option<Listener>,
}

impl Server {
    /// Creates a stopped server with no areas and the default event mask.
    pub fn new() -> Self {
        Self {
            areas: Arc::new(AreaRegistry::new()),
            events: Arc::new(EventQueue::new(EventMask::default())),
            sessions: Arc::new(SessionTable::new()),
            cpu_state: Mutex::new(CpuState::Running),
            listener: None,
        }
    }

    /// Creates a stopped server and registers the configured areas.
    ///
    /// The server is not started; call [`start`](Self::start) with
    /// `config.bind`.
    ///
    /// # Errors
    ///
    /// Returns `DbError::DuplicateArea` if the configuration names an area
    /// twice.
    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        let server = Self::new();
        server.events.set_mask(config.event_mask);
        server.set_cpu_state(config.cpu_state);
        for &(id, size) in &config.areas {
            server.register_area(MemoryArea::new(id, size))?;
        }
        Ok(server)
    }

    /// Binds `area` under its identifier.
    ///
    /// Returns a handle through which the hosting process can read and write
    /// the area under the same lock the sessions use.
    ///
    /// # Errors
    ///
    /// Returns `DbError::DuplicateArea` if the identifier is already bound.
    pub fn register_area(&self, area: MemoryArea) -> Result<SharedArea> {
        let id = area.id();
        let size = area.size();
        let shared = self.areas.register(area)?;
        info!("Registered area {} ({} bytes)", id, size);
        Ok(shared)
    }

    /// Returns the registered area with the given identifier.
    pub fn area(&self, id: AreaId) -> Option<SharedArea> {
        self.areas.get(id).ok()
    }

    /// Starts listening on `addr`.
    ///
    /// Port 0 picks a free port; see [`local_addr`](Self::local_addr).
    ///
    /// # Errors
    ///
    /// - `DbError::AlreadyRunning` if the server is already started
    /// - `DbError::Bind` if the address cannot be bound
    pub fn start(&mut self, addr: SocketAddr) -> Result<()> {
        if self.listener.is_some() {
            return Err(DbError::AlreadyRunning);
        }

        let bind_err = |source| DbError::Bind { addr, source };
        let listener = TcpListener::bind(addr).map_err(bind_err)?;
        listener.set_nonblocking(true).map_err(bind_err)?;
        let local_addr = listener.local_addr().map_err(bind_err)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let ctx = self.session_context();
        let flag = Arc::clone(&shutdown);
        let accept_thread = thread::Builder::new()
            .name("db-accept".to_string())
            .spawn(move || accept_loop(listener, flag, ctx))?;

        self.listener = Some(Listener {
            local_addr,
            shutdown,
            accept_thread,
        });
        info!("Server listening on {}", local_addr);
        self.events
            .push(Event::new(EventKind::ServerStarted).with_detail(local_addr.to_string()));
        Ok(())
    }

    /// Starts listening on all interfaces, port 102.
    ///
    /// # Errors
    ///
    /// See [`start`](Self::start).
    pub fn start_default(&mut self) -> Result<()> {
        self.start(SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)))
    }

    /// Stops the server: closes the listener and every session.
    ///
    /// Returns `true` if the server was running. Calling it on a stopped
    /// server does nothing and returns `false`.
    pub fn stop(&mut self) -> bool {
        let Some(listener) = self.listener.take() else {
            return false;
        };

        listener.shutdown.store(true, Ordering::Release);
        let workers = match listener.accept_thread.join() {
            Ok(workers) => workers,
            Err(_) => {
                error!("Accept thread panicked");
                Vec::new()
            }
        };

        self.sessions.shutdown_all();
        for worker in workers {
            if worker.join().is_err() {
                error!("Session thread panicked");
            }
        }

        info!("Server on {} stopped", listener.local_addr);
        self.events.push(Event::new(EventKind::ServerStopped));
        true
    }

    /// Returns the bound address while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().map(|l| l.local_addr)
    }

    /// Returns the oldest queued event without removing it.
    pub fn pick_event(&self) -> Option<Event> {
        self.events.pick()
    }

    /// Returns every queued event, oldest first, without removing any.
    pub fn queued_events(&self) -> Vec<Event> {
        self.events.snapshot()
    }

    /// Discards every queued event.
    pub fn clear_events(&self) {
        self.events.clear();
    }

    /// Selects which event kinds are queued from now on.
    pub fn set_event_mask(&self, mask: EventMask) {
        self.events.set_mask(mask);
    }

    /// Returns a live status snapshot.
    pub fn status(&self) -> ServerStatus {
        ServerStatus {
            server: if self.listener.is_some() {
                ServerState::Running
            } else {
                ServerState::Stopped
            },
            cpu: *self.cpu_state.lock(),
            sessions: self.sessions.len(),
        }
    }

    /// Sets the CPU state reported by [`status`](Self::status).
    pub fn set_cpu_state(&self, state: CpuState) {
        *self.cpu_state.lock() = state;
    }

    /// Returns the connected sessions, ordered by id.
    pub fn sessions(&self) -> Vec<Session> {
        self.sessions.snapshot()
    }

    fn session_context(&self) -> SessionContext {
        SessionContext {
            areas: Arc::clone(&self.areas),
            events: Arc::clone(&self.events),
            sessions: Arc::clone(&self.sessions),
        }
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("local_addr", &self.local_addr())
            .field("status", &self.status())
            .finish()
    }
}

fn accept_loop(
    listener: TcpListener,
    shutdown: Arc<AtomicBool>,
    ctx: SessionContext,
) -> Vec<JoinHandle<()>> {
    let mut workers: Vec<JoinHandle<()>> = Vec::new();

    while !shutdown.load(Ordering::Acquire) {
        let (stream, remote) = match listener.accept() {
            Ok(conn) => conn,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL_INTERVAL);
                continue;
            }
            Err(e) => {
                warn!("Accept failed: {}", e);
                ctx.events
                    .push(Event::new(EventKind::ListenerError).with_detail(e.to_string()));
                thread::sleep(ACCEPT_POLL_INTERVAL);
                continue;
            }
        };

        // Accepted sockets may inherit the listener's non-blocking mode.
        if let Err(e) = stream.set_nonblocking(false) {
            warn!("Dropping connection from {}: {}", remote, e);
            continue;
        }
        let id = match ctx.sessions.open(&stream, remote) {
            Ok(id) => id,
            Err(e) => {
                warn!("Dropping connection from {}: {}", remote, e);
                continue;
            }
        };

        info!("Session {} opened from {}", id, remote);
        ctx.events
            .push(Event::new(EventKind::ClientAdded).with_remote(remote));

        let session_ctx = ctx.clone();
        let spawned = thread::Builder::new()
            .name(format!("db-session-{}", id))
            .spawn(move || session::serve(session_ctx, id, stream, remote));
        match spawned {
            Ok(handle) => workers.push(handle),
            Err(e) => {
                error!("Cannot spawn session thread for {}: {}", remote, e);
                ctx.sessions.close(id);
            }
        }
        workers.retain(|w| !w.is_finished());
    }

    workers
}
