//! Operator loop for a running server.
//!
//! [`Monitor::run`] drives a started [`Server`] until a [`ShutdownSignal`]
//! fires: each iteration picks the oldest event, hands it to a
//! [`StatusHandler`] and clears the queue, then reports the server status,
//! then idles for the poll interval. However the loop ends (signal, handler
//! error or panic) the server is stopped exactly once before `run` returns.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use s7_datablock::monitor::{LogHandler, Monitor, ShutdownSignal};
//! use s7_datablock::{AreaId, MemoryArea, Server};
//!
//! let mut server = Server::new();
//! server.register_area(MemoryArea::new(AreaId::db(1), 10240))?;
//! server.start_default()?;
//!
//! let signal = ShutdownSignal::new();
//! let trigger = signal.clone();
//! std::thread::spawn(move || {
//!     std::thread::sleep(Duration::from_secs(10));
//!     trigger.trigger();
//! });
//!
//! Monitor::new(Duration::from_secs(1)).run(&mut server, &signal, &mut LogHandler)?;
//! assert!(!server.status().is_running());
//! # Ok::<(), s7_datablock::DbError>(())
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info};

use crate::error::Result;
use crate::event::Event;
use crate::server::{Server, ServerConfig, ServerStatus};

/// Longest single sleep while idling, so a shutdown request is noticed
/// promptly.
const IDLE_SLICE: Duration = Duration::from_millis(50);

/// Cloneable flag requesting the operator loop to finish.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    flag: Arc<AtomicBool>,
}

impl ShutdownSignal {
    /// Creates an untriggered signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests shutdown. Safe to call from a signal handler thread.
    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Returns whether shutdown was requested.
    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Sleeps up to `timeout`, returning early once triggered.
    ///
    /// Returns whether the signal is triggered.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_triggered() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            thread::sleep(IDLE_SLICE.min(deadline - now));
        }
    }
}

/// Receives what the operator loop observes.
pub trait StatusHandler {
    /// Called with the oldest queued event, before the queue is cleared.
    ///
    /// # Errors
    ///
    /// An error ends the loop; the server is still stopped.
    fn on_event(&mut self, event: &Event) -> Result<()>;

    /// Called once per iteration with the current status.
    ///
    /// # Errors
    ///
    /// An error ends the loop; the server is still stopped.
    fn on_status(&mut self, status: &ServerStatus) -> Result<()>;
}

/// Handler that logs every event and any non-zero session count.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogHandler;

impl StatusHandler for LogHandler {
    fn on_event(&mut self, event: &Event) -> Result<()> {
        info!("{}", event);
        Ok(())
    }

    fn on_status(&mut self, status: &ServerStatus) -> Result<()> {
        if status.sessions > 0 {
            info!("Connected clients: {}", status.sessions);
        }
        Ok(())
    }
}

/// Stops the server when dropped, unless already stopped.
struct ServerGuard<'a> {
    server: Option<&'a mut Server>,
}

impl<'a> ServerGuard<'a> {
    fn new(server: &'a mut Server) -> Self {
        Self {
            server: Some(server),
        }
    }

    fn server(&mut self) -> Option<&mut Server> {
        self.server.as_deref_mut()
    }

    fn stop(&mut self) {
        if let Some(server) = self.server.take() {
            info!("Shutting down server");
            server.stop();
        }
    }
}

impl Drop for ServerGuard<'_> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Cooperative polling loop over a started server.
#[derive(Debug, Clone, Copy)]
pub struct Monitor {
    poll_interval: Duration,
}

impl Monitor {
    /// Creates a loop idling `poll_interval` between iterations.
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }

    /// Creates a loop using the configured poll interval.
    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(config.poll_interval)
    }

    /// Returns the idle delay between iterations.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Runs until `signal` is triggered or `handler` fails, then stops
    /// `server`.
    ///
    /// # Errors
    ///
    /// Returns the first error from `handler`. The server is stopped in that
    /// case too.
    pub fn run(
        &self,
        server: &mut Server,
        signal: &ShutdownSignal,
        handler: &mut dyn StatusHandler,
    ) -> Result<()> {
        let mut guard = ServerGuard::new(server);
        let result = match guard.server() {
            Some(server) => self.poll(server, signal, handler),
            None => Ok(()),
        };
        guard.stop();
        result
    }

    fn poll(
        &self,
        server: &Server,
        signal: &ShutdownSignal,
        handler: &mut dyn StatusHandler,
    ) -> Result<()> {
        while !signal.is_triggered() {
            if let Some(event) = server.pick_event() {
                handler.on_event(&event)?;
                server.clear_events();
            }

            let status = server.status();
            handler.on_status(&status)?;

            if signal.wait_timeout(self.poll_interval) {
                break;
            }
        }
        debug!("Shutdown requested");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use crate::event::EventKind;
    use crate::memory::{AreaId, MemoryArea};
    use std::net::TcpStream;

    #[derive(Default)]
    struct Recorder {
        events: Vec<EventKind>,
        statuses: Vec<ServerStatus>,
        fail_on_status: bool,
        stop_after: Option<(usize, ShutdownSignal)>,
    }

    impl StatusHandler for Recorder {
        fn on_event(&mut self, event: &Event) -> Result<()> {
            self.events.push(event.kind);
            Ok(())
        }

        fn on_status(&mut self, status: &ServerStatus) -> Result<()> {
            self.statuses.push(*status);
            if self.fail_on_status {
                return Err(DbError::invalid_parameter("handler", "boom"));
            }
            if let Some((n, signal)) = &self.stop_after {
                if self.statuses.len() >= *n {
                    signal.trigger();
                }
            }
            Ok(())
        }
    }

    fn started_server() -> Server {
        let mut server = Server::new();
        server
            .register_area(MemoryArea::new(AreaId::db(1), 64))
            .unwrap();
        server.start("127.0.0.1:0".parse().unwrap()).unwrap();
        server
    }

    fn count_stopped(server: &Server) -> usize {
        server
            .queued_events()
            .iter()
            .filter(|e| e.kind == EventKind::ServerStopped)
            .count()
    }

    #[test]
    fn test_signal_wait() {
        let signal = ShutdownSignal::new();
        assert!(!signal.wait_timeout(Duration::from_millis(10)));
        let other = signal.clone();
        other.trigger();
        assert!(signal.is_triggered());
        assert!(signal.wait_timeout(Duration::from_secs(60)));
    }

    #[test]
    fn test_pre_triggered_signal_still_stops() {
        let mut server = started_server();
        let signal = ShutdownSignal::new();
        signal.trigger();

        let mut recorder = Recorder::default();
        Monitor::new(Duration::from_millis(10))
            .run(&mut server, &signal, &mut recorder)
            .unwrap();

        assert!(recorder.statuses.is_empty());
        assert!(!server.status().is_running());
        assert_eq!(count_stopped(&server), 1);
    }

    #[test]
    fn test_error_in_first_iteration_stops_once() {
        let mut server = started_server();
        let signal = ShutdownSignal::new();
        let mut recorder = Recorder {
            fail_on_status: true,
            ..Default::default()
        };

        let result =
            Monitor::new(Duration::from_millis(10)).run(&mut server, &signal, &mut recorder);
        assert!(result.is_err());
        assert_eq!(recorder.statuses.len(), 1);
        assert_eq!(recorder.events, vec![EventKind::ServerStarted]);
        assert!(!server.status().is_running());
        assert_eq!(count_stopped(&server), 1);
        assert!(!server.stop());
    }

    #[test]
    fn test_events_are_handled_then_cleared() {
        let mut server = started_server();
        let _client = TcpStream::connect(server.local_addr().unwrap()).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        let added = |server: &Server| {
            server
                .queued_events()
                .iter()
                .any(|e| e.kind == EventKind::ClientAdded)
        };
        while !added(&server) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }

        let signal = ShutdownSignal::new();
        let mut recorder = Recorder {
            stop_after: Some((2, signal.clone())),
            ..Default::default()
        };
        Monitor::new(Duration::from_millis(10))
            .run(&mut server, &signal, &mut recorder)
            .unwrap();

        // ServerStarted and ClientAdded were both queued; the first pick
        // handles the oldest and the clear discards the other.
        assert_eq!(recorder.events, vec![EventKind::ServerStarted]);
        assert_eq!(recorder.statuses.len(), 2);
        assert_eq!(recorder.statuses[0].sessions, 1);
        assert!(recorder.statuses[0].is_running());
        assert_eq!(count_stopped(&server), 1);
    }

    struct PanickingHandler;

    impl StatusHandler for PanickingHandler {
        fn on_event(&mut self, _event: &Event) -> Result<()> {
            panic!("handler failure");
        }

        fn on_status(&mut self, _status: &ServerStatus) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_handler_panic_stops_once() {
        let mut server = started_server();
        let signal = ShutdownSignal::new();

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            Monitor::new(Duration::from_millis(10)).run(
                &mut server,
                &signal,
                &mut PanickingHandler,
            )
        }));
        assert!(outcome.is_err());

        assert!(!server.status().is_running());
        assert_eq!(count_stopped(&server), 1);
        assert!(!server.stop());
    }

    #[test]
    fn test_from_config() {
        let config = ServerConfig::new().with_poll_interval(Duration::from_millis(250));
        assert_eq!(
            Monitor::from_config(&config).poll_interval(),
            Duration::from_millis(250)
        );
    }
}
