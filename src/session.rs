//! Client sessions on the server side.
//!
//! Each accepted connection gets a [`Session`] record in the server's session
//! table and its own thread running the request loop. A session ends when the
//! client closes the connection, when the transport fails, or when the server
//! stops; in every case it is removed from the table and a
//! [`EventKind::ClientDisconnected`] event is queued.
//!
//! Malformed or out-of-range requests are answered with a non-success return
//! code and the session stays open. Frames that cannot be delimited (bad
//! header) end the session, since the stream cannot be resynchronized.

use std::collections::HashMap;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::command::Request;
use crate::error::{DbError, Result};
use crate::event::{Event, EventKind, EventQueue};
use crate::header::FrameHeader;
use crate::response::{Response, ReturnCode};
use crate::server::AreaRegistry;
use crate::transport::{read_frame, write_frame};

/// A connected client, as seen by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Server-assigned identifier, unique for the server's lifetime.
    pub id: u64,
    /// Address of the client.
    pub remote_address: SocketAddr,
    /// When the connection was accepted.
    pub connected_at: SystemTime,
    /// When the last request was received.
    pub last_activity: SystemTime,
}

struct SessionEntry {
    info: Session,
    stream: TcpStream,
}

/// Live sessions, keyed by id.
pub(crate) struct SessionTable {
    entries: Mutex<HashMap<u64, SessionEntry>>,
    next_id: AtomicU64,
}

impl SessionTable {
    pub(crate) fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a new session. A clone of the stream is kept so that
    /// [`shutdown_all`](Self::shutdown_all) can unblock its thread.
    pub(crate) fn open(&self, stream: &TcpStream, remote: SocketAddr) -> Result<u64> {
        let handle = stream.try_clone()?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let now = SystemTime::now();
        self.entries.lock().insert(
            id,
            SessionEntry {
                info: Session {
                    id,
                    remote_address: remote,
                    connected_at: now,
                    last_activity: now,
                },
                stream: handle,
            },
        );
        Ok(id)
    }

    pub(crate) fn touch(&self, id: u64) {
        if let Some(entry) = self.entries.lock().get_mut(&id) {
            entry.info.last_activity = SystemTime::now();
        }
    }

    pub(crate) fn close(&self, id: u64) -> Option<Session> {
        self.entries.lock().remove(&id).map(|entry| entry.info)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub(crate) fn snapshot(&self) -> Vec<Session> {
        let mut sessions: Vec<Session> = self
            .entries
            .lock()
            .values()
            .map(|entry| entry.info.clone())
            .collect();
        sessions.sort_by_key(|s| s.id);
        sessions
    }

    /// Closes every session socket. The session threads notice and exit.
    pub(crate) fn shutdown_all(&self) {
        for entry in self.entries.lock().values() {
            // Already closed by the peer is fine.
            let _ = entry.stream.shutdown(Shutdown::Both);
        }
    }
}

/// Shared state a session thread needs.
#[derive(Clone)]
pub(crate) struct SessionContext {
    pub(crate) areas: Arc<AreaRegistry>,
    pub(crate) events: Arc<EventQueue>,
    pub(crate) sessions: Arc<SessionTable>,
}

/// Request loop for one session. Returns when the session ends.
pub(crate) fn serve(ctx: SessionContext, id: u64, mut stream: TcpStream, remote: SocketAddr) {
    let mut handshake_done = false;

    let reason = loop {
        let (header, payload) = match read_frame(&mut stream) {
            Ok(Some(frame)) => frame,
            Ok(None) => break "connection closed".to_string(),
            Err(e) => break e.to_string(),
        };
        ctx.sessions.touch(id);

        let response = handle_frame(&ctx, remote, &mut handshake_done, header, &payload);
        if let Err(e) = write_frame(&mut stream, &response.to_bytes()) {
            break e.to_string();
        }
    };

    ctx.sessions.close(id);
    info!("Session {} ({}) ended: {}", id, remote, reason);
    ctx.events.push(
        Event::new(EventKind::ClientDisconnected)
            .with_remote(remote)
            .with_detail(reason),
    );
}

fn handle_frame(
    ctx: &SessionContext,
    remote: SocketAddr,
    handshake_done: &mut bool,
    header: FrameHeader,
    payload: &[u8],
) -> Response {
    let result = if header.is_response() {
        Err(DbError::invalid_frame("unexpected response frame"))
    } else {
        Request::decode(&header, payload)
            .and_then(|request| handle_request(ctx, remote, handshake_done, request))
    };

    match result {
        Ok(data) => Response::new(header, ReturnCode::Success, data),
        Err(e) => {
            warn!("Rejected request from {}: {}", remote, e);
            ctx.events.push(
                Event::new(EventKind::RequestRejected)
                    .with_remote(remote)
                    .with_detail(e.to_string()),
            );
            Response::new(header, ReturnCode::for_error(&e), Vec::new())
        }
    }
}

fn handle_request(
    ctx: &SessionContext,
    remote: SocketAddr,
    handshake_done: &mut bool,
    request: Request,
) -> Result<Vec<u8>> {
    match request {
        Request::Connect(connect) => {
            *handshake_done = true;
            info!(
                "Client {} connected: rack {}, slot {}, {:?}",
                remote, connect.rack, connect.slot, connect.connection_type
            );
            Ok(Vec::new())
        }
        Request::Read(read) if *handshake_done => {
            let area = ctx.areas.get(read.area)?;
            let data = area
                .read()
                .read(read.offset as usize, read.length as usize)?;
            debug!(
                "{} read {} offset {} length {}",
                remote, read.area, read.offset, read.length
            );
            ctx.events.push(
                Event::new(EventKind::DataRead)
                    .with_remote(remote)
                    .with_range(read.area, read.offset, read.length),
            );
            Ok(data)
        }
        Request::Write(write) if *handshake_done => {
            let area = ctx.areas.get(write.area)?;
            area.write().write(write.offset as usize, &write.data)?;
            debug!(
                "{} wrote {} offset {} length {}",
                remote,
                write.area,
                write.offset,
                write.data.len()
            );
            ctx.events.push(
                Event::new(EventKind::DataWrite)
                    .with_remote(remote)
                    .with_range(write.area, write.offset, write.data.len() as u16),
            );
            Ok(Vec::new())
        }
        Request::Read(_) | Request::Write(_) => Err(DbError::invalid_parameter(
            "session",
            "connect handshake required first",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{ConnectRequest, ConnectionType, ReadRequest, WriteRequest};
    use crate::event::EventMask;
    use crate::header::FRAME_HEADER_SIZE;
    use crate::memory::{AreaId, MemoryArea};

    fn context() -> SessionContext {
        let areas = AreaRegistry::new();
        areas
            .register(MemoryArea::new(AreaId::db(1), 16))
            .unwrap();
        SessionContext {
            areas: Arc::new(areas),
            events: Arc::new(EventQueue::new(EventMask::all())),
            sessions: Arc::new(SessionTable::new()),
        }
    }

    fn remote() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    fn run(ctx: &SessionContext, handshake: &mut bool, frame: Vec<u8>) -> Response {
        let header = FrameHeader::from_bytes(&frame).unwrap();
        handle_frame(ctx, remote(), handshake, header, &frame[FRAME_HEADER_SIZE..])
    }

    #[test]
    fn test_requests_before_handshake_are_rejected() {
        let ctx = context();
        let mut handshake = false;

        let read = ReadRequest::new(AreaId::db(1), 0, 1).unwrap();
        let response = run(&ctx, &mut handshake, read.to_bytes(1));
        assert_eq!(response.code, ReturnCode::InvalidRequest.code());

        let connect = ConnectRequest::new(0, 1, ConnectionType::PG);
        let response = run(&ctx, &mut handshake, connect.to_bytes(2));
        assert!(response.is_success());
        assert!(handshake);

        let response = run(&ctx, &mut handshake, read.to_bytes(3));
        assert!(response.is_success());
        assert_eq!(response.data, vec![0]);
        assert_eq!(response.header.seq, 3);
    }

    #[test]
    fn test_write_then_read() {
        let ctx = context();
        let mut handshake = true;

        let write = WriteRequest::new(AreaId::db(1), 4, &[0xDE, 0xAD]).unwrap();
        assert!(run(&ctx, &mut handshake, write.to_bytes(1)).is_success());

        let read = ReadRequest::new(AreaId::db(1), 3, 4).unwrap();
        let response = run(&ctx, &mut handshake, read.to_bytes(2));
        assert_eq!(response.data, vec![0x00, 0xDE, 0xAD, 0x00]);

        let kinds: Vec<EventKind> = ctx.events.snapshot().iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EventKind::DataWrite, EventKind::DataRead]);
    }

    #[test]
    fn test_rejections_keep_codes() {
        let ctx = context();
        let mut handshake = true;

        let read = ReadRequest::new(AreaId::db(1), 15, 2).unwrap();
        let response = run(&ctx, &mut handshake, read.to_bytes(1));
        assert_eq!(response.code, ReturnCode::InvalidAddress.code());

        let read = ReadRequest::new(AreaId::db(2), 0, 1).unwrap();
        let response = run(&ctx, &mut handshake, read.to_bytes(2));
        assert_eq!(response.code, ReturnCode::NotFound.code());

        assert_eq!(ctx.events.len(), 2);
        assert!(ctx
            .events
            .snapshot()
            .iter()
            .all(|e| e.kind == EventKind::RequestRejected));
    }

    #[test]
    fn test_response_frame_from_client_is_rejected() {
        let ctx = context();
        let mut handshake = true;
        let frame = FrameHeader::new_request(crate::header::Function::Read, 1, 0)
            .response(0)
            .to_bytes()
            .to_vec();
        let response = run(&ctx, &mut handshake, frame);
        assert_eq!(response.code, ReturnCode::InvalidRequest.code());
    }
}
