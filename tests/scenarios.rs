//! End-to-end scenarios over loopback TCP: a server hosting DB1 and one or
//! more field-access clients.

use std::thread;
use std::time::{Duration, Instant};

use s7_datablock::codec::{get_bit, set_bit};
use s7_datablock::{
    AreaId, Client, ClientConfig, CpuState, DbError, EventKind, EventMask, MemoryArea, Server,
    ServerConfig, ServerState,
};

const DB1: AreaId = AreaId::db(1);

fn start_server(db_size: usize) -> Server {
    let config = ServerConfig::new()
        .with_bind("127.0.0.1:0".parse().unwrap())
        .with_area(DB1, db_size);
    let mut server = Server::from_config(&config).unwrap();
    server.start(config.bind).unwrap();
    server
}

fn connect(server: &Server) -> Client {
    let port = server.local_addr().unwrap().port();
    let mut client = Client::new(
        ClientConfig::new()
            .with_port(port)
            .with_timeout(Duration::from_secs(2)),
    );
    let state = client.connect("127.0.0.1", 0, 1);
    assert!(state.connected, "connect failed: {:?}", state.reason);
    client
}

fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn write_then_read_round_trip() {
    let server = start_server(1024);
    let mut client = connect(&server);

    client.write_field(DB1, 100, &[1, 2, 3, 4, 5]).unwrap();
    assert_eq!(client.read_field(DB1, 100, 5).unwrap(), vec![1, 2, 3, 4, 5]);
    assert_eq!(client.read_field(DB1, 99, 1).unwrap(), vec![0]);
    assert_eq!(client.read_field(DB1, 105, 1).unwrap(), vec![0]);

    // Last byte is addressable, one past it is not
    client.write_field(DB1, 1023, &[0xEE]).unwrap();
    assert_eq!(client.read_byte(DB1, 1023).unwrap(), 0xEE);
}

#[test]
fn out_of_bounds_access_is_rejected() {
    let server = start_server(1024);
    let mut client = connect(&server);

    assert!(matches!(
        client.read_field(DB1, 1020, 8),
        Err(DbError::OutOfRange {
            offset: 1020,
            length: 8
        })
    ));
    assert!(matches!(
        client.write_field(DB1, 1024, &[1]),
        Err(DbError::OutOfRange { .. })
    ));
    assert!(matches!(
        client.read_dword(DB1, 1022),
        Err(DbError::OutOfRange { .. })
    ));

    // Nothing was written and the session survived
    assert!(client.is_connected());
    let area = server.area(DB1).unwrap();
    assert!(area.read().as_bytes().iter().all(|&b| b == 0));
}

#[test]
fn bit_survives_reconnect() {
    let server = start_server(1024);
    {
        let area = server.area(DB1).unwrap();
        area.write().write(1010, &[0b1000_0001]).unwrap();
    }

    let mut client = connect(&server);
    client.write_bit(DB1, 1010, 2, true).unwrap();
    client.disconnect();
    assert!(!client.is_connected());

    let state = client.connect("127.0.0.1", 0, 1);
    assert!(state.connected);
    assert!(client.read_bit(DB1, 1010, 2).unwrap());
    assert_eq!(client.read_byte(DB1, 1010).unwrap(), 0b1000_0101);

    client.write_bit(DB1, 1010, 2, false).unwrap();
    assert_eq!(client.read_byte(DB1, 1010).unwrap(), 0b1000_0001);
}

#[test]
fn dword_is_big_endian_on_the_wire() {
    let server = start_server(1024);
    server
        .area(DB1)
        .unwrap()
        .write()
        .write(590, &[0x00, 0x00, 0x02, 0x4A])
        .unwrap();

    let mut client = connect(&server);
    assert_eq!(client.read_dword(DB1, 590).unwrap(), 0x24A);

    client.write_dword(DB1, 590, 0x0102_0304).unwrap();
    let area = server.area(DB1).unwrap();
    assert_eq!(area.read().read(590, 4).unwrap(), vec![1, 2, 3, 4]);
}

#[test]
fn overlapping_bit_writes_lose_an_update() {
    let server = start_server(16);
    let mut first = connect(&server);
    let mut second = connect(&server);

    // Both clients read the byte before either writes it back
    let mut first_view = first.read_field(DB1, 3, 1).unwrap();
    let mut second_view = second.read_field(DB1, 3, 1).unwrap();

    set_bit(&mut first_view, 0, 0, true).unwrap();
    first.write_field(DB1, 3, &first_view).unwrap();

    set_bit(&mut second_view, 0, 1, true).unwrap();
    second.write_field(DB1, 3, &second_view).unwrap();

    let byte = first.read_field(DB1, 3, 1).unwrap();
    assert!(!get_bit(&byte, 0, 0).unwrap(), "first update survived");
    assert!(get_bit(&byte, 0, 1).unwrap());
    assert_eq!(byte, vec![0b0000_0010]);
}

#[test]
fn sequential_bit_writes_from_two_clients_both_land() {
    let server = start_server(16);
    let mut first = connect(&server);
    let mut second = connect(&server);

    first.write_bit(DB1, 3, 0, true).unwrap();
    second.write_bit(DB1, 3, 1, true).unwrap();
    assert_eq!(first.read_byte(DB1, 3).unwrap(), 0b0000_0011);
}

#[test]
fn concurrent_writers_to_separate_bytes() {
    let server = start_server(64);
    let port = server.local_addr().unwrap().port();

    let workers: Vec<_> = (0..4u8)
        .map(|n| {
            thread::spawn(move || {
                let mut client = Client::new(ClientConfig::new().with_port(port));
                client.try_connect("127.0.0.1", 0, 1).unwrap();
                for bit in 0..8 {
                    client.write_bit(DB1, n as usize, bit, true).unwrap();
                }
                client.disconnect();
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let area = server.area(DB1).unwrap();
    assert_eq!(area.read().read(0, 5).unwrap(), vec![0xFF, 0xFF, 0xFF, 0xFF, 0x00]);
}

#[test]
fn events_follow_client_sessions() {
    let server = start_server(64);
    server.clear_events();

    let mut client = connect(&server);
    wait_until(|| server.pick_event().is_some());
    let event = server.pick_event().unwrap();
    assert_eq!(event.kind, EventKind::ClientAdded);
    assert_eq!(server.pick_event().unwrap(), event);
    assert_eq!(server.status().sessions, 1);

    server.clear_events();
    assert!(server.pick_event().is_none());

    assert!(matches!(
        client.read_field(AreaId::db(9), 0, 1),
        Err(DbError::AreaNotFound(id)) if id == AreaId::db(9)
    ));
    wait_until(|| server.pick_event().is_some());
    let rejected = server.pick_event().unwrap();
    assert_eq!(rejected.kind, EventKind::RequestRejected);
    assert!(rejected.to_string().contains("DB9"));
    server.clear_events();

    client.disconnect();
    wait_until(|| server.status().sessions == 0);
    wait_until(|| server.pick_event().is_some());
    assert_eq!(
        server.pick_event().unwrap().kind,
        EventKind::ClientDisconnected
    );
}

#[test]
fn data_events_are_opt_in() {
    let server = start_server(64);
    let mut client = connect(&server);
    wait_until(|| server.status().sessions == 1);

    server.clear_events();
    client.write_field(DB1, 0, &[1]).unwrap();
    assert!(server.pick_event().is_none());

    server.set_event_mask(EventMask::DATA_WRITE);
    client.write_field(DB1, 8, &[1, 2]).unwrap();
    let event = server.pick_event().unwrap();
    assert_eq!(event.kind, EventKind::DataWrite);
    let range = event.range.unwrap();
    assert_eq!((range.area, range.offset, range.length), (DB1, 8, 2));
}

#[test]
fn status_reports_server_and_cpu() {
    let mut server = start_server(64);
    let status = server.status();
    assert_eq!(status.server, ServerState::Running);
    assert_eq!(status.cpu, CpuState::Running);
    assert_eq!(status.sessions, 0);

    let _first = connect(&server);
    let _second = connect(&server);
    wait_until(|| server.status().sessions == 2);
    assert_eq!(server.sessions().len(), 2);

    server.stop();
    let status = server.status();
    assert_eq!(status.server, ServerState::Stopped);
    assert_eq!(status.sessions, 0);
}

#[test]
fn stop_is_idempotent_and_ends_sessions() {
    let mut server = start_server(64);
    let mut client = connect(&server);

    assert!(server.stop());
    assert!(!server.stop());

    assert!(client.read_byte(DB1, 0).unwrap_err().is_communication());
    assert!(matches!(
        client.read_byte(DB1, 0),
        Err(DbError::NotConnected)
    ));
    client.disconnect();
}

#[test]
fn start_errors() {
    let mut server = start_server(64);
    assert!(matches!(
        server.start("127.0.0.1:0".parse().unwrap()),
        Err(DbError::AlreadyRunning)
    ));

    let taken = server.local_addr().unwrap();
    let mut other = Server::new();
    other.register_area(MemoryArea::new(DB1, 8)).unwrap();
    assert!(matches!(other.start(taken), Err(DbError::Bind { .. })));
}

#[test]
fn area_registered_while_running_is_served() {
    let server = start_server(64);
    let mut client = connect(&server);

    assert!(matches!(
        client.read_byte(AreaId::db(2), 0),
        Err(DbError::AreaNotFound(_))
    ));
    server
        .register_area(MemoryArea::from_bytes(AreaId::db(2), vec![7, 8, 9]))
        .unwrap();
    assert_eq!(client.read_field(AreaId::db(2), 0, 3).unwrap(), vec![7, 8, 9]);
}

#[test]
fn session_activity_is_tracked() {
    let server = start_server(64);
    let mut client = connect(&server);

    let before = server.sessions();
    assert_eq!(before.len(), 1);
    let session = &before[0];
    assert!(session.last_activity >= session.connected_at);

    thread::sleep(Duration::from_millis(20));
    client.read_byte(DB1, 0).unwrap();

    let after = server.sessions();
    assert_eq!(after.len(), 1);
    assert_eq!(after[0].id, session.id);
    assert_eq!(after[0].connected_at, session.connected_at);
    assert!(after[0].last_activity > session.last_activity);
}
