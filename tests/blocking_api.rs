//! The blocking presentation against the scripted listener.
//!
//! The mock runs on its own runtime in a background thread; the test thread
//! drives the synchronous surface only.

mod common;

use common::*;
use orathin::blocking::Connection;
use orathin::OracleValue;

/// Run the mock listener on a dedicated thread, returning the connect
/// string and a join handle for the scripted exchange.
fn spawn_mock<F, Fut>(script: F) -> (String, std::thread::JoinHandle<()>)
where
    F: FnOnce(tokio::net::TcpStream) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .build()
        .unwrap();
    let (listener, connect_string) = runtime.block_on(bind_listener());
    let handle = std::thread::spawn(move || {
        runtime.block_on(async move {
            let (sock, _) = listener.accept().await.unwrap();
            script(sock).await;
        });
    });
    (connect_string, handle)
}

#[test]
fn test_blocking_query() {
    let (connect_string, server) = spawn_mock(|mut sock| async move {
        serve_handshake(&mut sock).await;
        serve_number_query(&mut sock, "1", &[0xC1, 0x02], 0).await;
    });

    let conn = Connection::connect(&connect_string, "scott", "tiger").unwrap();
    assert_eq!(conn.protocol_version(), 315);

    let mut cursor = conn.cursor();
    cursor.execute("SELECT 1 FROM DUAL", &[]).unwrap();

    let description = cursor.description().unwrap();
    assert_eq!(description[0].name, "1");

    let row = cursor.fetchone().unwrap().unwrap();
    assert_eq!(row.get(0), Some(&OracleValue::Integer(1)));
    assert!(cursor.fetchone().unwrap().is_none());

    server.join().unwrap();
}

#[test]
fn test_blocking_cancel_from_another_thread() {
    let (connect_string, server) = spawn_mock(|mut sock| async move {
        serve_handshake(&mut sock).await;

        // Swallow the statement, then play the break/reset recovery.
        let _ = read_packet(&mut sock, true).await;
        let (_, _, payload) = read_packet(&mut sock, true).await;
        assert_eq!(payload[2], orathin::protocol::constants::TNS_MARKER_TYPE_BREAK);
        let _ = read_packet(&mut sock, true).await; // reset marker
        write_packet(
            &mut sock,
            true,
            orathin::protocol::constants::TNS_PACKET_TYPE_MARKER,
            0,
            &[1, 0, orathin::protocol::constants::TNS_MARKER_TYPE_RESET],
        )
        .await;
        let mut cancelled = ErrorBlock::success(5, 0);
        cancelled.error_num = 1013;
        cancelled.message = Some("ORA-01013: user requested cancel".to_string());
        write_data(&mut sock, &cancelled.encode()).await;

        serve_number_query(&mut sock, "1", &[0xC1, 0x02], 0).await;
    });

    let conn = std::sync::Arc::new(
        Connection::connect(&connect_string, "scott", "tiger").unwrap(),
    );

    let breaker = {
        let conn = conn.clone();
        std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(100));
            conn.cancel();
        })
    };

    let mut cursor = conn.cursor();
    let result = cursor.execute("SELECT slow_call() FROM DUAL", &[]);
    assert!(matches!(result, Err(orathin::Error::CallCancelled)));
    breaker.join().unwrap();

    // Usable again on the same thread.
    cursor.execute("SELECT 1 FROM DUAL", &[]).unwrap();
    let row = cursor.fetchone().unwrap().unwrap();
    assert_eq!(row.get(0), Some(&OracleValue::Integer(1)));

    server.join().unwrap();
}
