//! Wire-level tests against an in-process scripted listener.

mod common;

use common::*;
use orathin::protocol::constants::*;
use orathin::protocol::message::WriteExt;
use orathin::{
    ConnectParams, Connection, Error, ExecuteManyOptions, FetchType, GetMode, OracleType,
    OracleValue, Pool, PoolParams, VarConfig, Variable,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

#[tokio::test]
async fn test_simple_query() {
    let (listener, connect_string) = bind_listener().await;
    let server = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        serve_handshake(&mut sock).await;
        serve_number_query(&mut sock, "1", &[0xC1, 0x02], 0).await;
    });

    let conn = Connection::connect(&connect_string, "scott", "tiger")
        .await
        .unwrap();
    assert_eq!(conn.protocol_version(), 315);
    assert_eq!(conn.session_param("AUTH_SESSION_ID").as_deref(), Some("42"));
    assert_eq!(conn.server_version(), Some((19, 1, 0, 0, 1)));

    let mut cursor = conn.cursor();
    cursor.execute("SELECT 1 FROM DUAL", &[]).await.unwrap();

    let description = cursor.description().unwrap();
    assert_eq!(description[0].name, "1");
    assert!(matches!(description[0].data_type, OracleType::Number { .. }));

    let row = cursor.fetchone().await.unwrap().unwrap();
    assert_eq!(row.get(0), Some(&OracleValue::Integer(1)));
    assert!(cursor.fetchone().await.unwrap().is_none());
    assert_eq!(cursor.rowcount(), 1);

    server.await.unwrap();
}

#[tokio::test]
async fn test_number_precision_with_decimal_handler() {
    let (listener, connect_string) = bind_listener().await;
    let server = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        serve_handshake(&mut sock).await;
        // INSERT of 7.1
        let (ptype, _, _) = read_packet(&mut sock, true).await;
        assert_eq!(ptype, TNS_PACKET_TYPE_DATA);
        write_data(&mut sock, &ErrorBlock::success(6, 1).encode()).await;
        // SELECT returning 7.1 from a NUMBER(5,3) column
        serve_number_query(&mut sock, "X", &[0xC1, 0x08, 0x0B], 3).await;
    });

    let conn = Connection::connect(&connect_string, "scott", "tiger")
        .await
        .unwrap();

    let mut cursor = conn.cursor();
    let inserted = cursor
        .execute(
            "INSERT INTO t (x) VALUES (:1)",
            &[OracleValue::Double(7.1)],
        )
        .await
        .unwrap();
    assert_eq!(inserted, 1);

    // Output type handler mapping NUMBER to decimal strings.
    cursor.set_output_type_handler(Some(Arc::new(|ctx| {
        if ctx.metadata.oracle_type as u16 == ORA_TYPE_NUM_NUMBER {
            Some(VarConfig {
                fetch_type: FetchType::DecimalString,
                converter: None,
            })
        } else {
            None
        }
    })));
    cursor.execute("SELECT x FROM t", &[]).await.unwrap();
    let row = cursor.fetchone().await.unwrap().unwrap();
    assert_eq!(row.get(0), Some(&OracleValue::Number("7.1".to_string())));

    // Precision survives arithmetic on the decimal form.
    let x: f64 = row.get(0).unwrap().to_f64().unwrap();
    assert!((x * 3.0 - 21.3).abs() < 1e-9);

    server.await.unwrap();
}

#[tokio::test]
async fn test_executemany_batch_errors() {
    let (listener, connect_string) = bind_listener().await;
    let server = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        serve_handshake(&mut sock).await;

        let (ptype, _, _) = read_packet(&mut sock, true).await;
        assert_eq!(ptype, TNS_PACKET_TYPE_DATA);
        let block = ErrorBlock {
            cursor_id: 9,
            error_num: TNS_ERR_ARRAY_DML_ERRORS,
            row_count: 2,
            message: Some(
                "ORA-24381: error(s) in array DML".to_string(),
            ),
            batch: vec![(
                1,
                1,
                "ORA-00001: unique constraint violated".to_string(),
            )],
        };
        write_data(&mut sock, &block.encode()).await;
    });

    let conn = Connection::connect(&connect_string, "scott", "tiger")
        .await
        .unwrap();
    let mut cursor = conn.cursor();

    let rows = vec![
        vec![OracleValue::Integer(70), OracleValue::from("A")],
        vec![OracleValue::Integer(70), OracleValue::from("B")],
        vec![OracleValue::Integer(80), OracleValue::from("C")],
    ];
    let rowcount = cursor
        .executemany(
            "INSERT INTO t (pk, val) VALUES (:1, :2)",
            rows,
            ExecuteManyOptions {
                batch_errors: true,
                array_dml_row_counts: false,
            },
        )
        .await
        .unwrap();

    assert_eq!(rowcount, 2);
    let errors = cursor.getbatcherrors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].offset, 1);
    assert_eq!(errors[0].code, 1);

    server.await.unwrap();
}

#[tokio::test]
async fn test_dml_returning_bulk() {
    let (listener, connect_string) = bind_listener().await;
    let server = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        serve_handshake(&mut sock).await;

        let (ptype, _, _) = read_packet(&mut sock, true).await;
        assert_eq!(ptype, TNS_PACKET_TYPE_DATA);

        let mut body = Vec::new();
        // IO vector announcing the out binds.
        body.write_u8(TNS_MSG_TYPE_IO_VECTOR);
        body.write_ub4(3); // iterations
        body.write_ub2(2); // binds
        body.write_u8(TNS_BIND_DIR_INPUT);
        body.write_u8(TNS_BIND_DIR_OUTPUT);
        // One out-bind row group per iteration: deleted ids per parent.
        for ids in [vec![101i64, 102], vec![201], vec![]] {
            body.write_u8(TNS_MSG_TYPE_ROW_DATA);
            body.write_ub4(ids.len() as u32);
            for id in ids {
                let encoded =
                    orathin::protocol::decode::encode_number(&id.to_string()).unwrap();
                body.write_bytes_with_length(&encoded);
            }
        }
        body.extend_from_slice(&ErrorBlock::success(11, 3).encode());
        write_data(&mut sock, &body).await;
    });

    let conn = Connection::connect(&connect_string, "scott", "tiger")
        .await
        .unwrap();
    let mut cursor = conn.cursor();

    let mut parent_var = Variable::new(OracleType::Number { precision: 0, scale: 0 }, 22, 3);
    parent_var.values = vec![
        OracleValue::Integer(20),
        OracleValue::Integer(30),
        OracleValue::Integer(50),
    ];
    let child_id_var = Variable::for_output(OracleType::Number { precision: 0, scale: 0 }, 22, 3);

    cursor
        .executemany_vars(
            "DELETE FROM child WHERE parent_id = :1 RETURNING id INTO :2",
            vec![parent_var, child_id_var],
            3,
            ExecuteManyOptions::default(),
        )
        .await
        .unwrap();

    let out = &cursor.bind_variables()[1].out_values;
    assert_eq!(out.len(), 3);
    assert_eq!(
        out[0],
        vec![OracleValue::Integer(101), OracleValue::Integer(102)]
    );
    assert_eq!(out[1], vec![OracleValue::Integer(201)]);
    assert!(out[2].is_empty());

    server.await.unwrap();
}

#[tokio::test]
async fn test_redirect_reconnects_to_new_host() {
    let (second, _) = bind_listener().await;
    let second_addr = second.local_addr().unwrap();
    let (first, connect_string) = bind_listener().await;

    let redirect_target = tokio::spawn(async move {
        let (mut sock, _) = second.accept().await.unwrap();
        serve_handshake(&mut sock).await;
    });
    let redirector = tokio::spawn(async move {
        let (mut sock, _) = first.accept().await.unwrap();
        let (ptype, _, _) = read_packet(&mut sock, false).await;
        assert_eq!(ptype, TNS_PACKET_TYPE_CONNECT);

        let new_descriptor = format!(
            "(DESCRIPTION=(ADDRESS=(PROTOCOL=tcp)(HOST={})(PORT={}))(CONNECT_DATA=(SERVICE_NAME=MOCKPDB)))",
            second_addr.ip(),
            second_addr.port()
        );
        let mut payload = Vec::new();
        payload.write_u16_be(new_descriptor.len() as u16);
        payload.extend_from_slice(new_descriptor.as_bytes());
        payload.push(0);
        payload.extend_from_slice(b"(ORIGINAL=data)");
        write_packet(&mut sock, false, TNS_PACKET_TYPE_REDIRECT, 0, &payload).await;
    });

    let conn = Connection::connect(&connect_string, "scott", "tiger")
        .await
        .unwrap();
    assert_eq!(conn.host(), second_addr.ip().to_string());

    redirector.await.unwrap();
    redirect_target.await.unwrap();
}

#[tokio::test]
async fn test_refuse_maps_service_error() {
    let (listener, connect_string) = bind_listener().await;
    let server = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        let (ptype, _, _) = read_packet(&mut sock, false).await;
        assert_eq!(ptype, TNS_PACKET_TYPE_CONNECT);
        let refuse = b"(DESCRIPTION=(ERR=12514)(ERROR_STACK=(ERROR=(CODE=12514))))";
        write_packet(&mut sock, false, TNS_PACKET_TYPE_REFUSE, 0, refuse).await;
    });

    let result = Connection::connect(&connect_string, "scott", "tiger").await;
    match result {
        Err(Error::InvalidServiceName { service_name }) => {
            assert_eq!(service_name, "MOCKPDB");
        }
        other => panic!("expected InvalidServiceName, got {:?}", other.err()),
    }
    server.await.unwrap();
}

/// Serve the break/reset recovery dance, then a normal query.
async fn serve_break_then_query(mut sock: TcpStream) {
    serve_handshake(&mut sock).await;

    // The long-running statement: swallow the request and stall until the
    // client gives up and breaks.
    let (ptype, _, _) = read_packet(&mut sock, true).await;
    assert_eq!(ptype, TNS_PACKET_TYPE_DATA);

    let (ptype, _, payload) = read_packet(&mut sock, true).await;
    assert_eq!(ptype, TNS_PACKET_TYPE_MARKER);
    assert_eq!(payload[2], TNS_MARKER_TYPE_BREAK);
    let (ptype, _, payload) = read_packet(&mut sock, true).await;
    assert_eq!(ptype, TNS_PACKET_TYPE_MARKER);
    assert_eq!(payload[2], TNS_MARKER_TYPE_RESET);

    // Echo the reset, then the ORA-01013 error packet.
    write_packet(
        &mut sock,
        true,
        TNS_PACKET_TYPE_MARKER,
        0,
        &[1, 0, TNS_MARKER_TYPE_RESET],
    )
    .await;
    let mut cancelled = ErrorBlock::success(5, 0);
    cancelled.error_num = 1013;
    cancelled.message = Some("ORA-01013: user requested cancel".to_string());
    write_data(&mut sock, &cancelled.encode()).await;

    // The connection is usable again.
    serve_number_query(&mut sock, "1", &[0xC1, 0x02], 0).await;
}

#[tokio::test]
async fn test_external_break_recovery() {
    let (listener, connect_string) = bind_listener().await;
    let server = tokio::spawn(async move {
        let (sock, _) = listener.accept().await.unwrap();
        serve_break_then_query(sock).await;
    });

    let conn = Connection::connect(&connect_string, "scott", "tiger")
        .await
        .unwrap();

    let breaker = {
        let conn = conn.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            conn.cancel();
        })
    };

    let mut cursor = conn.cursor();
    let started = std::time::Instant::now();
    let result = cursor
        .execute("SELECT slow_function() FROM DUAL", &[])
        .await;
    assert!(matches!(result, Err(Error::CallCancelled)));
    assert!(started.elapsed() < Duration::from_secs(2));
    breaker.await.unwrap();

    // The very next call works.
    cursor.execute("SELECT 1 FROM DUAL", &[]).await.unwrap();
    let row = cursor.fetchone().await.unwrap().unwrap();
    assert_eq!(row.get(0), Some(&OracleValue::Integer(1)));

    server.await.unwrap();
}

#[tokio::test]
async fn test_call_timeout_recovery() {
    let (listener, connect_string) = bind_listener().await;
    let server = tokio::spawn(async move {
        let (sock, _) = listener.accept().await.unwrap();
        serve_break_then_query(sock).await;
    });

    let conn = Connection::connect(&connect_string, "scott", "tiger")
        .await
        .unwrap();
    conn.set_call_timeout(Some(Duration::from_millis(150)));

    let mut cursor = conn.cursor();
    let result = cursor.execute("SELECT sleeper FROM DUAL", &[]).await;
    assert!(matches!(result, Err(Error::CallTimeout { timeout_ms: 150 })));

    // Back to READY; the next call completes normally.
    conn.set_call_timeout(None);
    cursor.execute("SELECT 1 FROM DUAL", &[]).await.unwrap();
    let row = cursor.fetchone().await.unwrap().unwrap();
    assert_eq!(row.get(0), Some(&OracleValue::Integer(1)));

    server.await.unwrap();
}

#[tokio::test]
async fn test_trailing_terminator_refused_without_io() {
    let (listener, connect_string) = bind_listener().await;
    let server = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        serve_handshake(&mut sock).await;
        // No further packets expected.
    });

    let conn = Connection::connect(&connect_string, "scott", "tiger")
        .await
        .unwrap();
    let mut cursor = conn.cursor();
    let result = cursor.execute("SELECT 1 FROM DUAL;", &[]).await;
    assert!(matches!(
        result,
        Err(Error::TrailingStatementTerminator { terminator: ';' })
    ));
    server.await.unwrap();
}

#[tokio::test]
async fn test_pool_nowait_bound() {
    let (listener, connect_string) = bind_listener().await;
    let server = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        serve_handshake(&mut sock).await;
        // Keep the socket open so pooled validation sees a live peer.
        let mut buf = [0u8; 64];
        let _ = sock.read(&mut buf).await;
    });

    let pool = Pool::create(
        ConnectParams::new(&connect_string, "scott", "tiger"),
        PoolParams {
            min: 1,
            max: 1,
            getmode: GetMode::NoWait,
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let first = pool.acquire().await.unwrap();
    assert!(first.is_open());
    assert_eq!(pool.busy_count().await, 1);

    // The bound holds: NOWAIT at capacity fails immediately.
    let second = pool.acquire().await;
    assert!(matches!(second, Err(Error::PoolExhausted)));

    // Releasing makes the connection available again.
    first.release().await.unwrap();
    assert_eq!(pool.busy_count().await, 0);
    let third = pool.acquire().await.unwrap();
    assert!(third.is_open());

    drop(third);
    drop(pool);
    server.abort();
}

#[tokio::test]
async fn test_fetch_across_round_trips() {
    let (listener, connect_string) = bind_listener().await;
    let server = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        serve_handshake(&mut sock).await;

        // Execute: one prefetched row, more remain on the server.
        let (ptype, _, _) = read_packet(&mut sock, true).await;
        assert_eq!(ptype, TNS_PACKET_TYPE_DATA);
        let mut body = describe_info("N", ORA_TYPE_NUM_NUMBER as u8, 5, 0, 0);
        body.extend_from_slice(&row_header());
        body.write_u8(TNS_MSG_TYPE_ROW_DATA);
        body.write_bytes_with_length(&[0xC1, 0x02]);
        body.extend_from_slice(&ErrorBlock::success(5, 1).encode());
        write_data(&mut sock, &body).await;

        // Fetch: the final row plus end-of-data.
        let (ptype, _, _) = read_packet(&mut sock, true).await;
        assert_eq!(ptype, TNS_PACKET_TYPE_DATA);
        let mut body = row_header();
        body.write_u8(TNS_MSG_TYPE_ROW_DATA);
        body.write_bytes_with_length(&[0xC1, 0x03]);
        body.extend_from_slice(&ErrorBlock::no_data_found(5, 2).encode());
        write_data(&mut sock, &body).await;
    });

    let conn = Connection::connect(&connect_string, "scott", "tiger")
        .await
        .unwrap();
    let mut cursor = conn.cursor();
    cursor.execute("SELECT n FROM two_rows", &[]).await.unwrap();

    let rows = cursor.fetchall().await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get(0), Some(&OracleValue::Integer(1)));
    assert_eq!(rows[1].get(0), Some(&OracleValue::Integer(2)));

    server.await.unwrap();
}
