//! Lifecycle tests against an in-process scripted MySQL server.
//!
//! The server speaks just enough of the wire protocol (v10 handshake, OK and
//! ERR packets) to make the driver see login failures and statement errors
//! without a real database.

use simple_app::db::{ConnectionManager, LifecycleState};
use simple_app::error::{DbError, DbResult};
use simple_app::models::ConnectionConfig;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// How the scripted server answers every connection.
#[derive(Debug, Clone, Copy)]
enum Script {
    /// Reject the login with the given error.
    RejectLogin { code: u16, state: &'static str },
    /// Accept the login, answer the first `ok_commands` commands with OK and
    /// every later command with the given error.
    FailCommands {
        ok_commands: usize,
        code: u16,
        state: &'static str,
    },
}

async fn spawn_server(script: Script) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(serve(stream, script));
        }
    });
    port
}

async fn serve(mut stream: TcpStream, script: Script) -> std::io::Result<()> {
    write_packet(&mut stream, 0, &handshake()).await?;
    let (seq, _login) = read_packet(&mut stream).await?;

    match script {
        Script::RejectLogin { code, state } => {
            write_packet(&mut stream, seq.wrapping_add(1), &err_packet(code, state)).await
        }
        Script::FailCommands {
            ok_commands,
            code,
            state,
        } => {
            write_packet(&mut stream, seq.wrapping_add(1), &ok_packet()).await?;
            let mut handled = 0;
            loop {
                let (seq, payload) = read_packet(&mut stream).await?;
                // COM_QUIT
                if payload.first() == Some(&0x01) {
                    return Ok(());
                }
                let reply = if handled < ok_commands {
                    ok_packet()
                } else {
                    err_packet(code, state)
                };
                handled += 1;
                write_packet(&mut stream, seq.wrapping_add(1), &reply).await?;
            }
        }
    }
}

fn handshake() -> Vec<u8> {
    let mut payload = vec![0x0a];
    payload.extend_from_slice(b"8.0.36-scripted\0");
    payload.extend_from_slice(&7u32.to_le_bytes());
    payload.extend_from_slice(b"abcdefgh");
    payload.push(0);
    // LONG_PASSWORD | FOUND_ROWS | LONG_FLAG | CONNECT_WITH_DB | PROTOCOL_41
    // | TRANSACTIONS | SECURE_CONNECTION
    payload.extend_from_slice(&0xA20Fu16.to_le_bytes());
    // utf8mb4_general_ci
    payload.push(45);
    // SERVER_STATUS_AUTOCOMMIT
    payload.extend_from_slice(&0x0002u16.to_le_bytes());
    // PLUGIN_AUTH
    payload.extend_from_slice(&0x0008u16.to_le_bytes());
    payload.push(21);
    payload.extend_from_slice(&[0; 10]);
    payload.extend_from_slice(b"ijklmnopqrst\0");
    payload.extend_from_slice(b"mysql_native_password\0");
    payload
}

fn ok_packet() -> Vec<u8> {
    vec![0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00]
}

fn err_packet(code: u16, state: &str) -> Vec<u8> {
    let mut payload = vec![0xff];
    payload.extend_from_slice(&code.to_le_bytes());
    payload.push(b'#');
    payload.extend_from_slice(state.as_bytes());
    payload.extend_from_slice(format!("scripted error {code}").as_bytes());
    payload
}

async fn read_packet(stream: &mut TcpStream) -> std::io::Result<(u8, Vec<u8>)> {
    let mut header = [0u8; 4];
    stream.read_exact(&mut header).await?;
    let len = u32::from_le_bytes([header[0], header[1], header[2], 0]) as usize;
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await?;
    Ok((header[3], payload))
}

async fn write_packet(stream: &mut TcpStream, seq: u8, payload: &[u8]) -> std::io::Result<()> {
    let len = (payload.len() as u32).to_le_bytes();
    stream.write_all(&[len[0], len[1], len[2], seq]).await?;
    stream.write_all(payload).await?;
    stream.flush().await
}

fn config_for(port: u16) -> ConnectionConfig {
    ConnectionConfig::new("root", "wrong", "127.0.0.1", port, "app").with_connect_timeout_secs(2)
}

#[tokio::test]
async fn test_access_denied_fails_startup() {
    let port = spawn_server(Script::RejectLogin {
        code: 1045,
        state: "28000",
    })
    .await;
    let manager = ConnectionManager::new(config_for(port));

    let err = manager.startup().await.unwrap_err();
    assert!(matches!(err, DbError::Startup { port: p, .. } if p == port));
    assert!(!manager.is_connected().await);
    assert_eq!(manager.state().await, LifecycleState::Disposed);
}

#[tokio::test]
async fn test_login_failures_ping_false() {
    for (code, state) in [(1044, "42000"), (1045, "28000"), (1049, "42000")] {
        let port = spawn_server(Script::RejectLogin { code, state }).await;
        let manager = ConnectionManager::new(config_for(port));

        assert!(!manager.ping().await.unwrap(), "error {code} should ping false");
        manager.shutdown().await;
    }
}

#[tokio::test]
async fn test_syntax_error_propagates_from_ping() {
    // The driver's session setup statement is the first command; fail it
    let port = spawn_server(Script::FailCommands {
        ok_commands: 0,
        code: 1064,
        state: "42000",
    })
    .await;
    let manager = ConnectionManager::new(config_for(port));

    let result = manager.ping().await;
    assert!(matches!(result, Err(DbError::Sqlx(sqlx::Error::Database(_)))));

    let err = manager.startup().await.unwrap_err();
    assert!(matches!(err, DbError::Sqlx(sqlx::Error::Database(_))));
    assert!(!manager.is_connected().await);
}

#[tokio::test]
async fn test_with_session_closes_when_work_fails() {
    // Accept the setup statement, reject everything after it
    let port = spawn_server(Script::FailCommands {
        ok_commands: 1,
        code: 1146,
        state: "42S02",
    })
    .await;
    let manager = ConnectionManager::new(config_for(port));

    let result: DbResult<u64> = manager
        .with_session(|s| {
            Box::pin(async move { s.execute("SELECT * FROM missing_table").await })
        })
        .await;

    assert!(matches!(result, Err(DbError::Sqlx(sqlx::Error::Database(_)))));
    assert_eq!(manager.open_sessions(), 0);
    manager.shutdown().await;
}

#[tokio::test]
async fn test_with_session_closes_when_work_panics() {
    let port = spawn_server(Script::FailCommands {
        ok_commands: 1,
        code: 1146,
        state: "42S02",
    })
    .await;
    let manager = Arc::new(ConnectionManager::new(config_for(port)));

    let task = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move {
            let result: DbResult<()> = manager
                .with_session(|s| {
                    Box::pin(async move {
                        assert!(s.id().is_nil(), "work failed");
                        Ok(())
                    })
                })
                .await;
            result
        })
    };

    assert!(task.await.unwrap_err().is_panic());
    assert_eq!(manager.open_sessions(), 0);
    manager.shutdown().await;
}
