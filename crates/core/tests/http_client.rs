use std::time::Duration;

use anyhow::Result;
use foundry_core::{
    identity::{Identity, IdentityStore},
    net::{AdminAction, ClientError, ClientEvent, Command, Dispatcher, GameClient, Poller},
    Phase,
};
use tempfile::tempdir;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
    sync::mpsc,
    time::{sleep, timeout},
};

const STATE_BODY: &str = r#"{"phase": 2, "turn": 4, "items_meta": {},
    "player": {"name": "Acme", "money": 5, "inventory": {}, "factories": [], "land_limit": 3}}"#;

const ADMIN_BODY: &str = r#"{"phase": 3, "turn": 2, "logs": ["[10:00:00] Market opened"],
    "players": [{"name": "Acme", "money": 900, "land": "1/3", "inventory_count": 4}],
    "market_prices": {"iron_0": 120}}"#;

/// Answer every connection with the response `route` picks for the request line.
async fn serve(route: fn(&str) -> (u16, &'static str)) -> Result<String> {
    serve_with_delay(route, |_| Duration::ZERO).await
}

/// Like [`serve`], holding each reply back for the time `delay` picks.
async fn serve_with_delay(
    route: fn(&str) -> (u16, &'static str),
    delay: fn(&str) -> Duration,
) -> Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let Ok(request) = read_request(&mut socket).await else {
                    return;
                };
                let request_line = request.lines().next().unwrap_or_default().to_string();
                let (status, body) = route(&request_line);
                sleep(delay(&request_line)).await;
                let response = format!(
                    "HTTP/1.1 {status} X\r\nContent-Type: application/json\r\n\
                     Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    Ok(format!("http://{addr}"))
}

/// Read headers plus a `Content-Length` body so the socket closes cleanly.
async fn read_request(socket: &mut tokio::net::TcpStream) -> std::io::Result<String> {
    let mut data = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let read = socket.read(&mut chunk).await?;
        if read == 0 {
            break;
        }
        data.extend_from_slice(&chunk[..read]);
        let text = String::from_utf8_lossy(&data);
        if let Some(end) = text.find("\r\n\r\n") {
            let length = text[..end]
                .lines()
                .filter_map(|line| line.split_once(':'))
                .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
                .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if data.len() >= end + 4 + length {
                break;
            }
        }
    }
    Ok(String::from_utf8_lossy(&data).into_owned())
}

fn route(request_line: &str) -> (u16, &'static str) {
    if request_line.starts_with("GET /api/state?player_id=p-1 ") {
        (200, STATE_BODY)
    } else if request_line.starts_with("GET /api/state?player_id=slow ") {
        (200, r#"{"phase": 2, "turn": 1}"#)
    } else if request_line.starts_with("GET /api/state ") {
        (200, r#"{"phase": 1}"#)
    } else if request_line.starts_with("POST /api/register") {
        (200, r#"{"player_id": "p-1"}"#)
    } else if request_line.starts_with("POST /api/demolish") {
        (200, r#"{"message": "Facility demolished"}"#)
    } else if request_line.starts_with("GET /admin/data") {
        (200, ADMIN_BODY)
    } else if request_line.starts_with("POST /admin/next_phase") {
        (200, r#"{"status": "ok"}"#)
    } else if request_line.starts_with("POST /admin/reset") {
        (403, r#"{"detail": "Reset is locked"}"#)
    } else if request_line.starts_with("POST /api/upgrade") {
        (400, r#"{"detail": "Not enough money"}"#)
    } else {
        (500, "oops")
    }
}

#[tokio::test]
async fn fetch_state_scopes_to_player() -> Result<()> {
    let base = serve(route).await?;
    let client = GameClient::new(base, Some(Duration::from_secs(5)))?;

    let anonymous = client.fetch_state(None).await?;
    assert_eq!(anonymous.phase, Phase::News);
    assert!(anonymous.player.is_none());

    let scoped = client.fetch_state(Some("p-1")).await?;
    assert_eq!(scoped.turn, 4);
    assert_eq!(scoped.player.map(|player| player.name).as_deref(), Some("Acme"));
    Ok(())
}

#[tokio::test]
async fn submit_maps_message_and_detail() -> Result<()> {
    let base = serve(route).await?;
    let client = GameClient::new(base, None)?;

    let ack = client
        .submit(
            "p-1",
            &Command::Demolish {
                factory_id: "f1".to_string(),
            },
        )
        .await?;
    assert_eq!(ack.message.as_deref(), Some("Facility demolished"));

    let err = client
        .submit(
            "p-1",
            &Command::Upgrade {
                factory_id: "f1".to_string(),
                payment_materials: vec!["iron_1".to_string()],
            },
        )
        .await
        .expect_err("upgrade is refused");
    match err {
        ClientError::Rejected { status, detail } => {
            assert_eq!(status, 400);
            assert_eq!(detail, "Not enough money");
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let err = client
        .submit(
            "p-1",
            &Command::BankSell {
                item_id: "iron_0".to_string(),
                quantity: 2,
            },
        )
        .await
        .expect_err("server error");
    assert!(matches!(err, ClientError::Rejected { status: 500, .. }));
    assert!(err.to_string().contains("HTTP 500"));
    Ok(())
}

#[tokio::test]
async fn transport_failure_is_generic() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);

    let client = GameClient::new(format!("http://{addr}"), Some(Duration::from_secs(2)))?;
    let err = client.fetch_state(None).await.expect_err("nothing listens");
    assert!(matches!(err, ClientError::Transport(_)));
    assert_eq!(err.user_message(), "Connection error, please try again");
    Ok(())
}

async fn next_event(events: &mut mpsc::Receiver<ClientEvent>) -> Result<ClientEvent> {
    timeout(Duration::from_secs(5), events.recv())
        .await?
        .ok_or_else(|| anyhow::anyhow!("event channel closed"))
}

#[tokio::test]
async fn accepted_command_triggers_a_poll() -> Result<()> {
    let base = serve(route).await?;
    let dir = tempdir()?;
    let identity = IdentityStore::open(dir.path().join("identity.json"));
    identity.set(Identity::new("p-1", "Acme"))?;

    let (tx, mut events) = mpsc::channel(8);
    let poller = Poller::new(
        GameClient::new(base, None)?,
        identity,
        tx,
        Duration::from_secs(3600),
    );
    let dispatcher = Dispatcher::new(poller);

    dispatcher
        .submit(Command::Demolish {
            factory_id: "f1".to_string(),
        })?
        .await?;

    let mut accepted = false;
    let mut polled = false;
    for _ in 0..2 {
        match next_event(&mut events).await? {
            ClientEvent::Accepted { message, .. } => {
                assert_eq!(message.as_deref(), Some("Facility demolished"));
                accepted = true;
            }
            ClientEvent::Snapshot {
                snapshot,
                player_id,
                ..
            } => {
                assert_eq!(player_id.as_deref(), Some("p-1"));
                assert_eq!(snapshot.turn, 4);
                polled = true;
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
    assert!(accepted && polled);
    Ok(())
}

#[tokio::test]
async fn rejected_command_does_not_poll() -> Result<()> {
    let base = serve(route).await?;
    let dir = tempdir()?;
    let identity = IdentityStore::open(dir.path().join("identity.json"));
    identity.set(Identity::new("p-1", "Acme"))?;

    let (tx, mut events) = mpsc::channel(8);
    let poller = Poller::new(GameClient::new(base, None)?, identity, tx, Duration::from_secs(3600));
    let dispatcher = Dispatcher::new(poller);

    dispatcher
        .submit(Command::Upgrade {
            factory_id: "f1".to_string(),
            payment_materials: Vec::new(),
        })?
        .await?;

    match next_event(&mut events).await? {
        ClientEvent::Failed { error, .. } => assert_eq!(error.user_message(), "Not enough money"),
        other => panic!("unexpected event: {other:?}"),
    }
    assert!(timeout(Duration::from_millis(300), events.recv()).await.is_err());

    let sell = dispatcher.submit(Command::BankSell {
        item_id: "iron_0".to_string(),
        quantity: 0,
    });
    assert!(matches!(sell, Err(ClientError::Precondition(_))));
    Ok(())
}

#[tokio::test]
async fn registration_stores_identity() -> Result<()> {
    let base = serve(route).await?;
    let dir = tempdir()?;
    let path = dir.path().join("identity.json");
    let identity = IdentityStore::open(&path);

    let (tx, mut events) = mpsc::channel(8);
    let poller = Poller::new(
        GameClient::new(base, None)?,
        identity.clone(),
        tx,
        Duration::from_secs(3600),
    );
    let dispatcher = Dispatcher::new(poller);
    assert!(matches!(
        dispatcher.register("   "),
        Err(ClientError::Precondition(_))
    ));
    assert!(matches!(
        dispatcher.submit(Command::Demolish {
            factory_id: "f1".to_string()
        }),
        Err(ClientError::NotRegistered)
    ));

    dispatcher.register(" Acme ")?.await?;
    let mut registered = false;
    for _ in 0..2 {
        match next_event(&mut events).await? {
            ClientEvent::Registered(stored) => {
                assert_eq!(stored.player_id, "p-1");
                assert_eq!(stored.name, "Acme");
                registered = true;
            }
            ClientEvent::Snapshot { player_id, .. } => {
                assert_eq!(player_id.as_deref(), Some("p-1"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
    assert!(registered);
    assert_eq!(identity.player_id().as_deref(), Some("p-1"));
    assert!(path.exists());
    Ok(())
}

#[tokio::test]
async fn snapshots_arrive_in_completion_order() -> Result<()> {
    let base = serve_with_delay(route, |request_line| {
        if request_line.contains("player_id=slow") {
            Duration::from_millis(200)
        } else {
            Duration::ZERO
        }
    })
    .await?;
    let dir = tempdir()?;
    let identity = IdentityStore::open(dir.path().join("identity.json"));
    let (tx, mut events) = mpsc::channel(8);
    let poller = Poller::new(
        GameClient::new(base, None)?,
        identity.clone(),
        tx,
        Duration::from_secs(3600),
    );

    identity.set(Identity::new("slow", "Acme"))?;
    let slow = poller.poll_now();
    identity.set(Identity::new("p-1", "Acme"))?;
    let fast = poller.poll_now();

    let mut turns = Vec::new();
    for _ in 0..2 {
        match next_event(&mut events).await? {
            ClientEvent::Snapshot { snapshot, .. } => turns.push(snapshot.turn),
            other => panic!("unexpected event: {other:?}"),
        }
    }
    assert_eq!(turns, [4, 1]);
    slow.await?;
    fast.await?;
    Ok(())
}

#[tokio::test]
async fn admin_dashboard_polls_and_acts() -> Result<()> {
    let base = serve(route).await?;
    let client = GameClient::new(base, None)?;

    let data = client.fetch_admin().await?;
    assert_eq!(data.turn, 2);
    assert_eq!(data.players[0].inventory_count, 4);
    assert_eq!(client.next_phase().await?.message, None);
    let err = client.reset().await.expect_err("reset is refused");
    assert_eq!(err.user_message(), "Reset is locked");

    let (tx, mut events) = mpsc::channel(8);
    let dispatcher = Dispatcher::new(Poller::admin(client, tx, Duration::from_secs(3600)));
    assert!(matches!(
        dispatcher.register("Acme"),
        Err(ClientError::Precondition(_))
    ));
    assert!(matches!(
        dispatcher.submit(Command::Demolish {
            factory_id: "f1".to_string()
        }),
        Err(ClientError::NotRegistered)
    ));

    dispatcher.admin(AdminAction::NextPhase).await?;
    let mut accepted = false;
    let mut polled = false;
    for _ in 0..2 {
        match next_event(&mut events).await? {
            ClientEvent::Accepted { action, .. } => {
                assert_eq!(action, "next phase");
                accepted = true;
            }
            ClientEvent::AdminSnapshot { snapshot, .. } => {
                assert_eq!(snapshot.market_prices["iron_0"], 120);
                polled = true;
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
    assert!(accepted && polled);

    dispatcher.admin(AdminAction::Reset).await?;
    match next_event(&mut events).await? {
        ClientEvent::Failed { action, error } => {
            assert_eq!(action, "reset");
            assert_eq!(error.user_message(), "Reset is locked");
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert!(timeout(Duration::from_millis(300), events.recv()).await.is_err());
    Ok(())
}
