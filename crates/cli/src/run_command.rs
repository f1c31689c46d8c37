use std::{path::Path, sync::Arc};

use {
    anyhow::{Context, Result, bail},
    axum::Router,
    futures::future::join_all,
    tokio::{net::TcpListener, sync::oneshot, task::JoinHandle},
    tracing::{error, info, warn},
};

use {
    chatrelay_bridge::{Bridge, BridgeOptions},
    chatrelay_channels::{Channel, Client, Event, say},
    chatrelay_config::{RelayConfig, discover_and_load, load_config},
    chatrelay_telegram::{TelegramAccountConfig, TelegramClient},
};

/// Message text that shuts the relay down.
const LEAVE_COMMAND: &str = "LEAVE";

/// Load the config, bridge every configured chat, and relay until told to
/// stop or the bridge fails.
pub async fn run(config_path: Option<&Path>) -> Result<()> {
    let config = match config_path {
        Some(path) => load_config(path)?,
        None => {
            let (config, path) = discover_and_load()?;
            match path {
                Some(path) => info!(path = %path.display(), "loaded config"),
                None => info!("no config file found, using defaults"),
            }
            config
        },
    };

    #[cfg(feature = "metrics")]
    let _metrics = init_metrics(&config)?;

    let mut clients = Vec::new();
    let channels = match connect_all(&config, &mut clients).await {
        Ok(channels) => channels,
        Err(e) => {
            close_clients(&clients).await;
            return Err(e);
        },
    };

    let media = match serve_media(&config, &clients).await {
        Ok(media) => media,
        Err(e) => {
            close_clients(&clients).await;
            return Err(e);
        },
    };

    let bridge = Bridge::with_options(channels, BridgeOptions {
        name: config.bridge.name.clone(),
        history: config.bridge.history,
    });
    info!(bridge = %config.bridge.name, "bridge is up and running");
    for channel in bridge.channels() {
        info!(channel = channel.name(), service = channel.service_name(), "connected");
    }

    if let Some(greeting) = &config.bridge.greeting
        && let Err(e) = say(&bridge, greeting).await
    {
        warn!(error = %e, "failed to send greeting");
    }

    relay_until_stopped(&bridge).await;

    if let Err(e) = bridge.close().await {
        error!(error = %e, "bridge closed with error");
        let text = format!("Bridge closed with error: {e}");
        join_all(bridge.channels().iter().map(|ch| {
            let text = text.as_str();
            async move {
                if let Err(e) = say(ch.as_ref(), text).await {
                    warn!(channel = ch.name(), error = %e, "failed to announce bridge error");
                }
            }
        }))
        .await;
    }

    if let Some(media) = media {
        media.stop().await;
    }
    close_clients(&clients).await;
    info!("relay stopped");
    Ok(())
}

/// Log bridge events until a LEAVE message, Ctrl-C, or the bridge ending.
async fn relay_until_stopped(bridge: &Bridge) {
    loop {
        let event = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, shutting down");
                return;
            },
            event = bridge.receive() => event,
        };
        let event = match event {
            Ok(Some(event)) => event,
            Ok(None) => {
                info!("bridge stopped");
                return;
            },
            Err(e) => {
                warn!(error = %e, "bridge receive failed");
                return;
            },
        };
        info!(kind = event.kind(), event = ?event, "bridge event");

        if is_leave(&event) {
            if let Err(e) = say(bridge, "Good bye!").await {
                warn!(error = %e, "failed to say good bye");
            }
            return;
        }
    }
}

fn is_leave(event: &Event) -> bool {
    matches!(event, Event::Message(msg) if msg.text == LEAVE_COMMAND)
}

/// Connect each configured Telegram account and join its chats, in account
/// id order. Connected clients are pushed to `clients` even on failure so
/// the caller can close them.
async fn connect_all(
    config: &RelayConfig,
    clients: &mut Vec<TelegramClient>,
) -> Result<Vec<Arc<dyn Channel>>> {
    let mut accounts: Vec<_> = config.channels.telegram.iter().collect();
    accounts.sort_by(|a, b| a.0.cmp(b.0));

    let mut channels = Vec::new();
    for (account_id, value) in accounts {
        let account = TelegramAccountConfig::from_value(account_id, value.clone())?;
        let client = TelegramClient::connect(account_id, account)
            .await
            .with_context(|| format!("failed to connect telegram account {account_id}"))?;
        let joined = join_chats(&client).await;
        clients.push(client);
        channels.extend(joined?);
    }

    if channels.is_empty() {
        bail!("no chats configured; add telegram accounts with chats to the config");
    }
    Ok(channels)
}

async fn join_chats(client: &TelegramClient) -> Result<Vec<Arc<dyn Channel>>> {
    let mut channels = Vec::new();
    for chat in client.configured_chats() {
        let channel = client
            .join(chat)
            .await
            .with_context(|| format!("failed to join telegram chat {chat}"))?;
        channels.push(channel);
    }
    Ok(channels)
}

/// The HTTP server behind each account's `media_base_url`.
struct MediaServer {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl MediaServer {
    async fn stop(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.task.await {
            warn!(error = %e, "media server task failed");
        }
    }
}

/// Routes serving each account's files under `/telegram/<account>/media/`.
fn media_routes(clients: &[TelegramClient]) -> Router {
    clients.iter().fold(Router::new(), |router, client| {
        router.nest(
            &format!("/telegram/{}/media", client.account_id()),
            client.media_proxy().router(),
        )
    })
}

/// Start the media server when `http.listen` is configured.
async fn serve_media(
    config: &RelayConfig,
    clients: &[TelegramClient],
) -> Result<Option<MediaServer>> {
    let Some(listen) = config.http.listen.as_deref() else {
        return Ok(None);
    };
    let listener = TcpListener::bind(listen)
        .await
        .with_context(|| format!("failed to bind http.listen address {listen}"))?;
    info!(addr = %listener.local_addr()?, "serving telegram media");

    let app = media_routes(clients);
    let (shutdown, shutdown_rx) = oneshot::channel::<()>();
    let task = tokio::spawn(async move {
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await;
        if let Err(e) = served {
            error!(error = %e, "media server failed");
        }
    });
    Ok(Some(MediaServer { shutdown, task }))
}

async fn close_clients(clients: &[TelegramClient]) {
    for client in clients {
        if let Err(e) = client.close().await {
            warn!(account_id = client.account_id(), error = %e, "telegram client closed with error");
        }
    }
}

#[cfg(feature = "metrics")]
fn init_metrics(config: &RelayConfig) -> Result<chatrelay_metrics::MetricsHandle> {
    let listen = config
        .metrics
        .listen
        .as_deref()
        .map(str::parse)
        .transpose()
        .context("invalid metrics.listen address")?;
    let handle = chatrelay_metrics::init_metrics(chatrelay_metrics::MetricsRecorderConfig {
        enabled: config.metrics.enabled,
        listen,
        global_labels: vec![("bridge".into(), config.bridge.name.clone())],
    })?;
    if let Some(addr) = listen.filter(|_| handle.is_enabled()) {
        info!(%addr, "serving prometheus metrics");
    }
    Ok(handle)
}
