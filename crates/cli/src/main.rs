//! Composition root: load config, wire every component, serve the
//! connector WebSocket and the admin API until shutdown.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use {
    clap::{Parser, Subcommand},
    tracing::{info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use {
    mochi_auth::{AclChecker, TokenManager},
    mochi_bot::{AdapterGroupSink, BotSurface, CommandContext, LoggingAdapter},
    mochi_config::MochiConfig,
    mochi_hub::{
        Auditor, ConnectionChatSink, Hub, HubState, PendingOpsEngine, ServerManager,
        SubscriptionRegistry,
    },
    mochi_routing::MessageRouter,
    mochi_store::SqliteStore,
};

#[derive(Parser)]
#[command(name = "mochi-link", about = "Mochi-Link — Minecraft server management hub")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error); overrides config.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file path (overrides discovery).
    #[arg(long, global = true, env = "MOCHI_LINK_CONFIG")]
    config: Option<std::path::PathBuf>,

    /// WebSocket port (overrides config).
    #[arg(long, global = true)]
    ws_port: Option<u16>,

    /// HTTP admin API port (overrides config).
    #[arg(long, global = true)]
    http_port: Option<u16>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the hub (default when no subcommand is given).
    Serve,
    /// Interactive operator console: type mochi.* commands on stdin.
    Console {
        /// Operator identity to act as.
        #[arg(long, default_value = "console")]
        user: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match cli.config {
        Some(ref path) => mochi_config::load_config(path)?,
        None => mochi_config::discover_and_load(),
    };

    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("mochi_link=info,{level}")));
    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run(cli, config))
}

async fn run(cli: Cli, mut config: MochiConfig) -> anyhow::Result<()> {
    if let Some(port) = cli.ws_port {
        config.ws.port = port;
    }
    if let Some(port) = cli.http_port {
        config.http.port = port;
    }

    // ── Storage and core components ──────────────────────────────────────

    let db_url = database_url(&config.db.path);
    let store = Arc::new(SqliteStore::new(&db_url, &config.db.prefix).await?);
    info!(path = %config.db.path, prefix = %config.db.prefix, "store ready");

    let tokens = Arc::new(TokenManager::new(
        Arc::clone(&store),
        config.security.token_expiry,
    ));
    let acl = Arc::new(AclChecker::new(Arc::clone(&store)));
    let auditor = Arc::new(Auditor::new(Arc::clone(&store)));
    let engine = Arc::new(PendingOpsEngine::new(
        Arc::clone(&store),
        Arc::clone(&auditor),
    ));
    let subscriptions = Arc::new(SubscriptionRegistry::new());
    let manager = Arc::new(ServerManager::new(
        Arc::clone(&store),
        Arc::clone(&tokens),
        Arc::clone(&acl),
        Arc::clone(&auditor),
        engine,
        subscriptions,
    ));

    // Chat routing: connector side injects into live connections, group
    // side goes out through the bot adapter.
    let router = Arc::new(MessageRouter::new(
        Arc::clone(&store),
        Arc::new(ConnectionChatSink::new(Arc::clone(&manager))),
        Arc::new(AdapterGroupSink::new(LoggingAdapter)),
    ));

    let state = HubState::new(
        Arc::clone(&manager),
        Arc::clone(&tokens),
        Arc::clone(&router),
        config.security.max_connections,
        config.monitoring.report_interval_sec,
    );
    let hub = Hub::new(Arc::clone(&state), Arc::clone(&acl), Arc::clone(&auditor));

    if let Some(Commands::Console { user }) = cli.command {
        return console(hub, router, user).await;
    }

    // ── Background maintenance ───────────────────────────────────────────

    {
        let store = Arc::clone(&store);
        let retention_days = i64::from(config.logging.audit_retention_days);
        tokio::spawn(async move {
            let day = Duration::from_secs(24 * 60 * 60);
            loop {
                let cutoff = mochi_common::now_ms() - retention_days * 86_400_000;
                match store.purge_audit_older_than(cutoff).await {
                    Ok(0) => {},
                    Ok(purged) => info!(purged, "audit retention purge"),
                    Err(e) => warn!(error = %e, "audit retention purge failed"),
                }
                tokio::time::sleep(day).await;
            }
        });
    }
    {
        let router = Arc::clone(&router);
        tokio::spawn(async move {
            let interval = Duration::from_secs(300);
            loop {
                tokio::time::sleep(interval).await;
                router.cleanup_rate_windows(Duration::from_secs(3600));
            }
        });
    }

    // ── Listeners ────────────────────────────────────────────────────────

    if config.ws.tls.is_some() {
        // No half-configured mode: either serve what the operator asked
        // for or refuse to start.
        anyhow::bail!(
            "ws.tls is configured but this build does not terminate TLS; \
             remove the section or front the hub with a TLS proxy"
        );
    }

    let ws_addr: SocketAddr = format!("{}:{}", config.ws.host, config.ws.port).parse()?;
    let http_addr: SocketAddr = format!("{}:{}", config.ws.host, config.http.port).parse()?;

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });
    let wait = |mut rx: tokio::sync::watch::Receiver<bool>| async move {
        let _ = rx.wait_for(|stop| *stop).await;
    };

    let ws_task = tokio::spawn(mochi_hub::run_ws_server(
        Arc::clone(&state),
        ws_addr,
        wait(shutdown_rx.clone()),
    ));
    let rate_limit = Some(mochi_web::ApiRateLimit {
        window_ms: config.security.rate_limit.window_ms,
        max_requests: config.security.rate_limit.max_requests,
    });
    let http_task = tokio::spawn(mochi_web::run_http_server(
        Arc::clone(&hub),
        http_addr,
        config.http.cors,
        rate_limit,
        wait(shutdown_rx.clone()),
    ));

    info!(
        ws = %ws_addr,
        http = %http_addr,
        "Mochi-Link hub running"
    );

    let (ws_result, http_result) = tokio::join!(ws_task, http_task);
    ws_result??;
    http_result??;

    // Give in-flight store work a moment before exit.
    let _ = shutdown_rx.wait_for(|stop| *stop).await;
    tokio::time::timeout(Duration::from_secs(10), store.pool().close())
        .await
        .ok();
    info!("hub stopped");
    Ok(())
}

/// Read operator commands from stdin and print the replies.
async fn console(hub: Arc<Hub>, router: Arc<MessageRouter>, user: String) -> anyhow::Result<()> {
    use tokio::io::{AsyncBufReadExt, BufReader};

    let surface = BotSurface::new(hub, router);
    let ctx = CommandContext {
        user_id: user,
        user_name: "console".into(),
        group_id: None,
    };

    println!("mochi-link console — type mochi.help for commands, ctrl-d to exit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match surface.handle(&ctx, line).await {
            Some(reply) => println!("{reply}"),
            None => println!("(not a mochi.* command)"),
        }
    }
    Ok(())
}

fn database_url(path: &str) -> String {
    if path.starts_with("sqlite:") {
        path.to_string()
    } else {
        format!("sqlite://{path}?mode=rwc")
    }
}
