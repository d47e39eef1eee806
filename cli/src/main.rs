// nudge — command-line companion for the push notification core
//
// Inspect VAPID keys, preview the notification a payload produces, and run
// the subscription and delivery flow end to end against an in-memory origin.

mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use nudge_core::sim::{SimHost, SimNotification, SimOrigin, SimPage};
use nudge_core::{
    encode_base64url, ClickOutcome, DeliveryHandler, InitOutcome, NotificationOptions,
    PermissionState, PushDelivery, PushOutcome, PushPayload, SubscribeOutcome,
    SubscriptionController, VapidPublicKey,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "nudge")]
#[command(about = "Nudge — web push subscription and delivery tooling", long_about = None)]
#[command(version)]
struct Cli {
    /// Also write logs to <DIR>/nudge.log
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a base64url VAPID public key
    DecodeKey { key: String },
    /// Show the notification a push payload would produce
    Render {
        /// Payload JSON; read from --file when omitted
        payload: Option<String>,
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Run subscribe, push and click against an in-memory origin
    Simulate {
        /// Open pages sharing the origin
        #[arg(short, long, default_value_t = 2, value_parser = clap::value_parser!(u16).range(1..=16))]
        pages: u16,
        /// Payload JSON to push
        #[arg(long, default_value = r#"{"title":"Hello","body":"From nudge"}"#)]
        payload: String,
        /// Answer the permission prompt with "denied"
        #[arg(long)]
        deny: bool,
    },
    /// Configure settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    Set { key: String, value: String },
    Get { key: String },
    List,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = init_logging(cli.log_dir.as_deref())?;

    match cli.command {
        Commands::DecodeKey { key } => cmd_decode_key(&key),
        Commands::Render { payload, file } => cmd_render(payload, file),
        Commands::Simulate {
            pages,
            payload,
            deny,
        } => cmd_simulate(pages as usize, payload, deny).await,
        Commands::Config { action } => cmd_config(action),
    }
}

fn init_logging(
    log_dir: Option<&std::path::Path>,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    use tracing_subscriber::prelude::*;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let stderr = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).context("Failed to create log directory")?;
            let appender = tracing_appender::rolling::never(dir, "nudge.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(writer),
                )
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry().with(filter).with(stderr).init();
            Ok(None)
        }
    }
}

fn cmd_decode_key(key: &str) -> Result<()> {
    let key = VapidPublicKey::from_base64url(key)?;
    let bytes = key.as_bytes();

    println!("{}", "VAPID public key".bold());
    println!("  Length:    {} bytes", bytes.len());
    println!("  Hex:       {}", hex::encode(bytes).bright_yellow());
    println!("  Canonical: {}", key.to_base64url().bright_cyan());
    if key.looks_like_p256() {
        println!("  {} Uncompressed P-256 point", "✓".green());
    } else {
        println!(
            "  {} Not an uncompressed P-256 point; push services will reject it",
            "⚠".bright_red()
        );
    }
    Ok(())
}

fn cmd_render(payload: Option<String>, file: Option<PathBuf>) -> Result<()> {
    let raw = match (payload, file) {
        (Some(payload), _) => payload,
        (None, Some(path)) => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        (None, None) => anyhow::bail!("Provide a payload or --file"),
    };

    let config = config::Config::load()?;
    let payload = PushPayload::decode(raw.as_bytes())?;
    let options = NotificationOptions::from_payload(
        &payload,
        &config.delivery,
        nudge_core::protocol::now_millis(),
    );

    println!("{} {}", "Title:".bold(), payload.title.bright_cyan());
    println!("{}", serde_json::to_string_pretty(&options)?);
    Ok(())
}

async fn cmd_simulate(pages: usize, payload: String, deny: bool) -> Result<()> {
    let mut config = config::Config::load()?;
    if config.controller.vapid_public_key.is_empty() {
        let mut demo = vec![0x04u8; 65];
        demo[1] = 0x2a;
        config.controller.vapid_public_key = encode_base64url(&demo);
        println!("{}", "(no vapid_public_key configured; using a demo key)".dimmed());
    }

    tracing::debug!("Simulating {} page(s), deny={}", pages, deny);
    let origin = SimOrigin::new();
    if deny {
        origin.set_permission(PermissionState::Denied);
    }

    println!("{}", "Pages".bold());
    let mut controllers: Vec<(SimPage, SubscriptionController<SimPage, SimHost>)> = Vec::new();
    for i in 0..pages {
        let url = if i == 0 {
            "https://app.example.com/".to_string()
        } else {
            format!("https://app.example.com/tab-{}", i)
        };
        let page = origin.open_page(&url);
        let controller = SubscriptionController::new(
            page.clone(),
            SimHost::default(),
            config.controller.clone(),
        );
        match controller.initialize().await {
            InitOutcome::Ready(status) => {
                println!("  {} {} {} ({})", "✓".green(), page.id(), url, status)
            }
            other => println!("  {} {} {:?}", "✗".red(), page.id(), other),
        }
        controllers.push((page, controller));
    }
    println!();

    println!("{}", "Subscribe".bold());
    let (first_page, first) = &controllers[0];
    match first.subscribe().await {
        SubscribeOutcome::Subscribed(descriptor) => {
            println!("  {} {} subscribed", "✓".green(), first_page.id());
            println!("    endpoint: {}", descriptor.endpoint.bright_cyan());
            for event in first.host().events() {
                println!("    host event: {} {}", event.name().bright_yellow(), event.payload());
            }
        }
        SubscribeOutcome::PermissionRefused(permission) => {
            println!("  {} permission {}", "✗".red(), permission);
        }
        other => println!("  {} {:?}", "✗".red(), other),
    }
    for (page, controller) in &controllers[1..] {
        if let Some(status) = controller.refresh_status().await {
            println!("  {} {} now shows {}", "•".dimmed(), page.id(), status);
        }
    }
    println!();

    println!("{}", "Push".bold());
    let handler = DeliveryHandler::new(origin.worker_scope(), config.delivery.clone());
    match handler.on_push(PushDelivery::with_data(payload)).await {
        PushOutcome::Delivered { pages, active } => {
            println!(
                "  {} shown; broadcast to {} page(s); {} active",
                "✓".green(),
                pages,
                active
            );
        }
        other => println!("  {} {:?}", "✗".red(), other),
    }
    for (page, _) in &controllers {
        let kinds: Vec<&str> = page.inbox().iter().map(|m| m.kind()).collect();
        println!("  {} {}", page.id(), kinds.join(", ").dimmed());
    }
    println!();

    let shown = origin.shown_notifications();
    if let Some(notification) = shown.last() {
        println!("{}", "Click".bold());
        let clicked = SimNotification::new(Some(notification.options.data.clone()));
        match handler.on_notification_click(&clicked).await {
            ClickOutcome::Focused(id) => println!("  {} focused {}", "✓".green(), id),
            ClickOutcome::Opened(url) => println!("  {} opened {}", "✓".green(), url),
            ClickOutcome::Failed(reason) => println!("  {} {}", "✗".red(), reason),
        }
    }

    Ok(())
}

fn cmd_config(action: ConfigAction) -> Result<()> {
    let mut config = config::Config::load()?;

    match action {
        ConfigAction::Set { key, value } => {
            config.set(&key, &value)?;
            config.save_to(&config::Config::config_file()?)?;
            println!("{} Set {} = {}", "✓".green(), key.bright_cyan(), value);
        }

        ConfigAction::Get { key } => {
            if let Some(value) = config.get(&key) {
                println!("{} = {}", key.bright_cyan(), value);
            } else {
                anyhow::bail!("Unknown config key: {}", key);
            }
        }

        ConfigAction::List => {
            println!("{}", "Configuration".bold());
            println!();
            for (key, value) in config.list() {
                let value = if value.is_empty() {
                    "(unset)".dimmed().to_string()
                } else {
                    value
                };
                println!("  {:<20} {}", key.bright_cyan(), value);
            }
        }
    }

    Ok(())
}
