mod api;
mod app;
mod bridge;
mod dispatcher;
mod executor;
mod logging;

#[cfg(test)]
mod testutil;

use app::App;
use beacon_core::{
    config::{self, shellexpand},
    notification::ScheduleRequest,
    time::format_iso,
};
use clap::{Parser, Subcommand};
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser)]
#[command(
    name = "beacon",
    version,
    about = "Beacon: durable reminder scheduling and push delivery"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file.
    #[arg(short, long, default_value = "config.toml", env = "BEACON_CONFIG")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon: sweep loop, background worker, and HTTP API.
    Serve,
    /// Push every due notification once and exit (for cron).
    Sweep,
    /// Schedule a reminder for a task.
    Schedule {
        /// Task id. Scheduling again replaces the previous reminder.
        task_id: String,
        /// Notification title.
        title: String,
        /// Event date, `YYYY-MM-DD`.
        date: String,
        /// Event time, `HH:MM`.
        time: String,
        /// Minutes before the event to notify.
        #[arg(short, long, default_value_t = 0)]
        reminder: i64,
        /// Notification body. Defaults to the configured template.
        #[arg(short, long)]
        body: Option<String>,
        /// Bind to one subscription endpoint instead of broadcasting.
        #[arg(short, long)]
        endpoint: Option<String>,
    },
    /// Cancel a task's reminder.
    Cancel {
        task_id: String,
    },
    /// Show configuration, pending schedules, and subscriptions.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load(&cli.config)?;

    let serving = matches!(cli.command, Commands::Serve);
    let _log_guard = logging::init(&cfg.beacon, serving && cfg.beacon.log_to_file);

    match cli.command {
        Commands::Serve => serve(cfg).await?,
        Commands::Sweep => {
            let app = App::build(cfg, false).await?;
            let sent = app.dispatcher.check_and_send_due_notifications().await;
            println!("sent {sent} notification(s)");
        }
        Commands::Schedule {
            task_id,
            title,
            date,
            time,
            reminder,
            body,
            endpoint,
        } => {
            let app = App::build(cfg, false).await?;
            // Immediate deliveries land on the bridge; echo them to the terminal.
            let _echo = app.bridge.subscribe(|event| {
                println!("🔔 {}: {}", event.payload.title, event.payload.body);
            });
            let req = ScheduleRequest {
                task_id,
                title,
                body,
                scheduled_date: date,
                scheduled_time: time,
                reminder_minutes: Some(reminder),
                subscription_endpoint: endpoint,
            };
            let scheduled = app.dispatcher.try_schedule(&req).await?;
            println!(
                "{} ({:?} via {}) fires at {}",
                scheduled.id,
                scheduled.handling,
                scheduled.tier,
                format_iso(scheduled.fire_at)
            );
        }
        Commands::Cancel { task_id } => {
            let app = App::build(cfg, false).await?;
            app.dispatcher.cancel_notification(&task_id).await;
            println!("cancelled {task_id}");
        }
        Commands::Status => status(&cli.config, cfg).await?,
    }

    Ok(())
}

/// Run until Ctrl-C.
async fn serve(cfg: config::Config) -> anyhow::Result<()> {
    let app = App::build(cfg, true).await?;
    let cfg = &app.config;

    info!(
        "{} running | store: {:?} | sweep: {} | worker: {} | api: {}",
        cfg.beacon.name,
        cfg.store.backend,
        if cfg.scheduler.enabled { "on" } else { "off" },
        if app.worker.is_some() { "on" } else { "off" },
        if cfg.api.enabled {
            format!("{}:{}", cfg.api.host, cfg.api.port)
        } else {
            "off".to_string()
        },
    );

    // Locally fired notifications have no screen to go to; log them.
    let _log_sink = app.bridge.subscribe(|event| {
        info!(
            "notification fired: {} | {} (tag={})",
            event.payload.title,
            event.payload.body,
            event.payload.tag.as_deref().unwrap_or("-")
        );
    });

    let sweep_handle = if cfg.scheduler.enabled {
        let dispatcher = app.dispatcher.clone();
        let poll_secs = cfg.scheduler.poll_interval_secs;
        Some(tokio::spawn(async move {
            executor::sweep_loop(dispatcher, poll_secs).await;
        }))
    } else {
        None
    };

    let api_handle = if cfg.api.enabled {
        let state = api::ApiState::new(
            app.dispatcher.clone(),
            app.worker.clone(),
            &cfg.api.api_key,
            Duration::from_millis(cfg.worker.confirm_timeout_ms),
        );
        let api_cfg = cfg.api.clone();
        Some(tokio::spawn(async move {
            api::serve(api_cfg, state).await;
        }))
    } else {
        None
    };

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for shutdown signal: {e}");
    }
    info!("Shutting down...");

    if let Some(h) = sweep_handle {
        h.abort();
    }
    if let Some(h) = api_handle {
        h.abort();
    }
    // The worker's cache is kept for the next start.
    if let Some(worker) = &app.worker {
        worker.shutdown().await;
    }
    if let Some(task) = app.worker_task {
        if tokio::time::timeout(Duration::from_secs(5), task).await.is_err() {
            error!("worker did not stop within 5s");
        }
    }

    info!("Goodbye.");
    Ok(())
}

async fn status(config_path: &str, cfg: config::Config) -> anyhow::Result<()> {
    println!("Beacon status\n");
    println!("Config:    {config_path}");
    println!("Store:     {:?}", cfg.store.backend);
    match cfg.store.backend {
        config::StoreBackend::File => println!("           {}", shellexpand(&cfg.store.dir)),
        config::StoreBackend::Sqlite => {
            println!("           {}", shellexpand(&cfg.store.db_path))
        }
        config::StoreBackend::Memory => {}
    }
    println!("Timezone:  {}", cfg.scheduler.timezone);
    println!(
        "Push:      {}",
        if cfg.push.is_configured() {
            cfg.push.relay_url.as_str()
        } else {
            "not configured"
        }
    );
    println!();

    let app = App::build(cfg, false).await?;
    let schedules = app.dispatcher.store().list().await;
    let subscriptions = app.dispatcher.push().registry().list().await;

    println!("Subscriptions: {}", subscriptions.len());
    println!("Pending schedules: {}", schedules.len());
    for s in &schedules {
        println!(
            "  {}  {}  {}{}",
            format_iso(s.scheduled_time),
            s.task_id,
            s.title,
            if s.is_bound() { "" } else { "  (broadcast)" }
        );
    }
    Ok(())
}
