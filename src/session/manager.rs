//! Interactive live-view session runtime

use anyhow::Result;
use futures_util::{StreamExt, stream::FuturesUnordered};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{Mutex, Semaphore};
use tracing::{error, info, warn};

use crate::cli::Cli;
use crate::config::{ChannelSpec, Config};
use crate::stream::StreamGateway;
use crate::viewport::{self, Slot, ViewMode};

use super::controller::SelectionController;
use super::events::{EventChannel, SessionEvent};
use super::exit::ExitTriggerCoordinator;
use super::store::{SessionState, SessionStore};

const AUTO_SELECT_MAX_CONCURRENCY: usize = 4;

/// Owns the orchestration components and runs the event loop until the
/// process is interrupted.
pub struct SessionManager {
    config: Config,
    cli: Cli,
    view_mode: ViewMode,
    controller: Arc<SelectionController>,
    exit_coordinator: ExitTriggerCoordinator,
    events: EventChannel,
}

impl SessionManager {
    pub fn new(cli: &Cli, config: Config) -> Result<Self> {
        let view_mode = config.view_mode()?;
        let call_timeout = Duration::from_secs(config.stream.timeout_seconds);

        let gateway = StreamGateway::new(config.stream.base_url.clone(), call_timeout)
            .with_auth_token(config.stream.auth_token.clone());

        let store = Arc::new(Mutex::new(SessionStore::new()));
        let events = EventChannel::new();
        let controller = Arc::new(SelectionController::new(
            store,
            Arc::new(gateway),
            events.clone(),
            call_timeout,
        ));
        let exit_coordinator = ExitTriggerCoordinator::new(Arc::clone(&controller), events.clone());

        Ok(Self {
            config,
            cli: cli.clone(),
            view_mode,
            controller,
            exit_coordinator,
            events,
        })
    }

    /// Start the session using the appropriate execution mode
    pub async fn start(&mut self) -> Result<()> {
        if self.cli.is_dry_run_mode() {
            return self.print_dry_run_summary();
        }

        self.run().await
    }

    fn print_dry_run_summary(&self) -> Result<()> {
        println!("Dry-run mode configuration:");
        println!("Config file: {}", self.cli.config_file);
        println!("Stream backend: {}", self.config.stream.base_url);
        println!("View mode: {}", self.view_mode);
        if self.config.channels.is_empty() {
            println!("No channels configured for auto-select");
        } else {
            println!("Channels to select:");
            for spec in &self.config.channels {
                println!("  {} ch{}", spec.imei, spec.channel);
            }
        }
        Ok(())
    }

    /// Run the main session loop
    pub async fn run(&mut self) -> Result<()> {
        info!("Entering live view ({} grid)", self.view_mode);
        self.exit_coordinator.set_live_view(true).await;
        self.spawn_input_listener();

        if !self.config.channels.is_empty() {
            self.spawn_auto_select();
        }

        loop {
            tokio::select! {
                // Process termination: best-effort detached stops, no waiting
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupt received, stopping live sessions");
                    self.exit_coordinator.process_exit().await;
                    break;
                }

                event = self.events.next_event() => {
                    match event {
                        Some(SessionEvent::ShutdownRequested) => {
                            // Graceful path: leave the live view, which tears
                            // down every session through the normal stop path
                            self.exit_coordinator.set_live_view(false).await;
                            break;
                        }
                        Some(event) => self.handle_event(event).await,
                        None => {
                            warn!("Event channel closed");
                            break;
                        }
                    }
                }
            }
        }

        info!("Session loop terminated");
        Ok(())
    }

    async fn handle_event(&self, event: SessionEvent) {
        match event {
            SessionEvent::GridChanged => self.render_grid().await,
            SessionEvent::StreamStarted { key, hls_url } => {
                info!("Now playing {} from {}", key, hls_url);
            }
            SessionEvent::StreamFailed { key, error } => {
                warn!("Channel {} unavailable: {}", key, error);
            }
            SessionEvent::StreamStopped { key } => {
                info!("Channel {} stopped", key);
            }
            SessionEvent::TeardownCompleted { stopped } => {
                info!("Teardown completed, {} sessions stopped", stopped);
            }
            SessionEvent::ShutdownRequested => {}
        }
    }

    async fn render_grid(&self) {
        let active = self.controller.active_sessions().await;
        let grid = viewport::project(&active, self.view_mode);

        info!(
            "Live grid {} ({}/{} slots occupied)",
            grid.mode,
            grid.occupied(),
            grid.mode.capacity()
        );
        for (index, slot) in grid.slots.iter().enumerate() {
            if let Slot::Stream(session) = slot {
                let detail = match session.state {
                    SessionState::Active => session
                        .hls_url
                        .clone()
                        .unwrap_or_else(|| "playing".to_string()),
                    _ => "starting...".to_string(),
                };
                info!("  slot {}: {} {}", index + 1, session.key, detail);
            }
        }
    }

    /// Listen for console commands; `q` requests a graceful shutdown that
    /// leaves the live view and stops every session through the normal path
    fn spawn_input_listener(&self) {
        let events = self.events.clone();

        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                match line.trim() {
                    "q" | "quit" | "exit" => {
                        if events.request_shutdown().is_err() {
                            break;
                        }
                    }
                    "" => {}
                    other => info!("Unknown command '{}' (q to quit)", other),
                }
            }
        });
    }

    /// Spawn background selection of configured channels with controlled
    /// parallelism
    fn spawn_auto_select(&self) {
        let channels = self.config.channels.clone();
        let controller = Arc::clone(&self.controller);

        info!("Scheduling auto-select for {} channels", channels.len());

        tokio::spawn(async move {
            Self::run_auto_select(channels, controller).await;
        });
    }

    async fn run_auto_select(channels: Vec<ChannelSpec>, controller: Arc<SelectionController>) {
        let concurrency = AUTO_SELECT_MAX_CONCURRENCY.min(channels.len().max(1));
        let semaphore = Arc::new(Semaphore::new(concurrency));

        let mut tasks = FuturesUnordered::new();

        for spec in channels {
            let controller = Arc::clone(&controller);
            let semaphore = Arc::clone(&semaphore);

            tasks.push(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        error!(
                            "Auto-select permit acquisition failed for {}: {}",
                            spec.imei, e
                        );
                        return;
                    }
                };

                if let Err(e) = controller.select(&spec.imei, spec.channel).await {
                    error!(
                        "Failed to auto-select {} ch{}: {}",
                        spec.imei, spec.channel, e
                    );
                }
            });
        }

        while tasks.next().await.is_some() {}

        info!("Auto-select completed");
    }
}
