use fleetcam::{
    AppResult,
    cli::{Cli, Commands},
    config::Config,
    init_logging,
    session::SessionManager,
};

#[tokio::main]
async fn main() -> AppResult<()> {
    let cli = Cli::parse_args();

    if let Commands::Config { action } = cli.command() {
        Config::handle_command(&action, &cli.config_file)?;
        return Ok(());
    }

    // Load configuration
    let config = Config::load_or_default(&cli.config_file);

    // Initialize logging; the guard flushes the file sink on drop
    let _log_guard = init_logging(&cli.effective_log_level(), &config.log.file_path)?;

    tracing::info!("Fleetcam live view orchestrator starting...");
    tracing::debug!("CLI arguments: {:?}", cli);

    // Create and run the session manager
    let mut session_manager = SessionManager::new(&cli, config)?;
    session_manager.start().await?;

    Ok(())
}
