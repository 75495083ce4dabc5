//! appcompat - Entry Point
//!
//! Serves the upgrade compatibility API for devices attached to this host.

use std::collections::HashMap;
use std::env;

use appcompat::app::options::AppOptions;
use appcompat::app::run::run;
use appcompat::filesys::file::File;
use appcompat::logs::{init_logging, LogLevel, LogOptions};
use appcompat::storage::layout::StorageLayout;
use appcompat::storage::settings::Settings;
use appcompat::utils::{run_diagnostic, version_info};

use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version_info()) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Failed to render version info: {e}"),
        }
        return;
    }

    // Retrieve the settings file; defaults apply when it is absent
    let layout = StorageLayout::default();
    let settings = match load_settings(&cli_args, &layout).await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Unable to read settings file: {e}");
            return;
        }
    };

    // Run diagnostics
    if cli_args.contains_key("diagnostic") || cli_args.contains_key("diag") {
        run_diagnostic(&settings.devices.adb_path, &settings.devices.tidevice_path).await;
        return;
    }

    let mut options = AppOptions::from_settings(&settings, layout);
    if let Some(host) = cli_args.get("host") {
        options.server.host = host.clone();
    }

    // Initialize logging
    let mut log_options = LogOptions {
        log_level: settings.log_level.clone(),
        json_format: settings.log_json,
        log_dir: settings
            .log_to_file
            .then(|| options.storage.layout.logs_dir().path().to_path_buf()),
        ..Default::default()
    };
    let mut ignored_level = None;
    if let Some(level) = cli_args.get("log-level") {
        match level.parse::<LogLevel>() {
            Ok(level) => log_options.log_level = level,
            Err(_) => ignored_level = Some(level.clone()),
        }
    }
    if let Err(e) = init_logging(log_options) {
        println!("Failed to initialize logging: {e}");
    }
    if let Some(level) = ignored_level {
        warn!("Ignoring unknown log level '{}'", level);
    }

    if let Some(port) = cli_args.get("port") {
        match port.parse::<u16>() {
            Ok(port) => options.server.port = port,
            Err(_) => warn!("Ignoring invalid port '{}'", port),
        }
    }

    // Run the server
    info!("Running compatibility agent with options: {:?}", options);
    if let Err(e) = run(options, await_shutdown_signal()).await {
        error!("Failed to run the agent: {e}");
    }
}

async fn load_settings(
    cli_args: &HashMap<String, String>,
    layout: &StorageLayout,
) -> Result<Settings, appcompat::errors::AgentError> {
    if let Some(path) = cli_args.get("config") {
        return File::new(path).read_json::<Settings>().await;
    }

    let settings_file = layout.settings_file();
    if settings_file.exists().await {
        settings_file.read_json::<Settings>().await
    } else {
        Ok(Settings::default())
    }
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
                _ => {
                    warn!("Unix signal handlers unavailable, waiting for Ctrl+C only");
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
        info!("Ctrl+C received, shutting down...");
    }
}
