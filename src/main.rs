/*
 * Entry point. Reads newline-delimited JSON requests from stdin, dispatches each one to
 * `AppHandler` on its own task and writes responses and translation progress events as
 * JSON lines to stdout. Logging goes to stderr and to a dated log file in the per-user
 * configuration directory, so stdout carries protocol lines only.
 */
mod app_logic;
mod core;

use crate::app_logic::handler::{APP_NAME, AppHandler, ProgressEvent, llm_translator_factory};
use crate::core::{
    ConfigManagerOperations, CoreConfigManager, CoreFileSystemScanner, CoreGitCli, GitWorkflow,
    StatusReconciler, path_utils,
};
use simplelog::{
    ColorChoice, CombinedLogger, ConfigBuilder, LevelFilter, SharedLogger, TermLogger,
    TerminalMode, WriteLogger,
};
use std::fs::OpenOptions;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdout};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

const LOG_LEVEL_ENV_VAR: &str = "TRANSYNC_LOG";

fn init_logging() {
    let level = std::env::var(LOG_LEVEL_ENV_VAR)
        .ok()
        .and_then(|value| value.trim().parse::<LevelFilter>().ok())
        .unwrap_or(LevelFilter::Info);

    let mut config_builder = ConfigBuilder::new();
    config_builder.set_thread_level(LevelFilter::Off);
    config_builder.set_target_level(LevelFilter::Off);
    if level >= LevelFilter::Debug {
        config_builder.set_location_level(LevelFilter::Error);
    }
    let config = config_builder.build();

    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        level,
        config.clone(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )];

    let date_format = time::macros::format_description!("[year]-[month]-[day]");
    let date = time::OffsetDateTime::now_utc()
        .format(date_format)
        .unwrap_or_else(|_| "undated".to_string());
    if let Some(dir) = path_utils::get_base_app_config_local_dir(APP_NAME) {
        let log_path = dir.join(format!("transync-{date}.log"));
        match OpenOptions::new().create(true).append(true).open(&log_path) {
            Ok(file) => loggers.push(WriteLogger::new(level, config, file)),
            Err(e) => eprintln!("Could not open log file {log_path:?}: {e}"),
        }
    }

    if let Err(e) = CombinedLogger::init(loggers) {
        eprintln!("Could not initialize logging: {e}");
    }
}

async fn write_line(stdout: &mut Stdout, line: &str) -> std::io::Result<()> {
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    init_logging();
    log::info!("Starting {APP_NAME} {}.", env!("CARGO_PKG_VERSION"));

    let config_manager: Arc<dyn ConfigManagerOperations> = Arc::new(CoreConfigManager::new());
    let mut settings = match config_manager.load_settings(APP_NAME) {
        Ok(settings) => settings,
        Err(e) => {
            log::error!("Failed to load settings: {e}");
            return ExitCode::FAILURE;
        }
    };
    settings.apply_environment();

    let vcs = Arc::new(CoreGitCli::new(Duration::from_secs(
        settings.git_command_timeout_secs.max(1),
    )));
    let reconciler = Arc::new(StatusReconciler::new(
        vcs.clone(),
        Arc::new(CoreFileSystemScanner::new()),
    ));
    let workflow = GitWorkflow::new(vcs, reconciler.clone());

    let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();

    let handler = match AppHandler::new(
        APP_NAME,
        settings,
        reconciler,
        workflow,
        config_manager,
        llm_translator_factory(),
        Some(progress_tx),
    ) {
        Ok(handler) => Arc::new(handler),
        Err(e) => {
            log::error!("Failed to initialize the request handler: {e}");
            return ExitCode::FAILURE;
        }
    };

    let progress_out = out_tx.clone();
    let forwarder = tokio::spawn(async move {
        while let Some(progress) = progress_rx.recv().await {
            match serde_json::to_string(&ProgressEvent::from(progress)) {
                Ok(line) => {
                    if progress_out.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => log::error!("Could not encode progress event: {e}"),
            }
        }
    });

    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(line) = out_rx.recv().await {
            if let Err(e) = write_line(&mut stdout, &line).await {
                log::error!("Could not write to stdout: {e}");
                break;
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut requests = JoinSet::new();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                let handler = Arc::clone(&handler);
                let out = out_tx.clone();
                requests.spawn(async move {
                    let response = handler.handle_line(&line).await;
                    match serde_json::to_string(&response) {
                        Ok(encoded) => {
                            let _ = out.send(encoded);
                        }
                        Err(e) => log::error!("Could not encode response: {e}"),
                    }
                });
            }
            Ok(None) => break,
            Err(e) => {
                log::error!("Could not read from stdin: {e}");
                break;
            }
        }
        while let Some(finished) = requests.try_join_next() {
            if let Err(e) = finished {
                log::error!("Request task failed: {e}");
            }
        }
    }

    log::debug!("Input closed. Waiting for {} request(s).", requests.len());
    while let Some(finished) = requests.join_next().await {
        if let Err(e) = finished {
            log::error!("Request task failed: {e}");
        }
    }

    // The handler owns the last progress sender; dropping it ends the forwarder.
    drop(handler);
    if let Err(e) = forwarder.await {
        log::error!("Progress forwarder failed: {e}");
    }
    drop(out_tx);
    if let Err(e) = writer.await {
        log::error!("Output writer failed: {e}");
    }
    log::info!("{APP_NAME} stopped.");
    ExitCode::SUCCESS
}
