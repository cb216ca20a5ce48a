//! `vidgrab` command-line entry point.

mod cli;
mod console;
mod logging;
mod prompt;

use std::io::{self, IsTerminal};
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, warn};
use vidgrab_core::{
    BatchOrchestrator, CancellationToken, CollisionPrompt, CollisionStrategy, Ffmpeg,
    FixedStrategy, MetadataSource, Result, UserSettings, YtDlp, format_duration,
};

use crate::cli::{Cli, Commands, DownloadArgs, ensure_urls, resolve_tool_paths};
use crate::console::Console;
use crate::logging::LoggingConfig;
use crate::prompt::LinePrompt;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = LoggingConfig::for_verbosity(cli.verbose);
    if let Some(dir) = &cli.log_dir {
        config = config.with_log_directory(dir.clone());
    }
    let guard = match logging::init(&config) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("warning: logging disabled: {e}");
            None
        }
    };

    info!("Starting vidgrab v{}", env!("CARGO_PKG_VERSION"));

    match run(&cli).await {
        Ok(code) => code,
        Err(e) => {
            if guard.is_some() {
                error!("{}", e);
            } else {
                eprintln!("error: {e}");
            }
            ExitCode::FAILURE
        }
    }
}

/// Run the command, then persist settings whatever the outcome.
async fn run(cli: &Cli) -> Result<ExitCode> {
    let mut settings = UserSettings::load();
    cli.apply_tool_overrides(&mut settings);

    let cancel = cancel_on_ctrl_c();
    let outcome = match &cli.command {
        Commands::Info { url } => show_info(url, &mut settings, &cancel)
            .await
            .map(|()| ExitCode::SUCCESS),
        Commands::Download(args) => download(args, &mut settings, &cancel).await,
    };

    if let Err(e) = settings.save() {
        warn!("Failed to save settings: {}", e);
    }
    outcome
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling");
            eprintln!("\nCancelling...");
            trigger.cancel();
        }
    });
    token
}

async fn show_info(
    url: &str,
    settings: &mut UserSettings,
    cancel: &CancellationToken,
) -> Result<()> {
    let paths = resolve_tool_paths(settings);
    let yt_dlp = YtDlp::new(paths.require_downloader()?);

    let metadata = yt_dlp.fetch_metadata(url, cancel).await?;
    settings.last_url = url.trim().to_string();

    println!("{}", metadata.title);
    println!("Id:       {}", metadata.id);
    println!("Duration: {}", format_duration(metadata.duration));
    println!("Qualities:");
    for option in metadata.quality_options() {
        let id = option.format_id.as_deref().unwrap_or("-");
        println!("  {id:<10} {}", option.label);
    }
    Ok(())
}

async fn download(
    args: &DownloadArgs,
    settings: &mut UserSettings,
    cancel: &CancellationToken,
) -> Result<ExitCode> {
    let urls = args.apply_to(settings);
    ensure_urls(&urls)?;
    let options = args.batch_options(settings)?;

    let paths = resolve_tool_paths(settings);
    let yt_dlp = paths.require_downloader()?;
    let transcoder = if options.compatibility_mode {
        Some(Ffmpeg::new(paths.require_transcoder()?))
    } else {
        None
    };
    let orchestrator = BatchOrchestrator::new(YtDlp::new(yt_dlp), YtDlp::new(yt_dlp), transcoder);

    let prompt: Box<dyn CollisionPrompt> = if io::stdin().is_terminal() {
        Box::new(LinePrompt::stdio(cancel.clone()))
    } else {
        Box::new(FixedStrategy(CollisionStrategy::AutoRename))
    };

    let console = Console::stdout();
    let report = orchestrator
        .run(
            &urls,
            &options,
            None,
            prompt.as_ref(),
            &|event| console.show(&event),
            cancel,
        )
        .await?;

    console.finish(&report);

    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
