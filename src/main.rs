use std::{
    future::Future,
    io::{IsTerminal, Write},
    path::PathBuf,
    time::{Duration, Instant},
};

use anyhow::{Context, anyhow, bail};
use arboard::Clipboard;
use chilli_leaf_scan::{
    AnalysisClient, AppController, AppState, Config, ImagePayload, Intent, Phase, RenderOptions,
    TempFilePreviews,
    analysis::GeminiHttp,
    capture::SystemDevices,
    image_processor, render,
};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};

type Controller = AppController<AnalysisClient<GeminiHttp>, SystemDevices, TempFilePreviews>;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Never colour the output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify a chilli leaf photo (PNG, JPEG or WEBP)
    Analyze {
        /// Path to the image file
        image_path: PathBuf,

        /// Print the verdict as JSON
        #[arg(long)]
        json: bool,

        /// Copy the verdict to the clipboard
        #[arg(long)]
        clip: bool,
    },
    /// Take a photo with the webcam
    Capture {
        /// Classify the captured photo
        #[arg(long)]
        analyze: bool,

        /// Also write the captured JPEG here
        #[arg(long)]
        save: Option<PathBuf>,

        /// How long to wait for the camera to produce frames
        #[arg(long, default_value_t = 10)]
        wait_secs: u64,
    },
    /// Interactive session: open, camera, snap, cancel, analyze, reset
    Shell,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = Args::parse();

    // Nothing is rendered until the configuration is known to be usable.
    let config = Config::from_env().context("Cannot start")?;
    log::debug!("{:?}", config);

    let options = RenderOptions {
        colour: !args.no_color && std::io::stdout().is_terminal(),
    };

    let client = AnalysisClient::gemini(&config).context("Cannot start")?;
    let mut app = AppController::new(
        client,
        SystemDevices::default(),
        TempFilePreviews::in_temp_dir(),
    );

    let outcome = until_interrupted(
        run(args.command, &mut app, &config, options),
        tokio::signal::ctrl_c(),
    )
    .await;

    // Releases the camera and deletes preview files on every exit path.
    drop(app);

    match outcome? {
        Some(()) => Ok(()),
        None => bail!("Interrupted"),
    }
}

/// Runs `work` unless `interrupt` fires first, in which case `work` is
/// dropped and `None` is returned.
async fn until_interrupted<T>(
    work: impl Future<Output = anyhow::Result<T>>,
    interrupt: impl Future<Output = std::io::Result<()>>,
) -> anyhow::Result<Option<T>> {
    tokio::select! {
        biased;
        outcome = work => outcome.map(Some),
        signal = interrupt => {
            signal.context("Failed to listen for Ctrl-C")?;
            log::info!("Interrupted; releasing camera and previews");
            Ok(None)
        }
    }
}

async fn run(
    command: Command,
    app: &mut Controller,
    config: &Config,
    options: RenderOptions,
) -> anyhow::Result<()> {
    match command {
        Command::Analyze {
            image_path,
            json,
            clip,
        } => {
            let payload = ImagePayload::from_path(&image_path, config.max_image_bytes)
                .map_err(|e| anyhow!("{} ({})", e.user_message(), e))?;
            if let Ok((w, h)) = image_processor::dimensions(&payload.bytes) {
                log::info!("{} is {}x{}", payload.file_name, w, h);
            }

            app.dispatch(Intent::SelectImage(payload)).await;
            app.dispatch(Intent::Analyze).await;
            finish_one_shot(app, options, json, clip)
        }
        Command::Capture {
            analyze,
            save,
            wait_secs,
        } => {
            capture_one(app, Duration::from_secs(wait_secs)).await?;

            if let Some(path) = save {
                if let Some(image) = &app.state().image {
                    std::fs::write(&path, &image.payload().bytes)
                        .with_context(|| format!("Failed to save {}", path.display()))?;
                    println!("Saved {}", path.display());
                }
            }

            if analyze {
                app.dispatch(Intent::Analyze).await;
            }
            finish_one_shot(app, options, false, false)
        }
        Command::Shell => shell(app, config, options).await,
    }
}

async fn capture_one(app: &mut Controller, wait: Duration) -> anyhow::Result<()> {
    app.dispatch(Intent::StartCapture).await;

    let deadline = Instant::now() + wait;
    while !app.state().capture_ready {
        if let Some(error) = &app.state().capture_error {
            bail!("{}", error);
        }
        if Instant::now() >= deadline {
            bail!("Camera did not produce frames within {}s", wait.as_secs());
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        app.refresh_capture();
    }

    app.dispatch(Intent::Capture).await;
    if app.state().capture_mode {
        let error = app
            .state()
            .capture_error
            .clone()
            .unwrap_or_else(|| "Capture failed".to_string());
        app.dispatch(Intent::CancelCapture).await;
        bail!("{}", error);
    }
    Ok(())
}

fn finish_one_shot(
    app: &Controller,
    options: RenderOptions,
    json: bool,
    clip: bool,
) -> anyhow::Result<()> {
    let state = app.state();

    if json {
        if let Some(result) = &state.result {
            println!("{}", serde_json::to_string_pretty(result)?);
        }
    } else {
        print!("{}", render(state, &options));
    }

    if clip {
        if let Some(result) = &state.result {
            let text = format!(
                "{} ({}%)\n{}",
                result.disease, result.confidence, result.explanation
            );
            match Clipboard::new() {
                Ok(mut clipboard) => {
                    if let Err(e) = clipboard.set_text(text) {
                        eprintln!("Failed to copy to clipboard: {}", e);
                    }
                }
                Err(e) => eprintln!("Failed to initialize clipboard: {}", e),
            }
        }
    }

    if state.phase() == Phase::Failed {
        bail!("{}", state.error.clone().unwrap_or_default());
    }
    Ok(())
}

const SHELL_HELP: &str = "\
commands:
  open <path>   select an image file
  camera        enter capture mode
  snap          capture a frame from the camera
  cancel        leave capture mode
  analyze       classify the selected image
  reset         clear everything
  status        redraw (and re-check the camera)
  help          this text
  quit          leave";

enum ShellCommand {
    Dispatch(Intent),
    Status,
    Help,
    Quit,
}

fn parse_shell_command(line: &str, max_image_bytes: usize) -> Result<ShellCommand, String> {
    let line = line.trim();
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };

    let intent = match verb.to_ascii_lowercase().as_str() {
        "open" | "o" => {
            if rest.is_empty() {
                return Err("usage: open <path>".to_string());
            }
            let payload =
                ImagePayload::from_path(rest, max_image_bytes).map_err(|e| {
                    log::warn!("{}", e);
                    e.user_message()
                })?;
            Intent::SelectImage(payload)
        }
        "camera" | "webcam" => Intent::StartCapture,
        "snap" => Intent::Capture,
        "cancel" => Intent::CancelCapture,
        "analyze" | "a" => Intent::Analyze,
        "reset" => Intent::Reset,
        "status" | "" => return Ok(ShellCommand::Status),
        "help" | "?" => return Ok(ShellCommand::Help),
        "quit" | "exit" | "q" => return Ok(ShellCommand::Quit),
        other => return Err(format!("unknown command '{other}' (try 'help')")),
    };
    Ok(ShellCommand::Dispatch(intent))
}

fn draw(state: &AppState, options: &RenderOptions) {
    println!();
    print!("{}", render(state, options));
    print!("> ");
    let _ = std::io::stdout().flush();
}

async fn shell(app: &mut Controller, config: &Config, options: RenderOptions) -> anyhow::Result<()> {
    println!("{SHELL_HELP}");
    draw(app.state(), &options);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_shell_command(&line, config.max_image_bytes) {
            Ok(ShellCommand::Dispatch(Intent::Analyze)) => {
                println!("Analyzing...");
                app.dispatch(Intent::Analyze).await;
            }
            Ok(ShellCommand::Dispatch(intent)) => app.dispatch(intent).await,
            Ok(ShellCommand::Status) => app.refresh_capture(),
            Ok(ShellCommand::Help) => println!("{SHELL_HELP}"),
            Ok(ShellCommand::Quit) => break,
            Err(message) => println!("{message}"),
        }
        draw(app.state(), &options);
    }

    app.reset();
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::future::{pending, ready};

    use chilli_leaf_scan::{
        InMemoryPreviews,
        analysis::impl_fake::ScriptedAnalyzer,
        capture::{
            MediaTrack, TrackState,
            impl_fake::{FakeMediaDevices, FakeStreamSpec},
        },
    };

    use super::*;

    #[tokio::test]
    async fn interrupt_drops_the_running_command() {
        let mut app = AppController::new(
            ScriptedAnalyzer::new(),
            FakeMediaDevices::new().then_stream(FakeStreamSpec::default()),
            InMemoryPreviews::new(),
        );

        let outcome = until_interrupted(
            async {
                app.dispatch(Intent::StartCapture).await;
                pending::<anyhow::Result<()>>().await
            },
            ready(Ok(())),
        )
        .await
        .unwrap();

        assert!(outcome.is_none());
        let tracks = app.devices().issued_tracks();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].state(), TrackState::Live);

        drop(app);
        assert_eq!(tracks[0].state(), TrackState::Ended);
    }

    #[tokio::test]
    async fn finished_commands_pass_through() {
        let outcome = until_interrupted(async { Ok(7) }, pending()).await.unwrap();
        assert_eq!(outcome, Some(7));

        let err = until_interrupted(async { Err::<(), _>(anyhow!("boom")) }, pending())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn shell_commands_map_to_intents() {
        assert!(matches!(
            parse_shell_command("camera", 1024),
            Ok(ShellCommand::Dispatch(Intent::StartCapture))
        ));
        assert!(matches!(parse_shell_command("  ", 1024), Ok(ShellCommand::Status)));
        assert!(matches!(parse_shell_command("q", 1024), Ok(ShellCommand::Quit)));
        assert!(parse_shell_command("open", 1024).is_err());
        assert!(parse_shell_command("dance", 1024).is_err());
    }
}
