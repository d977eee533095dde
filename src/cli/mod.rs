pub mod render;
pub mod shutdown;

use std::{io::Write, ops::ControlFlow, path::PathBuf, sync::Arc};

use anyhow::Result;
use chrono::Local;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{level_filters::LevelFilter, warn};

use crate::{
    config::{EngineConfig, TogglePolicy, DEFAULT_API_URL},
    engine::{
        model::{SettingsPatch, ZenDays, ZenHours},
        ZenEngine,
    },
    remote::HttpRemote,
    utils::{
        clock::SystemClock,
        dir::create_application_default_path,
        logging::{enable_logging, CLI_PREFIX, WATCH_PREFIX},
    },
};

#[derive(Parser, Debug)]
#[command(name = "Zenbox", version, long_about = None)]
#[command(about = "Companion for the Zenbox digital detox box", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(
        long,
        env = "ZENBOX_API_URL",
        default_value = DEFAULT_API_URL,
        help = "Base url of the Zenbox service"
    )]
    api_url: String,
    #[arg(
        long,
        help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
    )]
    dir: Option<PathBuf>,
    #[arg(long = "log-filter", help = "Log level, defaults to RUST_LOG or debug")]
    log: Option<LevelFilter>,
    /// This option is for debugging purposes only.
    #[arg(long = "log-console")]
    log_console: bool,
    #[arg(
        long,
        value_enum,
        default_value_t = TogglePolicy::Optimistic,
        help = "Whether toggling shows the new state before the device confirms it"
    )]
    toggle_policy: TogglePolicy,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Keep polling and show a live status line. Type t + enter to toggle, q to quit")]
    Watch,
    #[command(about = "Show today's progress, points and the weekly overview")]
    Status,
    #[command(about = "List recorded zen sessions, most recent first")]
    Sessions,
    #[command(about = "Start zen mode, or end it if it is running")]
    Toggle,
    #[command(about = "Set the daily target in minutes")]
    Target { minutes: u32 },
    #[command(about = "Show settings, or change the ones given")]
    Settings {
        #[arg(long)]
        auto_reminder: Option<bool>,
        #[arg(long)]
        call_filtering: Option<bool>,
        #[arg(long, help = "Zen hours as HH:MM-HH:MM, for example 20:00-22:00")]
        zen_hours: Option<ZenHours>,
        #[arg(long, help = "Comma separated weekdays, for example Mon,Tue,Sat")]
        zen_days: Option<ZenDays>,
        #[arg(long, help = "Weekly target in minutes")]
        weekly_target: Option<u32>,
    },
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let app_dir = args.dir.map_or_else(create_application_default_path, Ok)?;
    let prefix = match args.commands {
        Commands::Watch => WATCH_PREFIX,
        _ => CLI_PREFIX,
    };
    enable_logging(prefix, &app_dir, args.log, args.log_console)?;

    let config = EngineConfig {
        api_url: args.api_url,
        toggle_policy: args.toggle_policy,
        ..Default::default()
    };
    let remote = Arc::new(HttpRemote::new(&config.api_url, Local));
    let engine = ZenEngine::new(config, remote, Arc::new(SystemClock), Local);

    match args.commands {
        Commands::Watch => watch(Arc::new(engine)).await,
        Commands::Status => {
            load_config_or_defaults(&engine).await;
            engine.refresh().await?;
            println!(
                "{}",
                render::status(&engine.snapshot(), &engine.timer_now())
            );
            Ok(())
        }
        Commands::Sessions => {
            engine.refresh().await?;
            let snapshot = engine.snapshot();
            if snapshot.sessions.is_empty() {
                println!("No sessions recorded yet");
            }
            for (index, session) in snapshot.history().enumerate() {
                println!("{}", render::session_line(index, session));
            }
            Ok(())
        }
        Commands::Toggle => {
            engine.refresh().await?;
            let zen = engine.toggle().await?;
            println!("{}", if zen { "Zen mode started" } else { "Zen mode ended" });
            Ok(())
        }
        Commands::Target { minutes } => {
            engine.load_config().await?;
            let settings = engine.set_daily_target(minutes).await?;
            println!("{}", render::settings(&settings));
            Ok(())
        }
        Commands::Settings {
            auto_reminder,
            call_filtering,
            zen_hours,
            zen_days,
            weekly_target,
        } => {
            engine.load_config().await?;
            let patch = SettingsPatch {
                auto_reminder,
                call_filtering,
                zen_hours,
                zen_days,
                weekly_target_minutes: weekly_target,
                ..Default::default()
            };
            let settings = if patch.is_empty() {
                engine.settings()
            } else {
                engine.update_settings(patch).await?
            };
            println!("{}", render::settings(&settings));
            Ok(())
        }
    }
}

async fn load_config_or_defaults(engine: &ZenEngine) {
    if let Err(e) = engine.load_config().await {
        warn!("Using default settings {e}");
    }
}

/// Runs a command typed into `watch`. A toggle runs in its own task so the status line keeps
/// redrawing, and the loop stays stoppable, while the request is pending.
fn handle_input(engine: &Arc<ZenEngine>, command: &str) -> ControlFlow<()> {
    match command.trim() {
        "t" => {
            let engine = engine.clone();
            tokio::spawn(async move {
                if let Err(e) = engine.toggle().await {
                    warn!("Toggle failed {e}");
                }
            });
        }
        "q" => return ControlFlow::Break(()),
        _ => (),
    }
    ControlFlow::Continue(())
}

async fn watch(engine: Arc<ZenEngine>) -> Result<()> {
    load_config_or_defaults(&engine).await;
    engine.start();

    let shutdown = engine.shutdown_token();
    tokio::spawn(shutdown::detect_shutdown(shutdown.clone()));

    let mut store = engine.subscribe();
    let mut timer = engine.timer();
    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        {
            let line = render::status_line(&store.borrow_and_update(), &timer.borrow_and_update());
            print!("\r\x1b[2K{line}");
            std::io::stdout().flush()?;
        }

        tokio::select! {
            _ = shutdown.cancelled() => break,
            changed = store.changed() => if changed.is_err() { break },
            changed = timer.changed() => if changed.is_err() { break },
            command = input.next_line(), if stdin_open => match command? {
                Some(command) => {
                    if handle_input(&engine, &command).is_break() {
                        break;
                    }
                }
                None => stdin_open = false,
            },
        }
    }

    println!();
    engine.shutdown().await;
    Ok(())
}

#[cfg(test)]
mod cli_tests {
    use std::{ops::ControlFlow, sync::Arc, time::Duration};

    use chrono::{TimeZone, Utc};

    use super::handle_input;
    use crate::{
        config::EngineConfig,
        engine::{testing::FakeRemote, ZenEngine},
        utils::clock::TestClock,
    };

    fn engine(remote: Arc<FakeRemote>) -> Arc<ZenEngine> {
        Arc::new(ZenEngine::new(
            EngineConfig::default(),
            remote,
            Arc::new(TestClock::starting_at(
                Utc.with_ymd_and_hms(2024, 4, 5, 12, 0, 0).unwrap(),
            )),
            Utc,
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn toggle_input_does_not_wait_for_the_device() {
        let remote = Arc::new(FakeRemote::default());
        remote.delay_toggles(Duration::from_secs(3600));
        let engine = engine(remote.clone());
        let mut store = engine.subscribe();
        store.borrow_and_update();

        let started = tokio::time::Instant::now();
        assert_eq!(handle_input(&engine, "t\n"), ControlFlow::Continue(()));
        assert_eq!(started.elapsed(), Duration::ZERO);

        // The optimistic flip reaches subscribers while the request is still pending.
        tokio::time::timeout(Duration::from_millis(10), store.changed())
            .await
            .unwrap()
            .unwrap();
        assert!(store.borrow().is_zen_mode());
        assert!(engine.is_toggle_pending());
        assert_eq!(remote.connect_count(), 1);

        assert_eq!(handle_input(&engine, "q"), ControlFlow::Break(()));
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_input_is_ignored() {
        let remote = Arc::new(FakeRemote::default());
        let engine = engine(remote.clone());
        assert_eq!(handle_input(&engine, "hello"), ControlFlow::Continue(()));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(remote.connect_count(), 0);
        assert!(!engine.is_zen_mode());
    }
}
