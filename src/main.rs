use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

use netgauge::config::{self, LoggingConfig, Settings};
use netgauge::diagnostics::{DiagnosticSink, TracingSink};
use netgauge::history::{CorruptionPolicy, ExportFormat, HistoryStore};
use netgauge::measure::Phase;
use netgauge::network::{self, HostInfo, SysinfoAdapters};
use netgauge::{logging, presenter, report};

#[derive(Parser)]
#[command(
    name = "netgauge",
    about = "Internet speed tests with a persistent result history",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a speed test (download, upload, ping)
    Run {
        /// Do not append the result to the history
        #[arg(long)]
        no_save: bool,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Show past results as a table
    History {
        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Show past results as a text chart
    Chart,

    /// Export past results to a file
    Export {
        /// Output file path
        #[arg(long)]
        output: PathBuf,

        /// csv or json; defaults to the output file's extension
        #[arg(long)]
        format: Option<ExportFormat>,
    },

    /// Show host and network adapter information
    NetworkInfo {
        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Inspect or change settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Print the effective settings
    Show,

    /// Print the settings file location
    Path,

    /// Change one setting
    Set {
        /// auto_save_results, show_network_info, dark_mode, preferred_server_id,
        /// history.on_corruption or logging.level
        key: String,
        value: String,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let settings_path = config::default_settings_path();
    let loaded = if settings_path.exists() {
        Settings::load(&settings_path)
    } else {
        Ok(Settings::default())
    };
    let (settings, load_error) = match loaded {
        Ok(settings) => (settings, None),
        Err(e) => (unreadable_settings_fallback(), Some(e)),
    };

    init_logging(&settings.logging);
    if let Some(e) = &load_error {
        tracing::warn!(path = %settings_path.display(), error = ?e, "settings could not be loaded, using defaults");
    }

    let sink: Arc<dyn DiagnosticSink> = Arc::new(TracingSink);

    match cli.command {
        Commands::Run { no_save, json } => {
            let persist = load_error.is_none();
            return run(settings, &settings_path, persist, sink, no_save, json).await;
        }
        Commands::History { json } => {
            let store = netgauge::open_history(&settings, sink);
            if !store.exists() {
                println!("{}", report::NO_HISTORY);
                return Ok(ExitCode::SUCCESS);
            }
            let records = store.load()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                println!("\nSpeed Test History ({})", store.path().display());
                print!("{}", report::render_table(&report::table_rows(&records)));
                if let Some(summary) = report::summary(&records) {
                    println!("\n{}", report::format_summary(&summary));
                }
            }
        }
        Commands::Chart => {
            let store = netgauge::open_history(&settings, sink);
            if !store.exists() {
                println!("{}", report::NO_HISTORY);
                return Ok(ExitCode::SUCCESS);
            }
            let records = store.load()?;
            print!(
                "{}",
                report::render_chart(&report::ChartSeries::from_records(&records))
            );
        }
        Commands::Export { output, format } => {
            let store = netgauge::open_history(&settings, sink);
            if !store.exists() {
                println!("{}", report::NO_HISTORY);
                return Ok(ExitCode::SUCCESS);
            }
            let format = format.unwrap_or_else(|| format_for(&output));
            tracing::info!(output = %output.display(), %format, "exporting history");
            let count = store.export_all(&output, format)?;
            println!("Exported {} result(s) to {}", count, output.display());
        }
        Commands::NetworkInfo { json } => {
            let info = network::host_info(&SysinfoAdapters);
            if json {
                let active = network::select_active(&info.adapters).map(|a| a.name.clone());
                let doc = serde_json::json!({ "host": info, "active_adapter": active });
                println!("{}", serde_json::to_string_pretty(&doc)?);
            } else {
                print_host_info(&info);
            }
        }
        Commands::Settings { action } => match action {
            SettingsAction::Show => {
                print!("{}", toml::to_string_pretty(&settings)?);
            }
            SettingsAction::Path => {
                println!("{}", settings_path.display());
            }
            SettingsAction::Set { key, value } => {
                if let Some(e) = load_error {
                    return Err(e.context(format!(
                        "not overwriting {}; fix or remove it first",
                        settings_path.display()
                    )));
                }
                let mut settings = settings;
                settings.set(&key, &value)?;
                settings.save(&settings_path)?;
                println!("{} = {}", key, value.trim());
            }
        },
    }

    Ok(ExitCode::SUCCESS)
}

/// Defaults used when the settings file exists but cannot be parsed. The
/// history is never discarded on the strength of settings we could not read.
fn unreadable_settings_fallback() -> Settings {
    let mut settings = Settings::default();
    settings.history.on_corruption = CorruptionPolicy::FailClosed;
    settings
}

/// Console logging always; file logging when enabled and the log directory
/// is writable.
fn init_logging(config: &LoggingConfig) {
    let log_dir = config::data_dir().join("logs");
    if let Err(e) = logging::init(config, &log_dir) {
        eprintln!("netgauge: file logging disabled: {e:#}");
        let console_only = LoggingConfig {
            file: false,
            ..config.clone()
        };
        let _ = logging::init(&console_only, &log_dir);
    }
}

async fn run(
    mut settings: Settings,
    settings_path: &Path,
    persist: bool,
    sink: Arc<dyn DiagnosticSink>,
    no_save: bool,
    json: bool,
) -> Result<ExitCode> {
    if settings.show_network_info && !json {
        print_host_info(&network::host_info(&SysinfoAdapters));
        println!();
    }

    let auto_save = settings.auto_save_results && !no_save;
    if auto_save && settings.history.path.is_none() {
        config::ensure_data_dir()?;
    }
    let store: Arc<HistoryStore> = Arc::new(netgauge::open_history(&settings, sink.clone()));
    let runner = netgauge::build_runner(&settings, store, auto_save, sink);

    let handle = runner.start();
    tracing::info!(session = %handle.id(), "speed test started");

    let mut stdout = std::io::stdout();
    let done = presenter::drive(&handle, presenter::DEFAULT_TICK, |snapshot| {
        if !json {
            let _ = write!(stdout, "\r{:<50}", snapshot.status_line());
            let _ = stdout.flush();
        }
    })
    .await;
    if !json {
        println!();
    }

    if persist {
        settings.touch();
        if let Err(e) = settings.save(settings_path) {
            tracing::warn!(error = ?e, "could not record last use");
        }
    } else {
        tracing::warn!(path = %settings_path.display(), "settings file is unreadable; last use not recorded");
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&done)?);
        return Ok(if done.phase == Phase::Complete {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        });
    }

    match (&done.outcome, &done.error) {
        (Some(outcome), _) if done.phase == Phase::Complete => {
            println!("{}", report::format_outcome(outcome));
            if let Some(server) = &done.server {
                println!("Server: {} ({})", server.sponsor, server.name);
            }
            if let Some(reason) = &done.save_error {
                eprintln!("Result was not saved to history: {reason}");
            } else if done.saved {
                println!("Result saved to history.");
            }
            Ok(ExitCode::SUCCESS)
        }
        (_, Some(err)) => {
            eprintln!("{err}");
            Ok(ExitCode::FAILURE)
        }
        _ => {
            eprintln!("Speed test ended without a result.");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn format_for(output: &Path) -> ExportFormat {
    match output.extension().and_then(|e| e.to_str()) {
        Some(ext) => ext.parse().unwrap_or_default(),
        None => ExportFormat::default(),
    }
}

fn print_host_info(info: &HostInfo) {
    println!("\nNetwork Information");
    println!("{:<25} | {}", "Computer Name", info.computer_name);
    println!("{:<25} | {}", "System", info.system);
    println!("{:<25} | {}", "Time", info.time);
    if let Some(err) = &info.error {
        println!("{:<25} | Error: {}", "Adapters", err);
        return;
    }
    if info.adapters.is_empty() {
        println!("{:<25} | none with both IP and MAC addresses", "Adapters");
        return;
    }

    let active = network::select_active(&info.adapters).map(|a| a.name.as_str());
    println!();
    println!(
        "{:<16} | {:<15} | {:<15} | {:<17} | Active",
        "Adapter", "IPv4", "Netmask", "MAC"
    );
    println!("{:-<16}-|-{:-<15}-|-{:-<15}-|-{:-<17}-|-{:-<6}", "", "", "", "", "");
    for adapter in &info.adapters {
        let show = |v: Option<String>| v.unwrap_or_else(|| "-".to_string());
        println!(
            "{:<16} | {:<15} | {:<15} | {:<17} | {}",
            adapter.name,
            show(adapter.ipv4.map(|ip| ip.to_string())),
            show(adapter.netmask.map(|m| m.to_string())),
            show(adapter.mac.clone()),
            if Some(adapter.name.as_str()) == active { "*" } else { "" }
        );
    }
}
