use crate::cli::{Cli, Commands, RunArgs};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::debug;
use vidopt::config::{self, Config};
use vidopt::engine::{
    self, CancelToken, InFlight, RunCoordinator, cancel, coordinator::Preview, hardware,
};
use vidopt::error::RunError;
use vidopt::report::{ConsoleReport, JsonReport, ReportSet};

/// Dispatch the parsed command line; returns the process exit code
pub fn run(cli: Cli) -> i32 {
    let config_override = cli.config.as_deref();

    let result = match cli.command {
        Some(Commands::CheckTools) => handle_check_tools(config_override, &cli.run),
        Some(Commands::DetectHw) => handle_detect_hw(config_override, &cli.run),
        Some(Commands::DryRun { directory }) => {
            handle_dry_run(config_override, &cli.run, directory.or(cli.directory))
        }
        Some(Commands::InitConfig) => handle_init_config(config_override),
        None => return handle_batch(config_override, &cli.run, cli.directory),
    };

    match result {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            1
        }
    }
}

fn load_config(path: Option<&Path>, args: &RunArgs) -> Result<Config> {
    let mut config = match path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    args.apply(&mut config);
    Ok(config)
}

fn target_dir(directory: Option<PathBuf>) -> PathBuf {
    directory.unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

fn handle_batch(config_path: Option<&Path>, args: &RunArgs, directory: Option<PathBuf>) -> i32 {
    let config = match load_config(config_path, args) {
        Ok(config) => config.into_run_config(target_dir(directory)),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return 1;
        }
    };
    debug!(?config, "run configuration");

    let token = CancelToken::new();
    let in_flight = InFlight::new();
    if let Err(e) = cancel::install_handler(token.clone(), in_flight.clone()) {
        eprintln!("Error: {:#}", e);
        return 1;
    }

    let backend = hardware::detect(config.behavior.disable_hardware, &config.tools);
    println!("Encoding backend: {}", backend);

    let mut sinks = ReportSet::new().with(ConsoleReport::stdout());
    if config.behavior.generate_report {
        sinks = sinks.with(JsonReport::new(&config.target_dir));
    }

    let coordinator = RunCoordinator::new(&config, backend, token, in_flight);
    match coordinator.run(&mut sinks) {
        Ok(_) => 0,
        Err(RunError::Interrupted { file }) => {
            eprintln!(
                "Interrupted while processing {}; partial output removed",
                file.display()
            );
            cancel::INTERRUPTED_EXIT_CODE
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn handle_check_tools(config_path: Option<&Path>, args: &RunArgs) -> Result<()> {
    let config = load_config(config_path, args)?;

    let version = engine::ffmpeg_version(&config.tools.ffmpeg)?;
    println!("ffmpeg found: {}", version);
    let probe_version = engine::ffprobe_version(&config.tools.ffprobe)?;
    println!("ffprobe found: {}", probe_version);
    Ok(())
}

fn handle_detect_hw(config_path: Option<&Path>, args: &RunArgs) -> Result<()> {
    let config = load_config(config_path, args)?;

    if config.behavior.disable_hardware {
        println!("Hardware encoding disabled by configuration");
        println!("Selected backend: {}", hardware::HardwareBackend::Cpu);
        return Ok(());
    }

    let signals = hardware::HostSignals::gather(&config.tools);
    let families = ["_nvenc", "_qsv", "_vaapi"]
        .into_iter()
        .filter(|suffix| signals.has_encoder_family(suffix))
        .collect::<Vec<_>>();

    println!(
        "ffmpeg hardware encoders: {}",
        if families.is_empty() {
            "none".to_string()
        } else {
            families.join(", ")
        }
    );
    match hardware::detect_nvidia_gpu() {
        Some(name) => println!("NVIDIA GPU: {}", name),
        None if signals.nvidia_device => println!("NVIDIA GPU: device node present"),
        None => println!("NVIDIA GPU: not found"),
    }
    if signals.render_devices.is_empty() {
        println!("Render nodes: none");
    }
    for device in &signals.render_devices {
        println!(
            "Render node: {} (vendor {})",
            device.path.display(),
            device.vendor.as_deref().unwrap_or("unknown")
        );
    }

    println!("Selected backend: {}", hardware::select_backend(&signals));
    Ok(())
}

fn handle_dry_run(
    config_path: Option<&Path>,
    args: &RunArgs,
    directory: Option<PathBuf>,
) -> Result<()> {
    let config = load_config(config_path, args)?.into_run_config(target_dir(directory));
    println!(
        "Dry run: building ffmpeg commands for {}",
        config.target_dir.display()
    );

    let backend = hardware::detect(config.behavior.disable_hardware, &config.tools);
    println!("Encoding backend: {}", backend);

    let coordinator = RunCoordinator::new(&config, backend, CancelToken::new(), InFlight::new());
    let previews = coordinator.preview()?;

    for (path, preview) in &previews {
        match preview {
            Preview::Invalid => println!("- {}: not a valid video", path.display()),
            Preview::Skip(reason) => println!("- {}: skip ({})", path.display(), reason),
            Preview::Encode {
                command,
                output_width,
            } => {
                match output_width {
                    Some(width) => println!(
                        "- {} -> {}x{}",
                        path.display(),
                        width,
                        config.encode.resolution.height()
                    ),
                    None => println!("- {}", path.display()),
                }
                println!("  {}", command);
            }
        }
    }
    println!("Total files: {}", previews.len());
    Ok(())
}

fn handle_init_config(config_path: Option<&Path>) -> Result<()> {
    let path = match config_path {
        Some(path) => path.to_path_buf(),
        None => Config::config_path()?,
    };

    if path.exists() {
        let cfg = Config::load_from(&path)?;
        println!("Config loaded successfully from {}", path.display());
        println!(
            "{}",
            toml::to_string_pretty(&cfg).context("Failed to serialize config")?
        );
        return Ok(());
    }

    println!("Config missing at {}", path.display());
    println!("Creating default config...");
    config::Config::default().save_to(&path)?;
    println!("Default config saved to {}", path.display());
    Ok(())
}
