// Touchrelay CLI
// Grabs the touch panels and re-emits them through a virtual touchscreen

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;

use touchrelay_core::input::list_touch_devices;
use touchrelay_core::{Session, Settings};

/// Multi-touch relay for Linux touch panels
#[derive(Parser, Debug)]
#[command(name = "touchrelay")]
#[command(author = "touchrelay contributors")]
#[command(version)]
#[command(about = "Relay physical touch panels through a virtual touchscreen", long_about = None)]
struct Args {
    /// TOML settings file
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Logical screen width in pixels
    #[arg(long)]
    width: Option<u32>,

    /// Logical screen height in pixels
    #[arg(long)]
    height: Option<u32>,

    /// Display rotation index (0-3)
    #[arg(long, value_parser = clap::value_parser!(i32).range(0..=3))]
    orientation: Option<i32>,

    /// Panel is wired with swapped axes
    #[arg(long)]
    other_touch: bool,

    /// Observe panels without grabbing or re-emitting them
    #[arg(long)]
    read_only: bool,

    /// List multi-touch panels and exit
    #[arg(long)]
    list_devices: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn load_settings(args: &Args) -> anyhow::Result<Settings> {
    let mut settings = match &args.config {
        Some(path) => Settings::from_file(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => Settings::load_default().context("loading default settings")?,
    };
    apply_overrides(&mut settings, args);
    settings.validate()?;
    Ok(settings)
}

/// Command-line flags take precedence over the settings file.
fn apply_overrides(settings: &mut Settings, args: &Args) {
    if let Some(width) = args.width {
        settings.screen.width = width;
    }
    if let Some(height) = args.height {
        settings.screen.height = height;
    }
    if let Some(orientation) = args.orientation {
        settings.screen.orientation = orientation;
    }
    if args.other_touch {
        settings.screen.other_touch = true;
    }
    if args.read_only {
        settings.session.read_only = true;
    }
}

fn list_devices(settings: &Settings) -> anyhow::Result<()> {
    let devices = list_touch_devices(&settings.session.input_dir)?;
    println!("Found {} multi-touch panel(s):", devices.len());
    for device in &devices {
        println!(
            "  {}: {} ({}) x 0..{} y 0..{}",
            device.index,
            device.name,
            device.path.display(),
            device.axes.x.maximum,
            device.axes.y.maximum
        );
    }
    Ok(())
}

fn install_signal_handler(running: Arc<AtomicBool>) {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    std::thread::spawn(move || match Signals::new([SIGINT, SIGTERM]) {
        Ok(mut signals) => {
            if let Some(signal) = signals.forever().next() {
                log::info!("Received signal {}, shutting down", signal);
                running.store(false, Ordering::SeqCst);
            }
        }
        Err(e) => log::warn!("Could not install signal handler: {}", e),
    });
}

fn run(settings: &Settings) -> anyhow::Result<()> {
    let session = Session::new(settings.session_config());
    session.set_orientation(settings.screen.orientation);
    session.set_other_touch(settings.screen.other_touch);

    session
        .init(settings.screen_size(), settings.session.read_only)
        .context("starting touch session")?;
    log::info!(
        "Relaying {} panel(s), orientation {}",
        session.device_count(),
        session.orientation()
    );

    let running = Arc::new(AtomicBool::new(true));
    install_signal_handler(running.clone());

    while running.load(Ordering::SeqCst) && session.is_initialized() {
        std::thread::sleep(Duration::from_millis(100));
    }

    let stopped_by_error = !session.is_initialized();
    session.close();
    if stopped_by_error {
        bail!("session stopped after an upload failure");
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let settings = load_settings(&args)?;

    if args.list_devices {
        return list_devices(&settings);
    }

    run(&settings)
}
