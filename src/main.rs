// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Screen and keyboard backlight control from the ambient light sensor.
//!
//! By default this writes to the backlight files in `/sys` directly, which
//! needs udev rules granting access to them. With `--logind`, brightness is
//! set through systemd-logind instead, which works without any privileges
//! for a user logged in at the seat that controls the display.

use anyhow::Context;
use clap::Parser;
use log::LevelFilter;
use lumind::{
    Config, Daemon, DeviceSelection, Hardware, HardwarePort, IdleSensor, KeyboardLevels,
    LogindPort, NoIdleSensor, OutsideChangePolicy, SignalForwarder, SysfsPort, X11IdleSensor,
};
use std::{fs::OpenOptions, path::Path, path::PathBuf, time::Duration};

/// Screen and keyboard backlight controls via the ambient light sensor. All
/// brightness values are percentages.
#[derive(Parser)]
#[clap(version)]
struct Lumind {
    /// Show debug messages.
    #[clap(short, long)]
    verbose: bool,

    /// Show every file read and write.
    #[clap(short, long)]
    debug: bool,

    /// Only show errors.
    #[clap(short, long)]
    quiet: bool,

    /// Log to this file at debug level instead of the terminal.
    #[clap(long, value_name = "FILE")]
    log: Option<PathBuf>,

    /// Set brightness once from the current ambient light and exit.
    #[clap(long)]
    once: bool,

    /// Exit if brightness is changed by something else, instead of
    /// restoring it.
    #[clap(long)]
    stop_on_outside_change: bool,

    /// Set brightness through systemd-logind, so no write access to /sys is
    /// needed.
    #[clap(long)]
    logind: bool,

    /// Seconds between brightness updates.
    #[clap(short = 'i', long, default_value = "2", value_parser = seconds)]
    update_interval: Duration,

    /// Idle seconds before dimming the screen (0 to disable).
    #[clap(long, default_value = "0", value_parser = seconds, help_heading = "Idle dim")]
    idle_dim: Duration,

    /// Screen brightness while idle.
    #[clap(long, default_value_t = 5.0, help_heading = "Idle dim")]
    screen_brightness_dim_min: f64,

    /// Ambient light to brightness factor.
    #[clap(short = 'f', long, default_value_t = 5.5, help_heading = "Ambient light")]
    ambient_light_factor: f64,

    /// Minimum ambient light change before brightness follows.
    #[clap(short = 'u', long, default_value_t = 3.0, help_heading = "Ambient light")]
    ambient_light_delta_update: f64,

    /// Number of ambient light readings smoothed together.
    #[clap(long, default_value_t = 5, help_heading = "Ambient light")]
    ambient_light_measures_number: usize,

    /// Seconds between ambient light readings with --once.
    #[clap(long, default_value = "0.2", value_parser = seconds, help_heading = "Ambient light")]
    ambient_light_measures_interval: Duration,

    /// Lowest screen brightness ever set.
    #[clap(short = 'm', long, default_value_t = 5.0, help_heading = "Fading")]
    screen_brightness_min: f64,

    /// Seconds a screen brightness change takes.
    #[clap(short = 't', long, default_value = "0.5", value_parser = seconds, help_heading = "Fading")]
    screen_brightness_time: Duration,

    /// Ambient light below which the keyboard backlight is switched on.
    #[clap(long, default_value_t = 10.0, help_heading = "Fading")]
    keyboard_backlight_threshold: f64,

    /// Seconds between keyboard backlight steps.
    #[clap(long, default_value = "0.005", value_parser = seconds, help_heading = "Fading")]
    keyboard_brightness_step_duration: Duration,

    /// Highest keyboard backlight level.
    #[clap(long, default_value_t = 3, help_heading = "Fading")]
    keyboard_max_level: u32,

    /// Screen backlight device under /sys/class/backlight. Use this to
    /// override the automatic detection logic.
    #[clap(short = 's', long, help_heading = "Devices")]
    screen_backlight: Option<String>,

    /// Keyboard backlight device under /sys/class/leds.
    #[clap(short = 'k', long, help_heading = "Devices")]
    keyboard_backlight: Option<String>,

    /// Leave the keyboard backlight alone.
    #[clap(long, conflicts_with = "keyboard_backlight", help_heading = "Devices")]
    no_keyboard: bool,

    /// Ambient light sensor driver.
    #[clap(short = 'a', long, value_parser = ["acpi_als", "als"], help_heading = "Devices")]
    ambient_light_sensor: Option<String>,
}

impl Lumind {
    fn config(&self) -> Config {
        Config {
            update_interval: self.update_interval,
            outside_change: if self.stop_on_outside_change {
                OutsideChangePolicy::Terminate
            } else {
                OutsideChangePolicy::Reassert
            },
            idle_threshold: self.idle_dim,
            screen_dim_min: self.screen_brightness_dim_min,
            ambient_light_factor: self.ambient_light_factor,
            ambient_light_delta: self.ambient_light_delta_update,
            ambient_light_samples: self.ambient_light_measures_number,
            ambient_light_sample_interval: self.ambient_light_measures_interval,
            screen_min: self.screen_brightness_min,
            screen_fade: self.screen_brightness_time,
            keyboard_levels: KeyboardLevels {
                max_level: self.keyboard_max_level,
                threshold: self.keyboard_backlight_threshold,
            },
            keyboard_step: self.keyboard_brightness_step_duration,
            ..Config::default()
        }
    }

    fn selection(&self) -> DeviceSelection {
        DeviceSelection {
            screen: self.screen_backlight.clone(),
            keyboard: self.keyboard_backlight.clone(),
            no_keyboard: self.no_keyboard,
            ambient: self.ambient_light_sensor.clone(),
        }
    }
}

fn seconds(s: &str) -> Result<Duration, String> {
    let secs = s.parse::<f64>().map_err(|e| e.to_string())?;
    Duration::try_from_secs_f64(secs).map_err(|e| e.to_string())
}

fn setup_logging(args: &Lumind) -> anyhow::Result<()> {
    let level = if args.log.is_some() {
        LevelFilter::Debug
    } else if args.debug {
        LevelFilter::Trace
    } else if args.verbose {
        LevelFilter::Debug
    } else if args.quiet {
        LevelFilter::Error
    } else {
        LevelFilter::Info
    };

    let mut builder = env_logger::Builder::new();
    builder
        .filter_level(level)
        .parse_env(env_logger::Env::default());
    if let Some(path) = &args.log {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("can't open log file {}", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.init();
    Ok(())
}

fn main() -> anyhow::Result<()> {
    // First, validate the arguments.
    let args = Lumind::parse();
    setup_logging(&args)?;

    // Then, see if there are supported devices. This way we can tell the
    // user their system is unsupported before anything else goes wrong.
    let devices = lumind::devices::discover(Path::new("/"), &args.selection())
        .context("can't find supported devices")?;
    log::debug!("using devices: {devices:?}");

    let port: Box<dyn HardwarePort> = if args.logind {
        Box::new(LogindPort::connect().context("can't connect to logind")?)
    } else {
        Box::new(SysfsPort)
    };

    let config = args.config();
    let hardware = Hardware::new(port, devices, config.keyboard_settle)
        .context("can't read the screen backlight, are udev rules configured correctly?")?;
    if !hardware.has_keyboard() {
        log::info!("no keyboard backlight, only adjusting the screen");
    }
    let idle_enabled = config.idle_enabled();
    let daemon = Daemon::new(config, hardware)?;

    if args.once {
        return daemon.apply_once().context("can't set brightness");
    }

    let idle: Box<dyn IdleSensor> = if idle_enabled {
        match X11IdleSensor::connect() {
            Ok(sensor) => Box::new(sensor),
            Err(e) => {
                log::warn!("can't query the X server, idle dimming disabled: {e}");
                Box::new(NoIdleSensor)
            }
        }
    } else {
        Box::new(NoIdleSensor)
    };

    let _signals = SignalForwarder::install(daemon.shutdown_handle())
        .context("can't install signal handlers")?;
    daemon.run(idle).context("can't start worker threads")?;
    Ok(())
}
