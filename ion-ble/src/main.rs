//! Command line tool for ION lamps
//!
//! Scans for lamps, sends lamp commands, keeps the weather forecast fresh
//! and flashes firmware over BLE.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use ion_ble_controller::{
    BtleCentral, Catalog, Config, ConfigValue, DfuStage, Lamp, LampEvent, OpenWeatherMap, ion_home,
};
use ion_proto::Rgb;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "ion-ble")]
#[command(about = "Control ION lamps over Bluetooth LE")]
struct Cli {
    /// Logging verbosity level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Lamp name or address
    #[arg(short, long, global = true)]
    device: Option<String>,

    /// Mood catalog, defaults to $ION_HOME/catalog.json
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List nearby devices
    Scan {
        /// Scan duration in seconds
        #[arg(short = 't', long, default_value = "5")]
        duration: u64,
    },
    /// Show the current mood, or switch to another one
    Mood { name: Option<String> },
    /// Read or change a mood setting
    Config {
        mood: String,
        config: String,
        /// New value (the hue for color settings); the catalog default when omitted
        value: Option<i64>,
        /// Saturation for color settings
        #[arg(long)]
        saturation: Option<i64>,
        /// Read the setting instead of changing it
        #[arg(long)]
        get: bool,
    },
    /// Show the mood rotation, or replace it
    Rotation { moods: Vec<String> },
    /// Rename the lamp
    Rename { name: String },
    /// Play a stored notification
    Notify { name: String },
    /// Set the lamp clock to this machine's time
    Time,
    /// Fill every LED with one color (raw mode)
    Fill { r: u8, g: u8, b: u8 },
    /// Turn every LED off (raw mode)
    Clear,
    /// Push weather for a location, every 15 minutes until interrupted
    Weather {
        latitude: f64,
        longitude: f64,
        /// Push once and exit
        #[arg(long)]
        once: bool,
    },
    /// Print lamp events until interrupted, reconnecting on drops
    Monitor,
    /// Flash a firmware image onto a lamp in DFU mode
    Dfu {
        image: PathBuf,
        /// Ask the lamp (--device) to reboot into its bootloader first
        #[arg(long)]
        enter: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let home = ion_home()?;
    let config = Config::load(&home)?;

    match cli.command {
        Commands::Scan { duration } => {
            scan(&config, duration).await?;
        }
        Commands::Dfu { image, enter } => {
            if enter {
                let lamp = connect(&cli.device, &cli.catalog, &home, &config).await?;
                lamp.enter_dfu_mode().await?;
                println!("Lamp is rebooting into DFU mode");
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
            if let Err(e) = dfu(&config, &image).await {
                eprintln!("Firmware update failed: {e}");
                std::process::exit(1);
            }
        }
        command => {
            let lamp = connect(&cli.device, &cli.catalog, &home, &config).await?;
            run(&lamp, &config, command).await?;
            lamp.disconnect().await?;
        }
    }

    Ok(())
}

async fn scan(config: &Config, duration: u64) -> Result<(), Box<dyn std::error::Error>> {
    println!("Scanning for ION lamps ({duration} seconds)...");

    let lamp_service = config.lamp.as_ref().map(|l| l.service_uuid);
    let devices =
        ion_ble_controller::ble::scan(Duration::from_secs(duration), lamp_service, config.dfu.service_uuid)
            .await?;

    println!("\nFound {} devices:", devices.len());
    for device in devices {
        let rssi = device.rssi.map(|r| format!("{r} dBm")).unwrap_or_else(|| "N/A".to_string());
        let marker = match (device.is_lamp, device.in_dfu_mode) {
            (_, true) => " [DFU]",
            (true, false) => " [ION]",
            _ => "",
        };
        println!("  {} ({}) RSSI: {}{}", device.name, device.address, rssi, marker);
    }
    Ok(())
}

async fn connect(
    device: &Option<String>,
    catalog: &Option<PathBuf>,
    home: &std::path::Path,
    config: &Config,
) -> Result<Lamp<BtleCentral>, Box<dyn std::error::Error>> {
    let device = device.as_deref().ok_or("--device is required for lamp commands")?;
    let catalog_path = catalog.clone().unwrap_or_else(|| home.join("catalog.json"));
    let catalog = Catalog::load(&catalog_path)?;

    let central = BtleCentral::new().await?;
    let lamp = Lamp::new(central, device, config.lamp()?.clone(), catalog);

    println!("Connecting to {device}...");
    lamp.connect().await?;
    println!("Connected!");
    Ok(lamp)
}

async fn run(lamp: &Lamp<BtleCentral>, settings: &Config, command: Commands) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Mood { name: None } => {
            let mood = lamp.get_mood().await?;
            match mood.name {
                Some(name) => println!("Current mood: {name}"),
                None => println!("Current mood: #{}", mood.id),
            }
        }
        Commands::Mood { name: Some(name) } => {
            lamp.set_mood(&name).await?;
            println!("Mood set to {name}");
        }
        Commands::Config { mood, config, get: true, .. } => {
            let value = lamp.get_mood_config(&mood, &config).await?;
            println!("{mood} {config}: {value}");
        }
        Commands::Config { mood, config, value, saturation, get: false } => {
            let value = match (value, saturation) {
                (Some(hue), Some(saturation)) => ConfigValue::Color { hue, saturation },
                (Some(value), None) => ConfigValue::Value(value),
                (None, None) => ConfigValue::Default,
                (None, Some(_)) => return Err("--saturation needs a hue value".into()),
            };
            lamp.set_mood_config(&mood, &config, value).await?;
            println!("{mood} {config} updated");
        }
        Commands::Rotation { moods } if moods.is_empty() => {
            for mood in lamp.get_rotation().await? {
                match mood.name {
                    Some(name) => println!("  {name}"),
                    None => println!("  #{}", mood.id),
                }
            }
        }
        Commands::Rotation { moods } => {
            lamp.set_rotation(&moods).await?;
            println!("Rotation updated");
        }
        Commands::Rename { name } => {
            lamp.rename(&name).await?;
            println!("Lamp renamed to {}", lamp.name().unwrap_or(name));
        }
        Commands::Notify { name } => {
            lamp.trigger_notification(&name).await?;
        }
        Commands::Time => {
            lamp.set_time().await?;
            println!("Clock set");
        }
        Commands::Fill { r, g, b } => {
            lamp.raw_fill(Rgb::new(r, g, b)).await?;
        }
        Commands::Clear => {
            lamp.raw_clear_all().await?;
        }
        Commands::Weather { latitude, longitude, once } => {
            let source = OpenWeatherMap::new(settings.weather_api_key.clone());
            if once {
                lamp.push_weather(&source, latitude, longitude).await?;
                println!("Weather sent");
            } else {
                lamp.set_auto_reconnect(true);
                lamp.keep_weather_updated(source, latitude, longitude);
                println!("Updating weather, press Ctrl-C to stop");
                tokio::signal::ctrl_c().await?;
            }
        }
        Commands::Monitor => {
            lamp.set_auto_reconnect(true);
            monitor(lamp).await?;
        }
        Commands::Scan { .. } | Commands::Dfu { .. } => {}
    }
    Ok(())
}

async fn monitor(lamp: &Lamp<BtleCentral>) -> Result<(), Box<dyn std::error::Error>> {
    let mut events = lamp.subscribe();
    println!("Watching lamp events, press Ctrl-C to stop");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(LampEvent::MoodChanged(mood)) => {
                    println!("mood changed: {}", mood.name.unwrap_or_else(|| format!("#{}", mood.id)));
                }
                Ok(LampEvent::Error(e)) => println!("error: {e}"),
                Ok(event) => println!("{event:?}"),
                Err(e) => {
                    info!("event stream ended: {e}");
                    return Ok(());
                }
            },
            _ = tokio::signal::ctrl_c() => return Ok(()),
        }
    }
}

async fn dfu(config: &Config, image: &std::path::Path) -> Result<(), Box<dyn std::error::Error>> {
    let firmware = std::fs::read(image)?;
    println!("Read {} bytes from {}", firmware.len(), image.display());

    let central = BtleCentral::new().await?;
    ion_ble_controller::update_firmware(&central, firmware, &config.dfu, |stage| match stage {
        DfuStage::Uploading { .. } => {
            if let Some(percent) = stage.percent() {
                print!("\r{stage} ({percent:.0}%)");
            }
        }
        DfuStage::Complete => println!("\n{stage}"),
        stage => println!("{stage}"),
    })
    .await?;
    Ok(())
}
