use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use moodcam_hw::{Camera, CaptureConstraints, FacingMode};
use serde_json::Value;
use std::path::{Path, PathBuf};

#[zbus::proxy(
    interface = "org.freedesktop.MoodCam1",
    default_service = "org.freedesktop.MoodCam1",
    default_path = "/org/freedesktop/MoodCam1"
)]
trait MoodCam {
    fn set_mode(&self, mode: &str) -> zbus::Result<String>;
    fn check(&self) -> zbus::Result<String>;
    fn restart(&self) -> zbus::Result<String>;
    fn status(&self) -> zbus::Result<String>;

    #[zbus(signal)]
    fn state_changed(&self, state: &str) -> zbus::Result<()>;
}

#[derive(Parser)]
#[command(name = "moodcam", about = "MoodCam live mood/age classifier CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show daemon status
    Status {
        /// Print the raw JSON
        #[arg(long)]
        json: bool,
    },
    /// Switch classification mode
    Mode {
        /// "mood" or "age"
        mode: String,
    },
    /// Sample one frame now and print the outcome
    Check,
    /// Release and reacquire the camera and models
    Restart,
    /// Print a line for every state change
    Watch,
    /// Grab one frame directly from the camera (bypasses the daemon)
    Test {
        #[arg(short, long, default_value = "/dev/video0")]
        device: String,
        #[arg(long, default_value_t = 720)]
        width: u32,
        #[arg(long, default_value_t = 560)]
        height: u32,
        /// Where to write the grayscale PNG
        #[arg(short, long, default_value = "moodcam-test.png")]
        output: PathBuf,
    },
    /// List V4L2 capture devices
    Devices,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Status { json } => {
            let proxy = connect().await?;
            let raw = proxy.status().await.context("Status() failed")?;
            if json {
                println!("{raw}");
            } else {
                let status: Value = serde_json::from_str(&raw)?;
                println!("moodcamd {}", status["version"].as_str().unwrap_or("?"));
                print_state(&status["session"], true);
            }
        }
        Commands::Mode { mode } => {
            let proxy = connect().await?;
            let raw = proxy.set_mode(&mode).await.context("SetMode() failed")?;
            print_state(&serde_json::from_str(&raw)?, false);
        }
        Commands::Check => {
            let proxy = connect().await?;
            let raw = proxy.check().await.context("Check() failed")?;
            print_state(&serde_json::from_str(&raw)?, false);
        }
        Commands::Restart => {
            let proxy = connect().await?;
            let raw = proxy.restart().await.context("Restart() failed")?;
            print_state(&serde_json::from_str(&raw)?, false);
        }
        Commands::Watch => {
            let proxy = connect().await?;
            let mut changes = proxy.receive_state_changed().await?;
            println!("watching moodcamd (Ctrl-C to stop)");
            while let Some(signal) = changes.next().await {
                let args = signal.args()?;
                match serde_json::from_str::<Value>(args.state) {
                    Ok(state) => println!("{}", summary_line(&state)),
                    Err(e) => tracing::warn!(error = %e, "unparseable StateChanged payload"),
                }
            }
        }
        Commands::Test {
            device,
            width,
            height,
            output,
        } => camera_test(&device, width, height, &output)?,
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("No V4L2 capture devices found");
            }
            for d in devices {
                println!("{}  {} ({}, {})", d.path, d.name, d.driver, d.bus);
            }
        }
    }

    Ok(())
}

async fn connect() -> Result<MoodCamProxy<'static>> {
    let conn = zbus::Connection::session()
        .await
        .context("cannot reach the session bus")?;
    MoodCamProxy::new(&conn)
        .await
        .context("cannot reach moodcamd; is it running?")
}

fn camera_test(device: &str, width: u32, height: u32, output: &Path) -> Result<()> {
    println!("Opening {device}...");
    let constraints = CaptureConstraints {
        width,
        height,
        facing: FacingMode::User,
    };
    let camera = Camera::open(device, &constraints)?;
    println!(
        "  {}x{} {:?} ({:?})",
        camera.width,
        camera.height,
        camera.fourcc,
        camera.pixel_format()
    );

    let frame = camera.capture_frame()?;
    println!(
        "  frame #{}: {} bytes, avg brightness {:.1}",
        frame.sequence,
        frame.data.len(),
        frame.avg_brightness()
    );

    let Some(image) = image::GrayImage::from_raw(frame.width, frame.height, frame.data) else {
        bail!("frame buffer does not match {}x{}", frame.width, frame.height);
    };
    image
        .save(output)
        .with_context(|| format!("writing {}", output.display()))?;
    println!("  saved {}", output.display());
    Ok(())
}

fn summary_line(state: &Value) -> String {
    let phase = state["phase"].as_str().unwrap_or("?");
    let mode = state["mode"].as_str().unwrap_or("?");
    let mut line = format!("[{mode}] {phase}");
    if let Some(display) = state["display"].as_str() {
        line.push_str(&format!(": {display}"));
    }
    if let Some(message) = state["message"].as_str() {
        line.push_str(&format!(" | {message}"));
    }
    if state["effects"]["celebrating"].as_bool() == Some(true) {
        line.push_str(" *");
    }
    if let Some(error) = state["error"].as_str() {
        line.push_str(&format!(" ({error})"));
    }
    line
}

fn print_state(state: &Value, verbose: bool) {
    println!("{}", summary_line(state));
    if verbose {
        let stats = &state["stats"];
        println!(
            "  session {}  sampling {}",
            state["session_id"].as_str().unwrap_or("?"),
            state["sampling"]["kind"].as_str().unwrap_or("?"),
        );
        println!(
            "  samples {}  skipped ticks {}  inference failures {}  stale {}",
            stats["samples"], stats["skipped_ticks"], stats["inference_failures"], stats["stale_results"],
        );
    }
}
