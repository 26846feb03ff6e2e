use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use ledwall::display::Color;
use ledwall::mqtt::{self, RemoteControl};
use ledwall::{
    AnimationSpec, Engine, EngineConfig, FrameScheduler, Installation, Placement, UdpTransport,
    DEFAULT_PIXEL_PORT,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Stream a shared animation canvas to networked LED controllers")]
struct Args {
    /// Installation JSON. Created on `save` if it does not exist yet.
    #[arg(long)]
    installation: Option<PathBuf>,
    /// Target frames per second
    #[arg(long, default_value_t = 30)]
    fps: u32,
    /// Pixel protocol port for devices without their own
    #[arg(long, default_value_t = DEFAULT_PIXEL_PORT)]
    port: u16,
    #[arg(long, default_value = mqtt::DEFAULT_HOST)]
    mqtt_host: String,
    #[arg(long, default_value_t = mqtt::DEFAULT_PORT)]
    mqtt_port: u16,
    #[arg(long, default_value = mqtt::DEFAULT_TOPIC)]
    mqtt_topic: String,
    /// Run without the remote-control client
    #[arg(long)]
    no_mqtt: bool,
    /// Show the composited canvas in a window; clicks become touches
    /// (needs the `preview` feature)
    #[arg(long)]
    preview: bool,
    /// Exit after this many seconds
    #[arg(long)]
    duration: Option<f64>,
}

/// Layout used when no installation file is given
fn demo_installation() -> Installation {
    Installation::new("demo", 1000.0, 1000.0)
        .with_region(
            "background",
            Placement::new(0.0, 0.0, 1000.0, 1000.0),
            AnimationSpec::Plasma {
                speed: 1.0,
                palette: Vec::new(),
            },
        )
        .with_region(
            "ripples",
            Placement::new(250.0, 250.0, 500.0, 500.0).with_rotation(15.0),
            AnimationSpec::Ripples {
                color: Color::WHITE,
                speed: 1.0,
                rain_interval: 1.5,
            },
        )
}

fn load_installation(path: Option<&Path>) -> Result<Installation> {
    match path {
        Some(path) if path.exists() => Installation::load(path)
            .with_context(|| format!("loading installation {}", path.display())),
        Some(path) => {
            tracing::warn!(path = %path.display(), "installation not found, starting from the demo layout");
            Ok(demo_installation())
        }
        None => Ok(demo_installation()),
    }
}

fn apply_remote(remote: Option<&RemoteControl>, engine: &Engine, path: Option<&Path>) {
    let Some(remote) = remote else {
        return;
    };
    for command in remote.poll() {
        tracing::debug!(?command, "remote command");
        if let Err(err) = command.apply(engine, path) {
            tracing::warn!(error = %err, "remote command failed");
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let installation = load_installation(args.installation.as_deref())?;
    let config = EngineConfig::default()
        .with_base(installation.base_width, installation.base_height)
        .with_fps(args.fps)
        .with_port(args.port);
    let engine = Engine::new(&config);
    engine
        .apply_installation(&installation)
        .context("applying installation")?;

    let transport = UdpTransport::bind().context("binding UDP socket")?;
    let mut scheduler = FrameScheduler::new(engine.clone(), Arc::new(transport))
        .with_interval(config.frame_interval());
    scheduler.start()?;

    let remote = if args.no_mqtt {
        None
    } else {
        match RemoteControl::connect(&args.mqtt_host, args.mqtt_port, &args.mqtt_topic) {
            Ok(remote) => Some(remote),
            Err(err) => {
                tracing::warn!(error = %err, "remote control unavailable");
                None
            }
        }
    };

    let deadline = args
        .duration
        .map(|secs| Instant::now() + Duration::from_secs_f64(secs.max(0.0)));
    let path = args.installation.as_deref();

    if args.preview {
        #[cfg(feature = "preview")]
        {
            run_preview(&engine, remote.as_ref(), path, deadline)?;
            scheduler.stop();
            return Ok(());
        }
        #[cfg(not(feature = "preview"))]
        tracing::warn!("built without the `preview` feature; running headless");
    }

    while deadline.map_or(true, |d| Instant::now() < d) {
        apply_remote(remote.as_ref(), &engine, path);
        thread::sleep(Duration::from_millis(50));
    }

    scheduler.stop();
    Ok(())
}

#[cfg(feature = "preview")]
fn run_preview(
    engine: &Engine,
    remote: Option<&RemoteControl>,
    path: Option<&Path>,
    deadline: Option<Instant>,
) -> Result<()> {
    use ledwall::display::{PreviewEvent, PreviewTarget, PreviewWindow, DEFAULT_HEIGHT, DEFAULT_WIDTH};

    let (mut window, creator) =
        PreviewWindow::open("ledwall", DEFAULT_WIDTH, DEFAULT_HEIGHT).map_err(anyhow::Error::msg)?;
    let mut target = PreviewTarget::new(&creator);

    'main: while deadline.map_or(true, |d| Instant::now() < d) {
        let latest = engine.latest_preview();
        for event in window.poll_events() {
            match event {
                PreviewEvent::Quit => break 'main,
                PreviewEvent::Click { x, y } => {
                    let world = latest
                        .as_deref()
                        .and_then(|frame| window.window_to_world(frame, x, y));
                    if let Some(world) = world {
                        let region = engine.region_at(world.x, world.y);
                        let handled = engine.route_touch(world.x, world.y);
                        tracing::debug!(x = world.x, y = world.y, ?region, handled, "preview click");
                    }
                }
            }
        }

        apply_remote(remote, engine, path);

        match latest {
            // VSync paces the loop
            Some(frame) => window
                .present(&mut target, &frame)
                .map_err(anyhow::Error::msg)?,
            None => thread::sleep(Duration::from_millis(16)),
        }
    }
    Ok(())
}
