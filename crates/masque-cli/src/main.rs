use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use masque_core::{FilterCatalog, FilterKind, FilterRenderer, FilterSet, FilterToggles, JsonLinesSource};
use masque_hw::Camera;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::EnvFilter;

mod config;
mod pipeline;

use config::Config;
use pipeline::{CaptureSettings, RenderedFrame};

#[derive(Parser)]
#[command(name = "masque", about = "Draw hats, glasses, mustaches and beards on faces")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct FilterArgs {
    /// Filter to enable (repeatable): hat, mustache, beard, glasses
    #[arg(short, long = "filter")]
    filters: Vec<FilterKind>,
    /// Directory containing the sprite PNGs
    #[arg(long)]
    assets: Option<PathBuf>,
    /// Filter catalog TOML replacing the built-in one
    #[arg(long)]
    catalog: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply filters to a still image
    Apply {
        /// Input image
        #[arg(short, long)]
        image: PathBuf,
        /// JSON array of faces (rect + 68 landmarks) for the image
        #[arg(long)]
        faces: PathBuf,
        /// Where to write the result
        #[arg(short, long)]
        output: PathBuf,
        #[command(flatten)]
        filter_args: FilterArgs,
    },
    /// Filter live camera frames
    Run {
        /// V4L2 device (overrides MASQUE_CAMERA_DEVICE)
        #[arg(long)]
        camera: Option<String>,
        /// JSON Lines landmark feed, one line per frame (file or FIFO)
        #[arg(long)]
        faces: PathBuf,
        /// Write numbered PNGs here instead of raw RGB to stdout
        #[arg(long)]
        output_dir: Option<PathBuf>,
        #[command(flatten)]
        filter_args: FilterArgs,
    },
    /// List capture devices
    Devices,
    /// Show the filter catalog
    Filters {
        /// Filter catalog TOML replacing the built-in one
        #[arg(long)]
        catalog: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout may carry video; keep logs on stderr.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    match cli.command {
        Commands::Apply {
            image,
            faces,
            output,
            filter_args,
        } => apply(&config, &image, &faces, &output, filter_args),
        Commands::Run {
            camera,
            faces,
            output_dir,
            filter_args,
        } => run(config, camera, &faces, output_dir, filter_args).await,
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("No capture devices found");
            }
            for dev in devices {
                println!("{}\t{}\t{} ({})", dev.path, dev.name, dev.driver, dev.bus);
            }
            Ok(())
        }
        Commands::Filters { catalog } => {
            let catalog = load_catalog(catalog.as_deref().or(config.catalog_path.as_deref()))?;
            for spec in catalog.iter() {
                println!(
                    "{:<9} {:<16} anchor={:?} offset=({}, {}) width×{}",
                    spec.kind.name(),
                    spec.asset.display().to_string(),
                    spec.anchor,
                    spec.offset_x,
                    spec.offset_y,
                    spec.width_scale
                );
            }
            Ok(())
        }
    }
}

fn load_catalog(path: Option<&Path>) -> Result<FilterCatalog> {
    match path {
        Some(path) => FilterCatalog::load(path)
            .with_context(|| format!("loading filter catalog {}", path.display())),
        None => Ok(FilterCatalog::embedded().clone()),
    }
}

/// Resolve renderer and initial filter set; CLI flags win over the environment.
fn build_renderer(config: &Config, args: &FilterArgs) -> Result<(FilterRenderer, FilterSet)> {
    let catalog = load_catalog(args.catalog.as_deref().or(config.catalog_path.as_deref()))?;
    let asset_dir = args.assets.clone().unwrap_or_else(|| config.asset_dir.clone());
    let filters = if args.filters.is_empty() {
        config.filters
    } else {
        args.filters.iter().copied().collect()
    };

    tracing::info!(assets = %asset_dir.display(), %filters, "filters configured");
    Ok((FilterRenderer::new(catalog, asset_dir), filters))
}

fn apply(config: &Config, image: &Path, faces: &Path, output: &Path, args: FilterArgs) -> Result<()> {
    let (renderer, filters) = build_renderer(config, &args)?;

    let mut frame = image::open(image)
        .with_context(|| format!("reading {}", image.display()))?
        .to_rgb8();
    let json = std::fs::read_to_string(faces).with_context(|| format!("reading {}", faces.display()))?;
    let faces = masque_core::parse_faces(&json).with_context(|| format!("parsing {}", faces.display()))?;

    let sprites = renderer.render_frame(&mut frame, &faces, filters);
    frame
        .save(output)
        .with_context(|| format!("writing {}", output.display()))?;

    println!("{} face(s), {} sprite(s) drawn → {}", faces.len(), sprites, output.display());
    Ok(())
}

async fn run(
    config: Config,
    camera: Option<String>,
    faces: &Path,
    output_dir: Option<PathBuf>,
    args: FilterArgs,
) -> Result<()> {
    let (renderer, filters) = build_renderer(&config, &args)?;
    let toggles = Arc::new(FilterToggles::new(filters));

    let feed = std::fs::File::open(faces).with_context(|| format!("opening landmark feed {}", faces.display()))?;
    let source = JsonLinesSource::new(std::io::BufReader::new(feed));

    if let Some(dir) = &output_dir {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }

    let settings = CaptureSettings {
        device: camera.unwrap_or(config.camera_device),
        width: config.frame_width,
        height: config.frame_height,
        warmup_frames: config.warmup_frames,
        queue: config.frame_queue,
    };
    let (handle, mut frames) = pipeline::spawn_pipeline(settings, renderer, source, Arc::clone(&toggles))?;

    tracing::info!("running; type a filter name on stdin to toggle it, 'quit' to stop");

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                break;
            }
            line = stdin.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    if !handle_command(line.trim(), &toggles) {
                        break;
                    }
                }
                Ok(None) => stdin_open = false,
                Err(e) => {
                    tracing::warn!(error = %e, "stdin closed");
                    stdin_open = false;
                }
            },
            frame = frames.recv() => match frame {
                Some(frame) => write_frame(frame, output_dir.as_deref(), &mut stdout).await?,
                None => break,
            },
        }
    }

    handle.stop();
    drop(frames);
    let stats = tokio::task::spawn_blocking(move || handle.join()).await??;
    tracing::info!(
        frames = stats.frames,
        sprites = stats.sprites,
        feed_errors = stats.feed_errors,
        "pipeline finished"
    );
    Ok(())
}

/// Apply one stdin command. Returns false when the user asked to quit.
fn handle_command(cmd: &str, toggles: &FilterToggles) -> bool {
    match cmd {
        "" => true,
        "quit" | "q" | "exit" => false,
        name => {
            match name.parse::<FilterKind>() {
                Ok(kind) => {
                    let enabled = toggles.toggle(kind);
                    tracing::info!(filter = %kind, enabled, "filter toggled");
                }
                Err(e) => tracing::warn!(error = %e, "unknown command"),
            }
            true
        }
    }
}

/// PNG encoding runs on the blocking pool; raw frames go straight to stdout.
async fn write_frame(
    frame: RenderedFrame,
    output_dir: Option<&Path>,
    stdout: &mut tokio::io::Stdout,
) -> Result<()> {
    let (sequence, sprites) = (frame.sequence, frame.sprites);
    match output_dir {
        Some(dir) => {
            let path = dir.join(format!("frame_{sequence:06}.png"));
            tokio::task::spawn_blocking(move || {
                frame
                    .image
                    .save(&path)
                    .with_context(|| format!("writing {}", path.display()))
            })
            .await??;
        }
        None => {
            stdout.write_all(frame.image.as_raw()).await?;
            stdout.flush().await?;
        }
    }
    tracing::trace!(seq = sequence, sprites, "frame written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_command() {
        let toggles = FilterToggles::default();
        assert!(handle_command("hat", &toggles));
        assert!(toggles.snapshot().contains(FilterKind::Hat));
        assert!(handle_command("hat", &toggles));
        assert!(!toggles.snapshot().contains(FilterKind::Hat));
        assert!(handle_command("monocle", &toggles));
        assert!(handle_command("", &toggles));
        assert!(!handle_command("quit", &toggles));
    }

    #[test]
    fn test_cli_parses_repeated_filters() {
        let cli = Cli::try_parse_from([
            "masque", "apply", "-i", "in.png", "--faces", "f.json", "-o", "out.png", "-f", "hat", "--filter", "beard",
        ])
        .unwrap();
        let Commands::Apply { filter_args, .. } = cli.command else {
            panic!("expected apply");
        };
        assert_eq!(filter_args.filters, vec![FilterKind::Hat, FilterKind::Beard]);
    }

    #[test]
    fn test_cli_rejects_unknown_filter() {
        let res = Cli::try_parse_from(["masque", "run", "--faces", "feed.jsonl", "-f", "monocle"]);
        assert!(res.is_err());
    }

    #[tokio::test]
    async fn test_write_frame_saves_numbered_png() {
        let dir = std::env::temp_dir().join(format!("masque-write-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();

        let frame = RenderedFrame {
            image: image::RgbImage::from_pixel(4, 3, image::Rgb([1, 2, 3])),
            sequence: 7,
            sprites: 0,
        };
        let mut stdout = tokio::io::stdout();
        write_frame(frame, Some(&dir), &mut stdout).await.unwrap();

        let saved = image::open(dir.join("frame_000007.png")).unwrap().to_rgb8();
        assert_eq!(saved.dimensions(), (4, 3));
        assert_eq!(saved.get_pixel(3, 2).0, [1, 2, 3]);
    }
}
