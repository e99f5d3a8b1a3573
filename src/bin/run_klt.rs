use anyhow::{bail, Context};
use clap::Parser;
use env_logger::{Builder, Env};
use log::{error, info};
use std::process;

use feature_tracker::image_operations::to_float_image;
use rs_klt::{grid_features, Config, OpticalFlowTracker, TrackStatus, TrackingSummary};

fn main() {
    // Initialize logger for immediate colored output
    Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .format(|buf, record| {
            use std::io::Write;
            let level = match record.level() {
                log::Level::Error => "\x1b[31mERROR\x1b[0m",
                log::Level::Warn => "\x1b[33mWARN\x1b[0m",
                log::Level::Info => "\x1b[32mINFO\x1b[0m",
                log::Level::Debug => "\x1b[34mDEBUG\x1b[0m",
                log::Level::Trace => "\x1b[36mTRACE\x1b[0m",
            };
            writeln!(
                buf,
                "[{}] [{}] {}",
                buf.timestamp_millis(),
                level,
                record.args()
            )
        })
        .init();

    // Parse command line arguments
    let args = Args::parse();

    match run(&args) {
        Ok(summary) => {
            info!("[Main] {} features: {} tracked, {} outside, {} large residual, {} numeric error",
                summary.total, summary.tracked, summary.outside_image, summary.large_residual, summary.numeric_error);
            match summary.mean_displacement {
                Some(v) => info!("[Main] mean displacement of tracked features: ({:.3}, {:.3})", v.x, v.y),
                None => info!("[Main] no feature tracked"),
            }
            process::exit(0);
        }
        Err(e) => {
            error!("[Main] tracking failed: {:#}", e);
            process::exit(-1);
        }
    }
}

fn run(args: &Args) -> anyhow::Result<TrackingSummary> {
    let config = Config::load(&args.config_file)
        .with_context(|| format!("loading {}", args.config_file))?;
    info!("[Main] options: {:?}", config.optical_flow);

    let ref_image = image::open(&args.reference_image)
        .with_context(|| format!("opening {}", args.reference_image))?
        .to_luma8();
    let cur_image = image::open(&args.current_image)
        .with_context(|| format!("opening {}", args.current_image))?
        .to_luma8();
    if ref_image.dimensions() != cur_image.dimensions() {
        bail!("image sizes differ: {:?} vs {:?}", ref_image.dimensions(), cur_image.dimensions());
    }
    let (ref_image, cur_image) = (to_float_image(&ref_image), to_float_image(&cur_image));

    let options = &config.optical_flow;
    let margin = options.patch_row_half_size.max(options.patch_col_half_size) + 1;
    let (width, height) = ref_image.dimensions();
    let ref_pixels = grid_features(width, height, args.grid_step, margin);
    info!("[Main] tracking {} grid features on {}x{} images", ref_pixels.len(), width, height);

    let mut cur_pixels = ref_pixels.clone();
    let mut status = vec![TrackStatus::NotTracked; ref_pixels.len()];
    let mut tracker = OpticalFlowTracker::new(config.optical_flow.clone());
    if args.parallel {
        tracker.track_single_level_parallel(&ref_image, &cur_image, &ref_pixels, &mut cur_pixels, &mut status);
    } else {
        tracker.prepare_for_tracking();
        tracker.track_single_level(&ref_image, &cur_image, &ref_pixels, &mut cur_pixels, &mut status);
    }

    Ok(TrackingSummary::new(&ref_pixels, &cur_pixels, &status))
}

#[derive(Parser, Debug)]
#[command(name = "run_klt")]
#[command(about = "Track a grid of features between two images")]
struct Args {
    /// Path to configuration file (YAML)
    #[arg(help = "Path to configuration file (e.g., config/klt.yaml)")]
    config_file: String,

    #[arg(help = "Reference image")]
    reference_image: String,

    #[arg(help = "Current image")]
    current_image: String,

    /// Distance in pixels between seeded features
    #[arg(long, default_value_t = 20)]
    grid_step: u32,

    /// Spread features over the rayon thread pool
    #[arg(long)]
    parallel: bool,
}
