use anyhow::{Context, Result};
use bevcast_core::grid::presets as grids;
use bevcast_core::WarpMode;
use bevcast_model::temporal::presets;
use bevcast_model::{ActivationKind, FuturePredictionConfig, NormKind};
use burn::config::Config;
use burn::tensor::{Distribution, Tensor};
use burn_ndarray::NdArray;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

type Backend = NdArray<f32>;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Developer tasks for the bevcast workspace")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the prediction engine on random inputs and report shapes and timing
    Predict(PredictArgs),

    /// Print a prediction preset as JSON
    ShowConfig {
        /// Preset name (reference, lightweight)
        #[arg(default_value = "reference")]
        preset: String,
    },

    /// Write a prediction preset to a JSON file
    SaveConfig {
        /// Output file
        path: PathBuf,

        /// Preset name (reference, lightweight)
        #[arg(short, long, default_value = "reference")]
        preset: String,
    },

    /// List BEV grid presets and their feature-map shapes
    ListGrids,
}

#[derive(Args)]
struct PredictArgs {
    /// Load the engine configuration from a JSON file instead of the flags below
    #[arg(long)]
    config: Option<PathBuf>,

    /// Batch size
    #[arg(short, long, default_value_t = 1)]
    batch: usize,

    /// Number of future steps
    #[arg(short = 't', long, default_value_t = 5)]
    horizon: usize,

    /// Grid preset deciding the spatial size (base, det, mot, seg)
    #[arg(short, long, default_value = "mot")]
    grid: String,

    /// Override the grid height
    #[arg(long)]
    height: Option<usize>,

    /// Override the grid width
    #[arg(long)]
    width: Option<usize>,

    #[arg(long, default_value_t = 64)]
    in_channels: usize,

    #[arg(long, default_value_t = 64)]
    latent_dim: usize,

    #[arg(long, default_value_t = 3)]
    n_gru_blocks: usize,

    #[arg(long, default_value_t = 3)]
    n_res_layers: usize,

    #[arg(long, default_value_t = 0.0)]
    gru_bias_init: f64,

    /// Normalization (bn, in, none)
    #[arg(long, default_value = "bn")]
    norm: String,

    /// Activation (relu, lrelu, elu, tanh, none)
    #[arg(long, default_value = "relu")]
    activation: String,

    /// Feed a constant motion field of this many cells along x
    #[arg(long)]
    shift_x: Option<f32>,

    /// Warp interpolation (bilinear, nearest)
    #[arg(long, default_value = "bilinear")]
    warp_mode: String,

    /// Number of timed forward passes
    #[arg(short, long, default_value_t = 1)]
    iterations: usize,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Predict(args) => {
            predict(&args)?;
        }
        Commands::ShowConfig { preset } => {
            println!("{}", presets::by_name(&preset)?);
        }
        Commands::SaveConfig { path, preset } => {
            save_config(&path, &preset)?;
        }
        Commands::ListGrids => {
            list_grids()?;
        }
    }

    Ok(())
}

fn engine_config(args: &PredictArgs) -> Result<FuturePredictionConfig> {
    if let Some(path) = &args.config {
        return FuturePredictionConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()));
    }

    Ok(FuturePredictionConfig::new(args.in_channels, args.latent_dim)
        .with_n_gru_blocks(args.n_gru_blocks)
        .with_n_res_layers(args.n_res_layers)
        .with_gru_bias_init(args.gru_bias_init)
        .with_norm(args.norm.parse::<NormKind>()?)
        .with_activation(args.activation.parse::<ActivationKind>()?)
        .with_warp_mode(args.warp_mode.parse::<WarpMode>()?))
}

fn predict(args: &PredictArgs) -> Result<()> {
    let config = engine_config(args)?;
    let [grid_h, grid_w] = grids::by_name(&args.grid)?.spatial_shape()?;
    let height = args.height.unwrap_or(grid_h);
    let width = args.width.unwrap_or(grid_w);

    let device = Default::default();
    let model = config.init::<Backend>(&device)?;

    let latent_shape = [args.batch, args.horizon, config.latent_dim, height, width];
    let state_shape = [args.batch, config.in_channels, height, width];
    info!("Latent input {:?}, current state {:?}", latent_shape, state_shape);

    let x = Tensor::<Backend, 5>::random(latent_shape, Distribution::Normal(0.0, 1.0), &device);
    let state = Tensor::<Backend, 4>::random(state_shape, Distribution::Normal(0.0, 1.0), &device);
    let flow = args.shift_x.map(|dx| {
        let flow_x = Tensor::<Backend, 5>::full([args.batch, args.horizon, 1, height, width], dx, &device);
        let flow_y = Tensor::<Backend, 5>::zeros([args.batch, args.horizon, 1, height, width], &device);
        Tensor::cat(vec![flow_x, flow_y], 2)
    });

    for i in 0..args.iterations.max(1) {
        let start = Instant::now();
        let output = model.forward_with_motion(x.clone(), state.clone(), flow.clone())?;
        info!(
            "Iteration {}: output {:?} in {:.2?}",
            i + 1,
            output.dims(),
            start.elapsed()
        );
    }

    Ok(())
}

fn save_config(path: &Path, preset: &str) -> Result<()> {
    let config = presets::by_name(preset)?;
    config
        .save(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    info!("Saved '{}' preset to {}", preset, path.display());
    Ok(())
}

fn list_grids() -> Result<()> {
    println!("Available BEV grids:");
    println!();
    for name in grids::NAMES {
        let grid = grids::by_name(name)?;
        let [height, width] = grid.spatial_shape()?;
        print!("  {:<8} {:>4} x {:<4}", name, height, width);
        if let Some(bins) = grid.depth_bins()? {
            print!("  z cells {}, depth bins {}", grid.vertical_cells()?, bins);
        }
        println!();
    }
    Ok(())
}
