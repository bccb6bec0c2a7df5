use std::process;

use clap::Parser;
use log::info;
use rand::{rngs::StdRng, SeedableRng};

use loopybp_rust::{
    build_grid_mrf, smoothness_prior, DenoiseError, EngineOptions, Image, ResidualEngine,
    SharedParams, SmoothingKind,
};

/// Creates and denoises a synthetic image using asynchronous residual loopy
/// belief propagation over a pairwise Markov random field.
#[derive(Parser)]
#[command(name = "loopybp-denoise")]
#[command(version)]
#[command(about = "Loopy BP image denoising")]
struct Cli {
    /// Residual termination bound
    #[arg(long, default_value_t = 1e-15)]
    bound: f64,

    /// The amount of message damping
    #[arg(long, default_value_t = 0.1)]
    damping: f64,

    /// The number of colors in the noisy image
    #[arg(long, default_value_t = 5)]
    colors: usize,

    /// The number of rows in the noisy image
    #[arg(long, default_value_t = 200)]
    rows: usize,

    /// The number of columns in the noisy image
    #[arg(long, default_value_t = 200)]
    cols: usize,

    /// Standard deviation of the noise
    #[arg(long, default_value_t = 2.)]
    sigma: f64,

    /// Smoothness parameter (larger => smoother)
    #[arg(long, default_value_t = 10.)]
    lambda: f64,

    /// Smoothing prior: square or laplace
    #[arg(long, default_value = "laplace")]
    smoothing: String,

    /// Original image file name
    #[arg(long, default_value = "source_img.png")]
    orig: String,

    /// Noisy image file name
    #[arg(long, default_value = "noisy_img.png")]
    noisy: String,

    /// Predicted image file name
    #[arg(long, default_value = "pred_img.png")]
    pred: String,

    /// Prediction read-out: map or exp
    #[arg(long, default_value = "map")]
    pred_type: String,

    /// Number of worker threads (defaults to the available parallelism)
    #[arg(long)]
    workers: Option<usize>,

    /// Seed for the noise generator (entropy-seeded when absent)
    #[arg(long)]
    seed: Option<u64>,

    /// Abort after this many updates, keeping the best-effort beliefs
    #[arg(long)]
    max_updates: Option<usize>,
}

fn run(cli: &Cli) -> Result<(), DenoiseError> {
    let smoothing: SmoothingKind = cli.smoothing.parse()?;
    if !(0. ..=1.).contains(&cli.damping) {
        return Err(DenoiseError::DampingOutOfRange(cli.damping));
    }
    match cli.pred_type.as_str() {
        "map" | "exp" => {}
        other => return Err(DenoiseError::UnknownPrediction(other.to_string())),
    }

    info!(
        "bound: {}, damping: {}, colors: {}, rows: {}, cols: {}, sigma: {}, lambda: {}, smoothing: {}, pred_type: {}",
        cli.bound,
        cli.damping,
        cli.colors,
        cli.rows,
        cli.cols,
        cli.sigma,
        cli.lambda,
        cli.smoothing,
        cli.pred_type
    );

    // Create the synthetic image and its corrupted observation
    info!("Creating a synthetic image.");
    let mut img = Image::new(cli.rows, cli.cols);
    img.paint_sunset(cli.colors);
    img.save(&cli.orig)?;

    info!("Corrupting the image.");
    let mut rng = match cli.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    img.corrupt(cli.sigma, &mut rng);
    img.save(&cli.noisy)?;

    // Construct the pairwise Markov random field
    info!("Constructing the pairwise Markov random field.");
    let mrf = build_grid_mrf(&img, cli.colors, cli.sigma)?;

    info!("Initializing the shared edge agreement factor.");
    let shared = SharedParams {
        edge_factor: smoothness_prior(smoothing, cli.colors, cli.lambda)?,
        bound: cli.bound,
        damping: cli.damping,
    };

    // Run the engine to convergence
    let mut options = EngineOptions::default();
    if let Some(workers) = cli.workers {
        options.set_num_workers(workers);
    }
    options.set_max_updates(cli.max_updates);
    let engine = ResidualEngine::new(&mrf, &shared);
    let stats = engine.run_until_converged(&options);
    info!(
        "Finished running the engine in {:?}. Total updates: {}. Efficiency: {:.0} updates per second.",
        stats.elapsed,
        stats.num_updates,
        stats.updates_per_second()
    );

    // Render the cleaned image from the converged beliefs
    info!("Rendering the cleaned image.");
    for vertex in 0..mrf.num_vertices() {
        let belief = mrf.belief(vertex);
        let prediction = match cli.pred_type.as_str() {
            "map" => belief.max_asg() as f64,
            _ => belief.expectation(),
        };
        img.set_pixel_by_id(vertex, prediction);
    }
    img.save(&cli.pred)?;

    info!("Done.");
    Ok(())
}

fn main() {
    if std::env::var_os("RUST_LOG").is_none() {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();
    let cli = Cli::parse();
    if let Err(error) = run(&cli) {
        eprintln!("Error: {}", error);
        process::exit(1);
    }
}
