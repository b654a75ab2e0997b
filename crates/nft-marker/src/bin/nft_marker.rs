//! nft-marker CLI: generate, inspect and maintain natural-feature markers.

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use nft_marker::cache::{JsonFileCache, TtlPolicy};
use nft_marker::codec::{
    decode_feature_set, decode_image_set, decode_multiscale_set, FSET3_MAGIC, FSET_MAGIC,
    ISET_MAGIC,
};
use nft_marker::{AnalysisResult, FeatureDensity, MarkerConfig, MarkerGenerator, MarkerSource};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "nft-marker")]
#[command(about = "Generate natural-feature AR markers (.fset / .fset3 / .iset) from images")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate (or regenerate) a marker from an image.
    Generate(GenerateArgs),

    /// Print a JSON summary of a marker artifact.
    Inspect {
        /// Path to a .fset, .fset3 or .iset file.
        artifact: PathBuf,

        /// Include every feature point in the output.
        #[arg(long)]
        points: bool,
    },

    /// Delete expired and unreadable analysis cache entries.
    PurgeCache {
        /// Storage root containing `nft_cache/`.
        #[arg(long)]
        root: PathBuf,

        /// Entry lifetime in days.
        #[arg(long, default_value_t = 7, value_parser = clap::value_parser!(i64).range(0..=36_500))]
        ttl_days: i64,
    },
}

#[derive(Debug, Clone, Args)]
struct GenerateArgs {
    /// Path to the source image.
    #[arg(long)]
    image: PathBuf,

    /// Marker identifier (ASCII letters, digits, '-' and '_').
    #[arg(long)]
    id: String,

    /// Storage root; artifacts go to `<root>/nft_markers/<id>/`.
    #[arg(long)]
    root: PathBuf,

    /// JSON config file; flags below override its fields.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Feature grid density.
    #[arg(long, value_enum)]
    density: Option<DensityArg>,

    /// Number of pyramid levels (1-3).
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=3))]
    levels: Option<u8>,

    /// Assumed print resolution of the source image.
    #[arg(long)]
    dpi: Option<f32>,

    /// Stretch contrast before extraction on poor or fair images.
    #[arg(long)]
    auto_enhance: bool,

    /// Write the generation report here instead of stdout.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DensityArg {
    Low,
    Medium,
    High,
}

impl From<DensityArg> for FeatureDensity {
    fn from(arg: DensityArg) -> Self {
        match arg {
            DensityArg::Low => FeatureDensity::Low,
            DensityArg::Medium => FeatureDensity::Medium,
            DensityArg::High => FeatureDensity::High,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let outcome = match cli.command {
        Commands::Generate(args) => run_generate(&args),
        Commands::Inspect { artifact, points } => run_inspect(&artifact, points),
        Commands::PurgeCache { root, ttl_days } => run_purge_cache(&root, ttl_days),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            let mut source = e.source();
            while let Some(cause) = source {
                eprintln!("  caused by: {cause}");
                source = cause.source();
            }
            ExitCode::FAILURE
        }
    }
}

#[cfg(feature = "tracing")]
fn init_logging(_verbose: u8) {
    nft_marker::core::init_tracing(false);
}

#[cfg(not(feature = "tracing"))]
fn init_logging(verbose: u8) {
    let level = nft_marker::core::level_for_verbosity(verbose);
    if let Err(e) = nft_marker::core::init_with_level(level) {
        eprintln!("warning: logger already installed: {e}");
    }
}

// ── generate ──────────────────────────────────────────────────────────

fn run_generate(args: &GenerateArgs) -> CliResult<()> {
    let mut config = match &args.config {
        Some(path) => MarkerConfig::load_json(path)?,
        None => MarkerConfig::default(),
    };
    if let Some(density) = args.density {
        config.feature_density = density.into();
    }
    if let Some(levels) = args.levels {
        config.pyramid_levels = levels;
    }
    if let Some(dpi) = args.dpi {
        config.source_dpi = dpi;
    }
    if args.auto_enhance {
        config.auto_enhance_contrast = true;
    }

    log::info!("generating marker {} from {}", args.id, args.image.display());
    let generator = MarkerGenerator::new(&args.root);
    let result = generator.generate_marker(&MarkerSource::path(&args.image), &args.id, &config)?;
    for warning in &result.warnings {
        log::warn!("{warning}");
    }

    let report = serde_json::to_string_pretty(&result)?;
    match &args.out {
        Some(path) => {
            std::fs::write(path, report)?;
            log::info!("report written to {}", path.display());
        }
        None => println!("{report}"),
    }
    Ok(())
}

// ── inspect ───────────────────────────────────────────────────────────

fn run_inspect(path: &Path, with_points: bool) -> CliResult<()> {
    let bytes = std::fs::read(path)?;
    let magic = bytes.get(..4).unwrap_or_default();

    let summary = if magic == FSET_MAGIC {
        let set = decode_feature_set(&bytes)?;
        let mut v = json!({
            "kind": "fset",
            "width": set.width,
            "height": set.height,
            "dpi": set.dpi,
            "density": set.density,
            "feature_count": set.points.len(),
        });
        if with_points {
            v["points"] = serde_json::to_value(&set.points)?;
        }
        v
    } else if magic == FSET3_MAGIC {
        let set = decode_multiscale_set(&bytes)?;
        let levels: Vec<_> = set
            .levels
            .iter()
            .map(|l| {
                let mut v = json!({
                    "level": l.level,
                    "scale": l.scale,
                    "width": l.width,
                    "height": l.height,
                    "feature_count": l.points.len(),
                });
                if with_points {
                    v["points"] = json!(l.points);
                }
                v
            })
            .collect();
        json!({
            "kind": "fset3",
            "total_features": set.total(),
            "levels": levels,
        })
    } else if magic == ISET_MAGIC {
        let set = decode_image_set(&bytes)?;
        json!({
            "kind": "iset",
            "width": set.width,
            "height": set.height,
            "dpi": set.dpi,
            "total_features": set.total_features,
            "source": set.source,
        })
    } else {
        return Err(format!("{} is not a marker artifact", path.display()).into());
    };

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

// ── purge-cache ───────────────────────────────────────────────────────

fn run_purge_cache(root: &Path, ttl_days: i64) -> CliResult<()> {
    let cache =
        JsonFileCache::<AnalysisResult>::under_storage_root(root).with_ttl(TtlPolicy::days(ttl_days));
    let removed = cache.purge_expired()?;
    log::info!("purged {removed} entries from {}", cache.dir().display());
    println!("{removed}");
    Ok(())
}
