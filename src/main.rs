use std::{error::Error, fs::File, path::PathBuf, time::Instant};

use pgm_match::{
    config::{AggregationConfig, FallbackMode},
    hierarchy::{Hierarchy, HierarchyLimits},
    partitioner::AggregationStats,
    CsrMatrix,
};
use structopt::StructOpt;

#[macro_use]
extern crate log;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "pgm_match",
    about = "Coarsen a sparse system by repeated parallel pairwise aggregation"
)]
struct Opt {
    /// Matrix file in matrix market format
    #[structopt(parse(from_os_str))]
    input: PathBuf,

    /// JSON aggregation config. The flags below override its values
    #[structopt(long, parse(from_os_str))]
    config: Option<PathBuf>,

    /// Maximum number of matching rounds per level
    #[structopt(long)]
    max_rounds: Option<usize>,

    /// Stop matching once fewer than this fraction of nodes is unaggregated
    #[structopt(long)]
    max_unassigned_ratio: Option<f64>,

    /// How leftover nodes are attached. Options are:
    /// snapshot, inplace
    #[structopt(long)]
    fallback: Option<FallbackMode>,

    /// Maximum number of levels, the input level included
    #[structopt(long, default_value = "10")]
    levels: usize,

    /// Stop once a level has at most this many rows
    #[structopt(long, default_value = "16")]
    min_coarse_size: usize,

    /// Worker threads, defaults to the number of logical cpus
    #[structopt(long)]
    threads: Option<usize>,

    /// Write per level aggregation stats to this JSON file
    #[structopt(long, parse(from_os_str))]
    stats: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn Error>> {
    pretty_env_logger::init();
    let opt = Opt::from_args();

    let threads = opt.threads.unwrap_or_else(num_cpus::get);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()?;

    let mut config = match opt.config.as_ref() {
        Some(path) => AggregationConfig::from_json_file(path)?,
        None => AggregationConfig::default(),
    };
    if let Some(max_rounds) = opt.max_rounds {
        config.max_rounds = max_rounds;
    }
    if let Some(ratio) = opt.max_unassigned_ratio {
        config.max_unassigned_ratio = ratio;
    }
    if let Some(fallback) = opt.fallback {
        config.fallback = fallback;
    }
    config.validate()?;
    debug!("{:?} on {} threads", config, threads);

    let mat: CsrMatrix = sprs::io::read_matrix_market::<f64, usize, _>(&opt.input)?.to_csr();
    info!(
        "loaded {}: {}x{} with {} nonzeros",
        opt.input.display(),
        mat.rows(),
        mat.cols(),
        mat.nnz()
    );

    let limits = HierarchyLimits {
        max_levels: opt.levels,
        min_coarse_size: opt.min_coarse_size,
    };
    let timer = Instant::now();
    let hierarchy = Hierarchy::build(mat, &config, limits)?;
    info!(
        "built {} levels in {} ms",
        hierarchy.levels(),
        timer.elapsed().as_millis()
    );
    println!("{:?}", hierarchy);

    if let Some(path) = opt.stats.as_ref() {
        let stats: Vec<AggregationStats> = hierarchy
            .get_aggregations()
            .iter()
            .map(|aggregation| aggregation.stats())
            .collect();
        serde_json::to_writer_pretty(File::create(path)?, &stats)?;
        info!("wrote stats to {}", path.display());
    }
    Ok(())
}
