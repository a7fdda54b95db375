use std::collections::HashSet;
use std::env;
use std::path::PathBuf;
use std::process;
use std::time::Instant;

use hkmeans_mips::io::{read_fvecs, read_groundtruth};
use hkmeans_mips::{
    layer_schedule, Augmentation, ClusterIndex, FloatMatrix, IndexConfig, QueryResults,
    SearchParams,
};
use tracing_subscriber::EnvFilter;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

fn main() {
    if env::args().any(|arg| arg == "--help" || arg == "-h") {
        print_usage();
        return;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let config = match Config::parse(args) {
        Ok(config) => config,
        Err(message) => {
            eprintln!("Error: {message}\n");
            print_usage();
            process::exit(1);
        }
    };

    if let Err(err) = run(config) {
        eprintln!("Error: {err}");
        let mut source = err.source();
        while let Some(inner) = source {
            eprintln!("  caused by: {inner}");
            source = inner.source();
        }
        process::exit(1);
    }
}

fn run(config: Config) -> CliResult<()> {
    println!("Loading base vectors from {}...", config.base.display());
    let base = read_fvecs(&config.base, config.max_base)?;
    if base.is_empty() {
        return Err("No base vectors loaded".into());
    }
    println!("Loaded {} vectors (dim: {})", base.rows(), base.dim());

    let queries = read_fvecs(&config.queries, config.max_queries)?;
    let groundtruth = read_groundtruth(&config.groundtruth, config.max_queries)?;
    if queries.is_empty() {
        return Err("No query vectors loaded".into());
    }
    if groundtruth.len() != queries.rows() {
        return Err("Ground truth count doesn't match query count".into());
    }
    println!("Loaded {} queries", queries.rows());

    let index_config = IndexConfig::new(config.extra_dims, config.layer_count)
        .with_augmentation(config.augmentation)
        .with_seed(config.seed)
        .with_max_iter(config.max_iter);

    println!("\n=== Layer Schedule ===");
    for (layer, plan) in layer_schedule(base.rows(), config.layer_count)?
        .iter()
        .enumerate()
    {
        println!(
            "  Layer {layer}: {} clusters (cluster size {})",
            plan.cluster_count, plan.cluster_size
        );
    }

    let start = Instant::now();
    let index = ClusterIndex::build(&base, &index_config)?;
    println!("\nBuilt index in {:.2?}", start.elapsed());

    println!(
        "\n{:<14} {:<12} {:<12} {:<14}",
        "opened_trees", "recall", "QPS", "scored/query"
    );
    println!("{}", "-".repeat(54));

    for &opened_trees in &config.opened_trees {
        let params = SearchParams::new(config.top_k, opened_trees);

        let start = Instant::now();
        let results = index.query(&queries, params)?;
        let elapsed = start.elapsed().as_secs_f64();

        let recall = recall_at_k(&results, &groundtruth, config.top_k);
        let qps = queries.rows() as f64 / elapsed;
        let scored = mean_scored(&index, &queries, params, config.stats_sample)?;

        println!(
            "{:<14} {:<12.5} {:<12.2} {:<14.1}",
            opened_trees, recall, qps, scored
        );
    }

    Ok(())
}

fn recall_at_k(results: &QueryResults, groundtruth: &[Vec<usize>], top_k: usize) -> f64 {
    let mut hits = 0usize;
    let mut possible = 0usize;
    for (row, gt) in groundtruth.iter().enumerate() {
        let limit = top_k.min(gt.len());
        possible += limit;
        let gt_set: HashSet<usize> = gt[..limit].iter().copied().collect();
        hits += results
            .hits(row)
            .take(limit)
            .filter(|hit| gt_set.contains(&hit.id))
            .count();
    }
    if possible > 0 {
        hits as f64 / possible as f64
    } else {
        0.0
    }
}

/// Average inner products per query over the first `sample` queries.
fn mean_scored(
    index: &ClusterIndex,
    queries: &FloatMatrix,
    params: SearchParams,
    sample: usize,
) -> CliResult<f64> {
    let sample = sample.min(queries.rows());
    if sample == 0 {
        return Ok(0.0);
    }
    let mut total = 0usize;
    for query in queries.iter_rows().take(sample) {
        let (_, stats) = index.search_with_stats(query, params)?;
        total += stats.total_scored();
    }
    Ok(total as f64 / sample as f64)
}

#[derive(Debug)]
struct Config {
    base: PathBuf,
    queries: PathBuf,
    groundtruth: PathBuf,
    extra_dims: usize,
    layer_count: usize,
    opened_trees: Vec<usize>,
    augmentation: Augmentation,
    seed: u64,
    max_iter: usize,
    top_k: usize,
    max_base: Option<usize>,
    max_queries: Option<usize>,
    stats_sample: usize,
}

impl Config {
    fn parse(args: Vec<String>) -> Result<Self, String> {
        let mut base = None;
        let mut queries = None;
        let mut groundtruth = None;
        let mut extra_dims = 3;
        let mut layer_count = 2;
        let mut opened_trees = vec![2];
        let mut augmentation = Augmentation::Repeated;
        let mut seed = 0x5eed_c0ffee_u64;
        let mut max_iter = 25;
        let mut top_k = 10;
        let mut max_base = None;
        let mut max_queries = None;
        let mut stats_sample = 100;

        let mut iter = args.into_iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--base" => base = Some(next_path(&mut iter, &arg)?),
                "--queries" => queries = Some(next_path(&mut iter, &arg)?),
                "--groundtruth" | "--gt" => groundtruth = Some(next_path(&mut iter, &arg)?),
                "--m" | "--extra-dims" => extra_dims = next_usize(&mut iter, &arg)?,
                "--layers" => layer_count = next_usize(&mut iter, &arg)?,
                "--opened-trees" => opened_trees = next_usize_list(&mut iter, &arg)?,
                "--augmentation" => {
                    let value = next_value(&mut iter, &arg)?;
                    augmentation = parse_augmentation(&value)?;
                }
                "--seed" => seed = next_u64(&mut iter, &arg)?,
                "--max-iter" => max_iter = next_usize(&mut iter, &arg)?,
                "--top-k" | "--topk" => top_k = next_usize(&mut iter, &arg)?,
                "--max-base" => max_base = Some(next_usize(&mut iter, &arg)?),
                "--max-queries" => max_queries = Some(next_usize(&mut iter, &arg)?),
                "--stats-sample" => stats_sample = next_usize(&mut iter, &arg)?,
                other => {
                    return Err(format!("Unknown argument: {}", other));
                }
            }
        }

        let base = base.ok_or("--base is required")?;
        let queries = queries.ok_or("--queries is required")?;
        let groundtruth = groundtruth.ok_or("--groundtruth or --gt is required")?;

        if layer_count == 0 {
            return Err("--layers must be at least 1".to_string());
        }
        if opened_trees.is_empty() || opened_trees.contains(&0) {
            return Err("--opened-trees values must be positive".to_string());
        }
        if top_k == 0 {
            return Err("--top-k must be positive".to_string());
        }

        Ok(Self {
            base,
            queries,
            groundtruth,
            extra_dims,
            layer_count,
            opened_trees,
            augmentation,
            seed,
            max_iter,
            top_k,
            max_base,
            max_queries,
            stats_sample,
        })
    }
}

fn next_value(iter: &mut impl Iterator<Item = String>, flag: &str) -> Result<String, String> {
    iter.next()
        .ok_or_else(|| format!("missing value for {}", flag))
}

fn next_path(iter: &mut impl Iterator<Item = String>, flag: &str) -> Result<PathBuf, String> {
    Ok(PathBuf::from(next_value(iter, flag)?))
}

fn next_usize(iter: &mut impl Iterator<Item = String>, flag: &str) -> Result<usize, String> {
    let value = next_value(iter, flag)?;
    value
        .parse::<usize>()
        .map_err(|_| format!("invalid value for {}: {}", flag, value))
}

fn next_usize_list(
    iter: &mut impl Iterator<Item = String>,
    flag: &str,
) -> Result<Vec<usize>, String> {
    let value = next_value(iter, flag)?;
    value
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<usize>()
                .map_err(|_| format!("invalid value for {}: {}", flag, part))
        })
        .collect()
}

fn next_u64(iter: &mut impl Iterator<Item = String>, flag: &str) -> Result<u64, String> {
    let value = next_value(iter, flag)?;
    value
        .parse::<u64>()
        .map_err(|_| format!("invalid value for {}: {}", flag, value))
}

fn parse_augmentation(value: &str) -> Result<Augmentation, String> {
    match value.to_lowercase().as_str() {
        "repeated" => Ok(Augmentation::Repeated),
        "power" | "power-series" | "power_series" => Ok(Augmentation::PowerSeries),
        other => Err(format!("unsupported augmentation: {}", other)),
    }
}

fn print_usage() {
    eprintln!("hkmeans_bench - hierarchical k-means MIPS index benchmark\n");
    eprintln!("USAGE:");
    eprintln!("  hkmeans_bench --base <data.fvecs> --queries <Q> --gt <G> [OPTIONS]\n");

    eprintln!("REQUIRED:");
    eprintln!("  --base <path>              Base vectors (.fvecs)");
    eprintln!("  --queries <path>           Query vectors (.fvecs)");
    eprintln!("  --gt <path>                Inner-product ground truth (.ivecs)\n");

    eprintln!("INDEX CONFIGURATION:");
    eprintln!("  --m <N>                    Extra embedding coordinates (default: 3)");
    eprintln!("  --layers <N>               Clustering layers (default: 2)");
    eprintln!("  --augmentation <kind>      repeated | power-series (default: repeated)");
    eprintln!("  --seed <N>                 K-means seed");
    eprintln!("  --max-iter <N>             K-means iterations per layer (default: 25)\n");

    eprintln!("QUERY CONFIGURATION:");
    eprintln!("  --top-k <N>                Number of neighbors (default: 10)");
    eprintln!("  --opened-trees <N,N,...>   Beam widths to sweep (default: 2)");
    eprintln!("  --stats-sample <N>         Queries used for traversal counters (default: 100)\n");

    eprintln!("LIMITS:");
    eprintln!("  --max-base <N>             Limit base vectors");
    eprintln!("  --max-queries <N>          Limit query vectors\n");

    eprintln!("Set RUST_LOG=debug for per-layer build logs.");
}
