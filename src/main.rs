use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::hint::black_box;
use std::time::Instant;

use pienet::simd::{self, Backend, Lanes, MultiplyAddAdjacent, Native, Scalar};
use pienet::verify::{self, VerifyReport};
use pienet::{ClippedReLU, Dense, Error, FeatureTable, FeatureUpdate, Network};

#[derive(Parser, Debug)]
#[command(name = "pienet", version, about = "NNUE kernel self-check and benchmark")]
struct Args {
    /// Print reports as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the native backend and what this CPU supports
    Info,
    /// Compare every available backend against the scalar kernels
    Verify {
        /// Random rounds per backend
        #[arg(long, default_value_t = 256)]
        rounds: u64,
        /// Base seed; round r uses seed + r
        #[arg(long, default_value_t = 0x5eed)]
        seed: u64,
        /// Worker threads (0 = rayon default)
        #[arg(long, default_value_t = 0)]
        threads: usize,
        /// Check only this backend (scalar is always checked against the reference)
        #[arg(long, value_enum)]
        backend: Option<BackendArg>,
    },
    /// Time incremental updates and the forward pass on the native backend
    Bench {
        #[arg(long, default_value_t = 100_000)]
        iters: u64,
        #[arg(long, default_value_t = 1)]
        seed: u64,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum BackendArg {
    Scalar,
    Avx2,
    Avx512,
}

impl BackendArg {
    fn name(self) -> &'static str {
        match self {
            BackendArg::Scalar => "scalar",
            BackendArg::Avx2 => "avx2",
            BackendArg::Avx512 => "avx512",
        }
    }
}

#[derive(Serialize)]
struct InfoReport {
    native: &'static str,
    bits: usize,
    available: Vec<&'static str>,
    lanes_i16: usize,
    lanes_i32: usize,
    lanes_f32: usize,
}

#[derive(Serialize)]
struct BenchReport {
    backend: &'static str,
    iters: u64,
    apply_revert_ns: f64,
    forward_ns: f64,
    refresh_ns: f64,
}

const INPUT: usize = 256;
const FEATURES: usize = 768;
const DELTA: usize = INPUT * FEATURES;
const ROW: usize = INPUT * 2;
const OUTPUT: usize = 8;

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    match args.command {
        Command::Info => info_cmd(args.json),
        Command::Verify { rounds, seed, threads, backend } => {
            if threads > 0 {
                rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build_global()
                    .context("configure rayon thread pool")?;
            }
            verify_cmd(rounds, seed, backend, args.json)
        }
        Command::Bench { iters, seed } => bench_cmd(iters, seed, args.json),
    }
}

fn info_cmd(json: bool) -> Result<()> {
    let report = InfoReport {
        native: Native::NAME,
        bits: Native::BITS,
        available: simd::available(),
        lanes_i16: <Native as Lanes<i16>>::LANES,
        lanes_i32: <Native as Lanes<i32>>::LANES,
        lanes_f32: <Native as Lanes<f32>>::LANES,
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("native backend: {} ({} bits)", report.native, report.bits);
        println!("cpu supports:   {}", report.available.join(", "));
        println!("lanes: i16={} i32={} f32={}", report.lanes_i16, report.lanes_i32, report.lanes_f32);
    }
    Ok(())
}

fn verify_with<B>(backend: B, rounds: u64, seed: u64) -> Result<VerifyReport>
where
    B: MultiplyAddAdjacent<i16> + MultiplyAddAdjacent<f32>,
{
    let pb = ProgressBar::new(rounds);
    pb.set_style(
        ProgressStyle::with_template("{prefix:>8} [{bar:40}] {pos}/{len} rounds")
            .context("progress template")?
            .progress_chars("=> "),
    );
    pb.set_prefix(B::NAME);
    let report = verify::verify_with_progress(backend, rounds, seed, || pb.inc(1));
    pb.finish_and_clear();
    let report = report.with_context(|| format!("{} backend disagrees with scalar", B::NAME))?;
    info!("{}: {} rounds, {} elements compared", B::NAME, rounds, report.checks);
    Ok(report)
}

fn verify_cmd(rounds: u64, seed: u64, only: Option<BackendArg>, json: bool) -> Result<()> {
    if rounds == 0 {
        bail!("--rounds must be positive");
    }
    if let Some(b) = only {
        if !simd::available().contains(&b.name()) {
            return Err(Error::BackendUnavailable(b.name()).into());
        }
    }
    let wanted = |b: BackendArg| only.is_none_or(|o| o == b);

    let mut reports = Vec::new();
    if wanted(BackendArg::Scalar) {
        reports.push(verify_with(Scalar, rounds, seed)?);
    }
    #[cfg(target_arch = "x86_64")]
    {
        if let Some(b) = simd::Avx2::detect().filter(|_| wanted(BackendArg::Avx2)) {
            reports.push(verify_with(b, rounds, seed)?);
        }
        if let Some(b) = simd::Avx512::detect().filter(|_| wanted(BackendArg::Avx512)) {
            reports.push(verify_with(b, rounds, seed)?);
        }
    }
    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        for r in &reports {
            println!("{:>8}: ok ({} rounds, {} elements)", r.backend, r.rounds, r.checks);
        }
    }
    Ok(())
}

fn bench_cmd(iters: u64, seed: u64, json: bool) -> Result<()> {
    if iters == 0 {
        bail!("--iters must be positive");
    }
    let mut rng = SmallRng::seed_from_u64(seed);
    let table = FeatureTable::<i16, INPUT, DELTA>::from_fn(|_, _| rng.gen_range(-64..64));
    let dense = Dense::<i16, ROW, OUTPUT>::from_vec(
        (0..ROW * OUTPUT).map(|_| rng.gen_range(-64..64)).collect(),
        (0..OUTPUT).map(|_| rng.gen_range(-512..512)).collect(),
    )?;
    let bias = Box::new([0i16; INPUT]);
    let mut net: Network<Native, ClippedReLU<127>, i16, i32, INPUT, DELTA, ROW, OUTPUT> =
        Network::new(simd::native(), ClippedReLU, table, bias, dense);

    let active: Vec<usize> = (0..30).map(|_| rng.gen_range(0..FEATURES)).collect();
    let mirrored: Vec<usize> = active.iter().map(|f| FEATURES - 1 - f).collect();

    let t0 = Instant::now();
    for _ in 0..iters.min(10_000) {
        net.refresh(black_box(&active), black_box(&mirrored))?;
    }
    let refresh_ns = t0.elapsed().as_nanos() as f64 / iters.min(10_000) as f64;

    let (from, to) = (active[0], rng.gen_range(0..FEATURES));
    let update = FeatureUpdate::new().remove(from, FEATURES - 1 - from).add(to, FEATURES - 1 - to);
    let t0 = Instant::now();
    for _ in 0..iters {
        net.apply(black_box(&update))?;
        net.revert(black_box(&update))?;
    }
    let apply_revert_ns = t0.elapsed().as_nanos() as f64 / iters as f64;

    let t0 = Instant::now();
    let mut acc = 0i32;
    for _ in 0..iters {
        acc ^= black_box(net.evaluate())[0];
    }
    let forward_ns = t0.elapsed().as_nanos() as f64 / iters as f64;
    black_box(acc);

    let report = BenchReport { backend: Native::NAME, iters, apply_revert_ns, forward_ns, refresh_ns };
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("backend {} ({} iters)", report.backend, report.iters);
        println!("  refresh (30 features): {:>10.1} ns", report.refresh_ns);
        println!("  apply + revert:        {:>10.1} ns", report.apply_revert_ns);
        println!("  forward ({OUTPUT} outputs):   {:>10.1} ns", report.forward_ns);
    }
    Ok(())
}
