use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{debug, info};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use forge_gen::{generate_program, GenError, PolicyKind, WeightConfig};
use forge_recondition::recondition;

/// Rendered programs above this cutoff are discarded and regenerated.
const MAX_RENDERED_LINES: usize = 20_000;

#[derive(Parser)]
#[command(name = "forge")]
#[command(version = "0.2.0")]
#[command(about = "Randomized, ownership-aware Rust program generator", long_about = None)]
struct Cli {
    /// Number of files to generate
    #[arg(short = 'n', long, default_value = "100")]
    count: usize,

    /// Print one program to stdout instead of writing files
    #[arg(short, long)]
    print: bool,

    /// Selection policies to draw from, one per file
    /// (base, optimal, swarm, aggressive; default: optimal)
    #[arg(long = "policy", value_name = "NAME")]
    policies: Vec<String>,

    /// Abort on the first dead end instead of retrying with a new seed
    #[arg(short, long)]
    fail_fast: bool,

    /// Seed for the first attempt; retries and later files derive from it
    #[arg(short, long)]
    seed: Option<u64>,

    /// Directory to save files
    #[arg(short, long, default_value = "out")]
    output: PathBuf,
}

fn resolve_policies(names: &[String]) -> Result<Vec<PolicyKind>> {
    if names.is_empty() {
        return Ok(vec![PolicyKind::Optimal]);
    }
    names
        .iter()
        .map(|name| {
            PolicyKind::from_name(name).with_context(|| {
                let known: Vec<&str> = PolicyKind::ALL.iter().map(|k| k.name()).collect();
                format!("unknown policy `{}` (known: {})", name, known.join(", "))
            })
        })
        .collect()
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let policies = resolve_policies(&cli.policies)?;

    if !cli.print {
        let _ = fs::remove_dir_all(&cli.output);
        fs::create_dir_all(&cli.output)
            .with_context(|| format!("creating output directory {}", cli.output.display()))?;
    }

    let base_seed = cli.seed.unwrap_or_else(|| rand::thread_rng().gen());
    let mut selector = StdRng::seed_from_u64(base_seed);

    let mut produced = 0usize;
    let mut attempt = 0u64;
    while produced < cli.count {
        let seed = base_seed.wrapping_add(attempt);
        attempt += 1;

        let kind = *policies
            .choose(&mut selector)
            .context("no selection policy configured")?;
        let mut policy_rng = StdRng::seed_from_u64(seed);
        let policy = kind.build(WeightConfig::default(), &mut policy_rng);
        info!("file {}: seed {} policy {}", produced, seed, kind.name());

        let (program, reproduction) = match generate_program(seed, policy.as_ref()) {
            Ok(result) => result,
            Err(e @ GenError::Invariant(_)) => {
                bail!("generator defect on seed {}: {}", seed, e);
            }
            Err(e) => {
                if cli.fail_fast {
                    bail!("generation dead-ended on seed {}: {}", seed, e);
                }
                debug!("seed {} dead-ended ({}), retrying", seed, e);
                continue;
            }
        };

        if program.render().lines().count() > MAX_RENDERED_LINES {
            debug!("seed {} produced an oversized program, retrying", seed);
            continue;
        }

        let (program, statistics) = recondition(program);
        let text = program.render();

        if cli.print {
            println!("{}", text);
            println!("{}", reproduction.join(" "));
            return Ok(());
        }

        let dir = cli.output.join(format!("file{}", produced));
        fs::create_dir_all(&dir)
            .with_context(|| format!("creating {}", dir.display()))?;
        fs::write(dir.join(format!("file{}.rs", produced)), &text)?;
        fs::write(
            dir.join(format!("file{}.txt", produced)),
            reproduction.join(" "),
        )?;
        fs::write(
            dir.join(format!("file{}.json", produced)),
            serde_json::to_string_pretty(&statistics)?,
        )?;
        produced += 1;
    }

    info!(
        "wrote {} files to {} ({} attempts)",
        produced,
        cli.output.display(),
        attempt
    );
    Ok(())
}
