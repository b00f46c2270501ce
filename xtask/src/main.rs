use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "vmpool workspace automation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the workload suite under each global allocator and compare
    /// vmpool's pool/arena rows with their heap counterparts
    Bench {
        /// Lower sample size and measurement time
        #[arg(long, default_value_t = false)]
        quick: bool,

        /// Only rebuild the report from existing criterion output
        #[arg(long, default_value_t = false)]
        report_only: bool,

        /// Restrict the run to these allocator features (default: all)
        #[arg(long = "allocator", value_name = "FEATURE")]
        allocators: Vec<String>,
    },
}

/// Global allocator features of the root crate. Each becomes one criterion
/// baseline, named without the `alloc-` prefix.
const ALLOCATORS: &[&str] = &["alloc-system", "alloc-mimalloc", "alloc-snmalloc", "alloc-jemalloc"];

const CRITERION_DIR: &str = "target/criterion";
const REPORT_PATH: &str = "benchmark_results/report.md";

fn main() -> Result<()> {
    match Cli::parse().command {
        Commands::Bench {
            quick,
            report_only,
            allocators,
        } => {
            let selected = select_allocators(&allocators)?;
            if !report_only {
                run_suite(&selected, quick)?;
            }
            write_report(&selected)
        }
    }
}

fn select_allocators(requested: &[String]) -> Result<Vec<&'static str>> {
    if requested.is_empty() {
        return Ok(ALLOCATORS.to_vec());
    }
    requested
        .iter()
        .map(|name| {
            ALLOCATORS
                .iter()
                .copied()
                .find(|feature| *feature == name.as_str() || feature.strip_prefix("alloc-") == Some(name.as_str()))
                .with_context(|| format!("unknown allocator `{name}`, expected one of {ALLOCATORS:?}"))
        })
        .collect()
}

fn baseline_of(feature: &str) -> &str {
    feature.strip_prefix("alloc-").unwrap_or(feature)
}

fn run_suite(allocators: &[&str], quick: bool) -> Result<()> {
    for feature in allocators {
        println!(">>> suite with {feature}");
        let start = Instant::now();

        let mut cmd = Command::new("cargo");
        cmd.env("CARGO_INCREMENTAL", "0")
            .args(["bench", "-p", "vmpool", "--bench", "suite", "--no-default-features"])
            .args(["--features", feature])
            .args(["--", "--save-baseline", baseline_of(feature)]);
        if quick {
            cmd.args(["--noplot", "--sample-size", "10", "--measurement-time", "0.5"]);
        }

        let status = cmd.status().with_context(|| format!("failed to spawn cargo for {feature}"))?;
        if !status.success() {
            bail!("suite failed under {feature} ({status})");
        }
        println!("    done in {:.2?}", start.elapsed());
    }
    Ok(())
}

#[derive(Deserialize)]
struct Estimates {
    mean: Estimate,
}

#[derive(Deserialize)]
struct Estimate {
    point_estimate: f64,
}

#[derive(Deserialize)]
struct BenchmarkMeta {
    throughput: Option<Throughput>,
}

#[derive(Deserialize)]
enum Throughput {
    Bytes(u64),
    BytesDecimal(u64),
    Elements(u64),
}

/// Which side of the comparison a suite function measures. The suite names
/// its functions `<backend>_<case>`, so `pool_4_threads` and `box_4_threads`
/// are the two halves of the same case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Side {
    Vmpool,
    Heap,
}

fn classify(function: &str) -> Option<(Side, &str, &str)> {
    let (backend, case) = function.split_once('_')?;
    let side = match backend {
        "pool" | "arena" => Side::Vmpool,
        "box" | "system" | "heap" => Side::Heap,
        _ => return None,
    };
    Some((side, backend, case))
}

#[derive(Default)]
struct Pair {
    vmpool: Option<(String, f64)>,
    heap: Option<(String, f64)>,
}

/// group -> case -> baseline -> pair of measurements.
type Results = BTreeMap<String, BTreeMap<String, BTreeMap<String, Pair>>>;

/// Operations (or elements) per second from one criterion baseline directory.
fn read_rate(baseline_dir: &Path) -> Result<Option<f64>> {
    let estimates = baseline_dir.join("estimates.json");
    if !estimates.exists() {
        return Ok(None);
    }
    let estimates: Estimates = serde_json::from_str(&fs::read_to_string(&estimates)?)
        .with_context(|| format!("malformed {}", estimates.display()))?;
    let nanos = estimates.mean.point_estimate;
    if nanos <= 0.0 {
        return Ok(None);
    }

    let per_iter = match fs::read_to_string(baseline_dir.join("benchmark.json")) {
        Ok(text) => match serde_json::from_str::<BenchmarkMeta>(&text)?.throughput {
            Some(Throughput::Elements(n) | Throughput::Bytes(n) | Throughput::BytesDecimal(n)) => n as f64,
            None => 1.0,
        },
        Err(_) => 1.0,
    };
    Ok(Some(per_iter * 1e9 / nanos))
}

fn subdirs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("cannot read {}", dir.display()))? {
        let path = entry?.path();
        if path.is_dir() && path.file_name().is_some_and(|name| name != "report") {
            dirs.push(path);
        }
    }
    Ok(dirs)
}

fn file_name(path: &Path) -> String {
    path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
}

/// Walks `target/criterion/<group>/<function>/<baseline>/`.
fn collect(root: &Path, allocators: &[&str]) -> Result<Results> {
    let mut results = Results::new();
    for group_dir in subdirs(root)? {
        let group = file_name(&group_dir);
        for function_dir in subdirs(&group_dir)? {
            let function = file_name(&function_dir);
            let Some((side, backend, case)) = classify(&function) else {
                continue;
            };
            for feature in allocators {
                let baseline = baseline_of(feature);
                let Some(rate) = read_rate(&function_dir.join(baseline))? else {
                    continue;
                };
                let pair = results
                    .entry(group.clone())
                    .or_default()
                    .entry(case.to_string())
                    .or_default()
                    .entry(baseline.to_string())
                    .or_default();
                let slot = match side {
                    Side::Vmpool => &mut pair.vmpool,
                    Side::Heap => &mut pair.heap,
                };
                *slot = Some((backend.to_string(), rate));
            }
        }
    }
    Ok(results)
}

fn human(rate: f64) -> String {
    if rate >= 1e6 {
        format!("{:.2}M", rate / 1e6)
    } else if rate >= 1e3 {
        format!("{:.2}K", rate / 1e3)
    } else {
        format!("{rate:.0}")
    }
}

fn render(results: &Results, allocators: &[&str]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# vmpool workload report\n");
    let _ = writeln!(
        out,
        "Each case runs once on vmpool (`pool`/`arena`) and once on the global \
         allocator (`box`/`system`/`heap`). Rates are operations per second; \
         the last column is vmpool's rate divided by the heap's.\n"
    );

    let mut ratios: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for (group, cases) in results {
        let _ = writeln!(out, "## {group}\n");
        let _ = writeln!(out, "| Case | Allocator | vmpool | heap | vmpool / heap |");
        let _ = writeln!(out, "|---|---|---|---|---|");
        for (case, by_baseline) in cases {
            for feature in allocators {
                let baseline = baseline_of(feature);
                let Some(pair) = by_baseline.get(baseline) else {
                    continue;
                };
                let cell = |m: &Option<(String, f64)>| match m {
                    Some((backend, rate)) => format!("{} ({backend})", human(*rate)),
                    None => "n/a".to_string(),
                };
                let ratio = match (&pair.vmpool, &pair.heap) {
                    (Some((_, v)), Some((_, h))) if *h > 0.0 => {
                        ratios.entry(baseline).or_default().push(v / h);
                        format!("**{:.2}x**", v / h)
                    }
                    _ => "-".to_string(),
                };
                let _ = writeln!(
                    out,
                    "| {case} | {baseline} | {} | {} | {ratio} |",
                    cell(&pair.vmpool),
                    cell(&pair.heap)
                );
            }
        }
        let _ = writeln!(out);
    }

    if !ratios.is_empty() {
        let _ = writeln!(out, "## Summary\n");
        let _ = writeln!(out, "| Allocator | Cases | Geometric mean vmpool / heap |");
        let _ = writeln!(out, "|---|---|---|");
        for (baseline, values) in &ratios {
            let mean = (values.iter().map(|r| r.ln()).sum::<f64>() / values.len() as f64).exp();
            let _ = writeln!(out, "| {baseline} | {} | {mean:.2}x |", values.len());
        }
    }
    out
}

fn write_report(allocators: &[&str]) -> Result<()> {
    let root = Path::new(CRITERION_DIR);
    if !root.exists() {
        bail!("no criterion output at {}; run without --report-only first", root.display());
    }
    let results = collect(root, allocators)?;
    let report = Path::new(REPORT_PATH);
    if let Some(parent) = report.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(report, render(&results, allocators))?;
    println!("report written to {}", report.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_pairs_backends() {
        assert_eq!(classify("pool_4_threads"), Some((Side::Vmpool, "pool", "4_threads")));
        assert_eq!(classify("box_4_threads"), Some((Side::Heap, "box", "4_threads")));
        assert_eq!(classify("arena_churn"), Some((Side::Vmpool, "arena", "churn")));
        assert_eq!(classify("heap_churn"), Some((Side::Heap, "heap", "churn")));
        assert_eq!(classify("report"), None);
    }

    #[test]
    fn test_render_computes_ratio() {
        let mut results = Results::new();
        let pair = results
            .entry("larson".into())
            .or_default()
            .entry("2_threads".into())
            .or_default()
            .entry("system".into())
            .or_default();
        pair.vmpool = Some(("pool".into(), 3e6));
        pair.heap = Some(("box".into(), 1.5e6));

        let text = render(&results, &["alloc-system"]);
        assert!(text.contains("| 2_threads | system | 3.00M (pool) | 1.50M (box) | **2.00x** |"));
        assert!(text.contains("| system | 1 | 2.00x |"));
    }

    #[test]
    fn test_select_allocators_accepts_short_names() {
        assert_eq!(select_allocators(&["mimalloc".into()]).unwrap(), vec!["alloc-mimalloc"]);
        assert!(select_allocators(&["halo".into()]).is_err());
    }
}
