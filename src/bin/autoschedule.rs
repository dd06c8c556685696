//! CLI front-end: reads a pipeline description (function DAG + output
//! estimates) as JSON, runs the search, and prints the resulting
//! directives and predicted cost.
//!
//! Usage:
//!   autoschedule --input pipeline.json [--beam-size N] [--seed N]
//!                [--dropout N] [--time-limit SECS]
//!                [--parallelism N] [--cache-size BYTES] [--balance F]
//!                [--vector-bytes N]

use std::{env, fs};

use autosched::{schedule_pipeline, FuncId, FuncSpec, MachineParams, SearchConfig, TargetInfo};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

fn parse_flag(args: &[String], key: &str) -> Option<String> {
    let mut it = args.iter();
    while let Some(a) = it.next() {
        if a == key {
            return it.next().cloned();
        }
    }
    None
}

/// The on-disk pipeline description: a function list plus which of them
/// are outputs. Each function's bound estimates live on the `FuncSpec`
/// itself (only consulted for outputs).
#[derive(Debug, Deserialize)]
struct PipelineFile {
    outputs: Vec<String>,
    functions: Vec<FuncSpec>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().collect();

    let input_path = parse_flag(&args, "--input")
        .ok_or_else(|| anyhow::anyhow!("missing required flag --input <pipeline.json>"))?;
    let raw = fs::read_to_string(&input_path)?;
    let pipeline: PipelineFile = serde_json::from_str(&raw)?;

    let outputs: Vec<FuncId> = pipeline.outputs.into_iter().map(FuncId::new).collect();

    let mut estimates: HashMap<FuncId, Vec<(i64, i64)>> = HashMap::new();
    for f in &pipeline.functions {
        if outputs.contains(&f.id) {
            let resolved: Vec<(i64, i64)> = f
                .estimates
                .iter()
                .enumerate()
                .map(|(dim, e)| {
                    e.ok_or_else(|| {
                        anyhow::anyhow!("output \"{}\" is missing an estimate on dimension {dim}", f.id)
                    })
                })
                .collect::<anyhow::Result<_>>()?;
            estimates.insert(f.id.clone(), resolved);
        }
    }

    let params = MachineParams::new(
        parse_flag(&args, "--parallelism")
            .and_then(|s| s.parse().ok())
            .unwrap_or(MachineParams::default().parallelism),
        parse_flag(&args, "--cache-size")
            .and_then(|s| s.parse().ok())
            .unwrap_or(MachineParams::default().last_level_cache_size),
        parse_flag(&args, "--balance")
            .and_then(|s| s.parse().ok())
            .unwrap_or(MachineParams::default().balance),
    );
    let target = TargetInfo::new(
        parse_flag(&args, "--vector-bytes")
            .and_then(|s| s.parse().ok())
            .unwrap_or(TargetInfo::default().native_vector_bytes),
    );

    let mut search_config = SearchConfig::from_env();
    if let Some(v) = parse_flag(&args, "--beam-size").and_then(|s| s.parse().ok()) {
        search_config.beam_size = v;
    }
    if let Some(v) = parse_flag(&args, "--seed").and_then(|s| s.parse().ok()) {
        search_config.random_seed = v;
    }
    if let Some(v) = parse_flag(&args, "--dropout").and_then(|s| s.parse().ok()) {
        search_config.random_dropout = v;
    }
    if let Some(v) = parse_flag(&args, "--time-limit").and_then(|s| s.parse::<f64>().ok()) {
        search_config.time_limit = Some(Duration::from_secs_f64(v));
    }

    let result = schedule_pipeline(
        &outputs,
        pipeline.functions,
        estimates,
        &params,
        &target,
        &search_config,
    )?;

    println!("{}", serde_json::to_string_pretty(&result.directives)?);
    eprintln!(
        "predicted cost: compute={:.3} memory={:.3} total={:.3}",
        result.cost.compute_cost,
        result.cost.memory_cost,
        result.cost.total()
    );
    for (id, (compute, memory)) in &result.cost.per_func {
        eprintln!("  {id}: compute={compute:.3} memory={memory:.3}");
    }

    Ok(())
}
