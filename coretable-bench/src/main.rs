//! Benchmark runner for CoreTable pipelines

use anyhow::Result;
use coretable_bench::{bench_load, run_all, BenchConfig, BenchResult};
use tracing_subscriber::EnvFilter;

fn print_result(result: &BenchResult) {
    println!("\nBenchmark: {}", result.name);
    println!("  Total time:   {:?}", result.total_time);
    println!("  Average time: {:?}", result.avg_time);
    println!("  Min time:     {:?}", result.min_time);
    println!("  Max time:     {:?}", result.max_time);
    println!("  Throughput:   {:.2} rows/sec", result.throughput);
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    println!("=== CoreTable Benchmarks ===");

    let config = BenchConfig::default();
    for result in run_all(&config)? {
        print_result(&result);
    }

    println!("\n=== Load Scaling ===");
    for num_entities in [100, 1_000, 5_000] {
        let config = BenchConfig {
            iterations: 3,
            warmup_iterations: 1,
            num_entities,
            ..BenchConfig::default()
        };
        let result = bench_load(&config)?;
        println!("\nRows: {}", config.num_rows());
        println!("  Average time: {:?}", result.avg_time);
        println!("  Throughput:   {:.2} rows/sec", result.throughput);
    }

    Ok(())
}
