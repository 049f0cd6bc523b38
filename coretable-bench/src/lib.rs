//! Benchmarks for CoreTable pipelines
//!
//! Synthetic entity/year/value tables are generated from a seed so runs are
//! comparable. Each benchmark forces materialization of the final table;
//! constructing a transform alone does no work.

use std::fmt::Write as _;
use std::time::{Duration, Instant};

use anyhow::{ensure, Result};
use coretable_core::{
    ColumnDef, ColumnTypeName, CoreTable, LinearInterpolation, SortOrder, Value,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

/// Benchmark configuration
#[derive(Debug, Clone)]
pub struct BenchConfig {
    /// Number of timed iterations
    pub iterations: usize,

    /// Untimed iterations run first
    pub warmup_iterations: usize,

    /// Distinct entities in the synthetic table
    pub num_entities: usize,

    /// Years per entity
    pub years_per_entity: usize,

    /// Share of value cells left blank, between 0 and 1
    pub blank_ratio: f64,

    /// Seed for the synthetic data
    pub seed: u64,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            iterations: 10,
            warmup_iterations: 2,
            num_entities: 200,
            years_per_entity: 50,
            blank_ratio: 0.1,
            seed: 42,
        }
    }
}

impl BenchConfig {
    /// Rows in the synthetic table
    pub fn num_rows(&self) -> usize {
        self.num_entities * self.years_per_entity
    }
}

/// Benchmark result
#[derive(Debug, Clone)]
pub struct BenchResult {
    /// Name of the benchmark
    pub name: String,

    /// Total time taken
    pub total_time: Duration,

    /// Average time per iteration
    pub avg_time: Duration,

    /// Min time per iteration
    pub min_time: Duration,

    /// Max time per iteration
    pub max_time: Duration,

    /// Throughput (rows/second)
    pub throughput: f64,
}

/// Run a benchmark
pub fn run_benchmark<F>(name: &str, config: &BenchConfig, func: F) -> Result<BenchResult>
where
    F: Fn() -> Result<usize>,
{
    ensure!(config.iterations > 0, "benchmark '{name}' needs at least one iteration");

    for _ in 0..config.warmup_iterations {
        func()?;
    }

    let mut times = Vec::with_capacity(config.iterations);
    let mut total_rows = 0;
    let start_total = Instant::now();
    for _ in 0..config.iterations {
        let start = Instant::now();
        total_rows += func()?;
        times.push(start.elapsed());
    }
    let total_time = start_total.elapsed();

    let iterations = u32::try_from(times.len()).unwrap_or(u32::MAX);
    #[allow(clippy::cast_precision_loss)]
    let throughput = total_rows as f64 / total_time.as_secs_f64().max(f64::EPSILON);
    let result = BenchResult {
        name: name.to_string(),
        total_time,
        avg_time: times.iter().sum::<Duration>() / iterations,
        min_time: times.iter().min().copied().unwrap_or_default(),
        max_time: times.iter().max().copied().unwrap_or_default(),
        throughput,
    };
    info!(name, avg_us = result.avg_time.as_micros(), "Benchmark finished");
    Ok(result)
}

/// Tab separated `entityName`, `year`, `gdp` and `pop` columns
///
/// Entities are interleaved by year so sorting and grouping have work to do.
pub fn synthetic_delimited(config: &BenchConfig) -> String {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut text = String::from("entityName\tyear\tgdp\tpop\n");
    for year in 0..config.years_per_entity {
        for entity in 0..config.num_entities {
            let gdp = if rng.gen_bool(config.blank_ratio.clamp(0.0, 1.0)) {
                String::new()
            } else {
                format!("{:.2}", rng.gen_range(1.0..1000.0))
            };
            let pop: u32 = rng.gen_range(1..100_000);
            let _ = writeln!(text, "entity-{entity}\t{}\t{gdp}\t{pop}", 1950 + year);
        }
    }
    text
}

/// Column defs for [`synthetic_delimited`]
pub fn synthetic_defs() -> Vec<ColumnDef> {
    vec![
        ColumnDef::new("entityName", ColumnTypeName::EntityName),
        ColumnDef::new("year", ColumnTypeName::Year),
        ColumnDef::new("gdp", ColumnTypeName::Numeric),
        ColumnDef::new("pop", ColumnTypeName::Integer),
        ColumnDef::new("gdpPerCapita", ColumnTypeName::Numeric).with_generator(|row, _| {
            match (row.value("gdp").as_number(), row.value("pop").as_number()) {
                (Some(gdp), Some(pop)) if pop > 0.0 => Value::Number(gdp / pop),
                _ => Value::Empty,
            }
        }),
    ]
}

/// Parse the synthetic text into a root table
pub fn synthetic_table(config: &BenchConfig) -> CoreTable {
    CoreTable::new(synthetic_delimited(config), synthetic_defs())
}

/// Parse, type and compute a fresh table
pub fn bench_load(config: &BenchConfig) -> Result<BenchResult> {
    let text = synthetic_delimited(config);
    run_benchmark("Load delimited", config, || {
        let table = CoreTable::new(text.as_str(), synthetic_defs());
        Ok(table.column_store().num_rows())
    })
}

/// Filter, sort and limit a loaded table
pub fn bench_filter_sort(config: &BenchConfig) -> Result<BenchResult> {
    let table = synthetic_table(config);
    table.column_store();
    run_benchmark("Filter and sort", config, || {
        let result = table
            .filter_negatives_for_log_scale("gdp")?
            .sort_by(&["entityName", "year"], &[SortOrder::Asc, SortOrder::Desc])?
            .limit(1000, 0);
        Ok(result.num_rows())
    })
}

/// Join population onto GDP by entity and year
pub fn bench_join(config: &BenchConfig) -> Result<BenchResult> {
    let table = synthetic_table(config);
    let gdp = table.select(&["entityName", "year", "gdp"])?;
    let pop = table.select(&["entityName", "year", "pop"])?.drop_random_percent(10.0, config.seed);
    gdp.column_store();
    pop.column_store();
    run_benchmark("Left join", config, || Ok(gdp.left_join(&pop, None).num_rows()))
}

/// Fill GDP gaps per entity, linearly and with a time tolerance
pub fn bench_interpolation(config: &BenchConfig) -> Result<BenchResult> {
    let table = synthetic_table(config);
    table.column_store();
    run_benchmark("Interpolate per entity", config, || {
        let linear =
            table.interpolate_column_linearly("gdp", Some("entityName"), LinearInterpolation::default())?;
        let tolerance = table.interpolate_column_with_tolerance("gdp", Some("entityName"), 2)?;
        Ok(linear.num_rows() + tolerance.num_rows())
    })
}

/// Every benchmark in order
pub fn run_all(config: &BenchConfig) -> Result<Vec<BenchResult>> {
    Ok(vec![
        bench_load(config)?,
        bench_filter_sort(config)?,
        bench_join(config)?,
        bench_interpolation(config)?,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny() -> BenchConfig {
        BenchConfig {
            iterations: 1,
            warmup_iterations: 0,
            num_entities: 3,
            years_per_entity: 4,
            blank_ratio: 0.5,
            seed: 1,
        }
    }

    #[test]
    fn test_synthetic_table_shape() {
        let config = tiny();
        let table = synthetic_table(&config);
        assert_eq!(table.num_rows(), config.num_rows());
        assert_eq!(table.column_slugs(), &["entityName", "year", "gdp", "pop", "gdpPerCapita"]);
        assert_eq!(synthetic_delimited(&config), synthetic_delimited(&config));
    }

    #[test]
    fn test_run_all() {
        let results = run_all(&tiny()).unwrap();
        assert_eq!(results.len(), 4);
        assert!(results.iter().all(|result| result.min_time <= result.max_time));
    }

    #[test]
    fn test_zero_iterations_is_an_error() {
        let config = BenchConfig {
            iterations: 0,
            ..tiny()
        };
        assert!(run_benchmark("noop", &config, || Ok(0)).is_err());
    }
}
