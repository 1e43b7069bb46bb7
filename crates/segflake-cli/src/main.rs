#![doc = include_str!("../README.md")]

mod config;
mod telemetry;

use std::path::Path;

use anyhow::Context;
use clap::Parser;
use config::{
    CliArgs, Command, ComposeArgs, ComposerConfig, DecomposeArgs, GeneKind, NextArgs,
    SegmentConfig,
};
use segflake::{
    Allocation, Fields, Fnv1aGene, GeneFunc, MachineRegistry, MemoryCache, MemoryStore,
    NumericGene, SegmentAllocator, SnowflakeBuilder, SnowflakeComposer, SystemClock,
};
use serde::Serialize;
use telemetry::init_telemetry;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();

    init_telemetry(args.log_json)?;

    match args.command {
        Command::Next(args) => next(&args),
        Command::Decompose(args) => decompose(&args),
        Command::Compose(args) => compose(&args),
        Command::Segment(args) => segment(SegmentConfig::try_from(args)?).await,
    }
}

fn builder(config: &ComposerConfig) -> SnowflakeBuilder {
    let layout = config.layout;
    SnowflakeComposer::builder()
        .layout(
            layout.time_bits(),
            layout.clock_bits(),
            layout.sequence_bits(),
            layout.machine_bits(),
            layout.gene_bits(),
        )
        .epoch(config.epoch)
        .time_unit(config.time_unit)
}

fn next(args: &NextArgs) -> anyhow::Result<()> {
    let config = ComposerConfig::try_from(&args.layout)?;
    let machine_id = match args.machine_id {
        Some(machine_id) => machine_id,
        None => claim_machine_id(&args.registry_dir, args.slot)?,
    };
    let builder = builder(&config).machine_id(machine_id);

    match args.gene {
        GeneKind::Numeric => print_ids(builder.gene_func(NumericGene), args),
        GeneKind::Fnv1a => print_ids(builder.gene_func(Fnv1aGene), args),
    }
}

fn print_ids<G: GeneFunc>(
    builder: SnowflakeBuilder<SystemClock, G>,
    args: &NextArgs,
) -> anyhow::Result<()> {
    let composer = builder.build().context("invalid composer configuration")?;
    #[cfg(feature = "tracing")]
    tracing::info!(
        machine_id = composer.machine_id(),
        count = args.count,
        "generating ids"
    );
    for _ in 0..args.count {
        println!("{}", composer.next_id(args.key.as_deref())?);
    }
    Ok(())
}

fn claim_machine_id(dir: &Path, slot: usize) -> anyhow::Result<u64> {
    let keys = MachineRegistry::open(dir)
        .get_or_init_machine_keys(slot + 1, |_machine_id, _key| {
            #[cfg(feature = "tracing")]
            tracing::info!(machine_id = _machine_id, key = _key, "registered machine key");
            Ok(())
        })
        .with_context(|| format!("claiming machine slot {slot} in {}", dir.display()))?;
    let key = keys
        .get(slot)
        .context("registry returned fewer keys than requested")?;
    Ok(key.machine_id)
}

#[derive(Serialize)]
struct Decomposed {
    id: i64,
    #[serde(flatten)]
    fields: Fields,
    timestamp_ms: u128,
}

fn decompose(args: &DecomposeArgs) -> anyhow::Result<()> {
    let config = ComposerConfig::try_from(&args.layout)?;
    let composer = builder(&config)
        .build()
        .context("invalid composer configuration")?;

    for &id in &args.ids {
        if id < 0 {
            anyhow::bail!("{id} is not a composite id: the sign bit is set");
        }
        if args.table {
            println!("{}", config.layout.describe(id));
            continue;
        }
        let decomposed = Decomposed {
            id,
            fields: composer.decompose(id),
            timestamp_ms: composer.timestamp(id).as_millis(),
        };
        if args.json {
            println!("{}", serde_json::to_string(&decomposed)?);
        } else {
            let Fields {
                time,
                clock,
                sequence,
                machine,
                gene,
            } = decomposed.fields;
            println!(
                "{id}: time={time} clock={clock} sequence={sequence} machine={machine} gene={gene} timestamp_ms={}",
                decomposed.timestamp_ms
            );
        }
    }
    Ok(())
}

fn compose(args: &ComposeArgs) -> anyhow::Result<()> {
    let config = ComposerConfig::try_from(&args.layout)?;
    let id = config
        .layout
        .compose(args.time, args.sequence, args.machine, args.gene)
        .context("field out of range")?;
    println!("{id}");
    Ok(())
}

async fn segment(config: SegmentConfig) -> anyhow::Result<()> {
    let allocator =
        SegmentAllocator::new(MemoryCache::new(), MemoryStore::new(), config.allocator)?;

    for &num in &config.nums {
        let allocation = allocator
            .generate_segment(&config.key, num)
            .await
            .with_context(|| format!("allocating {num} ids for {:?}", config.key))?;
        print_allocation(num, &allocation, config.json)?;
    }
    Ok(())
}

fn print_allocation(num: u64, allocation: &Allocation, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string(allocation)?);
        return Ok(());
    }
    let primary = allocation.primary;
    print!(
        "{num:>6} ids: [{}, {}] of window max {}",
        primary.min_id, primary.cursor, primary.max_id
    );
    if let Some(supplemental) = allocation.supplemental {
        print!(
            " + [{}, {}] of window max {}",
            supplemental.min_id, supplemental.cursor, supplemental.max_id
        );
    }
    println!();
    Ok(())
}
