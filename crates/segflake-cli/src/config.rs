use std::{path::PathBuf, time::Duration};

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use segflake::{AllocatorConfig, CUSTOM_EPOCH, DEFAULT_BATCH_SIZE, Layout};

/// Runtime configuration for the `segflake` binary.
///
/// Every tunable is parsed from CLI arguments or environment variables (a
/// `.env` file is loaded first) and validated into the typed configs below
/// before any ID is produced.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "segflake",
    version,
    about = "Generate, inspect and allocate distributed unique IDs"
)]
pub struct CliArgs {
    /// Emit logs as JSON lines instead of human-readable text.
    ///
    /// Environment variable: `SEGFLAKE_LOG_JSON`
    #[arg(long, env = "SEGFLAKE_LOG_JSON", default_value_t = false, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Generate composite IDs with a machine id claimed from the registry.
    Next(NextArgs),
    /// Split composite IDs into their fields.
    Decompose(DecomposeArgs),
    /// Build a composite ID from explicit fields.
    Compose(ComposeArgs),
    /// Reserve id segments through an in-process allocator.
    Segment(SegmentArgs),
}

/// Composite ID layout and clock settings shared by every composer command.
#[derive(Args, Debug, Clone)]
pub struct LayoutArgs {
    /// Width of the time field.
    ///
    /// Environment variable: `SEGFLAKE_TIME_BITS`
    #[arg(long, env = "SEGFLAKE_TIME_BITS", default_value_t = 41)]
    pub time_bits: u32,

    /// Width of the reserved clock field.
    ///
    /// Environment variable: `SEGFLAKE_CLOCK_BITS`
    #[arg(long, env = "SEGFLAKE_CLOCK_BITS", default_value_t = 1)]
    pub clock_bits: u32,

    /// Width of the per-unit sequence field (0-16).
    ///
    /// Environment variable: `SEGFLAKE_SEQUENCE_BITS`
    #[arg(long, env = "SEGFLAKE_SEQUENCE_BITS", default_value_t = 10)]
    pub sequence_bits: u32,

    /// Width of the machine id field (0-16).
    ///
    /// Environment variable: `SEGFLAKE_MACHINE_BITS`
    #[arg(long, env = "SEGFLAKE_MACHINE_BITS", default_value_t = 7)]
    pub machine_bits: u32,

    /// Width of the gene field.
    ///
    /// Environment variable: `SEGFLAKE_GENE_BITS`
    #[arg(long, env = "SEGFLAKE_GENE_BITS", default_value_t = 4)]
    pub gene_bits: u32,

    /// Epoch in milliseconds since 1970-01-01 UTC. Defaults to 2025-01-01.
    ///
    /// Environment variable: `SEGFLAKE_EPOCH_MS`
    #[arg(long, env = "SEGFLAKE_EPOCH_MS", default_value_t = CUSTOM_EPOCH.as_millis() as u64)]
    pub epoch_ms: u64,

    /// Time unit in milliseconds.
    ///
    /// Environment variable: `SEGFLAKE_TIME_UNIT_MS`
    #[arg(long, env = "SEGFLAKE_TIME_UNIT_MS", default_value_t = 1)]
    pub time_unit_ms: u64,
}

/// How `next` derives the gene from `--key`.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneKind {
    /// Decimal keys modulo 2^gene; other keys map to 0.
    Numeric,
    /// FNV-1a hash of the key bytes.
    Fnv1a,
}

#[derive(Args, Debug, Clone)]
pub struct NextArgs {
    #[command(flatten)]
    pub layout: LayoutArgs,

    /// Directory holding `machine_keys.json`.
    ///
    /// Environment variable: `SEGFLAKE_REGISTRY_DIR`
    #[arg(long, env = "SEGFLAKE_REGISTRY_DIR", default_value = ".segflake")]
    pub registry_dir: PathBuf,

    /// Registry slot this process claims; the slot index is the machine id.
    ///
    /// Environment variable: `SEGFLAKE_MACHINE_SLOT`
    #[arg(long, env = "SEGFLAKE_MACHINE_SLOT", default_value_t = 0)]
    pub slot: usize,

    /// Use this machine id and skip the registry.
    ///
    /// Environment variable: `SEGFLAKE_MACHINE_ID`
    #[arg(long, env = "SEGFLAKE_MACHINE_ID")]
    pub machine_id: Option<u64>,

    /// Key fed to the gene function.
    #[arg(long)]
    pub key: Option<String>,

    #[arg(long, value_enum, default_value_t = GeneKind::Numeric)]
    pub gene: GeneKind,

    /// Number of ids to generate.
    #[arg(short = 'n', long, default_value_t = 1)]
    pub count: usize,
}

#[derive(Args, Debug, Clone)]
pub struct DecomposeArgs {
    #[command(flatten)]
    pub layout: LayoutArgs,

    /// Print a field table for each id.
    #[arg(long, default_value_t = false, conflicts_with = "json")]
    pub table: bool,

    /// Print one JSON object per id.
    #[arg(long, default_value_t = false)]
    pub json: bool,

    #[arg(required = true)]
    pub ids: Vec<i64>,
}

#[derive(Args, Debug, Clone)]
pub struct ComposeArgs {
    #[command(flatten)]
    pub layout: LayoutArgs,

    #[arg(long)]
    pub time: u64,

    #[arg(long, default_value_t = 0)]
    pub sequence: u64,

    #[arg(long, default_value_t = 0)]
    pub machine: u64,

    #[arg(long, default_value_t = 0)]
    pub gene: u64,
}

#[derive(Args, Debug, Clone)]
pub struct SegmentArgs {
    /// Business key to allocate under.
    pub key: String,

    /// Ids per cache window.
    ///
    /// Environment variable: `SEGFLAKE_BATCH_SIZE`
    #[arg(long, env = "SEGFLAKE_BATCH_SIZE", default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: i64,

    /// Ids per request; repeat to issue several requests in order.
    #[arg(long = "num", required = true)]
    pub nums: Vec<u64>,

    /// Print allocations as JSON.
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

/// Validated layout and clock settings.
#[derive(Debug, Clone, Copy)]
pub struct ComposerConfig {
    pub layout: Layout,
    pub epoch: Duration,
    pub time_unit: Duration,
}

impl TryFrom<&LayoutArgs> for ComposerConfig {
    type Error = anyhow::Error;

    fn try_from(args: &LayoutArgs) -> Result<Self, Self::Error> {
        let layout = Layout::new(
            args.time_bits,
            args.clock_bits,
            args.sequence_bits,
            args.machine_bits,
            args.gene_bits,
        )
        .context("invalid layout")?;

        if args.time_unit_ms == 0 {
            bail!("SEGFLAKE_TIME_UNIT_MS must be greater than 0");
        }

        Ok(Self {
            layout,
            epoch: Duration::from_millis(args.epoch_ms),
            time_unit: Duration::from_millis(args.time_unit_ms),
        })
    }
}

/// Validated `segment` invocation.
#[derive(Debug, Clone)]
pub struct SegmentConfig {
    pub key: String,
    pub nums: Vec<u64>,
    pub allocator: AllocatorConfig,
    pub json: bool,
}

impl TryFrom<SegmentArgs> for SegmentConfig {
    type Error = anyhow::Error;

    fn try_from(args: SegmentArgs) -> Result<Self, Self::Error> {
        if args.key.is_empty() {
            bail!("segment key must not be empty");
        }
        if args.batch_size < 1 {
            bail!(
                "SEGFLAKE_BATCH_SIZE must be at least 1 (got {})",
                args.batch_size
            );
        }
        if let Some(position) = args.nums.iter().position(|num| *num == 0) {
            bail!("--num #{} requests zero ids", position + 1);
        }

        Ok(Self {
            key: args.key,
            nums: args.nums,
            allocator: AllocatorConfig::with_batch_size(args.batch_size),
            json: args.json,
        })
    }
}
