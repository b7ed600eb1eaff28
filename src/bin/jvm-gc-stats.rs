//! jvm-gc-stats - JVM garbage collection log monitor.
//!
//! Follows a GC log written with `-XX:+PrintGCDetails`, derives pause and
//! throughput numbers from each collection, and publishes them.
//!
//! Usage:
//!   jvm-gc-stats gc.log                 # replay from start, log metrics
//!   jvm-gc-stats --tail-only gc.log     # only new lines
//!   jvm-gc-stats --report gc.log        # publish through gmetric

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;
#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

use jvm_gc_stats::config::{
    DEFAULT_CHUNK_SIZE, DEFAULT_MAX_MISSING_POLLS, DEFAULT_METRIC_PREFIX,
};
use jvm_gc_stats::{FileTailer, GcStatsConfig, GcStatsPipeline, GmetricSink, LogSink, ReportSink};

/// JVM garbage collection log monitor.
#[derive(Parser)]
#[command(name = "jvm-gc-stats", about = "Publish metrics from a live JVM GC log", version)]
struct Args {
    /// GC log file to follow.
    #[arg(value_name = "FILE", default_value = "stdout")]
    file: PathBuf,

    /// Start at the current end of the file instead of replaying it.
    #[arg(long)]
    tail_only: bool,

    /// Seconds to sleep at end of file before checking again.
    #[arg(long, default_value = "60", value_name = "SECS")]
    poll_interval: u64,

    /// Maximum bytes per read.
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE, value_name = "BYTES")]
    chunk_size: usize,

    /// Prefix prepended to every published metric name.
    #[arg(long, default_value = DEFAULT_METRIC_PREFIX)]
    prefix: String,

    /// Wait cycles the log may be missing before giving up.
    #[arg(long, default_value_t = DEFAULT_MAX_MISSING_POLLS)]
    max_missing_polls: u32,

    /// Publish metrics with gmetric instead of logging them.
    #[arg(long)]
    report: bool,

    /// gmetric executable used with --report.
    #[arg(long, default_value = "gmetric", value_name = "PATH")]
    gmetric: String,

    /// Echo every recognized and ignored line with its numbers.
    #[arg(long)]
    debug: bool,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    fn config(&self) -> GcStatsConfig {
        GcStatsConfig {
            path: self.file.clone(),
            start_at_end: self.tail_only,
            poll_interval: Duration::from_secs(self.poll_interval),
            chunk_size: self.chunk_size,
            metric_prefix: self.prefix.clone(),
            debug: self.debug,
            max_missing_polls: self.max_missing_polls,
        }
    }
}

/// Initializes the tracing subscriber with the appropriate log level.
/// Default level is INFO. Use -q for quiet mode (errors only).
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    match format!("jvm_gc_stats={}", level).parse() {
        Ok(directive) => filter = filter.add_directive(directive),
        Err(e) => eprintln!("invalid log directive: {}", e),
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    let config = args.config();
    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return ExitCode::from(2);
    }

    info!("jvm-gc-stats {} starting", env!("CARGO_PKG_VERSION"));
    info!(
        "Config: file={}, mode={}, poll={}s, chunk={}B, prefix={}",
        config.path.display(),
        if config.start_at_end { "tail" } else { "replay" },
        args.poll_interval,
        config.chunk_size,
        config.metric_prefix
    );

    let mut tailer = match FileTailer::from_config(&config) {
        Ok(t) => t,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let sink: Box<dyn ReportSink> = if args.report {
        info!("Publishing metrics with {}", args.gmetric);
        Box::new(GmetricSink::new(&config, args.gmetric.as_str()))
    } else {
        info!("Publishing disabled, metrics are logged only");
        Box::new(LogSink::new(&config))
    };
    let mut pipeline = GcStatsPipeline::new(&config, sink);

    // Setup graceful shutdown
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    }) {
        warn!("Failed to set Ctrl-C handler: {}", e);
    }

    let result = pipeline.run(&mut tailer, &running);

    let stats = pipeline.stats();
    info!(
        "Processed {} lines: {} events, {} ignored, {} unmatched, {} metrics, {} heartbeats",
        stats.lines, stats.events, stats.ignored, stats.unmatched, stats.metrics, stats.heartbeats
    );

    match result {
        Ok(()) => {
            info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
