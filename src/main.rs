//! fsdispatch CLI - kernel file primitive diagnostics
//!
//! Reports what the probe found and exercises each primitive from the shell.

use anyhow::Context;
use clap::Parser;
use fsdispatch::config::{CliArgs, Commands, DispatchConfig};
use fsdispatch::fs::{find_mount, CopyEngine, CopyOutcome, FileAttributes, MountTable};
use fsdispatch::system::capability::{COPY_FILE_RANGE_MIN_KERNEL, STATX_MIN_KERNEL};
use fsdispatch::system::{capabilities, KernelVersion};
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_sigint(_: libc::c_int) {
    INTERRUPTED.store(true, Ordering::Release);
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let args = CliArgs::parse();

    match run(args) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn run(args: CliArgs) -> anyhow::Result<i32> {
    let config = match &args.config {
        Some(path) => DispatchConfig::from_json_file(path)?,
        None => DispatchConfig::default(),
    };
    tracing::debug!(?config, "configuration loaded");

    match &args.command {
        Commands::Probe => cmd_probe(),
        Commands::Stat { path, no_follow, json } => cmd_stat(path, !*no_follow, *json),
        Commands::Mounts { table } => cmd_mounts(&config, table.as_deref()),
        Commands::Copy {
            source,
            destination,
            cancellable,
        } => cmd_copy(&config, source, destination, *cancellable),
    }
}

fn release(v: (u32, u32, u32)) -> String {
    format!("{}.{}.{}", v.0, v.1, v.2)
}

fn timestamp(t: filetime::FileTime) -> String {
    format!("{}.{:09}", t.unix_seconds(), t.nanoseconds())
}

fn cmd_probe() -> anyhow::Result<i32> {
    let flags = capabilities().flags();
    let yes_no = |b: bool| if b { "yes" } else { "no" };

    println!("=== Kernel Facilities ===");
    match KernelVersion::current() {
        Some(v) => println!("Kernel:              {}", v),
        None => println!("Kernel:              unknown"),
    }
    println!(
        "statx:               {} (kernel {}+)",
        yes_no(flags.extended_stat),
        release(STATX_MIN_KERNEL)
    );
    println!(
        "copy_file_range:     {} (kernel {}+)",
        yes_no(flags.in_kernel_copy),
        release(COPY_FILE_RANGE_MIN_KERNEL)
    );
    Ok(0)
}

fn cmd_stat(path: &Path, follow: bool, json: bool) -> anyhow::Result<i32> {
    let attrs = FileAttributes::get(path, follow)?;

    if json {
        let doc = serde_json::json!({
            "path": path.display().to_string(),
            "file_type": format!("{:?}", attrs.file_type()),
            "source": if attrs.is_statx() { "statx" } else { "stat" },
            "metadata": attrs.metadata(),
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(0);
    }

    let meta = attrs.metadata();
    println!("File:     {}", path.display());
    println!("Type:     {:?}", attrs.file_type());
    println!(
        "Size:     {} ({} bytes)",
        humansize::format_size(attrs.size(), humansize::BINARY),
        attrs.size()
    );
    println!("Mode:     {:04o}", attrs.permissions());
    println!("Inode:    {}  Device: {:#x}  Links: {}", meta.ino, meta.dev, meta.nlink);
    println!("Owner:    uid={} gid={}", meta.uid, meta.gid);
    println!("Modified: {}", timestamp(attrs.last_modified_time()));
    println!("Accessed: {}", timestamp(attrs.last_access_time()));
    println!("Changed:  {}", timestamp(attrs.last_change_time()));
    match attrs.birth_time() {
        Some(t) => println!("Birth:    {}", timestamp(t.to_file_time())),
        None => println!("Birth:    - (creation time falls back to {})", timestamp(attrs.creation_time())),
    }
    println!("Source:   {}", if attrs.is_statx() { "statx" } else { "stat" });
    Ok(0)
}

fn cmd_mounts(config: &DispatchConfig, table: Option<&Path>) -> anyhow::Result<i32> {
    let mounts = match table {
        Some(path) => MountTable::open_with_buffer(path, "r", config.mounts.line_buffer_size)?,
        None => MountTable::from_config(&config.mounts)?,
    };

    let entries: Vec<_> = mounts.collect();
    println!("{:<24} {:<32} {:<10} OPTIONS", "SOURCE", "MOUNT POINT", "TYPE");
    for entry in &entries {
        println!(
            "{:<24} {:<32} {:<10} {}",
            entry.fsname_lossy(),
            entry.dir_path().display(),
            entry.fstype_lossy(),
            String::from_utf8_lossy(&entry.opts)
        );
    }
    println!("\n{} mounts", entries.len());

    if let Ok(cwd) = std::env::current_dir() {
        if let Some(m) = find_mount(&entries, &cwd) {
            println!("Current directory is on {} ({})", m.dir_path().display(), m.fstype_lossy());
        }
    }
    Ok(0)
}

fn cmd_copy(
    config: &DispatchConfig,
    source: &Path,
    destination: &Path,
    cancellable: bool,
) -> anyhow::Result<i32> {
    let src = File::open(source).with_context(|| format!("opening {}", source.display()))?;
    let dst = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(destination)
        .with_context(|| format!("creating {}", destination.display()))?;

    let cancel = if cancellable {
        let action = SigAction::new(SigHandler::Handler(on_sigint), SaFlags::empty(), SigSet::empty());
        // SAFETY: the handler only stores to an atomic.
        unsafe { sigaction(Signal::SIGINT, &action) }.context("installing SIGINT handler")?;
        Some(&INTERRUPTED)
    } else {
        None
    };

    let engine = CopyEngine::system().with_transfer_config(config.transfer)?;
    let start = Instant::now();
    let report = engine.copy_with_report(&dst, &src, cancel);
    let elapsed = start.elapsed();

    println!("Outcome:  {:?} (code {})", report.outcome, report.outcome.code());
    if let Some(primitive) = report.primitive {
        println!("Via:      {:?}", primitive);
    }
    println!(
        "Copied:   {} in {:.2?}",
        humansize::format_size(report.bytes_copied, humansize::BINARY),
        elapsed
    );
    if elapsed.as_secs_f64() > 0.0 {
        println!(
            "Speed:    {}/s",
            humansize::format_size(
                (report.bytes_copied as f64 / elapsed.as_secs_f64()) as u64,
                humansize::BINARY
            )
        );
    }

    match report.outcome.into_result()? {
        CopyOutcome::Success => Ok(0),
        _ => Ok(1),
    }
}
