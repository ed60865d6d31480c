//! aadump - Recover Alternate Advancement data from game packet captures
//!
//! This tool replays captured packet logs, locates the AA table packets
//! (rediscovering their opcode after a client patch if needed) and writes
//! the decoded abilities to a sorted text report.

use aadump_core::{
    AbilityRecord, ClassMaskLayout, ControllerConfig, DecoderConfig, PacketLog, PassController,
    Report, ReportFormat, SpellTable, StringTable,
};
use anyhow::{bail, Context, Result};
use clap::{Args, Parser, ValueEnum};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, trace, warn, Level};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

/// Recover Alternate Advancement data from game packet captures
#[derive(Parser, Debug)]
#[command(name = "aadump")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    input: InputMode,

    /// Report file to write
    #[arg(short, long, default_value = "aainfo.txt")]
    output: PathBuf,

    /// Opcode of the AA table packet, hex (0x2348) or decimal
    #[arg(long, value_parser = parse_opcode, default_value = "0x2348")]
    opcode: u16,

    /// Skip the known opcode and start with discovery
    #[arg(long, conflicts_with = "opcode")]
    blind: bool,

    /// Game string table used to resolve titles and descriptions
    #[arg(long, default_value = "dbstr_us.txt")]
    strings: PathBuf,

    /// Spell table used to resolve spell names
    #[arg(long)]
    spells: Option<PathBuf>,

    /// Report format
    #[arg(long, value_enum, default_value = "blocks")]
    format: FormatArg,

    /// Class mask layout of the capture's client version
    #[arg(long, value_enum, default_value = "packed32")]
    class_mask: ClassMaskArg,

    /// Records with more effect slots than this are rejected
    #[arg(long, default_value_t = aadump_core::record::MAX_SPA_SLOTS)]
    max_spa_slots: u32,

    /// Dry run - don't write the report, just show what would be written
    #[arg(long)]
    dry_run: bool,

    /// Overwrite an existing report
    #[arg(long)]
    force: bool,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct InputMode {
    /// Path to a single packet log
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Path to a directory of packet logs to process
    #[arg(short, long)]
    directory: Option<PathBuf>,
}

/// Report format
#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    /// One readable block per ability rank
    Blocks,
    /// Caret-separated lines for the spell parser
    Export,
}

impl From<FormatArg> for ReportFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Blocks => ReportFormat::Blocks,
            FormatArg::Export => ReportFormat::Export,
        }
    }
}

/// Class mask layout
#[derive(Debug, Clone, Copy, ValueEnum)]
enum ClassMaskArg {
    /// One 32-bit mask
    Packed32,
    /// 16-bit classes plus a 16-bit berserker flag
    Split16,
}

impl From<ClassMaskArg> for ClassMaskLayout {
    fn from(arg: ClassMaskArg) -> Self {
        match arg {
            ClassMaskArg::Packed32 => ClassMaskLayout::Packed32,
            ClassMaskArg::Split16 => ClassMaskLayout::Split16,
        }
    }
}

/// Parses `0x2348` style hex or a plain decimal opcode
fn parse_opcode(s: &str) -> std::result::Result<u16, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse::<u16>(),
    };
    parsed.map_err(|e| format!("invalid opcode '{}': {}", s, e))
}

/// Tracks captures already processed so copies are only decoded once
#[derive(Default)]
struct CaptureRegistry {
    seen: HashSet<blake3::Hash>,
    stats: RegistryStats,
}

#[derive(Default)]
struct RegistryStats {
    total_found: usize,
    duplicates_skipped: usize,
    decoded: usize,
    failed: usize,
}

impl CaptureRegistry {
    fn new() -> Self {
        Self::default()
    }

    /// Short hash of the content for log output (first 8 chars of blake3)
    fn short_hash(hash: &blake3::Hash) -> String {
        hash.to_hex()[..8].to_string()
    }

    /// Registers a capture, returning false if identical content was seen
    fn register(&mut self, path: &Path, data: &[u8]) -> bool {
        self.stats.total_found += 1;
        let hash = blake3::hash(data);
        if self.seen.insert(hash) {
            return true;
        }
        debug!(
            "Skipping duplicate capture: {} (hash: {})",
            path.display(),
            Self::short_hash(&hash)
        );
        self.stats.duplicates_skipped += 1;
        false
    }

    fn print_summary(&self) {
        info!(
            "Summary: {} captures found, {} duplicates skipped, {} decoded, {} failed",
            self.stats.total_found,
            self.stats.duplicates_skipped,
            self.stats.decoded,
            self.stats.failed
        );
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .init();

    run(&cli)
}

fn run(cli: &Cli) -> Result<()> {
    let captures = if let Some(ref file) = cli.input.file {
        if !file.is_file() {
            bail!("Input file does not exist: {}", file.display());
        }
        vec![file.clone()]
    } else if let Some(ref directory) = cli.input.directory {
        find_captures(directory)?
    } else {
        bail!("Either --file or --directory must be specified")
    };

    let mut registry = CaptureRegistry::new();
    let records = decode_captures(cli, &captures, &mut registry)?;
    registry.print_summary();

    let strings = load_strings(&cli.strings)?;
    let spells = match cli.spells {
        Some(ref path) => SpellTable::from_file(path)
            .with_context(|| format!("Failed to load spell table: {}", path.display()))?,
        None => SpellTable::default(),
    };

    let mut report = Report::new(strings, spells);
    report.extend(records.into_values());
    let content = report
        .render(cli.format.into())
        .context("Failed to render report")?;

    if cli.dry_run {
        println!(
            "Would write {} abilities to {}",
            report.len(),
            cli.output.display()
        );
        if cli.verbose > 0 {
            println!("---");
            print!("{}", content);
            println!("---");
        }
        return Ok(());
    }

    write_report(&cli.output, &content, cli.force)?;
    println!("Wrote {} abilities to {}", report.len(), cli.output.display());
    Ok(())
}

/// Collects packet logs under a directory recursively
fn find_captures(directory: &Path) -> Result<Vec<PathBuf>> {
    if !directory.is_dir() {
        bail!("Path is not a directory: {}", directory.display());
    }

    info!("Scanning directory: {}", directory.display());

    let mut captures = Vec::new();
    for entry in WalkDir::new(directory)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        // Skip hidden files
        if path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with('.'))
            .unwrap_or(false)
        {
            continue;
        }

        if !is_packet_log(path) {
            trace!("Skipping non-capture: {}", path.display());
            continue;
        }
        captures.push(path.to_path_buf());
    }

    info!("Found {} packet logs", captures.len());
    Ok(captures)
}

/// Checks the packet log magic without reading the whole file
fn is_packet_log(path: &Path) -> bool {
    use std::io::Read;
    let mut magic = [0u8; 4];
    fs::File::open(path)
        .and_then(|mut file| file.read_exact(&mut magic))
        .map(|()| PacketLog::is_packet_log(&magic))
        .unwrap_or(false)
}

/// Runs a cold controller over every capture and merges the results
fn decode_captures(
    cli: &Cli,
    captures: &[PathBuf],
    registry: &mut CaptureRegistry,
) -> Result<BTreeMap<u32, AbilityRecord>> {
    let config = ControllerConfig::new()
        .default_opcode((!cli.blind).then_some(cli.opcode))
        .decoder(
            DecoderConfig::new()
                .class_mask(cli.class_mask.into())
                .max_spa_slots(cli.max_spa_slots),
        );
    let mut controller = PassController::with_config(config);
    let mut merged = BTreeMap::new();
    let mut last_failure = None;

    for path in captures {
        trace!("Reading {}", path.display());
        let data =
            fs::read(path).with_context(|| format!("Failed to read capture: {}", path.display()))?;
        if !registry.register(path, &data) {
            continue;
        }

        let log = match PacketLog::from_bytes(&data) {
            Ok(log) => log,
            Err(e) => {
                warn!("Skipping {}: {}", path.display(), e);
                registry.stats.failed += 1;
                last_failure = Some(e);
                continue;
            }
        };
        debug!("Replaying {} packets from {}", log.len(), path.display());

        match controller.run(&log) {
            Ok(result) => {
                if result.opcode != cli.opcode {
                    warn!(
                        "{} used opcode {:#06x}, update --opcode",
                        path.display(),
                        result.opcode
                    );
                }
                info!(
                    "Decoded {} abilities from {}",
                    result.records.len(),
                    path.display()
                );
                registry.stats.decoded += 1;
                merged.extend(result.records);
            }
            Err(e) => {
                error!("{}: {}", path.display(), e);
                registry.stats.failed += 1;
                last_failure = Some(e);
            }
        }
    }

    if merged.is_empty() {
        match last_failure {
            Some(e) => bail!("No abilities recovered: {}", e),
            None => bail!("No packet logs found"),
        }
    }
    Ok(merged)
}

/// Loads the string table, falling back to ids in the report if it is missing
fn load_strings(path: &Path) -> Result<StringTable> {
    if !path.exists() {
        warn!(
            "String table {} not found, titles will be unresolved",
            path.display()
        );
        return Ok(StringTable::default());
    }
    StringTable::from_file(path)
        .with_context(|| format!("Failed to load string table: {}", path.display()))
}

/// Write the report to disk
fn write_report(output_path: &Path, content: &str, force: bool) -> Result<()> {
    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    if output_path.exists() && !force {
        bail!(
            "File already exists: {} (use --force to overwrite)",
            output_path.display()
        );
    }

    let mut file = fs::File::create(output_path)
        .with_context(|| format!("Failed to create file: {}", output_path.display()))?;

    file.write_all(content.as_bytes())
        .with_context(|| format!("Failed to write file: {}", output_path.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use aadump_core::pass::DEFAULT_AA_OPCODE;
    use aadump_core::record::SpaSlot;
    use aadump_core::RawPacket;
    use tempfile::TempDir;

    fn capture(opcode: u16, ids: &[u32]) -> Vec<u8> {
        ids.iter()
            .map(|&aa_id| {
                let record = AbilityRecord {
                    aa_id,
                    title_sid: 8125,
                    desc_sid2: 8125,
                    rank: aa_id % 10,
                    spa_slots: vec![SpaSlot {
                        spa: 363,
                        base1: 1,
                        base2: 0,
                        slot: 1,
                    }],
                    ..AbilityRecord::default()
                };
                RawPacket::new(opcode, record.encode(), 1_536_700_000)
            })
            .collect::<PacketLog>()
            .encode()
            .unwrap()
    }

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("aadump").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_parse_opcode() {
        assert_eq!(parse_opcode("0x2348"), Ok(0x2348));
        assert_eq!(parse_opcode("0X2348"), Ok(0x2348));
        assert_eq!(parse_opcode("9032"), Ok(9032));
        assert!(parse_opcode("0x12345").is_err());
        assert!(parse_opcode("opcode").is_err());
    }

    #[test]
    fn test_capture_registry_deduplication() {
        let mut registry = CaptureRegistry::new();
        let path = Path::new("a.aapl");

        assert!(registry.register(path, b"AAPL one"));
        assert!(!registry.register(path, b"AAPL one"));
        assert!(registry.register(path, b"AAPL two"));

        assert_eq!(registry.stats.total_found, 3);
        assert_eq!(registry.stats.duplicates_skipped, 1);
    }

    #[test]
    fn test_short_hash() {
        let hash = blake3::hash(b"hello");
        assert_eq!(CaptureRegistry::short_hash(&hash).len(), 8);
    }

    #[test]
    fn test_is_packet_log() {
        let temp_dir = TempDir::new().unwrap();
        let log = temp_dir.path().join("session.aapl");
        let text = temp_dir.path().join("notes.txt");
        fs::write(&log, capture(DEFAULT_AA_OPCODE, &[1])).unwrap();
        fs::write(&text, "not a capture").unwrap();

        assert!(is_packet_log(&log));
        assert!(!is_packet_log(&text));
        assert!(!is_packet_log(&temp_dir.path().join("missing")));
    }

    #[test]
    fn test_single_file_end_to_end() {
        let temp_dir = TempDir::new().unwrap();
        let log = temp_dir.path().join("session.aapl");
        let strings = temp_dir.path().join("dbstr_us.txt");
        let output = temp_dir.path().join("aainfo.txt");
        fs::write(&log, capture(0x5555, &[11, 12])).unwrap();
        fs::write(&strings, "8125^1^Battle Ready^0^\n").unwrap();

        let cli = cli(&[
            "--file",
            log.to_str().unwrap(),
            "--strings",
            strings.to_str().unwrap(),
            "--output",
            output.to_str().unwrap(),
        ]);
        run(&cli).unwrap();

        let text = fs::read_to_string(&output).unwrap();
        assert!(text.starts_with("Battle Ready-01\n"));
        assert!(text.contains("Battle Ready-02\n"));

        // existing report is kept without --force
        assert!(run(&cli).is_err());
    }

    #[test]
    fn test_directory_merges_and_skips_duplicates() {
        let temp_dir = TempDir::new().unwrap();
        let output = temp_dir.path().join("out").join("aainfo.txt");
        fs::write(temp_dir.path().join("a.aapl"), capture(DEFAULT_AA_OPCODE, &[1])).unwrap();
        fs::write(temp_dir.path().join("b.aapl"), capture(DEFAULT_AA_OPCODE, &[1])).unwrap();
        fs::write(temp_dir.path().join("c.aapl"), capture(DEFAULT_AA_OPCODE, &[2])).unwrap();
        fs::write(temp_dir.path().join("readme.txt"), "captures").unwrap();

        let cli = cli(&[
            "--directory",
            temp_dir.path().to_str().unwrap(),
            "--strings",
            temp_dir.path().join("missing.txt").to_str().unwrap(),
            "--output",
            output.to_str().unwrap(),
            "--format",
            "export",
        ]);
        let captures = find_captures(temp_dir.path()).unwrap();
        assert_eq!(captures.len(), 3);

        let mut registry = CaptureRegistry::new();
        let merged = decode_captures(&cli, &captures, &mut registry).unwrap();
        assert_eq!(merged.keys().copied().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(registry.stats.duplicates_skipped, 1);

        run(&cli).unwrap();
        assert_eq!(fs::read_to_string(&output).unwrap().lines().count(), 2);
    }

    #[test]
    fn test_no_records_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let log = temp_dir.path().join("empty.aapl");
        fs::write(&log, PacketLog::default().encode().unwrap()).unwrap();

        let cli = cli(&["--file", log.to_str().unwrap(), "--dry-run"]);
        let err = run(&cli).unwrap_err();
        assert!(err.to_string().contains("opcode not found"));
    }

    #[test]
    fn test_blind_conflicts_with_opcode() {
        let result = Cli::try_parse_from(["aadump", "--file", "x", "--blind", "--opcode", "1"]);
        assert!(result.is_err());
    }

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
