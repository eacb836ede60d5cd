// Command-line front end.
//
// Subcommands map onto the library: `encode` and `decode` stream through
// `io::encode_stream` / `io::decode_stream`, `header(s)` walk the window
// headers without a source, `config` prints build settings.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::{ArgAction, Args, Parser, Subcommand, ValueHint};

use crate::compress::encoder::CompressOptions;
use crate::hash::config::{
    self, DEFAULT_BLOCK_SIZE, DEFAULT_WINDOW_SIZE, MIN_BLOCK_SIZE, MatcherConfig,
};
use crate::io::{self as fileio, DecodeStats, EncodeStats, hex_digest};
use crate::vcdiff::address_cache::AddressCache;
use crate::vcdiff::decoder::{DecodeError, DecodeOptions, InstructionIterator};
use crate::vcdiff::header::{FileHeader, MAX_WINDOW_SIZE, WinIndicator, WindowHeader};
use crate::vcdiff::sections::SectionCursors;
use crate::vcdiff::Instruction;

const DEFAULT_LEVEL: u32 = 6;

const BUF_SIZE: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// Byte size parsing (supports K, M, G suffixes)
// ---------------------------------------------------------------------------

fn parse_byte_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty size string".into());
    }
    let (num_part, multiplier) = match s.as_bytes().last() {
        Some(b'k' | b'K') => (&s[..s.len() - 1], 1u64 << 10),
        Some(b'm' | b'M') => (&s[..s.len() - 1], 1 << 20),
        Some(b'g' | b'G') => (&s[..s.len() - 1], 1 << 30),
        _ => (s, 1),
    };
    let num: u64 = num_part
        .trim()
        .parse()
        .map_err(|e| format!("invalid size '{s}': {e}"))?;
    num.checked_mul(multiplier)
        .ok_or_else(|| format!("size overflow: '{s}'"))
}

// ---------------------------------------------------------------------------
// Clap CLI definition
// ---------------------------------------------------------------------------

/// Binary delta encoder/decoder (VCDIFF family).
#[derive(Parser, Debug)]
#[command(
    name = "vcdelta",
    version,
    about = "Binary delta encoder/decoder",
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,

    /// Force overwrite existing output files.
    #[arg(short = 'f', long, global = true)]
    force: bool,

    /// Quiet mode (only errors are logged).
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Verbose mode (repeat for more detail).
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Print stats as JSON to stderr.
    #[arg(long = "json", global = true)]
    json_output: bool,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Encode the delta from a source to a target.
    Encode(EncodeArgs),
    /// Rebuild a target from a source and a delta.
    Decode(DecodeArgs),
    /// Print build and default settings.
    Config,
    /// Print the file header and the first window header.
    Header(PrintArgs),
    /// Print the file header and every window header.
    Headers(PrintArgs),
}

#[derive(Args, Debug)]
struct EncodeTuningArgs {
    /// Matcher effort (0-9): 0-2 fast, 3-6 default, 7-9 slow.
    #[arg(long, short = 'l', value_parser = clap::value_parser!(u32).range(0..=9), default_value_t = DEFAULT_LEVEL)]
    level: u32,

    /// Width of indexed blocks.
    #[arg(long = "block-size", short = 'B', default_value_t = DEFAULT_BLOCK_SIZE)]
    block_size: usize,

    /// Target window size (supports K/M/G suffix).
    #[arg(long = "window-size", short = 'W', value_parser = parse_byte_size, default_value_t = DEFAULT_WINDOW_SIZE as u64)]
    window_size: u64,

    /// Hash chain entries examined per lookup (overrides the level).
    #[arg(long = "max-probes")]
    max_probes: Option<usize>,

    /// Store a checksum with every window.
    #[arg(long)]
    checksum: bool,

    /// Write the interleaved single-section layout.
    #[arg(long)]
    interleaved: bool,

    /// Attach an application header.
    #[arg(long = "app-header")]
    app_header: Option<String>,
}

#[derive(Args, Debug)]
struct EncodeArgs {
    /// Source file to copy from (default: none).
    #[arg(long, short = 's', value_hint = ValueHint::FilePath)]
    source: Option<PathBuf>,

    /// Output delta file (default: stdout).
    #[arg(long, short = 'o', value_hint = ValueHint::FilePath, conflicts_with = "output_pos")]
    output: Option<PathBuf>,

    /// Write output to stdout.
    #[arg(short = 'c', long)]
    stdout: bool,

    #[command(flatten)]
    tuning: EncodeTuningArgs,

    /// Target file (default: stdin).
    #[arg(value_hint = ValueHint::FilePath)]
    input_pos: Option<PathBuf>,

    /// Output delta file (positional form).
    #[arg(value_hint = ValueHint::FilePath)]
    output_pos: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct DecodeArgs {
    /// Source file to copy from (default: none).
    #[arg(long, short = 's', value_hint = ValueHint::FilePath)]
    source: Option<PathBuf>,

    /// Output file (default: stdout).
    #[arg(long, short = 'o', value_hint = ValueHint::FilePath, conflicts_with = "output_pos")]
    output: Option<PathBuf>,

    /// Write output to stdout.
    #[arg(short = 'c', long)]
    stdout: bool,

    /// Skip window checksum verification.
    #[arg(long = "no-verify")]
    no_verify: bool,

    /// Decode and verify without writing output.
    #[arg(long = "check-only")]
    no_output: bool,

    /// Refuse windows larger than this (supports K/M/G suffix).
    #[arg(long = "max-window-size", value_parser = parse_byte_size, default_value_t = MAX_WINDOW_SIZE as u64)]
    max_window_size: u64,

    /// Delta file (default: stdin).
    #[arg(value_hint = ValueHint::FilePath)]
    input_pos: Option<PathBuf>,

    /// Output file (positional form).
    #[arg(value_hint = ValueHint::FilePath)]
    output_pos: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct PrintArgs {
    /// Delta file.
    #[arg(value_hint = ValueHint::FilePath)]
    input: PathBuf,

    /// Also list each window's instructions.
    #[arg(long)]
    instructions: bool,
}

// ---------------------------------------------------------------------------
// Resolved command + options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Encode,
    Decode,
    Config,
    PrintHdr,
    PrintHdrs,
}

#[derive(Debug)]
struct Options {
    command: Command,
    use_stdout: bool,
    force: bool,
    quiet: bool,
    verbose: u8,
    json_output: bool,
    source_file: Option<PathBuf>,
    input_file: Option<PathBuf>,
    output_file: Option<PathBuf>,
    no_output: bool,
    // encode
    level: u32,
    block_size: usize,
    window_size: u64,
    max_probes: Option<usize>,
    checksum: bool,
    interleaved: bool,
    app_header: Option<String>,
    // decode
    verify: bool,
    max_window_size: u64,
    // print
    instructions: bool,
}

impl Options {
    fn new(command: Command, cli: &Cli) -> Self {
        Self {
            command,
            use_stdout: false,
            force: cli.force,
            quiet: cli.quiet,
            verbose: cli.verbose.min(3),
            json_output: cli.json_output,
            source_file: None,
            input_file: None,
            output_file: None,
            no_output: false,
            level: DEFAULT_LEVEL,
            block_size: DEFAULT_BLOCK_SIZE,
            window_size: DEFAULT_WINDOW_SIZE as u64,
            max_probes: None,
            checksum: false,
            interleaved: false,
            app_header: None,
            verify: true,
            max_window_size: MAX_WINDOW_SIZE as u64,
            instructions: false,
        }
    }
}

fn resolve_options(cli: Cli) -> Options {
    match &cli.command {
        Cmd::Encode(args) => Options {
            use_stdout: args.stdout,
            source_file: args.source.clone(),
            input_file: args.input_pos.clone(),
            output_file: args.output.clone().or_else(|| args.output_pos.clone()),
            level: args.tuning.level,
            block_size: args.tuning.block_size,
            window_size: args.tuning.window_size,
            max_probes: args.tuning.max_probes,
            checksum: args.tuning.checksum,
            interleaved: args.tuning.interleaved,
            app_header: args.tuning.app_header.clone(),
            ..Options::new(Command::Encode, &cli)
        },
        Cmd::Decode(args) => Options {
            use_stdout: args.stdout,
            source_file: args.source.clone(),
            input_file: args.input_pos.clone(),
            output_file: args.output.clone().or_else(|| args.output_pos.clone()),
            no_output: args.no_output,
            verify: !args.no_verify,
            max_window_size: args.max_window_size,
            ..Options::new(Command::Decode, &cli)
        },
        Cmd::Config => Options::new(Command::Config, &cli),
        Cmd::Header(args) => Options {
            input_file: Some(args.input.clone()),
            instructions: args.instructions,
            ..Options::new(Command::PrintHdr, &cli)
        },
        Cmd::Headers(args) => Options {
            input_file: Some(args.input.clone()),
            instructions: args.instructions,
            ..Options::new(Command::PrintHdrs, &cli)
        },
    }
}

fn log_filter(opts: &Options) -> &'static str {
    if opts.quiet {
        return "error";
    }
    match opts.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

// ---------------------------------------------------------------------------
// Config command
// ---------------------------------------------------------------------------

fn cmd_config(opts: &Options) -> i32 {
    let version = env!("CARGO_PKG_VERSION");
    let adler32 = cfg!(feature = "adler32");
    let file_io = cfg!(feature = "file-io");
    let profile = config::config_for_level(opts.level);

    if opts.json_output {
        let json = serde_json::json!({
            "version": version,
            "adler32_simd": adler32,
            "file_io": file_io,
            "default_level": DEFAULT_LEVEL,
            "default_block_size": DEFAULT_BLOCK_SIZE,
            "min_block_size": MIN_BLOCK_SIZE,
            "default_window_size": DEFAULT_WINDOW_SIZE,
            "max_window_size": MAX_WINDOW_SIZE,
            "min_match": profile.min_match,
            "min_run": profile.min_run,
            "max_probes": profile.max_probes,
        });
        eprintln!("{json:#}");
        return 0;
    }

    eprintln!("vcdelta version {version}");
    eprintln!("ADLER32_SIMD={}", u8::from(adler32));
    eprintln!("FILE_IO={}", u8::from(file_io));
    eprintln!("DEFAULT_LEVEL={DEFAULT_LEVEL}");
    eprintln!("DEFAULT_BLOCK_SIZE={DEFAULT_BLOCK_SIZE}");
    eprintln!("MIN_BLOCK_SIZE={MIN_BLOCK_SIZE}");
    eprintln!("DEFAULT_WINDOW_SIZE={DEFAULT_WINDOW_SIZE}");
    eprintln!("MAX_WINDOW_SIZE={MAX_WINDOW_SIZE}");
    for level in [0, DEFAULT_LEVEL, 9] {
        let c = config::config_for_level(level);
        eprintln!(
            "PROFILE[{}]=min_match:{} min_run:{} max_probes:{}",
            config::profile_name(level),
            c.min_match,
            c.min_run,
            c.max_probes
        );
    }
    0
}

// ---------------------------------------------------------------------------
// Shared I/O setup
// ---------------------------------------------------------------------------

fn read_source(opts: &Options) -> Result<Vec<u8>, String> {
    match &opts.source_file {
        Some(path) => {
            std::fs::read(path).map_err(|e| format!("source file: {}: {e}", path.display()))
        }
        None => Ok(Vec::new()),
    }
}

fn open_input(path: Option<&Path>) -> Result<Box<dyn Read>, String> {
    match path {
        Some(path) => File::open(path)
            .map(|f| Box::new(BufReader::with_capacity(BUF_SIZE, f)) as Box<dyn Read>)
            .map_err(|e| format!("input file: {}: {e}", path.display())),
        None => Ok(Box::new(BufReader::new(io::stdin()))),
    }
}

fn open_output(opts: &Options) -> Result<Box<dyn Write>, String> {
    if opts.no_output {
        return Ok(Box::new(io::sink()));
    }
    match (&opts.output_file, opts.use_stdout) {
        (Some(path), false) => {
            if path.exists() && !opts.force {
                return Err(format!(
                    "output file exists, use -f to overwrite: {}",
                    path.display()
                ));
            }
            File::create(path)
                .map(|f| Box::new(BufWriter::with_capacity(BUF_SIZE, f)) as Box<dyn Write>)
                .map_err(|e| format!("output file: {}: {e}", path.display()))
        }
        _ => Ok(Box::new(BufWriter::with_capacity(
            BUF_SIZE,
            io::stdout().lock(),
        ))),
    }
}

fn digest_json(digest: Option<[u8; 32]>) -> serde_json::Value {
    digest.map_or(serde_json::Value::Null, |d| hex_digest(&d).into())
}

// ---------------------------------------------------------------------------
// Encode command
// ---------------------------------------------------------------------------

fn build_compress_options(opts: &Options) -> Result<CompressOptions, String> {
    let window_size = usize::try_from(opts.window_size)
        .map_err(|_| format!("window size {} is too large", opts.window_size))?;
    let mut matcher: MatcherConfig = config::config_for_level(opts.level);
    if let Some(probes) = opts.max_probes {
        matcher.max_probes = probes;
    }
    let compress = CompressOptions {
        block_size: opts.block_size,
        checksum: opts.checksum,
        interleaved: opts.interleaved,
        window_size,
        matcher,
        app_header: opts.app_header.as_ref().map(|s| s.as_bytes().to_vec()),
        ..Default::default()
    };
    compress.validate().map_err(|e| e.to_string())?;
    Ok(compress)
}

fn encode(opts: &Options) -> Result<EncodeStats, String> {
    let compress_opts = build_compress_options(opts)?;
    let source = read_source(opts)?;
    let input = open_input(opts.input_file.as_deref())?;
    let output = open_output(opts)?;
    fileio::encode_stream(&source, input, output, compress_opts).map_err(|e| e.to_string())
}

fn cmd_encode(opts: &Options) -> i32 {
    let stats = match encode(opts) {
        Ok(stats) => stats,
        Err(e) => {
            eprintln!("vcdelta: encode: {e}");
            return 1;
        }
    };

    log::info!(
        "encoder: source size: {}, input size: {}, delta size: {}, windows: {}",
        stats.source_size,
        stats.target_size,
        stats.delta_size,
        stats.windows
    );

    if opts.json_output {
        let json = serde_json::json!({
            "command": "encode",
            "source_size": stats.source_size,
            "target_size": stats.target_size,
            "delta_size": stats.delta_size,
            "windows": stats.windows,
            "level": opts.level,
            "block_size": opts.block_size,
            "checksum": opts.checksum,
            "interleaved": opts.interleaved,
            "target_sha256": digest_json(stats.target_sha256),
        });
        eprintln!("{json:#}");
    }
    0
}

// ---------------------------------------------------------------------------
// Decode command
// ---------------------------------------------------------------------------

fn decode(opts: &Options) -> Result<DecodeStats, String> {
    let source = read_source(opts)?;
    let input = open_input(opts.input_file.as_deref())?;
    let output = open_output(opts)?;
    let options = DecodeOptions {
        verify_checksum: opts.verify,
        max_window_size: opts.max_window_size,
        ..Default::default()
    };
    fileio::decode_stream(&source, input, output, options).map_err(|e| e.to_string())
}

fn cmd_decode(opts: &Options) -> i32 {
    let stats = match decode(opts) {
        Ok(stats) => stats,
        Err(e) => {
            eprintln!("vcdelta: decode: {e}");
            return 1;
        }
    };

    log::info!(
        "decoder: output size: {}, windows: {}",
        stats.output_size,
        stats.windows
    );

    if opts.json_output {
        let json = serde_json::json!({
            "command": "decode",
            "source_size": stats.source_size,
            "delta_size": stats.delta_size,
            "output_size": stats.output_size,
            "windows": stats.windows,
            "output_sha256": digest_json(stats.output_sha256),
        });
        eprintln!("{json:#}");
    }
    0
}

// ---------------------------------------------------------------------------
// Print commands (header, headers)
// ---------------------------------------------------------------------------

fn indicator_names(ind: WinIndicator) -> String {
    let names: Vec<&str> = ind
        .iter_names()
        .map(|(name, _)| match name {
            "SOURCE" => "VCD_SOURCE",
            "TARGET" => "VCD_TARGET",
            "CHECKSUM" => "VCD_CHECKSUM",
            other => other,
        })
        .collect();
    if names.is_empty() {
        "none".into()
    } else {
        names.join(" ")
    }
}

fn print_file_header(hdr: &FileHeader, out: &mut impl Write) -> io::Result<()> {
    let layout = if hdr.interleaved { "interleaved" } else { "plain" };
    writeln!(out, "VCDIFF header size:           {}", hdr.encoded_len())?;
    writeln!(out, "VCDIFF section layout:        {layout}")?;
    if let Some(app) = &hdr.app_header {
        writeln!(
            out,
            "VCDIFF application header:    {}",
            String::from_utf8_lossy(app)
        )?;
    }
    Ok(())
}

fn print_window_header(
    num: u64,
    wh: &WindowHeader,
    target_offset: u64,
    out: &mut impl Write,
) -> io::Result<()> {
    writeln!(out, "VCDIFF window number:         {num}")?;
    writeln!(out, "VCDIFF window indicator:      {}", indicator_names(wh.indicator))?;
    if let Some(sum) = wh.checksum {
        writeln!(out, "VCDIFF window checksum:       {sum:08X}")?;
    }
    writeln!(out, "VCDIFF window at offset:      {target_offset}")?;
    if wh.has_segment() {
        writeln!(out, "VCDIFF copy segment length:   {}", wh.segment_len)?;
        writeln!(out, "VCDIFF copy segment offset:   {}", wh.segment_pos)?;
    }
    writeln!(out, "VCDIFF delta encoding length: {}", wh.enc_len)?;
    writeln!(out, "VCDIFF target window length:  {}", wh.target_len)?;
    writeln!(out, "VCDIFF data section length:   {}", wh.data_len)?;
    writeln!(out, "VCDIFF inst section length:   {}", wh.inst_len)?;
    writeln!(out, "VCDIFF addr section length:   {}", wh.addr_len)
}

fn print_instructions(
    wh: &WindowHeader,
    body: &[u8],
    interleaved: bool,
    cache: &mut AddressCache,
    target_offset: u64,
    out: &mut impl Write,
) -> Result<(), String> {
    let cursors =
        SectionCursors::split(body, wh.data_len as usize, wh.inst_len as usize, interleaved)
            .map_err(|e| e.to_string())?;
    let seg_len = wh.segment_len;
    let iter = InstructionIterator::new(cursors, cache, seg_len + target_offset);

    let w = |e: io::Error| e.to_string();
    writeln!(out, "  Offset   Type   Size  Address").map_err(w)?;
    let mut offset = target_offset;
    for inst in iter {
        let inst = inst.map_err(|e| e.to_string())?;
        let line = match inst {
            Instruction::Add { len } => format!("  {offset:08} ADD  {len:7}"),
            Instruction::Run { len } => format!("  {offset:08} RUN  {len:7}"),
            Instruction::Copy { len, addr, mode } => {
                let at = if addr < seg_len {
                    let kind = if wh.indicator.contains(WinIndicator::TARGET) {
                        'T'
                    } else {
                        'S'
                    };
                    format!("{kind}@{}", wh.segment_pos + addr)
                } else {
                    format!("T@{}", addr - seg_len)
                };
                format!("  {offset:08} CPY{mode} {len:7}  {at}")
            }
        };
        writeln!(out, "{line}").map_err(w)?;
        offset += match inst {
            Instruction::Add { len } | Instruction::Run { len } | Instruction::Copy { len, .. } => {
                u64::from(len)
            }
        };
    }
    Ok(())
}

fn print_delta(opts: &Options, path: &Path, out: &mut impl Write) -> Result<(), String> {
    let file = File::open(path).map_err(|e| format!("{}: {e}", path.display()))?;
    let mut reader = BufReader::with_capacity(BUF_SIZE, file);
    let io_err = |e: io::Error| e.to_string();

    let file_hdr =
        FileHeader::decode(&mut reader).map_err(|e| format!("invalid header: {e}"))?;
    print_file_header(&file_hdr, out).map_err(io_err)?;

    let mut cache = AddressCache::new();
    let mut body = Vec::new();
    let mut target_offset = 0u64;
    let mut window_num = 0u64;

    while let Some(wh) = WindowHeader::decode(&mut reader, MAX_WINDOW_SIZE as u64)
        .map_err(|e| format!("window {window_num}: {e}"))?
    {
        writeln!(out).map_err(io_err)?;
        print_window_header(window_num, &wh, target_offset, out).map_err(io_err)?;

        let body_len = wh
            .sections_len()
            .ok_or_else(|| format!("window {window_num}: section lengths overflow"))?;
        body.clear();
        let got = (&mut reader)
            .take(body_len)
            .read_to_end(&mut body)
            .map_err(io_err)?;
        if (got as u64) < body_len {
            let e = DecodeError::Truncated(format!("{got} of {body_len} section bytes"));
            return Err(format!("window {window_num}: {e}"));
        }

        if opts.instructions {
            print_instructions(
                &wh,
                &body,
                file_hdr.interleaved,
                &mut cache,
                target_offset,
                out,
            )
            .map_err(|e| format!("window {window_num}: {e}"))?;
        }

        target_offset += wh.target_len;
        window_num += 1;
        if opts.command == Command::PrintHdr {
            break;
        }
    }

    if opts.json_output {
        let json = serde_json::json!({
            "command": "headers",
            "interleaved": file_hdr.interleaved,
            "windows": window_num,
            "target_size": target_offset,
        });
        eprintln!("{json:#}");
    }
    Ok(())
}

fn cmd_print(opts: &Options) -> i32 {
    let Some(path) = opts.input_file.as_deref() else {
        eprintln!("vcdelta: print commands require an input file");
        return 1;
    };
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let result = print_delta(opts, path, &mut out);
    let flushed = out.flush();
    match (result, flushed) {
        (Ok(()), Ok(())) => 0,
        (Err(e), _) => {
            eprintln!("vcdelta: {}: {e}", path.display());
            1
        }
        (_, Err(e)) => {
            eprintln!("vcdelta: stdout: {e}");
            1
        }
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Main CLI entry point.  Parses arguments, sets up logging, dispatches.
pub fn run() -> ! {
    let cli = Cli::parse();
    let mut opts = resolve_options(cli);

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_filter(&opts)))
        .format_timestamp(None)
        .format_target(false)
        .init();

    if opts.use_stdout
        && let Some(path) = opts.output_file.take()
    {
        log::warn!("-c overrides output filename: {}", path.display());
    }

    let exit_code = match opts.command {
        Command::Encode => cmd_encode(&opts),
        Command::Decode => cmd_decode(&opts),
        Command::Config => cmd_config(&opts),
        Command::PrintHdr | Command::PrintHdrs => cmd_print(&opts),
    };

    process::exit(exit_code);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_opts(args: &[&str]) -> Options {
        let argv: Vec<String> = std::iter::once("vcdelta".to_string())
            .chain(args.iter().map(|s| s.to_string()))
            .collect();
        let cli = Cli::try_parse_from(argv).expect("cli parse failed");
        resolve_options(cli)
    }

    #[test]
    fn parse_byte_size_suffixes() {
        assert_eq!(parse_byte_size("1").unwrap(), 1);
        assert_eq!(parse_byte_size("2K").unwrap(), 2 * 1024);
        assert_eq!(parse_byte_size("3m").unwrap(), 3 * 1024 * 1024);
        assert_eq!(parse_byte_size("4G").unwrap(), 4 * 1024 * 1024 * 1024);
        assert!(parse_byte_size("").is_err());
        assert!(parse_byte_size("12x").is_err());
        assert!(parse_byte_size("99999999999999999999G").is_err());
    }

    #[test]
    fn encode_subcommand_maps_correctly() {
        let opts = parse_opts(&[
            "encode",
            "-s",
            "source.bin",
            "--level",
            "9",
            "--window-size",
            "1M",
            "--block-size",
            "32",
            "--checksum",
            "--interleaved",
            "target.bin",
            "-o",
            "out.vcdiff",
        ]);
        assert_eq!(opts.command, Command::Encode);
        assert_eq!(opts.level, 9);
        assert_eq!(opts.window_size, 1024 * 1024);
        assert_eq!(opts.block_size, 32);
        assert!(opts.checksum && opts.interleaved);
        assert_eq!(opts.source_file, Some(PathBuf::from("source.bin")));
        assert_eq!(opts.input_file, Some(PathBuf::from("target.bin")));
        assert_eq!(opts.output_file, Some(PathBuf::from("out.vcdiff")));
    }

    #[test]
    fn decode_subcommand_maps_correctly() {
        let opts = parse_opts(&[
            "--quiet",
            "decode",
            "--source",
            "source.bin",
            "--no-verify",
            "--check-only",
            "in.vcdiff",
            "out.bin",
        ]);
        assert_eq!(opts.command, Command::Decode);
        assert!(!opts.verify);
        assert!(opts.no_output);
        assert!(opts.quiet);
        assert_eq!(opts.input_file, Some(PathBuf::from("in.vcdiff")));
        assert_eq!(opts.output_file, Some(PathBuf::from("out.bin")));
        assert_eq!(log_filter(&opts), "error");
    }

    #[test]
    fn global_flags() {
        let opts = parse_opts(&["--force", "--json", "encode", "--stdout", "in", "out"]);
        assert!(opts.use_stdout);
        assert!(opts.force);
        assert!(opts.json_output);
    }

    #[test]
    fn verbosity_selects_log_filter() {
        assert_eq!(log_filter(&parse_opts(&["config"])), "warn");
        assert_eq!(log_filter(&parse_opts(&["-v", "config"])), "info");
        assert_eq!(log_filter(&parse_opts(&["-vv", "config"])), "debug");
        assert_eq!(log_filter(&parse_opts(&["-vvvvv", "config"])), "trace");
    }

    #[test]
    fn quiet_conflicts_with_verbose() {
        let argv = ["vcdelta", "-q", "-v", "config"];
        assert!(Cli::try_parse_from(argv).is_err());
    }

    #[test]
    fn header_commands_map() {
        assert_eq!(parse_opts(&["header", "in"]).command, Command::PrintHdr);
        let all = parse_opts(&["headers", "--instructions", "in"]);
        assert_eq!(all.command, Command::PrintHdrs);
        assert!(all.instructions);
    }

    #[test]
    fn compress_options_mapping() {
        let opts = parse_opts(&[
            "encode",
            "--level",
            "0",
            "--max-probes",
            "7",
            "--window-size",
            "64K",
            "--app-header",
            "v1",
            "in",
            "out",
        ]);
        let c = build_compress_options(&opts).unwrap();
        assert_eq!(c.window_size, 64 * 1024);
        assert_eq!(c.matcher.max_probes, 7);
        assert_eq!(c.matcher.min_match, config::FAST.min_match);
        assert!(!c.checksum);
        assert_eq!(c.app_header.as_deref(), Some(&b"v1"[..]));
    }

    #[test]
    fn invalid_compress_options_rejected() {
        let opts = parse_opts(&["encode", "--block-size", "1", "in", "out"]);
        assert!(build_compress_options(&opts).is_err());
        let opts = parse_opts(&["encode", "--window-size", "1G", "in", "out"]);
        assert!(build_compress_options(&opts).is_err());
    }

    #[test]
    fn indicator_names_render() {
        assert_eq!(indicator_names(WinIndicator::empty()), "none");
        assert_eq!(
            indicator_names(WinIndicator::SOURCE | WinIndicator::CHECKSUM),
            "VCD_SOURCE VCD_CHECKSUM"
        );
    }
}
