//! Command implementations for the CLI tool.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use filetime::FileTime;
use flzma2::codec::StreamProp;
use flzma2::{DecoderConfig, Fl2Reader, StreamProgress, find_decompressed_size};

use crate::OutputFormat;
use crate::exit_codes::{ExitCode, error_to_exit_code, io_error_to_exit_code};
use crate::output::{FileReport, StreamInfo, create_formatter};
use crate::progress::ByteProgress;

/// Extension of compressed files
const FL2_EXTENSION: &str = "fl2";

/// Decompressed bytes requested per read
const COPY_BUFFER_SIZE: usize = 256 * 1024;

/// Configuration for the decompress command.
pub struct DecompressConfig<'a> {
    pub files: &'a [PathBuf],
    pub to_stdout: bool,
    pub keep: bool,
    pub force: bool,
    pub output: Option<&'a Path>,
    pub format: OutputFormat,
    pub quiet: bool,
    pub decoder: DecoderConfig,
}

/// A compressed input
#[derive(Debug, PartialEq)]
enum Input {
    Stdin,
    File(PathBuf),
}

impl Input {
    fn name(&self) -> String {
        match self {
            Input::Stdin => "(stdin)".to_string(),
            Input::File(path) => path.display().to_string(),
        }
    }

    /// Opens the input, returning it with its size when known
    fn open(&self) -> io::Result<(Box<dyn Read>, Option<u64>)> {
        match self {
            Input::Stdin => Ok((Box::new(io::stdin().lock()), None)),
            Input::File(path) => {
                let file = File::open(path)?;
                let len = file.metadata().ok().map(|m| m.len());
                Ok((Box::new(io::BufReader::new(file)), len))
            }
        }
    }
}

/// Where decompressed data goes
#[derive(Debug, PartialEq)]
enum Target {
    Stdout,
    File(PathBuf),
}

fn inputs(files: &[PathBuf]) -> Vec<Input> {
    if files.is_empty() {
        return vec![Input::Stdin];
    }
    files
        .iter()
        .map(|f| {
            if f.as_os_str() == "-" {
                Input::Stdin
            } else {
                Input::File(f.clone())
            }
        })
        .collect()
}

fn output_target(input: &Input, config: &DecompressConfig<'_>) -> Result<Target, String> {
    if config.to_stdout {
        return Ok(Target::Stdout);
    }
    if let Some(path) = config.output {
        return Ok(Target::File(path.to_path_buf()));
    }
    match input {
        Input::Stdin => Ok(Target::Stdout),
        Input::File(path) => {
            if path.extension().is_some_and(|ext| ext == FL2_EXTENSION) {
                Ok(Target::File(path.with_extension("")))
            } else {
                Err(format!("unknown suffix, expected .{}", FL2_EXTENSION))
            }
        }
    }
}

/// Decompress command implementation
pub fn decompress(config: &DecompressConfig<'_>) -> ExitCode {
    let formatter = create_formatter(config.format);
    let inputs = inputs(config.files);
    if config.output.is_some() && inputs.len() > 1 {
        eprintln!("Error: --output takes a single input");
        return ExitCode::BadArgs;
    }

    let mut exit = ExitCode::Success;
    let mut reports = Vec::with_capacity(inputs.len());
    let mut wrote_stdout = false;

    for input in &inputs {
        let start = Instant::now();
        let mut report = FileReport {
            name: input.name(),
            compressed: 0,
            decompressed: 0,
            elapsed: Default::default(),
            error: None,
        };

        let result = match output_target(input, config) {
            Ok(target) => {
                wrote_stdout |= target == Target::Stdout;
                decompress_one(input, &target, config)
            }
            Err(msg) => Err((msg, ExitCode::BadArgs)),
        };
        match result {
            Ok(progress) => {
                report.compressed = progress.bytes_in;
                report.decompressed = progress.bytes_out;
            }
            Err((msg, code)) => {
                eprintln!("Error: {}: {}", report.name, msg);
                report.error = Some(msg);
                exit = exit.worst(code);
            }
        }
        report.elapsed = start.elapsed();
        reports.push(report);
    }

    let text = formatter.format_reports("Decompressed", &reports);
    // Keep stdout clean when it carries decompressed data
    if wrote_stdout {
        eprint!("{}", text);
    } else {
        print!("{}", text);
    }
    exit
}

fn decompress_one(
    input: &Input,
    target: &Target,
    config: &DecompressConfig<'_>,
) -> Result<StreamProgress, (String, ExitCode)> {
    let io_failure = |e: io::Error| (e.to_string(), io_error_to_exit_code(&e));

    let (reader, total) = input.open().map_err(io_failure)?;
    let progress = ByteProgress::new(&input.name(), total, config.quiet);

    let result = match target {
        Target::Stdout => {
            let mut out = io::stdout().lock();
            copy_stream(reader, &mut out, &config.decoder, &progress)
        }
        Target::File(path) => write_file(reader, path, config, &progress),
    };
    let stats = match result {
        Ok(stats) => stats,
        Err(e) => {
            progress.abandon();
            return Err(io_failure(e));
        }
    };
    progress.finish();

    if let (Input::File(src), Target::File(dst)) = (input, target) {
        copy_mtime(src, dst);
        if !config.keep {
            fs::remove_file(src).map_err(io_failure)?;
        }
    }
    Ok(stats)
}

fn write_file(
    reader: Box<dyn Read>,
    path: &Path,
    config: &DecompressConfig<'_>,
    progress: &ByteProgress,
) -> io::Result<StreamProgress> {
    let mut options = OpenOptions::new();
    options.write(true);
    if config.force {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }
    let file = options.open(path)?;

    let mut out = BufWriter::new(file);
    let result = copy_stream(reader, &mut out, &config.decoder, progress)
        .and_then(|stats| out.flush().map(|()| stats));
    if result.is_err() {
        drop(out);
        if let Err(e) = fs::remove_file(path) {
            log::warn!("could not remove partial output {}: {}", path.display(), e);
        }
    }
    result
}

/// Decodes `reader` into `out`, returning the byte counts
fn copy_stream<W: Write>(
    reader: Box<dyn Read>,
    out: &mut W,
    decoder: &DecoderConfig,
    progress: &ByteProgress,
) -> io::Result<StreamProgress> {
    let mut reader = Fl2Reader::with_config(reader, decoder.clone()).map_err(io::Error::from)?;
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        out.write_all(&buf[..n])?;
        progress.set_position(reader.progress().bytes_in);
    }
    Ok(reader.progress())
}

fn copy_mtime(from: &Path, to: &Path) {
    let result = fs::metadata(from).and_then(|meta| {
        filetime::set_file_mtime(to, FileTime::from_last_modification_time(&meta))
    });
    if let Err(e) = result {
        log::warn!("could not preserve modification time of {}: {}", to.display(), e);
    }
}

/// Test command implementation
pub fn test(
    files: &[PathBuf],
    format: OutputFormat,
    quiet: bool,
    decoder: &DecoderConfig,
) -> ExitCode {
    let formatter = create_formatter(format);
    let mut exit = ExitCode::Success;
    let mut reports = Vec::new();

    for input in inputs(files) {
        let start = Instant::now();
        let name = input.name();
        let result = input.open().and_then(|(reader, total)| {
            let progress = ByteProgress::new(&name, total, quiet);
            let result = copy_stream(reader, &mut io::sink(), decoder, &progress);
            match &result {
                Ok(_) => progress.finish(),
                Err(_) => progress.abandon(),
            }
            result
        });

        let mut report = FileReport {
            name,
            compressed: 0,
            decompressed: 0,
            elapsed: start.elapsed(),
            error: None,
        };
        match result {
            Ok(stats) => {
                report.compressed = stats.bytes_in;
                report.decompressed = stats.bytes_out;
            }
            Err(e) => {
                exit = exit.worst(io_error_to_exit_code(&e));
                report.error = Some(e.to_string());
            }
        }
        reports.push(report);
    }

    print!("{}", formatter.format_reports("Tested", &reports));
    exit
}

/// Info command implementation
pub fn info(files: &[PathBuf], format: OutputFormat) -> ExitCode {
    let formatter = create_formatter(format);
    let mut exit = ExitCode::Success;
    let mut infos = Vec::new();

    for path in files {
        let name = path.display().to_string();
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(e) => {
                eprintln!("Error: {}: {}", name, e);
                exit = exit.worst(io_error_to_exit_code(&e));
                continue;
            }
        };
        let Some(&prop_byte) = data.first() else {
            eprintln!("Error: {}: empty file", name);
            exit = exit.worst(ExitCode::BadStream);
            continue;
        };

        let prop = StreamProp::parse(prop_byte);
        let dict_size = match prop.dict_size() {
            Ok(size) => size,
            Err(e) => {
                eprintln!("Error: {}: {}", name, e);
                exit = exit.worst(error_to_exit_code(&e));
                continue;
            }
        };
        let decompressed = find_decompressed_size(&data).map_err(|e| {
            exit = exit.worst(error_to_exit_code(&e));
            e.to_string()
        });

        infos.push(StreamInfo {
            name,
            prop: prop_byte,
            dict_size,
            has_checksum: prop.has_checksum,
            compressed: data.len() as u64,
            decompressed,
        });
    }

    print!("{}", formatter.format_info(&infos));
    exit
}
