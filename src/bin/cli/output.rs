//! Output formatting for CLI operations.

use serde_json::json;
use std::time::Duration;

/// Outcome of decompressing or testing one input
pub struct FileReport {
    pub name: String,
    pub compressed: u64,
    pub decompressed: u64,
    pub elapsed: Duration,
    pub error: Option<String>,
}

impl FileReport {
    fn ratio(&self) -> f64 {
        if self.decompressed == 0 {
            0.0
        } else {
            self.compressed as f64 / self.decompressed as f64
        }
    }

    fn speed(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.decompressed as f64 / secs
        } else {
            0.0
        }
    }
}

/// Stream header details shown by `info`
pub struct StreamInfo {
    pub name: String,
    pub prop: u8,
    pub dict_size: usize,
    pub has_checksum: bool,
    pub compressed: u64,
    pub decompressed: Result<u64, String>,
}

/// Trait for output formatting
pub trait OutputFormatter {
    /// Formats per-file results of `decompress` or `test`
    fn format_reports(&self, action: &str, reports: &[FileReport]) -> String;

    /// Formats stream information
    fn format_info(&self, infos: &[StreamInfo]) -> String;
}

/// Human-readable output formatter
pub struct HumanFormatter;

impl OutputFormatter for HumanFormatter {
    fn format_reports(&self, action: &str, reports: &[FileReport]) -> String {
        let mut output = String::new();
        let mut failed = 0;

        for report in reports {
            match &report.error {
                None => output.push_str(&format!(
                    "{}: {} -> {} ({:.1}%, {}/s) OK\n",
                    report.name,
                    humanize_bytes(report.compressed),
                    humanize_bytes(report.decompressed),
                    report.ratio() * 100.0,
                    humanize_bytes(report.speed() as u64)
                )),
                Some(error) => {
                    failed += 1;
                    output.push_str(&format!("{}: FAILED: {}\n", report.name, error));
                }
            }
        }

        if reports.len() > 1 {
            output.push_str(&"-".repeat(40));
            output.push('\n');
            output.push_str(&format!(
                "{} {} files, {} failed\n",
                action,
                reports.len(),
                failed
            ));
        }

        output
    }

    fn format_info(&self, infos: &[StreamInfo]) -> String {
        let mut output = String::new();

        for info in infos {
            output.push_str(&format!("{}:\n", info.name));
            output.push_str(&"-".repeat(40));
            output.push('\n');
            output.push_str(&format!("  Property:       {:#04x}\n", info.prop));
            output.push_str(&format!(
                "  Dictionary:     {}\n",
                humanize_bytes(info.dict_size as u64)
            ));
            output.push_str(&format!(
                "  Checksum:       {}\n",
                if info.has_checksum { "XXH32" } else { "None" }
            ));
            output.push_str(&format!(
                "  Packed size:    {}\n",
                humanize_bytes(info.compressed)
            ));
            match &info.decompressed {
                Ok(size) => {
                    output.push_str(&format!("  Size:           {}\n", humanize_bytes(*size)));
                    if *size > 0 {
                        output.push_str(&format!(
                            "  Ratio:          {:.1}%\n",
                            info.compressed as f64 / *size as f64 * 100.0
                        ));
                    }
                }
                Err(e) => output.push_str(&format!("  Size:           unknown ({})\n", e)),
            }
        }

        output
    }
}

/// JSON output formatter
pub struct JsonFormatter;

impl OutputFormatter for JsonFormatter {
    fn format_reports(&self, action: &str, reports: &[FileReport]) -> String {
        let files: Vec<_> = reports
            .iter()
            .map(|r| {
                json!({
                    "name": r.name,
                    "compressed_size": r.compressed,
                    "decompressed_size": r.decompressed,
                    "elapsed_ms": r.elapsed.as_millis() as u64,
                    "success": r.error.is_none(),
                    "error": r.error,
                })
            })
            .collect();
        let obj = json!({
            "action": action,
            "success": reports.iter().all(|r| r.error.is_none()),
            "files": files,
        });

        serde_json::to_string_pretty(&obj).unwrap_or_else(|_| "{}".to_string())
    }

    fn format_info(&self, infos: &[StreamInfo]) -> String {
        let items: Vec<_> = infos
            .iter()
            .map(|i| {
                json!({
                    "name": i.name,
                    "prop": i.prop,
                    "dict_size": i.dict_size,
                    "checksum": i.has_checksum,
                    "compressed_size": i.compressed,
                    "decompressed_size": i.decompressed.as_ref().ok(),
                    "error": i.decompressed.as_ref().err(),
                })
            })
            .collect();

        serde_json::to_string_pretty(&items).unwrap_or_else(|_| "[]".to_string())
    }
}

/// Creates the appropriate formatter based on output format
pub fn create_formatter(format: super::OutputFormat) -> Box<dyn OutputFormatter> {
    match format {
        super::OutputFormat::Human => Box::new(HumanFormatter),
        super::OutputFormat::Json => Box::new(JsonFormatter),
    }
}

/// Converts bytes to a human-readable string
pub fn humanize_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];

    let mut value = bytes as f64;
    let mut unit = None;
    for name in UNITS {
        if value < 1024.0 {
            break;
        }
        value /= 1024.0;
        unit = Some(name);
    }
    match unit {
        Some(name) => format!("{:.1} {}", value, name),
        None => format!("{} B", bytes),
    }
}
