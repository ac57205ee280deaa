use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    /// Wire bytes only, for piping into a device.
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// A printable result row.
pub trait Report: Serialize {
    fn headers() -> Vec<&'static str>;

    fn row(&self) -> Vec<String>;

    /// One-line `key=value` rendering.
    fn pretty(&self) -> String {
        Self::headers()
            .into_iter()
            .zip(self.row())
            .map(|(key, value)| format!("{}={value}", key.to_ascii_lowercase()))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Bytes written for [`OutputFormat::Raw`]; `None` falls back to JSON.
    fn raw(&self) -> Option<Vec<u8>> {
        None
    }
}

pub fn print_reports<R: Report>(reports: &[R], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            for report in reports {
                print_json(report);
            }
        }
        OutputFormat::Table => {
            if reports.is_empty() {
                return;
            }
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(R::headers());
            for report in reports {
                table.add_row(report.row());
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for report in reports {
                println!("{}", report.pretty());
            }
        }
        OutputFormat::Raw => {
            for report in reports {
                match report.raw() {
                    Some(bytes) => print_raw(&bytes),
                    None => print_json(report),
                }
            }
        }
    }
}

pub fn print_report<R: Report>(report: &R, format: OutputFormat) {
    print_reports(std::slice::from_ref(report), format);
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}
