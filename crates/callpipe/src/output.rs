use std::io::IsTerminal;

use callpipe_frame::Call;
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

use crate::convert::to_json;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
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

#[derive(Serialize)]
struct CallOutput<'a> {
    index: usize,
    name: &'a str,
    argc: usize,
    args: Vec<serde_json::Value>,
}

/// Prints decoded calls as they arrive. Table output is collected and
/// rendered by [`CallPrinter::finish`].
pub struct CallPrinter {
    format: OutputFormat,
    printed: usize,
    table: Option<Table>,
}

impl CallPrinter {
    pub fn new(format: OutputFormat) -> Self {
        let table = (format == OutputFormat::Table).then(|| {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["#", "NAME", "ARGC", "ARGS"]);
            table
        });
        Self {
            format,
            printed: 0,
            table,
        }
    }

    pub fn print(&mut self, call: &Call) {
        let index = self.printed;
        self.printed += 1;

        match self.format {
            OutputFormat::Json => {
                let out = CallOutput {
                    index,
                    name: call.name(),
                    argc: call.args().len(),
                    args: call.args().iter().map(to_json).collect(),
                };
                println!(
                    "{}",
                    serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
                );
            }
            OutputFormat::Table => {
                if let Some(table) = self.table.as_mut() {
                    table.add_row(vec![
                        index.to_string(),
                        call.name().to_string(),
                        call.args().len().to_string(),
                        render_args(call),
                    ]);
                }
            }
            OutputFormat::Pretty => {
                println!("{}({})", call.name(), render_args(call));
            }
        }
    }

    /// Number of calls printed so far.
    pub fn count(&self) -> usize {
        self.printed
    }

    pub fn finish(self) {
        if let Some(table) = self.table {
            if self.printed > 0 {
                println!("{table}");
            }
        }
    }
}

fn render_args(call: &Call) -> String {
    call.args()
        .iter()
        .map(|arg| to_json(arg).to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
