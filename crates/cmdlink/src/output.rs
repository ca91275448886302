use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};

use cmdlink_proto::CommandResponse;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
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

pub fn print_response(response: &CommandResponse, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            // The response already has a canonical JSON shape; print that.
            println!(
                "{}",
                serde_json::to_string(response).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["STATUS", "MESSAGE", "DATA"])
                .add_row(vec![
                    if response.success { "ok" } else { "failed" }.to_string(),
                    response.message.clone(),
                    response.data.clone(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "success={} format={} message={} data={}",
                response.success, response.format, response.message, response.data
            );
        }
        OutputFormat::Raw => {
            print_raw(response.data.as_bytes());
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}
