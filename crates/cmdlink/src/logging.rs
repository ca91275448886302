use clap::ValueEnum;
use tracing::level_filters::LevelFilter;

/// Rendering of the stderr log stream.
#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Install the process-wide subscriber. Logs go to stderr so command
/// output on stdout stays machine-readable.
pub fn init_logging(format: LogFormat, level: LevelFilter) {
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .with_ansi(false)
        .with_target(false);

    match format {
        LogFormat::Text => {
            let _ = builder.try_init();
        }
        LogFormat::Json => {
            let _ = builder.json().try_init();
        }
    }
}
