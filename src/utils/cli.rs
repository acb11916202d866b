use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "photo-archive-server")]
#[command(version)]
#[command(about = "Streams directories of photos as ZIP archives over HTTP", long_about = None)]
#[command(after_help = "Examples:\n  \
  photo-archive-server -p ./photos            serve archives from ./photos\n  \
  photo-archive-server -l -s                  verbose logging with slow chunked delivery")]
pub struct Cli {
    /// Log archive lifecycle events
    #[arg(short = 'l', long = "logging")]
    pub logging: bool,

    /// Pause after every chunk to emulate a slow connection
    #[arg(short = 's', long = "low-speed", alias = "low_speed")]
    pub low_speed: bool,

    /// Directory holding one subdirectory per archive
    #[arg(short = 'p', long = "path", value_name = "DIR")]
    pub path: Option<PathBuf>,

    /// HTML page served at /
    #[arg(long = "index", value_name = "FILE")]
    pub index: Option<PathBuf>,

    /// Address to bind
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(long)]
    pub port: Option<u16>,
}
