use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "wardend")]
#[command(author, version, about = "Warden authorization server", long_about = None)]
pub struct Args {
    /// Path to the JSON configuration file
    #[arg(short, long, env = "WARDEN_CONFIG", default_value = "config.json")]
    pub config: PathBuf,

    /// Also write daily-rotated log files into this directory
    #[arg(long, env = "WARDEN_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// Print the computed topology and start order, then exit
    #[arg(long)]
    pub check: bool,
}
