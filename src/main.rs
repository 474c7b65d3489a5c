use clap::Parser;
use sheet_worklog_lib::ServeOptions;
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "sheet-worklog", version, about = "Work-log ledger backed by a spreadsheet")]
struct Args {
    #[arg(long, env = "WORKLOG_ADDR", default_value = "127.0.0.1:5000")]
    addr: SocketAddr,
    /// Falls back to GOOGLE_SHEET_ID when unset.
    #[arg(long, env = "GOOGLE_SHEET_ID_JOBS")]
    spreadsheet_id: Option<String>,
    #[arg(long, env = "WORKLOG_LOG_DIR", default_value = "logs")]
    log_dir: PathBuf,
    /// Keep everything in process memory instead of Google Sheets.
    #[arg(long, default_value_t = false)]
    in_memory: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    sheet_worklog_lib::run(ServeOptions {
        addr: args.addr,
        spreadsheet_id: args.spreadsheet_id.filter(|id| !id.trim().is_empty()),
        log_dir: args.log_dir,
        in_memory: args.in_memory,
    })
    .await
}
