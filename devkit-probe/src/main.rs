//! Readiness probe for a running devkit API.

mod probe;

use std::process::ExitCode;

use clap::Parser;

#[derive(Parser)]
#[command(name = "devkit-probe", version, about = "Check a running devkit API")]
struct Cli {
    /// Base URL of the API (defaults to http://localhost:<port>)
    #[arg(long, env = "HLA_DEVKIT_API_BASE")]
    base: Option<String>,

    /// Port used when no base URL is given
    #[arg(long, env = "HLA_DEVKIT_API_PORT", default_value_t = probe::DEFAULT_PORT)]
    port: u16,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    devkit::logging::init_stderr("warn");
    let cli = Cli::parse();
    let base = probe::base_url(cli.base.as_deref(), cli.port);

    match probe::run(&base).await {
        Ok(report) => {
            print!("{report}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            println!("{err}");
            ExitCode::FAILURE
        }
    }
}
