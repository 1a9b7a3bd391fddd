use clap::Parser;
use tradecanvas::cli::{run, Cli};

fn main() -> std::process::ExitCode {
    run(Cli::parse())
}
