mod business;
mod cli;

use clap::Parser;
use cli::Cli;

fn main() {
    env_logger::init();
    let args = Cli::parse();

    if let Err(e) = business::handle_command(args.command) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
