use clap::Parser;

use channelfs_cli::Args;

fn main() {
    env_logger::init();
    let args = Args::parse();

    if let Err(e) = channelfs_cli::run(&args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
