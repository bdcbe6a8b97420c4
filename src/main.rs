use anyhow::Result;
use clap::Parser;
use register_placer::{analyse_main, place_main, CLIArguments};

fn main() -> Result<()> {
    env_logger::init();
    let args = CLIArguments::parse();

    match args {
        CLIArguments::Place(args) => place_main(args),
        CLIArguments::Analyse(args) => analyse_main(args),
    }
}
