use clap::Parser;

fn main() -> miette::Result<()> {
    ddv_run::Cli::parse().run()
}
