use anyhow::Result;
use debtmeter::cli::Cli;

fn main() -> Result<()> {
    let cli = Cli::parse();
    debtmeter::logging::init(&cli.log_level);
    cli.execute()
}
