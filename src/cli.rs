use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "debtmeter")]
#[command(about = "Track code quality metrics across the history of a git repository")]
#[command(version)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        default_value = "warn",
        help = "Log level or filter directive (overridden by RUST_LOG)"
    )]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Record metrics for every commit not yet in the database
    Generate {
        #[arg(
            short = 'C',
            long,
            default_value = crate::config::DEFAULT_CONFIG_FILE,
            help = "Path to the generate config file"
        )]
        config: PathBuf,

        #[arg(short, long, help = "Worker threads for diffing (defaults to available cores)")]
        jobs: Option<usize>,
    },
    /// Serve a metrics database as JSON over HTTP
    Serve {
        #[arg(help = "Path to a database created by `generate`")]
        database: PathBuf,

        #[arg(short, long, default_value_t = crate::server::DEFAULT_PORT, help = "Port to listen on")]
        port: u16,
    },
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    pub fn execute(self) -> Result<()> {
        match self.command {
            Commands::Generate { config, jobs } => crate::generate::exec(&config, jobs),
            Commands::Serve { database, port } => crate::server::serve(&database, port),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn generate_defaults() {
        let cli = Cli::try_parse_from(["debtmeter", "generate"]).unwrap();
        assert_eq!(cli.log_level, "warn");
        match cli.command {
            Commands::Generate { config, jobs } => {
                assert_eq!(config, PathBuf::from("generate_config.yaml"));
                assert_eq!(jobs, None);
            }
            Commands::Serve { .. } => panic!("expected generate"),
        }
    }

    #[test]
    fn serve_requires_database() {
        assert!(Cli::try_parse_from(["debtmeter", "serve"]).is_err());
        let cli =
            Cli::try_parse_from(["debtmeter", "serve", "db.db", "-p", "8080", "--log-level", "debug"])
                .unwrap();
        assert_eq!(cli.log_level, "debug");
        assert!(matches!(cli.command, Commands::Serve { port: 8080, .. }));
    }
}
