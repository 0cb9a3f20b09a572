use crate::commands::{
    run_automation, run_import, run_statement, AutomationCommand, ImportArgs, StatementArgs,
};
use crate::server;
use clap::{Args, Parser, Subcommand};
use tvde_fleet::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "TVDE Fleet",
    about = "Run the TVDE fleet management service and its offline tools",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Parse a platform CSV export and print a summary without storing it
    Import(ImportArgs),
    /// Work with automation definition files
    Automation {
        #[command(subcommand)]
        command: AutomationCommand,
    },
    /// Compute a sample weekly statement for one commission driver
    Statement(StatementArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Import(args) => run_import(args),
        Command::Automation { command } => run_automation(command),
        Command::Statement(args) => run_statement(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_is_the_default_command() {
        let cli = Cli::try_parse_from(["tvde-fleet"]).expect("parses");
        assert!(cli.command.is_none());
    }

    #[test]
    fn import_arguments_are_typed() {
        let cli = Cli::try_parse_from([
            "tvde-fleet",
            "import",
            "--platform",
            "bolt",
            "--csv",
            "bolt.csv",
            "--from",
            "2025-03-10",
            "--to",
            "16/03/2025",
        ])
        .expect("parses");
        match cli.command {
            Some(Command::Import(args)) => {
                assert_eq!(args.platform, tvde_fleet::fleet::Platform::Bolt);
                assert_eq!(args.to.to_string(), "2025-03-16");
            }
            other => panic!("unexpected command {other:?}"),
        }

        let error = Cli::try_parse_from([
            "tvde-fleet", "import", "--platform", "lyft", "--csv", "x.csv", "--from",
            "2025-03-10", "--to", "2025-03-16",
        ])
        .expect_err("unknown platform");
        assert!(error.to_string().contains("lyft"));
    }
}
