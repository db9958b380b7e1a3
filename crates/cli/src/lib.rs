pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use crate::commands::rules::RulesAction;

#[derive(Debug, Parser)]
#[command(
    name = "caseflow",
    about = "Caseflow routing operator CLI",
    long_about = "Manage routing rules, submit and assign service requests, and run SLA reconciliation.",
    after_help = "Examples:\n  caseflow migrate\n  caseflow rules list\n  caseflow submit --file request.json\n  caseflow sla-cycle --watch"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations")]
    Migrate,
    #[command(about = "Load the deterministic demo providers and routing rules")]
    Seed,
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(subcommand, about = "Manage the routing rule catalog")]
    Rules(RulesCommand),
    #[command(about = "Create a request from a JSON file and auto-assign it")]
    Submit {
        #[arg(long)]
        file: PathBuf,
    },
    #[command(about = "Retry auto-assignment for a pending request")]
    Assign { request_id: String },
    #[command(about = "Move a request to another provider")]
    Reassign {
        request_id: String,
        provider_id: String,
        #[arg(long)]
        reason: String,
        #[arg(long, help = "Restart the SLA deadline from now")]
        recompute_deadline: bool,
    },
    #[command(about = "Apply a lifecycle operation given as JSON")]
    Lifecycle {
        request_id: String,
        #[arg(long)]
        operation: String,
    },
    #[command(about = "Show active and completed-today counts for a provider")]
    Workload { provider_id: String },
    #[command(about = "Aggregate the assignment history")]
    Stats,
    #[command(name = "sla-cycle", about = "Reclassify SLA status of active requests")]
    SlaCycle {
        #[arg(long, help = "Keep running on the configured interval until interrupted")]
        watch: bool,
    },
}

#[derive(Debug, Subcommand)]
enum RulesCommand {
    #[command(about = "List rules in evaluation order")]
    List,
    Show {
        id: String,
    },
    #[command(about = "Create a rule from a JSON draft")]
    Add {
        #[arg(long)]
        file: PathBuf,
    },
    Update {
        id: String,
        #[arg(long)]
        file: PathBuf,
    },
    Toggle {
        id: String,
        #[arg(long, action = clap::ArgAction::Set)]
        active: bool,
    },
    Delete {
        id: String,
    },
    #[command(about = "Dry-run a rule against sample request attributes")]
    Test {
        id: String,
        #[arg(long)]
        sample: PathBuf,
    },
}

impl From<RulesCommand> for RulesAction {
    fn from(command: RulesCommand) -> Self {
        match command {
            RulesCommand::List => Self::List,
            RulesCommand::Show { id } => Self::Show { id },
            RulesCommand::Add { file } => Self::Add { file },
            RulesCommand::Update { id, file } => Self::Update { id, file },
            RulesCommand::Toggle { id, active } => Self::Toggle { id, active },
            RulesCommand::Delete { id } => Self::Delete { id },
            RulesCommand::Test { id, sample } => Self::Test { id, sample },
        }
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => commands::config::run(),
        Command::Rules(command) => commands::rules::run(command.into()),
        Command::Submit { file } => commands::submit::run(&file),
        Command::Assign { request_id } => commands::assign::run(&request_id),
        Command::Reassign { request_id, provider_id, reason, recompute_deadline } => {
            commands::reassign::run(&request_id, &provider_id, &reason, recompute_deadline)
        }
        Command::Lifecycle { request_id, operation } => {
            commands::lifecycle::run(&request_id, &operation)
        }
        Command::Workload { provider_id } => commands::workload::run(&provider_id),
        Command::Stats => commands::stats::run(),
        Command::SlaCycle { watch } => commands::sla::run(watch),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
