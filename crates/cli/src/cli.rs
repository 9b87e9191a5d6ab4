use std::path::PathBuf;

use clap::Parser;

/// Resolve configuration macros against a snapshot.
///
/// Reads a JSON request (`{"kind": "texts" | "triggers" | "graphs", "data": {...}}`),
/// resolves it with the named scenario and prints the result as JSON.
#[derive(Parser, Debug)]
#[command(name = "confmacro", about = "Resolve monitoring configuration macros")]
pub struct CliArgs {
    /// YAML snapshot of hosts, templates, interfaces, items, triggers and history
    #[arg(long)]
    pub snapshot: Option<PathBuf>,

    /// Scenario name, e.g. scriptConfirmation or triggerName
    #[arg(long)]
    pub scenario: Option<String>,

    /// Request file, or `-` for stdin
    #[arg(long, default_value = "-")]
    pub input: String,

    /// Trigger names: resolve only $1..$9
    #[arg(long)]
    pub references_only: bool,

    /// Print single-line JSON instead of pretty JSON
    #[arg(long)]
    pub compact: bool,

    /// List scenario names and exit
    #[arg(long)]
    pub list_scenarios: bool,
}
