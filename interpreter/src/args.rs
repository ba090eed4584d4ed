use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "reflox")]
#[command(bin_name = "reflox")]
#[command(version, about = "A tree-walking interpreter for the reflox language", long_about = None)]
pub struct RefloxArgs {
    /// The script to run. Starts an interactive session when omitted.
    pub script: Option<String>,

    /// Arguments made available to the script as `argv`.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}
