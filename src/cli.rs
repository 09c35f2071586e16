use clap::{Parser, Subcommand};

/// Calm Stream - neurofeedback calm score relay
#[derive(Parser)]
#[command(name = "calm-stream")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the server (default)
    Serve {
        /// Start replaying this dataset id instead of the live device
        #[arg(long)]
        dataset: Option<i64>,
    },

    /// List recorded datasets with their ids
    Datasets,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_serve() {
        let cli = Cli::try_parse_from(["calm-stream"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_serve_with_dataset() {
        let cli = Cli::try_parse_from(["calm-stream", "serve", "--dataset", "2"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Serve { dataset: Some(2) })));
    }

    #[test]
    fn test_datasets_command() {
        let cli = Cli::try_parse_from(["calm-stream", "datasets"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Datasets)));
    }
}
