use std::path::PathBuf;

use clap::{Subcommand, ValueHint};

#[derive(clap::Parser, Debug, Clone)]
#[command(version, about)]
pub struct Args {
    /// Path to the feed list (TOML with `[[feeds]]` tables).
    #[arg(long = "feeds", global = true, env = "FEEDS_PATH", value_hint(ValueHint::FilePath))]
    pub feeds_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Check every feed once and deliver or store new articles.
    Run,
    /// Send the weekly digest of delivered articles.
    Digest,
    /// Serve the messaging webhook.
    Serve,
}

impl Args {
    pub fn parse() -> Self {
        clap::Parser::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn parses_subcommands_and_feed_override() {
        let args = Args::try_parse_from(["feed-bot", "run", "--feeds", "my.toml"]).unwrap();
        assert_eq!(args.command, Command::Run);
        assert_eq!(args.feeds_path, Some(PathBuf::from("my.toml")));

        let args = Args::try_parse_from(["feed-bot", "serve"]).unwrap();
        assert_eq!(args.command, Command::Serve);
    }

    #[test]
    fn requires_a_subcommand() {
        assert!(Args::try_parse_from(["feed-bot"]).is_err());
    }
}
