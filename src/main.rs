use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::io;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use storykeeper::cli;
use storykeeper::config::Config;

#[derive(Parser)]
#[command(name = "storykeeper", version)]
#[command(about = "Bounded narrative memory for AI-assisted novel writing", long_about = None)]
struct Cli {
    /// Path to config file (defaults to ./storykeeper.toml or ~/.config/storykeeper/config.toml)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Log debug output (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create (or open) a book's memory file and record its metadata
    Init {
        title: String,

        #[arg(long)]
        author: Option<String>,

        #[arg(long)]
        genre: Option<String>,

        /// Planned number of chapters
        #[arg(long)]
        chapters: Option<u32>,

        #[arg(long)]
        target_words: Option<u64>,
    },

    /// Add or replace a character
    Character {
        title: String,
        name: String,

        #[arg(long)]
        role: Option<String>,

        #[arg(long)]
        description: Option<String>,

        /// Position in the POV rotation
        #[arg(long)]
        pov_order: Option<u32>,
    },

    /// Add or replace a setting
    Setting {
        title: String,
        name: String,

        #[arg(long)]
        description: Option<String>,

        #[arg(long)]
        significance: Option<String>,
    },

    /// Add a plot point
    PlotPoint {
        title: String,
        chapter: u32,
        description: String,

        /// e.g. "inciting incident", "midpoint", "climax"
        #[arg(long)]
        kind: Option<String>,
    },

    /// Record a chapter summary read from a file
    Summary {
        title: String,
        chapter: u32,
        summary_file: PathBuf,

        /// Chapter word count (defaults to the summary's word count)
        #[arg(long)]
        words: Option<u64>,
    },

    /// Apply a JSON tracking update to a chapter
    Update {
        title: String,
        chapter: u32,
        payload: PathBuf,
    },

    /// Extract a tracking update from chapter prose with the configured LLM
    Extract {
        title: String,
        chapter: u32,
        chapter_file: PathBuf,

        /// Print the extracted update without applying it
        #[arg(long)]
        no_apply: bool,

        /// Use mock LLM client for testing
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the context for writing a chapter as JSON
    Context {
        title: String,
        chapter: u32,

        /// Series bible file to include series context from
        #[arg(long)]
        series: Option<PathBuf>,

        /// Book number within the series (defaults to the book's metadata, then 1)
        #[arg(long, requires = "series")]
        book: Option<u32>,
    },

    /// Print cache statistics for every tracking map as JSON
    Stats { title: String },

    /// Validate the configuration and environment
    ConfigCheck,

    /// Generate shell completions
    Completions { shell: Shell },
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "storykeeper", &mut io::stdout());
        return Ok(());
    }
    if let Commands::ConfigCheck = cli.command {
        return cli::config_check::run(cli.config);
    }

    let config = Config::load_with_path(cli.config)?;

    match cli.command {
        Commands::Init {
            title,
            author,
            genre,
            chapters,
            target_words,
        } => cli::book::init(&config, &title, author, genre, chapters, target_words)?,
        Commands::Character {
            title,
            name,
            role,
            description,
            pov_order,
        } => cli::book::character(&config, &title, &name, role, description, pov_order)?,
        Commands::Setting {
            title,
            name,
            description,
            significance,
        } => cli::book::setting(&config, &title, &name, description, significance)?,
        Commands::PlotPoint {
            title,
            chapter,
            description,
            kind,
        } => cli::book::plot_point(&config, &title, chapter, &description, kind)?,
        Commands::Summary {
            title,
            chapter,
            summary_file,
            words,
        } => cli::book::summary(&config, &title, chapter, &summary_file, words)?,
        Commands::Update {
            title,
            chapter,
            payload,
        } => cli::track::update(&config, &title, chapter, &payload)?,
        Commands::Extract {
            title,
            chapter,
            chapter_file,
            no_apply,
            dry_run,
        } => {
            cli::track::extract(&config, &title, chapter, &chapter_file, no_apply, dry_run)
                .await?
        }
        Commands::Context {
            title,
            chapter,
            series,
            book,
        } => cli::context::context(&config, &title, chapter, series, book)?,
        Commands::Stats { title } => cli::context::stats(&config, &title)?,
        Commands::ConfigCheck | Commands::Completions { .. } => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_parse_init_with_all_args() {
        let cli = Cli::try_parse_from([
            "storykeeper",
            "init",
            "Salt Roads",
            "--author",
            "R. Vale",
            "--chapters",
            "24",
            "--target-words",
            "90000",
        ])
        .unwrap();
        match cli.command {
            Commands::Init {
                title,
                author,
                genre,
                chapters,
                target_words,
            } => {
                assert_eq!(title, "Salt Roads");
                assert_eq!(author.unwrap(), "R. Vale");
                assert!(genre.is_none());
                assert_eq!(chapters, Some(24));
                assert_eq!(target_words, Some(90000));
            }
            _ => panic!("expected init"),
        }
    }

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "storykeeper",
            "stats",
            "Salt Roads",
            "--config",
            "custom.toml",
            "-v",
        ])
        .unwrap();
        assert_eq!(cli.config.as_deref(), Some("custom.toml"));
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Stats { .. }));
    }

    #[test]
    fn test_parse_extract_flags() {
        let cli = Cli::try_parse_from([
            "storykeeper",
            "extract",
            "Salt Roads",
            "3",
            "ch3.txt",
            "--no-apply",
            "--dry-run",
        ])
        .unwrap();
        match cli.command {
            Commands::Extract {
                chapter,
                chapter_file,
                no_apply,
                dry_run,
                ..
            } => {
                assert_eq!(chapter, 3);
                assert_eq!(chapter_file, PathBuf::from("ch3.txt"));
                assert!(no_apply);
                assert!(dry_run);
            }
            _ => panic!("expected extract"),
        }
    }

    #[test]
    fn test_parse_plot_point_kebab_case() {
        let cli = Cli::try_parse_from([
            "storykeeper",
            "plot-point",
            "Salt Roads",
            "12",
            "The ferry sinks",
            "--kind",
            "midpoint",
        ])
        .unwrap();
        match cli.command {
            Commands::PlotPoint {
                chapter,
                description,
                kind,
                ..
            } => {
                assert_eq!(chapter, 12);
                assert_eq!(description, "The ferry sinks");
                assert_eq!(kind.as_deref(), Some("midpoint"));
            }
            _ => panic!("expected plot-point"),
        }
    }

    #[test]
    fn test_parse_book_requires_series() {
        let result =
            Cli::try_parse_from(["storykeeper", "context", "Salt Roads", "4", "--book", "2"]);
        assert!(result.is_err());

        let cli = Cli::try_parse_from([
            "storykeeper",
            "context",
            "Salt Roads",
            "4",
            "--series",
            "harbor_series.json",
            "--book",
            "2",
        ])
        .unwrap();
        match cli.command {
            Commands::Context { series, book, .. } => {
                assert_eq!(series, Some(PathBuf::from("harbor_series.json")));
                assert_eq!(book, Some(2));
            }
            _ => panic!("expected context"),
        }
    }

    #[test]
    fn test_parse_chapter_must_be_number() {
        let result =
            Cli::try_parse_from(["storykeeper", "update", "Salt Roads", "three", "u.json"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_missing_subcommand() {
        let result = Cli::try_parse_from(["storykeeper"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }
}
