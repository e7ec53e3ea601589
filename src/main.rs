use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use elgold::config::{Config, DEFAULT_CONFIG_FILE};
use elgold::corpus::{Corpus, Line};
use elgold::curation::{self, CharAudit, CharReplacer, SearchQuery};
use elgold::error::{CorpusError, CorpusResult};
use elgold::export::{self, Format};
use elgold::knowledge::{KnowledgeBase, Snapshot, Wikipedia};
use elgold::markup::{render_entity, Token};
use elgold::output::ensure_new_file;
use elgold::reconcile::{self, Action, AutoApprove, PromptDecider, ReconcilePolicy};

/// elgold - Maintenance tools for an entity-linked text corpus
#[derive(Parser)]
#[command(name = "elgold")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Quiet mode - suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show lines containing entities of the given classes or targets
    Search {
        /// Dataset directory (default from config)
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Entity classes to search for (can be repeated)
        #[arg(long = "class")]
        classes: Vec<String>,

        /// Target substrings to search for (can be repeated)
        #[arg(long = "target")]
        targets: Vec<String>,
    },

    /// Copy the dataset, replacing entities of excluded classes with their mention text
    Filter {
        /// Dataset directory (default from config)
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Entity classes to drop (can be repeated)
        #[arg(long)]
        exclude: Vec<String>,

        /// Output directory, must be new or empty
        #[arg(default_value = "out")]
        target: PathBuf,
    },

    /// Show lines with the given non-ASCII characters and count all non-ASCII characters
    SearchChars {
        /// Dataset directory (default from config)
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Also scan entity classes and targets
        #[arg(long)]
        include_targets: bool,

        /// Characters to search for
        chars: String,
    },

    /// Copy the dataset with characters replaced one to one and/or deleted
    ReplaceChars {
        /// Dataset directory (default from config)
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Also rewrite entity classes and targets
        #[arg(long)]
        include_targets: bool,

        /// Characters to delete
        #[arg(long, default_value = "")]
        delete: String,

        /// Decode \uXXXX style escapes in the character lists
        #[arg(long)]
        unicode_escape: bool,

        /// Characters to replace
        search: String,

        /// Replacement for each searched character, in order
        replace: String,

        /// Output directory, must be new or empty
        #[arg(default_value = "out")]
        target: PathBuf,
    },

    /// Check entity targets against the knowledge base and write a corrected copy
    FixTargets {
        /// Dataset directory (default from config)
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Offline knowledge-base snapshot (JSON) instead of the Wikipedia API
        #[arg(long)]
        kb: Option<PathBuf>,

        /// Remove links to pages that do not exist
        #[arg(long)]
        remove_non_existent: bool,

        /// Replace targets with their normalized titles
        #[arg(long)]
        normalize: bool,

        /// Replace redirect targets with their destinations
        #[arg(long)]
        redirect: bool,

        /// Ask before every correction
        #[arg(short, long)]
        interactive: bool,

        /// Write the action log as JSON lines
        #[arg(long)]
        log: Option<PathBuf>,

        /// Output directory, must be new or empty
        #[arg(default_value = "out")]
        target: PathBuf,
    },

    /// List entities of the given classes, one per line
    ListEntities {
        /// Dataset directory (default from config)
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Entity classes to list (can be repeated)
        #[arg(long = "class")]
        classes: Vec<String>,
    },

    /// Export plain text with character-offset entity spans (JSON)
    ExportSpans {
        /// Dataset directory (default from config)
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Write a directory with one file per primary category plus 0.json
        #[arg(long)]
        split: bool,

        /// Output file, or directory with --split
        target: PathBuf,
    },

    /// Export linked mentions with their contexts (JSON lines)
    ExportLinking {
        /// Dataset directory (default from config)
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Offline knowledge-base snapshot (JSON) instead of the Wikipedia API
        #[arg(long)]
        kb: Option<PathBuf>,

        /// Write a directory with one file per primary category plus 0.jsonl
        #[arg(long)]
        split: bool,

        /// Output file, or directory with --split
        target: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("{}: {}", "error".red().bold(), e);
        std::process::exit(e.exit_code());
    }
}

/// Logs go to stderr, filtered by `RUST_LOG`; `--verbose` adds debug output.
fn init_logging(verbose: bool) {
    let has_rust_log = std::env::var("RUST_LOG").is_ok();
    if !verbose && !has_rust_log {
        return;
    }
    let mut filter = EnvFilter::from_default_env();
    if verbose {
        if let Ok(directive) = "elgold=debug".parse() {
            filter = filter.add_directive(directive);
        }
    }
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn run(cli: Cli) -> CorpusResult<()> {
    let config = Config::load(&cli.config)?;
    let quiet = cli.quiet;
    let data_dir = |data: Option<PathBuf>| data.unwrap_or_else(|| config.data.clone());

    match cli.command {
        Commands::Search { data, classes, targets } => {
            cmd_search(&data_dir(data), SearchQuery { classes, targets })
        }
        Commands::Filter { data, exclude, target } => {
            cmd_filter(&data_dir(data), &exclude, &target, quiet)
        }
        Commands::SearchChars { data, include_targets, chars } => {
            cmd_search_chars(&data_dir(data), &chars, include_targets)
        }
        Commands::ReplaceChars { data, include_targets, delete, unicode_escape, search, replace, target } => {
            cmd_replace_chars(
                &data_dir(data),
                &search,
                &replace,
                &delete,
                unicode_escape,
                include_targets,
                &target,
                quiet,
            )
        }
        Commands::FixTargets { data, kb, remove_non_existent, normalize, redirect, interactive, log, target } => {
            let policy = ReconcilePolicy {
                remove_non_existent,
                normalize,
                apply_redirects: redirect,
            };
            let kb = open_kb(kb.as_deref(), &config)?;
            cmd_fix_targets(
                &data_dir(data),
                &*kb,
                policy,
                interactive,
                log.as_deref(),
                &target,
                quiet,
            )
        }
        Commands::ListEntities { data, classes } => {
            cmd_list_entities(&data_dir(data), &classes)
        }
        Commands::ExportSpans { data, split, target } => {
            cmd_export_spans(&data_dir(data), split, &target, quiet)
        }
        Commands::ExportLinking { data, kb, split, target } => {
            let kb = open_kb(kb.as_deref(), &config)?;
            cmd_export_linking(&data_dir(data), &*kb, split, &target, quiet)
        }
    }
}

/// Snapshot file when given, the configured Wikipedia API otherwise.
fn open_kb(snapshot: Option<&Path>, config: &Config) -> CorpusResult<Box<dyn KnowledgeBase>> {
    match snapshot {
        Some(path) => {
            debug!("using knowledge-base snapshot {}", path.display());
            Ok(Box::new(Snapshot::load(path)?))
        }
        None => {
            debug!("using {}", config.wikipedia.api_url());
            Ok(Box::new(Wikipedia::new(&config.wikipedia)?))
        }
    }
}

fn load_corpus(data: &Path) -> CorpusResult<Corpus> {
    if !data.is_dir() {
        return Err(CorpusError::invalid(format!(
            "dataset directory not found: {}",
            data.display()
        )));
    }
    Corpus::load(data)
}

fn location(file: &str, line: &Line) -> String {
    format!("{}:{}:", file.magenta(), line.number.to_string().blue())
}

fn cmd_search(data: &Path, query: SearchQuery) -> CorpusResult<()> {
    let corpus = load_corpus(data)?;

    for hit in curation::search(&corpus, &query) {
        let mut output = location(&hit.document.file_name, hit.line);
        for token in &hit.line.tokens {
            match token {
                Token::Text(text) => output.push_str(text),
                Token::Entity(entity) => {
                    // Only the first matching substring is highlighted
                    let target = match query.target_match(entity) {
                        Some(range) => format!(
                            "{}{}{}",
                            &entity.target[..range.start],
                            entity.target[range.clone()].red(),
                            &entity.target[range.end..]
                        ),
                        None => entity.target.clone(),
                    };
                    let markup = render_entity(&entity.mention, &entity.class, &target);
                    if query.selects_class(entity) {
                        output.push_str(&markup.bold().to_string());
                    } else {
                        output.push_str(&markup);
                    }
                }
            }
        }
        println!("{}", output);
    }

    Ok(())
}

fn cmd_filter(data: &Path, exclude: &[String], target: &Path, quiet: bool) -> CorpusResult<()> {
    let corpus = load_corpus(data)?;
    curation::filter_into(&corpus, exclude, target)?;

    if !quiet {
        println!("{} {} documents to {}",
            "Filtered".green().bold(),
            corpus.len(),
            target.display().to_string().cyan()
        );
    }
    Ok(())
}

fn cmd_search_chars(data: &Path, chars: &str, include_targets: bool) -> CorpusResult<()> {
    let corpus = load_corpus(data)?;
    let mut audit = CharAudit::new(chars, include_targets);
    let hits = audit.scan(&corpus);

    let highlight = |text: &str| -> String {
        text.chars()
            .map(|c| {
                if c.is_ascii() {
                    c.to_string()
                } else if audit.is_wanted(c) {
                    c.to_string().red().bold().to_string()
                } else {
                    c.to_string().bold().to_string()
                }
            })
            .collect()
    };

    for hit in &hits {
        let mut output = location(&hit.document.file_name, hit.line);
        for token in &hit.line.tokens {
            match token {
                Token::Text(text) => output.push_str(&highlight(text)),
                Token::Entity(entity) if audit.include_targets() => output.push_str(&render_entity(
                    &highlight(&entity.mention),
                    &highlight(&entity.class),
                    &highlight(&entity.target),
                )),
                Token::Entity(entity) => output.push_str(&render_entity(
                    &highlight(&entity.mention),
                    &entity.class,
                    &entity.target,
                )),
            }
        }
        println!("{}", output);
    }

    println!("\n{}", "Non-ASCII chars in dataset:".bold());
    for (c, count) in audit.frequencies() {
        println!("  '{}' U+{:04X}: {}", c, c as u32, count);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_replace_chars(
    data: &Path,
    search: &str,
    replace: &str,
    delete: &str,
    unicode_escape: bool,
    include_targets: bool,
    target: &Path,
    quiet: bool,
) -> CorpusResult<()> {
    let (search, replace, delete) = if unicode_escape {
        (
            curation::decode_unicode_escapes(search)?,
            curation::decode_unicode_escapes(replace)?,
            curation::decode_unicode_escapes(delete)?,
        )
    } else {
        (search.to_string(), replace.to_string(), delete.to_string())
    };
    let mut replacer = CharReplacer::new(&search, &replace, &delete, include_targets)?;

    let corpus = load_corpus(data)?;
    replacer.rewrite_into(&corpus, target)?;

    if quiet {
        return Ok(());
    }
    println!("{}", "Replaced:".bold());
    for (from, to, count) in replacer.replacements() {
        println!("  \"{}\" -> \"{}\": {}", from, to, count);
    }
    println!("{}", "Deleted:".bold());
    for (c, count) in replacer.deletions() {
        println!("  \"{}\": {}", c, count);
    }
    Ok(())
}

fn cmd_fix_targets(
    data: &Path,
    kb: &dyn KnowledgeBase,
    policy: ReconcilePolicy,
    interactive: bool,
    log: Option<&Path>,
    target: &Path,
    quiet: bool,
) -> CorpusResult<()> {
    if !policy.any() && !quiet {
        eprintln!("{}: no correction enabled, the copy will match the source",
            "warning".yellow().bold()
        );
    }
    if let Some(log) = log {
        ensure_new_file(log)?;
    }

    let corpus = load_corpus(data)?;
    let result = if interactive {
        let mut decider = PromptDecider::stdio();
        reconcile::reconcile_into(&corpus, kb, policy, &mut decider, target)?
    } else {
        reconcile::reconcile_into(&corpus, kb, policy, &mut AutoApprove, target)?
    };

    if let Some(log) = log {
        Format::JsonLines.write(log, &result.log)?;
    }

    if quiet {
        return Ok(());
    }
    for entry in &result.log {
        let action = match entry.action {
            Action::Removed => entry.action.to_string().red(),
            Action::Declined => entry.action.to_string().dimmed(),
            _ => entry.action.to_string().green(),
        };
        println!("{}:{}: {} \"{}\" -> \"{}\"",
            entry.file.magenta(),
            entry.line.to_string().blue(),
            action,
            entry.before,
            entry.after
        );
    }
    println!("\n{} changes in {} documents written to {}",
        result.changes().to_string().green().bold(),
        result.documents.len(),
        target.display().to_string().cyan()
    );
    Ok(())
}

fn cmd_list_entities(data: &Path, classes: &[String]) -> CorpusResult<()> {
    let corpus = load_corpus(data)?;
    for listing in curation::list_entities(&corpus, classes) {
        println!("{}{}", location(&listing.document.file_name, listing.line), listing.entity.raw);
    }
    Ok(())
}

fn cmd_export_spans(data: &Path, split: bool, target: &Path, quiet: bool) -> CorpusResult<()> {
    let corpus = load_corpus(data)?;
    let groups = export::export_spans(&corpus, target, split)?;

    if !quiet {
        println!("{} {} documents to {}",
            "Exported".green().bold(),
            groups.len(),
            target.display().to_string().cyan()
        );
    }
    Ok(())
}

fn cmd_export_linking(
    data: &Path,
    kb: &dyn KnowledgeBase,
    split: bool,
    target: &Path,
    quiet: bool,
) -> CorpusResult<()> {
    let corpus = load_corpus(data)?;
    let groups = export::export_linking(&corpus, kb, target, split)?;

    if !quiet {
        println!("{} {} linked mentions to {}",
            "Exported".green().bold(),
            groups.len(),
            target.display().to_string().cyan()
        );
        for (category, records) in groups.categories() {
            println!("  {} {}", category.to_string().cyan(), records.len());
        }
    }
    Ok(())
}
