use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use defpatch::config::{self, parse_depth_override};
use defpatch::patch::{self, DepthBound};
use defpatch::session::{self, FileReport, FileStatus, RunOptions, RunReport};
use defpatch::output;
use similar::{ChangeTag, TextDiff};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "defpatch")]
#[command(
    about = "Applies XML patch operations to base data files and writes partial copies",
    long_about = None
)]
#[command(version)]
struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply a mod's patches and write partial copies into the mod
    Apply {
        /// Base-data directory holding the original files
        #[arg(short, long)]
        base: PathBuf,

        /// Mod directory (must contain About/About.xml)
        #[arg(short, long = "mod")]
        mod_dir: PathBuf,

        /// Run config (defaults to <mod>/defpatch.toml when present)
        #[arg(short, long = "config")]
        config_path: Option<PathBuf>,

        /// Output subdirectory inside the mod
        #[arg(long)]
        prefix: Option<PathBuf>,

        /// Per-file depth override, e.g. Races_Humanlike.xml=3
        #[arg(long = "depth", value_name = "FILE=N", value_parser = parse_depth_override)]
        depths: Vec<(String, usize)>,

        /// Depth table to use from [depth.mod_types]
        #[arg(long)]
        mod_type: Option<String>,

        /// Strip comments from the output
        #[arg(long)]
        remove_comments: bool,

        /// Also write the merged patch database to this file
        #[arg(long)]
        dump: Option<PathBuf>,

        /// Dry run - show what would be written without touching the mod
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff between the base file and its partial copy
        #[arg(short, long)]
        diff: bool,
    },

    /// List patch targets and their operation counts
    List {
        /// Mod directory
        #[arg(short, long = "mod")]
        mod_dir: PathBuf,
    },

    /// Write the merged patch database as one XML file
    Dump {
        /// Mod directory
        #[arg(short, long = "mod")]
        mod_dir: PathBuf,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // -v wins over RUST_LOG
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Apply {
            base,
            mod_dir,
            config_path,
            prefix,
            depths,
            mod_type,
            remove_comments,
            dump,
            dry_run,
            diff,
        } => {
            let run_config = config::load_for_mod(&mod_dir, config_path.as_deref())?;
            if let Some(name) = &mod_type {
                if !run_config.depth.mod_types.contains_key(name) {
                    eprintln!(
                        "{}",
                        format!("Warning: no [depth.mod_types.{name}] table in run config").yellow()
                    );
                }
            }
            let mut options =
                RunOptions::from_config(base, mod_dir, &run_config, mod_type.as_deref());
            if prefix.is_some() {
                options.output_prefix = prefix;
            }
            for (file, depth) in &depths {
                options.depths.set_override(file, *depth);
            }
            if dump.is_some() {
                options.dump = dump;
            }
            options.remove_comments |= remove_comments;
            options.dry_run = dry_run;
            options.keep_base = diff;
            cmd_apply(&options, diff)
        }

        Commands::List { mod_dir } => cmd_list(&mod_dir),

        Commands::Dump { mod_dir, output } => cmd_dump(&mod_dir, &output),
    }
}

fn display_diff(file: &str, original: &str, modified: &str) {
    println!("\n{}", format!("--- {} (base)", file).dimmed());
    println!("{}", format!("+++ {} (partial)", file).dimmed());

    let diff = TextDiff::from_lines(original, modified);

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => format!("-{}", change).red(),
            ChangeTag::Insert => format!("+{}", change).green(),
            ChangeTag::Equal => format!(" {}", change).normal(),
        };
        print!("{}", sign);
    }
}

fn cmd_apply(options: &RunOptions, show_diff: bool) -> Result<()> {
    println!("Base: {}", options.base_dir.display());
    println!("Mod: {}", options.mod_dir.display());
    if options.dry_run {
        println!("{}", "[DRY RUN - nothing will be written]".cyan());
    }
    println!();

    let report = session::run(options)?;

    for file in &report.files {
        print_file(file);
        if show_diff {
            if let (Some(before), Some(after)) = (&file.base_rendered, &file.rendered) {
                display_diff(&file.file, before, after);
            }
        }
    }

    if let Some(path) = &report.dump {
        let verb = if options.dry_run { "Would dump" } else { "Dumped" };
        println!("{} patch database to {}", verb, path.display());
    }

    println!();
    print_summary(&report);

    if report.has_failures() {
        std::process::exit(1);
    }

    Ok(())
}

fn print_file(file: &FileReport) {
    let bound = file.bound.map(|bound| match bound {
        DepthBound::Unbounded => "whole file".to_string(),
        DepthBound::Limited(depth) => format!("depth {depth}"),
    });
    let detail = format!(
        "{} ops, {} changed, {} pruned{}",
        file.operations,
        file.changed,
        file.prune.removed,
        bound.map(|bound| format!(", {bound}")).unwrap_or_default()
    );

    match &file.status {
        FileStatus::Written { .. } | FileStatus::Rendered => {
            println!("{} {}: {} ({})", "✓".green(), file.file, file.status, detail);
        }
        FileStatus::Unchanged => {
            println!("{} {}: {} ({})", "⊙".yellow(), file.file, file.status, detail);
        }
        FileStatus::Skipped => {
            println!("{} {}: {}", "⊘".cyan(), file.file, file.status);
        }
        FileStatus::Failed(error) => {
            eprintln!("{} {}: Failed - {}", "✗".red(), file.file, error);
        }
    }

    if let Some(output) = &file.output {
        println!("  {}", format!("-> {}", output.display()).dimmed());
    }
    for diagnostic in &file.diagnostics {
        println!("  {} {}", "warning:".yellow(), diagnostic);
    }
}

fn print_summary(report: &RunReport) {
    let count = |pred: fn(&FileStatus) -> bool| {
        report.files.iter().filter(|file| pred(&file.status)).count()
    };
    let written = count(|status| matches!(status, FileStatus::Written { .. } | FileStatus::Rendered));
    let unchanged = count(|status| matches!(status, FileStatus::Unchanged));
    let skipped = count(|status| matches!(status, FileStatus::Skipped));
    let warnings: usize = report.files.iter().map(|file| file.diagnostics.len()).sum();

    println!("{}", "Summary:".bold());
    println!("  {} operations", report.operations);
    println!("  {} written", format!("{}", written).green());
    println!("  {} unchanged", format!("{}", unchanged).yellow());
    println!("  {} skipped", format!("{}", skipped).cyan());
    println!("  {} warnings", format!("{}", warnings).yellow());
    println!("  {} failed", format!("{}", report.failed()).red());
}

fn cmd_list(mod_dir: &Path) -> Result<()> {
    let database = patch::load_mod(mod_dir)?;

    if database.is_empty() {
        println!("{}", "No patches found".yellow());
        return Ok(());
    }

    for target in database.targets() {
        println!("{}", target.file.bold());
        println!("  {} operations", target.operations.len());
        for operation in &target.operations {
            let class = if operation.is_supported() {
                operation.class().normal()
            } else {
                operation.class().red()
            };
            println!("    {} {}", class, operation.xpath().dimmed());
        }
    }

    println!();
    println!(
        "{} targets, {} operations",
        database.targets().len(),
        database.operation_count()
    );
    Ok(())
}

fn cmd_dump(mod_dir: &Path, path: &Path) -> Result<()> {
    let database = patch::load_mod(mod_dir)?;
    let xml = patch::dump_to_string(&database).context("failed to serialize patch database")?;
    output::atomic_write(path, xml.as_bytes())
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!(
        "{} Wrote {} entries to {}",
        "✓".green(),
        database.entries.len(),
        path.display()
    );
    Ok(())
}
