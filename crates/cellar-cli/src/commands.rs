use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use cellar_data::print::print_ref;
use cellar_data::{
    find_missing, ref_tree_stats, unique_ref_count, Cell, Decoder, Hash, Ref, RefStatus,
};
use cellar_store::{CellStore, DirStore};
use colored::Colorize;
use serde_json::json;
use tracing::debug;

use crate::cli::*;
use crate::config::CellarConfig;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = CellarConfig::load(cli.config.as_deref())?;
    config.data.apply();
    let ctx = Session { config, format: cli.format };
    match cli.command {
        Command::Decode(args) => ctx.cmd_decode(args),
        Command::Hash(args) => ctx.cmd_hash(args),
        Command::Import(args) => ctx.cmd_import(args),
        Command::Show(args) => ctx.cmd_show(args),
        Command::Stats(args) => ctx.cmd_stats(args),
    }
}

struct Session {
    config: CellarConfig,
    format: OutputFormat,
}

impl Session {
    fn json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    fn open_store(&self, args: &StoreArgs, read_only: bool) -> anyhow::Result<Arc<dyn CellStore>> {
        let mut config = self.config.store.clone();
        if let Some(root) = &args.store {
            config.root = root.clone();
        }
        config.read_only |= read_only;
        let root: PathBuf = config.root.clone();
        let store = DirStore::open(config)
            .with_context(|| format!("opening store at {}", root.display()))?;
        Ok(Arc::new(store))
    }

    fn cmd_decode(&self, args: DecodeArgs) -> anyhow::Result<()> {
        let cell = Decoder::new().decode(parse_hex(&args.encoding)?.into())?;
        if args.validate {
            cell.validate().context("validation failed")?;
        }
        let printed = print_ref(&cell.to_ref(), self.config.data.print_limit);
        if self.json() {
            let report = json!({
                "tag": cell.tag().name(),
                "hash": cell.hash().to_hex(),
                "length": cell.encoding_length(),
                "canonical": cell.is_canonical(),
                "embedded": cell.is_embedded(),
                "refs": cell.ref_count(),
                "printed": printed.text,
                "complete": printed.complete,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
            return Ok(());
        }
        println!("{} {}", "Tag:".bold(), cell.tag().name().cyan());
        println!("  Hash:      {}", cell.hash().to_hex().yellow());
        println!("  Length:    {} bytes", cell.encoding_length());
        println!("  Canonical: {}", yes_no(cell.is_canonical()));
        println!("  Embedded:  {}", yes_no(cell.is_embedded()));
        println!("  Refs:      {}", cell.ref_count());
        println!("  Value:     {}", printed.text);
        if args.validate {
            println!("{} Valid", "✓".green().bold());
        }
        Ok(())
    }

    fn cmd_hash(&self, args: HashArgs) -> anyhow::Result<()> {
        let cell = Decoder::new().decode(parse_hex(&args.encoding)?.into())?;
        if self.json() {
            println!("{}", json!({ "hash": cell.hash().to_hex() }));
        } else {
            println!("{}", cell.hash());
        }
        Ok(())
    }

    fn cmd_import(&self, args: ImportArgs) -> anyhow::Result<()> {
        let store = self.open_store(&args.store, false)?;
        let cell = Decoder::with_store(Arc::clone(&store)).decode(parse_hex(&args.encoding)?.into())?;
        let root = cell.to_ref();
        let status = if args.announce {
            root.announce(store.as_ref())
        } else {
            root.persist(store.as_ref())
        }
        .with_context(|| format!("persisting {}", root.hash().short_hex()))?;
        debug!(hash = %root.hash().short_hex(), %status, "imported cell");
        if self.json() {
            println!("{}", json!({ "hash": root.hash().to_hex(), "status": status.to_string() }));
        } else {
            println!("{} Imported {} ({})", "✓".green().bold(), root.hash().to_hex().yellow(), status_label(status));
        }
        Ok(())
    }

    fn cmd_show(&self, args: ShowArgs) -> anyhow::Result<()> {
        let store = self.open_store(&args.store, true)?;
        let root = Ref::for_hash_in(parse_hash(&args.hash)?, store);
        let cell: Cell = root
            .value()
            .with_context(|| format!("loading {}", root.hash().short_hex()))?;
        let printed = print_ref(&root, args.limit.unwrap_or(self.config.data.print_limit));
        if self.json() {
            let report = json!({
                "hash": root.hash().to_hex(),
                "tag": cell.tag().name(),
                "status": root.status().to_string(),
                "printed": printed.text,
                "complete": printed.complete,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            println!("{} {} [{}]", cell.tag().name().cyan(), root.hash().short_hex().yellow(), status_label(root.status()));
            println!("{}", printed.text);
        }
        Ok(())
    }

    fn cmd_stats(&self, args: StatsArgs) -> anyhow::Result<()> {
        let store = self.open_store(&args.store, true)?;
        let root = Ref::for_hash_in(parse_hash(&args.hash)?, store);
        let missing = find_missing(&root, args.missing_limit)?;
        let counts = if missing.is_empty() {
            Some((ref_tree_stats(&root)?, unique_ref_count(&root)?))
        } else {
            None
        };
        if self.json() {
            let report = json!({
                "hash": root.hash().to_hex(),
                "stats": counts.map(|(s, _)| s),
                "unique": counts.map(|(_, u)| u),
                "missing": missing.iter().map(Hash::to_hex).collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
            return Ok(());
        }
        println!("Ref tree {}", root.hash().to_hex().yellow().bold());
        if let Some((stats, unique)) = counts {
            println!("  Total refs:     {}", stats.total.to_string().bold());
            println!("  Unique refs:    {}", unique.to_string().bold());
            println!("  Embedded refs:  {}", stats.embedded);
            println!("  Persisted refs: {}", stats.persisted);
            println!("{} Complete", "✓".green().bold());
        } else {
            println!("{} {} missing cell(s):", "✗".red().bold(), missing.len());
            for hash in &missing {
                println!("  {}", hash.to_hex().red());
            }
        }
        Ok(())
    }
}

fn parse_hex(input: &str) -> anyhow::Result<Vec<u8>> {
    let trimmed = input.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if digits.is_empty() {
        bail!("empty encoding");
    }
    hex::decode(digits).with_context(|| format!("invalid hex: {input}"))
}

fn parse_hash(input: &str) -> anyhow::Result<Hash> {
    Hash::from_hex(input).with_context(|| format!("invalid hash: {input}"))
}

fn yes_no(flag: bool) -> colored::ColoredString {
    if flag { "yes".green() } else { "no".red() }
}

fn status_label(status: RefStatus) -> colored::ColoredString {
    match status {
        RefStatus::Unknown => status.to_string().dimmed(),
        RefStatus::Stored => status.to_string().yellow(),
        RefStatus::Persisted | RefStatus::Announced => status.to_string().green(),
    }
}
