//! blockjournal CLI
//!
//! Offline inspection and validation of journal files.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{fmt, EnvFilter};

use blockjournal::{Journal, RecordHandle};

/// blockjournal inspection tool
#[derive(Parser, Debug)]
#[command(name = "blockjournal-cli")]
#[command(about = "Inspect and validate blockjournal files")]
#[command(version)]
struct Args {
    /// Journal file to inspect
    #[arg(short, long)]
    file: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print parameters and usage statistics
    Stat,

    /// Check structural integrity
    Validate {
        /// Also read every record, verifying chains and checksums
        #[arg(long)]
        deep: bool,
    },

    /// List record handles
    List {
        /// Which record list to walk
        #[arg(value_enum, default_value = "all")]
        which: WhichList,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum WhichList {
    Confirmed,
    Unconfirmed,
    All,
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,blockjournal=info"));
    fmt().with_env_filter(filter).with_target(true).init();

    let args = Args::parse();

    let mut journal = match Journal::open_existing(&args.file) {
        Ok(journal) => journal,
        Err(e) => {
            eprintln!("failed to open {}: {}", args.file.display(), e);
            process::exit(1);
        }
    };

    match args.command {
        Commands::Stat => stat(&journal),
        Commands::Validate { deep } => validate(&mut journal, deep),
        Commands::List { which } => list(&journal, which),
    }
}

fn stat(journal: &Journal) {
    let p = journal.parameters();
    println!("journal:              {}", journal.path().display());
    println!("block size:           {} bytes", p.block_size);
    println!("blocks per page:      {}", p.blocks_per_page);
    println!("pages per set:        {}", p.pages_per_set);
    println!("free block threshold: {}%", p.free_block_threshold);
    println!("paranoid:             {}", p.paranoid);
    println!();
    println!("pages:                {}", journal.page_count());
    println!("blocks:               {}", journal.block_count());
    println!("available blocks:     {}", journal.num_available_blocks());
    println!("released blocks:      {}", journal.num_released_blocks());
    println!("confirmed records:    {}", journal.num_confirmed_records());
    println!("unconfirmed records:  {}", journal.num_unconfirmed_records());
}

fn validate(journal: &mut Journal, deep: bool) {
    if let Err(e) = journal.validate() {
        eprintln!("structural check failed: {}", e);
        process::exit(1);
    }
    println!("structure: ok");

    if deep {
        let handles: Vec<RecordHandle> = journal
            .iter_confirmed()
            .chain(journal.iter_unconfirmed())
            .collect();
        let mut bad = 0u64;
        for handle in handles {
            if let Err(e) = journal.read(handle) {
                eprintln!("record {}: {}", handle, e);
                bad += 1;
            }
        }
        if bad > 0 {
            eprintln!("{} records failed verification", bad);
            process::exit(1);
        }
        println!("records:   ok");
    }
}

fn list(journal: &Journal, which: WhichList) {
    if matches!(which, WhichList::Confirmed | WhichList::All) {
        for handle in journal.iter_confirmed() {
            println!("confirmed   {}", handle);
        }
    }
    if matches!(which, WhichList::Unconfirmed | WhichList::All) {
        for handle in journal.iter_unconfirmed() {
            println!("unconfirmed {}", handle);
        }
    }
}
