//! CLI argument definitions

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "jbolt",
    about = "Compute a hot-method layout order from recorded stack samples",
    after_help = "\
EXAMPLES:
    jbolt --input samples.jsonl --order-file order.txt
    jbolt -i samples.jsonl -o order.txt --density-sort --merge-frozen"
)]
pub struct Args {
    /// Recorded samples, one JSON trace per line
    #[arg(short, long, value_name = "FILE")]
    pub input: PathBuf,

    /// Order file to write
    #[arg(short, long, value_name = "FILE")]
    pub order_file: PathBuf,

    /// Sort final clusters by density instead of total heat
    #[arg(long)]
    pub density_sort: bool,

    /// Stop merging clusters that grew past the page size
    #[arg(long)]
    pub merge_frozen: bool,

    /// Page-size threshold in bytes (default: host page size)
    #[arg(long, value_name = "BYTES")]
    pub page_size: Option<usize>,

    /// Suppress the summary line
    #[arg(short, long)]
    pub quiet: bool,
}
