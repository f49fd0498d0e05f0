use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser, Debug)]
#[command(name = "simshard")]
#[command(about = "simshard CLI - on-disk IVF index tools")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Train and save an empty base index
    BaseIndex {
        /// Output .index path
        #[arg(short, long)]
        output: PathBuf,

        /// Training vectors, raw little-endian f32
        #[arg(short, long)]
        training: PathBuf,

        /// Embedding dimension
        #[arg(short, long, default_value = "512")]
        dim: usize,

        /// Number of coarse centroids
        #[arg(short, long)]
        centroids: usize,

        /// Index type (only IVF is supported)
        #[arg(long, default_value = "IVF")]
        idx_type: String,

        /// Compression (only Flat is supported)
        #[arg(long, default_value = "Flat")]
        compression: String,
    },

    /// Build a sub-index from vectors and ids
    Subindex {
        /// Empty trained base .index
        #[arg(short, long)]
        base: PathBuf,

        /// Output sub-index path
        #[arg(short, long)]
        output: PathBuf,

        /// Vectors, raw little-endian f32
        #[arg(short, long)]
        vectors: PathBuf,

        /// Ids, one integer per line
        #[arg(short, long)]
        ids: PathBuf,
    },

    /// Merge sub-indexes into one on-disk shard pair
    Merge {
        /// Output .index path
        #[arg(short, long)]
        out_index: PathBuf,

        /// Output .ivfdata path (defaults to out_index with .ivfdata)
        #[arg(long)]
        out_ivfdata: Option<PathBuf>,

        /// Sub-indexes to merge
        #[arg(required = true)]
        sources: Vec<PathBuf>,
    },

    /// Date-grouped merge of every sub-index in a directory
    Zip {
        /// Directory of freshly built sub-indexes
        #[arg(short, long)]
        from: PathBuf,

        /// Serving directory of date shards
        #[arg(short, long)]
        to: PathBuf,

        /// Editable filename component ({date}_{tag}.index)
        #[arg(long, default_value = "")]
        tag: String,

        /// Also pick up nested sub-indexes
        #[arg(short, long)]
        recursive: bool,

        /// Create the target directory if missing
        #[arg(long)]
        mkdir: bool,

        /// Delete the source sub-indexes after merging
        #[arg(long)]
        delete_sources: bool,
    },

    /// Move a shard pair into another directory
    Mv {
        /// The .index file to move
        #[arg(short, long)]
        index: PathBuf,

        /// Its .ivfdata file (defaults to index with .ivfdata)
        #[arg(long)]
        ivfdata: Option<PathBuf>,

        /// Target directory
        #[arg(short, long)]
        to_dir: PathBuf,

        /// Create the target directory if missing
        #[arg(long)]
        mkdir: bool,

        /// Copy instead of move
        #[arg(long)]
        only_cp: bool,
    },

    /// Count indexed vectors in a directory, optionally by date window
    Count {
        /// Directory of .index files
        #[arg(short, long)]
        dir: PathBuf,

        /// Count shards dated on or after this day
        #[arg(long, default_value = "0000-00-00")]
        start: String,

        /// Count shards dated on or before this day
        #[arg(long, default_value = "9999-99-99")]
        end: String,

        /// Also check nested directories
        #[arg(short, long)]
        recursive: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::BaseIndex {
            output,
            training,
            dim,
            centroids,
            idx_type,
            compression,
        } => commands::base_index::run(&output, &training, dim, centroids, &idx_type, &compression),
        Commands::Subindex {
            base,
            output,
            vectors,
            ids,
        } => commands::subindex::run(&base, &output, &vectors, &ids),
        Commands::Merge {
            out_index,
            out_ivfdata,
            sources,
        } => commands::merge::run(&out_index, out_ivfdata.as_deref(), &sources),
        Commands::Zip {
            from,
            to,
            tag,
            recursive,
            mkdir,
            delete_sources,
        } => commands::zip::run(&from, &to, tag, recursive, mkdir, delete_sources),
        Commands::Mv {
            index,
            ivfdata,
            to_dir,
            mkdir,
            only_cp,
        } => commands::mv::run(&index, ivfdata.as_deref(), &to_dir, mkdir, only_cp),
        Commands::Count {
            dir,
            start,
            end,
            recursive,
        } => commands::count::run(&dir, &start, &end, recursive),
    }
}
