use clap::Parser;
use std::path::PathBuf;

/// Define CLI arguments
#[derive(Parser, Debug)]
#[command(
    name = "ghost",
    version,
    about = "Local cache-first front for the Ghost single-page document",
    long_about = "Serves the Ghost document from a local cache.\n\
                  \n\
                  On startup the asset list is fetched from the origin and stored in the\n\
                  bucket named by the generation tag; buckets from other generations are\n\
                  removed. Every request is then answered from the cache when possible\n\
                  and forwarded to the origin otherwise."
)]
pub struct CliArgs {
    /// Path to a TOML configuration file
    #[arg(short, long, help = "TOML configuration file; flags override its values")]
    pub config: Option<PathBuf>,

    /// Address to listen on
    #[arg(short, long, help = "Address to listen on, e.g. 127.0.0.1:8091")]
    pub listen: Option<String>,

    /// Origin the document is served from
    #[arg(short, long, help = "Origin URL the assets resolve against")]
    pub origin: Option<String>,

    /// Cache generation tag
    #[arg(short, long, help = "Name of the cache bucket this version installs into")]
    pub generation: Option<String>,

    /// Asset paths to pre-load (repeatable)
    #[arg(
        short,
        long = "asset",
        help = "Asset path to pre-load; repeat for several. Replaces the configured list"
    )]
    pub assets: Vec<String>,

    /// Directory for the persistent cache
    #[arg(long, help = "Directory for the persistent cache", conflicts_with = "memory")]
    pub cache_dir: Option<PathBuf>,

    /// Keep the cache in memory only
    #[arg(long, help = "Keep the cache in memory; nothing survives a restart")]
    pub memory: bool,

    /// Request timeout in seconds
    #[arg(long, help = "Timeout for requests to the origin, in seconds (0 disables)")]
    pub timeout: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long, help = "Enable detailed debug logging")]
    pub verbose: bool,
}
