use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "strata", version, about = "Browse and transfer objects across cloud object stores")]
pub struct Cli {
    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Use an alternate settings file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage saved accounts
    #[command(subcommand)]
    Accounts(AccountsCommand),
    /// List the buckets of an account
    Buckets { account: String },
    /// List one page of a bucket
    Ls(LsArgs),
    /// Upload local files and directories beneath a prefix
    Upload {
        account: String,
        bucket: String,
        prefix: String,
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Download blobs and directories (keys ending in '/')
    Download {
        account: String,
        bucket: String,
        #[arg(required = true)]
        keys: Vec<String>,
        /// Destination directory; defaults to the configured download
        /// directory, then the working directory
        #[arg(long)]
        dest: Option<PathBuf>,
    },
    /// Delete blobs; prefixes ending in '/' delete everything beneath them
    Rm {
        account: String,
        bucket: String,
        #[arg(required = true)]
        prefixes: Vec<String>,
    },
    /// Print signed links for blobs and everything beneath directories
    Link {
        account: String,
        bucket: String,
        #[arg(required = true)]
        keys: Vec<String>,
        /// Link lifetime; defaults to the configured lifetime
        #[arg(long)]
        hours: Option<u64>,
    },
}

#[derive(Debug, Args)]
pub struct LsArgs {
    pub account: String,
    pub bucket: String,
    #[arg(default_value = "")]
    pub prefix: String,
    /// List every blob beneath the prefix instead of one directory level
    #[arg(long)]
    pub flat: bool,
    /// Page to show, starting at 1
    #[arg(long, default_value_t = 1)]
    pub page: usize,
    /// Entries per page; defaults to the configured page size
    #[arg(long)]
    pub page_size: Option<usize>,
}

#[derive(Debug, Subcommand)]
pub enum AccountsCommand {
    /// List saved accounts
    List,
    /// Save an AWS S3 or S3-compatible account
    AddS3 {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        access_key: String,
        #[arg(long)]
        secret: String,
        /// Custom endpoint of an S3-compatible service
        #[arg(long)]
        endpoint: Option<String>,
        #[arg(long)]
        region: Option<String>,
    },
    /// Save an Azure Blob Storage account
    AddAzure {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        connection_string: String,
        /// Container to expose (repeatable)
        #[arg(long = "container")]
        containers: Vec<String>,
    },
    /// Save a Google Cloud Storage account
    AddGcs {
        #[arg(long)]
        name: Option<String>,
        /// Service account key file (JSON)
        #[arg(long)]
        service_account: PathBuf,
        /// Bucket to expose (repeatable)
        #[arg(long = "bucket")]
        buckets: Vec<String>,
    },
    /// Forget a saved account
    Remove { name: String },
}
