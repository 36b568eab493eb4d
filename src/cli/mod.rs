use clap::{Parser, Subcommand};

mod handlers;

pub use handlers::*;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the memory service
    Daemon {
        /// Listen address, e.g. 127.0.0.1:8000. Defaults to server.bind (or PORT)
        #[clap(short, long)]
        bind: Option<String>,
    },

    /// Enrich, embed and store one activity record
    Ingest {
        /// Page title
        #[clap(short, long, default_value = "")]
        title: String,

        /// Page url
        #[clap(short, long)]
        url: String,

        /// Text captured from the page
        #[clap(short, long, default_value = "")]
        content: String,

        /// ISO-8601 timestamp. Defaults to now
        #[clap(long)]
        timestamp: Option<String>,
    },

    /// Find memories related to a text
    Recall {
        text: String,

        /// Number of results
        #[clap(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// List stored memories (approximate)
    List {
        /// Maximum number of entries
        #[clap(short, long)]
        limit: Option<usize>,
    },

    /// Delete memories by id, or all of them
    Delete {
        /// Memory id; repeat for several
        #[clap(short, long = "id")]
        ids: Vec<String>,

        /// Wipe the whole store
        #[clap(long)]
        all: bool,

        /// Do not ask for confirmation
        #[clap(short, long)]
        yes: bool,
    },

    /// Print the text a url would be stored under, without storing it
    Enrich {
        url: String,

        #[clap(short, long, default_value = "")]
        title: String,

        #[clap(short, long, default_value = "")]
        content: String,
    },
}
