use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "chatmosaic")]
#[command(author, version, about = "Ask an AI model questions and keep a searchable history", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP API and serve the browser client
    Serve {
        /// Address to bind (overrides server.host)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides server.port)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Ask a single question and store the answer
    Ask {
        question: String,
    },

    /// Export every stored exchange
    Export {
        /// json or csv
        #[arg(short, long, default_value = "json")]
        format: String,

        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<String>,
    },
}
