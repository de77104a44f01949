use std::net::SocketAddr;

use clap::{Parser, Subcommand};

use crate::filter::TargetClient;
use crate::service::OutputFormat;

#[derive(Parser)]
#[command(version, about = "Convert proxy share links into Clash and sing-box subscriptions", long_about = None)]
pub struct Args {
    #[arg(short, long, global = true, help = "Emit debug log")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the subscription HTTP server
    Serve {
        #[arg(short, long, help = "Settings file, accept file path or URL")]
        config: Option<String>,

        #[arg(short, long, help = "Override the listen address")]
        listen: Option<SocketAddr>,
    },

    /// Convert share links into a client document
    Convert {
        #[arg(help = "Share links or a subscription, accept file path or URL")]
        input: String,

        #[arg(short, long, default_value = "clash", help = "clash or singbox")]
        format: OutputFormat,

        #[arg(long, default_value = "xray", help = "xray or singbox")]
        core: TargetClient,

        #[arg(short, long, help = "Output path, stdout when omitted")]
        output: Option<String>,
    },

    /// Probe every server in a list of share links
    Probe {
        #[arg(help = "Share links or a subscription, accept file path or URL")]
        input: String,

        #[arg(long, default_value_t = 5000, help = "Per-server timeout in milliseconds")]
        timeout_ms: u64,
    },
}
