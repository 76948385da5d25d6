use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

mod commands;
mod config;
mod host;

#[derive(Parser)]
#[command(name = "arkvon", about = "Run the arkvon referral agent against a page URL")]
#[command(version, propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    page: PageArgs,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// How the simulated page and its cookies are set up
#[derive(Args, Debug, Clone)]
pub struct PageArgs {
    /// Cookie file standing in for the browser's cookie store
    #[arg(long, global = true, default_value = "arkvon-cookies.json")]
    pub cookies: PathBuf,

    /// Agent settings file (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Document referrer
    #[arg(long, global = true)]
    pub referrer: Option<String>,

    /// User agent reported to the collector
    #[arg(long, global = true)]
    pub user_agent: Option<String>,

    /// Document title
    #[arg(long, global = true)]
    pub title: Option<String>,

    /// Payment integration to annotate (e.g. stripe_links)
    #[arg(long, global = true)]
    pub payment_type: Option<String>,

    /// Custom checkout domain matched alongside the stock Stripe links
    #[arg(long, global = true)]
    pub payment_domain: Option<String>,

    /// Checkout link present on the page (repeatable)
    #[arg(long = "payment-link", value_name = "HREF", global = true)]
    pub payment_links: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a page and run attribution to READY
    Visit(commands::visit::VisitArgs),
    /// Load a page, then issue one command
    Send(commands::send::SendArgs),
    /// Inspect or change the stored referral
    Referral(commands::referral::ReferralArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Visit(args) => commands::visit::run(args, &cli.page).await,
        Commands::Send(args) => commands::send::run(args, &cli.page).await,
        Commands::Referral(args) => commands::referral::run(args, &cli.page).await,
    }
}
