//! Send command

use anyhow::{Context, Result, bail};
use arkvon_core::{AttributionState, Command, CommandData};
use clap::Args;
use serde_json::Value;

use crate::PageArgs;
use crate::host;

/// Send arguments
#[derive(Args, Debug)]
pub struct SendArgs {
    /// Page URL, including any referral parameters
    pub url: String,

    /// Command to issue (click, signup, conversion, page_view, custom)
    pub command: String,

    /// Tenant public id (`data-arkvon`)
    #[arg(long)]
    pub public_id: String,

    /// Command data as a JSON object
    #[arg(long)]
    pub data: Option<String>,
}

/// Run send command
pub async fn run(args: SendArgs, page: &PageArgs) -> Result<()> {
    let command: Command = args.command.parse()?;
    let data = parse_data(args.data.as_deref())?;

    let (engine, annotator) = host::engine(&args.url, &args.public_id, page).await?;
    if engine.run().await != AttributionState::Ready {
        bail!("Agent did not initialize; check --public-id");
    }
    annotator.finish().await;

    match engine.agent().call(command.name(), data).await {
        Some(response) => {
            println!("{}", serde_json::to_string_pretty(response.as_value())?);
            Ok(())
        }
        None => bail!("Collector did not accept the {command} command"),
    }
}

fn parse_data(raw: Option<&str>) -> Result<CommandData> {
    let Some(raw) = raw else {
        return Ok(CommandData::new());
    };
    match serde_json::from_str(raw).context("--data is not valid JSON")? {
        Value::Object(map) => Ok(map),
        _ => bail!("--data must be a JSON object"),
    }
}
