//! Visit command

use anyhow::Result;
use arkvon_core::{AttributionState, ReferralData};
use clap::Args;
use serde_json::json;

use crate::PageArgs;
use crate::host;

/// Visit arguments
#[derive(Args, Debug)]
pub struct VisitArgs {
    /// Page URL, including any referral parameters
    pub url: String,

    /// Tenant public id (`data-arkvon`)
    #[arg(long)]
    pub public_id: String,
}

/// Run visit command
pub async fn run(args: VisitArgs, page: &PageArgs) -> Result<()> {
    let (engine, annotator) = host::engine(&args.url, &args.public_id, page).await?;
    let state = engine.run().await;
    let referral = engine.agent().utils().get_referral_data().await;
    let links = annotator.finish().await;

    println!("{}", render(state, &referral, &links)?);
    Ok(())
}

pub(crate) fn render(
    state: AttributionState,
    referral: &ReferralData,
    payment_links: &[String],
) -> Result<String> {
    Ok(serde_json::to_string_pretty(&json!({
        "state": state,
        "is_referral_user": referral.is_active(),
        "referral": referral,
        "payment_links": payment_links,
    }))?)
}
