//! Referral utility commands

use anyhow::{Result, bail};
use arkvon_core::{PublicAgent, ReferralData};
use clap::{Args, Subcommand};

use crate::PageArgs;
use crate::host;

/// Referral arguments
#[derive(Args, Debug)]
pub struct ReferralArgs {
    #[command(subcommand)]
    pub command: ReferralCommands,
}

/// Referral subcommands
#[derive(Subcommand, Debug)]
pub enum ReferralCommands {
    /// Show the referral stored for a page's domain
    Show {
        /// Page URL the cookies belong to
        url: String,
    },
    /// Set the referral code by hand
    Set {
        /// Page URL the cookies belong to
        url: String,
        /// Referral code
        code: String,
        /// Cookie lifetime in days
        #[arg(long)]
        days: Option<u32>,
    },
    /// Forget the stored referral
    Clear {
        /// Page URL the cookies belong to
        url: String,
    },
}

/// Run referral command
pub async fn run(args: ReferralArgs, page: &PageArgs) -> Result<()> {
    match args.command {
        ReferralCommands::Show { url } => show(&url, page).await,
        ReferralCommands::Set { url, code, days } => set(&url, &code, days, page).await,
        ReferralCommands::Clear { url } => clear(&url, page).await,
    }
}

async fn show(url: &str, page: &PageArgs) -> Result<()> {
    let context = host::context(url, page).await?;
    let store = context.store();
    let referral = ReferralData {
        referral_code: store.referral_code().await,
        tracking_data: store.tracking_data().await,
    };

    if !referral.is_active() && referral.tracking_data.is_none() {
        println!("No referral stored for {}", context.page().cookie_domain());
        return Ok(());
    }
    println!("{}", serde_json::to_string_pretty(&referral)?);
    Ok(())
}

async fn set(url: &str, code: &str, days: Option<u32>, page: &PageArgs) -> Result<()> {
    if code.trim().is_empty() {
        bail!("Referral code must not be empty");
    }
    let context = host::context(url, page).await?;
    let utils = PublicAgent::new(context.clone()).utils();
    if !utils.set_referral(code, days).await {
        bail!("Failed to store referral");
    }
    println!("Referral set to {} for {}", code, context.page().cookie_domain());
    Ok(())
}

async fn clear(url: &str, page: &PageArgs) -> Result<()> {
    let context = host::context(url, page).await?;
    let utils = PublicAgent::new(context.clone()).utils();
    if !utils.clear_tracking().await {
        bail!("Failed to clear tracking data");
    }
    println!("Tracking data cleared for {}", context.page().cookie_domain());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(dir: &tempfile::TempDir) -> PageArgs {
        PageArgs {
            cookies: dir.path().join("cookies.json"),
            config: Some(dir.path().join("arkvon.toml")),
            referrer: None,
            user_agent: None,
            title: None,
            payment_type: None,
            payment_domain: None,
            payment_links: Vec::new(),
        }
    }

    #[tokio::test]
    async fn set_then_clear_round_trips_through_cookie_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("arkvon.toml"), "").unwrap();
        let page = args(&dir);
        let url = "https://shop.example.com/";

        set(url, "MANUAL", Some(3), &page).await.unwrap();
        let context = host::context(url, &page).await.unwrap();
        assert_eq!(
            context.store().referral_code().await.as_deref(),
            Some("MANUAL")
        );

        clear(url, &page).await.unwrap();
        let context = host::context(url, &page).await.unwrap();
        assert!(!context.store().has_attribution().await);
    }

    #[tokio::test]
    async fn empty_code_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("arkvon.toml"), "").unwrap();
        assert!(set("https://shop.example.com/", " ", None, &args(&dir)).await.is_err());
    }
}
