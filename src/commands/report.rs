//! Trade-history report command

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate, NaiveTime, TimeZone, Utc};
use tracing::info;

use gold_engine::broker::{BridgeClient, OrderService};
use gold_engine::history::{pair_deals, write_csv, xauusd_trade_ranges};
use gold_engine::{Config, Money};

pub async fn run(
    config_path: Option<String>,
    from: String,
    output: Option<String>,
) -> Result<()> {
    let cfg = Config::load(config_path.as_deref())?;

    let from_date: NaiveDate = from
        .parse()
        .with_context(|| format!("Invalid --from date '{from}', expected YYYY-MM-DD"))?;
    let since = Utc
        .from_utc_datetime(&from_date.and_time(NaiveTime::MIN));

    let broker = BridgeClient::connect(&cfg.bridge).await?;
    let deals = broker
        .closed_deals_since(since)
        .await
        .context("Failed to fetch deal history")?;
    info!("Fetched {} deals since {from_date}", deals.len());

    let ranges = xauusd_trade_ranges();
    let trades = pair_deals(&deals, &ranges);

    let path = output.unwrap_or_else(|| {
        format!(
            "{}/trade_history_{}.csv",
            cfg.paths.report_dir,
            Local::now().format("%Y-%m-%d")
        )
    });
    write_csv(&path, &trades)?;

    let total: Money = trades.iter().map(|t| t.profit).sum();
    let wins = trades.iter().filter(|t| t.outcome == "Profit").count();

    println!("\n{}", "=".repeat(50));
    println!("TRADE HISTORY REPORT");
    println!("{}", "=".repeat(50));
    println!("Since:          {from_date}");
    println!("Completed:      {}", trades.len());
    println!("Winners:        {wins}");
    println!("Total Profit:   {total}");
    println!("Report:         {path}");
    println!("{}", "=".repeat(50));

    Ok(())
}
