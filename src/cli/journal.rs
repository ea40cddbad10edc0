//! Journal command implementation

use crate::config::Config;
use crate::journal::{JournalReader, JournalSummary};
use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct JournalArgs {
    /// Directory containing trade Parquet files (defaults to journal.output_dir)
    #[arg(long)]
    pub dir: Option<PathBuf>,

    /// Only include this symbol
    #[arg(long)]
    pub symbol: Option<String>,

    /// Output format: json or table
    #[arg(long, default_value = "table")]
    pub format: String,
}

impl JournalArgs {
    pub fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let dir = self
            .dir
            .clone()
            .unwrap_or_else(|| config.journal.output_dir.clone());

        let mut records = JournalReader::read_dir(&dir)?;
        if let Some(symbol) = &self.symbol {
            records.retain(|r| &r.symbol == symbol);
        }
        tracing::debug!(dir = %dir.display(), records = records.len(), "Loaded journal");

        let summary = JournalSummary::from_records(&records);
        match self.format.as_str() {
            "json" => println!("{}", serde_json::to_string_pretty(&summary)?),
            _ => print_table(&summary),
        }
        Ok(())
    }
}

fn print_table(summary: &JournalSummary) {
    println!("Trades:        {}", summary.trades);
    println!("Partial fills: {}", summary.partial_fills);
    println!(
        "Wins/Losses:   {}/{} ({}%)",
        summary.wins,
        summary.losses,
        (summary.win_rate * rust_decimal::Decimal::ONE_HUNDRED).round_dp(1)
    );
    println!("Net P&L:       {}", summary.net_pnl.round_dp(2));
    println!("Fees:          {}", summary.fees.round_dp(2));

    if !summary.by_symbol.is_empty() {
        println!();
        println!("{:<12} {:>7} {:>6} {:>12}", "SYMBOL", "TRADES", "WINS", "NET P&L");
        for (symbol, s) in &summary.by_symbol {
            println!(
                "{:<12} {:>7} {:>6} {:>12}",
                symbol,
                s.trades,
                s.wins,
                s.net_pnl.round_dp(2).to_string()
            );
        }
    }

    if !summary.by_exit_reason.is_empty() {
        println!();
        for (reason, count) in &summary.by_exit_reason {
            println!("  {:<20} {}", reason, count);
        }
    }
}
