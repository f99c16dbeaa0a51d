use std::io::Write;

use anyhow::{Context, Result};
use market::MarketInsight;
use market::insight::Fluctuation;

use crate::args::OutputFormat;

pub fn render(insight: &MarketInsight, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => {
            serde_json::to_string(insight).context("failed to serialize insight")
        }
        OutputFormat::Text => Ok(render_text(insight)),
    }
}

pub fn render_text(insight: &MarketInsight) -> String {
    let mut lines = vec![format!(
        "[{}] {} | {} {:.2} ({:+.2})",
        insight.timestamp.format("%Y-%m-%d %H:%M"),
        insight.interval_label,
        insight.index_symbol.as_deref().unwrap_or("index"),
        insight.index_level,
        insight.points_changed,
    )];

    lines.push(format!("  {}", insight.stock_summary));
    lines.push(format!("  {}", insight.option_summary));
    lines.push(format!("  {}", insight.sentiment_summary));

    if !insight.top_buy_fluctuations.is_empty() {
        lines.push(format!("  Top buy: {}", movers(&insight.top_buy_fluctuations)));
    }
    if !insight.top_sell_fluctuations.is_empty() {
        lines.push(format!("  Top sell: {}", movers(&insight.top_sell_fluctuations)));
    }

    lines.extend(insight.trading_hints.lines().map(|h| format!("  * {h}")));
    lines.join("\n")
}

fn movers(list: &[Fluctuation]) -> String {
    list.iter()
        .map(|f| format!("{} {:+.2}%", f.symbol, f.diff_pct))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Sink writing each insight to `out`, one rendering per record.
pub fn writer_sink<W: Write>(
    mut out: W,
    format: OutputFormat,
) -> impl FnMut(&MarketInsight) -> Result<()> {
    move |insight| {
        let rendered = render(insight, format)?;
        writeln!(out, "{rendered}").context("failed to write insight")?;
        if format == OutputFormat::Text {
            writeln!(out).context("failed to write insight")?;
        }
        Ok(())
    }
}
