//! Fixed prompt text: the reply contract and per-category guidance

use crate::model::Category;

/// Shared preamble of every prompt
pub const JSON_ONLY_INSTRUCTION: &str = r"You are an equity research assistant. Study the data below and answer with a single valid JSON object that follows the requested shape. Do not wrap the JSON in markdown and do not write anything outside it.

Narrative fields are markdown:
- Open each section with its main takeaway
- Use ### headings for sections and **bold** for key figures (**$182.40**, **RSI 61.2**)
- Prefer bullet lists for factors and tables for side-by-side numbers
- Keep paragraphs to two or three sentences";

/// Score scale shared by all category replies
pub const SCORE_SCALE: &str = "a number from -10 (strongly bearish) to 10 (strongly bullish)";

/// What to look at and how to lay out the narrative, per category
pub fn guidance(category: Category) -> &'static str {
    match category {
        Category::Fundamentals => {
            r"Assess the company's fundamentals.

Sections:
### Key Metrics: a table of valuation, earnings, margin and growth figures
### Valuation: cheap, fair or expensive against its sector and its own history
### Growth: direction of revenue and earnings
### Financial Health: leverage, liquidity and profitability"
        }
        Category::AnalystConsensus => {
            r"Assess the analyst consensus. Weigh price targets against the current price, the spread of ratings and recent rating changes.

Sections:
### Price Target: consensus target versus current price, with upside or downside in bold
### Consensus Rating: what the rating mix says
### Recent Changes: notable upgrades and downgrades"
        }
        Category::InsiderActivity => {
            r"Assess insider trading. Clustered purchases, large trades and purchases by senior officers carry the most weight; routine award or option exercise activity carries little. An empty trade list means no reported activity in the window.

Sections:
### Summary: a one-line verdict
### Notable Trades: a table of the largest recent trades with date, insider, type and value
### Interpretation: what the pattern implies for holders"
        }
        Category::Technicals => {
            r"Assess the technical picture. Use the moving averages, RSI (below 30 oversold, above 70 overbought), MACD, Bollinger position, ATR, the 52-week range and the volume trend. Give concrete price levels.

Sections:
### Current Position: price against the key averages and the prevailing trend
### Key Levels: a table with columns Level, Price, Type, Notes
### Momentum: RSI, MACD and volume
### Trade Setup: entry zone, stop-loss and risk/reward"
        }
        Category::Sentiment => {
            r"Assess news sentiment. Judge the tone of the coverage and how much each story matters for the business.

Sections:
### Sentiment Overview: bullish, bearish or mixed, in one line
### Key Headlines: the most important stories as bullets with the headline in bold
### Market Impact: the likely near-term effect on the stock"
        }
        Category::SectorContext => {
            r"Assess the sector backdrop. Decide whether the stock moves with its sector or against it, and whether recent moves are sector-wide or stock-specific.

Sections:
### Sector Performance: a table of sector ETF and benchmark returns
### Relative Strength: whether the stock leads or lags its sector and the market
### Sector Trends: rotation and macro drivers"
        }
        Category::RiskAssessment => {
            r"Assess the risks using all of the data. A negative score means elevated risk.

Sections:
### Risk Summary: overall risk level (Low, Medium or High) in bold with one sentence of reasoning
### Key Risks: bullets, each risk in bold with a short explanation
### Catalysts: upcoming events that could move the stock

For bull_case and bear_case give a **Target Price**, the key drivers as bullets and a probability estimate."
        }
    }
}

/// Extra reply fields beyond score, confidence and narrative
pub fn extra_fields(category: Category) -> &'static str {
    match category {
        Category::Technicals => {
            r#",
  "support_levels": ["<price and note>", "..."],
  "resistance_levels": ["<price and note>", "..."],
  "entry_price": "<entry price or range>",
  "stop_loss": "<stop-loss price>""#
        }
        Category::RiskAssessment => {
            r#",
  "bull_case": "<markdown bull case>",
  "bear_case": "<markdown bear case>""#
        }
        _ => "",
    }
}

pub const SYNTHESIS_GUIDANCE: &str = r"Combine the category results into one recommendation. Fundamentals and technicals matter most for a holding period of months; sentiment matters more for the next few weeks.

Sections:
### Recommendation: **BUY**, **HOLD** or **SELL** with a one-sentence rationale
### Signal Summary: a table with columns Signal, Score, Takeaway
### Key Drivers: the two or three factors that decide the call
### What to Watch: events or price levels that would change the view

The entry_strategy field covers the entry zone, the stop-loss, position sizing for the conviction level and the risk/reward, each with prices in bold.";
