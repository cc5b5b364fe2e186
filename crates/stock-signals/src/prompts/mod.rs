//! Prompt builders for category analyses and the final synthesis

use std::collections::BTreeMap;

use serde_json::{Value, json};

use crate::model::{Category, Market, SignalResult};

pub mod system;

use system::{JSON_ONLY_INSTRUCTION, SCORE_SCALE, SYNTHESIS_GUIDANCE, extra_fields, guidance};

/// Ticker facts embedded in every prompt
#[derive(Debug, Clone, Copy)]
pub struct PromptContext<'a> {
    pub symbol: &'a str,
    pub sector: Option<&'a str>,
    pub market: &'a Market,
    pub currency: &'a str,
}

impl PromptContext<'_> {
    fn header(&self) -> String {
        format!(
            "Ticker: {}\nSector: {}\nMarket: {}\nCurrency: {}",
            self.symbol,
            self.sector.unwrap_or("unknown"),
            self.market,
            self.currency
        )
    }
}

fn pretty(data: &Value) -> String {
    serde_json::to_string_pretty(data).unwrap_or_else(|_| data.to_string())
}

/// Prompt asking for one category's score
pub fn category_prompt(category: Category, ctx: &PromptContext<'_>, data: &Value) -> String {
    format!(
        "{JSON_ONLY_INSTRUCTION}\n\n{header}\n\n{guidance}\n\nData ({label}):\n{data}\n\nReply with exactly this JSON shape:\n{{\n  \"score\": <{SCORE_SCALE}>,\n  \"confidence\": \"<low|medium|high>\",\n  \"narrative\": \"<markdown analysis with the sections above>\"{extra}\n}}",
        header = ctx.header(),
        guidance = guidance(category),
        label = category.label(),
        data = pretty(data),
        extra = extra_fields(category),
    )
}

/// Per-category summary handed to the synthesis prompt
pub fn synthesis_input(signals: &[SignalResult]) -> Value {
    let by_category: BTreeMap<&str, Value> = signals
        .iter()
        .map(|s| {
            (
                s.category.as_str(),
                json!({
                    "score": s.score,
                    "confidence": s.confidence,
                    "narrative": s.narrative,
                }),
            )
        })
        .collect();
    json!(by_category)
}

/// Prompt asking for the overall recommendation
pub fn synthesis_prompt(ctx: &PromptContext<'_>, signals: &[SignalResult]) -> String {
    format!(
        "{JSON_ONLY_INSTRUCTION}\n\n{header}\n\n{SYNTHESIS_GUIDANCE}\n\nCategory results:\n{data}\n\nReply with exactly this JSON shape:\n{{\n  \"overall_score\": <{SCORE_SCALE}>,\n  \"recommendation\": \"<buy|hold|sell>\",\n  \"narrative\": \"<markdown synthesis with the sections above>\",\n  \"signal_scores\": {{\"<category>\": <score>}},\n  \"entry_strategy\": \"<markdown entry strategy>\"\n}}",
        header = ctx.header(),
        data = pretty(&synthesis_input(signals)),
    )
}
