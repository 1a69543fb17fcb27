use aho_corasick::{AhoCorasick, BuildError};
use strum::IntoEnumIterator;

use crate::models::{
    AgentId, CaseStatistics, CaseType, DeliberationMessage, ParsedCaseInput, SimilarCase,
    TargetAgent,
};

const EVERYONE_PHRASES: &[&str] = &[
    "semua hakim",
    "all judges",
    "everyone",
    "pendapat semua",
    "bagaimana menurut kalian",
];

const ROTATION_WINDOW: usize = 6;
const HISTORY_WINDOW: usize = 10;
const SIMILAR_CASES_IN_PROMPT: usize = 5;

/// What an agent sees when asked to speak.
#[derive(Debug, Clone)]
pub struct AgentContext<'a> {
    pub case_summary: String,
    pub similar_cases: &'a [SimilarCase],
    pub statistics: Option<&'a CaseStatistics>,
    pub history: &'a [DeliberationMessage],
    pub user_message: &'a str,
}

/// Decides which judges answer a turn.
pub struct Orchestrator {
    everyone: AhoCorasick,
    triggers: Vec<(AgentId, AhoCorasick)>,
}

impl Orchestrator {
    pub fn new() -> Result<Self, BuildError> {
        let everyone = matcher(EVERYONE_PHRASES.iter().copied())?;
        let triggers = AgentId::iter()
            .map(|agent| {
                let patterns = std::iter::once(agent.as_ref())
                    .chain(agent.trigger_keywords().iter().copied());
                matcher(patterns).map(|m| (agent, m))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { everyone, triggers })
    }

    pub fn responding_agents(
        &self,
        message: &str,
        target: Option<TargetAgent>,
        history: &[DeliberationMessage],
    ) -> Vec<AgentId> {
        if target == Some(TargetAgent::All) || self.everyone.is_match(message) {
            return AgentId::iter().collect();
        }

        if let Some(agent) = target.and_then(|t| t.agent()) {
            return vec![agent];
        }

        let triggered: Vec<AgentId> = self
            .triggers
            .iter()
            .filter(|(_, m)| m.is_match(message))
            .map(|(agent, _)| *agent)
            .collect();

        if triggered.is_empty() {
            vec![select_next_speaker(history)]
        } else {
            triggered
        }
    }
}

fn matcher<'p>(patterns: impl IntoIterator<Item = &'p str>) -> Result<AhoCorasick, BuildError> {
    AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .build(patterns)
}

/// The judge who spoke least in the recent window. Ties go to the historian,
/// then to declaration order.
pub fn select_next_speaker(history: &[DeliberationMessage]) -> AgentId {
    let start = history.len().saturating_sub(ROTATION_WINDOW);
    let counts: Vec<(AgentId, usize)> = AgentId::iter()
        .map(|agent| {
            let spoken = history[start..]
                .iter()
                .filter(|m| m.sender.agent_id() == Some(agent))
                .count();
            (agent, spoken)
        })
        .collect();

    let min = counts.iter().map(|(_, c)| *c).min().unwrap_or(0);
    let candidates: Vec<AgentId> = counts
        .into_iter()
        .filter(|(_, c)| *c == min)
        .map(|(agent, _)| agent)
        .collect();

    if candidates.contains(&AgentId::Historian) {
        AgentId::Historian
    } else {
        candidates.first().copied().unwrap_or(AgentId::Historian)
    }
}

pub fn build_case_summary(parsed: Option<&ParsedCaseInput>) -> String {
    let Some(case) = parsed else {
        return "No case details provided yet.".to_string();
    };

    let mut parts = vec![
        format!("Case Type: {}", case.case_type),
        format!("Summary: {}", case.summary),
    ];

    let profile = &case.defendant_profile;
    parts.push(format!(
        "Defendant: {}",
        if profile.is_first_offender {
            "First offender"
        } else {
            "Repeat offender"
        }
    ));
    if let Some(age) = profile.age {
        parts.push(format!("Age: {}", age));
    }

    if !case.key_facts.is_empty() {
        let facts: Vec<&str> = case.key_facts.iter().take(5).map(String::as_str).collect();
        parts.push(format!("Key Facts: {}", facts.join(", ")));
    }
    if !case.charges.is_empty() {
        let charges: Vec<&str> = case.charges.iter().take(3).map(String::as_str).collect();
        parts.push(format!("Charges: {}", charges.join(", ")));
    }

    if let Some(n) = &case.narcotics {
        parts.push(format!(
            "Narcotics Details: {}, {}g, Intent: {}",
            n.substance, n.weight_grams, n.intent
        ));
    }
    if let Some(c) = &case.corruption {
        parts.push(format!(
            "Corruption Details: State loss IDR {}",
            group_thousands(c.state_loss_idr)
        ));
        if let Some(position) = &c.position {
            parts.push(format!("Position: {}", position));
        }
    }

    parts.join("\n")
}

fn group_thousands(amount: f64) -> String {
    let digits = format!("{:.0}", amount.abs());
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if amount < 0.0 {
        out.insert(0, '-');
    }
    out
}

fn format_statistics(stats: &CaseStatistics) -> Option<String> {
    if stats.total_cases == 0 {
        return None;
    }
    let dist = &stats.sentence_distribution;
    Some(format!(
        "Based on {} similar cases:\n- Average sentence: {} months\n- Median sentence: {} months\n- Range: {} - {} months",
        stats.total_cases, dist.average_months, dist.median_months, dist.min_months, dist.max_months
    ))
}

/// One line per precedent, empty when there are none.
pub fn format_similar_cases(cases: &[SimilarCase]) -> String {
    cases
        .iter()
        .take(SIMILAR_CASES_IN_PROMPT)
        .map(|c| {
            format!(
                "- Case {}: {} (Sentence: {} months, Similarity: {:.0}%)",
                c.case_number,
                c.verdict_summary,
                c.sentence_months,
                c.similarity_score * 100.0
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Turn prompt sent under the judge's system preamble.
pub fn build_prompt(ctx: &AgentContext<'_>) -> String {
    let start = ctx.history.len().saturating_sub(HISTORY_WINDOW);
    let history = ctx.history[start..]
        .iter()
        .map(|m| format!("{}: {}", m.sender.display_name(), m.content))
        .collect::<Vec<_>>()
        .join("\n");

    let similar = format_similar_cases(ctx.similar_cases);

    let statistics = ctx.statistics.and_then(format_statistics);

    format!(
        "## Current Case Context
{summary}

## Similar Cases from Database
{similar}

## Case Statistics
{statistics}

## Conversation History
{history}

## User Message
{message}

Respond to the user's message from your judicial perspective.
Be specific and cite the laws or precedents you rely on clearly.
Speak as you would in a judicial chamber: conversational but professional.

IMPORTANT: You MUST respond in Bahasa Indonesia.",
        summary = ctx.case_summary,
        similar = if similar.is_empty() {
            "No similar cases found."
        } else {
            similar.as_str()
        },
        statistics = statistics.as_deref().unwrap_or("No statistics available."),
        history = if history.is_empty() {
            "This is the start of the deliberation."
        } else {
            history.as_str()
        },
        message = ctx.user_message,
    )
}

fn case_type_label(case_type: CaseType) -> &'static str {
    match case_type {
        CaseType::Narcotics => "Narkotika",
        CaseType::Corruption => "Korupsi",
        CaseType::GeneralCriminal => "Pidana Umum",
        CaseType::Other => "Lainnya",
    }
}

/// Opening system message of a new deliberation session.
pub fn initial_message_content(case: &ParsedCaseInput, similar_count: usize) -> String {
    let mut summary: String = case.summary.chars().take(200).collect();
    if case.summary.chars().count() > 200 {
        summary.push_str("...");
    }

    let panel = AgentId::iter()
        .enumerate()
        .map(|(i, agent)| format!("{}. **{}** - {}", i + 1, agent.name(), agent.philosophy()))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Selamat datang di Ruang Musyawarah Hakim.

**Perkara yang akan dibahas:**
- Jenis: {}
- Ringkasan: {}

**Panel Hakim:**
{}

**Kasus Serupa Ditemukan:** {} kasus

Silakan mulai musyawarah dengan pertanyaan atau pernyataan Anda.",
        case_type_label(case.case_type),
        summary,
        panel,
        similar_count
    )
}
