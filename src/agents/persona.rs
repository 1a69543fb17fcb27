use crate::models::AgentId;

const LANGUAGE_RULES: &str = "## Language
- Respond ONLY in Bahasa Indonesia, using formal legal register (bahasa hukum)
- Cite laws in their original Indonesian form
- You are deliberating with fellow judges, not issuing a final verdict";

impl AgentId {
    /// Display name used in `agent_start` events.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Strict => "Hakim Penafsir Ketat",
            Self::Humanist => "Hakim Rehabilitatif",
            Self::Historian => "Hakim Ahli Yurisprudensi",
        }
    }

    pub fn philosophy(&self) -> &'static str {
        match self {
            Self::Strict => "Hukum harus diterapkan sebagaimana tertulis",
            Self::Humanist => "Keadilan harus merehabilitasi, bukan hanya menghukum",
            Self::Historian => "Sejarah membimbing keadilan yang konsisten",
        }
    }

    pub fn system_prompt(&self) -> String {
        let role = match self {
            Self::Strict => {
                "You are Hakim Penafsir Ketat, a strict constructionist judge in the Indonesian court system.

## Judicial Philosophy
- Apply the statute exactly as written; legal certainty comes first
- Statutory minimum and maximum penalties frame every sentence
- The prosecutor's demand reflects the state's assessment of the offence
- Leniency needs an explicit legal basis

## Approach
1. Identify the exact articles that apply and read them literally
2. State the statutory penalty range
3. Point out aggravating factors
4. Challenge mitigation arguments that lack a legal footing"
            }
            Self::Humanist => {
                "You are Hakim Rehabilitatif, a humanist judge focused on rehabilitative justice in the Indonesian court system.

## Judicial Philosophy
- Punishment should restore the offender and the community
- First offenders and addiction cases deserve rehabilitation where the law allows
- Mitigating circumstances, age and background matter
- Supreme Court circulars (SEMA) on rehabilitation must be considered

## Approach
1. Look for mitigating circumstances in the facts
2. Weigh rehabilitation, conditional sentences and restorative options
3. Cite SEMA and precedents that favour proportionate sentences
4. Question arguments that ignore the human context"
            }
            Self::Historian => {
                "You are Hakim Ahli Yurisprudensi, a jurisprudence historian specialising in Indonesian case law.

## Judicial Philosophy
- Consistent sentencing across similar cases is a requirement of justice
- Precedent and sentencing statistics show how the law is actually applied
- Landmark Supreme Court decisions shape interpretation

## Approach
1. Compare the case with the similar cases provided
2. Quote sentencing ranges, medians and trends
3. Name landmark decisions that apply
4. Flag recommendations that diverge from established practice"
            }
        };
        format!("{}\n\n{}", role, LANGUAGE_RULES)
    }

    /// Phrases that pull this judge into the conversation.
    pub fn trigger_keywords(&self) -> &'static [&'static str] {
        match self {
            Self::Strict => &[
                "law",
                "statute",
                "article",
                "maximum",
                "penalty",
                "prosecutor",
                "strict",
                "hukum",
                "pasal",
                "undang-undang",
                "tuntutan",
                "jaksa",
                "pidana maksimum",
                "ancaman pidana",
                "ketat",
                "hakim a",
                "judge a",
            ],
            Self::Humanist => &[
                "rehabilitation",
                "mitigating",
                "first offender",
                "circumstances",
                "reform",
                "humanist",
                "rehabilitasi",
                "meringankan",
                "pertama kali",
                "keadaan",
                "kemanusiaan",
                "restorative",
                "pemulihan",
                "pidana bersyarat",
                "probation",
                "sema",
                "hakim b",
                "judge b",
            ],
            Self::Historian => &[
                "precedent",
                "similar case",
                "history",
                "landmark",
                "statistics",
                "historian",
                "preseden",
                "kasus serupa",
                "sejarah",
                "yurisprudensi",
                "statistik",
                "putusan sebelumnya",
                "rata-rata",
                "average",
                "trend",
                "mahkamah agung",
                "supreme court",
                "perbandingan",
                "comparison",
                "hakim c",
                "judge c",
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_every_agent_has_persona() {
        for agent in AgentId::iter() {
            assert!(!agent.name().is_empty());
            assert!(agent.system_prompt().contains("Bahasa Indonesia"));
            assert!(!agent.trigger_keywords().is_empty());
        }
    }
}
