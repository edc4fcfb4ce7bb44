//! Scenario- and mode-aware system prompt construction.
//!
//! The pipeline treats this module as an opaque collaborator: it consumes a
//! scenario, learning mode, assembled context block, and language code, and
//! returns the final system prompt string.

use serde::{Deserialize, Serialize};

/// Constitutional-law domain the answer should focus on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scenario {
    FundamentalRights,
    Dpsp,
    EducationRights,
    ReligiousFreedom,
    FreedomOfExpression,
    RightToPrivacy,
    ArrestDetention,
    SocialMedia,
    #[default]
    General,
}

impl Scenario {
    pub fn label(self) -> &'static str {
        match self {
            Scenario::FundamentalRights => "Fundamental Rights",
            Scenario::Dpsp => "Directive Principles (DPSP)",
            Scenario::EducationRights => "Education Rights",
            Scenario::ReligiousFreedom => "Religious Freedom",
            Scenario::FreedomOfExpression => "Freedom of Expression",
            Scenario::RightToPrivacy => "Right to Privacy",
            Scenario::ArrestDetention => "Arrest & Detention",
            Scenario::SocialMedia => "Online Speech & Social Media",
            Scenario::General => "General Constitution",
        }
    }
}

/// Audience the answer should be formatted for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LearningMode {
    Upsc,
    Law,
    Civics,
    #[default]
    Citizen,
}

impl LearningMode {
    fn instructions(self) -> &'static str {
        match self {
            LearningMode::Upsc => {
                "FORMAT YOUR ANSWER FOR UPSC/GPSC EXAM PREPARATION:\n\
                 - Start with a clear, concise definition\n\
                 - Mention the exact Article number(s) and Part of the Constitution\n\
                 - Include relevant landmark Supreme Court cases (with year)\n\
                 - Add an exam tip at the end with key points to remember\n\
                 - Use bullet points for easy memorization\n\
                 - Mention any recent amendments if relevant\n\
                 - Keep the tone formal and academic"
            }
            LearningMode::Law => {
                "FORMAT YOUR ANSWER FOR LAW STUDENTS:\n\
                 - Provide detailed legal analysis with Article references\n\
                 - Cite relevant Supreme Court and High Court judgments with case names and years\n\
                 - Discuss the ratio decidendi and obiter dicta where relevant\n\
                 - Explain the constitutional interpretation approach used\n\
                 - Mention any dissenting opinions in landmark cases\n\
                 - Use proper legal terminology"
            }
            LearningMode::Civics => {
                "FORMAT YOUR ANSWER FOR SCHOOL CIVICS STUDENTS:\n\
                 - Explain in very simple, easy-to-understand language\n\
                 - Use real-life examples that students can relate to\n\
                 - Avoid complex legal jargon\n\
                 - Use analogies and stories to explain concepts\n\
                 - Include a fun fact\n\
                 - Keep explanations short and engaging"
            }
            LearningMode::Citizen => {
                "FORMAT YOUR ANSWER FOR GENERAL CITIZENS:\n\
                 - Explain how this right or law affects everyday life\n\
                 - Give practical real-world examples from India\n\
                 - Explain what to do if rights are violated\n\
                 - Keep language simple but informative\n\
                 - Mention relevant helpline numbers or legal resources if applicable\n\
                 - Focus on practical awareness and empowerment"
            }
        }
    }
}

/// Default language when none is requested.
pub const DEFAULT_LANGUAGE: &str = "en-IN";

fn language_name(code: &str) -> &'static str {
    match code {
        "hi-IN" => "Hindi",
        "mr-IN" => "Marathi",
        "gu-IN" => "Gujarati",
        "bn-IN" => "Bengali",
        "ta-IN" => "Tamil",
        _ => "English",
    }
}

/// Builds the system prompt from the scenario, mode, assembled context block,
/// and BCP-47-like language code.
pub fn build_system_prompt(
    scenario: Scenario,
    mode: LearningMode,
    context: &str,
    language_code: &str,
) -> String {
    let target_lang = language_name(language_code);

    format!(
        "LANGUAGE: You MUST respond EXCLUSIVELY in {target_lang}. If {target_lang} is Hindi, \
         use Devanagari script. Do NOT use English.\n\n\
         You are Samvidhan AI, an expert Indian Constitution tutor. \
         Current focus area: {scenario_label}.\n\n\
         RELEVANT CONSTITUTIONAL TEXT:\n\
         ---\n\
         {context}\n\
         ---\n\n\
         RESPONSE STRUCTURE (SCENARIO-AWARE):\n\
         1. SITUATION ANALYSIS: If the user provides a personal or hypothetical scenario, \
         first analyze it. Tell them exactly how the Constitution views this situation.\n\
         2. APPLICABLE ARTICLES: Identify and explain the specific Article(s) from the \
         provided text that apply to this specific scenario.\n\
         3. PRACTICAL EXAMPLE: Provide an additional comparative example or a way forward \
         for the user based on the constitutional provisions.\n\n\
         {mode_instructions}\n\n\
         TEXT-TO-SPEECH RULES (VOICE OPTIMIZED):\n\
         - Use ONLY plain text. No bold, no italics.\n\
         - Use only simple sentences, periods, and commas.\n\
         - Do NOT use special characters like #, ---, or hashtags.\n\
         - Keep the output clean so a voice engine reads naturally.",
        scenario_label = scenario.label(),
        mode_instructions = mode.instructions(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_general_citizen_english() {
        assert_eq!(Scenario::default(), Scenario::General);
        assert_eq!(LearningMode::default(), LearningMode::Citizen);
        assert_eq!(language_name("xx-YY"), "English");
    }

    #[test]
    fn scenario_round_trips_kebab_case() {
        let parsed: Scenario = serde_json::from_str("\"fundamental-rights\"").unwrap();
        assert_eq!(parsed, Scenario::FundamentalRights);
        assert_eq!(serde_json::to_string(&Scenario::Dpsp).unwrap(), "\"dpsp\"");
    }

    #[test]
    fn prompt_embeds_context_language_and_mode() {
        let prompt = build_system_prompt(
            Scenario::RightToPrivacy,
            LearningMode::Upsc,
            "[Source 1 — Article 21]\ntext",
            "hi-IN",
        );
        assert!(prompt.contains("Hindi"));
        assert!(prompt.contains("[Source 1 — Article 21]"));
        assert!(prompt.contains("UPSC"));
        assert!(prompt.contains("Right to Privacy"));
    }
}
