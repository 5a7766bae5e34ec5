//! Analysis prompt templates.

use serde::{Deserialize, Serialize};

/// Prefix marking the start of a fresh analysis in a running transcript
pub const NEW_ANALYSIS_PREFIX: &str = "For this NEW analysis:\n";

const SECURITY: &str = "You are an expert Android application security engineer analyzing code for security issues.\n\n\
If you find potential vulnerabilities:\n\
1. Show the exact vulnerable code in a code block\n\
2. Provide a detailed technical analysis explaining why it's vulnerable\n\
3. Recommend specific fixes\n\n\
If no clear vulnerabilities are found in this code, identify which other classes or packages \
would be valuable to analyze next and explain why.\n\n\
Focus ONLY on concrete findings. Do not list theoretical vulnerabilities or repeat the analysis parameters.\n\n\
List which classes you received for analysis.\n\n\
Context:\n";

const MALWARE: &str = "Analyze the provided code for potential malicious behavior:\n\
- Data exfiltration patterns\n\
- Excessive permission usage\n\
- Overlay attack techniques\n\
- Obfuscation methods\n\
- Command & control patterns\n\
- Suspicious API usage\n\n\
List which classes you received for analysis.\n\n";

const FALLBACK: &str = "Analyze the provided code:\n\n";

/// Which analysis the user asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PromptType
{
    /// Vulnerability review
    #[default]
    Security,

    /// Malicious-behavior review
    Malware,

    /// User-supplied prompt
    Custom,
}

impl PromptType
{
    /// Template text; `custom` is only consulted for [`PromptType::Custom`]
    pub fn template(
        self,
        custom: &str,
    ) -> String
    {
        match self
        {
            PromptType::Security => SECURITY.to_string(),
            PromptType::Malware => MALWARE.to_string(),
            PromptType::Custom if custom
                .trim()
                .is_empty() =>
            {
                FALLBACK.to_string()
            }
            PromptType::Custom => format!("{custom}\n\n"),
        }
    }
}

/// User turn opening a new analysis
pub fn compose_user_turn(
    template: &str,
    context: &str,
) -> String
{
    format!("{NEW_ANALYSIS_PREFIX}{template}\n\n{context}")
}

/// User turn for a follow-up question about the last context
pub fn compose_follow_up(
    message: &str,
    previous_context: &str,
) -> String
{
    format!("{message}\n\nPrevious Context:\n{previous_context}")
}
