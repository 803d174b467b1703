//! Prompt text for the classifier tiers and the summarizer.
//!
//! Prompts are fixed strings plus the document and search description.
//! They must stay deterministic: the response cache is keyed on the exact
//! messages, so anything variable here (dates, run ids) would defeat it.

use crate::llm::ChatMessage;

pub const MAYBE_RELEVANT_SYSTEM: &str = r#"
You are a research assistant screening articles for a reader.
You will receive a description of what the reader is looking for and the content of one document.
Decide whether the document is POSSIBLY relevant to the reader. Recall matters more than precision here:
if there is even a small chance the reader would want to see it, mark it relevant and say why.
A document that only touches a closely related subject should be kept so the reader can decide.
Mark it not relevant only when it clearly has nothing to do with the description.
Think step by step before answering.

Respond with JSON only, with exactly these fields:
- relevant: bool
- reasoning: str

Example:

SEARCH DESCRIPTION:
I follow tools for managing cloud infrastructure as code, especially Terraform and Pulumi.

DOCUMENT CONTENT:
Our team spent a quarter migrating services between cloud regions. Most of the work was manual,
though we briefly tried generating configs with a templating tool before giving up.

Response:
{"relevant": true, "reasoning": "The article is about cloud operations and mentions generating configuration with a tool. It is adjacent to infrastructure as code and may interest you."}
"#;

pub const HIGHLY_RELEVANT_SYSTEM: &str = r#"
You are a research assistant selecting articles for a reader.
You will receive a description of what the reader is looking for and the content of one document.
Decide whether the document is HIGHLY relevant: its main subject must match the description,
not merely mention it in passing. Explain why it is or is not relevant.
Think step by step before answering.

Respond with JSON only, with exactly these fields:
- relevant: bool
- reasoning: str

Example:

SEARCH DESCRIPTION:
I follow tools for managing cloud infrastructure as code, especially Terraform and Pulumi.

DOCUMENT CONTENT:
Our team spent a quarter migrating services between cloud regions. Most of the work was manual,
though we briefly tried generating configs with a templating tool before giving up.

Response:
{"relevant": false, "reasoning": "The article is about a manual region migration. Infrastructure as code is not its subject and neither Terraform nor Pulumi is discussed."}
"#;

pub const SUMMARY_SYSTEM: &str = r#"
You are a research assistant writing briefs for a reader.
You will receive the reason a document was judged relevant to the reader and the document content.
Write a short summary of the document that focuses on the parts that matter to the reader,
then explain in one or two sentences why those parts matter.

Respond with JSON only, with exactly these fields:
- summary: str
- reasoning: str
"#;

/// The user message shared by all three prompts.
pub fn user_prompt(search_description: &str, document_content: &str) -> String {
    format!(
        "\nSEARCH DESCRIPTION:\n{}\n\nDOCUMENT CONTENT:\n{}\n",
        search_description, document_content
    )
}

pub fn messages(system: &str, search_description: &str, document_content: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(system),
        ChatMessage::user(user_prompt(search_description, document_content)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_prompt_layout() {
        assert_eq!(
            user_prompt("terraform news", "body"),
            "\nSEARCH DESCRIPTION:\nterraform news\n\nDOCUMENT CONTENT:\nbody\n"
        );
    }

    #[test]
    fn messages_are_deterministic() {
        let a = messages(MAYBE_RELEVANT_SYSTEM, "d", "c");
        let b = messages(MAYBE_RELEVANT_SYSTEM, "d", "c");
        assert_eq!(a, b);
        assert_eq!(a[0].role, "system");
        assert_eq!(a[1].role, "user");
    }
}
