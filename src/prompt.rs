//! Fixed prompt templates, one per operation.
//!
//! Prompts are deterministic functions of (operation, sanitized text,
//! options, question); identical inputs always produce identical prompts so
//! cache keys and model behavior stay stable across processes.

use crate::domain::{Operation, ProcessingOptions};

const DEFAULT_MAX_LENGTH: u32 = 100;
const DEFAULT_MAX_POINTS: u32 = 5;
const DEFAULT_NUM_QUESTIONS: u32 = 3;

/// Build the model prompt for one request.
pub fn build_prompt(
    operation: Operation,
    text: &str,
    options: &ProcessingOptions,
    question: Option<&str>,
) -> String {
    match operation {
        Operation::Summarize => {
            let max_length = options.max_length.unwrap_or(DEFAULT_MAX_LENGTH);
            format!(
                "Summarize the following text in at most {max_length} words{style}.\n\n\
                 Text:\n{text}",
                style = style_clause(options),
            )
        }
        Operation::Sentiment => format!(
            "Analyze the sentiment of the following text. Respond with a JSON object \
             containing \"label\" (one of \"positive\", \"neutral\", \"negative\"), \
             \"confidence\" (a number between 0 and 1), and \"explanation\" (one sentence).\n\n\
             Text:\n{text}"
        ),
        Operation::KeyPoints => {
            let max_points = options.max_points.unwrap_or(DEFAULT_MAX_POINTS);
            format!(
                "Extract at most {max_points} key points from the following text{style}. \
                 Respond with a JSON array of strings.\n\n\
                 Text:\n{text}",
                style = style_clause(options),
            )
        }
        Operation::Questions => {
            let num_questions = options.num_questions.unwrap_or(DEFAULT_NUM_QUESTIONS);
            format!(
                "Generate {num_questions} thoughtful questions about the following text. \
                 Respond with a JSON array of strings.\n\n\
                 Text:\n{text}"
            )
        }
        Operation::Qa => format!(
            "Answer the question using only the provided text. If the text does not \
             contain the answer, say so.\n\n\
             Text:\n{text}\n\n\
             Question: {question}",
            question = question.unwrap_or_default(),
        ),
    }
}

fn style_clause(options: &ProcessingOptions) -> String {
    match &options.style {
        Some(style) => format!(" in a {style} style"),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompts_are_deterministic() {
        let options = ProcessingOptions { max_length: Some(50), ..Default::default() };
        let a = build_prompt(Operation::Summarize, "doc", &options, None);
        let b = build_prompt(Operation::Summarize, "doc", &options, None);
        assert_eq!(a, b);
    }

    #[test]
    fn summarize_uses_max_length_option() {
        let options = ProcessingOptions { max_length: Some(30), ..Default::default() };
        let prompt = build_prompt(Operation::Summarize, "doc", &options, None);
        assert!(prompt.contains("at most 30 words"));
    }

    #[test]
    fn summarize_defaults_max_length() {
        let prompt =
            build_prompt(Operation::Summarize, "doc", &ProcessingOptions::default(), None);
        assert!(prompt.contains("at most 100 words"));
    }

    #[test]
    fn style_option_is_woven_in() {
        let options =
            ProcessingOptions { style: Some("concise".to_string()), ..Default::default() };
        let prompt = build_prompt(Operation::Summarize, "doc", &options, None);
        assert!(prompt.contains("in a concise style"));
    }

    #[test]
    fn sentiment_requests_json_schema() {
        let prompt =
            build_prompt(Operation::Sentiment, "doc", &ProcessingOptions::default(), None);
        assert!(prompt.contains("\"label\""));
        assert!(prompt.contains("\"confidence\""));
        assert!(prompt.contains("\"explanation\""));
    }

    #[test]
    fn key_points_uses_max_points() {
        let options = ProcessingOptions { max_points: Some(7), ..Default::default() };
        let prompt = build_prompt(Operation::KeyPoints, "doc", &options, None);
        assert!(prompt.contains("at most 7 key points"));
    }

    #[test]
    fn questions_uses_num_questions() {
        let options = ProcessingOptions { num_questions: Some(4), ..Default::default() };
        let prompt = build_prompt(Operation::Questions, "doc", &options, None);
        assert!(prompt.contains("Generate 4"));
    }

    #[test]
    fn qa_includes_text_and_question() {
        let prompt = build_prompt(
            Operation::Qa,
            "The sky is blue.",
            &ProcessingOptions::default(),
            Some("What color is the sky?"),
        );
        assert!(prompt.contains("The sky is blue."));
        assert!(prompt.contains("Question: What color is the sky?"));
    }
}
