//! Turns questions and results into the text a lesson speaks.

use crate::language::LanguagePack;
use crate::session::Question;

/// Fills `{key}` markers in `template` with the paired values.
pub fn render(template: &str, values: &[(&str, &str)]) -> String {
    values
        .iter()
        .fold(template.to_string(), |text, (key, value)| {
            text.replace(&format!("{{{key}}}"), value)
        })
}

/// Reads an infix expression aloud: operators and integers become words.
///
/// Tokens are split on spaces, so `"5 + 1"` reads as three words while
/// `"5+1"` is left as one unrecognised token and spoken as-is.
pub fn format_expression_for_speech(pack: &LanguagePack, expression: &str) -> String {
    expression
        .split(' ')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(|token| match token {
            "+" => pack.operators.plus.to_string(),
            "-" => pack.operators.minus.to_string(),
            "×" | "*" => pack.operators.times.to_string(),
            "÷" | "/" => pack.operators.divided_by.to_string(),
            "=" => pack.operators.equals.to_string(),
            other => other
                .parse::<i64>()
                .map(|value| pack.number_word(value))
                .unwrap_or_else(|_| other.to_string()),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn format_question_for_speech(pack: &LanguagePack, question: &Question) -> String {
    format_expression_for_speech(pack, &question.expression)
}

/// The question read aloud together with its correct answer.
pub fn format_solution_for_speech(pack: &LanguagePack, question: &Question) -> String {
    format_expression_for_speech(
        pack,
        &format!("{} = {}", question.expression, question.correct_answer),
    )
}

/// Lists the correct answers for every missed question; empty when none were missed.
pub fn format_errors_for_speech(pack: &LanguagePack, errors: &[Question]) -> String {
    if errors.is_empty() {
        return String::new();
    }

    let corrections = errors
        .iter()
        .map(|question| format_solution_for_speech(pack, question))
        .collect::<Vec<_>>()
        .join(", ");
    format!("{}{}", pack.phrases.corrections_intro, corrections)
}
